//! Page fan-out planning.
//!
//! Small entities are fetched page by page; entities whose page count
//! exceeds the tenant's stream threshold are pulled in a single
//! chunked-transfer request instead.

/// How one entity will be fetched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PagePlan {
    pub pages: usize,
    pub stream: bool,
}

/// Plan the fetch for an entity with `count` records.
///
/// Page count is `ceil(count / page_size)`, never below 1: an empty
/// entity still issues one request so its flat file gets written.
pub fn plan(count: usize, page_size: usize, stream_threshold: usize) -> PagePlan {
    let page_size = page_size.max(1);
    let pages = count.div_ceil(page_size).max(1);
    PagePlan {
        pages,
        stream: pages > stream_threshold,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_entity_still_gets_one_page() {
        assert_eq!(
            plan(0, 5000, 10),
            PagePlan {
                pages: 1,
                stream: false
            }
        );
    }

    #[test]
    fn exact_multiple_does_not_round_up() {
        assert_eq!(plan(10_000, 5000, 10).pages, 2);
        assert_eq!(plan(10_001, 5000, 10).pages, 3);
    }

    #[test]
    fn crossing_threshold_switches_to_stream() {
        // 10 pages is paged, 11 is streamed
        assert!(!plan(50_000, 5000, 10).stream);
        assert!(plan(50_001, 5000, 10).stream);
    }

    #[test]
    fn zero_page_size_is_guarded() {
        let plan = plan(7, 0, 10);
        assert_eq!(plan.pages, 7);
    }
}
