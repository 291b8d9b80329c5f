//! Active school-year lookup.
//!
//! Asks the SIS which yearid covers today's year range. The server not
//! knowing is survivable: the id falls back to local calendar
//! arithmetic, logged so the discrepancy is visible.

use chrono::NaiveDate;
use serde_json::{Value, json};

use sispull_core::{Outcome, RequestDescriptor};

use crate::stage::QueryStage;
use crate::year;

pub struct YearIdStage {
    year_id_url: String,
    today: NaiveDate,
    rollover: (u32, u32),
}

impl YearIdStage {
    pub fn new(year_id_url: &str, today: NaiveDate, rollover: (u32, u32)) -> Self {
        Self {
            year_id_url: year_id_url.to_string(),
            today,
            rollover,
        }
    }
}

impl QueryStage for YearIdStage {
    fn name(&self) -> &str {
        "yearid"
    }

    fn prepare(&mut self, _acc: &Value) -> (Value, Vec<RequestDescriptor>) {
        let range = year::year_range(self.today, self.rollover);
        let desc = RequestDescriptor::new(self.year_id_url.clone(), "yearid")
            .with_payload(json!({ "yearrange": range }));
        (json!({}), vec![desc])
    }

    fn fold(&mut self, outcome: Outcome, _desc: &RequestDescriptor) -> Value {
        let server_id = outcome
            .json()
            .and_then(|body| body["record"][0]["yearid"].as_i64());
        match server_id {
            Some(id) => json!({ "yearid": id }),
            None => {
                let id = year::fallback_year_id(self.today, self.rollover);
                log::warn!("year query returned no yearid, falling back to {id}");
                json!({ "yearid": id })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sispull_core::OutcomeBody;

    fn stage() -> YearIdStage {
        YearIdStage::new(
            "/ws/schema/query/org.district.terms.yearid",
            NaiveDate::from_ymd_opt(2026, 9, 1).unwrap(),
            (8, 1),
        )
    }

    fn outcome(body: &str) -> Outcome {
        Outcome {
            status: 200,
            body: OutcomeBody::Text(body.to_string()),
        }
    }

    #[test]
    fn prepare_sends_current_year_range() {
        let mut stage = stage();
        let (_, descs) = stage.prepare(&json!({}));
        assert_eq!(
            descs[0].payload,
            Some(json!({ "yearrange": "2026-2027" }))
        );
    }

    #[test]
    fn fold_reads_first_record() {
        let mut stage = stage();
        let desc = RequestDescriptor::new("/y", "yearid");
        let folded = stage.fold(outcome(r#"{"record": [{"yearid": 36}]}"#), &desc);
        assert_eq!(folded, json!({ "yearid": 36 }));
    }

    #[test]
    fn fold_falls_back_when_record_is_missing() {
        let mut stage = stage();
        let desc = RequestDescriptor::new("/y", "yearid");
        let folded = stage.fold(outcome(r#"{"record": []}"#), &desc);
        assert_eq!(folded, json!({ "yearid": 36 }));
    }
}
