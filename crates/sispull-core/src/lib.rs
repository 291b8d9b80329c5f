//! Sispull Core - Common infrastructure for SIS data pulls
//!
//! This crate provides reusable components for fetching, retrying,
//! and materializing student-information-system records as flat files.

pub mod error;
pub mod flatfile;
pub mod logging;
pub mod merge;
pub mod progress;
pub mod retry;
pub mod scratch;
pub mod stream;
pub mod transport;

// Re-exports for convenience
pub use error::FetchError;
pub use flatfile::append_page;
pub use logging::{IndicatifLogger, init_logging};
pub use merge::merge_value;
pub use progress::{ProgressContext, SharedProgress, fmt_num, upgrade_to_bar};
pub use retry::{backoff_duration, retry_descriptor};
pub use scratch::{
    check_and_delete, final_path, review_temporary_file, scratch_path, scratch_to_txt,
    stream_to_scratch, text_tmp_path,
};
pub use stream::{HttpConfig, SHARED_RUNTIME, StreamBody, http_config, set_http_config};
pub use transport::{Outcome, OutcomeBody, RequestDescriptor, Transport};
