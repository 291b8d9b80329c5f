//! Sispull Queries - Staged pulls against the SIS query API
//!
//! Token exchange, school-year resolution, per-entity record counts,
//! and the paged/streamed data fetch that materializes each entity as
//! a tab-delimited flat file.

pub mod classify;
pub mod client;
pub mod paging;
pub mod runner;
pub mod stage;
pub mod stages;
pub mod year;

pub use client::{ClientConfig, short_name};
pub use paging::{PagePlan, plan};
pub use runner::{PullOptions, run_pull, select_entities};
pub use stage::{QueryStage, StagePolicy, run_stage};
