//! End-to-end acquisition runs over the wanted catalog.
//!
//! A run pulls unresolved wanted records, creates (or reuses) one task per
//! record and drives it through search, selection and submission. What
//! happens after the download client accepts a transfer belongs to the
//! poller.

mod runner;
mod types;

pub use runner::{build_query, should_skip, AcquisitionPipeline, NO_CANDIDATES_ERROR};
pub use types::{CancelFlag, PipelineError, PlanEntry, RunOptions, RunReport, RunStats};
