//! Persisted pipeline state.
//!
//! - [`StateStore`]: per-job generation progress, checkpointed after every
//!   verified segment
//! - [`JobsLog`]: recently queued ad-hoc jobs

pub mod error;
pub mod jobs_log;
pub mod store;

pub use error::{StateError, StateResult};
pub use jobs_log::{JobsLog, LoggedJob, LoggedJobStatus, MAX_LOGGED_JOBS};
pub use store::{JsonFileStore, MemoryStore, StateStore};
