//! Core types and traits for tracking batch jobs on a poll-based cluster scheduler.
//!
//! Status records and templates are plain values; the only behavior here is status
//! classification. Backends implement [`JobSyncApi`].

mod job;
mod template;
mod traits;

pub use job::*;
pub use template::*;
pub use traits::*;
