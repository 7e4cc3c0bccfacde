//! Message types for dispatcher and job lifecycle events.

use std::fmt::{Display, Formatter};

use crate::observability::messages::StructuredLog;

/// A job moved to a new state.
pub struct JobStateChanged<'a> {
    pub job_id: &'a str,
    pub state: &'a str,
}

impl Display for JobStateChanged<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "job '{}' is now {}", self.job_id, self.state)
    }
}

impl StructuredLog for JobStateChanged<'_> {
    fn log(&self) {
        tracing::info!(job_id = self.job_id, state = self.state, "{}", self);
    }
}

/// A cancellation request was accepted for a job.
pub struct JobCancelled<'a> {
    pub job_id: &'a str,
}

impl Display for JobCancelled<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "job '{}' cancellation requested", self.job_id)
    }
}

impl StructuredLog for JobCancelled<'_> {
    fn log(&self) {
        tracing::warn!(job_id = self.job_id, "{}", self);
    }
}

/// The raw upload was persisted to the object store.
pub struct UploadStored<'a> {
    pub job_id: &'a str,
    pub url: &'a str,
}

impl Display for UploadStored<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "upload for job '{}' stored at {}", self.job_id, self.url)
    }
}

impl StructuredLog for UploadStored<'_> {
    fn log(&self) {
        tracing::info!(job_id = self.job_id, url = self.url, "{}", self);
    }
}
