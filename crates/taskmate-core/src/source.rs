use std::future::Future;

use crate::record::{FocusSession, Task};

/// Read side of the record backend: full-set fetch, no pagination.
pub trait RecordSource {
    fn fetch_tasks(&self) -> impl Future<Output = anyhow::Result<Vec<Task>>> + Send;

    fn fetch_sessions(&self) -> impl Future<Output = anyhow::Result<Vec<FocusSession>>> + Send;
}

/// Write side used when a focus session ends.
pub trait RecordSink {
    fn record_session(&self, session: &FocusSession) -> anyhow::Result<()>;
}
