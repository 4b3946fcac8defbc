use super::dispatcher::{DispatchError, Dispatcher, JobMessage};
use crate::models::JobType;
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use tokio::sync::Mutex;
use tracing::debug;
use tracing_attributes::instrument;

/// In-process transport: one FIFO per stage that workers poll over HTTP.
///
/// Messages of a stage nobody serves are refused instead of piling up, which
/// turns them into failed jobs on the orchestrator side.
#[derive(Debug)]
pub struct WorkerQueue {
    enabled_stages: BTreeSet<JobType>,
    queues: Mutex<BTreeMap<JobType, VecDeque<JobMessage>>>,
}

impl WorkerQueue {
    pub fn new(enabled_stages: BTreeSet<JobType>) -> Self {
        Self {
            enabled_stages,
            queues: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn is_enabled(&self, job_type: JobType) -> bool {
        self.enabled_stages.contains(&job_type)
    }

    /// Takes the oldest message of `job_type`, if any.
    #[instrument(skip(self))]
    pub async fn next(&self, job_type: JobType) -> Option<JobMessage> {
        let mut queues = self.queues.lock().await;
        queues.get_mut(&job_type).and_then(VecDeque::pop_front)
    }

    #[cfg(test)]
    pub async fn len(&self, job_type: JobType) -> usize {
        let queues = self.queues.lock().await;
        queues.get(&job_type).map_or(0, VecDeque::len)
    }
}

#[async_trait]
impl Dispatcher for WorkerQueue {
    #[instrument(skip(self, message), fields(job_id = message.job_id, job_type = %message.job_type()))]
    async fn dispatch(&self, message: JobMessage) -> Result<(), DispatchError> {
        let job_type = message.job_type();
        if !self.is_enabled(job_type) {
            return Err(DispatchError::StageDisabled { job_type });
        }

        let mut queues = self.queues.lock().await;
        let queue = queues.entry(job_type).or_default();
        queue.push_back(message);
        debug!("{} {} jobs waiting for a worker", queue.len(), job_type);

        Ok(())
    }
}
