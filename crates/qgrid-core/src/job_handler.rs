//! Job handlers: how a batch of quantization jobs gets executed

use tracing::debug;

use crate::error::{QuantizeError, Result};
use crate::job::QuantizationJob;

/// Trait for job execution strategies.
///
/// Implementations run every job and hand the batch back sorted by `job_id`.
pub trait JobHandler: Send + Sync {
    fn name(&self) -> &str;
    fn handle(&self, jobs: Vec<QuantizationJob>) -> Result<Vec<QuantizationJob>>;
}

/// Runs each job in turn on the calling thread
#[derive(Debug, Clone, Copy, Default)]
pub struct SerialJobHandler;

impl JobHandler for SerialJobHandler {
    fn name(&self) -> &str {
        "Serial"
    }

    fn handle(&self, mut jobs: Vec<QuantizationJob>) -> Result<Vec<QuantizationJob>> {
        debug!(jobs = jobs.len(), "Running quantization jobs serially");
        for job in &mut jobs {
            let job_id = job.job_id();
            job.run().map_err(|e| QuantizeError::JobFailed { job_id, reason: e.to_string() })?;
        }
        jobs.sort_by_key(QuantizationJob::job_id);
        Ok(jobs)
    }
}
