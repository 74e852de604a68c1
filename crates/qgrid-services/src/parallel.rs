//! Worker-pool job handler

use std::panic::{self, AssertUnwindSafe};
use std::thread;

use crossbeam_channel::{bounded, Receiver, Sender};
use qgrid_core::{JobHandler, QuantizationJob, QuantizeError};
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum JobHandlerError {
    #[error("Quantization error: {0}")]
    Quantize(#[from] QuantizeError),
    #[error("Job {job_id} panicked")]
    JobPanicked { job_id: usize },
    #[error("No result for job {job_id}: channel closed")]
    MissingResult { job_id: usize },
}

impl From<JobHandlerError> for QuantizeError {
    fn from(err: JobHandlerError) -> Self {
        match err {
            JobHandlerError::Quantize(err) => err,
            JobHandlerError::JobPanicked { job_id } | JobHandlerError::MissingResult { job_id } => {
                QuantizeError::JobFailed { job_id, reason: err.to_string() }
            }
        }
    }
}

type WorkerResult = Result<QuantizationJob, JobHandlerError>;

/// Pulls jobs off the shared queue, runs them and sends them back
pub struct ParallelJobHandlerWorker {
    id: usize,
    jobs: Receiver<QuantizationJob>,
    results: Sender<WorkerResult>,
}

impl ParallelJobHandlerWorker {
    pub fn new(id: usize, jobs: Receiver<QuantizationJob>, results: Sender<WorkerResult>) -> Self {
        Self { id, jobs, results }
    }

    /// Work until the queue closes
    pub fn run(self) {
        let mut handled = 0usize;
        for mut job in self.jobs.iter() {
            let job_id = job.job_id();
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| job.run().map(|grids| grids.len())));
            let result = match outcome {
                Ok(Ok(candidates)) => {
                    debug!(worker = self.id, job_id, candidates, "Job finished");
                    Ok(job)
                }
                Ok(Err(err)) => Err(JobHandlerError::Quantize(err)),
                Err(_) => Err(JobHandlerError::JobPanicked { job_id }),
            };
            handled += 1;
            if self.results.send(result).is_err() {
                break;
            }
        }
        debug!(worker = self.id, handled, "Worker exiting");
    }
}

/// Runs a batch of jobs on a fixed pool of scoped worker threads.
///
/// Nothing outlives a batch: workers are spawned per call and joined before
/// it returns.
#[derive(Debug, Clone, Copy)]
pub struct ParallelJobHandler {
    workers: usize,
}

impl Default for ParallelJobHandler {
    fn default() -> Self {
        let workers = thread::available_parallelism().map(|n| n.get()).unwrap_or(1);
        Self { workers }
    }
}

impl ParallelJobHandler {
    pub fn new(workers: usize) -> Self {
        Self { workers: workers.max(1) }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Run every job and return them sorted by `job_id`
    pub fn run_batch(&self, jobs: Vec<QuantizationJob>) -> Result<Vec<QuantizationJob>, JobHandlerError> {
        if jobs.is_empty() {
            return Ok(Vec::new());
        }
        let total = jobs.len();
        let workers = self.workers.min(total);
        let mut expected: Vec<usize> = jobs.iter().map(QuantizationJob::job_id).collect();
        expected.sort_unstable();

        let (job_tx, job_rx) = bounded::<QuantizationJob>(workers);
        let (result_tx, result_rx) = bounded::<WorkerResult>(total);
        info!(jobs = total, workers, "Dispatching quantization jobs");

        let results: Vec<WorkerResult> = thread::scope(move |scope| {
            let handles: Vec<_> = (0..workers)
                .map(|id| {
                    let worker = ParallelJobHandlerWorker::new(id, job_rx.clone(), result_tx.clone());
                    scope.spawn(move || worker.run())
                })
                .collect();
            drop(job_rx);
            drop(result_tx);

            for job in jobs {
                if job_tx.send(job).is_err() {
                    break;
                }
            }
            drop(job_tx);

            let results: Vec<WorkerResult> = result_rx.iter().collect();
            for (id, handle) in handles.into_iter().enumerate() {
                if handle.join().is_err() {
                    warn!(worker = id, "Worker thread panicked");
                }
            }
            results
        });

        let mut done = results.into_iter().collect::<Result<Vec<_>, _>>()?;
        done.sort_by_key(QuantizationJob::job_id);
        if let Some(job_id) = expected
            .iter()
            .zip(done.iter().map(QuantizationJob::job_id).chain(std::iter::repeat(usize::MAX)))
            .find_map(|(&want, got)| (want != got).then_some(want))
        {
            return Err(JobHandlerError::MissingResult { job_id });
        }
        Ok(done)
    }
}

impl JobHandler for ParallelJobHandler {
    fn name(&self) -> &str {
        "Parallel"
    }

    fn handle(&self, jobs: Vec<QuantizationJob>) -> qgrid_core::Result<Vec<QuantizationJob>> {
        Ok(self.run_batch(jobs)?)
    }
}
