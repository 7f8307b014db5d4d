//! Fixed set of worker threads running whole simulations from a shared queue.

use std::{
    io,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    thread::{self, JoinHandle},
};

use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use tracing::{debug, info, warn};

use crate::{
    engine::{CancellationToken, SimulationError},
    service::{SearchService, SimulationOutput, SimulationRequest},
};

type JobResult = Result<SimulationOutput, SimulationError>;

struct Job {
    id: u64,
    request: SimulationRequest,
    cancel: CancellationToken,
    reply: Sender<JobResult>,
}

/// Caller's side of a submitted job.
pub struct JobHandle {
    id: u64,
    cancel: CancellationToken,
    result: Receiver<JobResult>,
}

impl JobHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Request cancellation; the worker stops at the next tick boundary.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Block until the job finishes.
    pub fn wait(self) -> JobResult {
        self.result.recv().unwrap_or(Err(SimulationError::PoolClosed))
    }
}

pub struct SimulationPool {
    jobs: Option<Sender<Job>>,
    workers: Vec<JoinHandle<()>>,
    next_id: AtomicU64,
}

impl SimulationPool {
    pub fn new(service: Arc<SearchService>, worker_count: usize) -> io::Result<Self> {
        let (sender, receiver) = unbounded::<Job>();
        let workers = (0..worker_count.max(1))
            .map(|index| {
                let receiver = receiver.clone();
                let service = Arc::clone(&service);
                thread::Builder::new()
                    .name(format!("sar-worker-{index}"))
                    .spawn(move || worker_loop(index, &service, &receiver))
            })
            .collect::<io::Result<Vec<_>>>()?;
        info!(target: "sar::service", workers = workers.len(), "pool.started");
        Ok(Self {
            jobs: Some(sender),
            workers,
            next_id: AtomicU64::new(1),
        })
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    pub fn submit(&self, request: SimulationRequest) -> Result<JobHandle, SimulationError> {
        let jobs = self.jobs.as_ref().ok_or(SimulationError::PoolClosed)?;
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let cancel = CancellationToken::new();
        let (reply, result) = bounded(1);
        jobs.send(Job {
            id,
            request,
            cancel: cancel.clone(),
            reply,
        })
        .map_err(|_| SimulationError::PoolClosed)?;
        Ok(JobHandle { id, cancel, result })
    }

    /// Stop accepting jobs, let queued jobs drain, and join the workers.
    pub fn shutdown(mut self) {
        self.close();
    }

    fn close(&mut self) {
        self.jobs.take();
        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                warn!(target: "sar::service", "pool.worker_panicked");
            }
        }
    }
}

impl Drop for SimulationPool {
    fn drop(&mut self) {
        self.close();
    }
}

fn worker_loop(index: usize, service: &SearchService, jobs: &Receiver<Job>) {
    while let Ok(job) = jobs.recv() {
        debug!(target: "sar::service", worker = index, job = job.id, "pool.job_started");
        let result = if job.cancel.is_cancelled() {
            Err(SimulationError::Cancelled { completed_ticks: 0 })
        } else {
            service.simulate(&job.request, Some(&job.cancel))
        };
        if let Err(err) = &result {
            debug!(
                target: "sar::service",
                worker = index,
                job = job.id,
                error = %err,
                "pool.job_failed"
            );
        }
        // the caller may have dropped its handle
        let _ = job.reply.send(result);
    }
    debug!(target: "sar::service", worker = index, "pool.worker_stopped");
}
