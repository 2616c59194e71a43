use crossbeam_channel::{Receiver, Sender};
use std::sync::Arc;
use std::thread;
use std::thread::JoinHandle;
use std::time::Duration;

use crate::errors::{new_err, ErrorKind, Result};

pub mod clock;
pub mod ids;

/// Handle of a background worker thread with its termination channel.
#[derive(Debug)]
pub struct Worker {
    pub join_handle: JoinHandle<()>,
    pub terminate_worker_tx: Sender<()>,
}

impl Worker {
    /// Signals the worker and waits for it to finish.
    pub fn terminate(self) {
        self.signal_termination();
        if self.join_handle.join().is_err() {
            error!("Worker returned an error")
        }
    }

    /// Signals the worker without waiting for it.
    pub fn signal_termination(&self) {
        if self.terminate_worker_tx.send(()).is_err() {
            trace!("Termination signal skipped: worker already stopped");
        }
    }
}

pub fn run_worker<T: Send + 'static, F: Fn(T, Receiver<()>) + Send + 'static>(
    worker: F,
    params: T,
) -> Worker {
    let (terminate_worker_tx, terminate_worker_rx): (Sender<()>, Receiver<()>) =
        crossbeam_channel::bounded(1);

    let join_handle = thread::spawn(move || worker(params, terminate_worker_rx));

    Worker {
        join_handle,
        terminate_worker_tx,
    }
}

#[derive(Debug)]
pub struct WorkerPool {
    workers: Vec<Worker>,
}

impl WorkerPool {
    pub fn new(workers: Vec<Worker>) -> WorkerPool {
        WorkerPool { workers }
    }

    pub fn terminate(&self) {
        for worker in &self.workers {
            let send_result = worker.terminate_worker_tx.send(());
            if send_result.is_err() {
                error!("Cannot send termination signal")
            }
        }
    }

    pub fn join(self) {
        for worker in self.workers {
            let join_result = worker.join_handle.join();
            if join_result.is_err() {
                error!("Worker returned an error")
            }
        }
    }
}

/// Runs a storage call on a helper thread and gives up after `timeout`.
///
/// A timed out call may still complete later; callers treat it as failed.
pub(crate) fn call_with_timeout<S, T, F>(
    storage: &Arc<S>,
    timeout: Duration,
    operation: &str,
    call: F,
) -> Result<T>
where
    S: Send + Sync + 'static + ?Sized,
    T: Send + 'static,
    F: FnOnce(&S) -> Result<T> + Send + 'static,
{
    let (result_tx, result_rx) = crossbeam_channel::bounded(1);
    let storage = storage.clone();

    let spawn_result = thread::Builder::new()
        .name(format!("storage-{}", operation))
        .spawn(move || {
            let result = call(&*storage);
            let _ = result_tx.send(result);
        });

    if let Err(err) = spawn_result {
        return new_err(
            ErrorKind::BackendUnavailable,
            format!("Cannot run storage call '{}'", operation),
            err.to_string(),
        );
    }

    let timeout_rx = crossbeam_channel::after(timeout);
    select!(
        recv(result_rx) -> msg => {
            match msg {
                Ok(result) => result,
                Err(err) => new_err(
                    ErrorKind::BackendUnavailable,
                    format!("Storage call '{}' aborted", operation),
                    err.to_string(),
                ),
            }
        }
        recv(timeout_rx) -> _ => {
            new_err(
                ErrorKind::BackendUnavailable,
                format!("Storage call '{}' timed out after {:?}", operation, timeout),
                String::new(),
            )
        }
    )
}
