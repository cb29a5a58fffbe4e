//! Background worker for asynchronous persistence.
//!
//! Container writes submitted with the `*_async` methods run on a single
//! named thread in submission order. Every submission returns a
//! [`PersistHandle`] that delivers the outcome; a failure nobody observes is
//! logged.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::thread::{self, JoinHandle};

use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::error::Error;

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Completion handle for a submitted job.
///
/// Either block on it with [`wait`](Self::wait) or `.await` it.
#[derive(Debug)]
pub struct PersistHandle<T> {
    rx: oneshot::Receiver<Result<T, Error>>,
}

impl<T> PersistHandle<T> {
    /// A handle that is already complete.
    pub(crate) fn ready(result: Result<T, Error>) -> Self {
        let (tx, rx) = oneshot::channel();
        // The receiver is alive, so the send cannot fail.
        let _ = tx.send(result);
        Self { rx }
    }

    /// Block until the job finishes.
    ///
    /// Must not be called from within an async runtime; await the handle
    /// there instead.
    pub fn wait(self) -> Result<T, Error> {
        self.rx
            .blocking_recv()
            .unwrap_or(Err(Error::WorkerUnavailable))
    }

    /// The result, if the job has finished.
    pub fn try_result(&mut self) -> Option<Result<T, Error>> {
        match self.rx.try_recv() {
            Ok(result) => Some(result),
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => Some(Err(Error::WorkerUnavailable)),
        }
    }
}

impl<T> Future for PersistHandle<T> {
    type Output = Result<T, Error>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.get_mut().rx)
            .poll(cx)
            .map(|received| received.unwrap_or(Err(Error::WorkerUnavailable)))
    }
}

/// Single-threaded FIFO executor for persistence jobs.
pub struct PersistWorker {
    /// Job queue. Dropping the sender lets the thread drain and exit.
    sender: Mutex<Option<mpsc::UnboundedSender<Job>>>,
    /// Worker thread handle.
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl PersistWorker {
    /// Start the worker thread.
    pub fn start(thread_name: &str) -> Result<Self, Error> {
        let (sender, mut receiver) = mpsc::unbounded_channel::<Job>();

        let handle = thread::Builder::new()
            .name(thread_name.to_string())
            .spawn(move || {
                while let Some(job) = receiver.blocking_recv() {
                    job();
                }
                debug!("persistence worker stopped");
            })?;

        debug!(thread = %thread_name, "started persistence worker");
        Ok(Self {
            sender: Mutex::new(Some(sender)),
            handle: Mutex::new(Some(handle)),
        })
    }

    /// Queue a job and return its completion handle.
    pub fn submit<T, F>(&self, job: F) -> PersistHandle<T>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T, Error> + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let wrapped: Job = Box::new(move || {
            if let Err(Err(e)) = tx.send(job()) {
                warn!(error = %e, "unobserved asynchronous persistence failure");
            }
        });

        let sent = match self.sender.lock().as_ref() {
            Some(sender) => sender.send(wrapped).is_ok(),
            None => false,
        };
        if sent {
            PersistHandle { rx }
        } else {
            PersistHandle::ready(Err(Error::WorkerUnavailable))
        }
    }

    /// Stop accepting jobs, run the queued ones and wait for the thread.
    ///
    /// Called from the worker thread itself, the thread is detached instead
    /// and exits once its queue is empty.
    pub fn stop(&self) {
        self.sender.lock().take();
        if let Some(handle) = self.handle.lock().take() {
            if handle.thread().id() == thread::current().id() {
                return;
            }
            if handle.join().is_err() {
                warn!("persistence worker panicked");
            }
        }
    }

    /// Check if the worker is still running.
    pub fn is_running(&self) -> bool {
        self.handle
            .lock()
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }
}

impl Drop for PersistWorker {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for PersistWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistWorker")
            .field("running", &self.is_running())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[test]
    fn test_jobs_run_in_order() {
        let worker = PersistWorker::start("rowbind-test").unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let handles: Vec<_> = (0..10)
            .map(|i| {
                let seen = Arc::clone(&seen);
                worker.submit(move || {
                    seen.lock().push(i);
                    Ok(i)
                })
            })
            .collect();

        let results: Vec<i32> = handles.into_iter().map(|h| h.wait().unwrap()).collect();
        assert_eq!(results, (0..10).collect::<Vec<_>>());
        assert_eq!(*seen.lock(), (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn test_errors_reach_handle() {
        let worker = PersistWorker::start("rowbind-test").unwrap();
        let handle = worker.submit(|| -> Result<(), Error> {
            Err(Error::InvalidData("bad".into()))
        });
        assert!(matches!(handle.wait(), Err(Error::InvalidData(_))));
    }

    #[test]
    fn test_stop_drains_queue() {
        let worker = PersistWorker::start("rowbind-test").unwrap();
        let count = Arc::new(Mutex::new(0));
        for _ in 0..5 {
            let count = Arc::clone(&count);
            drop(worker.submit(move || {
                *count.lock() += 1;
                Ok(())
            }));
        }
        worker.stop();

        assert_eq!(*count.lock(), 5);
        assert!(!worker.is_running());
        assert!(matches!(
            worker.submit(|| Ok(())).wait(),
            Err(Error::WorkerUnavailable)
        ));
    }

    #[test]
    fn test_ready_handle() {
        let mut handle = PersistHandle::ready(Ok(3));
        assert_eq!(handle.try_result().map(|r| r.unwrap()), Some(3));
    }

    #[tokio::test]
    async fn test_handle_is_awaitable() {
        let worker = PersistWorker::start("rowbind-test").unwrap();
        let value = worker.submit(|| Ok("done")).await.unwrap();
        assert_eq!(value, "done");
    }
}
