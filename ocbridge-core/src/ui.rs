//! UI-affinity rendezvous
//!
//! Some host collaborators (preference storage on mobile platforms, for one)
//! may only be touched from a single UI thread. [`UiContext`] owns such a
//! thread and runs posted closures in order; [`UiHandle::run_sync`] posts a
//! closure and blocks the caller on a one-shot completion until it has run.
//!
//! The UI thread never waits on the driver worker, so a worker blocked in
//! `run_sync` always gets released once its job reaches the front of the
//! queue. Calling `run_sync` from the UI thread itself runs the closure
//! inline instead of queueing behind itself.
//!
//! `run_sync` blocks the calling thread and must not be called from inside an
//! async runtime.

use crate::error::UiError;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, OnceLock};
use std::thread::{self, JoinHandle, ThreadId};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error};

type Job = Box<dyn FnOnce() + Send + 'static>;

enum Message {
    Run(Job),
    Stop,
}

/// Cloneable handle for posting work to the UI thread
#[derive(Clone)]
pub struct UiHandle {
    sender: mpsc::UnboundedSender<Message>,
    ui_thread: Arc<OnceLock<ThreadId>>,
}

impl UiHandle {
    /// Queue `f` on the UI thread without waiting for it
    pub fn post<F>(&self, f: F) -> Result<(), UiError>
    where
        F: FnOnce() + Send + 'static,
    {
        self.sender
            .send(Message::Run(Box::new(f)))
            .map_err(|_| UiError::Closed)
    }

    /// Run `f` on the UI thread and wait for its result
    pub fn run_sync<T, F>(&self, f: F) -> Result<T, UiError>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        if self.is_ui_thread() {
            return Ok(f());
        }

        let (done_tx, done_rx) = oneshot::channel();
        self.post(move || {
            let _ = done_tx.send(f());
        })?;

        done_rx.blocking_recv().map_err(|_| UiError::Dropped)
    }

    /// Whether the caller is running on the UI thread
    pub fn is_ui_thread(&self) -> bool {
        self.ui_thread.get() == Some(&thread::current().id())
    }
}

/// Owner of the UI thread
pub struct UiContext {
    handle: UiHandle,
    thread: Option<JoinHandle<()>>,
}

impl UiContext {
    /// Start the UI thread
    pub fn spawn() -> std::io::Result<Self> {
        let (sender, mut receiver) = mpsc::unbounded_channel::<Message>();
        let ui_thread = Arc::new(OnceLock::new());
        let id_slot = Arc::clone(&ui_thread);

        let thread = thread::Builder::new()
            .name("ocbridge-ui".to_string())
            .spawn(move || {
                let _ = id_slot.set(thread::current().id());

                while let Some(message) = receiver.blocking_recv() {
                    match message {
                        Message::Run(job) => {
                            if catch_unwind(AssertUnwindSafe(job)).is_err() {
                                error!("UI task panicked");
                            }
                        }
                        Message::Stop => break,
                    }
                }

                debug!("UI context stopped");
            })?;

        Ok(Self {
            handle: UiHandle { sender, ui_thread },
            thread: Some(thread),
        })
    }

    pub fn handle(&self) -> UiHandle {
        self.handle.clone()
    }

    /// Stop the UI thread after the work already queued and wait for it
    ///
    /// Jobs posted afterwards fail with [`UiError::Closed`].
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        let _ = self.handle.sender.send(Message::Stop);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("UI thread terminated abnormally");
            }
        }
    }
}

impl Drop for UiContext {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[test]
    fn test_run_sync_runs_on_ui_thread() {
        let ui = UiContext::spawn().unwrap();
        let handle = ui.handle();

        let name = handle
            .run_sync(|| thread::current().name().map(str::to_string))
            .unwrap();
        assert_eq!(name.as_deref(), Some("ocbridge-ui"));
        assert!(!handle.is_ui_thread());
    }

    #[test]
    fn test_nested_run_sync_does_not_deadlock() {
        let ui = UiContext::spawn().unwrap();
        let handle = ui.handle();
        let inner = handle.clone();

        let value = handle
            .run_sync(move || inner.run_sync(|| 42).unwrap())
            .unwrap();
        assert_eq!(value, 42);
    }

    #[test]
    fn test_many_workers_rendezvous() {
        let ui = UiContext::spawn().unwrap();
        let counter = Arc::new(AtomicUsize::new(0));

        let workers: Vec<_> = (0..8)
            .map(|i| {
                let handle = ui.handle();
                let counter = Arc::clone(&counter);
                thread::spawn(move || {
                    for _ in 0..25 {
                        let counter = Arc::clone(&counter);
                        let got = handle
                            .run_sync(move || {
                                counter.fetch_add(1, Ordering::SeqCst);
                                i
                            })
                            .unwrap();
                        assert_eq!(got, i);
                    }
                })
            })
            .collect();

        for worker in workers {
            worker.join().unwrap();
        }
        assert_eq!(counter.load(Ordering::SeqCst), 200);
    }

    #[test]
    fn test_post_after_shutdown_is_closed() {
        let ui = UiContext::spawn().unwrap();
        let handle = ui.handle();
        ui.shutdown();

        assert_eq!(handle.post(|| {}), Err(UiError::Closed));
        assert_eq!(handle.run_sync(|| 1), Err(UiError::Closed));
    }

    #[test]
    fn test_panicking_task_reports_dropped_and_ui_survives() {
        let ui = UiContext::spawn().unwrap();
        let handle = ui.handle();

        let result: Result<(), UiError> = handle.run_sync(|| panic!("boom"));
        assert_eq!(result, Err(UiError::Dropped));

        // Queued work still runs afterwards
        let (tx, rx) = std::sync::mpsc::channel();
        handle.post(move || tx.send(7).unwrap()).unwrap();
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), 7);
    }
}
