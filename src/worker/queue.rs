//! Single-writer FIFO of state transition requests.
//!
//! One dedicated thread drains the queue strictly in submission order: lock,
//! pop front, unlock, process, repeat. It parks on a condition variable while
//! the queue is empty. [`StateTransitionQueue::terminate`] clears the running
//! flag under the same lock and wakes the worker, which exits after the request
//! in hand. Requests still queued at that point are handed back to the
//! processor as rejected with reason `"shutdown"`.
//!
//! A panic while processing one request is caught and reported as
//! `"internal_error"`; the worker moves on to the next request.

use super::messages::StateTransitionRequest;
use crate::domain::error::{LifecycleError, Result};
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Reason reported for a request whose processing panicked.
pub const INTERNAL_ERROR: &str = "internal_error";

/// Consumer of dequeued requests, owned by the worker thread.
pub trait TransitionProcessor: Send + 'static {
    /// Runs one request to completion or failure.
    fn process(&mut self, request: &StateTransitionRequest);

    /// Reports a request that will not be processed.
    fn reject(&mut self, request: &StateTransitionRequest, reason: &str);
}

struct QueueState {
    requests: VecDeque<StateTransitionRequest>,
    running: bool,
}

struct Shared {
    state: Mutex<QueueState>,
    available: Condvar,
}

/// Global request queue with its worker thread.
pub struct StateTransitionQueue {
    shared: Arc<Shared>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl StateTransitionQueue {
    /// Spawns the worker thread around `processor`.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the thread cannot be spawned.
    pub fn start<P: TransitionProcessor>(processor: P) -> Result<Self> {
        let shared = Arc::new(Shared {
            state: Mutex::new(QueueState {
                requests: VecDeque::new(),
                running: true,
            }),
            available: Condvar::new(),
        });

        let worker_shared = Arc::clone(&shared);
        let handle = thread::Builder::new()
            .name("lifecycle-worker".to_string())
            .spawn(move || run_worker(&worker_shared, processor))?;

        Ok(Self {
            shared,
            worker: Mutex::new(Some(handle)),
        })
    }

    /// Appends a request.
    ///
    /// # Errors
    ///
    /// `ShuttingDown` once [`terminate`](Self::terminate) has been called.
    pub fn submit(&self, request: StateTransitionRequest) -> Result<()> {
        let mut state = self.shared.state.lock();
        if !state.running {
            return Err(LifecycleError::ShuttingDown);
        }
        tracing::debug!(
            app_instance_id = %request.app_instance_id(),
            request_type = %request.request_type,
            target_state = %request.target_state,
            depth = state.requests.len(),
            "request enqueued"
        );
        state.requests.push_back(request);
        drop(state);
        self.shared.available.notify_one();
        Ok(())
    }

    /// Number of requests waiting, excluding the one being processed.
    pub fn len(&self) -> usize {
        self.shared.state.lock().requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_running(&self) -> bool {
        self.shared.state.lock().running
    }

    /// Stops accepting requests and joins the worker.
    ///
    /// Safe to call more than once and from the worker thread itself, in
    /// which case the join is skipped.
    pub fn terminate(&self) {
        {
            let mut state = self.shared.state.lock();
            state.running = false;
        }
        self.shared.available.notify_all();

        let Some(handle) = self.worker.lock().take() else {
            return;
        };
        if handle.thread().id() == thread::current().id() {
            return;
        }
        if handle.join().is_err() {
            tracing::error!("lifecycle worker thread panicked outside request processing");
        }
    }
}

impl Drop for StateTransitionQueue {
    fn drop(&mut self) {
        self.terminate();
    }
}

impl std::fmt::Debug for StateTransitionQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.shared.state.lock();
        f.debug_struct("StateTransitionQueue")
            .field("queued", &state.requests.len())
            .field("running", &state.running)
            .finish()
    }
}

fn run_worker<P: TransitionProcessor>(shared: &Shared, mut processor: P) {
    tracing::debug!("lifecycle worker started");
    loop {
        let request = {
            let mut state = shared.state.lock();
            loop {
                if !state.running {
                    let abandoned: Vec<_> = state.requests.drain(..).collect();
                    drop(state);
                    for request in &abandoned {
                        processor.reject(request, LifecycleError::ShuttingDown.reason());
                    }
                    tracing::debug!(abandoned = abandoned.len(), "lifecycle worker stopped");
                    return;
                }
                if let Some(request) = state.requests.pop_front() {
                    break request;
                }
                shared.available.wait(&mut state);
            }
        };

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| processor.process(&request)));
        if let Err(payload) = outcome {
            let message = payload
                .downcast_ref::<&str>()
                .map(ToString::to_string)
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_default();
            tracing::error!(
                app_instance_id = %request.app_instance_id(),
                request_type = %request.request_type,
                panic = %message,
                "request processing panicked"
            );
            processor.reject(&request, INTERNAL_ERROR);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ApplicationContext, LifecycleState, LiveContext, RequestType};
    use crossbeam_channel::{unbounded, Receiver, Sender};
    use std::time::Duration;

    struct Recorder {
        tx: Sender<(String, String)>,
        delay: Duration,
    }

    impl TransitionProcessor for Recorder {
        fn process(&mut self, request: &StateTransitionRequest) {
            thread::sleep(self.delay);
            if request.app_id() == "com.test.panic" {
                panic!("boom");
            }
            let _ = self.tx.send((request.app_id().to_string(), String::new()));
        }

        fn reject(&mut self, request: &StateTransitionRequest, reason: &str) {
            let _ = self.tx.send((request.app_id().to_string(), reason.to_string()));
        }
    }

    fn request(app_id: &str) -> StateTransitionRequest {
        let mut record = ApplicationContext::new(app_id);
        record.assign_instance_id(format!("{app_id}-1")).unwrap();
        StateTransitionRequest::new(
            LiveContext::new(record).unwrap(),
            RequestType::Launch,
            LifecycleState::Loading,
        )
    }

    fn recorder(delay: Duration) -> (Recorder, Receiver<(String, String)>) {
        let (tx, rx) = unbounded();
        (Recorder { tx, delay }, rx)
    }

    #[test]
    fn requests_are_processed_in_submission_order() {
        let (processor, rx) = recorder(Duration::ZERO);
        let queue = StateTransitionQueue::start(processor).unwrap();
        for app in ["a", "b", "c", "d"] {
            queue.submit(request(app)).unwrap();
        }
        let seen: Vec<_> = (0..4)
            .map(|_| rx.recv_timeout(Duration::from_secs(5)).unwrap().0)
            .collect();
        assert_eq!(seen, vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn panic_is_reported_and_worker_survives() {
        let (processor, rx) = recorder(Duration::ZERO);
        let queue = StateTransitionQueue::start(processor).unwrap();
        queue.submit(request("com.test.panic")).unwrap();
        queue.submit(request("com.test.after")).unwrap();

        let first = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(first, ("com.test.panic".to_string(), INTERNAL_ERROR.to_string()));
        let second = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(second, ("com.test.after".to_string(), String::new()));
    }

    #[test]
    fn submit_after_terminate_is_refused() {
        let (processor, _rx) = recorder(Duration::ZERO);
        let queue = StateTransitionQueue::start(processor).unwrap();
        queue.terminate();
        assert!(!queue.is_running());
        let err = queue.submit(request("late")).unwrap_err();
        assert_eq!(err.reason(), "shutdown");
        queue.terminate();
    }

    #[test]
    fn queued_requests_are_rejected_on_terminate() {
        let (processor, rx) = recorder(Duration::from_millis(100));
        let queue = StateTransitionQueue::start(processor).unwrap();
        queue.submit(request("first")).unwrap();
        while !queue.is_empty() {
            thread::sleep(Duration::from_millis(1));
        }
        queue.submit(request("second")).unwrap();
        queue.submit(request("third")).unwrap();
        queue.terminate();

        let got: Vec<_> = rx.try_iter().collect();
        assert_eq!(
            got,
            vec![
                ("first".to_string(), String::new()),
                ("second".to_string(), "shutdown".to_string()),
                ("third".to_string(), "shutdown".to_string()),
            ]
        );
    }
}
