use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::app::logging::ActivityLog;

type Completion<S> = Box<dyn FnOnce(&mut S) + Send>;

/// Runs each unit of work on its own short-lived thread and hands the result back to the
/// coordination thread, which applies it to `S` during [`TaskDispatcher::pump`].
///
/// There is no pool and no queue: every `submit` spawns immediately. Workers never touch `S`;
/// they return an owned value and the completion closure is the only code that mutates state.
pub struct TaskDispatcher<S> {
    sender: Sender<Completion<S>>,
    receiver: Receiver<Completion<S>>,
    pending: Arc<AtomicUsize>,
    log: ActivityLog,
}

impl<S: 'static> TaskDispatcher<S> {
    pub fn new(log: ActivityLog) -> Self {
        let (sender, receiver) = mpsc::channel();
        Self {
            sender,
            receiver,
            pending: Arc::new(AtomicUsize::new(0)),
            log,
        }
    }

    pub fn submit<T, W, C>(&self, label: &str, work: W, complete: C)
    where
        T: Send + 'static,
        W: FnOnce() -> T + Send + 'static,
        C: FnOnce(&mut S, T) + Send + 'static,
    {
        self.pending.fetch_add(1, Ordering::SeqCst);
        let sender = self.sender.clone();
        let log = self.log.clone();
        let task_label = label.to_string();
        let spawned = std::thread::Builder::new()
            .name(format!("task-{label}"))
            .spawn(move || {
                debug!(task = %task_label, "task started");
                let completion: Completion<S> = match catch_unwind(AssertUnwindSafe(work)) {
                    Ok(value) => Box::new(move |state: &mut S| complete(state, value)),
                    Err(_) => {
                        warn!(task = %task_label, "task panicked");
                        log.log(format!("{task_label} failed unexpectedly."));
                        Box::new(|_: &mut S| {})
                    }
                };
                // The receiver only disappears at shutdown; nothing is left to update then.
                let _ = sender.send(completion);
            });
        if let Err(err) = spawned {
            self.pending.fetch_sub(1, Ordering::SeqCst);
            warn!(task = %label, error = %err, "failed to spawn task thread");
            self.log.log(format!("Failed to start {label}: {err}"));
        }
    }

    /// Work with nothing to apply afterwards.
    pub fn submit_detached<W>(&self, label: &str, work: W)
    where
        W: FnOnce() + Send + 'static,
    {
        self.submit(label, work, |_: &mut S, ()| {});
    }

    /// Applies every completion that is ready, without blocking. Returns how many ran.
    pub fn pump(&self, state: &mut S) -> usize {
        let mut applied = 0;
        while let Ok(completion) = self.receiver.try_recv() {
            self.apply(completion, state);
            applied += 1;
        }
        applied
    }

    /// Blocks until every submitted task has completed or `timeout` elapses.
    pub fn wait_idle(&self, state: &mut S, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while self.pending() > 0 {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return false;
            }
            match self.receiver.recv_timeout(remaining) {
                Ok(completion) => self.apply(completion, state),
                Err(RecvTimeoutError::Timeout) => return false,
                Err(RecvTimeoutError::Disconnected) => return false,
            }
        }
        true
    }

    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    fn apply(&self, completion: Completion<S>, state: &mut S) {
        completion(state);
        self.pending.fetch_sub(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::logging::MemorySink;
    use std::sync::Barrier;
    use std::thread;

    #[test]
    fn completions_run_on_the_pumping_thread() {
        let dispatcher: TaskDispatcher<Vec<thread::ThreadId>> =
            TaskDispatcher::new(ActivityLog::new());
        for _ in 0..4 {
            dispatcher.submit(
                "probe",
                || thread::current().id(),
                |seen: &mut Vec<thread::ThreadId>, worker| {
                    assert_ne!(worker, thread::current().id());
                    seen.push(thread::current().id());
                },
            );
        }

        let mut seen = Vec::new();
        assert!(dispatcher.wait_idle(&mut seen, Duration::from_secs(5)));
        assert_eq!(seen.len(), 4);
        assert!(seen.iter().all(|id| *id == thread::current().id()));
        assert_eq!(dispatcher.pending(), 0);
    }

    #[test]
    fn workers_are_not_pooled() {
        // Eight tasks that can only finish once all eight are running at the same time.
        let dispatcher: TaskDispatcher<usize> = TaskDispatcher::new(ActivityLog::new());
        let barrier = Arc::new(Barrier::new(8));
        for _ in 0..8 {
            let barrier = Arc::clone(&barrier);
            dispatcher.submit(
                "rendezvous",
                move || {
                    barrier.wait();
                },
                |done: &mut usize, ()| *done += 1,
            );
        }
        let mut done = 0usize;
        assert!(dispatcher.wait_idle(&mut done, Duration::from_secs(5)));
        assert_eq!(done, 8);
    }

    #[test]
    fn panicking_work_is_reported_once_and_not_applied() {
        let sink = MemorySink::new();
        let dispatcher: TaskDispatcher<u32> = TaskDispatcher::new(ActivityLog::attached(sink.clone()));
        dispatcher.submit(
            "Fetch applications",
            || -> u32 { panic!("boom") },
            |state: &mut u32, value| *state = value,
        );

        let mut state = 7u32;
        assert!(dispatcher.wait_idle(&mut state, Duration::from_secs(5)));
        assert_eq!(state, 7);
        assert_eq!(
            sink.messages(),
            vec!["Fetch applications failed unexpectedly.".to_string()]
        );
    }

    #[test]
    fn pump_does_not_block_when_nothing_is_ready() {
        let dispatcher: TaskDispatcher<()> = TaskDispatcher::new(ActivityLog::new());
        let started = Instant::now();
        assert_eq!(dispatcher.pump(&mut ()), 0);
        assert!(started.elapsed() < Duration::from_millis(500));
    }
}
