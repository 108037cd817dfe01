//! Per-connection task serialization
//!
//! The transport delivers connect/read/close events from a shared pool of
//! I/O threads without waiting for one event to finish before dispatching the
//! next. [`TaskProcessor`] turns those concurrent callbacks into an ordered,
//! non-reentrant execution model: tasks run strictly one at a time, in FIFO
//! order, on whichever thread happens to hold the gate.

use std::collections::VecDeque;

use parking_lot::Mutex;

/// An opaque unit of work.
///
/// Tasks run synchronously on the draining thread and must not block
/// indefinitely. Panics are not caught by the processor; a task's own logic
/// is responsible for not panicking.
pub type Task = Box<dyn FnOnce() + Send>;

/// Gate condition checked before each task is executed.
///
/// When [`Condition::is_valid`] returns `false`, draining stops without
/// consuming further tasks; whoever owns the condition is responsible for
/// calling [`TaskProcessor::process_queue`] again once it becomes valid
/// (typically a "writable again" transport callback).
pub trait Condition: Send + Sync {
    /// Check the condition
    fn is_valid(&self) -> bool;
}

/// A queue plus serialization primitive for per-connection work.
///
/// `process` may be called from any thread; at most one thread drains the
/// queue at any instant and no task is lost regardless of submission timing.
pub struct TaskProcessor {
    queue: Mutex<VecDeque<Task>>,
    /// Held by the thread currently processing tasks.
    gate: Mutex<()>,
    condition: Option<Box<dyn Condition>>,
}

impl std::fmt::Debug for TaskProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskProcessor")
            .field("queued", &self.queue.lock().len())
            .field("has_condition", &self.condition.is_some())
            .finish()
    }
}

impl TaskProcessor {
    /// Create a processor with no gating condition
    pub fn new() -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            gate: Mutex::new(()),
            condition: None,
        }
    }

    /// Create a processor that checks `condition` before executing each task
    pub fn with_condition(condition: Box<dyn Condition>) -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            gate: Mutex::new(()),
            condition: Some(condition),
        }
    }

    /// Enqueue `task` and drain as much of the queue as possible
    pub fn process(&self, task: Task) {
        self.queue.lock().push_back(task);
        self.process_queue();
    }

    /// Drain as much of the queue as possible.
    ///
    /// Returns immediately when another thread already holds the gate; that
    /// thread will see any task enqueued before its emptiness check, and the
    /// post-release recheck below covers the remaining window.
    pub fn process_queue(&self) {
        loop {
            {
                let _gate = match self.gate.try_lock() {
                    Some(guard) => guard,
                    // Another thread is processing; it takes care of the queue.
                    None => return,
                };

                loop {
                    if let Some(condition) = &self.condition {
                        if !condition.is_valid() {
                            // The condition owner re-triggers processing later.
                            return;
                        }
                    }

                    let next = self.queue.lock().pop_front();
                    match next {
                        Some(task) => task(),
                        None => break,
                    }
                }
            }

            // A producer may have enqueued a task between the emptiness check
            // above and the gate release; without this recheck that task could
            // sit in the queue indefinitely.
            if self.queue.lock().is_empty() {
                return;
            }
        }
    }
}

impl Default for TaskProcessor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::{Arc, Barrier};
    use std::thread;

    #[test]
    fn test_fifo_single_producer() {
        let processor = TaskProcessor::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        for i in 0..100 {
            let order = order.clone();
            processor.process(Box::new(move || order.lock().push(i)));
        }

        assert_eq!(*order.lock(), (0..100).collect::<Vec<_>>());
    }

    #[test]
    fn test_concurrent_submissions_none_lost() {
        const THREADS: usize = 8;
        const TASKS: usize = 500;

        let processor = Arc::new(TaskProcessor::new());
        let executed = Arc::new(AtomicUsize::new(0));
        let active = Arc::new(AtomicUsize::new(0));
        let overlap = Arc::new(AtomicBool::new(false));
        let barrier = Arc::new(Barrier::new(THREADS));

        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                let processor = processor.clone();
                let executed = executed.clone();
                let active = active.clone();
                let overlap = overlap.clone();
                let barrier = barrier.clone();
                thread::spawn(move || {
                    barrier.wait();
                    for _ in 0..TASKS {
                        let executed = executed.clone();
                        let active = active.clone();
                        let overlap = overlap.clone();
                        processor.process(Box::new(move || {
                            if active.fetch_add(1, Ordering::SeqCst) != 0 {
                                overlap.store(true, Ordering::SeqCst);
                            }
                            executed.fetch_add(1, Ordering::SeqCst);
                            active.fetch_sub(1, Ordering::SeqCst);
                        }));
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        // All submitters returned, so every task has been drained.
        processor.process_queue();

        assert_eq!(executed.load(Ordering::SeqCst), THREADS * TASKS);
        assert!(!overlap.load(Ordering::SeqCst), "two tasks ran concurrently");
    }

    #[test]
    fn test_submission_during_drain_not_lost() {
        // One thread hammers process_queue while another submits; every task
        // must still execute even when submissions land in the gate-release
        // window.
        let processor = Arc::new(TaskProcessor::new());
        let executed = Arc::new(AtomicUsize::new(0));
        const TASKS: usize = 10_000;

        let drainer = {
            let processor = processor.clone();
            let executed = executed.clone();
            thread::spawn(move || {
                while executed.load(Ordering::SeqCst) < TASKS {
                    processor.process_queue();
                    std::hint::spin_loop();
                }
            })
        };

        for _ in 0..TASKS {
            let executed = executed.clone();
            processor.process(Box::new(move || {
                executed.fetch_add(1, Ordering::SeqCst);
            }));
        }

        drainer.join().unwrap();
        processor.process_queue();
        assert_eq!(executed.load(Ordering::SeqCst), TASKS);
    }

    struct Writable(Arc<AtomicBool>);

    impl Condition for Writable {
        fn is_valid(&self) -> bool {
            self.0.load(Ordering::SeqCst)
        }
    }

    #[test]
    fn test_condition_pauses_and_resumes() {
        let writable = Arc::new(AtomicBool::new(false));
        let processor = TaskProcessor::with_condition(Box::new(Writable(writable.clone())));
        let executed = Arc::new(AtomicUsize::new(0));

        for _ in 0..5 {
            let executed = executed.clone();
            processor.process(Box::new(move || {
                executed.fetch_add(1, Ordering::SeqCst);
            }));
        }
        assert_eq!(executed.load(Ordering::SeqCst), 0);

        // "Writable again" callback: condition flips, processing resumes.
        writable.store(true, Ordering::SeqCst);
        processor.process_queue();
        assert_eq!(executed.load(Ordering::SeqCst), 5);
    }
}
