//! N worker threads draining a FIFO work queue, plus a FIFO message queue
//! drained only by the thread that calls [`TaskQueue::dispatch_messages`]
//! (§4.2).
//!
//! Grounded directly in `Core/Task/TaskQueue.cpp`/`.h`: the worker loop's
//! condition-variable wait predicate, `schedule`'s single-waiter
//! `notify_one`, `dispatch_messages`'s queue-swap-then-drain (which is
//! exactly why a message posted mid-drain is deferred to the next call),
//! and `shutdown`'s flag-then-notify_all-then-join sequence all mirror the
//! source one-for-one. The source's `IMessageQueueProvider` interface
//! becomes the [`MessageSink`] trait here.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use parking_lot::{Condvar, Mutex};

/// A unit of work to run on a worker thread. Move-only, single-shot.
pub struct TaskWork {
    execute: Box<dyn FnOnce(&dyn MessageSink) + Send>,
}

impl TaskWork {
    pub fn new(execute: impl FnOnce(&dyn MessageSink) + Send + 'static) -> Self {
        TaskWork {
            execute: Box::new(execute),
        }
    }
}

/// A unit of completion code to run on the main thread during
/// [`TaskQueue::dispatch_messages`]. Move-only, single-shot.
pub struct TaskMessage {
    on_dispatch: Box<dyn FnOnce() + Send>,
}

impl TaskMessage {
    pub fn new(on_dispatch: impl FnOnce() + Send + 'static) -> Self {
        TaskMessage {
            on_dispatch: Box::new(on_dispatch),
        }
    }
}

/// Passed into a [`TaskWork`]'s `execute` closure so it can post completion
/// messages back to the main thread. Implemented by [`TaskQueue`] itself.
pub trait MessageSink {
    fn push_message(&self, message: TaskMessage);
}

struct Shared {
    work_queue: Mutex<VecDeque<TaskWork>>,
    work_available: Condvar,
    message_queue: Mutex<VecDeque<TaskMessage>>,
    exit: AtomicBool,
}

impl MessageSink for Shared {
    fn push_message(&self, message: TaskMessage) {
        self.message_queue.lock().push_back(message);
    }
}

/// Bumps this worker thread above normal priority when the `high_priority`
/// feature is enabled, matching the rest of the engine's build profile for
/// latency-sensitive background decode work. A no-op otherwise.
#[cfg(feature = "high_priority")]
fn bump_priority_if_enabled() {
    use thread_priority::{ThreadPriority, ThreadPriorityValue};
    if let Ok(value) = ThreadPriorityValue::try_from(60u8) {
        if let Err(e) = thread_priority::set_current_thread_priority(ThreadPriority::Crossplatform(value)) {
            log::warn!("failed to raise asset worker thread priority: {e:?}");
        }
    }
}

#[cfg(not(feature = "high_priority"))]
fn bump_priority_if_enabled() {}

fn worker_loop(shared: Arc<Shared>) {
    loop {
        let work = {
            let mut queue = shared.work_queue.lock();
            loop {
                if !queue.is_empty() {
                    break;
                }
                if shared.exit.load(Ordering::Acquire) {
                    return;
                }
                shared.work_available.wait(&mut queue);
            }
            // Re-check after waking: a shutdown notify_all with an empty
            // queue must still let us exit rather than pop a phantom item.
            if queue.is_empty() {
                if shared.exit.load(Ordering::Acquire) {
                    return;
                }
                continue;
            }
            queue.pop_front()
        };

        if let Some(work) = work {
            (work.execute)(shared.as_ref());
        }
    }
}

/// N worker threads plus the FIFO work/message queues they share. By
/// convention, `dispatch_messages` is called from the main thread only.
pub struct TaskQueue {
    shared: Arc<Shared>,
    workers: Vec<JoinHandle<()>>,
}

impl TaskQueue {
    /// Spawn `worker_count` worker threads immediately.
    pub fn new(worker_count: usize) -> Self {
        let shared = Arc::new(Shared {
            work_queue: Mutex::new(VecDeque::new()),
            work_available: Condvar::new(),
            message_queue: Mutex::new(VecDeque::new()),
            exit: AtomicBool::new(false),
        });

        let workers = (0..worker_count.max(1))
            .map(|i| {
                let shared = Arc::clone(&shared);
                std::thread::Builder::new()
                    .name(format!("ion-asset-worker-{i}"))
                    .spawn(move || {
                        bump_priority_if_enabled();
                        worker_loop(shared)
                    })
                    .expect("failed to spawn asset worker thread")
            })
            .collect();

        TaskQueue { shared, workers }
    }

    /// Default worker count: hardware concurrency (falls back to 1).
    pub fn with_default_workers() -> Self {
        let n = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        Self::new(n)
    }

    /// Push `work` onto the work queue and wake exactly one waiting worker.
    pub fn schedule(&self, work: TaskWork) {
        self.shared.work_queue.lock().push_back(work);
        self.shared.work_available.notify_one();
    }

    /// Swap the message queue out for an empty one, then run every
    /// `on_dispatch` in FIFO order on the calling thread. Messages pushed
    /// by `on_dispatch` callbacks land in the now-empty live queue and are
    /// deferred to the *next* call — never observed in this pass.
    pub fn dispatch_messages(&self) {
        let drained = {
            let mut queue = self.shared.message_queue.lock();
            std::mem::take(&mut *queue)
        };
        for message in drained {
            (message.on_dispatch)();
        }
    }

    /// How many messages are currently queued, without draining them.
    /// Useful for tests asserting S5's "not called yet" precondition.
    pub fn pending_message_count(&self) -> usize {
        self.shared.message_queue.lock().len()
    }

    /// Signal every worker to exit, wake them all, then join.
    pub fn shutdown(&mut self) {
        self.shared.exit.store(true, Ordering::Release);
        self.shared.work_available.notify_all();
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
    }
}

impl MessageSink for TaskQueue {
    fn push_message(&self, message: TaskMessage) {
        self.shared.push_message(message);
    }
}

impl Drop for TaskQueue {
    fn drop(&mut self) {
        if !self.workers.is_empty() {
            self.shutdown();
        }
    }
}
