use std::collections::VecDeque;
use std::sync::Mutex;

use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use crate::error::{Result, SubtitleError};
use crate::scheduler::job::Job;

pub const DEFAULT_CAPACITY: usize = 10;

#[derive(Debug)]
struct State {
    jobs: VecDeque<Job>,
    closed: bool,
}

/// Bounded FIFO of accepted jobs, shared by the gateway and the workers.
///
/// Pushing never waits: a full queue rejects the job. Popping waits until a
/// job arrives, the queue is closed and drained, or shutdown is signalled.
#[derive(Debug)]
pub struct JobQueue {
    state: Mutex<State>,
    available: Notify,
    capacity: usize,
}

impl Default for JobQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl JobQueue {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            state: Mutex::new(State {
                jobs: VecDeque::with_capacity(capacity),
                closed: false,
            }),
            available: Notify::new(),
            capacity,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        // The critical sections never panic, so a poisoned lock still holds
        // a consistent queue.
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Append a job without blocking.
    ///
    /// Fails with [`SubtitleError::QueueFull`] at capacity and with
    /// [`SubtitleError::QueueClosed`] once the queue has been closed.
    pub fn try_push(&self, job: Job) -> Result<()> {
        {
            let mut state = self.lock();
            if state.closed {
                return Err(SubtitleError::QueueClosed);
            }
            if state.jobs.len() >= self.capacity {
                return Err(SubtitleError::QueueFull);
            }
            state.jobs.push_back(job);
        }
        self.available.notify_one();
        Ok(())
    }

    /// Take the oldest job, waiting for one if the queue is empty.
    ///
    /// Returns `None` when the queue is closed and drained, or once
    /// `shutdown` has fired, even if jobs are still queued.
    pub async fn pop(&self, shutdown: &CancellationToken) -> Option<Job> {
        loop {
            let notified = self.available.notified();
            tokio::pin!(notified);
            // Register before checking so a push or close between the check
            // and the await still wakes us.
            notified.as_mut().enable();

            if shutdown.is_cancelled() {
                return None;
            }

            {
                let mut state = self.lock();
                if let Some(job) = state.jobs.pop_front() {
                    return Some(job);
                }
                if state.closed {
                    return None;
                }
            }

            tokio::select! {
                _ = &mut notified => {}
                _ = shutdown.cancelled() => return None,
            }
        }
    }

    /// Stop admitting jobs. Queued jobs can still be popped; waiting
    /// consumers return once the queue is drained.
    pub fn close(&self) {
        self.lock().closed = true;
        self.available.notify_waiters();
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Returns the current number of queued jobs
    pub fn len(&self) -> usize {
        self.lock().jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().jobs.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.lock().jobs.len() >= self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
