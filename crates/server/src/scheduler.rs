//! The admission scheduler: a fixed-capacity gate in front of the render
//! pipeline.
//!
//! Implemented as a counting semaphore, not a worker pool: any runtime
//! thread may serve any request once it holds a slot. Shutdown closes the
//! semaphore so no further slots can be acquired; slots already handed out
//! stay valid until their requests finish.

use platen_core::RenderError;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;

const QUEUE_FULL: &str = "queue full, please try again later";

/// A slot in the render queue. Dropping it releases the slot.
#[derive(Debug)]
pub struct JobSlot {
    _permit: OwnedSemaphorePermit,
}

#[derive(Clone)]
pub struct Scheduler {
    slots: Arc<Semaphore>,
    capacity: usize,
    timeout: Duration,
}

impl Scheduler {
    pub fn new(capacity: usize, timeout: Duration) -> Self {
        Self {
            slots: Arc::new(Semaphore::new(capacity)),
            capacity,
            timeout,
        }
    }

    /// Wait for a slot, bounded by the queue timeout and the caller's
    /// cancellation. Both outcomes are a `queue` error.
    pub async fn acquire(&self, cancel: &CancellationToken) -> Result<JobSlot, RenderError> {
        tokio::select! {
            permit = self.slots.clone().acquire_owned() => match permit {
                Ok(permit) => Ok(JobSlot { _permit: permit }),
                // closed: the service is shutting down
                Err(e) => Err(RenderError::queue(QUEUE_FULL).with_cause(e)),
            },
            _ = tokio::time::sleep(self.timeout) => {
                Err(RenderError::queue(QUEUE_FULL))
            }
            _ = cancel.cancelled() => {
                Err(RenderError::queue(QUEUE_FULL)
                    .with_cause(std::io::Error::new(
                        std::io::ErrorKind::TimedOut,
                        "request cancelled while waiting for a slot",
                    )))
            }
        }
    }

    /// Stop handing out slots. In-flight jobs are unaffected.
    pub fn close(&self) {
        self.slots.close();
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of jobs currently holding a slot.
    pub fn in_flight(&self) -> usize {
        self.capacity.saturating_sub(self.slots.available_permits())
    }
}
