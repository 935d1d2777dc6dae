//! Work dispensing and the bounded batch queue
//!
//! Two queues sit between the remote API and the store:
//!
//! - [`WorkQueue`] hands pending units (markets or stations) to producers.
//!   It is filled once, before producers start, and only ever shrinks.
//! - [`batch_queue`] creates the bounded producer → writer channel. Capacity
//!   is enforced by a semaphore whose permits are taken *before* a producer
//!   starts fetching and released only after the writer has applied the unit,
//!   so at most `capacity` units are ever fetched but unwritten.
//!
//! ```rust
//! use lineup_builder::app::queue::{batch_queue, WorkQueue};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let units = WorkQueue::new(vec!["USA/90210", "USA/10001"]);
//! let (sender, mut receiver) = batch_queue::<&str>(1);
//!
//! let slot = sender.reserve().await.unwrap();
//! let unit = units.next().await.unwrap();
//! slot.send(unit).await.unwrap();
//! assert_eq!(sender.in_flight(), 1);
//!
//! let queued = receiver.recv().await.unwrap();
//! assert_eq!(queued.item, "USA/90210");
//! drop(queued);
//! assert_eq!(sender.in_flight(), 0);
//! # }
//! ```

use std::collections::VecDeque;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{mpsc, Mutex, OwnedSemaphorePermit, Semaphore};

/// The writer side of the batch queue has gone away
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("batch queue closed")]
pub struct QueueClosed;

/// Async dispenser of pending units
#[derive(Debug)]
pub struct WorkQueue<T> {
    items: Mutex<VecDeque<T>>,
    total: usize,
}

impl<T: Send> WorkQueue<T> {
    pub fn new(items: impl IntoIterator<Item = T>) -> Self {
        let items: VecDeque<T> = items.into_iter().collect();
        let total = items.len();
        Self {
            items: Mutex::new(items),
            total,
        }
    }

    /// Claim the next unit, `None` once the queue is exhausted
    pub async fn next(&self) -> Option<T> {
        self.items.lock().await.pop_front()
    }

    pub async fn remaining(&self) -> usize {
        self.items.lock().await.len()
    }

    /// Units the queue was created with
    pub fn total(&self) -> usize {
        self.total
    }
}

/// A unit waiting for (or being applied by) the writer
///
/// Holds one capacity permit; dropping the unit after it has been applied
/// frees the slot for another producer.
#[derive(Debug)]
pub struct QueuedUnit<T> {
    pub item: T,
    _permit: OwnedSemaphorePermit,
}

/// Producer handle; cheap to clone
#[derive(Debug)]
pub struct BatchSender<T> {
    sender: mpsc::Sender<QueuedUnit<T>>,
    permits: Arc<Semaphore>,
    capacity: usize,
}

impl<T> Clone for BatchSender<T> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
            permits: Arc::clone(&self.permits),
            capacity: self.capacity,
        }
    }
}

/// A reserved queue slot
#[derive(Debug)]
pub struct Reservation<T> {
    sender: mpsc::Sender<QueuedUnit<T>>,
    permit: OwnedSemaphorePermit,
}

impl<T> BatchSender<T> {
    /// Wait for a free slot
    ///
    /// Call this before doing the work that produces the unit; this wait is
    /// where backpressure is applied.
    pub async fn reserve(&self) -> Result<Reservation<T>, QueueClosed> {
        let permit = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|_| QueueClosed)?;
        Ok(Reservation {
            sender: self.sender.clone(),
            permit,
        })
    }

    /// Reserved slots not yet released by the writer
    pub fn in_flight(&self) -> usize {
        self.capacity - self.permits.available_permits()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl<T> Reservation<T> {
    /// Hand the unit to the writer
    pub async fn send(self, item: T) -> Result<(), QueueClosed> {
        self.sender
            .send(QueuedUnit {
                item,
                _permit: self.permit,
            })
            .await
            .map_err(|_| QueueClosed)
    }
}

/// Writer handle
///
/// Dropping the receiver closes the queue: producers waiting in
/// [`BatchSender::reserve`] return [`QueueClosed`].
#[derive(Debug)]
pub struct BatchReceiver<T> {
    receiver: mpsc::Receiver<QueuedUnit<T>>,
    permits: Arc<Semaphore>,
}

impl<T> BatchReceiver<T> {
    /// Next queued unit; `None` once every sender is dropped and the queue is drained
    pub async fn recv(&mut self) -> Option<QueuedUnit<T>> {
        self.receiver.recv().await
    }

    /// Blocking form of [`recv`](Self::recv) for the writer thread
    pub fn blocking_recv(&mut self) -> Option<QueuedUnit<T>> {
        self.receiver.blocking_recv()
    }

    /// Stop accepting reservations; already queued units can still be drained
    pub fn close(&mut self) {
        self.permits.close();
        self.receiver.close();
    }
}

impl<T> Drop for BatchReceiver<T> {
    fn drop(&mut self) {
        self.permits.close();
    }
}

/// Create a bounded batch queue holding at most `capacity` unwritten units
///
/// A zero capacity is raised to one.
pub fn batch_queue<T>(capacity: usize) -> (BatchSender<T>, BatchReceiver<T>) {
    let capacity = capacity.max(1);
    let permits = Arc::new(Semaphore::new(capacity));
    let (sender, receiver) = mpsc::channel(capacity);

    (
        BatchSender {
            sender,
            permits: Arc::clone(&permits),
            capacity,
        },
        BatchReceiver { receiver, permits },
    )
}
