//! Blocking hand-off queue.
//!
//! Items travel over a crossbeam channel. Consumers park in a `Select` over
//! that channel and a close signal until an item arrives, the queue is
//! completed (no more items will be added), or it is closed (remaining items
//! are never handed out). Closing drops the signal's only sender, which wakes
//! every parked consumer and producer at once.

use crossbeam_channel::{bounded, unbounded, Receiver, Select, Sender};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

/// Multi-consumer blocking queue with optional capacity.
pub struct HandoffQueue<T> {
    /// `None` once completed or closed; the channel disconnects when the
    /// last sender is gone
    tx: Mutex<Option<Sender<T>>>,
    rx: Receiver<T>,
    /// Never carries a message
    close_tx: Mutex<Option<Sender<()>>>,
    close_rx: Receiver<()>,
    closed: AtomicBool,
}

impl<T> HandoffQueue<T> {
    /// Create a queue. `None` capacity never blocks producers.
    pub fn new(capacity: Option<usize>) -> Self {
        let (tx, rx) = match capacity {
            Some(capacity) => bounded(capacity),
            None => unbounded(),
        };
        let (close_tx, close_rx) = bounded(0);
        Self {
            tx: Mutex::new(Some(tx)),
            rx,
            close_tx: Mutex::new(Some(close_tx)),
            close_rx,
            closed: AtomicBool::new(false),
        }
    }

    /// Add an item, waiting for room when bounded.
    ///
    /// Gives the item back if the queue was completed or closed.
    pub fn push(&self, item: T) -> Result<(), T> {
        if self.closed.load(Ordering::Acquire) {
            return Err(item);
        }
        let tx = match self.tx.lock().as_ref() {
            Some(tx) => tx.clone(),
            None => return Err(item),
        };

        let mut select = Select::new();
        let send = select.send(&tx);
        select.recv(&self.close_rx);
        let op = select.select();
        if op.index() == send {
            op.send(&tx, item).map_err(|e| e.into_inner())
        } else {
            let _ = op.recv(&self.close_rx);
            Err(item)
        }
    }

    /// Take the next item, parking until one is available.
    ///
    /// Returns `None` once the queue is completed and drained, or closed.
    pub fn pop(&self) -> Option<T> {
        if self.closed.load(Ordering::Acquire) {
            return None;
        }

        let mut select = Select::new();
        let recv = select.recv(&self.rx);
        select.recv(&self.close_rx);
        let op = select.select();
        if op.index() == recv {
            // Disconnected means completed and drained.
            let item = op.recv(&self.rx).ok()?;
            if self.closed.load(Ordering::Acquire) {
                return None;
            }
            Some(item)
        } else {
            let _ = op.recv(&self.close_rx);
            None
        }
    }

    /// No more items will be added; consumers drain what is left.
    pub fn complete_adding(&self) {
        self.tx.lock().take();
    }

    /// Stop immediately: queued items are never handed out and every waiter
    /// is released.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.tx.lock().take();
        self.close_tx.lock().take();
    }

    /// Items currently queued.
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    /// Check if no items are queued.
    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    /// Whether `complete_adding` or `close` has been called.
    pub fn is_finished(&self) -> bool {
        self.tx.lock().is_none()
    }
}
