//! Delay-coalescing for bursty input

use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;

use flume::{Receiver, Sender};

/// Emits the last value pushed once `delay` passes without another push.
///
/// Every push or cancel clears the pending timer. Timers are local tasks,
/// so pushes must happen inside a `LocalSet`.
pub struct Debouncer<T> {
    delay: Duration,
    generation: Rc<Cell<u64>>,
    tx: Sender<T>,
}

impl<T: 'static> Debouncer<T> {
    pub fn new(delay: Duration) -> (Self, Receiver<T>) {
        let (tx, rx) = flume::unbounded();
        let debouncer = Self {
            delay,
            generation: Rc::new(Cell::new(0)),
            tx,
        };
        (debouncer, rx)
    }

    pub fn push(&self, value: T) {
        let generation = self.bump();
        let current = self.generation.clone();
        let tx = self.tx.clone();
        let delay = self.delay;

        tokio::task::spawn_local(async move {
            tokio::time::sleep(delay).await;
            if current.get() == generation {
                let _ = tx.send(value);
            }
        });
    }

    /// Drop whatever is pending
    pub fn cancel(&self) {
        self.bump();
    }

    fn bump(&self) -> u64 {
        let next = self.generation.get() + 1;
        self.generation.set(next);
        next
    }
}
