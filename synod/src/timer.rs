//! Scheduled callbacks.
//!
//! A [Timer] is a callback bound to an optional [Address](crate::address::Address), sitting
//! in the [Network](crate::network::Network)'s min-heap until its expiry is reached. It can
//! be cancelled at any point up to firing. Clock values are tracked in microseconds (`u64`)
//! rather than `f64` seconds, so the heap can use a total order without worrying about NaN.

use std::cell::Cell;
use std::rc::Rc;

use crate::address::Address;

pub const MICROS_PER_SECOND: u64 = 1_000_000;

pub fn seconds_to_micros(seconds: f64) -> u64 {
    (seconds * MICROS_PER_SECOND as f64).round() as u64
}

/// A handle a caller keeps to cancel a timer it scheduled. Cloning a handle shares the same
/// cancellation flag as the original.
#[derive(Clone)]
pub struct TimerHandle {
    cancelled: Rc<Cell<bool>>,
}

impl TimerHandle {
    pub fn cancel(&self) {
        self.cancelled.set(true);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.get()
    }
}

/// An entry in the network's timer heap: an expiry, the address it's scoped to (if any), and
/// the boxed callback to run. `seq` breaks ties between equal expiries in FIFO order, since
/// raw tuples of `(expires, callback)` aren't orderable.
pub struct Timer {
    pub expires: u64,
    pub address: Option<Address>,
    pub seq: u64,
    pub(crate) cancelled: Rc<Cell<bool>>,
    pub(crate) callback: Box<dyn FnMut()>,
}

impl Timer {
    pub fn new(
        expires: u64,
        address: Option<Address>,
        seq: u64,
        callback: Box<dyn FnMut()>,
    ) -> (Timer, TimerHandle) {
        let cancelled = Rc::new(Cell::new(false));
        let timer = Timer {
            expires,
            address,
            seq,
            cancelled: cancelled.clone(),
            callback,
        };
        (timer, TimerHandle { cancelled })
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.get()
    }

    pub fn fire(&mut self) {
        if !self.cancelled.get() {
            (self.callback)();
        }
    }
}

impl std::fmt::Debug for Timer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Timer")
            .field("expires", &self.expires)
            .field("address", &self.address)
            .field("seq", &self.seq)
            .field("cancelled", &self.cancelled.get())
            .finish()
    }
}

impl PartialEq for Timer {
    fn eq(&self, other: &Self) -> bool {
        self.expires == other.expires && self.seq == other.seq
    }
}
impl Eq for Timer {}

impl PartialOrd for Timer {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Timer {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (self.expires, self.seq).cmp(&(other.expires, other.seq))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[test]
    fn cancelled_timer_does_not_fire() {
        let fired = Rc::new(RefCell::new(false));
        let fired_clone = fired.clone();
        let (mut timer, handle) = Timer::new(
            1_000_000,
            None,
            0,
            Box::new(move || *fired_clone.borrow_mut() = true),
        );
        handle.cancel();
        timer.fire();
        assert!(!*fired.borrow());
    }

    #[test]
    fn uncancelled_timer_fires() {
        let fired = Rc::new(RefCell::new(false));
        let fired_clone = fired.clone();
        let (mut timer, _handle) = Timer::new(
            1_000_000,
            None,
            0,
            Box::new(move || *fired_clone.borrow_mut() = true),
        );
        timer.fire();
        assert!(*fired.borrow());
    }

    #[test]
    fn orders_by_expiry_then_sequence() {
        let (a, _h1) = Timer::new(100, None, 5, Box::new(|| {}));
        let (b, _h2) = Timer::new(100, None, 2, Box::new(|| {}));
        let (c, _h3) = Timer::new(50, None, 9, Box::new(|| {}));
        assert!(c < b);
        assert!(b < a);
    }

    #[test]
    fn seconds_to_micros_rounds() {
        assert_eq!(seconds_to_micros(0.7), 700_000);
        assert_eq!(seconds_to_micros(1.0), 1_000_000);
    }
}
