//! The transport: message delivery and timers.
//!
//! [Network] is the object-safe surface every [Node](crate::node::Node) holds a handle to:
//! `now`, `send`, `set_timer`. [SimNetwork] is the deterministic, virtual-time implementation
//! used by the demo binary and the integration tests -- a min-heap of [Timer]s drives a
//! logical clock forward, with `Guacamole`-seeded jitter and loss standing in for a real
//! socket: each send schedules delivery with a small random delay drawn from a bounded
//! distribution, and independently drops with a fixed small probability. Timer expiry is
//! tracked in a `BinaryHeap<Reverse<Timer>>` so `run` always pops the earliest-expiring
//! timer in log time.

use std::cell::{Cell, RefCell};
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::rc::{Rc, Weak};

use guacamole::combinators::prob;
use guacamole::Guacamole;
use indicio::{clue, ALWAYS, DEBUG};
use crate::logging::COLLECTOR;

use crate::address::Address;
use crate::message::Message;
use crate::node::Node;
use crate::timer::{seconds_to_micros, Timer, TimerHandle};

/// The surface a [Node] depends on. Kept deliberately small and `&self`-only (concrete
/// implementations hide their mutable state behind `RefCell`/`Cell`) so it can be held as a
/// `Weak<dyn Network>` without the node ever needing to know whether it's talking to a
/// [SimNetwork] or a test double.
pub trait Network {
    /// The network's current logical time, in microseconds.
    fn now(&self) -> u64;

    /// Enqueue `message` for delivery from `from` to each of `destinations`. Delivery is
    /// unreliable and unordered: a destination may never receive it, may receive it late
    /// relative to other sends, or (at the transport's discretion) more than once.
    fn send(&self, from: Address, destinations: &[Address], message: Message);

    /// Schedule `callback` to run `seconds` from now, bound to `address`. If the node at
    /// `address` has left the network by the time the timer matures, the callback is
    /// skipped. Returns a handle the caller can use to cancel it first.
    fn set_timer(&self, address: Address, seconds: f64, callback: Box<dyn FnMut()>) -> TimerHandle;
}

const DEFAULT_MIN_JITTER_MICROS: u64 = 1_000;
const DEFAULT_MAX_JITTER_MICROS: u64 = 20_000;
const DEFAULT_DROP_PROBABILITY: f32 = 0.05;

/// A deterministic, virtual-time [Network]. Everything -- the clock, the node table, the
/// timer heap, and the PRNG -- lives behind interior mutability so the type can be shared as
/// `Rc<SimNetwork>` and handed out to every `Node` as a `Weak<dyn Network>`.
pub struct SimNetwork {
    clock: Cell<u64>,
    nodes: RefCell<HashMap<Address, Rc<Node>>>,
    timers: RefCell<BinaryHeap<Reverse<Timer>>>,
    guac: RefCell<Guacamole>,
    next_seq: Cell<u64>,
    running: Cell<bool>,
    drop_probability: f32,
    min_jitter_micros: u64,
    max_jitter_micros: u64,
}

impl SimNetwork {
    pub fn new(seed: u64) -> Rc<SimNetwork> {
        Rc::new(SimNetwork {
            clock: Cell::new(0),
            nodes: RefCell::new(HashMap::new()),
            timers: RefCell::new(BinaryHeap::new()),
            guac: RefCell::new(Guacamole::new(seed)),
            next_seq: Cell::new(0),
            running: Cell::new(false),
            drop_probability: DEFAULT_DROP_PROBABILITY,
            min_jitter_micros: DEFAULT_MIN_JITTER_MICROS,
            max_jitter_micros: DEFAULT_MAX_JITTER_MICROS,
        })
    }

    /// Construct a node bound to this network and register it in the node table. `address`
    /// defaults to a freshly generated [Address] when absent.
    pub fn new_node(self: &Rc<Self>, address: Option<Address>) -> Rc<Node> {
        let address = address.unwrap_or_else(|| Address::generate().unwrap());
        let network: Weak<dyn Network> = Rc::downgrade(self) as Weak<dyn Network>;
        let node = Rc::new(Node::new(address, network));
        self.nodes.borrow_mut().insert(address, node.clone());
        clue!(COLLECTOR, ALWAYS, { node: format!("{address:?}"), event: "joined network" });
        node
    }

    /// Remove a node from the table. Timers already scheduled against it are skipped when
    /// they mature rather than cancelled eagerly -- `set_timer`'s bound-address check catches
    /// a callback whose node is gone by firing time.
    pub fn remove_node(&self, address: Address) {
        self.nodes.borrow_mut().remove(&address);
    }

    fn next_seq(&self) -> u64 {
        let seq = self.next_seq.get();
        self.next_seq.set(seq + 1);
        seq
    }

    /// Drain the timer heap, advancing `now` to each popped timer's expiry and firing it
    /// unless cancelled or its bound node has left the network, until the heap empties or
    /// [SimNetwork::stop] is called.
    pub fn run(&self) {
        self.run_with_hook(|| {})
    }

    /// Like [SimNetwork::run], but calls `hook` once per loop iteration, before popping the
    /// next timer. [member::Member](crate::member::Member) uses this to drain its command
    /// channel -- spawning a [Requester](crate::requester::Requester) for each pending
    /// `invoke` -- from the same thread that owns the node table, since nothing here is
    /// `Send` and a second thread touching it directly would race.
    pub fn run_with_hook<F: FnMut()>(&self, mut hook: F) {
        self.running.set(true);
        while self.running.get() {
            hook();
            if !self.step() {
                break;
            }
        }
        self.running.set(false);
    }

    /// Pop and fire exactly the earliest timer, advancing `now` to its expiry. Returns
    /// `false` (without advancing time) if the heap is empty. [Member::invoke](crate::member::Member::invoke)
    /// drives a member's own network this way before a background thread exists, one timer
    /// at a time, until its `Requester`'s callback has fired.
    pub fn step(&self) -> bool {
        let next = {
            let mut timers = self.timers.borrow_mut();
            timers.pop()
        };
        let Reverse(mut timer) = match next {
            Some(t) => t,
            None => return false,
        };
        self.clock.set(timer.expires);
        if timer.is_cancelled() {
            return true;
        }
        if let Some(address) = timer.address {
            if !self.nodes.borrow().contains_key(&address) {
                return true;
            }
        }
        timer.fire();
        true
    }

    pub fn stop(&self) {
        self.running.set(false);
    }
}

impl Network for SimNetwork {
    fn now(&self) -> u64 {
        self.clock.get()
    }

    fn send(&self, from: Address, destinations: &[Address], message: Message) {
        for destination in destinations.iter().copied() {
            let is_self_send = destination == from;
            let node = match self.nodes.borrow().get(&destination).cloned() {
                Some(node) => node,
                None => continue,
            };
            if !is_self_send {
                let mut guac = self.guac.borrow_mut();
                if prob(self.drop_probability)(&mut guac) {
                    clue!(COLLECTOR, DEBUG, { from: format!("{from:?}"), to: format!("{destination:?}"), tag: message.tag(), event: "dropped" });
                    continue;
                }
            }
            let delay = if is_self_send {
                0
            } else {
                let mut guac = self.guac.borrow_mut();
                let mut buf = [0u8; 8];
                guac.generate(&mut buf);
                let span = self.max_jitter_micros - self.min_jitter_micros;
                self.min_jitter_micros + (u64::from_le_bytes(buf) % span.max(1))
            };
            let expires = self.now() + delay;
            let seq = self.next_seq();
            let message = message.clone();
            let (timer, _handle) = Timer::new(
                expires,
                Some(destination),
                seq,
                Box::new(move || node.receive(from, message.clone())),
            );
            self.timers.borrow_mut().push(Reverse(timer));
        }
    }

    fn set_timer(&self, address: Address, seconds: f64, callback: Box<dyn FnMut()>) -> TimerHandle {
        let expires = self.now() + seconds_to_micros(seconds);
        let seq = self.next_seq();
        let (timer, handle) = Timer::new(expires, Some(address), seq, callback);
        self.timers.borrow_mut().push(Reverse(timer));
        handle
    }
}

/// A test-only harness for exercising a single [Node]'s roles without a real event loop.
/// `send` only records what was sent rather than delivering it, and virtual time only
/// advances when a test explicitly calls [FakeNetwork::tick], firing any timer whose expiry
/// falls within the elapsed span.
#[cfg(test)]
pub struct FakeNetwork {
    now: Cell<u64>,
    timers: RefCell<Vec<Timer>>,
    sent: RefCell<Vec<(Address, Vec<Address>, Message)>>,
    next_seq: Cell<u64>,
}

#[cfg(test)]
impl FakeNetwork {
    pub fn new() -> Rc<FakeNetwork> {
        Rc::new(FakeNetwork {
            now: Cell::new(0),
            timers: RefCell::new(Vec::new()),
            sent: RefCell::new(Vec::new()),
            next_seq: Cell::new(0),
        })
    }

    pub fn new_node(self: &Rc<Self>, address: Address) -> Rc<Node> {
        let network: Weak<dyn Network> = Rc::downgrade(self) as Weak<dyn Network>;
        Rc::new(Node::new(address, network))
    }

    /// Advance virtual time by `seconds`, firing every uncancelled timer whose expiry falls
    /// at or before the new time, in expiry order.
    pub fn tick(&self, seconds: f64) {
        let until = self.now.get() + seconds_to_micros(seconds);
        loop {
            let due = {
                let mut timers = self.timers.borrow_mut();
                timers.sort();
                if timers.first().map(|t| t.expires <= until).unwrap_or(false) {
                    Some(timers.remove(0))
                } else {
                    None
                }
            };
            match due {
                Some(mut timer) => {
                    self.now.set(timer.expires);
                    timer.fire();
                }
                None => break,
            }
        }
        self.now.set(until);
    }

    /// Every message handed to [Network::send] since construction, in send order.
    pub fn sent(&self) -> Vec<(Address, Vec<Address>, Message)> {
        self.sent.borrow().clone()
    }

    /// Discard everything recorded by [FakeNetwork::sent] so far, so a test can assert on
    /// only the messages sent after this point.
    pub fn clear_sent(&self) {
        self.sent.borrow_mut().clear();
    }

    /// Expiries of all live (uncancelled) timers, relative to `now`, ascending.
    pub fn pending_delays(&self) -> Vec<f64> {
        let now = self.now.get();
        let mut out: Vec<f64> = self
            .timers
            .borrow()
            .iter()
            .filter(|t| !t.is_cancelled())
            .map(|t| (t.expires.saturating_sub(now)) as f64 / crate::timer::MICROS_PER_SECOND as f64)
            .collect();
        out.sort_by(|a, b| a.partial_cmp(b).unwrap());
        out
    }
}

#[cfg(test)]
impl Network for FakeNetwork {
    fn now(&self) -> u64 {
        self.now.get()
    }

    fn send(&self, from: Address, destinations: &[Address], message: Message) {
        self.sent
            .borrow_mut()
            .push((from, destinations.to_vec(), message));
    }

    fn set_timer(&self, address: Address, seconds: f64, callback: Box<dyn FnMut()>) -> TimerHandle {
        let expires = self.now() + seconds_to_micros(seconds);
        let seq = self.next_seq.get();
        self.next_seq.set(seq + 1);
        let (timer, handle) = Timer::new(expires, Some(address), seq, callback);
        self.timers.borrow_mut().push(timer);
        handle
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::role;

    #[test]
    fn self_send_is_always_delivered_even_with_no_jitter_budget() {
        let net = SimNetwork::new(7);
        let node = net.new_node(None);
        let received = Rc::new(RefCell::new(Vec::new()));
        let probe = role::install_test_probe(&node, received.clone());
        node.send(&[node.address], Message::Active);
        net.run();
        drop(probe);
        assert_eq!(received.borrow().len(), 1);
    }

    #[test]
    fn fake_network_tick_fires_due_timers_in_order() {
        let net = FakeNetwork::new();
        let node = net.new_node(Address::generate().unwrap());
        let order = Rc::new(RefCell::new(Vec::new()));
        let o1 = order.clone();
        net.set_timer(node.address, 0.02, Box::new(move || o1.borrow_mut().push("second")));
        let o2 = order.clone();
        net.set_timer(node.address, 0.01, Box::new(move || o2.borrow_mut().push("first")));
        net.tick(0.05);
        assert_eq!(*order.borrow(), vec!["first", "second"]);
    }

    #[test]
    fn fake_network_cancelled_timer_does_not_fire() {
        let net = FakeNetwork::new();
        let node = net.new_node(Address::generate().unwrap());
        let fired = Rc::new(RefCell::new(false));
        let f = fired.clone();
        let handle = net.set_timer(node.address, 0.01, Box::new(move || *f.borrow_mut() = true));
        handle.cancel();
        net.tick(0.02);
        assert!(!*fired.borrow());
    }

    #[test]
    fn fake_network_records_sends_without_delivering() {
        let net = FakeNetwork::new();
        let node = net.new_node(Address::generate().unwrap());
        let other = Address::generate().unwrap();
        node.send(&[other], Message::Join);
        assert_eq!(net.sent().len(), 1);
        assert_eq!(net.sent()[0].1, vec![other]);
    }
}
