//! A node on the network: an address, a handle back to the transport, and the roles
//! currently running on it.
//!
//! `receive` dispatches an incoming message to every registered role over a snapshot of the
//! role list, so a handler that registers or unregisters a role mid-dispatch doesn't perturb
//! the iteration in progress.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use indicio::{clue, ALWAYS};
use crate::logging::COLLECTOR;

use crate::address::Address;
use crate::message::Message;
use crate::network::Network;
use crate::role::Role;

pub struct Node {
    pub address: Address,
    network: Weak<dyn Network>,
    roles: RefCell<Vec<Rc<RefCell<dyn Role>>>>,
}

impl Node {
    pub fn new(address: Address, network: Weak<dyn Network>) -> Node {
        Node {
            address,
            network,
            roles: RefCell::new(Vec::new()),
        }
    }

    pub fn now(&self) -> u64 {
        self.network.upgrade().map(|net| net.now()).unwrap_or(0)
    }

    pub fn send(&self, destinations: &[Address], message: Message) {
        if let Some(network) = self.network.upgrade() {
            clue!(COLLECTOR, ALWAYS, { from: format!("{:?}", self.address), to: format!("{destinations:?}"), tag: message.tag(), event: "send" });
            network.send(self.address, destinations, message);
        }
    }

    /// Schedule `callback` against this node's address. The callback is skipped if this node
    /// has since left the network (its [Network] handle dropped, or `remove_node` called).
    pub fn set_timer(&self, seconds: f64, callback: Box<dyn FnMut()>) -> Option<crate::timer::TimerHandle> {
        self.network
            .upgrade()
            .map(|network| network.set_timer(self.address, seconds, callback))
    }

    pub fn register(&self, role: Rc<RefCell<dyn Role>>) {
        self.roles.borrow_mut().push(role);
    }

    pub fn unregister(&self, role: &Rc<RefCell<dyn Role>>) {
        self.roles.borrow_mut().retain(|r| !Rc::ptr_eq(r, role));
    }

    /// Dispatch `message` from `sender` to every registered role, over a snapshot of the role
    /// list taken before dispatch begins.
    pub fn receive(&self, sender: Address, message: Message) {
        let snapshot: Vec<Rc<RefCell<dyn Role>>> = self.roles.borrow().clone();
        for role in snapshot {
            role.borrow_mut().handle(sender, &message);
        }
    }
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node").field("address", &self.address).finish()
    }
}
