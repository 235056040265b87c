//! The `Role` trait and the `RoleBase` every concrete role embeds.
//!
//! A role is constructed with a `Node`, registers itself immediately, starts `running`, and
//! gets a logger namespaced under its own type name. `set_timer` wraps the node's timer so a
//! callback scheduled before `stop()` silently no-ops if it fires after. `stop()` flips
//! `running` off and unregisters from the node. [spawn] performs this self-registration step
//! for every concrete role's constructor.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use crate::address::Address;
use crate::message::Message;
use crate::node::Node;
use crate::timer::TimerHandle;

/// Anything that can sit on a [Node] and receive dispatched messages. `handle` is called once
/// per delivered message, with the sender's address and the message itself; a role that isn't
/// interested in a particular variant just doesn't match it.
pub trait Role {
    fn base(&self) -> &RoleBase;
    fn handle(&mut self, sender: Address, message: &Message);
}

/// Shared state every role embeds: its node, its running flag, and a weak self-reference
/// used to unregister on [RoleBase::stop]. Fields are private; roles interact with it through
/// `node`, `is_running`, `set_timer`, and `stop`.
pub struct RoleBase {
    pub node: Rc<Node>,
    pub name: &'static str,
    running: Rc<Cell<bool>>,
    self_ref: RefCell<Weak<RefCell<dyn Role>>>,
}

impl RoleBase {
    pub fn new(node: Rc<Node>, name: &'static str) -> RoleBase {
        RoleBase {
            node,
            name,
            running: Rc::new(Cell::new(true)),
            self_ref: RefCell::new(Weak::new()),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.get()
    }

    /// Wraps `Node::set_timer` so the callback is skipped once this role has stopped, even if
    /// the timer was already enqueued before `stop()` ran.
    pub fn set_timer<F: FnMut() + 'static>(&self, seconds: f64, mut callback: F) -> Option<TimerHandle> {
        let running = self.running.clone();
        self.node.set_timer(
            seconds,
            Box::new(move || {
                if running.get() {
                    callback();
                }
            }),
        )
    }

    pub fn stop(&self) {
        self.running.set(false);
        if let Some(handle) = self.self_ref.borrow().upgrade() {
            self.node.unregister(&handle);
        }
    }
}

/// Construct a role, register it on its node, and return a shared handle to it. A role can't
/// register itself mid-construction -- it has no `Rc<RefCell<_>>` handle to hand the node
/// until construction finishes -- so registration happens here, once the role is behind its
/// final shared handle.
pub fn spawn<T: Role + 'static>(role: T) -> Rc<RefCell<T>> {
    let rc = Rc::new(RefCell::new(role));
    let trait_rc: Rc<RefCell<dyn Role>> = rc.clone();
    *rc.borrow().base().self_ref.borrow_mut() = Rc::downgrade(&trait_rc);
    rc.borrow().base().node.register(trait_rc);
    rc
}

#[cfg(test)]
pub fn install_test_probe(node: &Rc<Node>, log: Rc<RefCell<Vec<Message>>>) -> Rc<RefCell<dyn Role>> {
    struct Probe {
        base: RoleBase,
        log: Rc<RefCell<Vec<Message>>>,
    }
    impl Role for Probe {
        fn base(&self) -> &RoleBase {
            &self.base
        }
        fn handle(&mut self, _sender: Address, message: &Message) {
            self.log.borrow_mut().push(message.clone());
        }
    }
    let probe = Probe {
        base: RoleBase::new(node.clone(), "Probe"),
        log,
    };
    let rc = spawn(probe);
    let trait_rc: Rc<RefCell<dyn Role>> = rc;
    trait_rc
}
