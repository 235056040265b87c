//! Joins an existing cluster by cycling JOIN through the peer list until a WELCOME
//! arrives, then installs the steady-state role ensemble (Acceptor, Replica, Leader).

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use indicio::{clue, ALWAYS};
use zerror::Z;

use crate::address::Address;
use crate::constants::{JOIN_ATTEMPTS_BEFORE_GIVING_UP, JOIN_RETRANSMIT};
use crate::error::Error;
use crate::logging::COLLECTOR;
use crate::message::Message;
use crate::node::Node;
use crate::role::{Role, RoleBase};
use crate::seed::install_cluster_roles;
use crate::state_machine::StateMachine;

pub struct Bootstrap {
    base: RoleBase,
    self_weak: RefCell<Weak<RefCell<Bootstrap>>>,
    execute_fn: Rc<dyn StateMachine>,
    peers: Vec<Address>,
    next_peer: usize,
    attempts: usize,
}

impl Bootstrap {
    pub fn spawn(
        node: Rc<Node>,
        peers: Vec<Address>,
        execute_fn: Rc<dyn StateMachine>,
    ) -> Rc<RefCell<Bootstrap>> {
        let bootstrap = crate::role::spawn(Bootstrap {
            base: RoleBase::new(node, "Bootstrap"),
            self_weak: RefCell::new(Weak::new()),
            execute_fn,
            peers,
            next_peer: 0,
            attempts: 0,
        });
        *bootstrap.borrow().self_weak.borrow_mut() = Rc::downgrade(&bootstrap);
        bootstrap.borrow().join();
        bootstrap
    }

    fn join(&self) {
        if !self.peers.is_empty() {
            let peer = self.peers[self.next_peer % self.peers.len()];
            self.base.node.send(&[peer], Message::Join);
        }
        let weak = self.self_weak.borrow().clone();
        self.base
            .set_timer(JOIN_RETRANSMIT.as_secs_f64(), move || {
                if let Some(bootstrap) = weak.upgrade() {
                    let give_up = {
                        let mut b = bootstrap.borrow_mut();
                        b.next_peer = b.next_peer.wrapping_add(1);
                        b.attempts += 1;
                        b.attempts >= JOIN_ATTEMPTS_BEFORE_GIVING_UP * b.peers.len().max(1)
                    };
                    if give_up {
                        bootstrap.borrow().give_up();
                    } else {
                        bootstrap.borrow().join();
                    }
                }
            });
    }

    /// Exhausted every retransmission without ever hearing a WELCOME. There's no caller on
    /// the other end of this role's fire-and-forget spawn to hand a `Result` back to, so the
    /// failure is surfaced the way every other background condition in this crate is: logged
    /// and counted.
    fn give_up(&self) {
        let error = Error::no_cluster_found(self.peers.len())
            .with_info("attempts", self.attempts);
        clue!(COLLECTOR, ALWAYS, {
            node: format!("{:?}", self.base.node.address),
            error: error.long_form(),
            event: "giving up, no cluster found"
        });
        crate::metrics::BOOTSTRAP_ABANDONED.click();
        self.base.stop();
    }
}

impl Role for Bootstrap {
    fn base(&self) -> &RoleBase {
        &self.base
    }

    fn handle(&mut self, _sender: Address, message: &Message) {
        if let Message::Welcome {
            state,
            slot,
            decisions,
        } = message
        {
            clue!(COLLECTOR, ALWAYS, { node: format!("{:?}", self.base.node.address), event: "welcomed, joining steady state" });
            install_cluster_roles(
                self.base.node.clone(),
                self.execute_fn.clone(),
                state.clone(),
                *slot,
                decisions.clone(),
                self.peers.clone(),
            );
            self.base.stop();
        }
    }
}
