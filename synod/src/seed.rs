//! Bootstraps a brand-new cluster by answering JOINs until quorum, then keeps welcoming
//! late joiners for a grace period before handing off to steady-state operation.

use std::cell::RefCell;
use std::collections::BTreeSet;
use std::rc::{Rc, Weak};

use indicio::{clue, ALWAYS};

use crate::acceptor::Acceptor;
use crate::address::Address;
use crate::bootstrap::Bootstrap;
use crate::constants::{quorum, JOIN_RETRANSMIT};
use crate::leader::Leader;
use crate::logging::COLLECTOR;
use crate::message::Message;
use crate::node::Node;
use crate::replica::Replica;
use crate::role::{Role, RoleBase};
use crate::state_machine::StateMachine;
use crate::timer::TimerHandle;

pub struct Seed {
    base: RoleBase,
    self_weak: RefCell<Weak<RefCell<Seed>>>,
    execute_fn: Rc<dyn StateMachine>,
    peers: Vec<Address>,
    initial_state: Vec<u8>,
    joined: BTreeSet<Address>,
    /// Armed once quorum is first reached; reset on every JOIN thereafter. Firing
    /// uncancelled means `2 * JOIN_RETRANSMIT` elapsed with no intervening JOIN.
    silence_timer: RefCell<Option<TimerHandle>>,
}

impl Seed {
    pub fn spawn(
        node: Rc<Node>,
        initial_state: Vec<u8>,
        peers: Vec<Address>,
        execute_fn: Rc<dyn StateMachine>,
    ) -> Rc<RefCell<Seed>> {
        let seed = crate::role::spawn(Seed {
            base: RoleBase::new(node, "Seed"),
            self_weak: RefCell::new(Weak::new()),
            execute_fn,
            peers,
            initial_state,
            joined: BTreeSet::new(),
            silence_timer: RefCell::new(None),
        });
        *seed.borrow().self_weak.borrow_mut() = Rc::downgrade(&seed);
        seed
    }

    fn arm_silence_timer(&self) {
        if let Some(handle) = self.silence_timer.borrow_mut().take() {
            handle.cancel();
        }
        let weak = self.self_weak.borrow().clone();
        let handle = self
            .base
            .set_timer(2.0 * JOIN_RETRANSMIT.as_secs_f64(), move || {
                if let Some(seed) = weak.upgrade() {
                    seed.borrow_mut().quiesce();
                }
            });
        *self.silence_timer.borrow_mut() = handle;
    }

    fn quiesce(&mut self) {
        clue!(COLLECTOR, ALWAYS, { seed: format!("{:?}", self.base.node.address), event: "quiesced, handing off to bootstrap" });
        let node = self.base.node.clone();
        let peers = self.peers.clone();
        let execute_fn = self.execute_fn.clone();
        self.base.stop();
        Bootstrap::spawn(node, peers, execute_fn);
    }
}

impl Role for Seed {
    fn base(&self) -> &RoleBase {
        &self.base
    }

    fn handle(&mut self, sender: Address, message: &Message) {
        if let Message::Join = message {
            if !self.peers.contains(&sender) {
                return;
            }
            self.joined.insert(sender);
            if self.joined.len() < quorum(self.peers.len()) {
                return;
            }
            let destinations: Vec<Address> = self.joined.iter().copied().collect();
            self.base.node.send(
                &destinations,
                Message::Welcome {
                    state: self.initial_state.clone(),
                    slot: 1,
                    decisions: Default::default(),
                },
            );
            self.arm_silence_timer();
        }
    }
}

/// Build the steady-state role ensemble (Acceptor, Replica, Leader) a Seed or Bootstrap
/// installs once a node is a full cluster member.
pub(crate) fn install_cluster_roles(
    node: Rc<Node>,
    execute_fn: Rc<dyn StateMachine>,
    state: Vec<u8>,
    slot: crate::proposal::Slot,
    decisions: std::collections::BTreeMap<crate::proposal::Slot, crate::proposal::Proposal>,
    peers: Vec<Address>,
) {
    Acceptor::new(node.clone(), peers.clone());
    Replica::spawn(node.clone(), execute_fn, state, slot, decisions, peers.clone());
    Leader::spawn(node, peers);
}
