//! Phase-2 (Accept/Accepted) quorum collector for a single slot, spawned by an active
//! [Leader](crate::leader::Leader). One-shot: reports DECIDED or PREEMPTED to its own node
//! and stops.

use std::cell::RefCell;
use std::collections::BTreeSet;
use std::rc::{Rc, Weak};

use indicio::{clue, ALWAYS};

use crate::address::Address;
use crate::ballot::Ballot;
use crate::constants::{quorum, ACCEPT_RETRANSMIT};
use crate::logging::COLLECTOR;
use crate::message::Message;
use crate::node::Node;
use crate::proposal::{Proposal, Slot};
use crate::role::{Role, RoleBase};

pub struct Commander {
    base: RoleBase,
    self_weak: RefCell<Weak<RefCell<Commander>>>,
    peers: Vec<Address>,
    ballot_num: Ballot,
    slot: Slot,
    proposal: Proposal,
    accepted: BTreeSet<Address>,
}

impl Commander {
    pub fn spawn(
        node: Rc<Node>,
        ballot_num: Ballot,
        slot: Slot,
        proposal: Proposal,
        peers: Vec<Address>,
    ) -> Rc<RefCell<Commander>> {
        let commander = crate::role::spawn(Commander {
            base: RoleBase::new(node, "Commander"),
            self_weak: RefCell::new(Weak::new()),
            peers,
            ballot_num,
            slot,
            proposal,
            accepted: BTreeSet::new(),
        });
        *commander.borrow().self_weak.borrow_mut() = Rc::downgrade(&commander);
        commander.borrow().send_accept();
        commander
    }

    fn send_accept(&self) {
        let destinations: Vec<Address> = self
            .peers
            .iter()
            .copied()
            .filter(|p| !self.accepted.contains(p))
            .collect();
        self.base.node.send(
            &destinations,
            Message::Accept {
                slot: self.slot,
                ballot_num: self.ballot_num,
                proposal: self.proposal.clone(),
            },
        );
        let weak = self.self_weak.borrow().clone();
        self.base
            .set_timer(ACCEPT_RETRANSMIT.as_secs_f64(), move || {
                if let Some(commander) = weak.upgrade() {
                    commander.borrow().send_accept();
                }
            });
    }

    fn finished_decided(&self) {
        crate::metrics::COMMANDS_DECIDED.click();
        self.base.node.send(
            &[self.base.node.address],
            Message::Decided { slot: self.slot },
        );
        self.base.stop();
    }

    fn finished_preempted(&self, preempted_by: Ballot) {
        crate::metrics::COMMANDS_PREEMPTED.click();
        self.base.node.send(
            &[self.base.node.address],
            Message::Preempted {
                slot: Some(self.slot),
                preempted_by,
            },
        );
        self.base.stop();
    }
}

impl Role for Commander {
    fn base(&self) -> &RoleBase {
        &self.base
    }

    fn handle(&mut self, sender: Address, message: &Message) {
        if let Message::Accepted { slot, ballot_num } = message {
            if *slot != self.slot {
                return;
            }
            if *ballot_num == self.ballot_num {
                self.accepted.insert(sender);
                if self.accepted.len() < quorum(self.peers.len()) {
                    return;
                }
                clue!(COLLECTOR, ALWAYS, { commander: format!("{:?}", self.base.node.address), slot: self.slot, event: "decided" });
                self.base.node.send(
                    &self.peers,
                    Message::Decision {
                        slot: self.slot,
                        proposal: self.proposal.clone(),
                    },
                );
                self.finished_decided();
            } else {
                self.finished_preempted(*ballot_num);
            }
        }
    }
}
