//! Phase-1 (Prepare/Promise) quorum collector, spawned by a [Leader](crate::leader::Leader)
//! for a fresh ballot. One-shot: it reports ADOPTED or PREEMPTED to its own node (where the
//! spawning Leader is listening) and stops.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::rc::{Rc, Weak};

use indicio::{clue, ALWAYS};

use crate::address::Address;
use crate::ballot::Ballot;
use crate::constants::{quorum, PREPARE_RETRANSMIT};
use crate::logging::COLLECTOR;
use crate::message::{merge_accepted, Message};
use crate::node::Node;
use crate::proposal::{Proposal, Slot};
use crate::role::{Role, RoleBase};

pub struct Scout {
    base: RoleBase,
    self_weak: RefCell<Weak<RefCell<Scout>>>,
    peers: Vec<Address>,
    ballot_num: Ballot,
    promised: BTreeSet<Address>,
    accepted_proposals: BTreeMap<Slot, (Ballot, Proposal)>,
}

impl Scout {
    pub fn spawn(node: Rc<Node>, ballot_num: Ballot, peers: Vec<Address>) -> Rc<RefCell<Scout>> {
        let scout = crate::role::spawn(Scout {
            base: RoleBase::new(node, "Scout"),
            self_weak: RefCell::new(Weak::new()),
            peers,
            ballot_num,
            promised: BTreeSet::new(),
            accepted_proposals: BTreeMap::new(),
        });
        *scout.borrow().self_weak.borrow_mut() = Rc::downgrade(&scout);
        scout.borrow().send_prepare();
        scout
    }

    fn send_prepare(&self) {
        self.base.node.send(
            &self.peers,
            Message::Prepare {
                ballot_num: self.ballot_num,
            },
        );
        let weak = self.self_weak.borrow().clone();
        self.base
            .set_timer(PREPARE_RETRANSMIT.as_secs_f64(), move || {
                if let Some(scout) = weak.upgrade() {
                    scout.borrow().send_prepare();
                }
            });
    }

    fn finished_adopted(&self) {
        clue!(COLLECTOR, ALWAYS, { scout: format!("{:?}", self.base.node.address), ballot_num: format!("{:?}", self.ballot_num), event: "adopted" });
        crate::metrics::SCOUTS_ADOPTED.click();
        self.base.node.send(
            &[self.base.node.address],
            Message::Adopted {
                ballot_num: self.ballot_num,
                accepted_proposals: self.accepted_proposals.clone(),
            },
        );
        self.base.stop();
    }

    fn finished_preempted(&self, preempted_by: Ballot) {
        crate::metrics::SCOUTS_PREEMPTED.click();
        self.base.node.send(
            &[self.base.node.address],
            Message::Preempted {
                slot: None,
                preempted_by,
            },
        );
        self.base.stop();
    }
}

impl Role for Scout {
    fn base(&self) -> &RoleBase {
        &self.base
    }

    fn handle(&mut self, sender: Address, message: &Message) {
        match message {
            Message::Promise {
                ballot_num,
                accepted_proposals,
            } => {
                if *ballot_num == self.ballot_num {
                    merge_accepted(&mut self.accepted_proposals, accepted_proposals);
                    self.promised.insert(sender);
                    if self.promised.len() >= quorum(self.peers.len()) {
                        self.finished_adopted();
                    }
                } else {
                    self.finished_preempted(*ballot_num);
                }
            }
            _ => {}
        }
    }
}
