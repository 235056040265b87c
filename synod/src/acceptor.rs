//! The Paxos acceptor: a monotone-highest promised ballot, and the highest-ballot
//! proposal accepted at each slot.

use std::collections::BTreeMap;
use std::rc::Rc;

use indicio::{clue, ALWAYS};

use crate::address::Address;
use crate::ballot::Ballot;
use crate::logging::COLLECTOR;
use crate::message::Message;
use crate::node::Node;
use crate::proposal::{Proposal, Slot};
use crate::role::{Role, RoleBase};

/// The acceptor's durable (for the lifetime of the node) state: the highest ballot it
/// has promised, and the highest-ballot proposal it has accepted per slot.
pub struct Acceptor {
    base: RoleBase,
    peers: Vec<Address>,
    pub ballot_num: Ballot,
    pub accepted_proposals: BTreeMap<Slot, (Ballot, Proposal)>,
}

impl Acceptor {
    pub fn new(node: Rc<Node>, peers: Vec<Address>) -> Rc<std::cell::RefCell<Acceptor>> {
        crate::role::spawn(Acceptor {
            base: RoleBase::new(node, "Acceptor"),
            peers,
            ballot_num: Ballot::BOTTOM,
            accepted_proposals: BTreeMap::new(),
        })
    }
}

impl Role for Acceptor {
    fn base(&self) -> &RoleBase {
        &self.base
    }

    fn handle(&mut self, sender: Address, message: &Message) {
        match message {
            Message::Prepare { ballot_num } => {
                if *ballot_num > self.ballot_num {
                    self.ballot_num = *ballot_num;
                    clue!(COLLECTOR, ALWAYS, { acceptor: format!("{:?}", self.base.node.address), ballot_num: format!("{ballot_num:?}"), event: "adopting higher ballot" });
                    self.base
                        .node
                        .send(&self.peers, Message::Accepting { leader: sender });
                }
                self.base.node.send(
                    &[sender],
                    Message::Promise {
                        ballot_num: self.ballot_num,
                        accepted_proposals: self.accepted_proposals.clone(),
                    },
                );
            }
            Message::Accept {
                slot,
                ballot_num,
                proposal,
            } => {
                if *ballot_num >= self.ballot_num {
                    self.ballot_num = *ballot_num;
                    self.accepted_proposals
                        .insert(*slot, (*ballot_num, proposal.clone()));
                }
                self.base.node.send(
                    &[sender],
                    Message::Accepted {
                        slot: *slot,
                        ballot_num: self.ballot_num,
                    },
                );
            }
            _ => {}
        }
    }
}
