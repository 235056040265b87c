//! Ballot owner. Spawns [Scout](crate::scout::Scout)s to run Phase-1 and
//! [Commander](crate::commander::Commander)s to run Phase-2, one per in-flight slot.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::{Rc, Weak};

use indicio::{clue, ALWAYS};

use crate::address::Address;
use crate::ballot::Ballot;
use crate::commander::Commander;
use crate::constants::LEADER_TIMEOUT;
use crate::logging::COLLECTOR;
use crate::message::Message;
use crate::node::Node;
use crate::proposal::{Proposal, Slot};
use crate::role::{Role, RoleBase};
use crate::scout::Scout;

pub struct Leader {
    base: RoleBase,
    self_weak: RefCell<Weak<RefCell<Leader>>>,
    peers: Vec<Address>,
    pub ballot_num: Ballot,
    pub active: bool,
    scouting: bool,
    pub proposals: BTreeMap<Slot, Proposal>,
}

impl Leader {
    pub fn spawn(node: Rc<Node>, peers: Vec<Address>) -> Rc<RefCell<Leader>> {
        let address = node.address;
        let leader = crate::role::spawn(Leader {
            base: RoleBase::new(node, "Leader"),
            self_weak: RefCell::new(Weak::new()),
            peers,
            ballot_num: Ballot::new(0, address),
            active: false,
            scouting: false,
            proposals: BTreeMap::new(),
        });
        *leader.borrow().self_weak.borrow_mut() = Rc::downgrade(&leader);
        leader.borrow().start();
        leader
    }

    fn start(&self) {
        self.send_active_beacon();
    }

    fn send_active_beacon(&self) {
        if self.active {
            self.base.node.send(&self.peers, Message::Active);
        }
        let weak = self.self_weak.borrow().clone();
        self.base
            .set_timer(LEADER_TIMEOUT.as_secs_f64() / 2.0, move || {
                if let Some(leader) = weak.upgrade() {
                    leader.borrow().send_active_beacon();
                }
            });
    }

    fn spawn_scout(&mut self) {
        debug_assert!(!self.scouting);
        self.scouting = true;
        Scout::spawn(self.base.node.clone(), self.ballot_num, self.peers.clone());
    }

    fn spawn_commander(&self, slot: Slot) {
        let proposal = self.proposals[&slot].clone();
        Commander::spawn(
            self.base.node.clone(),
            self.ballot_num,
            slot,
            proposal,
            self.peers.clone(),
        );
    }
}

impl Role for Leader {
    fn base(&self) -> &RoleBase {
        &self.base
    }

    fn handle(&mut self, _sender: Address, message: &Message) {
        match message {
            Message::Propose { slot, proposal } => {
                if self.proposals.contains_key(slot) {
                    return;
                }
                if self.active {
                    self.proposals.insert(*slot, proposal.clone());
                    clue!(COLLECTOR, ALWAYS, { leader: format!("{:?}", self.base.node.address), slot: *slot, event: "spawning commander" });
                    self.spawn_commander(*slot);
                } else if !self.scouting {
                    clue!(COLLECTOR, ALWAYS, { leader: format!("{:?}", self.base.node.address), event: "propose while inactive, scouting" });
                    self.spawn_scout();
                }
            }
            Message::Adopted {
                ballot_num,
                accepted_proposals,
            } => {
                if *ballot_num != self.ballot_num {
                    return;
                }
                self.scouting = false;
                for (slot, (_ballot, proposal)) in accepted_proposals {
                    self.proposals.insert(*slot, proposal.clone());
                }
                clue!(COLLECTOR, ALWAYS, { leader: format!("{:?}", self.base.node.address), event: "becoming active" });
                self.active = true;
            }
            Message::Preempted {
                slot,
                preempted_by,
            } => {
                if slot.is_none() {
                    self.scouting = false;
                }
                clue!(COLLECTOR, ALWAYS, { leader: format!("{:?}", self.base.node.address), preempted_by: format!("{preempted_by:?}"), event: "preempted" });
                crate::metrics::LEADER_PREEMPTIONS.click();
                self.active = false;
                self.ballot_num = self.ballot_num.succeeding(*preempted_by);
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::FakeNetwork;

    fn addr() -> Address {
        Address::generate().unwrap()
    }

    fn proposal() -> Proposal {
        Proposal::new(Some(addr()), 1, b"one".to_vec())
    }

    #[test]
    fn propose_while_inactive_spawns_a_scout_which_broadcasts_prepare() {
        let net = FakeNetwork::new();
        let me = addr();
        let p1 = addr();
        let p2 = addr();
        let node = net.new_node(me);
        let leader = Leader::spawn(node.clone(), vec![me, p1, p2]);
        net.clear_sent();

        node.receive(me, Message::Propose { slot: 10, proposal: proposal() });

        assert!(leader.borrow().scouting);
        let sent = net.sent();
        assert!(sent
            .iter()
            .any(|(_, _, m)| matches!(m, Message::Prepare { ballot_num } if *ballot_num == Ballot::new(0, me))));
    }

    #[test]
    fn second_propose_while_scouting_is_ignored() {
        let net = FakeNetwork::new();
        let me = addr();
        let node = net.new_node(me);
        let leader = Leader::spawn(node.clone(), vec![me]);
        net.clear_sent();

        node.receive(me, Message::Propose { slot: 10, proposal: proposal() });
        net.clear_sent();
        node.receive(me, Message::Propose { slot: 10, proposal: proposal() });
        // still only scouting, no second PREPARE burst from a second scout
        assert!(leader.borrow().scouting);
    }

    #[test]
    fn propose_while_active_spawns_a_commander() {
        let net = FakeNetwork::new();
        let me = addr();
        let p1 = addr();
        let node = net.new_node(me);
        let leader = Leader::spawn(node.clone(), vec![me, p1]);
        leader.borrow_mut().active = true;
        net.clear_sent();

        node.receive(me, Message::Propose { slot: 10, proposal: proposal() });

        let sent = net.sent();
        assert!(sent.iter().any(|(_, _, m)| matches!(m, Message::Accept { slot, .. } if *slot == 10)));
        assert_eq!(leader.borrow().proposals[&10], proposal());
    }

    #[test]
    fn propose_for_slot_already_in_use_is_a_no_op() {
        let net = FakeNetwork::new();
        let me = addr();
        let node = net.new_node(me);
        let leader = Leader::spawn(node.clone(), vec![me]);
        leader.borrow_mut().active = true;
        leader.borrow_mut().proposals.insert(10, proposal());
        net.clear_sent();

        let other = Proposal::new(Some(addr()), 2, b"two".to_vec());
        node.receive(me, Message::Propose { slot: 10, proposal: other });

        assert_eq!(net.sent().len(), 0);
        assert_eq!(leader.borrow().proposals[&10], proposal());
    }

    #[test]
    fn adopted_merges_proposals_and_activates() {
        let net = FakeNetwork::new();
        let me = addr();
        let node = net.new_node(me);
        let leader = Leader::spawn(node.clone(), vec![me]);
        leader.borrow_mut().scouting = true;
        leader.borrow_mut().proposals.insert(9, proposal());

        let mut accepted = BTreeMap::new();
        let p10 = Proposal::new(Some(addr()), 3, b"three".to_vec());
        accepted.insert(10u64, (Ballot::new(0, me), p10.clone()));
        node.receive(me, Message::Adopted { ballot_num: Ballot::new(0, me), accepted_proposals: accepted });

        let l = leader.borrow();
        assert!(!l.scouting);
        assert!(l.active);
        assert_eq!(l.proposals[&9], proposal());
        assert_eq!(l.proposals[&10], p10);
    }

    #[test]
    fn preempted_from_commander_bumps_ballot_and_deactivates_without_rescouting() {
        let net = FakeNetwork::new();
        let me = addr();
        let node = net.new_node(me);
        let leader = Leader::spawn(node.clone(), vec![me]);
        leader.borrow_mut().active = true;

        let other = Address::generate().unwrap();
        node.receive(
            me,
            Message::Preempted {
                slot: Some(10),
                preempted_by: Ballot::new(22, other),
            },
        );

        let l = leader.borrow();
        assert_eq!(l.ballot_num, Ballot::new(23, me));
        assert!(!l.active);
        assert!(!l.scouting);
    }
}
