//! Slot sequencer, proposal bookkeeping, state-machine driver, leader tracker, and JOIN
//! responder. The busiest role in the ensemble.
//!
//! A repeat DECISION for an already-committed slot with a matching proposal is a silent
//! no-op; only a mismatch panics -- a genuine safety violation, not a recoverable condition.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::{Rc, Weak};

use indicio::{clue, ALWAYS, DEBUG};

use crate::address::Address;
use crate::constants::LEADER_TIMEOUT;
use crate::logging::COLLECTOR;
use crate::message::Message;
use crate::node::Node;
use crate::proposal::{Proposal, Slot};
use crate::role::{Role, RoleBase};
use crate::state_machine::StateMachine;
use crate::timer::TimerHandle;

pub struct Replica {
    base: RoleBase,
    self_weak: RefCell<Weak<RefCell<Replica>>>,
    execute_fn: Rc<dyn StateMachine>,
    peers: Vec<Address>,
    pub state: Vec<u8>,
    /// The next slot to commit, in order.
    pub slot: Slot,
    /// The next slot this replica will allocate for a fresh local proposal.
    next_slot: Slot,
    pub proposals: BTreeMap<Slot, Proposal>,
    pub decisions: BTreeMap<Slot, Proposal>,
    pub latest_leader: Option<Address>,
    latest_leader_timeout: RefCell<Option<TimerHandle>>,
}

impl Replica {
    #[allow(clippy::too_many_arguments)]
    pub fn spawn(
        node: Rc<Node>,
        execute_fn: Rc<dyn StateMachine>,
        state: Vec<u8>,
        slot: Slot,
        decisions: BTreeMap<Slot, Proposal>,
        peers: Vec<Address>,
    ) -> Rc<RefCell<Replica>> {
        let replica = crate::role::spawn(Replica {
            base: RoleBase::new(node, "Replica"),
            self_weak: RefCell::new(Weak::new()),
            execute_fn,
            peers,
            state,
            slot,
            next_slot: slot,
            proposals: BTreeMap::new(),
            decisions,
            latest_leader: None,
            latest_leader_timeout: RefCell::new(None),
        });
        *replica.borrow().self_weak.borrow_mut() = Rc::downgrade(&replica);
        replica
    }

    /// Send (or resend, if `slot` is specified) a proposal to the replica's best-guess
    /// leader, or to itself (which may spawn a scout to elect one) if none is known yet.
    fn propose(&mut self, proposal: Proposal, slot: Option<Slot>) {
        let slot = match slot {
            Some(slot) => slot,
            None => {
                let slot = self.next_slot;
                self.next_slot += 1;
                slot
            }
        };
        self.proposals.insert(slot, proposal.clone());
        let leader = self.latest_leader.unwrap_or(self.base.node.address);
        clue!(COLLECTOR, ALWAYS, { replica: format!("{:?}", self.base.node.address), slot: slot, leader: format!("{leader:?}"), event: "proposing" });
        self.base.node.send(&[leader], Message::Propose { slot, proposal });
    }

    /// Commit a decided, in-sequence slot: apply it to the state machine (unless it's a
    /// duplicate client operation already committed at an earlier slot) and, for a
    /// client-originated proposal, reply INVOKED to the caller.
    fn commit(&mut self, slot: Slot, proposal: Proposal) {
        let is_duplicate = self
            .decisions
            .iter()
            .any(|(&s, p)| s < slot && *p == proposal);
        if is_duplicate {
            clue!(COLLECTOR, DEBUG, { replica: format!("{:?}", self.base.node.address), slot: slot, event: "duplicate proposal suppressed" });
            return;
        }
        clue!(COLLECTOR, ALWAYS, { replica: format!("{:?}", self.base.node.address), slot: slot, event: "committing" });
        crate::metrics::SLOTS_COMMITTED.click();
        if let Some(caller) = proposal.caller {
            let (new_state, output) = self.execute_fn.execute(&self.state, &proposal.input);
            self.state = new_state;
            self.base.node.send(
                &[caller],
                Message::Invoked {
                    client_id: proposal.client_id,
                    output,
                },
            );
        }
    }

    fn leader_alive(&self) {
        if let Some(handle) = self.latest_leader_timeout.borrow_mut().take() {
            handle.cancel();
        }
        let weak = self.self_weak.borrow().clone();
        let handle = self
            .base
            .set_timer(LEADER_TIMEOUT.as_secs_f64(), move || {
                if let Some(replica) = weak.upgrade() {
                    replica.borrow_mut().leader_timed_out();
                }
            });
        *self.latest_leader_timeout.borrow_mut() = handle;
    }

    fn leader_timed_out(&mut self) {
        if let Some(current) = self.latest_leader {
            if let Some(idx) = self.peers.iter().position(|p| *p == current) {
                let next = self.peers[(idx + 1) % self.peers.len()];
                clue!(COLLECTOR, DEBUG, { replica: format!("{:?}", self.base.node.address), next_leader: format!("{next:?}"), event: "leader timed out" });
                self.latest_leader = Some(next);
            }
        }
        self.leader_alive();
    }
}

impl Role for Replica {
    fn base(&self) -> &RoleBase {
        &self.base
    }

    fn handle(&mut self, sender: Address, message: &Message) {
        match message {
            Message::Invoke {
                caller,
                client_id,
                input_value,
            } => {
                let proposal = Proposal::new(Some(*caller), *client_id, input_value.clone());
                let existing_slot = self
                    .proposals
                    .iter()
                    .find(|(_, p)| **p == proposal)
                    .map(|(s, _)| *s);
                self.propose(proposal, existing_slot);
            }
            Message::Decision { slot, proposal } => {
                if let Some(existing) = self.decisions.get(slot) {
                    if existing != proposal {
                        panic!(
                            "safety violation: slot {slot} decided with two different proposals: {existing:?} vs {proposal:?}"
                        );
                    }
                    return;
                }
                self.decisions.insert(*slot, proposal.clone());
                self.next_slot = self.next_slot.max(*slot + 1);

                if let Some(ours) = self.proposals.get(slot) {
                    if ours != proposal && ours.caller.is_some() {
                        let ours = ours.clone();
                        self.propose(ours, None);
                    }
                }

                while let Some(commit_proposal) = self.decisions.get(&self.slot).cloned() {
                    let commit_slot = self.slot;
                    self.slot += 1;
                    self.commit(commit_slot, commit_proposal);
                }
            }
            Message::Adopted { .. } => {
                self.latest_leader = Some(self.base.node.address);
                self.leader_alive();
            }
            Message::Accepting { leader } => {
                self.latest_leader = Some(*leader);
                self.leader_alive();
            }
            Message::Active => {
                if Some(sender) == self.latest_leader {
                    self.leader_alive();
                }
            }
            Message::Join => {
                if self.peers.contains(&sender) {
                    self.base.node.send(
                        &[sender],
                        Message::Welcome {
                            state: self.state.clone(),
                            slot: self.slot,
                            decisions: self.decisions.clone(),
                        },
                    );
                }
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

    fn noop_sm() -> Rc<dyn StateMachine> {
        Rc::new(|state: &[u8], _input: &[u8]| (state.to_vec(), vec![]))
    }

    #[test]
    fn invoke_new_proposes_at_next_slot() {
        let net = FakeNetwork::new();
        let me = addr();
        let node = net.new_node(me);
        let replica = Replica::spawn(node.clone(), noop_sm(), b"state".to_vec(), 2, BTreeMap::new(), vec![me]);

        let caller = addr();
        node.receive(
            caller,
            Message::Invoke {
                caller,
                client_id: 222,
                input_value: b"dos".to_vec(),
            },
        );

        let sent = net.sent();
        assert_eq!(sent.len(), 1);
        match &sent[0] {
            (_, dests, Message::Propose { slot, proposal }) => {
                assert_eq!(dests, &vec![me]);
                assert_eq!(*slot, 2);
                assert_eq!(proposal.client_id, 222);
            }
            other => panic!("unexpected: {other:?}"),
        }
        assert_eq!(replica.borrow().next_slot, 3);
    }

    #[test]
    fn decision_out_of_order_then_cascade_commits() {
        let net = FakeNetwork::new();
        let me = addr();
        let node = net.new_node(me);
        let caller1 = addr();
        let p1 = Proposal::new(Some(caller1), 1, b"a".to_vec());
        let mut decisions = BTreeMap::new();
        decisions.insert(1u64, p1);
        let replica = Replica::spawn(node.clone(), noop_sm(), b"state".to_vec(), 2, decisions, vec![me]);
        net.clear_sent();

        let caller2 = addr();
        let caller3 = addr();
        let p2 = Proposal::new(Some(caller2), 2, b"b".to_vec());
        let p3 = Proposal::new(Some(caller3), 3, b"c".to_vec());

        node.receive(me, Message::Decision { slot: 3, proposal: p3.clone() });
        assert_eq!(net.sent().len(), 0);
        assert_eq!(replica.borrow().next_slot, 4);

        node.receive(me, Message::Decision { slot: 2, proposal: p2.clone() });
        assert_eq!(replica.borrow().slot, 4);

        let sent = net.sent();
        let invoked_to: Vec<Address> = sent
            .iter()
            .filter_map(|(_, dests, m)| match m {
                Message::Invoked { .. } => Some(dests[0]),
                _ => None,
            })
            .collect();
        assert_eq!(invoked_to, vec![caller2, caller3]);
    }

    #[test]
    fn repeat_decision_for_committed_slot_with_same_proposal_is_a_no_op() {
        let net = FakeNetwork::new();
        let me = addr();
        let node = net.new_node(me);
        let replica = Replica::spawn(node.clone(), noop_sm(), b"state".to_vec(), 1, BTreeMap::new(), vec![me]);
        let caller = addr();
        let p = Proposal::new(Some(caller), 1, b"a".to_vec());
        node.receive(me, Message::Decision { slot: 1, proposal: p.clone() });
        net.clear_sent();

        node.receive(me, Message::Decision { slot: 1, proposal: p });
        assert_eq!(net.sent().len(), 0);
        assert_eq!(replica.borrow().slot, 2);
    }

    #[test]
    #[should_panic(expected = "safety violation")]
    fn repeat_decision_for_committed_slot_with_different_proposal_panics() {
        let net = FakeNetwork::new();
        let me = addr();
        let node = net.new_node(me);
        Replica::spawn(node.clone(), noop_sm(), b"state".to_vec(), 1, BTreeMap::new(), vec![me]);
        let p1 = Proposal::new(Some(addr()), 1, b"a".to_vec());
        let p2 = Proposal::new(Some(addr()), 2, b"b".to_vec());
        node.receive(me, Message::Decision { slot: 1, proposal: p1 });
        node.receive(me, Message::Decision { slot: 1, proposal: p2 });
    }

    #[test]
    fn join_from_known_peer_gets_welcomed() {
        let net = FakeNetwork::new();
        let me = addr();
        let peer = addr();
        let node = net.new_node(me);
        let mut decisions = BTreeMap::new();
        decisions.insert(1u64, Proposal::new(None, 0, vec![]));
        Replica::spawn(node.clone(), noop_sm(), b"state".to_vec(), 2, decisions, vec![me, peer]);
        net.clear_sent();

        node.receive(peer, Message::Join);

        let sent = net.sent();
        assert_eq!(sent.len(), 1);
        match &sent[0] {
            (_, dests, Message::Welcome { state, slot, .. }) => {
                assert_eq!(dests, &vec![peer]);
                assert_eq!(state, b"state");
                assert_eq!(*slot, 2);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn join_from_unknown_sender_is_ignored() {
        let net = FakeNetwork::new();
        let me = addr();
        let node = net.new_node(me);
        Replica::spawn(node.clone(), noop_sm(), b"state".to_vec(), 1, BTreeMap::new(), vec![me]);
        net.clear_sent();

        node.receive(addr(), Message::Join);
        assert_eq!(net.sent().len(), 0);
    }
}
