//! The wire message taxonomy.
//!
//! [Node](crate::node::Node) hands each delivered message to every registered role as an
//! explicit tagged-variant match; a role that declares no interest in a given variant simply
//! doesn't match it in its `handle` method, so unrecognized variants are silently ignored.

use std::collections::BTreeMap;

use crate::ballot::Ballot;
use crate::address::Address;
use crate::proposal::{Proposal, Slot};

/// Everything a role can be handed: one variant per wire message in the protocol, each
/// carrying exactly the fields its handlers need.
#[derive(Clone, Debug)]
pub enum Message {
    Join,
    Welcome {
        state: Vec<u8>,
        slot: Slot,
        decisions: BTreeMap<Slot, Proposal>,
    },
    Prepare {
        ballot_num: Ballot,
    },
    Promise {
        ballot_num: Ballot,
        accepted_proposals: BTreeMap<Slot, (Ballot, Proposal)>,
    },
    Accept {
        slot: Slot,
        ballot_num: Ballot,
        proposal: Proposal,
    },
    Accepted {
        slot: Slot,
        ballot_num: Ballot,
    },
    Decision {
        slot: Slot,
        proposal: Proposal,
    },
    Invoke {
        caller: Address,
        client_id: u64,
        input_value: Vec<u8>,
    },
    Invoked {
        client_id: u64,
        output: Vec<u8>,
    },
    Propose {
        slot: Slot,
        proposal: Proposal,
    },
    Adopted {
        ballot_num: Ballot,
        accepted_proposals: BTreeMap<Slot, (Ballot, Proposal)>,
    },
    Accepting {
        leader: Address,
    },
    Active,
    Preempted {
        slot: Option<Slot>,
        preempted_by: Ballot,
    },
    Decided {
        slot: Slot,
    },
}

impl Message {
    /// The message's wire tag. Used for logging only -- dispatch itself is a match on the
    /// variant, not a string lookup.
    pub fn tag(&self) -> &'static str {
        match self {
            Message::Join => "JOIN",
            Message::Welcome { .. } => "WELCOME",
            Message::Prepare { .. } => "PREPARE",
            Message::Promise { .. } => "PROMISE",
            Message::Accept { .. } => "ACCEPT",
            Message::Accepted { .. } => "ACCEPTED",
            Message::Decision { .. } => "DECISION",
            Message::Invoke { .. } => "INVOKE",
            Message::Invoked { .. } => "INVOKED",
            Message::Propose { .. } => "PROPOSE",
            Message::Adopted { .. } => "ADOPTED",
            Message::Accepting { .. } => "ACCEPTING",
            Message::Active => "ACTIVE",
            Message::Preempted { .. } => "PREEMPTED",
            Message::Decided { .. } => "DECIDED",
        }
    }
}

/// Merge two `slot -> (ballot, proposal)` maps, keeping the highest-ballot entry at each
/// slot ("pick value with highest ballot"). Slots present on only one side pass through
/// unchanged. Used by the scout to fold a newly arrived PROMISE into its running merge, and
/// by the leader to fold a scout's ADOPTED into its own proposal table.
pub fn merge_accepted(
    into: &mut BTreeMap<Slot, (Ballot, Proposal)>,
    from: &BTreeMap<Slot, (Ballot, Proposal)>,
) {
    for (slot, (ballot, proposal)) in from {
        match into.get(slot) {
            Some((existing_ballot, _)) if *existing_ballot >= *ballot => {}
            _ => {
                into.insert(*slot, (*ballot, proposal.clone()));
            }
        }
    }
}
