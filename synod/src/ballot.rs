//! Ballots order rounds of the synod protocol.
//!
//! A ballot is the pair `(number, leader)`, compared lexicographically on `number` first,
//! then on `leader`. Only the named leader may issue proposals under a given ballot; the
//! overall protocol guarantees that no two replicas ever drive the protocol under the same
//! ballot.

use crate::address::Address;

/// A Paxos ballot number, scoped to the leader that owns it.
///
/// Ballots are totally ordered: when `a < b`, `b` supersedes `a`, and any proposer whose
/// ballot has been superseded must pick a new ballot greater than both to regain standing.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Ballot {
    pub number: u64,
    pub leader: Address,
}

impl Ballot {
    /// The null ballot, less than every real ballot ever issued. Acceptors start here.
    pub const BOTTOM: Ballot = Ballot {
        number: 0,
        leader: Address::BOTTOM,
    };

    pub fn new(number: u64, leader: Address) -> Ballot {
        Ballot { number, leader }
    }

    /// The next ballot a leader should adopt after being preempted by `preempted_by`:
    /// `(preempted_by.number + 1, self.leader)` -- the leader component does not change to
    /// the preempting ballot's leader; only the number is bumped.
    pub fn succeeding(&self, preempted_by: Ballot) -> Ballot {
        Ballot {
            number: preempted_by.number + 1,
            leader: self.leader,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordered_by_number_then_leader() {
        let low_leader = Address::BOTTOM;
        let high_leader = Address::TOP;
        assert!(Ballot::new(1, high_leader) < Ballot::new(2, low_leader));
        assert!(Ballot::new(5, low_leader) < Ballot::new(5, high_leader));
        assert_eq!(Ballot::new(5, low_leader), Ballot::new(5, low_leader));
    }

    #[test]
    fn bottom_is_least() {
        assert!(Ballot::BOTTOM < Ballot::new(0, Address::TOP));
        assert!(Ballot::BOTTOM < Ballot::new(1, Address::BOTTOM));
    }

    #[test]
    fn succeeding_bumps_number_keeps_leader() {
        let mine = Ballot::new(0, Address::BOTTOM);
        let preempted_by = Ballot::new(22, Address::TOP);
        let next = mine.succeeding(preempted_by);
        assert_eq!(next.number, 23);
        assert_eq!(next.leader, Address::BOTTOM);
    }
}
