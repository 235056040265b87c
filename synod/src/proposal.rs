//! Proposals and slots.

use crate::address::Address;

/// A slot is a position in the totally ordered decision log. Slots are assigned starting at
/// 1; slot 0 is never used so that `Option<Slot>` and "no slot yet" are easy to tell apart
/// in logs without relying on the `Option` wrapper everywhere.
pub type Slot = u64;

/// A client operation put to consensus: who asked (`caller`), which request of theirs this
/// is (`client_id`), and the opaque `input` handed to the state machine. `caller` is absent
/// for no-op filler proposals used while a replica catches up across a gap it didn't cause.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Proposal {
    pub caller: Option<Address>,
    pub client_id: u64,
    pub input: Vec<u8>,
}

impl Proposal {
    pub fn new(caller: Option<Address>, client_id: u64, input: Vec<u8>) -> Proposal {
        Proposal {
            caller,
            client_id,
            input,
        }
    }
}
