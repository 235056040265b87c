//! The contract for the user-supplied deterministic state machine that consensus drives.
//!
//! `Proposal::input`, `Message::Welcome::state`, and `Message::Invoked::output` are all
//! opaque byte strings at the consensus boundary, so the trait operates directly on `&[u8]`
//! rather than introducing associated `State`/`Input`/`Output` types that would just wrap
//! byte (de)serialization a caller already has to do at the `Member::invoke` boundary.

/// A deterministic, total state-transition function: `execute(state, input) -> (state',
/// output)`. Must not mutate `state` in place -- `Replica::commit` depends on being able to
/// keep the prior state around for logging and on `execute` returning a fresh value.
pub trait StateMachine {
    fn execute(&self, state: &[u8], input: &[u8]) -> (Vec<u8>, Vec<u8>);
}

impl<F: Fn(&[u8], &[u8]) -> (Vec<u8>, Vec<u8>)> StateMachine for F {
    fn execute(&self, state: &[u8], input: &[u8]) -> (Vec<u8>, Vec<u8>) {
        (self)(state, input)
    }
}
