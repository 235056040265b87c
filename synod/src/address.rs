//! Node addresses.
//!
//! Every [Node](crate::node::Node) in the cluster is named by an [Address]: an opaque
//! 128-bit identifier generated at node creation time (or supplied by the embedding
//! application, e.g. parsed out of a config file), comparable, hashable, and rendered in a
//! human-readable `"addr:<hex>"` form for logs and error messages.

use one_two_eight::{generate_id, generate_id_prototk};

use crate::error::Error;

generate_id! {Address, "addr:"}
generate_id_prototk! {Address}

impl Address {
    /// Parse an address from its human-readable form, as accepted on the command line or in
    /// a peer list.
    pub fn parse(s: &str) -> Result<Address, Error> {
        Address::from_human_readable(s).ok_or_else(|| Error::invalid_address(s))
    }
}
