//! Errors.
//!
//! Most of this crate does not return `Result` at all: transport loss/reorder/duplication is
//! tolerated by retransmission, preemption is a normal protocol event, and a decision
//! conflict at a slot is a fatal safety violation that must abort rather than propagate as a
//! recoverable error. `Error` below covers the remaining genuinely fallible, non-protocol
//! operations: parsing an address, and a bootstrap that gives up without ever hearing a
//! WELCOME. It implements `zerror::Z` directly, keeping error context to a short chain of
//! string tokens rather than heavier backtrace-and-token bookkeeping this crate's small error
//! surface doesn't need.

use std::fmt::Debug;

use zerror::Z;

#[derive(Clone, Debug)]
pub enum Error {
    /// A peer address string did not parse as a valid [crate::address::Address].
    InvalidAddress { text: String, info: Vec<String> },
    /// A bootstrap exhausted its configured peer list without ever receiving a WELCOME.
    NoClusterFound {
        peers_tried: usize,
        info: Vec<String>,
    },
}

impl Error {
    pub fn invalid_address(text: impl Into<String>) -> Error {
        Error::InvalidAddress {
            text: text.into(),
            info: Vec::new(),
        }
    }

    pub fn no_cluster_found(peers_tried: usize) -> Error {
        Error::NoClusterFound {
            peers_tried,
            info: Vec::new(),
        }
    }

    fn info_mut(&mut self) -> &mut Vec<String> {
        match self {
            Error::InvalidAddress { info, .. } => info,
            Error::NoClusterFound { info, .. } => info,
        }
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::InvalidAddress { text, info } => {
                write!(f, "invalid address: {text:?}")?;
                for entry in info {
                    write!(f, "\n  {entry}")?;
                }
                Ok(())
            }
            Error::NoClusterFound { peers_tried, info } => {
                write!(f, "no cluster found after trying {peers_tried} peer(s)")?;
                for entry in info {
                    write!(f, "\n  {entry}")?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for Error {}

impl Z for Error {
    type Error = Error;

    fn long_form(&self) -> String {
        format!("{self}")
    }

    #[allow(deprecated)]
    fn with_token(self, identifier: &str, value: &str) -> Self::Error {
        self.with_info(identifier, value)
    }

    #[allow(deprecated)]
    fn with_url(self, identifier: &str, url: &str) -> Self::Error {
        self.with_info(identifier, url)
    }

    #[allow(deprecated)]
    fn with_variable<X: Debug>(self, variable: &str, x: X) -> Self::Error {
        self.with_info(variable, x)
    }

    fn with_info<X: Debug>(mut self, name: &str, value: X) -> Self::Error {
        self.info_mut().push(format!("{name} = {value:?}"));
        self
    }

    fn with_lazy_info<F: FnOnce() -> String>(mut self, name: &str, value: F) -> Self::Error {
        self.info_mut().push(format!("{name} = {}", value()));
        self
    }
}
