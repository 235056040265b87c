//! A single-threaded, cooperatively-scheduled Multi-Paxos implementation.
//!
//! The role ensemble -- [Acceptor](acceptor::Acceptor), [Scout](scout::Scout),
//! [Commander](commander::Commander), [Leader](leader::Leader), [Replica](replica::Replica),
//! [Seed](seed::Seed), [Bootstrap](bootstrap::Bootstrap), and [Requester](requester::Requester)
//! -- each sit on a [Node](node::Node) and drive the protocol forward by exchanging
//! [Message](message::Message)s over a [Network](network::Network). None of it is `Send`:
//! every role lives behind `Rc<RefCell<_>>` on whichever thread runs its [Network] as a
//! single-threaded cooperative reactor. The one place a second thread appears at all is
//! [Member](member::Member), which owns the run loop and bridges a synchronous `invoke` call
//! in from the embedding application.
//!
//! ```text
//! Bootstrap/Seed --WELCOME/quorum--> Acceptor + Replica + Leader
//! Replica --PROPOSE--> Leader --spawns--> Scout (phase 1), Commander (phase 2, per slot)
//! Commander --DECISION--> every Replica --execute_fn--> Requester --INVOKED--> caller
//! ```
//!
//! See `DESIGN.md` at the workspace root for the grounding ledger behind each module.

pub mod acceptor;
pub mod address;
pub mod ballot;
pub mod bootstrap;
pub mod commander;
pub mod constants;
pub mod error;
pub mod leader;
pub mod logging;
pub mod member;
pub mod message;
pub mod metrics;
pub mod network;
pub mod node;
pub mod proposal;
pub mod replica;
pub mod requester;
pub mod role;
pub mod scout;
pub mod seed;
pub mod state_machine;
pub mod timer;

pub use address::Address;
pub use error::Error;
pub use member::Member;
pub use message::Message;
pub use network::{Network, SimNetwork};
pub use node::Node;
pub use state_machine::StateMachine;
