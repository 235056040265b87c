//! The synchronous façade an embedding application talks to.
//!
//! Construct a node on a network, install a [Seed](crate::seed::Seed) (joining a brand-new
//! cluster) or a [Bootstrap](crate::bootstrap::Bootstrap) (joining an existing one), run the
//! protocol on a background thread, and expose a blocking `invoke` that resolves once the
//! proposed input is decided and executed.
//!
//! Nothing here is `Send` (`Rc`/`RefCell` throughout, matching the rest of the crate's
//! single-threaded cooperative model), so the calling thread and the thread running the
//! network's event loop can never be allowed to touch the same `Node` at once. Before
//! [Member::start] the calling thread is the only thread there is, so `invoke` drives the
//! node directly; after `start`, `invoke` instead hands its request across an `mpsc` channel
//! to the thread that owns the run loop, which spawns the `Requester` on its own behalf.

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::sync::mpsc;
use std::thread;

use crate::address::Address;
use crate::bootstrap::Bootstrap;
use crate::network::{Network, SimNetwork};
use crate::node::Node;
use crate::requester::Requester;
use crate::seed::Seed;
use crate::state_machine::StateMachine;

enum Mode {
    /// No background thread yet: the constructing thread still owns `node` and `network`
    /// outright, so `invoke` may touch them directly.
    Local {
        node: Rc<Node>,
        network: Rc<SimNetwork>,
    },
    /// [Member::start] has handed `node` and `network` off to a worker thread; further
    /// `invoke` calls must go through `command_tx`.
    Threaded { command_tx: mpsc::Sender<Command> },
}

enum Command {
    Invoke {
        input: Vec<u8>,
        result_tx: mpsc::SyncSender<Vec<u8>>,
    },
}

/// Wraps a value that is not `Send` so it can be moved into a newly spawned thread exactly
/// once. Sound because after [Member::start] hands its payload off this way, the constructing
/// thread never touches it again -- all further access goes through `Mode::Threaded`'s channel.
struct SendOnce<T>(T);
unsafe impl<T> Send for SendOnce<T> {}

/// Represents this process's membership in a synod cluster: one [Node], one startup role
/// (seed or bootstrap), and -- once [Member::start] is called -- one worker thread running
/// the protocol.
pub struct Member {
    mode: RefCell<Mode>,
    thread: RefCell<Option<thread::JoinHandle<()>>>,
    outstanding: Cell<bool>,
}

impl Member {
    /// Join an existing cluster: installs a [Bootstrap] that cycles JOIN through `peers`.
    pub fn new(
        execute_fn: Rc<dyn StateMachine>,
        network: Rc<SimNetwork>,
        peers: Vec<Address>,
        address: Option<Address>,
    ) -> Member {
        let node = network.new_node(address);
        Bootstrap::spawn(node.clone(), peers, execute_fn);
        Member {
            mode: RefCell::new(Mode::Local { node, network }),
            thread: RefCell::new(None),
            outstanding: Cell::new(false),
        }
    }

    /// Found a brand-new cluster: installs a [Seed] carrying `initial_state`, answering JOINs
    /// from `peers` until quorum. An empty `peers` list means this is the cluster's only
    /// node -- there is no one to exchange JOIN/WELCOME with, so it goes straight to steady
    /// state rather than waiting on a quorum that can never arrive.
    pub fn new_seed(
        execute_fn: Rc<dyn StateMachine>,
        network: Rc<SimNetwork>,
        peers: Vec<Address>,
        initial_state: Vec<u8>,
        address: Option<Address>,
    ) -> Member {
        let node = network.new_node(address);
        if peers.is_empty() {
            crate::seed::install_cluster_roles(
                node.clone(),
                execute_fn,
                initial_state,
                1,
                Default::default(),
                vec![node.address],
            );
        } else {
            Seed::spawn(node.clone(), initial_state, peers, execute_fn);
        }
        Member {
            mode: RefCell::new(Mode::Local { node, network }),
            thread: RefCell::new(None),
            outstanding: Cell::new(false),
        }
    }

    pub fn address(&self) -> Address {
        match &*self.mode.borrow() {
            Mode::Local { node, .. } => node.address,
            Mode::Threaded { .. } => panic!("Member::address called after start()"),
        }
    }

    /// Launch the protocol's run loop on a dedicated thread. Idempotent calls panic: a
    /// `Member` owns exactly one run loop for its whole lifetime.
    pub fn start(&self) {
        let (command_tx, command_rx) = mpsc::channel::<Command>();
        let previous = std::mem::replace(
            &mut *self.mode.borrow_mut(),
            Mode::Threaded {
                command_tx: command_tx.clone(),
            },
        );
        let (node, network) = match previous {
            Mode::Local { node, network } => (node, network),
            Mode::Threaded { .. } => panic!("Member::start called more than once"),
        };
        let payload = SendOnce((node, network, command_rx));
        let handle = thread::Builder::new()
            .name("synod-member".to_string())
            .spawn(move || {
                let SendOnce((node, network, command_rx)) = payload;
                network.run_with_hook(|| {
                    while let Ok(Command::Invoke { input, result_tx }) = command_rx.try_recv() {
                        Requester::spawn(
                            node.clone(),
                            input,
                            Box::new(move |output| {
                                let _ = result_tx.send(output);
                            }),
                        );
                    }
                });
            })
            .expect("failed to spawn synod member thread");
        *self.thread.borrow_mut() = Some(handle);
    }

    /// Propose `input_value` for consensus and block until the decided value has run through
    /// the state machine, returning its output. Only one `invoke` may be outstanding on a
    /// given `Member` at a time.
    pub fn invoke(&self, input_value: Vec<u8>) -> Vec<u8> {
        assert!(
            !self.outstanding.replace(true),
            "only one outstanding invoke per Member"
        );
        let (result_tx, result_rx) = mpsc::sync_channel(0);
        let output = match &*self.mode.borrow() {
            Mode::Local { node, network } => {
                let result = Rc::new(RefCell::new(None));
                let result_clone = result.clone();
                Requester::spawn(
                    node.clone(),
                    input_value,
                    Box::new(move |output| *result_clone.borrow_mut() = Some(output)),
                );
                while result.borrow().is_none() {
                    if !network.step() {
                        break;
                    }
                }
                result
                    .borrow_mut()
                    .take()
                    .expect("requester never received a matching INVOKED")
            }
            Mode::Threaded { command_tx } => {
                command_tx
                    .send(Command::Invoke {
                        input: input_value,
                        result_tx,
                    })
                    .expect("member thread is gone");
                result_rx.recv().expect("member thread dropped the requester")
            }
        };
        self.outstanding.set(false);
        output
    }
}

impl Drop for Member {
    fn drop(&mut self) {
        if let Mode::Threaded { .. } = &*self.mode.borrow() {
            // The network never stops on its own (repeating timers keep the heap non-empty),
            // so a clean shutdown would need a `Command::Stop` plumbed through the same
            // channel. Out of scope here: demo/test processes simply exit, and the detached
            // thread dies with them.
        }
        if let Some(handle) = self.thread.borrow_mut().take() {
            drop(handle);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn echo_sm() -> Rc<dyn StateMachine> {
        Rc::new(|_state: &[u8], input: &[u8]| (input.to_vec(), input.to_vec()))
    }

    #[test]
    fn seed_of_one_converges_and_answers_invoke_without_starting_a_thread() {
        let network = SimNetwork::new(1);
        let member = Member::new_seed(echo_sm(), network.clone(), vec![], b"state".to_vec(), None);
        let output = member.invoke(b"hello".to_vec());
        assert_eq!(output, b"hello");
    }

    #[test]
    fn second_invoke_may_reuse_the_member_once_the_first_completes() {
        let network = SimNetwork::new(2);
        let member = Member::new_seed(echo_sm(), network.clone(), vec![], b"state".to_vec(), None);
        assert_eq!(member.invoke(b"one".to_vec()), b"one".to_vec());
        assert_eq!(member.invoke(b"two".to_vec()), b"two".to_vec());
    }

    #[test]
    #[should_panic(expected = "only one outstanding invoke per Member")]
    fn invoke_is_not_reentrant() {
        let network = SimNetwork::new(3);
        let member = Member::new_seed(echo_sm(), network.clone(), vec![], b"state".to_vec(), None);
        member.outstanding.set(true);
        let _ = member.invoke(b"x".to_vec());
    }
}
