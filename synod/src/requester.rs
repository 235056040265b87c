//! Client-side proposal driver: retransmits INVOKE to the local Replica until INVOKED
//! arrives with a matching `client_id`.
//!
//! Client ids come from a process-wide `AtomicU64` counter seeded well above any
//! test-literal range, so they can never collide with a hand-picked test `client_id`.

use std::cell::RefCell;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::address::Address;
use crate::constants::INVOKE_RETRANSMIT;
use crate::message::Message;
use crate::node::Node;
use crate::role::{Role, RoleBase};
use crate::timer::TimerHandle;

static NEXT_CLIENT_ID: AtomicU64 = AtomicU64::new(100_000);

fn next_client_id() -> u64 {
    NEXT_CLIENT_ID.fetch_add(1, Ordering::Relaxed)
}

pub struct Requester {
    base: RoleBase,
    self_weak: RefCell<Weak<RefCell<Requester>>>,
    client_id: u64,
    input_value: Vec<u8>,
    callback: RefCell<Option<Box<dyn FnOnce(Vec<u8>)>>>,
    invoke_timer: RefCell<Option<TimerHandle>>,
}

impl Requester {
    pub fn spawn(
        node: Rc<Node>,
        input_value: Vec<u8>,
        callback: Box<dyn FnOnce(Vec<u8>)>,
    ) -> Rc<RefCell<Requester>> {
        let requester = crate::role::spawn(Requester {
            base: RoleBase::new(node, "Requester"),
            self_weak: RefCell::new(Weak::new()),
            client_id: next_client_id(),
            input_value,
            callback: RefCell::new(Some(callback)),
            invoke_timer: RefCell::new(None),
        });
        *requester.borrow().self_weak.borrow_mut() = Rc::downgrade(&requester);
        requester.borrow().start();
        requester
    }

    pub fn client_id(&self) -> u64 {
        self.client_id
    }

    fn start(&self) {
        let address = self.base.node.address;
        self.base.node.send(
            &[address],
            Message::Invoke {
                caller: address,
                client_id: self.client_id,
                input_value: self.input_value.clone(),
            },
        );
        let weak = self.self_weak.borrow().clone();
        let handle = self
            .base
            .set_timer(INVOKE_RETRANSMIT.as_secs_f64(), move || {
                if let Some(requester) = weak.upgrade() {
                    requester.borrow().start();
                }
            });
        *self.invoke_timer.borrow_mut() = handle;
    }
}

impl Role for Requester {
    fn base(&self) -> &RoleBase {
        &self.base
    }

    fn handle(&mut self, _sender: Address, message: &Message) {
        if let Message::Invoked { client_id, output } = message {
            if *client_id != self.client_id {
                return;
            }
            if let Some(handle) = self.invoke_timer.borrow_mut().take() {
                handle.cancel();
            }
            if let Some(callback) = self.callback.borrow_mut().take() {
                callback(output.clone());
            }
            self.base.stop();
        }
    }
}
