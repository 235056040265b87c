//! This crate's `biometrics` sensors, centralized so the embedding application can register
//! every counter worth watching in one call.

use biometrics::{Collector, Counter};

pub static SCOUTS_ADOPTED: Counter = Counter::new("synod.scout.adopted");
pub static SCOUTS_PREEMPTED: Counter = Counter::new("synod.scout.preempted");
pub static COMMANDS_DECIDED: Counter = Counter::new("synod.commander.decided");
pub static COMMANDS_PREEMPTED: Counter = Counter::new("synod.commander.preempted");
pub static SLOTS_COMMITTED: Counter = Counter::new("synod.replica.slots_committed");
pub static LEADER_PREEMPTIONS: Counter = Counter::new("synod.leader.preempted");
pub static BOOTSTRAP_ABANDONED: Counter = Counter::new("synod.bootstrap.abandoned");

/// Register every sensor this crate defines with `collector`.
pub fn register_biometrics(collector: &Collector) {
    collector.register_counter(&SCOUTS_ADOPTED);
    collector.register_counter(&SCOUTS_PREEMPTED);
    collector.register_counter(&COMMANDS_DECIDED);
    collector.register_counter(&COMMANDS_PREEMPTED);
    collector.register_counter(&SLOTS_COMMITTED);
    collector.register_counter(&LEADER_PREEMPTIONS);
    collector.register_counter(&BOOTSTRAP_ABANDONED);
}
