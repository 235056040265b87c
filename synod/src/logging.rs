//! The crate's structured-logging sink.
//!
//! One process-wide [indicio::Collector]; every `clue!` call site names it explicitly rather
//! than relying on a thread-local or a `log`-crate-style global logger.

pub static COLLECTOR: indicio::Collector = indicio::Collector::new();
