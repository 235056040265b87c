//! Retransmission and liveness intervals shared by every role's timers.

use std::time::Duration;

pub const JOIN_RETRANSMIT: Duration = Duration::from_millis(700);
pub const ACCEPT_RETRANSMIT: Duration = Duration::from_secs(1);
pub const PREPARE_RETRANSMIT: Duration = Duration::from_secs(1);
pub const INVOKE_RETRANSMIT: Duration = Duration::from_secs(1);
pub const LEADER_TIMEOUT: Duration = Duration::from_secs(1);

/// How many times `Bootstrap` cycles through its entire peer list looking for a WELCOME
/// before giving up.
pub const JOIN_ATTEMPTS_BEFORE_GIVING_UP: usize = 10;

/// Any majority of `peers`: `floor(peers/2) + 1`.
pub fn quorum(peers: usize) -> usize {
    peers / 2 + 1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quorum_of_three_is_two() {
        assert_eq!(quorum(3), 2);
    }

    #[test]
    fn quorum_of_one_is_one() {
        assert_eq!(quorum(1), 1);
    }

    #[test]
    fn quorum_of_seven_is_four() {
        assert_eq!(quorum(7), 4);
    }
}
