// ==============
// crates/backend-lib/src/metrics.rs

//! Central place for metric keys
use crate::room::{COMMAND_DESTROYED, PLAYER_DISCONNECTED};

pub const WS_ACTIVE: &str = "ws.active";
pub const WS_AUTH_FAILED: &str = "ws.auth_failed";
pub const ROOMS_CREATED: &str = "rooms.created";
pub const ROOMS_CLOSED: &str = "rooms.closed";
pub const ROOMS_ACTIVE: &str = "rooms.active";
/// Labelled with `reason`, see [`fail_reason_label`]
pub const ROOMS_FAILED: &str = "rooms.failed";
pub const LEADERBOARD_SCORES: &str = "leaderboard.scores";

/// `reason` label value for client-supplied failure reasons
pub const CLIENT_FAIL_REASON: &str = "client";

/// Label for [`ROOMS_FAILED`]. Reasons the server detects itself pass through;
/// anything else came from a client and collapses to [`CLIENT_FAIL_REASON`].
pub fn fail_reason_label(reason: &str) -> &'static str {
    match reason {
        COMMAND_DESTROYED => COMMAND_DESTROYED,
        PLAYER_DISCONNECTED => PLAYER_DISCONNECTED,
        _ => CLIENT_FAIL_REASON,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fail_reason_label_is_bounded() {
        assert_eq!(fail_reason_label(COMMAND_DESTROYED), "command_destroyed");
        assert_eq!(fail_reason_label(PLAYER_DISCONNECTED), "player_disconnected");
        assert_eq!(fail_reason_label("gaveup"), CLIENT_FAIL_REASON);
        assert_eq!(fail_reason_label(&"x".repeat(32)), CLIENT_FAIL_REASON);
    }
}
