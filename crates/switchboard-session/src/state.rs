//! The session lifecycle state machine.
//!
//! ```text
//!   Created ──→ Authenticating ──→ AwaitingScan ──→ Authenticated ──→ Ready
//!                  ↑    │  └──────────────┼───────────→─┘  │            │
//!                  │    └─────────────────┴──────→ Disconnected ←───────┘
//!                  │                                    │
//!                  └────────── Reconnecting ←───(grace)─┘
//!
//!   any state ──(removal)──→ Terminated
//! ```
//!
//! `Terminated` is absorbing and is only reached through
//! [`SessionRegistry::remove`](crate::SessionRegistry::remove); no call to
//! `transition` can produce it.

use std::fmt;

use serde::Serialize;

/// Where a session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Registered, transport not requested yet.
    Created,
    /// Transport requested; waiting for a pairing payload or restored
    /// credentials.
    Authenticating,
    /// A pairing payload was issued and is waiting to be scanned.
    AwaitingScan,
    /// The transport accepted the credentials.
    Authenticated,
    /// Fully up. Keep-alive is attached only in this state.
    Ready,
    /// The transport dropped; the grace delay is running.
    Disconnected,
    /// A recovery attempt owns the session.
    Reconnecting,
    /// Removed from the registry.
    Terminated,
}

impl SessionState {
    /// Whether the state table allows moving from `self` to `to`.
    pub fn can_transition_to(self, to: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, to),
            (Created, Authenticating)
                | (Authenticating, AwaitingScan)
                | (Authenticating, Authenticated)
                | (Authenticating, Disconnected)
                | (AwaitingScan, Authenticated)
                | (AwaitingScan, Disconnected)
                | (Authenticated, Ready)
                | (Authenticated, Disconnected)
                | (Ready, Disconnected)
                | (Disconnected, Reconnecting)
                | (Reconnecting, Authenticating)
        )
    }

    /// Still exchanging credentials.
    pub fn is_pairing(self) -> bool {
        matches!(self, Self::Authenticating | Self::AwaitingScan)
    }

    /// Authenticated, whether or not the session finished loading.
    pub fn is_authenticated(self) -> bool {
        matches!(self, Self::Authenticated | Self::Ready)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Authenticating => "authenticating",
            Self::AwaitingScan => "awaiting_scan",
            Self::Authenticated => "authenticated",
            Self::Ready => "ready",
            Self::Disconnected => "disconnected",
            Self::Reconnecting => "reconnecting",
            Self::Terminated => "terminated",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::SessionState::*;
    use super::*;

    const ALL: [SessionState; 8] = [
        Created,
        Authenticating,
        AwaitingScan,
        Authenticated,
        Ready,
        Disconnected,
        Reconnecting,
        Terminated,
    ];

    #[test]
    fn test_can_transition_to_happy_path_allowed() {
        let path = [
            Created,
            Authenticating,
            AwaitingScan,
            Authenticated,
            Ready,
            Disconnected,
            Reconnecting,
            Authenticating,
        ];
        for pair in path.windows(2) {
            assert!(
                pair[0].can_transition_to(pair[1]),
                "{} -> {} should be legal",
                pair[0],
                pair[1]
            );
        }
    }

    #[test]
    fn test_can_transition_to_terminated_never_allowed() {
        for from in ALL {
            assert!(!from.can_transition_to(Terminated), "{from} -> terminated");
        }
    }

    #[test]
    fn test_can_transition_to_terminated_is_absorbing() {
        for to in ALL {
            assert!(!Terminated.can_transition_to(to), "terminated -> {to}");
        }
    }

    #[test]
    fn test_can_transition_to_ready_requires_authenticated() {
        for from in ALL {
            assert_eq!(from.can_transition_to(Ready), from == Authenticated);
        }
    }

    #[test]
    fn test_can_transition_to_disconnected_from_any_live_state() {
        for from in [Authenticating, AwaitingScan, Authenticated, Ready] {
            assert!(from.can_transition_to(Disconnected));
        }
        assert!(!Created.can_transition_to(Disconnected));
        assert!(!Reconnecting.can_transition_to(Disconnected));
    }

    #[test]
    fn test_serialize_uses_snake_case() {
        let json = serde_json::to_string(&AwaitingScan).unwrap();
        assert_eq!(json, r#""awaiting_scan""#);
        assert_eq!(AwaitingScan.to_string(), "awaiting_scan");
    }
}
