//! Read model published to session consumers.
//!
//! The controller publishes complete `AuthSnapshot`s over a watch channel;
//! a consumer always observes a whole state, never a torn intermediate. The
//! snapshot constructors enforce that a profile is carried exactly when the
//! status is `Authenticated`.

use tokio::sync::watch;

use crate::models::Profile;

/// Session lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Unauthenticated,
    Authenticating,
    Authenticated,
    RefreshFailed,
}

/// One complete, consistent observation of the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthSnapshot {
    status: SessionStatus,
    profile: Option<Profile>,
    last_error: Option<String>,
}

impl AuthSnapshot {
    pub(crate) fn unauthenticated(last_error: Option<String>) -> Self {
        Self {
            status: SessionStatus::Unauthenticated,
            profile: None,
            last_error,
        }
    }

    pub(crate) fn authenticating() -> Self {
        Self {
            status: SessionStatus::Authenticating,
            profile: None,
            last_error: None,
        }
    }

    pub(crate) fn authenticated(profile: Profile) -> Self {
        Self {
            status: SessionStatus::Authenticated,
            profile: Some(profile),
            last_error: None,
        }
    }

    /// Authenticated, but the commit could not be persisted; the session is
    /// memory-only for this run and the error says so.
    pub(crate) fn authenticated_degraded(profile: Profile, last_error: String) -> Self {
        Self {
            status: SessionStatus::Authenticated,
            profile: Some(profile),
            last_error: Some(last_error),
        }
    }

    pub(crate) fn refresh_failed(last_error: String) -> Self {
        Self {
            status: SessionStatus::RefreshFailed,
            profile: None,
            last_error: Some(last_error),
        }
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn profile(&self) -> Option<&Profile> {
        self.profile.as_ref()
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    #[allow(dead_code)]
    pub fn is_authenticated(&self) -> bool {
        self.status == SessionStatus::Authenticated
    }
}

/// Receiving side of the notifier. Cheap to clone; every consumer sees the
/// same sequence of published states.
#[derive(Clone)]
pub struct AuthWatcher {
    rx: watch::Receiver<AuthSnapshot>,
}

impl AuthWatcher {
    pub(crate) fn new(rx: watch::Receiver<AuthSnapshot>) -> Self {
        Self { rx }
    }

    /// The most recently published snapshot.
    pub fn snapshot(&self) -> AuthSnapshot {
        self.rx.borrow().clone()
    }

    /// Wait until the session state changes, then return the new snapshot.
    /// If the controller has gone away, returns the last published state.
    #[allow(dead_code)]
    pub async fn changed(&mut self) -> AuthSnapshot {
        let _ = self.rx.changed().await;
        self.rx.borrow().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::testing::sample_profile;

    #[test]
    fn authenticated_snapshots_always_carry_a_profile() {
        let snapshot = AuthSnapshot::authenticated(sample_profile("mara"));
        assert!(snapshot.is_authenticated());
        assert!(snapshot.profile().is_some());
        assert!(snapshot.last_error().is_none());

        let degraded =
            AuthSnapshot::authenticated_degraded(sample_profile("mara"), "disk full".to_string());
        assert!(degraded.is_authenticated());
        assert!(degraded.profile().is_some());
        assert_eq!(degraded.last_error(), Some("disk full"));
    }

    #[test]
    fn non_authenticated_snapshots_never_carry_a_profile() {
        for snapshot in [
            AuthSnapshot::unauthenticated(None),
            AuthSnapshot::unauthenticated(Some("bad password".to_string())),
            AuthSnapshot::authenticating(),
            AuthSnapshot::refresh_failed("expired".to_string()),
        ] {
            assert!(snapshot.profile().is_none());
            assert!(!snapshot.is_authenticated());
        }
    }

    #[tokio::test]
    async fn watcher_observes_published_changes() {
        let (tx, rx) = watch::channel(AuthSnapshot::unauthenticated(None));
        let mut watcher = AuthWatcher::new(rx);
        assert_eq!(watcher.snapshot().status(), SessionStatus::Unauthenticated);

        tx.send_replace(AuthSnapshot::authenticated(sample_profile("mara")));
        let snapshot = watcher.changed().await;
        assert!(snapshot.is_authenticated());
        assert_eq!(snapshot.profile().map(|p| p.username.as_str()), Some("mara"));
    }
}
