//! The session state machine.
//!
//! `SessionManager` is the single writer to the session store. It owns the
//! in-memory credential set, serializes all session operations, and
//! publishes every state change through the notifier. Consumers hold a
//! cloned handle; there is exactly one session per running client.

use std::sync::{Arc, Mutex};

use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::api::client::{AuthApi, RegisterRequest, TokenRequest};
use crate::api::error::AuthError;
use crate::auth::notifier::{AuthSnapshot, AuthWatcher};
use crate::auth::refresh::renew_session;
use crate::auth::store::SessionStore;
use crate::models::{Profile, ProfileUpdate};

/// Outcome of a registration attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegisterOutcome {
    /// The server issued credentials inline; the session is established.
    SignedIn(Profile),
    /// The account was created without credentials; sign in manually.
    Registered,
}

/// In-memory session state, guarded as one unit so a commit and a logout
/// can never interleave.
struct SessionCell {
    /// Bumped by every logout; an in-flight operation whose epoch no longer
    /// matches discards its result instead of resurrecting the session.
    epoch: u64,
    access: Option<String>,
    refresh: Option<String>,
    profile: Option<Profile>,
    /// Set when a commit could not be persisted; the session then lives in
    /// memory only for the rest of this run.
    memory_only: bool,
}

impl SessionCell {
    fn empty() -> Self {
        Self {
            epoch: 0,
            access: None,
            refresh: None,
            profile: None,
            memory_only: false,
        }
    }
}

struct Inner {
    api: Arc<dyn AuthApi>,
    store: Arc<dyn SessionStore>,
    cell: Mutex<SessionCell>,
    tx: watch::Sender<AuthSnapshot>,
    /// Single-writer guard, held for the full duration of login, register,
    /// and startup recovery. Acquired non-blocking: a second concurrent
    /// operation is rejected with `SessionBusy`, never queued.
    op_guard: tokio::sync::Mutex<()>,
}

/// Cloneable handle to the client's one session.
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<Inner>,
}

impl SessionManager {
    pub fn new(api: Arc<dyn AuthApi>, store: Arc<dyn SessionStore>) -> Self {
        let (tx, _rx) = watch::channel(AuthSnapshot::unauthenticated(None));
        Self {
            inner: Arc::new(Inner {
                api,
                store,
                cell: Mutex::new(SessionCell::empty()),
                tx,
                op_guard: tokio::sync::Mutex::new(()),
            }),
        }
    }

    /// Subscribe to session state changes.
    pub fn watch(&self) -> AuthWatcher {
        AuthWatcher::new(self.inner.tx.subscribe())
    }

    /// The currently published session state.
    pub fn snapshot(&self) -> AuthSnapshot {
        self.inner.tx.borrow().clone()
    }

    /// The access credential for authenticated API calls, if one is held.
    #[allow(dead_code)]
    pub fn access_credential(&self) -> Option<String> {
        self.lock_cell().access.clone()
    }

    fn lock_cell(&self) -> std::sync::MutexGuard<'_, SessionCell> {
        self.inner.cell.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Publish a snapshot only if the operation's epoch is still current,
    /// so a state from before a logout can never overwrite the logout.
    fn publish_if_current(&self, op_epoch: u64, snapshot: AuthSnapshot) {
        let cell = self.lock_cell();
        if cell.epoch == op_epoch {
            self.inner.tx.send_replace(snapshot);
        }
    }

    /// Claim the single-writer slot and record the epoch the operation
    /// belongs to.
    fn begin_op(&self) -> Result<(tokio::sync::MutexGuard<'_, ()>, u64), AuthError> {
        let guard = self
            .inner
            .op_guard
            .try_lock()
            .map_err(|_| AuthError::SessionBusy)?;
        let epoch = self.lock_cell().epoch;
        Ok((guard, epoch))
    }

    /// Install and persist a new credential set and profile as one unit.
    ///
    /// Discards the result with `SessionBusy` when a logout has invalidated
    /// the operation. A failed persist keeps the session in memory only and
    /// reports `StorageUnavailable`.
    fn commit(
        &self,
        op_epoch: u64,
        access: String,
        refresh: String,
        profile: Profile,
    ) -> Result<(), AuthError> {
        // State update, persistence, and publish happen inside one critical
        // section; a concurrent logout is ordered entirely before or after.
        let mut cell = self.lock_cell();
        if cell.epoch != op_epoch {
            debug!("Commit discarded, session was cleared while the operation was in flight");
            return Err(AuthError::SessionBusy);
        }
        let persisted = self.inner.store.write(&access, &refresh, &profile);
        cell.access = Some(access);
        cell.refresh = Some(refresh);
        cell.profile = Some(profile.clone());
        cell.memory_only = persisted.is_err();

        match persisted {
            Ok(()) => {
                self.inner.tx.send_replace(AuthSnapshot::authenticated(profile));
                Ok(())
            }
            Err(err) => {
                warn!(error = %err, "Session persistence failed, continuing in memory only");
                self.inner.tx.send_replace(AuthSnapshot::authenticated_degraded(
                    profile,
                    err.to_string(),
                ));
                Err(err)
            }
        }
    }

    /// Recover a persisted session at startup. Runs once per process start.
    ///
    /// Settles `Unauthenticated` when nothing is stored; otherwise validates
    /// the stored access credential with a profile fetch and falls back to
    /// exactly one renewal attempt. A failed renewal clears the store.
    pub async fn recover(&self) -> Result<AuthSnapshot, AuthError> {
        let (_guard, epoch) = self.begin_op()?;

        let stored = self.inner.store.read();
        let (access, refresh) = match (stored.access, stored.refresh) {
            (Some(access), Some(refresh)) => (access, refresh),
            _ => {
                debug!("No stored credentials");
                self.publish_if_current(epoch, AuthSnapshot::unauthenticated(None));
                return Ok(self.snapshot());
            }
        };

        self.publish_if_current(epoch, AuthSnapshot::authenticating());

        match self.inner.api.fetch_profile(&access).await {
            Ok(profile) => {
                debug!("Stored access credential still valid");
                self.commit(epoch, access, refresh, profile)?;
                Ok(self.snapshot())
            }
            Err(err) => {
                debug!(error = %err, "Stored access credential rejected, attempting renewal");
                match renew_session(self.inner.api.as_ref(), Some(&refresh)).await {
                    Ok(renewed) => {
                        self.commit(epoch, renewed.access, refresh, renewed.profile)?;
                        info!("Session renewed from stored refresh credential");
                        Ok(self.snapshot())
                    }
                    Err(err) => {
                        info!(error = %err, "Session renewal failed, signing out");
                        self.publish_if_current(epoch, AuthSnapshot::refresh_failed(err.to_string()));
                        self.clear_local();
                        self.publish_if_current(
                            epoch,
                            AuthSnapshot::unauthenticated(Some(err.to_string())),
                        );
                        Ok(self.snapshot())
                    }
                }
            }
        }
    }

    /// Sign in with a username or email identifier.
    pub async fn login(&self, identifier: &str, password: &str) -> Result<Profile, AuthError> {
        let (_guard, epoch) = self.begin_op()?;
        self.publish_if_current(epoch, AuthSnapshot::authenticating());

        let result = self.login_inner(epoch, identifier, password).await;
        match &result {
            Ok(profile) => info!(user = %profile.display_name(), "Signed in"),
            // A discarded commit or a degraded commit already published the
            // truthful state; everything else settles unauthenticated.
            Err(AuthError::SessionBusy) | Err(AuthError::StorageUnavailable(_)) => {}
            Err(err) => {
                self.publish_if_current(epoch, AuthSnapshot::unauthenticated(Some(err.to_string())));
            }
        }
        result
    }

    async fn login_inner(
        &self,
        epoch: u64,
        identifier: &str,
        password: &str,
    ) -> Result<Profile, AuthError> {
        let request = TokenRequest::for_identifier(identifier, password);
        let tokens = self.inner.api.issue_tokens(&request).await?;
        let profile = self.inner.api.fetch_profile(&tokens.access).await?;
        self.commit(epoch, tokens.access, tokens.refresh, profile.clone())?;
        Ok(profile)
    }

    /// Create an account. Establishes the session when the server issues
    /// credentials inline; otherwise the caller proceeds to `login`.
    pub async fn register(
        &self,
        username: &str,
        email: &str,
        password: &str,
    ) -> Result<RegisterOutcome, AuthError> {
        let (_guard, epoch) = self.begin_op()?;
        self.publish_if_current(epoch, AuthSnapshot::authenticating());

        let result = self.register_inner(epoch, username, email, password).await;
        match &result {
            Ok(RegisterOutcome::SignedIn(profile)) => {
                info!(user = %profile.display_name(), "Registered and signed in");
            }
            Ok(RegisterOutcome::Registered) => {
                info!("Account created, credentials not issued inline");
                self.publish_if_current(epoch, AuthSnapshot::unauthenticated(None));
            }
            Err(AuthError::SessionBusy) | Err(AuthError::StorageUnavailable(_)) => {}
            Err(err) => {
                self.publish_if_current(epoch, AuthSnapshot::unauthenticated(Some(err.to_string())));
            }
        }
        result
    }

    async fn register_inner(
        &self,
        epoch: u64,
        username: &str,
        email: &str,
        password: &str,
    ) -> Result<RegisterOutcome, AuthError> {
        let request = RegisterRequest {
            username: username.to_string(),
            email: email.to_string(),
            password: password.to_string(),
        };
        let response = self.inner.api.register(&request).await?;

        let Some(tokens) = response.credentials() else {
            return Ok(RegisterOutcome::Registered);
        };

        // Commit exactly as login does: with a profile, fetched if the
        // server did not inline one.
        let profile = match response.user {
            Some(profile) => profile,
            None => self.inner.api.fetch_profile(&tokens.access).await?,
        };
        self.commit(epoch, tokens.access, tokens.refresh, profile.clone())?;
        Ok(RegisterOutcome::SignedIn(profile))
    }

    /// Sign out. Synchronous, always succeeds, safe when already signed
    /// out. Any in-flight operation's eventual commit is discarded.
    pub fn logout(&self) {
        let mut cell = self.lock_cell();
        cell.epoch += 1;
        cell.access = None;
        cell.refresh = None;
        cell.profile = None;
        cell.memory_only = false;
        self.inner.store.clear();
        self.inner
            .tx
            .send_replace(AuthSnapshot::unauthenticated(None));
        drop(cell);
        info!("Signed out");
    }

    /// Merge a local profile edit and re-persist it. Never contacts the
    /// server and never touches credentials or status. Returns `None` when
    /// no session is established.
    pub fn update_profile(&self, update: &ProfileUpdate) -> Option<Profile> {
        let mut cell = self.lock_cell();
        let (access, refresh, profile) = match (&cell.access, &cell.refresh, &cell.profile) {
            (Some(access), Some(refresh), Some(profile)) => {
                (access.clone(), refresh.clone(), profile.clone())
            }
            _ => return None,
        };

        let merged = profile.merged(update);
        if cell.memory_only {
            debug!("Session is memory-only, skipping profile persist");
        } else if let Err(err) = self.inner.store.write(&access, &refresh, &merged) {
            warn!(error = %err, "Failed to re-persist profile, keeping in-memory copy");
            cell.memory_only = true;
        }
        cell.profile = Some(merged.clone());
        self.inner
            .tx
            .send_replace(AuthSnapshot::authenticated(merged.clone()));
        drop(cell);
        Some(merged)
    }

    /// Drop the in-memory session and the persisted entries, without
    /// bumping the epoch (used on the recovery failure path, which owns the
    /// operation slot).
    fn clear_local(&self) {
        {
            let mut cell = self.lock_cell();
            cell.access = None;
            cell.refresh = None;
            cell.profile = None;
            cell.memory_only = false;
        }
        self.inner.store.clear();
    }
}
