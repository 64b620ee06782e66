//! Access-credential renewal.
//!
//! A stateless exchange: the refresh credential buys a new access
//! credential, and the profile is fetched with it before anything is handed
//! back, so a caller never commits a bare access credential without a
//! matching profile. Nothing here touches the session store.

use tracing::debug;

use crate::api::client::AuthApi;
use crate::api::error::AuthError;
use crate::models::Profile;

/// A successful renewal: the new access credential and the profile it
/// grants. The refresh credential itself is unchanged by the exchange.
#[derive(Debug, Clone)]
pub struct RenewedSession {
    pub access: String,
    pub profile: Profile,
}

/// Exchange `refresh` for a fresh access credential.
///
/// A missing or empty refresh credential resolves locally to
/// `NoRefreshCredential` without any network call; the caller must drop to
/// unauthenticated. A server rejection (`RefreshRejected`) must never be
/// retried; a `Network` failure may be.
pub async fn renew_session(
    api: &dyn AuthApi,
    refresh: Option<&str>,
) -> Result<RenewedSession, AuthError> {
    let refresh = match refresh {
        Some(refresh) if !refresh.is_empty() => refresh,
        _ => return Err(AuthError::NoRefreshCredential),
    };

    let access = api.refresh_access(refresh).await?;
    debug!("Access credential renewed, fetching profile");

    // A renewal only counts once the profile fetch with the new credential
    // succeeds; otherwise the whole exchange is treated as failed.
    let profile = api.fetch_profile(&access).await?;

    Ok(RenewedSession { access, profile })
}
