use std::fmt;

use serde::Deserialize;
use thiserror::Error;

/// Registration field a validation failure is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Username,
    Email,
    Password,
    /// Server-side failure not tied to a single field.
    General,
}

impl Field {
    fn label(&self) -> &'static str {
        match self {
            Field::Username => "Username",
            Field::Email => "Email",
            Field::Password => "Password",
            Field::General => "",
        }
    }
}

/// A single validation failure reported by the registration endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldViolation {
    pub field: Field,
    pub message: String,
}

impl fmt::Display for FieldViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.field {
            Field::General => write!(f, "{}", self.message),
            field => write!(f, "{}: {}", field.label(), self.message),
        }
    }
}

/// Everything that can go wrong while establishing or maintaining a session.
///
/// Variants carry no transport types so callers (and tests) can match on
/// kind; the `Display` output is the text shown to the user.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    /// The token endpoint rejected the credentials (HTTP 401).
    #[error("Invalid username/email or password")]
    InvalidCredentials,

    /// Registration failed server-side validation.
    #[error("{0}")]
    Validation(FieldViolation),

    /// The server was unreachable (timeout, DNS, connection refused).
    /// Retryable, unlike a rejection.
    #[error("Unable to reach the server: {0}")]
    Network(String),

    /// The server answered with an error outside the taxonomy; the message
    /// is the server's own `detail` text when it provided one.
    #[error("{0}")]
    Server(String),

    /// The refresh credential was rejected as invalid or expired.
    /// Must never be retried.
    #[error("Session expired, please sign in again")]
    RefreshRejected,

    /// No refresh credential is held; resolved locally without a request.
    #[error("No refresh credential available")]
    NoRefreshCredential,

    /// Another session operation is already in flight.
    #[error("Another sign-in operation is in progress")]
    SessionBusy,

    /// The session store could not persist a commit. Fatal for that write;
    /// the session continues in memory only.
    #[error("Session storage unavailable: {0}")]
    StorageUnavailable(String),
}

/// Per-field error arrays in the shape the registration endpoint returns.
#[derive(Debug, Default, Deserialize)]
struct RegisterErrorBody {
    #[serde(default)]
    username: Vec<String>,
    #[serde(default)]
    email: Vec<String>,
    #[serde(default)]
    password: Vec<String>,
    #[serde(default)]
    non_field_errors: Vec<String>,
}

impl RegisterErrorBody {
    /// First violation in priority order. Only one message is ever surfaced,
    /// even when several fields failed.
    fn first_violation(self) -> Option<FieldViolation> {
        let by_priority = [
            (Field::Username, self.username),
            (Field::Email, self.email),
            (Field::Password, self.password),
            (Field::General, self.non_field_errors),
        ];
        for (field, mut messages) in by_priority {
            if !messages.is_empty() {
                return Some(FieldViolation {
                    field,
                    message: messages.swap_remove(0),
                });
            }
        }
        None
    }
}

/// Map a 400 response body from the registration endpoint into the taxonomy.
pub(crate) fn registration_error(body: &str) -> AuthError {
    match serde_json::from_str::<RegisterErrorBody>(body) {
        Ok(errors) => errors
            .first_violation()
            .map(AuthError::Validation)
            .unwrap_or_else(|| AuthError::Server("Registration failed".to_string())),
        Err(_) => AuthError::Server("Registration failed".to_string()),
    }
}

#[derive(Debug, Deserialize)]
struct DetailBody {
    detail: String,
}

/// Surface the server's `detail` message verbatim when present, otherwise
/// fall back to a generic message for the failed operation.
pub(crate) fn server_message(body: &str, fallback: &str) -> AuthError {
    match serde_json::from_str::<DetailBody>(body) {
        Ok(detail) => AuthError::Server(detail.detail),
        Err(_) => AuthError::Server(fallback.to_string()),
    }
}
