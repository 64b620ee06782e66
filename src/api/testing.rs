//! Scripted `AuthApi` fake for controller and refresh-protocol tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Notify;

use crate::api::client::{AuthApi, RegisterRequest, RegisterResponse, TokenPair, TokenRequest};
use crate::api::error::AuthError;
use crate::models::Profile;

fn unscripted<T>() -> Result<T, AuthError> {
    Err(AuthError::Server("unscripted call".to_string()))
}

/// Fake API whose responses are scripted per endpoint.
///
/// Profile responses are a queue so a single scenario can script "first
/// fetch fails, post-refresh fetch succeeds". Call counters let tests assert
/// how often each endpoint was hit. `hold_token_calls` makes `issue_tokens`
/// block until released, for concurrency scenarios.
pub(crate) struct ScriptedApi {
    token_result: Mutex<Result<TokenPair, AuthError>>,
    profile_results: Mutex<VecDeque<Result<Profile, AuthError>>>,
    refresh_result: Mutex<Result<String, AuthError>>,
    register_result: Mutex<Result<RegisterResponse, AuthError>>,
    token_gate: Mutex<Option<Arc<Notify>>>,

    pub token_calls: AtomicUsize,
    pub profile_calls: AtomicUsize,
    pub refresh_calls: AtomicUsize,
    pub register_calls: AtomicUsize,
    pub last_token_request: Mutex<Option<TokenRequest>>,
}

impl ScriptedApi {
    pub fn new() -> Self {
        Self {
            token_result: Mutex::new(unscripted()),
            profile_results: Mutex::new(VecDeque::new()),
            refresh_result: Mutex::new(unscripted()),
            register_result: Mutex::new(unscripted()),
            token_gate: Mutex::new(None),
            token_calls: AtomicUsize::new(0),
            profile_calls: AtomicUsize::new(0),
            refresh_calls: AtomicUsize::new(0),
            register_calls: AtomicUsize::new(0),
            last_token_request: Mutex::new(None),
        }
    }

    fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
        mutex.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn script_tokens(&self, result: Result<TokenPair, AuthError>) {
        *Self::lock(&self.token_result) = result;
    }

    pub fn script_profile(&self, result: Result<Profile, AuthError>) {
        Self::lock(&self.profile_results).push_back(result);
    }

    pub fn script_refresh(&self, result: Result<String, AuthError>) {
        *Self::lock(&self.refresh_result) = result;
    }

    pub fn script_register(&self, result: Result<RegisterResponse, AuthError>) {
        *Self::lock(&self.register_result) = result;
    }

    /// Make subsequent `issue_tokens` calls park until the returned handle
    /// is notified.
    pub fn hold_token_calls(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *Self::lock(&self.token_gate) = Some(gate.clone());
        gate
    }
}

#[async_trait]
impl AuthApi for ScriptedApi {
    async fn issue_tokens(&self, request: &TokenRequest) -> Result<TokenPair, AuthError> {
        self.token_calls.fetch_add(1, Ordering::SeqCst);
        *Self::lock(&self.last_token_request) = Some(request.clone());

        let gate = Self::lock(&self.token_gate).clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        Self::lock(&self.token_result).clone()
    }

    async fn fetch_profile(&self, _access: &str) -> Result<Profile, AuthError> {
        self.profile_calls.fetch_add(1, Ordering::SeqCst);
        Self::lock(&self.profile_results)
            .pop_front()
            .unwrap_or_else(unscripted)
    }

    async fn refresh_access(&self, _refresh: &str) -> Result<String, AuthError> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        Self::lock(&self.refresh_result).clone()
    }

    async fn register(&self, _request: &RegisterRequest) -> Result<RegisterResponse, AuthError> {
        self.register_calls.fetch_add(1, Ordering::SeqCst);
        Self::lock(&self.register_result).clone()
    }
}

/// A profile with recognizable field values for assertions.
pub(crate) fn sample_profile(username: &str) -> Profile {
    Profile {
        username: username.to_string(),
        email: format!("{}@example.com", username),
        first_name: "Sample".to_string(),
        last_name: "User".to_string(),
        dark_mode: false,
        study_goal: String::new(),
    }
}

/// A token pair with recognizable values for assertions.
pub(crate) fn sample_tokens() -> TokenPair {
    TokenPair {
        access: "access-1".to_string(),
        refresh: "refresh-1".to_string(),
    }
}
