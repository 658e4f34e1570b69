#![cfg(not(tarpaulin_include))]

use crate::app::AppState;
use crate::error::AuthError;
use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use axum::{
    Form,
    extract::State,
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use log::{info, warn};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::{Duration, SystemTime};
use uuid::Uuid;

/// Name of the cookie carrying the session id
pub const SESSION_COOKIE: &str = "session";

/// Login form data
#[derive(Debug, Deserialize)]
pub struct LoginForm {
    pub password: String,
}

/// Per-visitor session state.
///
/// Created on successful login, removed on logout or when it expires. It
/// is passed explicitly to everything that needs to know whether the
/// visitor may see the data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionContext {
    pub id: String,
    pub authenticated: bool,
    pub expires_at: SystemTime,
}

impl SessionContext {
    /// Visitor without a session
    pub fn anonymous() -> Self {
        Self {
            id: String::new(),
            authenticated: false,
            expires_at: SystemTime::UNIX_EPOCH,
        }
    }

    pub fn is_expired(&self, now: SystemTime) -> bool {
        now >= self.expires_at
    }

    /// Fails unless the session is authenticated and still valid
    pub fn require(&self) -> Result<(), AuthError> {
        if self.authenticated && !self.is_expired(SystemTime::now()) {
            Ok(())
        } else {
            Err(AuthError::NotAuthenticated)
        }
    }
}

/// Active sessions, keyed by id.
#[derive(Debug)]
pub struct SessionStore {
    sessions: RwLock<HashMap<String, SessionContext>>,
    ttl: Duration,
}

impl SessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    /// Check the password and open an authenticated session
    ///
    /// # Arguments
    /// * `password` - What the visitor typed
    /// * `secret` - Stored password, plaintext or Argon2 hash
    ///
    /// # Returns
    /// * `Result<SessionContext, AuthError>` - The new session, or `WrongPassword`
    pub fn login(&self, password: &str, secret: &str) -> Result<SessionContext, AuthError> {
        check_password(password, secret)?;

        let session = SessionContext {
            id: Uuid::new_v4().to_string(),
            authenticated: true,
            expires_at: SystemTime::now() + self.ttl,
        };
        let mut sessions = self.sessions.write().unwrap_or_else(|e| e.into_inner());
        sessions.insert(session.id.clone(), session.clone());
        Ok(session)
    }

    /// Look a session up, dropping it if it has expired
    pub fn get(&self, session_id: &str) -> Option<SessionContext> {
        let now = SystemTime::now();
        let found = {
            let sessions = self.sessions.read().unwrap_or_else(|e| e.into_inner());
            sessions.get(session_id).cloned()
        };
        match found {
            Some(session) if session.is_expired(now) => {
                self.remove(session_id);
                None
            }
            other => other,
        }
    }

    /// Session for a request, anonymous when there is no valid cookie
    pub fn from_jar(&self, jar: &CookieJar) -> SessionContext {
        jar.get(SESSION_COOKIE)
            .and_then(|cookie| self.get(cookie.value()))
            .unwrap_or_else(SessionContext::anonymous)
    }

    pub fn remove(&self, session_id: &str) -> bool {
        let mut sessions = self.sessions.write().unwrap_or_else(|e| e.into_inner());
        sessions.remove(session_id).is_some()
    }

    /// Drop every expired session, returning how many were removed
    pub fn purge_expired(&self) -> usize {
        let now = SystemTime::now();
        let mut sessions = self.sessions.write().unwrap_or_else(|e| e.into_inner());
        let before = sessions.len();
        sessions.retain(|_, s| !s.is_expired(now));
        before - sessions.len()
    }

    pub fn len(&self) -> usize {
        self.sessions.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Compare a typed password with the stored secret.
///
/// A secret starting with `$argon2` is treated as an Argon2 PHC string and
/// verified with Argon2; anything else is compared as plaintext.
pub fn check_password(input: &str, secret: &str) -> Result<(), AuthError> {
    if secret.starts_with("$argon2") {
        let parsed = PasswordHash::new(secret).map_err(|e| AuthError::Hash(e.to_string()))?;
        return Argon2::default()
            .verify_password(input.as_bytes(), &parsed)
            .map_err(|_| AuthError::WrongPassword);
    }
    if input == secret {
        Ok(())
    } else {
        Err(AuthError::WrongPassword)
    }
}

/// Hash a password into an Argon2id PHC string for the secret store
pub fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AuthError::Hash(e.to_string()))
}

/// Serve the login form, or go straight to the dashboard when the
/// visitor already has a valid session
pub async fn serve_login_page(State(state): State<Arc<AppState>>, jar: CookieJar) -> Response {
    if state.sessions.from_jar(&jar).require().is_ok() {
        return Redirect::to("/").into_response();
    }
    state.render_login(None).into_response()
}

/// Handle login form submission
///
/// On success a session cookie is set and the visitor goes to the
/// dashboard; otherwise the form is shown again with the error.
pub async fn handle_login(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Form(form): Form<LoginForm>,
) -> Response {
    match state.sessions.login(&form.password, &state.password) {
        Ok(session) => {
            info!("login accepted");
            let cookie = Cookie::build((SESSION_COOKIE, session.id))
                .path("/")
                .http_only(true)
                .same_site(SameSite::Lax)
                .build();
            (jar.add(cookie), Redirect::to("/")).into_response()
        }
        Err(e) => {
            warn!("login rejected: {}", e);
            let message = match e {
                AuthError::WrongPassword => "Mot de passe incorrect.".to_string(),
                other => other.to_string(),
            };
            state.render_login(Some(&message)).into_response()
        }
    }
}

/// Clear the session and go back to the login form
pub async fn handle_logout(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
) -> (CookieJar, Redirect) {
    if let Some(cookie) = jar.get(SESSION_COOKIE) {
        state.sessions.remove(cookie.value());
    }
    (
        jar.remove(Cookie::build(SESSION_COOKIE).path("/")),
        Redirect::to("/login"),
    )
}

/// Authentication middleware
///
/// Lets authenticated requests through with their [`SessionContext`] in the
/// request extensions; everything else is redirected to the login form.
pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    mut request: axum::extract::Request,
    next: axum::middleware::Next,
) -> Response {
    let session = state.sessions.from_jar(&jar);
    if session.require().is_ok() {
        request.extensions_mut().insert(session);
        return next.run(request).await;
    }
    Redirect::to("/login").into_response()
}
