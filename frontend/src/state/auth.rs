use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, Duration, TimeZone, Utc};
use leptos::*;
use serde_json::Value;

use crate::{config, utils::storage as storage_utils};

const ACCESS_TOKEN_KEY: &str = "access_token";
const EXPIRES_AT_KEY: &str = "access_token_expires_at";
const CURRENT_USER_KEY: &str = "current_user";

/// The logged-in scanner as persisted by the login screen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredSession {
    pub access_token: String,
    pub expires_at: Option<DateTime<Utc>>,
    pub user_id: Option<i64>,
}

impl StoredSession {
    pub fn from_token(access_token: impl Into<String>) -> Self {
        let access_token = access_token.into();
        Self {
            expires_at: decode_exp(&access_token),
            user_id: decode_user_id(&access_token),
            access_token,
        }
    }

    /// A token with unknown expiry is trusted until the server says otherwise.
    pub fn is_usable(&self, now: DateTime<Utc>, margin: Duration) -> bool {
        if self.access_token.trim().is_empty() {
            return false;
        }
        match self.expires_at {
            Some(expires_at) => expires_at - now > margin,
            None => true,
        }
    }
}

/// Source of the bearer token used by the scan pipeline.
pub trait TokenStore {
    fn current(&self) -> Option<StoredSession>;
    /// Drops the persisted session (forced logout).
    fn clear(&self);
}

#[derive(Clone, Copy, Default)]
pub struct LocalStorageTokenStore;

impl TokenStore for LocalStorageTokenStore {
    fn current(&self) -> Option<StoredSession> {
        let storage = storage_utils::local_storage().ok()?;
        let token = storage
            .get_item(ACCESS_TOKEN_KEY)
            .ok()
            .flatten()
            .filter(|t| !t.trim().is_empty())?;
        let mut session = StoredSession::from_token(token);
        if let Ok(Some(raw)) = storage.get_item(EXPIRES_AT_KEY) {
            if let Ok(parsed) = DateTime::parse_from_rfc3339(&raw) {
                session.expires_at = Some(parsed.with_timezone(&Utc));
            }
        }
        if let Ok(Some(raw_user)) = storage.get_item(CURRENT_USER_KEY) {
            if let Some(id) = user_id_from_profile(&raw_user) {
                session.user_id = Some(id);
            }
        }
        Some(session)
    }

    fn clear(&self) {
        if let Ok(storage) = storage_utils::local_storage() {
            let _ = storage.remove_item(ACCESS_TOKEN_KEY);
            let _ = storage.remove_item(EXPIRES_AT_KEY);
            let _ = storage.remove_item(CURRENT_USER_KEY);
        }
    }
}

fn jwt_claims(token: &str) -> Option<Value> {
    let mut parts = token.split('.');
    parts.next()?;
    let payload = parts.next()?;
    let decoded = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')).ok()?;
    serde_json::from_slice(&decoded).ok()
}

fn decode_exp(token: &str) -> Option<DateTime<Utc>> {
    let exp = jwt_claims(token)?.get("exp")?.as_i64()?;
    Utc.timestamp_opt(exp, 0).single()
}

fn decode_user_id(token: &str) -> Option<i64> {
    let claims = jwt_claims(token)?;
    ["userId", "user_id", "sub"].iter().find_map(|key| match claims.get(*key)? {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    })
}

fn user_id_from_profile(raw: &str) -> Option<i64> {
    let profile: Value = serde_json::from_str(raw).ok()?;
    match profile.get("id")? {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

/// Clears the persisted session and sends the browser to the login page.
pub fn force_logout(store: &dyn TokenStore) {
    store.clear();
    redirect_to_login_if_needed();
}

fn redirect_to_login_if_needed() {
    let login_path = config::current().login_path().to_string();
    if let Some(window) = web_sys::window() {
        let location = window.location();
        if let Ok(pathname) = location.pathname() {
            if pathname == login_path {
                return;
            }
        }
        let _ = location.set_href(&login_path);
    }
}

#[derive(Debug, Clone, Default)]
pub struct AuthState {
    pub session: Option<StoredSession>,
    pub is_authenticated: bool,
}

impl AuthState {
    pub fn from_store(store: &dyn TokenStore) -> Self {
        let session = store.current();
        Self {
            is_authenticated: session.is_some(),
            session,
        }
    }
}

type AuthContext = (ReadSignal<AuthState>, WriteSignal<AuthState>);

/// Seeds the auth context from localStorage; called once at mount.
pub fn provide_auth_from_storage() -> AuthContext {
    let ctx = create_signal(AuthState::from_store(&LocalStorageTokenStore));
    provide_context::<AuthContext>(ctx);
    ctx
}

pub fn use_auth() -> AuthContext {
    use_context::<AuthContext>().unwrap_or_else(|| create_signal(AuthState::default()))
}

#[cfg(test)]
pub mod mock {
    use super::*;
    use std::cell::{Cell, RefCell};

    /// Token store held in memory.
    #[derive(Default)]
    pub struct MemoryTokenStore {
        session: RefCell<Option<StoredSession>>,
        clears: Cell<usize>,
    }

    impl MemoryTokenStore {
        pub fn with_session(session: StoredSession) -> Self {
            Self {
                session: RefCell::new(Some(session)),
                clears: Cell::new(0),
            }
        }

        pub fn valid() -> Self {
            Self::with_session(StoredSession {
                access_token: "token-abc".into(),
                expires_at: Some(Utc::now() + Duration::hours(1)),
                user_id: Some(7),
            })
        }

        pub fn set(&self, session: Option<StoredSession>) {
            *self.session.borrow_mut() = session;
        }

        pub fn clear_count(&self) -> usize {
            self.clears.get()
        }
    }

    impl TokenStore for MemoryTokenStore {
        fn current(&self) -> Option<StoredSession> {
            self.session.borrow().clone()
        }

        fn clear(&self) {
            self.clears.set(self.clears.get() + 1);
            self.session.borrow_mut().take();
        }
    }
}
