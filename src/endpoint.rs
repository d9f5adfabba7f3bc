//! Upstream endpoint state.
//!
//! Holds the server origin, the push-stream URL, the submission URL and the
//! learned session token behind a single reader/writer lock.  In SSE mode the
//! stream reader rewrites the submission URL while the forwarding loop reads
//! it, so this store is the one synchronisation point for "where does the
//! next message go".  Fields are never exposed directly.

use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Debug, Default)]
struct Endpoints {
    /// `scheme://host[:port]`, without a trailing slash.
    origin: String,
    push_url: String,
    submit_url: String,
    session_token: Option<String>,
}

/// Lock-guarded endpoint state shared by the bridges.
#[derive(Debug, Default)]
pub(crate) struct EndpointStore {
    inner: RwLock<Endpoints>,
}

impl EndpointStore {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    // A panicking writer cannot leave a half-written `String` behind, so a
    // poisoned lock still holds consistent data.
    fn read(&self) -> RwLockReadGuard<'_, Endpoints> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Endpoints> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn set_origin(&self, origin: &str) {
        self.write().origin = origin.trim_end_matches('/').to_owned();
        tracing::info!(origin, "server origin set");
    }

    pub(crate) fn set_push_url(&self, url: &str) {
        self.write().push_url = url.to_owned();
        tracing::info!(url, "push URL set");
    }

    /// Point submissions at `origin + path`.
    pub(crate) fn set_submit_path(&self, path: &str) {
        let url = {
            let mut guard = self.write();
            guard.submit_url = format!("{}{path}", guard.origin);
            guard.submit_url.clone()
        };
        tracing::info!(%url, "submission URL set");
    }

    /// Point submissions at an absolute URL, bypassing the origin.
    pub(crate) fn set_submit_url(&self, url: &str) {
        self.write().submit_url = url.to_owned();
        tracing::info!(url, "submission URL set");
    }

    /// Store `token` unless a session token is already known.
    ///
    /// Returns `true` if the token was stored.
    pub(crate) fn remember_session_token(&self, token: &str) -> bool {
        let mut guard = self.write();
        if guard.session_token.is_some() {
            return false;
        }
        guard.session_token = Some(token.to_owned());
        drop(guard);
        tracing::info!(session_id = token, "learned MCP session id");
        true
    }

    pub(crate) fn origin(&self) -> String {
        self.read().origin.clone()
    }

    pub(crate) fn push_url(&self) -> String {
        self.read().push_url.clone()
    }

    pub(crate) fn submit_url(&self) -> String {
        self.read().submit_url.clone()
    }

    pub(crate) fn session_token(&self) -> Option<String> {
        self.read().session_token.clone()
    }
}
