use shared::protocol::UserSummary;
use tokio::sync::{watch, Mutex};
use tracing::info;

#[derive(Debug, Clone)]
struct Authenticated {
    token: String,
    user: Option<UserSummary>,
}

/// Explicit authentication session, passed by `Arc` into anything that needs
/// it instead of living in ambient context. Pages observe [`AuthSession::subscribe`]
/// to redirect away once an external sign-in completes; they never mutate the
/// session from form code.
pub struct AuthSession {
    inner: Mutex<Option<Authenticated>>,
    changed: watch::Sender<bool>,
}

impl AuthSession {
    pub fn new() -> Self {
        let (changed, _) = watch::channel(false);
        Self {
            inner: Mutex::new(None),
            changed,
        }
    }

    pub async fn is_authenticated(&self) -> bool {
        self.inner.lock().await.is_some()
    }

    pub async fn current_token(&self) -> Option<String> {
        self.inner
            .lock()
            .await
            .as_ref()
            .map(|auth| auth.token.clone())
    }

    pub async fn current_user(&self) -> Option<UserSummary> {
        self.inner.lock().await.as_ref().and_then(|auth| auth.user.clone())
    }

    pub async fn set_authenticated(&self, token: impl Into<String>, user: Option<UserSummary>) {
        {
            let mut inner = self.inner.lock().await;
            *inner = Some(Authenticated {
                token: token.into(),
                user,
            });
        }
        let _ = self.changed.send(true);
        info!("session authenticated");
    }

    pub async fn clear(&self) {
        {
            let mut inner = self.inner.lock().await;
            *inner = None;
        }
        let _ = self.changed.send(false);
        info!("session cleared");
    }

    /// Change notification; the receiver's current value tracks
    /// `is_authenticated`.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.changed.subscribe()
    }
}

impl Default for AuthSession {
    fn default() -> Self {
        Self::new()
    }
}
