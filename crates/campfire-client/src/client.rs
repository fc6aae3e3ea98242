use tracing::info;

use crate::activities::ActivityFeed;
use crate::backend::{AuthSession, Backend};
use crate::config::ClientConfig;
use crate::directory::SessionDirectory;
use crate::error::Result;
use crate::gallery::Gallery;
use crate::identity::IdentityCache;
use crate::membership::Membership;
use crate::remote::RemoteBackend;
use crate::view::SessionView;

/// Application root. Every feature handle it gives out shares the same
/// backend and identity cache.
#[derive(Clone)]
pub struct Campfire {
    backend: Backend,
    cache: IdentityCache,
}

impl Campfire {
    pub fn new(backend: Backend, cache: IdentityCache) -> Self {
        Self { backend, cache }
    }

    /// Remote backend and on-disk cache as configured.
    pub fn connect(config: &ClientConfig) -> Result<Self> {
        let backend = RemoteBackend::new(&config.server_url)?.into_backend();
        let cache = IdentityCache::open(&config.cache_path)?;
        Ok(Self::new(backend, cache))
    }

    /// Resume the cached identity, or sign in anonymously and cache the new
    /// one. Returns the user id.
    pub async fn sign_in(&self) -> Result<String> {
        if let Some(user_id) = self.cache.current_user()? {
            let session = AuthSession {
                user_id: user_id.clone(),
                token: self.cache.auth_token()?,
            };
            if self.backend.auth.restore(&session).await? {
                return Ok(user_id);
            }
        }

        let session = self.backend.auth.sign_in_anonymously().await?;
        self.cache.set_current_user(&session.user_id)?;
        if let Some(token) = &session.token {
            self.cache.set_auth_token(token)?;
        }
        info!("Signed in as {}", session.user_id);
        Ok(session.user_id)
    }

    pub fn current_user(&self) -> Option<String> {
        self.backend.auth.current_user()
    }

    pub fn identity(&self) -> &IdentityCache {
        &self.cache
    }

    pub fn backend(&self) -> &Backend {
        &self.backend
    }

    pub fn directory(&self) -> SessionDirectory {
        SessionDirectory::new(self.backend.clone(), self.cache.clone())
    }

    pub fn activities(&self) -> ActivityFeed {
        ActivityFeed::new(self.backend.clone())
    }

    pub fn gallery(&self) -> Gallery {
        Gallery::new(self.backend.clone())
    }

    pub fn membership(&self) -> Membership {
        Membership::new(self.backend.clone())
    }

    pub fn session_view(&self) -> SessionView {
        SessionView::new(self.backend.clone(), self.cache.clone())
    }
}
