use campfire_types::paths::SessionId;
use tracing::{debug, warn};

use crate::activities::{ActivityFeed, ActivityWatch};
use crate::backend::Backend;
use crate::directory::SessionDirectory;
use crate::error::{Error, Result};
use crate::gallery::{Gallery, ImageWatch};
use crate::identity::IdentityCache;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSession {
    pub id: SessionId,
    /// `None` if the session record is gone.
    pub creator: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewState {
    /// The identity cache has not been read yet.
    Unresolved,
    Resolved { session: Option<ResolvedSession> },
}

/// What the main screen shows: the current session, its creator and live
/// activity and image lists.
pub struct SessionView {
    directory: SessionDirectory,
    activity_feed: ActivityFeed,
    gallery: Gallery,
    cache: IdentityCache,
    state: ViewState,
    user: Option<String>,
    activities: Option<ActivityWatch>,
    images: Option<ImageWatch>,
}

impl SessionView {
    pub fn new(backend: Backend, cache: IdentityCache) -> Self {
        Self {
            directory: SessionDirectory::new(backend.clone(), cache.clone()),
            activity_feed: ActivityFeed::new(backend.clone()),
            gallery: Gallery::new(backend),
            cache,
            state: ViewState::Unresolved,
            user: None,
            activities: None,
            images: None,
        }
    }

    pub fn state(&self) -> &ViewState {
        &self.state
    }

    pub fn session(&self) -> Option<&ResolvedSession> {
        match &self.state {
            ViewState::Resolved { session } => session.as_ref(),
            ViewState::Unresolved => None,
        }
    }

    /// Re-read the identity cache. Switching to a different session re-reads
    /// its creator and replaces the live lists; the same session keeps them.
    pub async fn focus(&mut self) -> Result<()> {
        self.user = self.cache.current_user()?;

        let stored = self.cache.current_session()?;
        let wanted = match stored.as_deref().map(SessionId::parse) {
            Some(Ok(id)) => Some(id),
            Some(Err(e)) => {
                warn!("Ignoring invalid cached session: {}", e);
                None
            }
            None => None,
        };

        let unchanged = matches!(
            (&self.state, &wanted),
            (ViewState::Resolved { session: Some(current) }, Some(id)) if current.id == *id
        ) || matches!((&self.state, &wanted), (ViewState::Resolved { session: None }, None));
        if unchanged {
            return Ok(());
        }

        let Some(id) = wanted else {
            self.activities = None;
            self.images = None;
            self.state = ViewState::Resolved { session: None };
            return Ok(());
        };

        // Nothing is replaced until the new session is fully resolved, so a
        // failed switch leaves the previous session and its lists intact.
        debug!("Session view switching to {}", id);
        let creator = self.directory.get_creator(&id).await?;
        let activities = self.activity_feed.subscribe(&id).await?;
        let images = self.gallery.subscribe(&id).await?;

        self.activities = Some(activities);
        self.images = Some(images);
        self.state = ViewState::Resolved {
            session: Some(ResolvedSession { id, creator }),
        };
        Ok(())
    }

    /// Make `session_id` current and resolve it.
    pub async fn switch_session(&mut self, session_id: &SessionId) -> Result<()> {
        self.cache.set_current_session(session_id.as_str())?;
        self.focus().await
    }

    /// Only the creator of the current session may add or delete content.
    pub fn can_edit(&self) -> bool {
        match (self.user.as_deref(), self.session()) {
            (Some(user), Some(session)) => session.creator.as_deref() == Some(user),
            _ => false,
        }
    }

    /// Fails with [`Error::NotCreator`] unless [`can_edit`](Self::can_edit).
    pub fn require_edit(&self) -> Result<&SessionId> {
        match self.session() {
            Some(session) if self.can_edit() => Ok(&session.id),
            _ => Err(Error::NotCreator),
        }
    }

    pub fn activities(&mut self) -> Option<&mut ActivityWatch> {
        self.activities.as_mut()
    }

    pub fn images(&mut self) -> Option<&mut ImageWatch> {
        self.images.as_mut()
    }
}
