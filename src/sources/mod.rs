pub mod direct_url;
pub mod soundcloud;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serenity::model::id::UserId;
use std::{sync::Arc, time::Duration};
use tracing::{debug, info};

use crate::error::{PlayerError, PlayerResult};

pub use direct_url::{DirectTrack, DirectUrlProvider};
pub use soundcloud::{SoundCloudProvider, SoundCloudTrack};

/// Common interface for every track provider.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TrackProvider: Send + Sync {
    /// Resolves a locator into one or more playable tracks.
    ///
    /// A locator pointing at something that is neither a single track nor a
    /// collection yields [`PlayerError::UnsupportedLocator`].
    async fn resolve(&self, locator: &str, requester: &Requester) -> PlayerResult<Vec<Track>>;

    /// Whether this provider knows how to resolve the locator.
    fn handles(&self, locator: &str) -> bool;

    fn name(&self) -> &'static str;
}

/// The user who asked for a track.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Requester {
    pub id: UserId,
    pub name: String,
    pub avatar_url: Option<String>,
}

impl Requester {
    pub fn new(id: UserId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            avatar_url: None,
        }
    }

    pub fn with_avatar(mut self, avatar_url: String) -> Self {
        self.avatar_url = Some(avatar_url);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Author {
    pub name: String,
    pub url: Option<String>,
    pub avatar_url: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrackCounters {
    pub plays: u64,
    pub likes: u64,
    pub reposts: u64,
}

/// Playlist a track was added from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaylistRef {
    pub title: String,
    pub permalink: String,
    pub author: Option<Author>,
}

/// Display metadata shared by every track variant.
#[derive(Debug, Clone)]
pub struct TrackMetadata {
    pub title: String,
    pub permalink: String,
    /// Track length in milliseconds, 0 when unknown.
    pub duration_ms: u64,
    pub artwork_url: Option<String>,
    pub author: Option<Author>,
    pub counters: Option<TrackCounters>,
    pub playlist: Option<PlaylistRef>,
    pub requester: Requester,
    pub added_at: DateTime<Utc>,
}

impl TrackMetadata {
    pub fn new(title: String, permalink: String, requester: Requester) -> Self {
        Self {
            title,
            permalink,
            duration_ms: 0,
            artwork_url: None,
            author: None,
            counters: None,
            playlist: None,
            requester,
            added_at: Utc::now(),
        }
    }

    pub fn with_duration_ms(mut self, duration_ms: u64) -> Self {
        self.duration_ms = duration_ms;
        self
    }

    pub fn with_artwork(mut self, artwork_url: String) -> Self {
        self.artwork_url = Some(artwork_url);
        self
    }

    pub fn with_author(mut self, author: Author) -> Self {
        self.author = Some(author);
        self
    }

    pub fn with_counters(mut self, counters: TrackCounters) -> Self {
        self.counters = Some(counters);
        self
    }

    pub fn with_playlist(mut self, playlist: PlaylistRef) -> Self {
        self.playlist = Some(playlist);
        self
    }
}

/// A playable audio item, one variant per supported source.
#[derive(Debug, Clone)]
pub enum Track {
    SoundCloud(SoundCloudTrack),
    Direct(DirectTrack),
}

impl Track {
    pub fn metadata(&self) -> &TrackMetadata {
        match self {
            Track::SoundCloud(t) => &t.metadata,
            Track::Direct(t) => &t.metadata,
        }
    }

    /// Resolves the URL the encoder should read from.
    pub async fn stream_url(&self) -> PlayerResult<String> {
        match self {
            Track::SoundCloud(t) => t.stream_url().await,
            Track::Direct(t) => t.stream_url(),
        }
    }

    pub fn title(&self) -> &str {
        &self.metadata().title
    }

    pub fn duration_ms(&self) -> u64 {
        self.metadata().duration_ms
    }

    pub fn duration(&self) -> Duration {
        Duration::from_millis(self.duration_ms())
    }

    pub fn requester(&self) -> &Requester {
        &self.metadata().requester
    }

    pub fn source_name(&self) -> &'static str {
        match self {
            Track::SoundCloud(_) => "soundcloud",
            Track::Direct(_) => "direct",
        }
    }

    /// "title - author", used for presence status lines.
    pub fn listen_status(&self) -> String {
        let meta = self.metadata();
        match &meta.author {
            Some(author) => format!("{} - {}", meta.title, author.name),
            None => meta.title.clone(),
        }
    }

    pub fn markdown_link(&self) -> String {
        format!("[{}]({})", self.listen_status(), self.metadata().permalink)
    }
}

impl From<SoundCloudTrack> for Track {
    fn from(track: SoundCloudTrack) -> Self {
        Track::SoundCloud(track)
    }
}

impl From<DirectTrack> for Track {
    fn from(track: DirectTrack) -> Self {
        Track::Direct(track)
    }
}

/// Dispatches locators to the first provider that handles them.
#[derive(Clone, Default)]
pub struct Sources {
    providers: Vec<Arc<dyn TrackProvider>>,
}

impl Sources {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_provider(mut self, provider: impl TrackProvider + 'static) -> Self {
        info!("🔌 Proveedor registrado: {}", provider.name());
        self.providers.push(Arc::new(provider));
        self
    }

    pub async fn resolve(&self, locator: &str, requester: &Requester) -> PlayerResult<Vec<Track>> {
        let provider = self
            .providers
            .iter()
            .find(|p| p.handles(locator))
            .ok_or_else(|| PlayerError::UnsupportedLocator(locator.to_string()))?;

        debug!(provider = provider.name(), locator, "resolving locator");
        let tracks = provider.resolve(locator, requester).await?;
        info!("🎶 {} track(s) resueltos desde {}", tracks.len(), provider.name());
        Ok(tracks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::predicate::eq;

    fn requester() -> Requester {
        Requester::new(UserId::new(42), "dj")
    }

    #[test]
    fn test_display_accessors() {
        let meta = TrackMetadata::new(
            "Song".into(),
            "https://soundcloud.com/artist/song".into(),
            requester(),
        )
        .with_duration_ms(185_000)
        .with_author(Author {
            name: "Artist".into(),
            url: None,
            avatar_url: None,
        });
        let track = Track::Direct(DirectTrack::from_metadata("https://cdn.example.com/a.mp3".into(), meta));

        assert_eq!(track.listen_status(), "Song - Artist");
        assert_eq!(
            track.markdown_link(),
            "[Song - Artist](https://soundcloud.com/artist/song)"
        );
        assert_eq!(track.duration(), Duration::from_secs(185));
        assert_eq!(track.requester().name, "dj");
    }

    #[tokio::test]
    async fn test_sources_dispatch_to_first_matching_provider() {
        let mut skipped = MockTrackProvider::new();
        skipped.expect_handles().return_const(false);
        skipped.expect_name().return_const("skipped");
        skipped.expect_resolve().never();

        let mut matching = MockTrackProvider::new();
        matching.expect_handles().return_const(true);
        matching.expect_name().return_const("matching");
        matching
            .expect_resolve()
            .with(eq("https://example.com/a.mp3"), eq(requester()))
            .times(1)
            .returning(|locator, requester| {
                Ok(vec![DirectTrack::new(locator, requester.clone())?.into()])
            });

        let sources = Sources::new().with_provider(skipped).with_provider(matching);
        let tracks = sources
            .resolve("https://example.com/a.mp3", &requester())
            .await
            .unwrap();

        assert_eq!(tracks.len(), 1);
        assert_eq!(tracks[0].title(), "a.mp3");
    }

    #[tokio::test]
    async fn test_sources_without_provider_is_unsupported() {
        let mut provider = MockTrackProvider::new();
        provider.expect_handles().return_const(false);
        provider.expect_name().return_const("none");

        let sources = Sources::new().with_provider(provider);
        let err = sources.resolve("ftp://nope", &requester()).await.unwrap_err();
        assert!(matches!(err, PlayerError::UnsupportedLocator(_)));
    }
}
