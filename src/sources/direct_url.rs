use super::{Requester, Track, TrackMetadata, TrackProvider};
use crate::error::{PlayerError, PlayerResult};
use async_trait::async_trait;
use url::Url;

/// Track pointing straight at a remote audio file.
#[derive(Debug, Clone)]
pub struct DirectTrack {
    pub url: String,
    pub metadata: TrackMetadata,
}

impl DirectTrack {
    /// Builds a track from an HTTP(S) URL, naming it after the last path
    /// segment.
    pub fn new(url: &str, requester: Requester) -> PlayerResult<Self> {
        let parsed = Url::parse(url).map_err(|e| PlayerError::resolution(url, e))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(PlayerError::UnsupportedLocator(url.to_string()));
        }

        let title = parsed
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .filter(|segment| !segment.is_empty())
            .map(str::to_string)
            .or_else(|| parsed.host_str().map(str::to_string))
            .unwrap_or_else(|| url.to_string());

        Ok(Self {
            url: url.to_string(),
            metadata: TrackMetadata::new(title, url.to_string(), requester),
        })
    }

    pub fn from_metadata(url: String, metadata: TrackMetadata) -> Self {
        Self { url, metadata }
    }

    /// The stream URL is the locator itself once it parses as a URL.
    pub fn stream_url(&self) -> PlayerResult<String> {
        Url::parse(&self.url)
            .map(|_| self.url.clone())
            .map_err(|e| PlayerError::resolution(&self.metadata.title, e))
    }
}

pub struct DirectUrlProvider {}

impl DirectUrlProvider {
    pub fn new() -> Self {
        Self {}
    }
}

impl Default for DirectUrlProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TrackProvider for DirectUrlProvider {
    async fn resolve(&self, locator: &str, requester: &Requester) -> PlayerResult<Vec<Track>> {
        Ok(vec![DirectTrack::new(locator, requester.clone())?.into()])
    }

    fn handles(&self, locator: &str) -> bool {
        locator.starts_with("http://") || locator.starts_with("https://")
    }

    fn name(&self) -> &'static str {
        "direct"
    }
}
