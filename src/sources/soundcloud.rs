use super::{Author, PlaylistRef, Requester, Track, TrackCounters, TrackMetadata, TrackProvider};
use crate::error::{PlayerError, PlayerResult};
use async_trait::async_trait;
use serde::Deserialize;
use std::{collections::HashMap, sync::Arc};
use tracing::{debug, info, warn};
use url::Url;

const API_BASE: &str = "https://api-v2.soundcloud.com";
const TRACK_BATCH_SIZE: usize = 50;

/// Shared HTTP state for the SoundCloud api-v2.
#[derive(Debug)]
pub struct SoundCloudApi {
    http: reqwest::Client,
    client_id: String,
    base: String,
}

impl SoundCloudApi {
    fn endpoint(&self, path: &str, query: &[(&str, &str)]) -> PlayerResult<Url> {
        let mut url = Url::parse(&format!("{}{}", self.base, path))
            .map_err(|e| PlayerError::UnsupportedLocator(e.to_string()))?;
        url.query_pairs_mut()
            .extend_pairs(query)
            .append_pair("client_id", &self.client_id);
        Ok(url)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: Url) -> PlayerResult<T> {
        let response = self.http.get(url).send().await?.error_for_status()?;
        Ok(response.json::<T>().await?)
    }

    /// Fetches full track objects for ids, keeping the requested order.
    async fn tracks_by_id(&self, ids: &[u64]) -> PlayerResult<Vec<ApiTrack>> {
        let mut found = HashMap::with_capacity(ids.len());
        for chunk in ids.chunks(TRACK_BATCH_SIZE) {
            let joined = chunk
                .iter()
                .map(u64::to_string)
                .collect::<Vec<_>>()
                .join(",");
            let url = self.endpoint("/tracks", &[("ids", joined.as_str())])?;
            let batch: Vec<ApiTrack> = self.get_json(url).await?;
            found.extend(batch.into_iter().map(|t| (t.id, t)));
        }
        Ok(ids.iter().filter_map(|id| found.remove(id)).collect())
    }
}

/// Kinds of SoundCloud streams, in order of preference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum StreamKind {
    HlsOpus,
    HlsMp3,
    ProgressiveMp3,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct Transcoding {
    pub url: String,
    #[serde(default)]
    pub preset: String,
    pub format: TranscodingFormat,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct TranscodingFormat {
    pub protocol: String,
    pub mime_type: String,
}

impl Transcoding {
    pub fn kind(&self) -> Option<StreamKind> {
        let mime = self.format.mime_type.as_str();
        match self.format.protocol.as_str() {
            "hls" if mime.contains("opus") => Some(StreamKind::HlsOpus),
            "hls" if mime.contains("mpeg") => Some(StreamKind::HlsMp3),
            "progressive" if mime.contains("mpeg") => Some(StreamKind::ProgressiveMp3),
            _ => None,
        }
    }
}

/// Known transcodings sorted by preference; unknown ones are dropped.
pub fn preferred_transcodings(transcodings: &[Transcoding]) -> Vec<&Transcoding> {
    let mut known: Vec<_> = transcodings
        .iter()
        .filter_map(|t| t.kind().map(|kind| (kind, t)))
        .collect();
    known.sort_by_key(|(kind, _)| *kind);
    known.into_iter().map(|(_, t)| t).collect()
}

#[derive(Debug, Clone, Deserialize)]
struct ApiUser {
    username: String,
    permalink_url: Option<String>,
    avatar_url: Option<String>,
}

impl From<ApiUser> for Author {
    fn from(user: ApiUser) -> Self {
        Author {
            name: user.username,
            url: user.permalink_url,
            avatar_url: user.avatar_url,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
struct ApiMedia {
    #[serde(default)]
    transcodings: Vec<Transcoding>,
}

#[derive(Debug, Clone, Deserialize)]
struct ApiTrack {
    id: u64,
    title: Option<String>,
    permalink_url: Option<String>,
    #[serde(default)]
    duration: u64,
    artwork_url: Option<String>,
    user: Option<ApiUser>,
    playback_count: Option<u64>,
    likes_count: Option<u64>,
    reposts_count: Option<u64>,
    media: Option<ApiMedia>,
}

impl ApiTrack {
    /// Playlists only embed the first few tracks in full, the rest are ids.
    fn is_stub(&self) -> bool {
        self.title.is_none()
    }

    fn into_track(
        self,
        api: &Arc<SoundCloudApi>,
        requester: &Requester,
        playlist: Option<&PlaylistRef>,
    ) -> SoundCloudTrack {
        let title = self.title.unwrap_or_else(|| format!("track {}", self.id));
        let permalink = self.permalink_url.unwrap_or_default();
        let mut metadata = TrackMetadata::new(title, permalink, requester.clone())
            .with_duration_ms(self.duration)
            .with_counters(TrackCounters {
                plays: self.playback_count.unwrap_or_default(),
                likes: self.likes_count.unwrap_or_default(),
                reposts: self.reposts_count.unwrap_or_default(),
            });
        if let Some(artwork) = self.artwork_url {
            metadata = metadata.with_artwork(artwork);
        }
        if let Some(user) = self.user {
            metadata = metadata.with_author(user.into());
        }
        if let Some(playlist) = playlist {
            metadata = metadata.with_playlist(playlist.clone());
        }

        SoundCloudTrack {
            id: self.id,
            metadata,
            transcodings: self.media.unwrap_or_default().transcodings,
            api: Arc::clone(api),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct ApiPlaylist {
    title: String,
    permalink_url: String,
    user: Option<ApiUser>,
    #[serde(default)]
    tracks: Vec<ApiTrack>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
enum Resolved {
    Track(ApiTrack),
    Playlist(ApiPlaylist),
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct StreamLocation {
    url: String,
}

/// A SoundCloud track with the transcodings it can be streamed from.
#[derive(Debug, Clone)]
pub struct SoundCloudTrack {
    pub id: u64,
    pub metadata: TrackMetadata,
    pub transcodings: Vec<Transcoding>,
    api: Arc<SoundCloudApi>,
}

impl SoundCloudTrack {
    /// Cycles through the known stream kinds and returns the first URL that
    /// resolves.
    pub async fn stream_url(&self) -> PlayerResult<String> {
        let candidates = preferred_transcodings(&self.transcodings);
        if candidates.is_empty() {
            return Err(PlayerError::resolution(
                &self.metadata.title,
                "no playable transcoding",
            ));
        }

        let mut last_error = None;
        for transcoding in candidates {
            match self.resolve_transcoding(transcoding).await {
                Ok(url) => {
                    debug!(track = self.id, preset = %transcoding.preset, "stream resolved");
                    return Ok(url);
                }
                Err(e) => {
                    warn!("⚠️ Transcoding {} no disponible para {}: {}", transcoding.preset, self.metadata.title, e);
                    last_error = Some(e);
                }
            }
        }

        Err(PlayerError::resolution(
            &self.metadata.title,
            last_error.map(|e| e.to_string()).unwrap_or_default(),
        ))
    }

    async fn resolve_transcoding(&self, transcoding: &Transcoding) -> PlayerResult<String> {
        let mut url = Url::parse(&transcoding.url)
            .map_err(|e| PlayerError::resolution(&self.metadata.title, e))?;
        url.query_pairs_mut()
            .append_pair("client_id", &self.api.client_id);
        let location: StreamLocation = self.api.get_json(url).await?;
        Ok(location.url)
    }
}

/// Resolves SoundCloud track and playlist URLs.
pub struct SoundCloudProvider {
    api: Arc<SoundCloudApi>,
}

impl SoundCloudProvider {
    pub fn new(client_id: String) -> Self {
        Self::with_base_url(client_id, API_BASE.to_string())
    }

    pub fn with_base_url(client_id: String, base: String) -> Self {
        Self {
            api: Arc::new(SoundCloudApi {
                http: reqwest::Client::new(),
                client_id,
                base: base.trim_end_matches('/').to_string(),
            }),
        }
    }

    pub fn is_soundcloud_url(url: &str) -> bool {
        Url::parse(url)
            .ok()
            .and_then(|u| u.host_str().map(|h| h == "soundcloud.com" || h.ends_with(".soundcloud.com")))
            .unwrap_or(false)
    }

    async fn playlist_tracks(
        &self,
        playlist: ApiPlaylist,
        requester: &Requester,
    ) -> PlayerResult<Vec<Track>> {
        let reference = PlaylistRef {
            title: playlist.title,
            permalink: playlist.permalink_url,
            author: playlist.user.map(Author::from),
        };

        let stub_ids: Vec<u64> = playlist
            .tracks
            .iter()
            .filter(|t| t.is_stub())
            .map(|t| t.id)
            .collect();
        let mut fetched: HashMap<u64, ApiTrack> = if stub_ids.is_empty() {
            HashMap::new()
        } else {
            self.api
                .tracks_by_id(&stub_ids)
                .await?
                .into_iter()
                .map(|t| (t.id, t))
                .collect()
        };

        let tracks: Vec<Track> = playlist
            .tracks
            .into_iter()
            .map(|t| match t.is_stub() {
                true => fetched.remove(&t.id).unwrap_or(t),
                false => t,
            })
            .map(|t| Track::from(t.into_track(&self.api, requester, Some(&reference))))
            .collect();
        Ok(tracks)
    }
}

#[async_trait]
impl TrackProvider for SoundCloudProvider {
    async fn resolve(&self, locator: &str, requester: &Requester) -> PlayerResult<Vec<Track>> {
        let url = self.api.endpoint("/resolve", &[("url", locator)])?;
        let resolved: Resolved = self.api.get_json(url).await?;

        match resolved {
            Resolved::Track(track) => {
                info!("🎵 Track de SoundCloud: {}", track.title.as_deref().unwrap_or_default());
                Ok(vec![Track::from(track.into_track(&self.api, requester, None))])
            }
            Resolved::Playlist(playlist) => {
                info!("📃 Playlist de SoundCloud: {} ({} tracks)", playlist.title, playlist.tracks.len());
                self.playlist_tracks(playlist, requester).await
            }
            Resolved::Other => Err(PlayerError::UnsupportedLocator(locator.to_string())),
        }
    }

    fn handles(&self, locator: &str) -> bool {
        Self::is_soundcloud_url(locator)
    }

    fn name(&self) -> &'static str {
        "soundcloud"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serenity::model::id::UserId;

    fn transcoding(protocol: &str, mime: &str, preset: &str) -> Transcoding {
        Transcoding {
            url: format!("https://api-v2.soundcloud.com/media/{preset}"),
            preset: preset.to_string(),
            format: TranscodingFormat {
                protocol: protocol.to_string(),
                mime_type: mime.to_string(),
            },
        }
    }

    #[test]
    fn test_soundcloud_url_detection() {
        assert!(SoundCloudProvider::is_soundcloud_url("https://soundcloud.com/artist/track"));
        assert!(SoundCloudProvider::is_soundcloud_url("https://m.soundcloud.com/artist/sets/mix"));
        assert!(!SoundCloudProvider::is_soundcloud_url("https://notsoundcloud.com/a"));
        assert!(!SoundCloudProvider::is_soundcloud_url("soundcloud.com/artist"));
    }

    #[test]
    fn test_transcoding_preference_order() {
        let all = vec![
            transcoding("progressive", "audio/mpeg", "mp3_progressive"),
            transcoding("hls", "audio/mp4; codecs=\"mp4a.40.2\"", "aac_hls"),
            transcoding("hls", "audio/mpeg", "mp3_hls"),
            transcoding("hls", "audio/ogg; codecs=\"opus\"", "opus_hls"),
        ];

        let presets: Vec<_> = preferred_transcodings(&all)
            .into_iter()
            .map(|t| t.preset.as_str())
            .collect();
        assert_eq!(presets, vec!["opus_hls", "mp3_hls", "mp3_progressive"]);
    }

    #[test]
    fn test_resolved_track_deserialization() {
        let body = r#"{
            "kind": "track",
            "id": 12,
            "title": "Night Drive",
            "permalink_url": "https://soundcloud.com/someone/night-drive",
            "duration": 241000,
            "artwork_url": null,
            "playback_count": 1500,
            "likes_count": 30,
            "reposts_count": 2,
            "user": {"username": "someone", "permalink_url": "https://soundcloud.com/someone", "avatar_url": null},
            "media": {"transcodings": [
                {"url": "https://api-v2.soundcloud.com/media/1/stream/hls", "preset": "opus_0_0",
                 "format": {"protocol": "hls", "mime_type": "audio/ogg; codecs=\"opus\""}}
            ]}
        }"#;

        let resolved: Resolved = serde_json::from_str(body).unwrap();
        let Resolved::Track(api_track) = resolved else {
            panic!("expected a track");
        };

        let provider = SoundCloudProvider::new("id".into());
        let requester = Requester::new(UserId::new(7), "listener");
        let track = api_track.into_track(&provider.api, &requester, None);

        assert_eq!(track.metadata.title, "Night Drive");
        assert_eq!(track.metadata.duration_ms, 241_000);
        assert_eq!(track.metadata.author.as_ref().map(|a| a.name.as_str()), Some("someone"));
        assert_eq!(track.metadata.counters.map(|c| c.plays), Some(1500));
        assert_eq!(track.transcodings.len(), 1);
    }

    #[test]
    fn test_playlist_stub_detection_and_other_kinds() {
        let body = r#"{
            "kind": "playlist",
            "title": "Mix",
            "permalink_url": "https://soundcloud.com/someone/sets/mix",
            "user": null,
            "tracks": [
                {"id": 1, "title": "Full", "duration": 1000},
                {"id": 2}
            ]
        }"#;
        let Resolved::Playlist(playlist) = serde_json::from_str::<Resolved>(body).unwrap() else {
            panic!("expected a playlist");
        };
        let stubs: Vec<_> = playlist.tracks.iter().map(ApiTrack::is_stub).collect();
        assert_eq!(stubs, vec![false, true]);

        let user: Resolved = serde_json::from_str(r#"{"kind": "user", "id": 3}"#).unwrap();
        assert!(matches!(user, Resolved::Other));
    }

    #[tokio::test]
    async fn test_stream_url_without_transcodings_fails() {
        let provider = SoundCloudProvider::new("id".into());
        let track = SoundCloudTrack {
            id: 1,
            metadata: TrackMetadata::new(
                "Silent".into(),
                String::new(),
                Requester::new(UserId::new(1), "u"),
            ),
            transcodings: vec![transcoding("hls", "audio/mp4", "aac_hls")],
            api: Arc::clone(&provider.api),
        };

        let err = track.stream_url().await.unwrap_err();
        assert!(err.is_track_level());
    }

    #[test]
    fn test_endpoint_includes_client_id() {
        let provider = SoundCloudProvider::with_base_url("abc".into(), "http://localhost:9000/".into());
        let url = provider
            .api
            .endpoint("/resolve", &[("url", "https://soundcloud.com/a/b")])
            .unwrap();
        assert_eq!(
            url.as_str(),
            "http://localhost:9000/resolve?url=https%3A%2F%2Fsoundcloud.com%2Fa%2Fb&client_id=abc"
        );
    }
}
