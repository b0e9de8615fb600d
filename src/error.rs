use thiserror::Error;

/// Errors produced by the playback core.
///
/// Loop-internal failures are absorbed and logged by the playback loop; only
/// synchronously validated preconditions (such as an out-of-range volume) are
/// returned to callers of the control operations.
#[derive(Error, Debug)]
pub enum PlayerError {
    /// The stream URL of a track could not be resolved. The track is skipped.
    #[error("unable to resolve track '{title}': {reason}")]
    TrackResolution { title: String, reason: String },

    /// The locator is neither a single track nor a collection of tracks.
    #[error("unsupported locator: {0}")]
    UnsupportedLocator(String),

    /// Joining, leaving or re-joining the voice channel failed.
    #[error("voice connection error: {0}")]
    VoiceConnection(String),

    /// The encode session could not be started. The track is skipped.
    #[error("encode session error: {0}")]
    EncodeSession(String),

    /// The stream ended with an error that cannot be recovered from.
    #[error("stream error: {0}")]
    Stream(String),

    #[error("invalid parameter {name}: {value} (expected {min}..={max})")]
    InvalidParameter {
        name: &'static str,
        value: i64,
        min: i64,
        max: i64,
    },

    /// A control operation needed an active stream and there is none.
    #[error("no active stream session")]
    NoActiveSession,

    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

impl PlayerError {
    /// Errors tied to a single track: the loop pops it and moves on.
    pub fn is_track_level(&self) -> bool {
        matches!(
            self,
            PlayerError::TrackResolution { .. } | PlayerError::EncodeSession(_)
        )
    }

    /// Errors that make the playback loop give up, leaving the queue intact.
    pub fn is_fatal_to_loop(&self) -> bool {
        matches!(
            self,
            PlayerError::VoiceConnection(_) | PlayerError::Stream(_)
        )
    }

    pub(crate) fn resolution(title: impl Into<String>, reason: impl ToString) -> Self {
        PlayerError::TrackResolution {
            title: title.into(),
            reason: reason.to_string(),
        }
    }
}

pub type PlayerResult<T> = std::result::Result<T, PlayerError>;
