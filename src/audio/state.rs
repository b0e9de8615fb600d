use crate::error::{PlayerError, PlayerResult};

/// Raw encoder gain representing 100%.
pub const NORMAL_VOLUME: i32 = 256;
pub const MAX_VOLUME: i32 = 512;
pub const MAX_VOLUME_PERCENT: i32 = 200;

/// Playback flags and volume of a player.
///
/// Also read by the queue to protect the track currently being played.
/// `paused` implies `playing`; `stopped` is only meaningful while the
/// playback loop unwinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaybackState {
    pub playing: bool,
    pub stopped: bool,
    pub paused: bool,
    /// Raw encoder gain, see [`NORMAL_VOLUME`].
    pub volume: i32,
}

impl PlaybackState {
    pub fn new() -> Self {
        Self::with_volume(NORMAL_VOLUME)
    }

    pub fn with_volume(volume: i32) -> Self {
        Self {
            playing: false,
            stopped: false,
            paused: false,
            volume,
        }
    }

    pub fn volume_percent(&self) -> i32 {
        raw_to_percent(self.volume)
    }
}

impl Default for PlaybackState {
    fn default() -> Self {
        Self::new()
    }
}

pub fn validate_raw_volume(raw: i32) -> PlayerResult<i32> {
    if !(0..=MAX_VOLUME).contains(&raw) {
        return Err(PlayerError::InvalidParameter {
            name: "volume",
            value: raw.into(),
            min: 0,
            max: MAX_VOLUME.into(),
        });
    }
    Ok(raw)
}

/// Converts a percentage (0–200) into raw encoder gain.
pub fn percent_to_raw(percent: i32) -> PlayerResult<i32> {
    if !(0..=MAX_VOLUME_PERCENT).contains(&percent) {
        return Err(PlayerError::InvalidParameter {
            name: "volume_percent",
            value: percent.into(),
            min: 0,
            max: MAX_VOLUME_PERCENT.into(),
        });
    }
    validate_raw_volume(NORMAL_VOLUME * percent / 100)
}

pub fn raw_to_percent(raw: i32) -> i32 {
    raw * 100 / NORMAL_VOLUME
}
