//! # Encoder Module
//!
//! Turns a remote stream URL into transport-ready audio frames.
//!
//! The [`Encoder`] starts one [`EncodeSession`] per track. The session keeps
//! running independently of whoever reads its frames, so a voice connection
//! that drops mid-track can be re-attached to the same session without
//! restarting the transcode.
//!
//! Volume is applied at encode time: changing it only affects the next
//! session.

pub mod ffmpeg;
pub mod frames;

use async_trait::async_trait;
use std::{sync::Arc, time::Duration};

use crate::{audio::state::NORMAL_VOLUME, error::PlayerResult};

pub use ffmpeg::FfmpegEncoder;
pub use frames::{frame_channel, FrameReader, FrameReceiver, FrameSender};

/// Settings baked into an encode session when it starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodeOptions {
    /// Opus bitrate in kbit/s.
    pub bitrate: u32,
    /// Raw gain, 256 being 100%.
    pub volume: i32,
}

impl EncodeOptions {
    pub fn gain(&self) -> f32 {
        self.volume as f32 / NORMAL_VOLUME as f32
    }
}

/// Live counters of an encode session.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct EncodeStats {
    /// Amount of audio encoded so far.
    pub duration: Duration,
    pub size_kb: u64,
    /// kbit/s
    pub bitrate: f32,
    /// Encoding speed relative to real time.
    pub speed: f32,
}

#[async_trait]
pub trait Encoder: Send + Sync {
    async fn start(&self, url: &str, options: EncodeOptions) -> PlayerResult<Arc<dyn EncodeSession>>;
}

pub trait EncodeSession: Send + Sync {
    /// A new handle on the session's frame channel. Every handle drains the
    /// same frames, so only one stream should read at a time.
    fn frames(&self) -> FrameReceiver;

    fn stats(&self) -> EncodeStats;

    /// Stops transcoding; pending frames may still be read.
    fn stop(&self);

    /// Releases every resource held by the session.
    fn cleanup(&self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gain_from_raw_volume() {
        let half = EncodeOptions { bitrate: 120, volume: 128 };
        assert_eq!(half.gain(), 0.5);
        let double = EncodeOptions { bitrate: 120, volume: 512 };
        assert_eq!(double.gain(), 2.0);
    }
}
