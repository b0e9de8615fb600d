//! # Fox Player
//!
//! Per-guild audio streaming for a Discord music bot: resolves SoundCloud
//! and direct links into tracks, queues them and streams them into a voice
//! channel through ffmpeg and songbird.

pub mod audio;
pub mod bot;
pub mod config;
pub mod encoder;
pub mod error;
pub mod sources;
pub mod voice;

pub use audio::{NowPlaying, PlaybackState, Player, PlayerEvent, PlayerRegistry, Queue, Stats};
pub use config::{Config, PlayerConfig};
pub use error::{PlayerError, PlayerResult};
