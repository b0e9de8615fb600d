//! # Audio Module
//!
//! Per-guild playback for Fox Player.
//!
//! ## Architecture
//!
//! ### [`player`] - Audio Player
//! - Owns the queue, the playback flags and the voice connection
//! - Runs one background loop per guild that streams the queue head to tail
//! - Pause, resume, skip, stop and volume are safe from any task
//!
//! ### [`queue`] - Queue Management
//! - Thread-safe ordered tracks with append, prepend, shuffle and removal
//! - The track being played is never moved or removed by bulk operations
//!
//! ### [`stats`] - Stream Statistics
//! - Periodic samples of playback position and encoder counters
//!
//! ### [`registry`] - Players by guild
//!
//! ## Audio Quality
//!
//! - **Sample Rate**: 48kHz (Discord standard)
//! - **Channels**: Stereo
//! - **Codec**: Opus, bitrate configurable per player
//! - **Volume**: applied by the encoder, 0-200%

pub mod display;
pub mod player;
pub mod queue;
pub mod registry;
pub mod state;
pub mod stats;

pub use display::NowPlaying;
pub use player::{Player, PlayerEvent};
pub use queue::Queue;
pub use registry::PlayerRegistry;
pub use state::PlaybackState;
pub use stats::Stats;
