//! # Voice Module
//!
//! Abstraction over the voice transport that carries encoded frames to a
//! guild's voice channel. [`discord`] implements it on top of songbird;
//! tests plug in their own transport.

pub mod discord;

use async_trait::async_trait;
use serenity::model::id::{ChannelId, GuildId};
use std::{sync::Arc, time::Duration};
use tokio::sync::mpsc;

use crate::{
    encoder::{EncodeOptions, FrameReceiver},
    error::PlayerResult,
};

pub use discord::SongbirdTransport;

/// Why a stream stopped on its own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEnd {
    /// Every frame was sent.
    Finished,
    /// The voice connection went away mid-stream. The encode session is
    /// still alive and can be streamed again on a new connection.
    ConnectionClosed,
    Failed(String),
}

/// A running stream plus the channel that reports how it ended.
pub struct Stream {
    pub session: Arc<dyn StreamSession>,
    pub done: mpsc::Receiver<StreamEnd>,
}

#[async_trait]
pub trait StreamSession: Send + Sync {
    fn set_paused(&self, paused: bool);

    /// How much audio has been sent so far.
    async fn playback_position(&self) -> Duration;

    fn stop(&self);
}

#[async_trait]
pub trait VoiceTransport: Send + Sync {
    async fn connect(&self, guild_id: GuildId, channel_id: ChannelId) -> PlayerResult<Box<dyn VoiceConnection>>;
}

#[async_trait]
pub trait VoiceConnection: Send + Sync {
    async fn disconnect(&mut self) -> PlayerResult<()>;

    async fn set_speaking(&self, speaking: bool) -> PlayerResult<()>;

    /// Starts sending frames. Ends are reported on [`Stream::done`].
    async fn stream(&self, frames: FrameReceiver, options: &EncodeOptions) -> PlayerResult<Stream>;
}
