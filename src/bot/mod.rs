//! # Bot Module
//!
//! Discord gateway glue for Fox Player.
//!
//! [`FoxBot`] implements Serenity's [`EventHandler`] and keeps the
//! [`PlayerRegistry`] in sync with the guilds the bot is in: a player is
//! created when a guild becomes available and shut down when the bot leaves
//! it.
//!
//! ## Example
//!
//! ```rust,ignore
//! use fox_player::{bot::FoxBot, sources::Sources};
//!
//! let bot = FoxBot::new(registry, Sources::new(), None);
//! ```

use serenity::{
    all::{ChannelId, ChannelType, Context, EventHandler, Guild, GuildId, Ready, UnavailableGuild},
    async_trait,
};
use std::sync::Arc;
use tracing::{info, warn};

use crate::{
    audio::PlayerRegistry,
    error::PlayerResult,
    sources::{Requester, Sources},
};

pub struct FoxBot {
    registry: Arc<PlayerRegistry>,
    sources: Sources,
    /// Preferred voice channel, used in the guild it belongs to.
    voice_channel: Option<ChannelId>,
}

impl FoxBot {
    pub fn new(registry: Arc<PlayerRegistry>, sources: Sources, voice_channel: Option<ChannelId>) -> Self {
        Self {
            registry,
            sources,
            voice_channel,
        }
    }

    pub fn registry(&self) -> &Arc<PlayerRegistry> {
        &self.registry
    }

    /// Resolves a locator, queues what it yields and starts playback.
    /// Returns how many tracks made it into the queue.
    pub async fn enqueue(&self, guild_id: GuildId, locator: &str, requester: &Requester) -> PlayerResult<usize> {
        let tracks = self.sources.resolve(locator, requester).await?;
        let player = self.registry.create(guild_id, None);
        let added = player.queue().append(tracks);
        info!("➕ {} track(s) agregados en guild {}", added, guild_id);
        player.play();
        Ok(added)
    }

    /// The configured channel when it lives in this guild, otherwise the
    /// first voice channel by position.
    fn pick_voice_channel(&self, guild: &Guild) -> Option<ChannelId> {
        if let Some(channel_id) = self.voice_channel {
            if guild.channels.contains_key(&channel_id) {
                return Some(channel_id);
            }
        }

        guild
            .channels
            .values()
            .filter(|channel| channel.kind == ChannelType::Voice)
            .min_by_key(|channel| channel.position)
            .map(|channel| channel.id)
    }
}

#[async_trait]
impl EventHandler for FoxBot {
    async fn ready(&self, _ctx: Context, ready: Ready) {
        info!("🤖 {} está en línea!", ready.user.name);
        info!("📊 Conectado a {} servidores", ready.guilds.len());
    }

    async fn guild_create(&self, _ctx: Context, guild: Guild, _is_new: Option<bool>) {
        let channel_id = self.pick_voice_channel(&guild);
        if channel_id.is_none() {
            warn!("⚠️ Guild {} no tiene canales de voz", guild.id);
        }
        self.registry.create(guild.id, channel_id);
    }

    async fn guild_delete(&self, _ctx: Context, incomplete: UnavailableGuild, _full: Option<Guild>) {
        if incomplete.unavailable {
            // Outage, not a removal.
            return;
        }
        if self.registry.remove(incomplete.id).await.is_some() {
            info!("👋 Bot removido de guild {}", incomplete.id);
        }
    }
}
