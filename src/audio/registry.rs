use futures::future::join_all;
use parking_lot::RwLock;
use serenity::model::id::{ChannelId, GuildId};
use std::{collections::HashMap, sync::Arc};
use tracing::info;

use super::player::Player;
use crate::{config::PlayerConfig, encoder::Encoder, voice::VoiceTransport};

/// Players by guild, all built over the same transport and encoder.
pub struct PlayerRegistry {
    players: RwLock<HashMap<GuildId, Arc<Player>>>,
    transport: Arc<dyn VoiceTransport>,
    encoder: Arc<dyn Encoder>,
    config: PlayerConfig,
}

impl PlayerRegistry {
    pub fn new(transport: Arc<dyn VoiceTransport>, encoder: Arc<dyn Encoder>, config: PlayerConfig) -> Self {
        info!("🎵 Inicializando registro de players");
        Self {
            players: RwLock::new(HashMap::new()),
            transport,
            encoder,
            config,
        }
    }

    /// Returns the guild's player, creating it on first use. A given channel
    /// replaces the one an existing player would connect to next.
    pub fn create(&self, guild_id: GuildId, channel_id: Option<ChannelId>) -> Arc<Player> {
        let mut players = self.players.write();
        if let Some(player) = players.get(&guild_id) {
            if let Some(channel_id) = channel_id {
                player.set_voice_channel(channel_id);
            }
            return Arc::clone(player);
        }

        let player = Arc::new(Player::new(
            guild_id,
            channel_id,
            Arc::clone(&self.transport),
            Arc::clone(&self.encoder),
            self.config.clone(),
        ));
        players.insert(guild_id, Arc::clone(&player));
        info!("🆕 Player creado para guild {}", guild_id);
        player
    }

    pub fn get(&self, guild_id: GuildId) -> Option<Arc<Player>> {
        self.players.read().get(&guild_id).cloned()
    }

    /// Takes the player out and shuts it down.
    pub async fn remove(&self, guild_id: GuildId) -> Option<Arc<Player>> {
        let player = self.players.write().remove(&guild_id)?;
        player.shutdown().await;
        info!("🗑️ Player de guild {} eliminado", guild_id);
        Some(player)
    }

    pub fn guilds(&self) -> Vec<GuildId> {
        self.players.read().keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.players.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.read().is_empty()
    }

    pub async fn shutdown_all(&self) {
        let players: Vec<Arc<Player>> = self.players.write().drain().map(|(_, player)| player).collect();
        info!("🛑 Cerrando {} player(s)", players.len());
        join_all(players.iter().map(|player| player.shutdown())).await;
    }
}
