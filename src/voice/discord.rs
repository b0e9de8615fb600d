use async_trait::async_trait;
use parking_lot::Mutex;
use serenity::model::id::{ChannelId, GuildId};
use songbird::{
    driver::Bitrate,
    input::{Input, RawAdapter},
    tracks::TrackHandle,
    Call, CoreEvent, Event, EventContext, EventHandler as VoiceEventHandler, Songbird, TrackEvent,
};
use std::{sync::Arc, time::Duration};
use tokio::sync::{mpsc, Mutex as AsyncMutex};
use tracing::{debug, info, warn};

use super::{Stream, StreamEnd, StreamSession, VoiceConnection, VoiceTransport};
use crate::{
    encoder::{
        frames::{CHANNELS, SAMPLE_RATE},
        EncodeOptions, FrameReader, FrameReceiver,
    },
    error::{PlayerError, PlayerResult},
};

/// Where the active stream reports its end. Replaced on every new stream.
type EndSlot = Arc<Mutex<Option<mpsc::Sender<StreamEnd>>>>;

pub struct SongbirdTransport {
    manager: Arc<Songbird>,
}

impl SongbirdTransport {
    pub fn new(manager: Arc<Songbird>) -> Self {
        Self { manager }
    }
}

#[async_trait]
impl VoiceTransport for SongbirdTransport {
    async fn connect(&self, guild_id: GuildId, channel_id: ChannelId) -> PlayerResult<Box<dyn VoiceConnection>> {
        info!("🔗 Conectando al canal {} en guild {}", channel_id, guild_id);

        let call = self
            .manager
            .join(guild_id, channel_id)
            .await
            .map_err(|e| PlayerError::VoiceConnection(format!("error al unirse al canal {channel_id}: {e:?}")))?;

        let end_slot: EndSlot = Arc::new(Mutex::new(None));
        {
            let mut handler = call.lock().await;
            handler.add_global_event(
                Event::Core(CoreEvent::DriverDisconnect),
                DisconnectHandler {
                    guild_id,
                    end_slot: Arc::clone(&end_slot),
                },
            );
        }

        Ok(Box::new(SongbirdConnection {
            manager: Arc::clone(&self.manager),
            guild_id,
            call,
            end_slot,
        }))
    }
}

pub struct SongbirdConnection {
    manager: Arc<Songbird>,
    guild_id: GuildId,
    call: Arc<AsyncMutex<Call>>,
    end_slot: EndSlot,
}

#[async_trait]
impl VoiceConnection for SongbirdConnection {
    async fn disconnect(&mut self) -> PlayerResult<()> {
        self.end_slot.lock().take();
        self.manager
            .remove(self.guild_id)
            .await
            .map_err(|e| PlayerError::VoiceConnection(format!("error al desconectar: {e:?}")))
    }

    async fn set_speaking(&self, speaking: bool) -> PlayerResult<()> {
        // The driver flags speaking by itself while it mixes audio.
        debug!("🎙️ speaking={} en guild {}", speaking, self.guild_id);
        Ok(())
    }

    async fn stream(&self, frames: FrameReceiver, options: &EncodeOptions) -> PlayerResult<Stream> {
        let (tx, rx) = mpsc::channel(4);
        *self.end_slot.lock() = Some(tx.clone());

        let input: Input = RawAdapter::new(FrameReader::new(frames), SAMPLE_RATE, CHANNELS).into();
        let bitrate = i32::try_from(options.bitrate.saturating_mul(1000)).unwrap_or(i32::MAX);

        let track = {
            let mut handler = self.call.lock().await;
            handler.set_bitrate(Bitrate::BitsPerSecond(bitrate));
            handler.play_only_input(input)
        };

        track
            .add_event(
                Event::Track(TrackEvent::End),
                EndNotifier {
                    tx: tx.clone(),
                    end: StreamEnd::Finished,
                },
            )
            .map_err(|e| PlayerError::Stream(format!("{e:?}")))?;
        track
            .add_event(
                Event::Track(TrackEvent::Error),
                EndNotifier {
                    tx,
                    end: StreamEnd::Failed("el driver de voz reportó un error en el track".into()),
                },
            )
            .map_err(|e| PlayerError::Stream(format!("{e:?}")))?;

        Ok(Stream {
            session: Arc::new(SongbirdStream { track }),
            done: rx,
        })
    }
}

struct SongbirdStream {
    track: TrackHandle,
}

#[async_trait]
impl StreamSession for SongbirdStream {
    fn set_paused(&self, paused: bool) {
        let result = if paused { self.track.pause() } else { self.track.play() };
        if let Err(e) = result {
            warn!("⚠️ No se pudo cambiar la pausa del track: {:?}", e);
        }
    }

    async fn playback_position(&self) -> Duration {
        match self.track.get_info().await {
            Ok(state) => state.position,
            Err(_) => Duration::ZERO,
        }
    }

    fn stop(&self) {
        if let Err(e) = self.track.stop() {
            debug!("track ya detenido: {:?}", e);
        }
    }
}

struct EndNotifier {
    tx: mpsc::Sender<StreamEnd>,
    end: StreamEnd,
}

#[async_trait]
impl VoiceEventHandler for EndNotifier {
    async fn act(&self, _ctx: &EventContext<'_>) -> Option<Event> {
        // The player may have moved on already.
        let _ = self.tx.try_send(self.end.clone());
        None
    }
}

struct DisconnectHandler {
    guild_id: GuildId,
    end_slot: EndSlot,
}

#[async_trait]
impl VoiceEventHandler for DisconnectHandler {
    async fn act(&self, _ctx: &EventContext<'_>) -> Option<Event> {
        warn!("📡 Conexión de voz perdida en guild {}", self.guild_id);
        if let Some(tx) = self.end_slot.lock().as_ref() {
            let _ = tx.try_send(StreamEnd::ConnectionClosed);
        }
        None
    }
}
