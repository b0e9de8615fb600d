use parking_lot::{Mutex, RwLock};
use serenity::model::id::{ChannelId, GuildId};
use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::{
    sync::{broadcast, mpsc, Mutex as AsyncMutex},
    time::{interval_at, Instant, MissedTickBehavior},
};
use tracing::{debug, error, info, warn};

use super::{
    display::NowPlaying,
    queue::{Queue, SharedState},
    state::{percent_to_raw, raw_to_percent, validate_raw_volume, PlaybackState},
    stats::Stats,
};
use crate::{
    config::PlayerConfig,
    encoder::{EncodeOptions, EncodeSession, Encoder},
    error::{PlayerError, PlayerResult},
    sources::Track,
    voice::{Stream, StreamEnd, StreamSession, VoiceConnection, VoiceTransport},
};

const EVENT_CAPACITY: usize = 32;

/// Notifications published by a [`Player`].
#[derive(Debug, Clone)]
pub enum PlayerEvent {
    TrackStarted(Track),
    TrackEnded(Track),
    TrackFailed { track: Track, reason: String },
    /// The loop ran out of tracks.
    QueueEmpty,
    VoiceReconnected,
    VoiceLost { reason: String },
    /// A stop request ended the loop.
    Stopped,
    /// The loop is gone and the player is back to rest.
    Idle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TrackOutcome {
    Finished,
    Skipped,
    Stopped,
}

/// Why the playback loop gave up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoopEnd {
    Drained,
    Stopped,
    Aborted,
}

/// Owned by whoever runs the playback loop.
struct AudioSlot {
    voice: Option<Box<dyn VoiceConnection>>,
    cancel: mpsc::Receiver<()>,
}

/// Per-guild audio controller.
///
/// Plays the [`Queue`] head to tail on a background loop started by
/// [`Player::play`]. Every other operation is safe to call at any time from
/// any task: controls never block on the loop, they flip flags or send a
/// signal the loop picks up.
pub struct Player {
    guild_id: GuildId,
    channel_id: RwLock<Option<ChannelId>>,
    queue: Queue,
    state: SharedState,
    stats: RwLock<Option<Stats>>,
    stream: Mutex<Option<Arc<dyn StreamSession>>>,
    audio: Arc<AsyncMutex<AudioSlot>>,
    cancel: mpsc::Sender<()>,
    running: AtomicBool,
    /// A `play()` arrived while the loop was on its way out.
    replay: AtomicBool,
    closed: AtomicBool,
    repeat: AtomicBool,
    transport: Arc<dyn VoiceTransport>,
    encoder: Arc<dyn Encoder>,
    events: broadcast::Sender<PlayerEvent>,
    config: PlayerConfig,
}

impl Player {
    pub fn new(
        guild_id: GuildId,
        channel_id: Option<ChannelId>,
        transport: Arc<dyn VoiceTransport>,
        encoder: Arc<dyn Encoder>,
        config: PlayerConfig,
    ) -> Self {
        let state: SharedState = Arc::new(RwLock::new(PlaybackState::with_volume(config.default_volume)));
        let (cancel_tx, cancel_rx) = mpsc::channel(1);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        Self {
            guild_id,
            channel_id: RwLock::new(channel_id),
            queue: Queue::new(Arc::clone(&state), config.max_queue_size),
            state,
            stats: RwLock::new(None),
            stream: Mutex::new(None),
            audio: Arc::new(AsyncMutex::new(AudioSlot {
                voice: None,
                cancel: cancel_rx,
            })),
            cancel: cancel_tx,
            running: AtomicBool::new(false),
            replay: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            repeat: AtomicBool::new(false),
            transport,
            encoder,
            events,
            config,
        }
    }

    pub fn guild_id(&self) -> GuildId {
        self.guild_id
    }

    pub fn queue(&self) -> &Queue {
        &self.queue
    }

    pub fn voice_channel(&self) -> Option<ChannelId> {
        *self.channel_id.read()
    }

    /// Used by the next connection; a live connection stays where it is.
    pub fn set_voice_channel(&self, channel_id: ChannelId) {
        *self.channel_id.write() = Some(channel_id);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PlayerEvent> {
        self.events.subscribe()
    }

    fn emit(&self, event: PlayerEvent) {
        // Nobody listening is fine.
        let _ = self.events.send(event);
    }

    /// Starts the playback loop in the background unless one is already
    /// running.
    ///
    /// A call that lands while a drained loop is still leaving the voice
    /// channel is remembered, and the loop starts over once it is gone.
    pub fn play(self: &Arc<Self>) {
        if self.closed.load(Ordering::Acquire) {
            warn!("⚠️ Player de guild {} cerrado, ignorando play", self.guild_id);
            return;
        }
        if self.state.read().playing {
            self.replay.store(true, Ordering::Release);
            debug!("▶️ Ya se está reproduciendo en guild {}", self.guild_id);
            return;
        }
        if self.running.swap(true, Ordering::AcqRel) {
            self.replay.store(true, Ordering::Release);
            debug!("▶️ El loop de reproducción ya está activo en guild {}", self.guild_id);
            return;
        }

        let player = Arc::clone(self);
        tokio::spawn(async move {
            let mut slot = Arc::clone(&player.audio).lock_owned().await;
            if player.closed.load(Ordering::Acquire) {
                drop(slot);
                player.running.store(false, Ordering::Release);
                return;
            }
            player.replay.store(false, Ordering::Release);
            player.state.write().stopped = false;

            let end = player.run(&mut slot).await;
            player.finish(&mut slot);
            player.disconnect(&mut slot.voice).await;

            drop(slot);
            player.running.store(false, Ordering::Release);
            player.emit(PlayerEvent::Idle);

            if end == LoopEnd::Drained
                && player.replay.swap(false, Ordering::AcqRel)
                && !player.queue.is_empty()
            {
                debug!("🔄 Reanudando con los tracks nuevos en guild {}", player.guild_id);
                player.play();
            }
        });
    }

    async fn run(&self, slot: &mut AudioSlot) -> LoopEnd {
        info!("▶️ Iniciando reproducción en guild {}", self.guild_id);

        loop {
            // A skip aimed at the previous track must not hit this one.
            while slot.cancel.try_recv().is_ok() {}
            if self.state.read().stopped {
                self.emit(PlayerEvent::Stopped);
                return LoopEnd::Stopped;
            }

            let Some(track) = self.queue.get() else {
                info!("📭 No hay más tracks en la cola de guild {}", self.guild_id);
                self.emit(PlayerEvent::QueueEmpty);
                return LoopEnd::Drained;
            };

            let url = match track.stream_url().await {
                Ok(url) => url,
                Err(e) => {
                    warn!("⚠️ No se pudo resolver '{}': {}", track.title(), e);
                    self.skip_failed(track, e);
                    continue;
                }
            };

            match self.play_track(slot, &track, &url).await {
                Ok(TrackOutcome::Stopped) => {
                    info!("⏹️ Reproducción detenida en guild {}", self.guild_id);
                    self.emit(PlayerEvent::Stopped);
                    return LoopEnd::Stopped;
                }
                Ok(outcome) => {
                    debug!("🎵 '{}' terminó: {:?}", track.title(), outcome);
                    self.emit(PlayerEvent::TrackEnded(track));
                    self.advance();
                }
                Err(e) if e.is_track_level() => {
                    warn!("⚠️ Saltando '{}': {}", track.title(), e);
                    self.skip_failed(track, e);
                }
                Err(e) if e.is_fatal_to_loop() => {
                    error!("❌ Error fatal de reproducción en guild {}: {}", self.guild_id, e);
                    if matches!(e, PlayerError::VoiceConnection(_)) {
                        self.emit(PlayerEvent::VoiceLost { reason: e.to_string() });
                    }
                    return LoopEnd::Aborted;
                }
                Err(e) => {
                    error!("❌ Error inesperado con '{}' en guild {}: {}", track.title(), self.guild_id, e);
                    self.skip_failed(track, e);
                }
            }
        }
    }

    fn skip_failed(&self, track: Track, error: PlayerError) {
        self.emit(PlayerEvent::TrackFailed {
            track,
            reason: error.to_string(),
        });
        self.queue.pop();
    }

    fn advance(&self) {
        if self.repeat.load(Ordering::Acquire) {
            self.queue.cycle();
        } else {
            self.queue.pop();
        }
    }

    async fn play_track(&self, slot: &mut AudioSlot, track: &Track, url: &str) -> PlayerResult<TrackOutcome> {
        self.start_streaming(&mut slot.voice).await?;

        let options = EncodeOptions {
            bitrate: self.config.bitrate,
            volume: self.state.read().volume,
        };

        let outcome = match self.encoder.start(url, options).await {
            Ok(session) => {
                let outcome = self.drive(slot, track, session.as_ref(), &options).await;
                session.cleanup();
                outcome
            }
            Err(e) => Err(e),
        };

        self.stop_streaming(&slot.voice).await;
        outcome
    }

    /// Connects on first use and marks the player as playing.
    async fn start_streaming(&self, voice: &mut Option<Box<dyn VoiceConnection>>) -> PlayerResult<()> {
        if voice.is_none() {
            let channel_id = self
                .voice_channel()
                .ok_or_else(|| PlayerError::VoiceConnection("no hay canal de voz configurado".into()))?;
            *voice = Some(self.transport.connect(self.guild_id, channel_id).await?);
            info!("✅ Conectado al canal {} en guild {}", channel_id, self.guild_id);
        }

        if let Some(connection) = voice.as_ref() {
            if let Err(e) = connection.set_speaking(true).await {
                warn!("⚠️ No se pudo activar speaking: {}", e);
            }
        }

        *self.stats.write() = Some(Stats::new());
        {
            let mut state = self.state.write();
            state.playing = true;
            state.paused = false;
        }
        self.replay.store(false, Ordering::Release);
        Ok(())
    }

    async fn stop_streaming(&self, voice: &Option<Box<dyn VoiceConnection>>) {
        if let Some(connection) = voice.as_ref() {
            if let Err(e) = connection.set_speaking(false).await {
                warn!("⚠️ No se pudo desactivar speaking: {}", e);
            }
        }

        *self.stream.lock() = None;
        *self.stats.write() = None;
        self.state.write().paused = false;
    }

    /// Waits for the stream to end, for a cancel signal or for the next
    /// stats tick, and recovers from one dropped connection per drop.
    async fn drive(
        &self,
        slot: &mut AudioSlot,
        track: &Track,
        session: &dyn EncodeSession,
        options: &EncodeOptions,
    ) -> PlayerResult<TrackOutcome> {
        let AudioSlot { voice, cancel } = slot;

        let mut stream = self.attach(voice, session, options).await?;
        info!("🎵 Reproduciendo: {}", track.listen_status());
        self.emit(PlayerEvent::TrackStarted(track.clone()));

        let period = self.config.stats_interval;
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                end = stream.done.recv() => match end.unwrap_or(StreamEnd::Finished) {
                    StreamEnd::Finished => return Ok(TrackOutcome::Finished),
                    StreamEnd::ConnectionClosed => {
                        stream = self.reconnect(voice, session, options).await?;
                    }
                    StreamEnd::Failed(reason) => return Err(PlayerError::Stream(reason)),
                },
                Some(()) = cancel.recv() => {
                    stream.session.stop();
                    session.stop();
                    return if self.state.read().stopped {
                        Ok(TrackOutcome::Stopped)
                    } else {
                        Ok(TrackOutcome::Skipped)
                    };
                }
                _ = ticker.tick() => {
                    self.sample_stats(stream.session.as_ref(), session).await;
                }
            }
        }
    }

    async fn attach(
        &self,
        voice: &Option<Box<dyn VoiceConnection>>,
        session: &dyn EncodeSession,
        options: &EncodeOptions,
    ) -> PlayerResult<Stream> {
        let connection = voice
            .as_ref()
            .ok_or_else(|| PlayerError::VoiceConnection("sin conexión de voz".into()))?;
        let stream = connection.stream(session.frames(), options).await?;
        *self.stream.lock() = Some(Arc::clone(&stream.session));
        Ok(stream)
    }

    /// One attempt: drop the dead connection, open a new one and stream the
    /// same encode session on it.
    async fn reconnect(
        &self,
        voice: &mut Option<Box<dyn VoiceConnection>>,
        session: &dyn EncodeSession,
        options: &EncodeOptions,
    ) -> PlayerResult<Stream> {
        warn!("📡 Conexión de voz perdida en guild {}, reconectando...", self.guild_id);
        *self.stream.lock() = None;

        if let Some(mut connection) = voice.take() {
            connection.disconnect().await?;
        }

        let channel_id = self
            .voice_channel()
            .ok_or_else(|| PlayerError::VoiceConnection("no hay canal de voz configurado".into()))?;
        let connection = self.transport.connect(self.guild_id, channel_id).await?;
        if let Err(e) = connection.set_speaking(true).await {
            warn!("⚠️ No se pudo activar speaking: {}", e);
        }
        *voice = Some(connection);

        let stream = self.attach(voice, session, options).await?;
        if self.state.read().paused {
            stream.session.set_paused(true);
        }

        info!("🔗 Reconectado al canal {} en guild {}", channel_id, self.guild_id);
        self.emit(PlayerEvent::VoiceReconnected);
        Ok(stream)
    }

    async fn sample_stats(&self, stream: &dyn StreamSession, session: &dyn EncodeSession) {
        let position = stream.playback_position().await;
        let encode = session.stats();
        if let Some(stats) = self.stats.write().as_mut() {
            stats.record(position, encode);
        }
    }

    async fn disconnect(&self, voice: &mut Option<Box<dyn VoiceConnection>>) {
        if let Some(mut connection) = voice.take() {
            match connection.disconnect().await {
                Ok(()) => info!("👋 Desconectado del canal de voz en guild {}", self.guild_id),
                Err(e) => error!("❌ Error al desconectar en guild {}: {}", self.guild_id, e),
            }
        }
    }

    fn finish(&self, slot: &mut AudioSlot) {
        {
            let mut state = self.state.write();
            state.playing = false;
            state.paused = false;
        }
        *self.stream.lock() = None;
        *self.stats.write() = None;

        // Signals sent after the last check belong to this run.
        while slot.cancel.try_recv().is_ok() {}
        debug!("💤 Loop de reproducción terminado en guild {}", self.guild_id);
    }

    /// Ends the loop after the current track is torn down and leaves the
    /// voice channel. Does nothing when nothing plays or a stop is pending.
    pub fn stop(&self) {
        {
            let mut state = self.state.write();
            if !state.playing || state.stopped {
                return;
            }
            state.stopped = true;
        }
        info!("⏹️ Deteniendo reproducción en guild {}", self.guild_id);
        let _ = self.cancel.try_send(());
    }

    /// Moves on to the next track. Does nothing when nothing plays.
    pub fn skip(&self) {
        if !self.state.read().playing {
            return;
        }
        info!("⏭️ Saltando track en guild {}", self.guild_id);
        let _ = self.cancel.try_send(());
    }

    fn active_stream(&self) -> PlayerResult<Arc<dyn StreamSession>> {
        self.stream.lock().clone().ok_or(PlayerError::NoActiveSession)
    }

    pub fn pause(&self) {
        let stream = match self.active_stream() {
            Ok(stream) => stream,
            Err(e) => {
                debug!("⏸️ Nada que pausar: {}", e);
                return;
            }
        };
        {
            let mut state = self.state.write();
            if !state.playing || state.paused {
                return;
            }
            state.paused = true;
        }
        stream.set_paused(true);
        info!("⏸️ Reproducción pausada en guild {}", self.guild_id);
    }

    pub fn resume(&self) {
        let stream = match self.active_stream() {
            Ok(stream) => stream,
            Err(e) => {
                debug!("▶️ Nada que reanudar: {}", e);
                return;
            }
        };
        {
            let mut state = self.state.write();
            if !state.playing || !state.paused {
                return;
            }
            state.paused = false;
        }
        stream.set_paused(false);
        info!("▶️ Reproducción reanudada en guild {}", self.guild_id);
    }

    /// Raw gain from 0 to 512. Applies from the next track on.
    pub fn set_volume(&self, volume: i32) -> PlayerResult<()> {
        let volume = validate_raw_volume(volume)?;
        self.state.write().volume = volume;
        info!("🔊 Volumen ajustado a {}% en guild {}", raw_to_percent(volume), self.guild_id);
        Ok(())
    }

    /// Percentage from 0 to 200. Applies from the next track on.
    pub fn set_volume_percent(&self, percent: i32) -> PlayerResult<()> {
        self.set_volume(percent_to_raw(percent)?)
    }

    pub fn volume(&self) -> i32 {
        self.state.read().volume
    }

    pub fn volume_percent(&self) -> i32 {
        self.state.read().volume_percent()
    }

    /// When on, finished tracks go back to the end of the queue.
    pub fn set_repeat(&self, repeat: bool) {
        self.repeat.store(repeat, Ordering::Release);
        info!("🔁 Repetición {} en guild {}", if repeat { "activada" } else { "desactivada" }, self.guild_id);
    }

    pub fn repeat(&self) -> bool {
        self.repeat.load(Ordering::Acquire)
    }

    pub fn state(&self) -> PlaybackState {
        *self.state.read()
    }

    pub fn is_playing(&self) -> bool {
        self.state.read().playing
    }

    pub fn is_paused(&self) -> bool {
        self.state.read().paused
    }

    pub fn is_stopped(&self) -> bool {
        self.state.read().stopped
    }

    /// Snapshot of the current stream statistics, if streaming.
    pub fn stats(&self) -> Option<Stats> {
        self.stats.read().clone()
    }

    pub async fn now_playing(&self) -> Option<NowPlaying> {
        if !self.is_playing() {
            return None;
        }
        let track = self.queue.get()?;

        let stream = self.stream.lock().clone();
        let position = match stream {
            Some(stream) => stream.playback_position().await,
            None => Duration::ZERO,
        };

        Some(NowPlaying {
            total: track.duration(),
            remaining_tracks: self.queue.len().saturating_sub(1),
            remaining_duration: self.queue.duration().saturating_sub(track.duration()),
            position,
            track,
        })
    }

    /// Stops playback, waits for the loop to let go and leaves the voice
    /// channel. The player refuses to play afterwards.
    pub async fn shutdown(&self) {
        self.closed.store(true, Ordering::Release);
        {
            let mut state = self.state.write();
            if state.playing || self.running.load(Ordering::Acquire) {
                state.stopped = true;
            }
        }
        let _ = self.cancel.try_send(());

        let mut slot = self.audio.lock().await;
        self.disconnect(&mut slot.voice).await;
        while slot.cancel.try_recv().is_ok() {}
        info!("🛑 Player de guild {} cerrado", self.guild_id);
    }
}
