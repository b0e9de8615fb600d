use anyhow::Result;
use serenity::{
    model::{gateway::GatewayIntents, id::ChannelId},
    Client,
};
use songbird::{SerenityInit, Songbird};
use std::sync::Arc;
use tracing::{error, info};

use fox_player::{
    bot::FoxBot,
    config::Config,
    encoder::FfmpegEncoder,
    sources::{DirectUrlProvider, SoundCloudProvider, Sources},
    voice::SongbirdTransport,
    PlayerRegistry,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Inicializar logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("fox_player=debug".parse()?)
                .add_directive("serenity=info".parse()?)
                .add_directive("songbird=info".parse()?),
        )
        .init();

    info!("🎵 Iniciando Fox Player v{}", env!("CARGO_PKG_VERSION"));

    // Manejar health check si es necesario
    if std::env::args().any(|arg| arg == "--health-check") {
        return health_check().await;
    }

    // Cargar configuración
    let config = Config::load()?;
    info!("{}", config.summary());

    let songbird = Songbird::serenity();
    let registry = Arc::new(PlayerRegistry::new(
        Arc::new(SongbirdTransport::new(Arc::clone(&songbird))),
        Arc::new(FfmpegEncoder::new(config.ffmpeg_path.clone(), config.frame_buffer)),
        config.player_config(),
    ));

    // SoundCloud primero: el proveedor directo acepta cualquier URL http(s)
    let sources = Sources::new()
        .with_provider(SoundCloudProvider::new(config.soundcloud_client_id.clone()))
        .with_provider(DirectUrlProvider::new());

    let handler = FoxBot::new(
        Arc::clone(&registry),
        sources,
        config.voice_channel_id.map(ChannelId::new),
    );

    // Configurar intents mínimos necesarios
    let intents = GatewayIntents::GUILDS | GatewayIntents::GUILD_VOICE_STATES;

    // Construir cliente
    let mut client = Client::builder(&config.discord_token, intents)
        .event_handler(handler)
        .register_songbird_with(songbird)
        .await?;

    // Manejar shutdown graceful
    let shard_manager = Arc::clone(&client.shard_manager);
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Error al registrar Ctrl+C: {:?}", e);
            return;
        }
        info!("⚠️ Señal de shutdown recibida, cerrando...");
        registry.shutdown_all().await;
        shard_manager.shutdown_all().await;
    });

    // Iniciar bot
    info!("🚀 Bot iniciado exitosamente");
    if let Err(why) = client.start().await {
        error!("Error al ejecutar cliente: {:?}", why);
    }

    Ok(())
}

async fn health_check() -> Result<()> {
    let ffmpeg_path = std::env::var("FFMPEG_PATH").unwrap_or_else(|_| "ffmpeg".to_string());

    // Verificar dependencias críticas
    let ffmpeg = async_process::Command::new(&ffmpeg_path)
        .arg("-version")
        .output()
        .await?;

    if ffmpeg.status.success() {
        println!("OK");
        Ok(())
    } else {
        anyhow::bail!("Dependencias faltantes: {}", ffmpeg_path);
    }
}
