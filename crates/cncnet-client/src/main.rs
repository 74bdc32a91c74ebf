//! Console client for the CnCNet saved-game loading lobby.

mod command;
mod error;
mod lobby;
mod platform;
mod session;

use clap::Parser;
use cncnet_config::{CliArgs, Config, Mode};
use cncnet_loading::{GameLoadingSyncEngine, LoadingTransport, SessionContext};

use crate::error::AppError;
use crate::platform::AppDirs;

#[tokio::main]
async fn main() {
    let args = CliArgs::parse();
    if let Err(e) = run(args).await {
        tracing::error!("{e}");
        eprintln!("cncnet-client: {e}");
        std::process::exit(1);
    }
}

async fn run(args: CliArgs) -> Result<(), AppError> {
    let dirs = AppDirs::resolve(args.config.as_deref())?;
    let mut config = Config::load_or_create(&dirs.config_dir)?;
    config.apply_cli_overrides(&args);
    config.validate()?;
    cncnet_log::init_logging(Some(&dirs.log_dir), config.debug.file_logging, Some(&config));
    tracing::info!("Config loaded from {}", dirs.config_dir.display());

    let ctx = SessionContext::from_config(&config);
    let roster = session::local_roster(&ctx)?;
    tracing::info!("Saved game {} with {} players", roster.game_id, roster.players.len());

    match args.mode {
        Mode::LanHost => {
            let transport = session::lan_host(&config, &roster)?;
            start(ctx, transport).await
        }
        Mode::LanJoin { host } => {
            let transport = session::lan_join(&config, &roster, &host).await?;
            start(ctx, transport).await
        }
        Mode::CncnetHost { channel, tunnel } => {
            let transport = session::cncnet_host(&config, &roster, channel, tunnel).await?;
            start(ctx, transport).await
        }
        Mode::CncnetJoin {
            channel,
            host,
            password,
        } => {
            let transport = session::cncnet_join(&config, channel, host, password).await?;
            start(ctx, transport).await
        }
    }
}

async fn start<T: LoadingTransport>(ctx: SessionContext, transport: T) -> Result<(), AppError> {
    let collaborators = session::collaborators(&ctx);
    let mut engine = GameLoadingSyncEngine::new(ctx, transport, collaborators)?;
    engine.start()?;
    lobby::run(engine, lobby::spawn_stdin_reader()).await;
    Ok(())
}
