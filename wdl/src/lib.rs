use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Instant,
};

use log::LevelFilter;
use simplelog::{ColorChoice, ConfigBuilder, TermLogger, TerminalMode};
use thiserror::Error;
use tokio::io::AsyncRead;
use wdl_config::{CaptureConfig, LoggingConfig};
use wdl_world::{
    ChunkParsingError, VersionStrategy, World,
    block::{BlockStateRegistry, GlobalPalette},
};

use crate::{
    net::{
        decoder::{CaptureDecoder, PacketDecodeError},
        dispatch::{HandlerStats, PacketHandler},
    },
    world::ChunkSaver,
};

pub mod net;
pub mod world;

#[derive(Error, Debug)]
pub enum ReplayError {
    #[error(transparent)]
    Version(#[from] ChunkParsingError),
    #[error("failed to open {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid block report: {0}")]
    Registry(#[from] serde_json::Error),
    #[error("save worker panicked: {0}")]
    Join(#[from] tokio::task::JoinError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplaySummary {
    pub stats: HandlerStats,
    pub files_written: usize,
    /// The capture ended with a packet that could not be framed.
    pub truncated: bool,
}

pub fn init_logger(logging: &LoggingConfig) -> Result<(), log::SetLoggerError> {
    if !logging.enabled {
        log::set_max_level(LevelFilter::Off);
        return Ok(());
    }

    let mut config = ConfigBuilder::new();
    if !logging.timestamp {
        config.set_time_level(LevelFilter::Off);
    }
    if logging.threads {
        config.set_thread_level(LevelFilter::Info);
    } else {
        config.set_thread_level(LevelFilter::Off);
    }

    let color = if logging.color {
        ColorChoice::Auto
    } else {
        ColorChoice::Never
    };
    TermLogger::init(logging.level, config.build(), TerminalMode::Mixed, color)
}

/// Loads the global palette used to name block states in 1.13+ save files.
pub async fn load_registry(
    report: Option<&Path>,
    strategy: &VersionStrategy,
) -> Result<Arc<dyn BlockStateRegistry>, ReplayError> {
    let Some(path) = report else {
        if !strategy.legacy_ids() {
            log::warn!(
                "No block report configured, {} chunks with blocks other than air cannot be saved",
                strategy.release
            );
        }
        return Ok(Arc::new(GlobalPalette::new()));
    };

    let json = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| ReplayError::Io {
            path: path.to_path_buf(),
            source,
        })?;
    let palette = GlobalPalette::from_report(&json)?;
    log::info!("Loaded {} block states from {}", palette.len(), path.display());
    Ok(Arc::new(palette))
}

/// Replays the configured capture file into the output folder.
pub async fn replay(config: &CaptureConfig) -> Result<ReplaySummary, ReplayError> {
    let strategy = VersionStrategy::for_protocol(config.protocol_version)?;
    let registry = load_registry(config.block_report.as_deref(), strategy).await?;
    let file = tokio::fs::File::open(&config.capture_file)
        .await
        .map_err(|source| ReplayError::Io {
            path: config.capture_file.clone(),
            source,
        })?;
    replay_stream(tokio::io::BufReader::new(file), config, registry).await
}

/// Feeds every packet of `reader` through a [`PacketHandler`], then saves what is still loaded.
pub async fn replay_stream<R: AsyncRead + Unpin>(
    reader: R,
    config: &CaptureConfig,
    registry: Arc<dyn BlockStateRegistry>,
) -> Result<ReplaySummary, ReplayError> {
    let time = Instant::now();
    let strategy = VersionStrategy::for_protocol(config.protocol_version)?;
    log::info!(
        "Replaying {} capture (protocol {}) into {}",
        strategy.release,
        config.protocol_version,
        config.output_folder.display()
    );

    let (saver, worker) =
        ChunkSaver::new(&config.output_folder, config.dimension, strategy, registry);
    let worker = tokio::spawn(worker.run());

    let world = Arc::new(World::new(config.dimension));
    let mut handler = PacketHandler::new(world, strategy, saver, config.mark_new_chunks);
    let mut decoder = CaptureDecoder::new(reader);
    let mut truncated = false;

    loop {
        match decoder.get_raw_packet().await {
            Ok(Some(packet)) => handler.handle(&packet),
            Ok(None) => break,
            Err(PacketDecodeError::Io(err)) if err.kind() == std::io::ErrorKind::UnexpectedEof => {
                log::warn!("Capture ends in the middle of a packet");
                truncated = true;
                break;
            }
            Err(err) => {
                log::error!("Stopping replay: {err}");
                truncated = true;
                break;
            }
        }
    }

    let saved = handler.save_all();
    log::debug!("Saved {saved} chunks still loaded at the end of the capture");
    let stats = handler.stats();
    drop(handler);

    let files_written = worker.await?;
    log::info!(
        "Replay finished in {}ms: {} chunks parsed, {} skipped, {} not saved, {} files written",
        time.elapsed().as_millis(),
        stats.chunks_parsed,
        stats.chunks_failed,
        stats.save_failures,
        files_written
    );
    Ok(ReplaySummary {
        stats,
        files_written,
        truncated,
    })
}
