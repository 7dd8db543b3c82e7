//! voice_mp3 - command line front end
//!
//! Converts a recorded WebM/Opus voice message into an MP3 file.
//! Usage: voice_mp3 <input.webm> [output.mp3]

use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use voice_mp3::{
    AssembledAudio, AudioConversionError, CompressedAudioInput, Config, VoiceConverter,
};

#[derive(Error, Debug)]
enum CliError {
    #[error("Missing required argument: {0}")]
    MissingArgument(&'static str),
    #[error("Failed to access {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Conversion failed ({stage} stage): {0}", stage = .0.stage())]
    Conversion(#[from] AudioConversionError),
}

/// Input and output paths from the command line
fn parse_args(args: &[String]) -> Result<(PathBuf, PathBuf), CliError> {
    let input = args
        .get(1)
        .map(PathBuf::from)
        .ok_or(CliError::MissingArgument("input file"))?;
    let output = args
        .get(2)
        .map(PathBuf::from)
        .unwrap_or_else(|| input.with_extension("mp3"));
    Ok((input, output))
}

/// Declared media type for an input file, left empty when the extension says nothing
fn declared_media_type(path: &Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()) {
        Some("webm") => "audio/webm;codecs=opus",
        _ => "",
    }
}

/// Read a recording, convert it and write the MP3 next to it
async fn convert_file(
    converter: &VoiceConverter,
    input_path: &Path,
    output_path: &Path,
) -> Result<AssembledAudio, CliError> {
    let bytes = tokio::fs::read(input_path).await.map_err(|source| CliError::Io {
        path: input_path.to_path_buf(),
        source,
    })?;

    let media_type = declared_media_type(input_path);
    let output = converter
        .convert(CompressedAudioInput::new(bytes, media_type))
        .await?;

    tokio::fs::write(output_path, output.bytes())
        .await
        .map_err(|source| CliError::Io {
            path: output_path.to_path_buf(),
            source,
        })?;

    Ok(output)
}

#[tokio::main]
async fn main() {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "info,voice_mp3=debug".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args: Vec<String> = std::env::args().collect();
    let (input_path, output_path) = match parse_args(&args) {
        Ok(paths) => paths,
        Err(e) => {
            error!("{}", e);
            error!("Usage: voice_mp3 <input.webm> [output.mp3]");
            std::process::exit(1);
        }
    };

    // Load configuration
    let config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };
    info!(
        "Channel mode: {}, max duration: {:?}",
        config.channel_mode.as_str(),
        config.max_duration
    );

    let converter = VoiceConverter::new(config);
    let output = match convert_file(&converter, &input_path, &output_path).await {
        Ok(o) => o,
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    };

    info!(
        "Wrote {} bytes of {} to {:?}",
        output.len(),
        output.media_type(),
        output_path
    );
}
