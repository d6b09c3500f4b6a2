//! Command-line front end
//!
//! `record` runs the capture controller against the default microphone and
//! the configured backend. The other subcommands are offline helpers.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

use crate::audio::{
    encode_capture, encode_wav, CapturedAudio, CpalMicrophone, WavError, WavInfo,
    MAX_SAMPLE_RATE,
};
use crate::effects::{CaptureEffectRunner, RunnerConfig};
use crate::error::CaptureError;
use crate::settings::{
    default_settings_path, load_settings, save_settings, AppSettings, SettingsError,
};
use crate::spawn_controller;
use crate::state_machine::Event;
use crate::ui::{Phase, Presenter, TerminalPresenter};
use crate::upload::{GuardedUploader, HttpBackend, TaskContext, UploadError};

#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error(transparent)]
    Settings(#[from] SettingsError),
    #[error(transparent)]
    Upload(#[from] UploadError),
    #[error(transparent)]
    Capture(#[from] CaptureError),
    #[error("WAV error: {0}")]
    Wav(#[from] WavError),
    #[error("{path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to read from stdin: {0}")]
    Stdin(std::io::Error),
    #[error("Raw input must be 32-bit float samples; got {0} bytes")]
    RawLength(usize),
    #[error("Capture controller stopped unexpectedly")]
    ControllerClosed(#[from] mpsc::error::SendError<Event>),
}

#[derive(Debug, Parser)]
#[command(name = "speakup-capture")]
#[command(version, about = "Record a speaking-practice answer and get feedback on it")]
struct Cli {
    /// Backend base URL (overrides settings and SPEAKUP_SERVER_URL)
    #[arg(long, global = true)]
    server: Option<String>,

    /// Settings file (default: platform config dir)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Record answers from the microphone and upload them for analysis
    Record {
        /// Practice level the answer belongs to
        #[arg(long)]
        level: Option<u32>,

        /// Task within the level
        #[arg(long)]
        task_id: Option<u32>,

        /// Prompt text shown to the speaker
        #[arg(long)]
        prompt: Option<String>,

        /// Fetch a generated quick task and answer that instead
        #[arg(long, conflicts_with_all = ["level", "task_id", "prompt"])]
        quick: bool,
    },

    /// Print a generated quick task
    QuickTask,

    /// Encode raw little-endian f32 mono samples as a PCM16 WAV
    Encode {
        /// Raw sample file
        input: PathBuf,

        #[arg(
            short,
            long,
            default_value_t = 44_100,
            value_parser = clap::value_parser!(u32).range(1..=MAX_SAMPLE_RATE as i64)
        )]
        sample_rate: u32,

        #[arg(short, long)]
        output: PathBuf,

        /// Apply the upload acceptance checks (minimum duration and size)
        #[arg(long)]
        strict: bool,
    },

    /// Show the header of a WAV file
    Inspect { path: PathBuf },

    /// Print the effective settings
    Config {
        /// Write them to the settings file
        #[arg(long)]
        write: bool,
    },
}

fn init_logging(verbose: bool) {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"));
    if verbose {
        builder.filter_module("capture_lib", log::LevelFilter::Debug);
    }
    builder.format_timestamp_millis().init();
}

pub fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Failed to start async runtime: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(execute(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{:?}", e);
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

/// Settings file, then environment, then command-line flags.
fn resolve_settings(cli: &Cli) -> Result<(PathBuf, AppSettings), CliError> {
    let path = match &cli.config {
        Some(path) => path.clone(),
        None => default_settings_path()?,
    };
    let mut settings = load_settings(&path);
    settings.apply_env();
    if let Some(server) = &cli.server {
        settings.server_url = server.clone();
    }
    Ok((path, settings))
}

async fn execute(cli: Cli) -> Result<(), CliError> {
    let (settings_path, settings) = resolve_settings(&cli)?;
    log::debug!("Settings loaded from {:?}", settings_path);

    match cli.command {
        Command::Record {
            level,
            task_id,
            prompt,
            quick,
        } => {
            let uploader = Arc::new(uploader(&settings)?);
            let task = if quick {
                let quick_task = uploader.generate_quick_task().await?;
                println!("Finish this sentence: {}", quick_task.sentence_starter);
                if !quick_task.topic_hint.is_empty() {
                    println!("Hint: {}", quick_task.topic_hint);
                }
                quick_task.to_task_context()
            } else {
                TaskContext {
                    level_number: level,
                    task_id,
                    is_quick_task: false,
                    task_prompt: prompt,
                }
            };
            record(settings, uploader, task).await
        }
        Command::QuickTask => {
            let quick_task = uploader(&settings)?.generate_quick_task().await?;
            println!("{}", quick_task.sentence_starter);
            if !quick_task.example_completion.is_empty() {
                println!("Example: {}", quick_task.example_completion);
            }
            if !quick_task.topic_hint.is_empty() {
                println!("Hint: {}", quick_task.topic_hint);
            }
            Ok(())
        }
        Command::Encode {
            input,
            sample_rate,
            output,
            strict,
        } => encode_raw(&input, sample_rate, &output, strict.then(|| settings.limits())),
        Command::Inspect { path } => inspect(&path),
        Command::Config { write } => {
            let json = serde_json::to_string_pretty(&settings)
                .map_err(SettingsError::Serialize)?;
            println!("# {}", settings_path.display());
            println!("{}", json);
            if write {
                save_settings(&settings_path, &settings)?;
                println!("Saved.");
            }
            Ok(())
        }
    }
}

fn uploader(settings: &AppSettings) -> Result<GuardedUploader, CliError> {
    let backend = HttpBackend::new(&settings.server_url, settings.session_cookie.clone())?;
    log::info!("Backend: {}", backend.base_url());
    Ok(GuardedUploader::new(
        Arc::new(backend),
        settings.upload_timeout(),
    ))
}

async fn record(
    settings: AppSettings,
    uploader: Arc<GuardedUploader>,
    task: TaskContext,
) -> Result<(), CliError> {
    match CpalMicrophone::default_device_name() {
        Ok(name) => log::info!("Input device: {}", name),
        Err(e) => log::warn!("No microphone found yet: {}", e),
    }

    let presenter: Arc<dyn Presenter> = Arc::new(TerminalPresenter::new());
    let runner = CaptureEffectRunner::new(
        Arc::new(CpalMicrophone::new()),
        uploader,
        presenter.clone(),
        RunnerConfig::from_settings(&settings),
    );
    let (controller, handle) = spawn_controller(runner, presenter);

    if let Some(prompt) = &task.task_prompt {
        println!("Task: {}", prompt);
    }
    println!("Enter: start/stop   r: reset   q: quit");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await.map_err(CliError::Stdin)? {
        match line.trim() {
            "q" | "quit" => break,
            "r" | "reset" => controller.reset().await?,
            "" => {
                if controller.phase() == Phase::Recording {
                    controller.stop().await?;
                } else {
                    // Ignored by the controller while busy
                    controller.start(task.clone()).await?;
                }
            }
            other => println!("Unknown command: {:?}", other),
        }
    }

    if controller.phase() == Phase::Uploading {
        println!("Quitting with an upload in flight; its result will be lost.");
    }
    controller.shutdown().await?;
    if let Err(e) = handle.await {
        log::error!("State loop task failed: {}", e);
    }
    Ok(())
}

fn decode_raw_f32(bytes: &[u8]) -> Result<Vec<f32>, CliError> {
    if bytes.len() % 4 != 0 {
        return Err(CliError::RawLength(bytes.len()));
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect())
}

fn encode_raw(
    input: &Path,
    sample_rate: u32,
    output: &Path,
    limits: Option<crate::audio::CaptureLimits>,
) -> Result<(), CliError> {
    let bytes = std::fs::read(input).map_err(|source| CliError::Io {
        path: input.to_path_buf(),
        source,
    })?;
    let samples = decode_raw_f32(&bytes)?;

    let wav = match limits {
        Some(limits) => {
            let capture = CapturedAudio {
                blocks: vec![samples],
                sample_rate,
            };
            encode_capture(&capture, &limits)?.bytes
        }
        None => encode_wav(&[samples], sample_rate)?,
    };

    std::fs::write(output, &wav).map_err(|source| CliError::Io {
        path: output.to_path_buf(),
        source,
    })?;
    println!("Wrote {} bytes to {}", wav.len(), output.display());
    Ok(())
}

fn inspect(path: &Path) -> Result<(), CliError> {
    let bytes = std::fs::read(path).map_err(|source| CliError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let info = WavInfo::parse(&bytes)?;
    println!("Channels:     {}", info.channels);
    println!("Sample rate:  {} Hz", info.sample_rate);
    println!("Bit depth:    {}", info.bits_per_sample);
    println!("Data size:    {} bytes", info.data_size);
    println!("Samples:      {}", info.sample_count());
    println!("Duration:     {:.2}s", info.duration_secs());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn record_flags_parse() {
        let cli = Cli::try_parse_from([
            "speakup-capture",
            "--server",
            "http://127.0.0.1:9000",
            "record",
            "--level",
            "3",
            "--task-id",
            "2",
        ])
        .unwrap();
        assert_eq!(cli.server.as_deref(), Some("http://127.0.0.1:9000"));
        match cli.command {
            Command::Record {
                level,
                task_id,
                quick,
                ..
            } => {
                assert_eq!(level, Some(3));
                assert_eq!(task_id, Some(2));
                assert!(!quick);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn quick_conflicts_with_level() {
        let parsed = Cli::try_parse_from(["speakup-capture", "record", "--quick", "--level", "1"]);
        assert!(parsed.is_err());
    }

    #[test]
    fn raw_samples_must_be_whole_floats() {
        assert!(matches!(
            decode_raw_f32(&[0, 0, 128]),
            Err(CliError::RawLength(3))
        ));
        let mut bytes = 0.5f32.to_le_bytes().to_vec();
        bytes.extend_from_slice(&(-1.0f32).to_le_bytes());
        assert_eq!(decode_raw_f32(&bytes).unwrap(), vec![0.5, -1.0]);
    }

    #[test]
    fn encode_then_inspect_file() {
        let tmp = tempfile::tempdir().unwrap();
        let raw = tmp.path().join("tone.f32");
        let wav = tmp.path().join("tone.wav");
        let samples: Vec<u8> = (0..16_000)
            .flat_map(|i| ((i as f32 / 50.0).sin() * 0.5).to_le_bytes())
            .collect();
        std::fs::write(&raw, samples).unwrap();

        encode_raw(&raw, 16_000, &wav, Some(Default::default())).unwrap();

        let bytes = std::fs::read(&wav).unwrap();
        assert_eq!(bytes.len(), 44 + 32_000);
        let info = WavInfo::parse(&bytes).unwrap();
        assert_eq!(info.sample_rate, 16_000);
        assert!((info.duration_secs() - 1.0).abs() < 1e-9);
        inspect(&wav).unwrap();
    }

    #[test]
    fn strict_encode_rejects_short_input() {
        let tmp = tempfile::tempdir().unwrap();
        let raw = tmp.path().join("short.f32");
        std::fs::write(&raw, vec![0u8; 4 * 100]).unwrap();

        let err = encode_raw(&raw, 16_000, &tmp.path().join("out.wav"), Some(Default::default()))
            .unwrap_err();
        assert!(matches!(
            err,
            CliError::Capture(CaptureError::TooShortCapture { .. })
        ));
    }

    #[test]
    fn sample_rate_flag_is_range_checked() {
        let too_fast = Cli::try_parse_from([
            "speakup-capture",
            "encode",
            "in.f32",
            "--output",
            "out.wav",
            "--sample-rate",
            "3000000000",
        ]);
        assert!(too_fast.is_err());

        let zero =
            Cli::try_parse_from(["speakup-capture", "encode", "in.f32", "-o", "out.wav", "-s", "0"]);
        assert!(zero.is_err());
    }

    #[test]
    fn lenient_encode_still_rejects_bad_rate() {
        let tmp = tempfile::tempdir().unwrap();
        let raw = tmp.path().join("tone.f32");
        std::fs::write(&raw, vec![0u8; 16]).unwrap();

        let err = encode_raw(&raw, 3_000_000_000, &tmp.path().join("out.wav"), None).unwrap_err();
        assert!(matches!(
            err,
            CliError::Wav(WavError::SampleRateOutOfRange(3_000_000_000))
        ));
    }
}
