use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use cpal::traits::{DeviceTrait, HostTrait};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use voice_stream::capture::{AudioCapture, CaptureSource};
use voice_stream::config::Config;
use voice_stream::constants::pcm::{CONTAINER_HEADER_LEN, CONTAINER_MAGIC};
use voice_stream::display::ChatLog;
use voice_stream::error::CaptureError;
use voice_stream::output::CpalOutput;
use voice_stream::pcm;
use voice_stream::playback::PlaybackScheduler;
use voice_stream::session::Session;
use voice_stream::transport::{TransportEvent, TransportState};

#[derive(Parser)]
#[command(name = "voice-stream")]
#[command(about = "Talk to a voice agent over a WebSocket", long_about = None)]
struct Cli {
    /// Server URL, overriding server.url from settings.yaml
    #[arg(long)]
    url: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// List audio input and output devices
    Devices,
    /// Capture microphone frames to a raw PCM16 file without a server
    Record {
        /// Name for this recording
        #[arg(default_value = "mic-check")]
        name: String,
        /// Duration to record in seconds
        #[arg(short, long, default_value = "5")]
        duration: u64,
    },
    /// Play a raw PCM16 or WAV file through the playback scheduler
    Play {
        /// File containing 16-bit little-endian mono PCM at the playback rate
        file: String,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing();

    match cli.command {
        Some(Commands::Devices) => list_devices(),
        Some(Commands::Record { name, duration }) => record_command(&name, duration).await,
        Some(Commands::Play { file }) => play_command(&file).await,
        None => run_app(cli.url).await,
    }
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "voice_stream=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn load_config(url_override: Option<String>) -> Result<Config> {
    let mut config = Config::load_or_create()?;
    if let Some(url) = url_override {
        config.server.url = url;
        config.validate()?;
    }
    Ok(config)
}

fn print_help() {
    println!("Commands:");
    println!("  <Enter> or r  start / stop recording");
    println!("  a             enable audio output");
    println!("  c             clear the chat");
    println!("  q             quit");
    println!();
}

async fn run_app(url_override: Option<String>) -> Result<()> {
    println!("Voice Stream - voice agent client");

    let config = load_config(url_override)?;
    println!("Server: {}", config.server.url);
    println!();

    let capture = AudioCapture::new(config.capture.clone());
    let scheduler = PlaybackScheduler::new(
        config.playback.sample_rate,
        config.playback.lookahead_secs(),
        CpalOutput::factory(config.playback.device.clone()),
    );
    let mut session = Session::new(config.server.url.clone(), capture, scheduler, ChatLog::console());

    print_help();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context("Failed to read stdin")? else {
                    break; // EOF
                };
                match line.trim() {
                    "" | "r" => match session.toggle_recording() {
                        Ok(true) => println!("🔴 Recording - speak now (Enter to stop)"),
                        Ok(false) => println!("⏹️  Recording stopped"),
                        Err(CaptureError::PermissionDenied(reason)) => {
                            eprintln!("✗ Microphone access denied: {}", reason);
                        }
                        Err(e) => eprintln!("✗ Failed to start recording: {}", e),
                    },
                    "a" => match session.enable_audio() {
                        Ok(()) => println!("🔊 Audio enabled"),
                        Err(e) => eprintln!("✗ Failed to enable audio: {}", e),
                    },
                    "c" => session.clear_chat(),
                    "q" => break,
                    other => {
                        println!("Unknown command: {:?}", other);
                        print_help();
                    }
                }
            }
            Some(event) = session.next_event() => {
                match &event {
                    TransportEvent::StateChanged(TransportState::Open) => println!("✅ Connected"),
                    TransportEvent::StateChanged(TransportState::Closed) if session.is_recording() => {
                        println!("❌ Connection closed - press Enter to reconnect");
                    }
                    _ => {}
                }
                session.handle_event(event);
            }
        }
    }

    println!("Quitting...");
    session.stop_recording();

    Ok(())
}

fn list_devices() -> Result<()> {
    let host = cpal::default_host();

    println!("Input devices:");
    for device in host.input_devices().context("Failed to enumerate input devices")? {
        println!("  {}", device.name().unwrap_or_else(|_| "<unknown>".to_string()));
        if let Ok(configs) = device.supported_input_configs() {
            for (i, config) in configs.enumerate() {
                println!("    {}: {:?}", i, config);
            }
        }
    }

    println!();
    println!("Output devices:");
    for device in host.output_devices().context("Failed to enumerate output devices")? {
        println!("  {}", device.name().unwrap_or_else(|_| "<unknown>".to_string()));
        if let Ok(configs) = device.supported_output_configs() {
            for (i, config) in configs.enumerate() {
                println!("    {}: {:?}", i, config);
            }
        }
    }

    Ok(())
}

async fn record_command(name: &str, duration: u64) -> Result<()> {
    let config = Config::load_or_create()?;

    let recorded: Arc<Mutex<Vec<u8>>> = Arc::new(Mutex::new(Vec::new()));
    let frames = Arc::new(Mutex::new(0usize));

    let mut capture = AudioCapture::new(config.capture.clone());
    let sink = Arc::clone(&recorded);
    let counter = Arc::clone(&frames);
    capture
        .start(Box::new(move |chunk| {
            if let Ok(mut buf) = sink.lock() {
                buf.extend_from_slice(&chunk);
            }
            if let Ok(mut count) = counter.lock() {
                *count += 1;
            }
        }))
        .context("Failed to start microphone")?;

    println!("🔴 RECORDING for {}s - speak now!", duration);
    tokio::time::sleep(Duration::from_secs(duration)).await;
    capture.stop();

    let audio = recorded
        .lock()
        .map(|buf| buf.clone())
        .map_err(|_| anyhow::anyhow!("Recording buffer poisoned"))?;
    let frame_count = frames.lock().map(|c| *c).unwrap_or(0);

    let out_dir = Config::config_dir()?.join("recordings");
    std::fs::create_dir_all(&out_dir)?;
    let audio_file = out_dir.join(format!("{}.pcm", name));
    let meta_file = out_dir.join(format!("{}.txt", name));

    std::fs::write(&audio_file, &audio)?;
    std::fs::write(
        &meta_file,
        format!(
            "frames: {}\nsamples: {}\nduration: {:.2}s\nsample_rate: {}\nchannels: 1\nformat: s16le\n",
            frame_count,
            audio.len() / 2,
            pcm::duration_secs(audio.len() / 2, config.capture.sample_rate),
            config.capture.sample_rate
        ),
    )?;

    println!("✓ Captured {} frames", frame_count);
    println!("💾 Saved to: {}", audio_file.display());

    Ok(())
}

async fn play_command(file: &str) -> Result<()> {
    let config = Config::load_or_create()?;
    let bytes = std::fs::read(Path::new(file))
        .with_context(|| format!("Failed to read {}", file))?;

    let mut scheduler = PlaybackScheduler::new(
        config.playback.sample_rate,
        config.playback.lookahead_secs(),
        CpalOutput::factory(config.playback.device.clone()),
    );
    scheduler.enable_audio()?;

    // 100ms chunks, like a streaming synthesizer; the header travels with the first one
    let chunk_bytes = (config.playback.sample_rate as usize / 10) * 2;
    let header_len = if bytes.len() > CONTAINER_HEADER_LEN && bytes.starts_with(CONTAINER_MAGIC) {
        CONTAINER_HEADER_LEN
    } else {
        0
    };
    let first_end = (header_len + chunk_bytes).min(bytes.len());
    let pieces = std::iter::once(&bytes[..first_end]).chain(bytes[first_end..].chunks(chunk_bytes));

    let mut scheduled = 0;
    for piece in pieces {
        match scheduler.enqueue(&pcm::encode_base64_chunk(piece)) {
            Ok(_) => scheduled += 1,
            Err(e) => eprintln!("⚠️  Skipping chunk: {}", e),
        }
    }

    let remaining = scheduler.buffered_duration();
    println!("▶️  Scheduled {} chunks ({:.2}s)", scheduled, remaining);
    tokio::time::sleep(Duration::from_secs_f64(remaining + 0.25)).await;

    Ok(())
}
