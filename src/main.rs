use std::path::PathBuf;
use std::process::ExitCode;
use std::rc::Rc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use xiaodou::voice::{
    AudioCapture, AudioPlayback, SpeechListener, TextToSpeech, VoiceSpeaker, calculate_energy,
    list_devices,
};
use xiaodou::{Assistant, ChatClient, Config, HistoryManager};

/// Xiaodou - voice-driven conversational assistant
#[derive(Parser)]
#[command(name = "xiaodou", version, about)]
struct Cli {
    /// Path to a TOML config file
    #[arg(short, long, env = "XIAODOU_CONFIG")]
    config: Option<PathBuf>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
#[allow(clippy::enum_variant_names)]
enum Command {
    /// List audio input and output devices
    Devices,
    /// Test microphone input
    TestMic {
        /// Duration in seconds
        #[arg(short, long, default_value = "5")]
        duration: u64,
    },
    /// Test speaker output
    TestSpeaker,
    /// Test TTS output
    TestTts {
        /// Text to speak
        #[arg(default_value = "你好，我是小豆。")]
        text: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "info",
        1 => "info,xiaodou=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

#[allow(clippy::future_not_send)]
async fn run(cli: Cli) -> anyhow::Result<()> {
    let config_path = cli.config.as_deref();

    if let Some(cmd) = cli.command {
        return match cmd {
            Command::Devices => cmd_devices(),
            Command::TestMic { duration } => test_mic(config_path, duration).await,
            Command::TestSpeaker => test_speaker(config_path),
            Command::TestTts { text } => test_tts(config_path, &text).await,
        };
    }

    let config = Config::load(config_path)?;
    tracing::debug!(?config, "loaded configuration");

    let playback = Rc::new(AudioPlayback::new(config.audio.output_device.as_deref())?);
    let listener = SpeechListener::new(&config, Rc::clone(&playback))?;
    let speaker = VoiceSpeaker::new(&config, playback)?;
    let generator = ChatClient::new(&config.chat)?;
    let history = HistoryManager::new(config.history.clone());

    let mut assistant = Assistant::new(listener, generator, speaker, history)
        .with_fallback_phrase(config.fallback_phrase.clone());

    tracing::info!(wake_word = %config.wake.word, "xiaodou ready");

    assistant.run().await?;

    Ok(())
}

/// List audio devices
fn cmd_devices() -> anyhow::Result<()> {
    let devices = list_devices()?;

    println!("Audio devices:");
    println!("===== Input =====");
    for (idx, name) in devices.inputs.iter().enumerate() {
        println!("{idx}: {name}");
    }
    println!("===== Output =====");
    for (idx, name) in devices.outputs.iter().enumerate() {
        println!("{idx}: {name}");
    }

    Ok(())
}

/// Test microphone input
async fn test_mic(config_path: Option<&std::path::Path>, duration: u64) -> anyhow::Result<()> {
    let config = Config::load(config_path)?;

    println!("Testing microphone for {duration} seconds...");
    println!("Speak into your microphone!\n");

    let mut capture = AudioCapture::new(config.audio.input_device.as_deref())?;
    capture.start()?;

    println!("Sample rate: {} Hz", capture.sample_rate());
    println!("---");

    for i in 0..duration {
        tokio::time::sleep(Duration::from_secs(1)).await;

        let samples = capture.take_buffer();
        let energy = calculate_energy(&samples);
        let peak = samples.iter().map(|s| s.abs()).fold(0.0f32, f32::max);

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let meter_len = (energy * 100.0).min(50.0) as usize;
        let meter: String = "█".repeat(meter_len) + &" ".repeat(50 - meter_len);

        println!(
            "[{:2}s] RMS: {:.4} | Peak: {:.4} | [{}]",
            i + 1,
            energy,
            peak,
            meter
        );
    }

    capture.stop();

    println!("\n---");
    println!("If you saw movement in the meter, your mic is working!");
    println!("If RMS stayed near 0, run `xiaodou devices` and set XIAODOU_INPUT_DEVICE.");

    Ok(())
}

/// Test speaker output with a sine wave
fn test_speaker(config_path: Option<&std::path::Path>) -> anyhow::Result<()> {
    let config = Config::load(config_path)?;

    println!("Testing speaker output...");
    println!("You should hear a 440Hz tone for 2 seconds\n");

    let playback = AudioPlayback::new(config.audio.output_device.as_deref())?;

    let sample_rate = 24000_u32;
    let frequency = 440.0_f32;
    let num_samples = sample_rate as usize * 2;

    #[allow(clippy::cast_precision_loss)]
    let samples: Vec<f32> = (0..num_samples)
        .map(|i| {
            let t = i as f32 / sample_rate as f32;
            (2.0 * std::f32::consts::PI * frequency * t).sin() * 0.3
        })
        .collect();

    println!("Playing {} samples at {} Hz...", samples.len(), sample_rate);
    playback.play(samples, sample_rate)?;

    println!("\n---");
    println!("If you heard the tone, your speakers are working!");
    println!("If not, run `xiaodou devices` and set XIAODOU_OUTPUT_DEVICE.");

    Ok(())
}

/// Test TTS output
async fn test_tts(config_path: Option<&std::path::Path>, text: &str) -> anyhow::Result<()> {
    println!("Testing TTS with text: \"{text}\"\n");

    let config = Config::load(config_path)?;
    let tts = TextToSpeech::new(&config.speech)?;

    println!("Synthesizing speech...");
    let mp3_data = tts.synthesize(text).await?;
    println!("Got {} bytes of audio data", mp3_data.len());

    println!("Playing audio...");
    let playback = AudioPlayback::new(config.audio.output_device.as_deref())?;
    playback.play_mp3(&mp3_data)?;

    println!("\n---");
    println!("If you heard the speech, TTS is working!");

    Ok(())
}
