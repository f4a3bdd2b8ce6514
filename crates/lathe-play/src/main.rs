//! Headless playback tool for the Lathe engine
//!
//! Decodes a file, pushes it through the real audio stack and prints a
//! transport readout. Useful for checking devices and the preview
//! chain without the editor UI.
//!
//! ## Usage
//!
//! ```text
//! lathe-play <file> [--gain <db>] [--loop <start_sec> <end_sec>]
//! ```
//!
//! Without `--loop` the tool exits when playback reaches the end;
//! with it, playback cycles until interrupted.

use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};

use lathe_engine::audio::{
    get_available_output_devices, start_audio_system, AudioConfig, CommandSender,
};
use lathe_engine::config::{default_config_path, load_config, PreviewConfig};
use lathe_engine::effect::{GainParams, StageKind};
use lathe_engine::engine::EngineCommand;
use lathe_engine::types::{gain_to_db, PlayState, PreviewMode};
use lathe_media::MediaLoader;

struct Args {
    file: PathBuf,
    gain_db: Option<f32>,
    loop_seconds: Option<(f64, f64)>,
}

fn parse_args() -> Result<Args> {
    let mut file = None;
    let mut gain_db = None;
    let mut loop_seconds = None;

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--gain" => {
                let value = args.next().context("--gain needs a dB value")?;
                gain_db = Some(value.parse::<f32>().context("--gain value must be a number")?);
            }
            "--loop" => {
                let start = args.next().context("--loop needs <start_sec> <end_sec>")?;
                let end = args.next().context("--loop needs <start_sec> <end_sec>")?;
                loop_seconds = Some((
                    start.parse::<f64>().context("--loop start must be seconds")?,
                    end.parse::<f64>().context("--loop end must be seconds")?,
                ));
            }
            _ if arg.starts_with("--") => bail!("Unknown flag: {}", arg),
            _ => file = Some(PathBuf::from(arg)),
        }
    }

    Ok(Args {
        file: file.context("Usage: lathe-play <file> [--gain <db>] [--loop <start> <end>]")?,
        gain_db,
        loop_seconds,
    })
}

fn send(commands: &mut CommandSender, command: EngineCommand) -> Result<()> {
    commands
        .send(command)
        .map_err(|_| anyhow!("Engine command queue full"))
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    log::info!("lathe-play starting up");

    let args = parse_args()?;

    let audio_config: AudioConfig = load_config(&default_config_path("audio.yaml"));
    let preview_config: PreviewConfig = load_config(&default_config_path("preview.yaml"));

    println!("Output devices:");
    for device in get_available_output_devices() {
        println!("  {}", device);
    }

    let system = start_audio_system(&audio_config).context("Failed to start audio")?;
    println!(
        "Audio running: {} Hz, {} frames per block ({:.1} ms)",
        system.sample_rate, system.buffer_size, system.latency_ms
    );

    let loader = MediaLoader::new(system.sample_rate);
    loader.load(args.file.clone()).map_err(anyhow::Error::msg)?;

    let receiver = loader.result_receiver();
    let loaded = {
        let rx = receiver.lock().map_err(|_| anyhow!("Loader channel poisoned"))?;
        let result = rx.recv().context("Loader thread died")?;
        result.result.map_err(anyhow::Error::msg)?
    };
    let depth = match loaded.bits_per_sample {
        Some(bits) => format!("{} bit", bits),
        None => "lossy".to_string(),
    };
    println!(
        "Loaded {:?}: {} frames, {} ch, {} (file rate {} Hz)",
        args.file, loaded.frames, loaded.channels, depth, loaded.file_sample_rate
    );

    let mut commands = system.commands;
    send(&mut commands, EngineCommand::LoadSource(Box::new(loaded.source)))?;
    send(&mut commands, EngineCommand::SetStageOrder(preview_config.order()))?;
    system.engine.params.dc_block.store(preview_config.dc_params());

    if let Some(db) = args.gain_db {
        system.engine.params.gain.store(GainParams { gain_db: db });
        system.engine.preview.set_stage_enabled(StageKind::Gain, true);
        send(&mut commands, EngineCommand::SetPreviewMode(PreviewMode::RealtimeDsp))?;
        println!("Gain preview enabled: {:+.1} dB", db);
    }

    if let Some((start_s, end_s)) = args.loop_seconds {
        let rate = system.sample_rate as f64;
        send(
            &mut commands,
            EngineCommand::SetLoopPoints {
                start: (start_s * rate) as u64,
                end: (end_s * rate) as u64,
            },
        )?;
        send(&mut commands, EngineCommand::SetLooping(true))?;
        println!("Looping {:.2}s .. {:.2}s", start_s, end_s);
    }

    send(&mut commands, EngineCommand::Play)?;

    let transport = &system.engine.transport;
    let levels = &system.engine.levels;
    loop {
        std::thread::sleep(Duration::from_millis(250));

        let state = transport.play_state();
        let peak = levels.peak(0).max(levels.peak(1));
        print!(
            "\r  {:>8.2}s  {:<7}  peak {:>6.1} dB   ",
            transport.position_seconds(),
            match state {
                PlayState::Playing => "playing",
                PlayState::Paused => "paused",
                PlayState::Stopped => "stopped",
            },
            gain_to_db(peak).max(-90.0)
        );
        std::io::stdout().flush().ok();

        // The transport only stops on its own when it runs off the end.
        if state == PlayState::Stopped && transport.position() == transport.total_frames() {
            break;
        }
    }
    println!();
    println!("Done");

    Ok(())
}
