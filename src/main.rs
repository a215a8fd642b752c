use std::fs::{self, File};
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::info;
use pollster::FutureExt as _;

mod config;
mod decoder;
mod encoder;
mod export;
mod frames;

use config::CliOverrides;
use decoder::Decoder;
use encoder::{GifWriter, LoopCount};
use export::{ExportController, ExportJob, ExportOutcome};

#[derive(Parser)]
#[command(name = "pixely", version, about = "Palette based GIF export for square pixel art animations")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Encode square frames into a looping GIF
    Encode {
        /// Frame images in playback order
        #[arg(required = true)]
        frames: Vec<PathBuf>,

        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Frames per second, clamped to 1..=24; anything that is not a number means 5
        #[arg(long)]
        fps: Option<String>,

        /// Integer nearest neighbour upscale
        #[arg(long)]
        scale: Option<u32>,

        /// Config file, defaults to ./pixely.toml when present
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Print the structure of a GIF file
    Inspect { gif: PathBuf },
}

fn main() -> Result<ExitCode> {
    env_logger::init();

    match Cli::parse().command {
        Command::Encode {
            frames,
            output,
            fps,
            scale,
            config,
        } => encode(frames, CliOverrides { fps, scale, output }, config),
        Command::Inspect { gif } => inspect(gif),
    }
}

fn encode(paths: Vec<PathBuf>, overrides: CliOverrides, config_path: Option<PathBuf>) -> Result<ExitCode> {
    let mut config = config::load_config(config_path.as_deref())?;
    config::merge_cli_overrides(&mut config, &overrides)?;

    let loaded = frames::load_frames(&paths, config.gif.scale)?;
    let timing = config.timing();
    info!(
        "{} frames of {}x{}, {} ms per frame",
        loaded.frames.len(),
        loaded.size,
        loaded.size,
        timing.delay_ms()
    );

    let controller = ExportController::new(GifWriter::new());
    let job = ExportJob {
        frames: loaded.frames,
        size: loaded.size,
        timing,
    };

    match controller.export(job).block_on() {
        ExportOutcome::Busy => {
            eprintln!("An export is already running.");
            Ok(ExitCode::FAILURE)
        }
        ExportOutcome::Finished { status, payload: Some(payload) } => {
            let output = &config.gif.output;
            fs::write(output, &payload.bytes).with_context(|| format!("failed to write {}", output.display()))?;
            info!("wrote {} bytes of {} to {}", payload.bytes.len(), payload.mime_type, output.display());

            println!("{status}");
            Ok(ExitCode::SUCCESS)
        }
        ExportOutcome::Finished { status, payload: None } => {
            eprintln!("{status}");
            Ok(ExitCode::FAILURE)
        }
    }
}

fn inspect(path: PathBuf) -> Result<ExitCode> {
    let mut file = File::open(&path).with_context(|| format!("failed to open {}", path.display()))?;

    let mut decoder = Decoder::new(&mut file);
    decoder
        .parse()
        .with_context(|| format!("failed to parse {}", path.display()))?;

    let (width, height) = decoder.screen_size();
    println!("{}: {width}x{height}, {} frames", path.display(), decoder.frames().len());

    match decoder.loop_count() {
        Some(LoopCount::Infinite) => println!("loops forever"),
        Some(LoopCount::Number(count)) => println!("loops {count} times"),
        None => println!("plays once"),
    }

    for comment in decoder.comments() {
        println!("comment: {comment}");
    }

    for (i, frame) in decoder.frames().iter().enumerate() {
        let transparent_pixels = frame.to_rgba().chunks_exact(4).filter(|pixel| pixel[3] == 0).count();

        println!(
            "frame {i}: {}x{} at ({}, {}), delay {} cs, disposal {:?}, {} {} colors, transparent index {:?} ({transparent_pixels} pixels)",
            frame.width,
            frame.height,
            frame.left,
            frame.top,
            frame.delay_cs,
            frame.disposal,
            if frame.has_local_color_table { "local" } else { "global" },
            frame.palette.len() / 3,
            frame.transparent_index,
        );
    }

    Ok(ExitCode::SUCCESS)
}
