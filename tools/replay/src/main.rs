use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use shadow_runner_core::{geodesy::area, pursuit::mode::GameMode, GameConfig};
use std::path::PathBuf;

mod replay;
mod track;

use replay::ReplayOptions;

#[derive(Parser, Debug)]
#[command(
    name = "shadow-runner-replay",
    author,
    version,
    about = "Replay a GeoJSON track through a shadow-runner session",
    long_about = "Walks a player along a recorded or synthetic LineString at a constant speed, \
                  ticking the pursuit at a fixed interval, and prints the run outcome as JSON.\n\n\
                  With --toward-extraction the track only supplies the starting point and the \
                  player heads straight for the generated extraction point instead."
)]
struct Args {
    /// GeoJSON file holding a LineString (bare, Feature, or FeatureCollection)
    #[arg(short, long)]
    track: PathBuf,

    #[arg(short, long, value_enum, default_value_t = Mode::Extraction)]
    mode: Mode,

    /// Extraction distance in kilometers
    #[arg(long, default_value_t = 2.0)]
    target_km: f64,

    /// Player speed along the track
    #[arg(long, default_value_t = 10.0)]
    speed_kph: f64,

    /// Simulated time between pursuit ticks
    #[arg(long, default_value_t = 100)]
    tick_ms: u64,

    /// Reported accuracy of every synthetic fix, in meters
    #[arg(long, default_value_t = 5.0)]
    accuracy_m: f64,

    /// Seed for mission generation (random when omitted)
    #[arg(long)]
    seed: Option<u64>,

    /// Ignore the track's shape and run straight for the extraction point
    #[arg(long)]
    toward_extraction: bool,

    /// Give up after this much simulated time
    #[arg(long, default_value_t = 180.0)]
    max_minutes: f64,

    /// JSON file with game tunables; unspecified fields keep their defaults
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Also write the explored area to this GeoJSON file
    #[arg(long)]
    explored_output: Option<PathBuf>,

    /// Verbose output (show debug messages)
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum Mode {
    Extraction,
    Survival,
}

impl From<Mode> for GameMode {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Extraction => GameMode::Extraction,
            Mode::Survival => GameMode::Survival,
        }
    }
}

fn load_config(path: Option<&PathBuf>) -> Result<GameConfig> {
    let Some(path) = path else {
        return Ok(GameConfig::default());
    };

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config: {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Invalid config: {}", path.display()))
}

fn main() -> Result<()> {
    let args = Args::parse();

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(if args.verbose { "debug" } else { "info" }),
    )
    .format_timestamp(None)
    .init();

    if !(args.speed_kph >= 0.0) || !args.speed_kph.is_finite() {
        bail!("--speed-kph must be a non-negative number");
    }
    if !(args.target_km > 0.0) || !args.target_km.is_finite() {
        bail!("--target-km must be a positive number");
    }

    let mut config = load_config(args.config.as_ref())?;
    if args.seed.is_some() {
        config.seed = args.seed;
    }

    let track = track::read_track(&args.track)?;
    log::info!(
        "Track: {} ({:.0} m)",
        args.track.display(),
        track.length_m()
    );

    let options = ReplayOptions {
        mode: args.mode.into(),
        target_km: args.target_km,
        speed_kph: args.speed_kph,
        tick_ms: args.tick_ms,
        accuracy_m: args.accuracy_m,
        toward_extraction: args.toward_extraction,
        max_minutes: args.max_minutes,
    };

    let replay = replay::run(config, &track, &options)?;

    if let Some(path) = &args.explored_output {
        match replay.session.explored_area() {
            Some(explored) => {
                std::fs::write(path, area::to_geojson(explored))
                    .with_context(|| format!("Failed to write {}", path.display()))?;
                log::info!("Explored area written to {}", path.display());
            }
            None => log::warn!("Nothing explored, skipping {}", path.display()),
        }
    }

    println!("{}", serde_json::to_string_pretty(&replay.report)?);
    Ok(())
}
