//! trackline CLI: module info, WAV export and live playback.
//!
//! Usage:
//!   tl-cli info path/to/file.xm
//!   tl-cli render path/to/file.mod -o out.wav [--rate 44100] [--seconds 60]
//!   tl-cli play path/to/file.mod [--config player.yaml]

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tl_audio::{AudioOutput, CpalOutput};
use tl_player::{ModulePlayer, PlaybackPosition, Player, PlayerConfig, PlayerObserver};

#[derive(Parser)]
#[command(name = "tl-cli", version, about = "Tracker module player")]
struct Cli {
    /// YAML file with player configuration and render settings
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print module information
    Info { file: PathBuf },
    /// Render to a 16-bit stereo WAV file
    Render {
        file: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
        /// Output sample rate (defaults to the configured rate)
        #[arg(long)]
        rate: Option<u32>,
        /// Stop after this many seconds
        #[arg(long, default_value_t = 600.0)]
        seconds: f64,
        /// Extra passes through the song (-1 loops until --seconds)
        #[arg(long)]
        repeats: Option<i32>,
    },
    /// Play on the default audio device
    Play { file: PathBuf },
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("reading config {}", path.display()))?;
            serde_yaml::from_str(&text).with_context(|| format!("parsing config {}", path.display()))?
        }
        None => PlayerConfig::default(),
    };

    match cli.command {
        Command::Info { file } => info(&file, &config),
        Command::Render {
            file,
            output,
            rate,
            seconds,
            repeats,
        } => render(&file, &output, &config, rate, seconds, repeats),
        Command::Play { file } => play(&file, config),
    }
}

fn read_module(path: &Path) -> Result<Vec<u8>> {
    fs::read(path).with_context(|| format!("reading {}", path.display()))
}

fn info(path: &Path, config: &PlayerConfig) -> Result<()> {
    let mut player = ModulePlayer::with_settings(config.sample_rate, config.render.clone());
    player
        .load(&read_module(path)?)
        .with_context(|| format!("loading {}", path.display()))?;
    let Some(info) = player.module_info() else {
        bail!("module did not load");
    };

    println!("Title:       {}", info.title);
    if !info.artist.is_empty() {
        println!("Artist:      {}", info.artist);
    }
    println!("Type:        {} ({})", info.type_long, info.type_name);
    if !info.tracker.is_empty() {
        println!("Tracker:     {}", info.tracker);
    }
    println!("Duration:    {:.2}s", info.duration);
    println!("Channels:    {}", info.num_channels);
    println!("Patterns:    {}", info.num_patterns);
    println!("Orders:      {}", info.num_orders);
    println!("Instruments: {}", info.num_instruments);
    println!("Samples:     {}", info.num_samples);
    println!("Subsongs:    {}", info.num_subsongs);

    for (i, name) in player.sample_names().iter().enumerate() {
        if !name.trim().is_empty() {
            println!("  {:02}: {}", i + 1, name);
        }
    }
    let warnings = player.metadata("warnings");
    if !warnings.is_empty() {
        println!("Warnings:\n{}", warnings);
    }
    println!();

    if let Some(module) = player.module() {
        print!("{}", tl_ir::analyze(module));
    }
    Ok(())
}

fn render(
    path: &Path,
    output: &Path,
    config: &PlayerConfig,
    rate: Option<u32>,
    seconds: f64,
    repeats: Option<i32>,
) -> Result<()> {
    let sample_rate = rate.unwrap_or(config.sample_rate);
    let mut player = ModulePlayer::with_settings(sample_rate, config.render.clone());
    player
        .load(&read_module(path)?)
        .with_context(|| format!("loading {}", path.display()))?;
    if let Some(repeats) = repeats {
        player.set_control("play.repeats", &repeats.to_string())?;
    }

    let max_frames = (seconds.max(0.0) * sample_rate as f64) as usize;
    let mut samples = Vec::new();
    let mut block = vec![0.0f32; config.block_frames.max(1) * 2];
    log::info!("rendering {} at {} Hz", path.display(), sample_rate);
    while samples.len() / 2 < max_frames {
        let wanted = (max_frames - samples.len() / 2).min(block.len() / 2);
        let produced = player.render(sample_rate, &mut block[..wanted * 2])?;
        samples.extend_from_slice(&block[..produced * 2]);
        if produced < wanted {
            break;
        }
    }
    if let Some(fault) = player.take_fault() {
        log::warn!("{}", fault);
    }

    let file = File::create(output).with_context(|| format!("creating {}", output.display()))?;
    let mut writer = BufWriter::new(file);
    tl_formats::write_wav(&mut writer, &samples, sample_rate)?;
    writer.flush()?;
    println!(
        "Wrote {} ({:.2}s)",
        output.display(),
        samples.len() as f64 / 2.0 / sample_rate as f64
    );
    Ok(())
}

/// Prints the cursor on one line.
struct StatusLine;

impl PlayerObserver for StatusLine {
    fn on_position(&mut self, p: &PlaybackPosition) {
        print!(
            "\rOrd: {:02X} | Pat: {:02X} | Row: {:02X} | {:6.2}s",
            p.order, p.pattern, p.row, p.seconds
        );
        let _ = std::io::stdout().flush();
    }

    fn on_error(&mut self, error: &tl_player::PlayerError) {
        log::warn!("{}", error);
    }
}

fn play(path: &Path, mut config: PlayerConfig) -> Result<()> {
    let mut output = CpalOutput::new()?;
    config.sample_rate = output.sample_rate();

    let (mut player, driver) = Player::new(config);
    player.add_observer(Box::new(StatusLine));
    let key = player
        .load(&read_module(path)?)
        .with_context(|| format!("loading {}", path.display()))?;
    player.select(key)?;
    player.play()?;
    output.start_with(driver)?;

    while player.is_playing() {
        player.pump(Instant::now());
        std::thread::sleep(Duration::from_millis(10));
    }
    output.stop()?;
    println!("\rDone.{:40}", "");
    Ok(())
}
