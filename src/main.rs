mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::time::Duration;
#[cfg(feature = "mic")]
use std::time::Instant;

use beatglass::config::{self, Config};
use beatglass::source::FileSource;
use beatglass::{Engine, FeatureVector, Session};
use cli::Cli;

#[derive(Serialize)]
struct FrameRecord<'a> {
    time: f32,
    #[serde(flatten)]
    features: FeatureVector,
    #[serde(skip_serializing_if = "Option::is_none")]
    spectrum: Option<&'a [f32]>,
}

#[derive(Default)]
struct RunStats {
    ticks: u64,
    beats: u64,
    transients: u64,
}

impl RunStats {
    fn record(&mut self, features: &FeatureVector) {
        self.ticks += 1;
        self.beats += features.beat as u64;
        self.transients += features.transient_active as u64;
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let mut cli = Cli::parse();

    let mut cfg = Config::default();
    if let Some(path) = cli.config.clone().or_else(config::find_config_path) {
        match config::load_config(&path) {
            Ok(loaded) => {
                log::info!("Loaded config from {}", path.display());
                cfg = loaded;
            }
            Err(err) => log::warn!("{:#}", err),
        }
    }

    // Config values apply only when the CLI is at its default
    if cli.fps == 60 { cli.fps = cfg.output.fps; }
    if cli.fft_size == 2048 { cli.fft_size = cfg.analyser.fft_size; }
    if cli.smoothing == 0.85 { cli.smoothing = cfg.analyser.smoothing; }
    let mut analyser = cfg.analyser;
    analyser.fft_size = cli.fft_size;
    analyser.smoothing = cli.smoothing;

    let mut engine_config = cfg.engine;
    if let Some(speed) = cli.decay_speed { engine_config.pulse.decay_speed = speed; }
    if let Some(curve) = cli.mid_curve { engine_config.mid.exponent = curve; }
    if let Some(amp) = cli.mid_amp { engine_config.mid.amplification = amp; }

    let fps = cli.fps.max(1);
    let engine = Engine::new(engine_config);

    let mut out: Box<dyn Write> = match cli.output {
        Some(ref path) => Box::new(BufWriter::new(
            File::create(path).with_context(|| format!("Failed to create output: {}", path.display()))?,
        )),
        None => Box::new(BufWriter::new(std::io::stdout().lock())),
    };

    log::info!("beatglass - audio feature engine");
    log::info!("Analyser: fft_size={}, smoothing={:.2} @ {}fps", analyser.fft_size, analyser.smoothing, fps);

    let stats = if cli.mic {
        run_mic(&cli, analyser, engine, fps, &mut out)?
    } else {
        let input = cli.input.as_ref().context("Input audio file is required (or pass --mic)")?;
        if !input.exists() {
            anyhow::bail!("Input file not found: {}", input.display());
        }
        log::info!("Input: {}", input.display());
        let source = FileSource::new(input, analyser, fps);
        run_file(&cli, source, engine, fps, &mut out)?
    };

    out.flush().context("Failed to flush output")?;
    log::info!(
        "Done: {} ticks, {} beats, {} transients",
        stats.ticks, stats.beats, stats.transients
    );
    Ok(())
}

fn run_file(
    cli: &Cli,
    source: FileSource,
    engine: Engine,
    fps: u32,
    out: &mut dyn Write,
) -> Result<RunStats> {
    let mut session = Session::new(source, engine);
    session.start().context("Failed to start audio stream")?;

    let mut total = session.source().frame_count() as u64;
    if let Some(limit) = cli.seconds {
        total = total.min((limit.max(0.0) * fps as f32) as u64);
    }

    let pb = ProgressBar::new(total);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} frames ({eta} remaining)")
            .context("Invalid progress bar template")?
            .progress_chars("=>-"),
    );

    let mut stats = RunStats::default();
    for frame_idx in 0..total {
        let at = Duration::from_secs_f64(frame_idx as f64 / fps as f64);
        if !session.step_at(at) {
            break;
        }
        let features = session.features();
        stats.record(&features);
        write_record(out, at, features, cli.spectrum.then(|| session.last_frame()))?;
        pb.set_position(frame_idx + 1);
    }
    pb.finish_with_message("Analysis complete");

    let last = session.features();
    log::info!("Final tempo: {} BPM (pattern {:.2})", last.bpm, last.pattern_strength);
    session.stop();
    Ok(stats)
}

#[cfg(feature = "mic")]
fn run_mic(
    cli: &Cli,
    analyser: config::AnalyserConfig,
    engine: Engine,
    fps: u32,
    out: &mut dyn Write,
) -> Result<RunStats> {
    let source = beatglass::source::MicSource::new(analyser);
    let mut session = Session::new(source, engine);
    session.start().context("Failed to start microphone capture")?;

    let period = Duration::from_secs_f64(1.0 / fps as f64);
    let limit = cli.seconds.map(|s| Duration::from_secs_f32(s.max(0.0)));
    let started = Instant::now();
    let mut stats = RunStats::default();

    while limit.map_or(true, |l| started.elapsed() < l) {
        let tick_start = Instant::now();
        if !session.step() {
            break;
        }
        let features = session.features();
        stats.record(&features);
        write_record(out, started.elapsed(), features, cli.spectrum.then(|| session.last_frame()))?;
        if let Some(rest) = period.checked_sub(tick_start.elapsed()) {
            std::thread::sleep(rest);
        }
    }

    session.stop();
    Ok(stats)
}

#[cfg(not(feature = "mic"))]
fn run_mic(
    _cli: &Cli,
    _analyser: config::AnalyserConfig,
    _engine: Engine,
    _fps: u32,
    _out: &mut dyn Write,
) -> Result<RunStats> {
    anyhow::bail!(
        "Microphone capture requires the 'mic' feature. \
         Rebuild with: cargo build --features mic"
    )
}

fn write_record(
    out: &mut dyn Write,
    at: Duration,
    features: FeatureVector,
    spectrum: Option<&[f32]>,
) -> Result<()> {
    let record = FrameRecord {
        time: at.as_secs_f32(),
        features,
        spectrum,
    };
    serde_json::to_writer(&mut *out, &record).context("Failed to serialize feature record")?;
    out.write_all(b"\n").context("Failed to write feature record")?;
    Ok(())
}
