use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "beatglass", about = "Audio feature and beat extraction for reactive visuals")]
pub struct Cli {
    /// Input audio file (WAV, MP3, FLAC, OGG)
    pub input: Option<PathBuf>,

    /// Capture from the default microphone instead of a file
    #[arg(long)]
    pub mic: bool,

    /// Write JSON Lines here instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Config file (defaults to ./beatglass.toml or the user config dir)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Feature frames per second
    #[arg(long, default_value_t = 60)]
    pub fps: u32,

    /// FFT size of the spectrum analyser
    #[arg(long, default_value_t = 2048)]
    pub fft_size: usize,

    /// Spectrum smoothing between frames (0.0-1.0)
    #[arg(long, default_value_t = 0.85)]
    pub smoothing: f32,

    /// Beat pulse decay speed (0.0-1.0, higher = shorter pulse)
    #[arg(long)]
    pub decay_speed: Option<f32>,

    /// Mid band response exponent
    #[arg(long)]
    pub mid_curve: Option<f32>,

    /// Mid band amplification
    #[arg(long)]
    pub mid_amp: Option<f32>,

    /// Stop after this many seconds (microphone capture runs until interrupted otherwise)
    #[arg(long)]
    pub seconds: Option<f32>,

    /// Include the raw magnitude frame in every record
    #[arg(long)]
    pub spectrum: bool,
}
