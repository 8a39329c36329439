//! pca3d CLI
//!
//! Render camera-directed 3D animations of high-dimensional snapshots.

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing::{error, info, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use pca3d_cli::app::{identity_trajectory, reduce_bundle, render_trajectory, write_snapshots, Output};
use pca3d_cli::demo::{gaussian_balls, uniform_cube, BallsConfig};
use pca3d_cli::{InputBundle, Result};
use pca3d_core::{GenerateOptions, ReduceConfig};

/// pca3d - temporally coherent PCA animations
#[derive(Parser, Debug)]
#[command(name = "pca3d")]
#[command(about = "Render camera-directed 3D animations of high-dimensional snapshots", long_about = None)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// ffmpeg binary used to encode the video
    #[arg(long, global = true, default_value = "ffmpeg")]
    ffmpeg: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Reduce, align and render an input bundle
    Render {
        /// JSON input bundle
        #[arg(short, long)]
        input: PathBuf,

        /// Output directory (must not exist)
        #[arg(short, long)]
        out: PathBuf,

        #[command(flatten)]
        reduce: ReduceArgs,

        #[command(flatten)]
        video: VideoArgs,
    },

    /// Reduce and align an input bundle, saving one archive per snapshot
    Project {
        /// JSON input bundle
        #[arg(short, long)]
        input: PathBuf,

        /// Output directory (must not exist)
        #[arg(short, long)]
        out: PathBuf,

        #[command(flatten)]
        reduce: ReduceArgs,
    },

    /// Render synthetic demo data
    Demo {
        /// Output directory (must not exist)
        #[arg(short, long)]
        out: PathBuf,

        /// Master seed for the generated data
        #[arg(short, long, default_value = "42")]
        seed: u64,

        /// Which data set to generate
        #[arg(long, value_enum, default_value = "gaussian-balls")]
        kind: DemoKind,

        /// Also save the generated input bundle to this file
        #[arg(long)]
        save_input: Option<PathBuf>,

        #[command(flatten)]
        video: VideoArgs,
    },
}

#[derive(Args, Debug)]
struct ReduceArgs {
    /// Number of principal components
    #[arg(short = 'k', long, default_value = "3")]
    components: usize,

    /// Do not align consecutive snapshots
    #[arg(long)]
    no_align: bool,
}

impl ReduceArgs {
    fn config(&self) -> ReduceConfig {
        ReduceConfig::default()
            .with_components(self.components)
            .with_align(!self.no_align)
    }
}

#[derive(Args, Debug)]
struct VideoArgs {
    /// Lower quality, faster video
    #[arg(long)]
    draft: bool,

    /// Skip the cluster flythroughs
    #[arg(long)]
    no_clusters: bool,

    /// Write PNG frames instead of encoding a video
    #[arg(long)]
    frames: bool,
}

impl VideoArgs {
    fn options(&self) -> GenerateOptions {
        GenerateOptions::default()
            .with_draft(self.draft)
            .with_clusters(!self.no_clusters)
    }

    fn output(&self, ffmpeg: &str) -> Output {
        if self.frames {
            Output::Frames
        } else {
            Output::Video {
                ffmpeg: ffmpeg.to_string(),
            }
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum DemoKind {
    /// Five gaussian balls in 10 (then 11) dimensions
    GaussianBalls,
    /// Uniform points in a cube, shown without projection
    Random,
}

fn run(cli: &Cli) -> Result<()> {
    match &cli.command {
        Command::Render { input, out, reduce, video } => {
            let bundle = InputBundle::load(input)?;
            let trajectory = reduce_bundle(&bundle, &reduce.config())?;
            render_trajectory(trajectory, &bundle, out, video.options(), &video.output(&cli.ffmpeg))?;
        }
        Command::Project { input, out, reduce } => {
            let bundle = InputBundle::load(input)?;
            let trajectory = reduce_bundle(&bundle, &reduce.config())?;
            write_snapshots(&trajectory, out)?;
        }
        Command::Demo { out, seed, kind, save_input, video } => {
            info!("Generating {:?} demo data (seed={})", kind, seed);
            let (bundle, trajectory) = match kind {
                DemoKind::GaussianBalls => {
                    let bundle = gaussian_balls(&BallsConfig::default(), *seed);
                    let trajectory = reduce_bundle(&bundle, &ReduceConfig::default())?;
                    (bundle, trajectory)
                }
                DemoKind::Random => {
                    let (data, bundle) = uniform_cube(1000, *seed);
                    let trajectory = identity_trajectory(&data, &bundle)?;
                    (bundle, trajectory)
                }
            };
            if let Some(path) = save_input {
                bundle.save(path)?;
            }
            render_trajectory(trajectory, &bundle, out, video.options(), &video.output(&cli.ffmpeg))?;
        }
    }
    Ok(())
}

fn main() {
    let cli = Cli::parse();

    // Initialize logging
    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .expect("Failed to set tracing subscriber");

    info!("pca3d v{}", env!("CARGO_PKG_VERSION"));

    if let Err(e) = run(&cli) {
        error!("{}", e);
        std::process::exit(1);
    }
}
