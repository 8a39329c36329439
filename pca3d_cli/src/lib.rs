//! pca3d command line - loads input bundles, renders frames with plotters
//! and encodes with ffmpeg.

pub mod app;
pub mod demo;
pub mod encoder;
pub mod error;
pub mod input;
pub mod renderer;

pub use error::{CliError, Result};
pub use input::InputBundle;
pub use renderer::PlotRenderer;
