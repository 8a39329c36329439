//! pca3d Core - Temporally Coherent 3D Animations of High-Dimensional Snapshots
//!
//! This library turns a sequence of sample matrices (the same samples seen at
//! different processing stages) into a camera-directed animation:
//! 1. **Projection**: each snapshot reduced to its top principal axes
//! 2. **Alignment**: orthogonal Procrustes between consecutive snapshots so
//!    the animation does not jitter
//! 3. **Clustering**: dense groups per snapshot for fly-to-cluster sequences
//! 4. **Direction**: a stack-based scene algebra compiled into a pure
//!    time -> render state function

pub mod align;
pub mod array;
pub mod bounds;
pub mod clusters;
pub mod easing;
pub mod error;
pub mod labels;
pub mod pipeline;
pub mod reduce;
pub mod scenes;
pub mod snapshot;
pub mod state;
pub mod timeline;
pub mod trajectory;

// Re-export key types for convenience
pub use clusters::{ClusterDetector, Clusters, HdbscanDetector};
pub use error::{Result, VisError};
pub use labels::{LabelValues, SampleLabels};
pub use pipeline::{
    compile_timeline, generate, Frame, FrameRenderer, FrameSink, GenerateJob, GenerateOptions,
    RenderSettings,
};
pub use snapshot::Snapshot;
pub use state::{Marker, RenderState, Style};
pub use timeline::{Timeline, TimelineBuilder};
pub use trajectory::{build_trajectory, ReduceConfig, Trajectory};
