//! Synthetic demo data, generated deterministically from a seed.

use nalgebra::DMatrix;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, StandardNormal};

use pca3d_core::array::ArrayRecord;
use pca3d_core::state::{Color, Marker, Norm, Style};
use pca3d_core::{LabelValues, SampleLabels};

use crate::input::InputBundle;

/// Gaussian balls configuration.
#[derive(Debug, Clone)]
pub struct BallsConfig {
    /// Features of the first snapshot; each later snapshot has one more
    pub features: usize,
    pub clusters: usize,
    pub snapshots: usize,
    pub samples_per_cluster: usize,
    pub std: f64,
}

impl Default for BallsConfig {
    fn default() -> Self {
        Self {
            features: 10,
            clusters: 5,
            snapshots: 2,
            samples_per_cluster: 200,
            std: 0.2,
        }
    }
}

/// Gaussian balls around centers drawn uniformly from `[-2, 2]^D`, one
/// label per ball, coloured with a qualitative colormap.
pub fn gaussian_balls(config: &BallsConfig, seed: u64) -> InputBundle {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let n = config.clusters * config.samples_per_cluster;

    let snapshots = (0..config.snapshots)
        .map(|snap| {
            let d = config.features + snap;
            let centers = DMatrix::from_fn(config.clusters, d, |_, _| rng.gen_range(-2.0..2.0));
            let data = DMatrix::from_fn(n, d, |r, c| {
                let noise: f64 = StandardNormal.sample(&mut rng);
                centers[(r / config.samples_per_cluster, c)] + noise * config.std
            });
            ArrayRecord::from_matrix(&data)
        })
        .collect();

    let labels: Vec<i32> = (0..n).map(|i| (i / config.samples_per_cluster) as i32).collect();
    let colors = labels.iter().map(|&l| l as f64).collect();

    let marker = Marker {
        mask: vec![true; n],
        style: Style {
            size: Some(20.0),
            color: Some(Color::Values(colors)),
            colormap: Some("set1".to_string()),
            marker: Some("o".to_string()),
            norm: Some(Norm {
                vmin: 0.0,
                vmax: config.clusters.saturating_sub(1) as f64,
            }),
            ..Style::default()
        },
    };

    InputBundle {
        snapshots,
        labels: SampleLabels::from_values(LabelValues::I32(labels)),
        titles: (1..=config.snapshots).map(|i| format!("Gaussian Balls ({})", i)).collect(),
        markers: vec![marker],
    }
}

/// Points drawn uniformly from `[-1, 1]^3`, shown as they are.
pub fn uniform_cube(samples: usize, seed: u64) -> (DMatrix<f64>, InputBundle) {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let data = DMatrix::from_fn(samples, 3, |_, _| rng.gen_range(-1.0..1.0));

    let bundle = InputBundle {
        snapshots: vec![ArrayRecord::from_matrix(&data)],
        labels: SampleLabels::from_values(LabelValues::I32(vec![0; samples])),
        titles: vec!["Random".to_string()],
        markers: vec![Marker {
            mask: vec![true; samples],
            style: Style {
                size: Some(20.0),
                color: Some(Color::Solid([0.839, 0.153, 0.157, 1.0])),
                ..Style::default()
            },
        }],
    };
    (data, bundle)
}
