//! Input bundles - raw snapshots, labels, titles and markers in one JSON file.
//!
//! ```json
//! {
//!   "snapshots": [{"shape": [N, D], "data": [...]}, ...],
//!   "labels": {"shape": [N], "data": {"dtype": "i32", "values": [...]}},
//!   "titles": ["Input", "Hidden"],
//!   "markers": [{"mask": [true, ...], "style": {"size": 20.0}}]
//! }
//! ```
//!
//! Titles and markers are optional: titles default to `Snapshot i` and
//! without markers every point is coloured by its label.

use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use pca3d_core::array::ArrayRecord;
use pca3d_core::state::{Color, Norm};
use pca3d_core::{Marker, SampleLabels, Style};

use crate::error::{CliError, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputBundle {
    pub snapshots: Vec<ArrayRecord>,
    pub labels: SampleLabels,
    #[serde(default)]
    pub titles: Vec<String>,
    #[serde(default)]
    pub markers: Vec<Marker>,
}

impl InputBundle {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let reader = BufReader::new(File::open(path)?);
        let bundle: InputBundle = serde_json::from_reader(reader)?;

        if bundle.snapshots.is_empty() {
            return Err(CliError::input(path, "no snapshots"));
        }
        if !bundle.titles.is_empty() && bundle.titles.len() != bundle.snapshots.len() {
            return Err(CliError::input(
                path,
                format!("{} titles for {} snapshots", bundle.titles.len(), bundle.snapshots.len()),
            ));
        }
        bundle.labels.validate()?;
        Ok(bundle)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut writer = BufWriter::new(File::create(path.as_ref())?);
        serde_json::to_writer(&mut writer, self)?;
        writer.flush()?;
        Ok(())
    }

    /// Raw sample matrices, validated one by one.
    pub fn matrices(&self) -> Result<Vec<DMatrix<f64>>> {
        self.snapshots
            .iter()
            .enumerate()
            .map(|(i, record)| Ok(record.to_matrix(&format!("snapshots[{}]", i))?))
            .collect()
    }

    /// Given titles, or `Snapshot 1`, `Snapshot 2`, ...
    pub fn resolved_titles(&self) -> Vec<String> {
        if self.titles.is_empty() {
            (1..=self.snapshots.len()).map(|i| format!("Snapshot {}", i)).collect()
        } else {
            self.titles.clone()
        }
    }

    /// Given markers, or one marker colouring every point by its label.
    pub fn resolved_markers(&self) -> Vec<Marker> {
        if self.markers.is_empty() {
            vec![label_marker(&self.labels)]
        } else {
            self.markers.clone()
        }
    }
}

/// Marks every sample, coloured by its scalar label when there is one.
pub fn label_marker(labels: &SampleLabels) -> Marker {
    let mut style = Style {
        size: Some(20.0),
        marker: Some("o".to_string()),
        ..Style::default()
    };

    match labels.to_scalars() {
        Some(values) => {
            let vmin = values.iter().copied().fold(f64::INFINITY, f64::min);
            let vmax = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            style.norm = (vmin.is_finite() && vmax.is_finite()).then_some(Norm { vmin, vmax });
            style.colormap = Some("viridis".to_string());
            style.color = Some(Color::Values(values));
        }
        None => style.color = Some(Color::Solid([0.12, 0.47, 0.71, 1.0])),
    }

    Marker {
        mask: vec![true; labels.num_samples()],
        style,
    }
}
