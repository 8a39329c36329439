//! The "CLUSTERING" Engine - dense groups of points within one snapshot.
//!
//! The default detector is HDBSCAN over Euclidean distance:
//!
//! 1. Core distance of each point (distance to its `min_samples`-th neighbour,
//!    the point itself included)
//! 2. Minimum spanning tree of the mutual-reachability graph
//! 3. Single-linkage hierarchy from the sorted tree edges
//! 4. Condensed tree: splits smaller than `min_cluster_size` become points
//!    falling out of their parent
//! 5. Excess-of-mass selection, never selecting the root
//!
//! Points not covered by a selected cluster are noise (-1).

use nalgebra::DMatrix;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info};

use crate::error::{Result, VisError};

/// Label given to points that belong to no cluster.
pub const NOISE: i32 = -1;

/// Smallest distance used when converting distances to lambdas.
const MIN_DISTANCE: f64 = 1e-12;

// ============================================================================
// CLUSTERS
// ============================================================================

/// Parameters a set of clusters was produced with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterParams {
    pub min_cluster_size: usize,
    pub min_samples: usize,
    pub method: String,
}

/// Clusters found within the samples of one snapshot.
#[derive(Debug, Clone)]
pub struct Clusters {
    /// Samples the clusters were selected from [samples, features]
    samples: DMatrix<f64>,

    /// Cluster centers [clusters, features]
    centers: DMatrix<f64>,

    /// Per-sample cluster index in `0..clusters`, or [`NOISE`]
    labels: Vec<i32>,

    method_params: ClusterParams,
}

impl Clusters {
    /// Builds clusters from raw per-sample assignments.
    ///
    /// Any negative assignment is noise. Non-noise assignments are renumbered
    /// densely in ascending order and each center is the mean of its members.
    /// If a single group spans every sample there is nothing to fly through:
    /// the result has zero centers and all labels are 0.
    pub fn from_assignments(
        samples: DMatrix<f64>,
        assignments: &[i32],
        method_params: ClusterParams,
    ) -> Result<Self> {
        let (n, d) = samples.shape();
        if assignments.len() != n {
            return Err(VisError::shape("labels", format!("({},)", n), format!("({},)", assignments.len())));
        }

        let mut index_of: BTreeMap<i32, usize> = BTreeMap::new();
        for &a in assignments.iter().filter(|&&a| a >= 0) {
            index_of.entry(a).or_insert(0);
        }
        for (i, value) in index_of.values_mut().enumerate() {
            *value = i;
        }

        let k = index_of.len();
        let mut sums = DMatrix::<f64>::zeros(k, d);
        let mut counts = vec![0usize; k];
        let mut labels = vec![NOISE; n];

        for (row, &a) in assignments.iter().enumerate() {
            if let Some(&c) = index_of.get(&a) {
                labels[row] = c as i32;
                counts[c] += 1;
                let mut sum = sums.row_mut(c);
                sum += samples.row(row);
            }
        }

        if k == 1 && counts[0] == n {
            return Ok(Self {
                samples,
                centers: DMatrix::zeros(0, d),
                labels: vec![0; n],
                method_params,
            });
        }

        for (c, &count) in counts.iter().enumerate() {
            let mut row = sums.row_mut(c);
            row /= count as f64;
        }

        Ok(Self {
            samples,
            centers: sums,
            labels,
            method_params,
        })
    }

    pub fn samples(&self) -> &DMatrix<f64> {
        &self.samples
    }

    pub fn centers(&self) -> &DMatrix<f64> {
        &self.centers
    }

    pub fn labels(&self) -> &[i32] {
        &self.labels
    }

    pub fn method_params(&self) -> &ClusterParams {
        &self.method_params
    }

    pub fn num_samples(&self) -> usize {
        self.samples.nrows()
    }

    pub fn num_features(&self) -> usize {
        self.samples.ncols()
    }

    pub fn num_clusters(&self) -> usize {
        self.centers.nrows()
    }

    /// Membership mask of one cluster.
    pub fn mask(&self, cluster: usize) -> Vec<bool> {
        self.labels.iter().map(|&l| l == cluster as i32).collect()
    }
}

// ============================================================================
// DETECTORS
// ============================================================================

/// Finds clusters within projected samples.
pub trait ClusterDetector: Send + Sync {
    fn detect(&self, samples: &DMatrix<f64>) -> Result<Clusters>;
}

/// Hierarchical density-based clustering with parameters derived from the
/// sample count.
#[derive(Debug, Clone, Default)]
pub struct HdbscanDetector {
    /// Silences diagnostic logging
    pub quiet: bool,
}

impl HdbscanDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: silence diagnostic logging
    pub fn with_quiet(mut self, quiet: bool) -> Self {
        self.quiet = quiet;
        self
    }

    /// Parameters used for `num_samples` points.
    pub fn params_for(num_samples: usize) -> ClusterParams {
        let fifth = (num_samples as f64 * 0.2).ceil() as usize;
        ClusterParams {
            min_cluster_size: fifth.max(2),
            min_samples: num_samples.min(10),
            method: "hdbscan".to_string(),
        }
    }
}

impl ClusterDetector for HdbscanDetector {
    fn detect(&self, samples: &DMatrix<f64>) -> Result<Clusters> {
        let n = samples.nrows();
        let params = Self::params_for(n);

        if n < 2 {
            let assignments = vec![0; n];
            return Clusters::from_assignments(samples.clone(), &assignments, params);
        }

        let assignments = hdbscan(samples, params.min_cluster_size, params.min_samples);
        let clusters = Clusters::from_assignments(samples.clone(), &assignments, params)?;

        if !self.quiet {
            let noise = clusters.labels().iter().filter(|&&l| l == NOISE).count();
            info!(
                "Found {} clusters in {} samples ({} noise)",
                clusters.num_clusters(),
                n,
                noise
            );
        }
        Ok(clusters)
    }
}

// ============================================================================
// HDBSCAN
// ============================================================================

/// One merge of the single-linkage hierarchy. Nodes below `n` are points,
/// node `n + i` is the result of merge `i`.
#[derive(Debug, Clone, Copy)]
struct Merge {
    left: usize,
    right: usize,
    distance: f64,
    size: usize,
}

/// Edge of the condensed tree. Clusters are numbered from `n` (the root);
/// a child below `n` is a point falling out of its parent.
#[derive(Debug, Clone, Copy)]
struct CondensedEdge {
    parent: usize,
    child: usize,
    lambda: f64,
    size: usize,
}

/// Runs HDBSCAN and returns a per-point assignment (negative for noise).
/// Requires at least two points.
fn hdbscan(samples: &DMatrix<f64>, min_cluster_size: usize, min_samples: usize) -> Vec<i32> {
    let n = samples.nrows();

    let core = core_distances(samples, min_samples);
    let mut edges = mutual_reachability_mst(samples, &core);
    edges.sort_by(|a, b| a.2.total_cmp(&b.2));

    let merges = single_linkage(n, &edges);
    let condensed = condense(n, &merges, min_cluster_size);
    let selected = select_clusters(n, &condensed);

    debug!(
        "HDBSCAN: {} condensed edges, {} selected clusters",
        condensed.len(),
        selected.len()
    );

    label_points(n, &condensed, &selected)
}

fn distance(samples: &DMatrix<f64>, a: usize, b: usize) -> f64 {
    samples
        .row(a)
        .iter()
        .zip(samples.row(b).iter())
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f64>()
        .sqrt()
}

/// Distance of each point to its `min_samples`-th neighbour, the point
/// itself included. One row of distances is alive per worker.
fn core_distances(samples: &DMatrix<f64>, min_samples: usize) -> Vec<f64> {
    let n = samples.nrows();
    let k = min_samples.clamp(1, n);
    (0..n)
        .into_par_iter()
        .map(|i| {
            let mut row: Vec<f64> = (0..n).map(|j| distance(samples, i, j)).collect();
            let (_, kth, _) = row.select_nth_unstable_by(k - 1, f64::total_cmp);
            *kth
        })
        .collect()
}

/// Prim's algorithm over the dense mutual-reachability graph, with edge
/// weights computed as they are visited.
fn mutual_reachability_mst(samples: &DMatrix<f64>, core: &[f64]) -> Vec<(usize, usize, f64)> {
    let n = samples.nrows();
    let mut in_tree = vec![false; n];
    let mut best = vec![f64::INFINITY; n];
    let mut from = vec![0usize; n];
    let mut edges = Vec::with_capacity(n - 1);

    let mut current = 0;
    in_tree[0] = true;
    for _ in 1..n {
        best.par_iter_mut()
            .zip(from.par_iter_mut())
            .enumerate()
            .filter(|(j, _)| !in_tree[*j])
            .for_each(|(j, (best, from))| {
                let d = distance(samples, current, j).max(core[current]).max(core[j]);
                if d < *best {
                    *best = d;
                    *from = current;
                }
            });

        let mut next = usize::MAX;
        for j in (0..n).filter(|&j| !in_tree[j]) {
            if next == usize::MAX || best[j] < best[next] {
                next = j;
            }
        }
        in_tree[next] = true;
        edges.push((from[next], next, best[next]));
        current = next;
    }
    edges
}

fn single_linkage(n: usize, sorted_edges: &[(usize, usize, f64)]) -> Vec<Merge> {
    fn find(parent: &mut [usize], mut x: usize) -> usize {
        while parent[x] != x {
            parent[x] = parent[parent[x]];
            x = parent[x];
        }
        x
    }

    let mut parent: Vec<usize> = (0..n).collect();
    let mut node_of: Vec<usize> = (0..n).collect();
    let mut size = vec![1usize; n];
    let mut merges = Vec::with_capacity(n.saturating_sub(1));

    for &(a, b, distance) in sorted_edges {
        let ra = find(&mut parent, a);
        let rb = find(&mut parent, b);
        if ra == rb {
            continue;
        }
        merges.push(Merge {
            left: node_of[ra],
            right: node_of[rb],
            distance,
            size: size[ra] + size[rb],
        });
        parent[rb] = ra;
        size[ra] += size[rb];
        node_of[ra] = n + merges.len() - 1;
    }
    merges
}

fn condense(n: usize, merges: &[Merge], min_cluster_size: usize) -> Vec<CondensedEdge> {
    let node_size = |node: usize| if node < n { 1 } else { merges[node - n].size };

    let leaves_of = |node: usize| {
        let mut leaves = Vec::new();
        let mut stack = vec![node];
        while let Some(x) = stack.pop() {
            if x < n {
                leaves.push(x);
            } else {
                stack.push(merges[x - n].left);
                stack.push(merges[x - n].right);
            }
        }
        leaves
    };

    let mut edges = Vec::new();
    let Some(last) = merges.len().checked_sub(1) else {
        return edges;
    };

    let mut next_label = n + 1;
    let mut stack = vec![(n + last, n)];

    while let Some((node, label)) = stack.pop() {
        if node < n {
            edges.push(CondensedEdge { parent: label, child: node, lambda: f64::MAX, size: 1 });
            continue;
        }
        let merge = merges[node - n];
        let lambda = 1.0 / merge.distance.max(MIN_DISTANCE);
        let (left_size, right_size) = (node_size(merge.left), node_size(merge.right));
        let fall_out = |child: usize, edges: &mut Vec<CondensedEdge>| {
            for point in leaves_of(child) {
                edges.push(CondensedEdge { parent: label, child: point, lambda, size: 1 });
            }
        };

        match (left_size >= min_cluster_size, right_size >= min_cluster_size) {
            (true, true) => {
                for (child, size) in [(merge.left, left_size), (merge.right, right_size)] {
                    let child_label = next_label;
                    next_label += 1;
                    edges.push(CondensedEdge { parent: label, child: child_label, lambda, size });
                    stack.push((child, child_label));
                }
            }
            (true, false) => {
                fall_out(merge.right, &mut edges);
                stack.push((merge.left, label));
            }
            (false, true) => {
                fall_out(merge.left, &mut edges);
                stack.push((merge.right, label));
            }
            (false, false) => {
                fall_out(merge.left, &mut edges);
                fall_out(merge.right, &mut edges);
            }
        }
    }
    edges
}

/// Excess-of-mass selection. Returns the selected cluster ids (never the root).
fn select_clusters(n: usize, condensed: &[CondensedEdge]) -> Vec<usize> {
    let num_clusters = condensed
        .iter()
        .map(|e| e.parent.max(e.child))
        .filter(|&c| c >= n)
        .max()
        .map_or(1, |max| max - n + 1);

    let mut birth = vec![0.0f64; num_clusters];
    let mut children: Vec<Vec<usize>> = vec![Vec::new(); num_clusters];
    for e in condensed.iter().filter(|e| e.child >= n) {
        birth[e.child - n] = e.lambda;
        children[e.parent - n].push(e.child - n);
    }

    let mut stability = vec![0.0f64; num_clusters];
    for e in condensed {
        let c = e.parent - n;
        stability[c] += (e.lambda - birth[c]) * e.size as f64;
    }

    // Children always have larger ids than their parents
    let mut selected = vec![false; num_clusters];
    for c in (1..num_clusters).rev() {
        let subtree: f64 = children[c].iter().map(|&ch| stability[ch]).sum();
        if !children[c].is_empty() && subtree > stability[c] {
            stability[c] = subtree;
        } else {
            selected[c] = true;
            let mut stack = children[c].clone();
            while let Some(x) = stack.pop() {
                selected[x] = false;
                stack.extend_from_slice(&children[x]);
            }
        }
    }

    (0..num_clusters).filter(|&c| selected[c]).map(|c| c + n).collect()
}

fn label_points(n: usize, condensed: &[CondensedEdge], selected: &[usize]) -> Vec<i32> {
    let mut parent_of: BTreeMap<usize, usize> = BTreeMap::new();
    let mut fell_from = vec![None; n];
    for e in condensed {
        if e.child >= n {
            parent_of.insert(e.child, e.parent);
        } else {
            fell_from[e.child] = Some(e.parent);
        }
    }

    let cluster_index: BTreeMap<usize, i32> = selected
        .iter()
        .enumerate()
        .map(|(i, &c)| (c, i as i32))
        .collect();

    fell_from
        .iter()
        .map(|start| {
            let mut cursor = *start;
            while let Some(c) = cursor {
                if let Some(&index) = cluster_index.get(&c) {
                    return index;
                }
                cursor = parent_of.get(&c).copied();
            }
            NOISE
        })
        .collect()
}
