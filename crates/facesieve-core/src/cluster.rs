//! Near-duplicate elimination via color histograms and DBSCAN.
//!
//! Each crop is summarized by an 8×8×8-bin RGB histogram. Crops whose
//! histograms fall into the same density cluster are near-duplicates; the
//! first crop of every cluster is kept.

use crate::types::FaceCrop;
use image::RgbImage;
use std::collections::{HashSet, VecDeque};

pub const HISTOGRAM_BINS: usize = 8;
pub const FEATURE_DIM: usize = HISTOGRAM_BINS * HISTOGRAM_BINS * HISTOGRAM_BINS;

pub const DEFAULT_EPS: f32 = 0.3;
pub const DEFAULT_MIN_SAMPLES: usize = 1;

/// Label for points that belong to no cluster.
pub const NOISE: i32 = -1;

/// Flattened 3-channel color histogram (512 bins, raw counts).
#[derive(Debug, Clone, PartialEq)]
pub struct HistogramFeature {
    pub values: Vec<f32>,
}

impl HistogramFeature {
    /// Count pixels into 8 bins per channel over the full 0–255 range.
    pub fn compute(image: &RgbImage) -> Self {
        let bin_width = 256 / HISTOGRAM_BINS;
        let mut values = vec![0.0f32; FEATURE_DIM];
        for pixel in image.pixels() {
            let [r, g, b] = pixel.0;
            let idx = (r as usize / bin_width) * HISTOGRAM_BINS * HISTOGRAM_BINS
                + (g as usize / bin_width) * HISTOGRAM_BINS
                + b as usize / bin_width;
            values[idx] += 1.0;
        }
        Self { values }
    }
}

/// Distance metric used by [`Dbscan`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Metric {
    /// `1 - cos(a, b)`; 1.0 when either vector is all zeros.
    Cosine,
    Euclidean,
}

impl Metric {
    pub fn distance(&self, a: &[f32], b: &[f32]) -> f32 {
        match self {
            Metric::Cosine => {
                let mut dot = 0.0f32;
                let mut norm_a = 0.0f32;
                let mut norm_b = 0.0f32;
                for (x, y) in a.iter().zip(b.iter()) {
                    dot += x * y;
                    norm_a += x * x;
                    norm_b += y * y;
                }
                let denom = norm_a.sqrt() * norm_b.sqrt();
                let similarity = if denom > 0.0 { dot / denom } else { 0.0 };
                1.0 - similarity
            }
            Metric::Euclidean => a
                .iter()
                .zip(b.iter())
                .map(|(x, y)| (x - y).powi(2))
                .sum::<f32>()
                .sqrt(),
        }
    }
}

/// Black-box clustering: one integer label per input vector, [`NOISE`] for outliers.
pub trait Clusterer {
    fn fit_predict(&self, features: &[Vec<f32>]) -> Vec<i32>;
}

/// Density-based clustering.
///
/// A point is a core point when at least `min_samples` points (itself
/// included) lie within `eps`. Clusters are labelled 0, 1, 2, … in the order
/// their first core point appears in the input. With `min_samples = 1` every
/// point is a core point, so no point is ever labelled [`NOISE`].
#[derive(Debug, Clone, Copy)]
pub struct Dbscan {
    pub eps: f32,
    pub min_samples: usize,
    pub metric: Metric,
}

impl Default for Dbscan {
    fn default() -> Self {
        Self::new(DEFAULT_EPS, DEFAULT_MIN_SAMPLES)
    }
}

impl Dbscan {
    /// Cosine-metric DBSCAN.
    pub fn new(eps: f32, min_samples: usize) -> Self {
        Self {
            eps,
            min_samples,
            metric: Metric::Cosine,
        }
    }

    pub fn with_metric(mut self, metric: Metric) -> Self {
        self.metric = metric;
        self
    }

    fn neighborhoods(&self, features: &[Vec<f32>]) -> Vec<Vec<usize>> {
        let n = features.len();
        let mut neighbors = vec![Vec::new(); n];
        for i in 0..n {
            neighbors[i].push(i);
            for j in (i + 1)..n {
                if self.metric.distance(&features[i], &features[j]) <= self.eps {
                    neighbors[i].push(j);
                    neighbors[j].push(i);
                }
            }
        }
        for list in &mut neighbors {
            list.sort_unstable();
        }
        neighbors
    }
}

impl Clusterer for Dbscan {
    fn fit_predict(&self, features: &[Vec<f32>]) -> Vec<i32> {
        let neighbors = self.neighborhoods(features);
        let is_core: Vec<bool> = neighbors.iter().map(|n| n.len() >= self.min_samples).collect();

        let mut labels = vec![NOISE; features.len()];
        let mut next_label = 0;

        for start in 0..features.len() {
            if labels[start] != NOISE || !is_core[start] {
                continue;
            }

            labels[start] = next_label;
            let mut queue = VecDeque::from([start]);
            while let Some(p) = queue.pop_front() {
                if !is_core[p] {
                    continue;
                }
                for &q in &neighbors[p] {
                    if labels[q] == NOISE {
                        labels[q] = next_label;
                        queue.push_back(q);
                    }
                }
            }
            next_label += 1;
        }

        labels
    }
}

/// Indices to keep: the first index of each cluster label, plus every
/// [`NOISE`] index (each noise point is its own singleton). Ascending order.
pub fn select_representatives(labels: &[i32]) -> Vec<usize> {
    let mut seen = HashSet::new();
    labels
        .iter()
        .enumerate()
        .filter(|&(_, &label)| label == NOISE || seen.insert(label))
        .map(|(i, _)| i)
        .collect()
}

/// Reduces a category's crops to one representative per near-duplicate group.
#[derive(Debug, Clone)]
pub struct NearDuplicateClusterer<C> {
    clusterer: C,
}

impl Default for NearDuplicateClusterer<Dbscan> {
    fn default() -> Self {
        Self::new(Dbscan::default())
    }
}

impl<C: Clusterer> NearDuplicateClusterer<C> {
    pub fn new(clusterer: C) -> Self {
        Self { clusterer }
    }

    /// Keep the first crop of every cluster, preserving input order.
    pub fn reduce(&self, crops: Vec<FaceCrop>) -> Vec<FaceCrop> {
        if crops.len() <= 1 {
            return crops;
        }

        let features: Vec<Vec<f32>> = crops
            .iter()
            .map(|c| HistogramFeature::compute(&c.pixels).values)
            .collect();
        let labels = self.clusterer.fit_predict(&features);
        let keep: HashSet<usize> = select_representatives(&labels).into_iter().collect();

        tracing::debug!(
            input = crops.len(),
            kept = keep.len(),
            "near-duplicate clustering"
        );

        crops
            .into_iter()
            .enumerate()
            .filter(|(i, _)| keep.contains(i))
            .map(|(_, c)| c)
            .collect()
    }
}
