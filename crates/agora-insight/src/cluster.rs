//! Density clustering over message features.
//!
//! DBSCAN with a root-mean-square Euclidean distance, so `epsilon` keeps its
//! meaning whatever the embedding width. Points that are not density
//! reachable from a core point are noise, and so are clusters smaller than
//! `min_cluster_size`.

use std::collections::VecDeque;

use agora_core::config::InsightConfig;

/// Euclidean distance divided by `sqrt(dimensions)`.
pub fn rms_distance(a: &[f64], b: &[f64]) -> f64 {
    let dims = a.len().min(b.len());
    if dims == 0 {
        return 0.0;
    }
    let sum: f64 = a.iter().zip(b).map(|(x, y)| (x - y).powi(2)).sum();
    (sum / dims as f64).sqrt()
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DensityClusterer {
    pub epsilon: f64,
    /// Neighbours (the point included) needed to be a core point.
    pub min_samples: usize,
    pub min_cluster_size: usize,
}

impl DensityClusterer {
    pub fn new(epsilon: f64, min_samples: usize, min_cluster_size: usize) -> Self {
        Self {
            epsilon,
            min_samples: min_samples.max(1),
            min_cluster_size: min_cluster_size.max(1),
        }
    }

    pub fn from_config(config: &InsightConfig) -> Self {
        Self::new(config.epsilon, config.min_samples, config.min_cluster_size)
    }

    fn neighbours(&self, points: &[Vec<f64>]) -> Vec<Vec<usize>> {
        (0..points.len())
            .map(|i| {
                (0..points.len())
                    .filter(|&j| rms_distance(&points[i], &points[j]) <= self.epsilon)
                    .collect()
            })
            .collect()
    }

    /// Cluster label for every point, `None` for noise. Labels are dense
    /// and numbered in order of each cluster's first point.
    pub fn fit(&self, points: &[Vec<f64>]) -> Vec<Option<usize>> {
        let neighbours = self.neighbours(points);
        let is_core = |i: usize| neighbours[i].len() >= self.min_samples;

        let mut labels: Vec<Option<usize>> = vec![None; points.len()];
        let mut visited = vec![false; points.len()];
        let mut next = 0;

        for start in 0..points.len() {
            if visited[start] || !is_core(start) {
                continue;
            }
            let cluster = next;
            next += 1;

            let mut queue = VecDeque::from([start]);
            while let Some(p) = queue.pop_front() {
                if labels[p].is_none() {
                    labels[p] = Some(cluster);
                }
                if visited[p] {
                    continue;
                }
                visited[p] = true;
                if is_core(p) {
                    queue.extend(neighbours[p].iter().filter(|&&q| !visited[q]));
                }
            }
        }

        self.drop_small(labels, next)
    }

    fn drop_small(&self, labels: Vec<Option<usize>>, clusters: usize) -> Vec<Option<usize>> {
        let mut sizes = vec![0usize; clusters];
        for label in labels.iter().flatten() {
            sizes[*label] += 1;
        }
        let mut remap: Vec<Option<usize>> = vec![None; clusters];
        let mut next = 0;
        for label in labels.iter().flatten() {
            if sizes[*label] >= self.min_cluster_size && remap[*label].is_none() {
                remap[*label] = Some(next);
                next += 1;
            }
        }
        labels.into_iter().map(|l| l.and_then(|l| remap[l])).collect()
    }

    /// Point indices grouped by cluster, noise dropped.
    pub fn groups(&self, points: &[Vec<f64>]) -> Vec<Vec<usize>> {
        let labels = self.fit(points);
        let count = labels.iter().flatten().max().map_or(0, |m| m + 1);
        let mut groups = vec![Vec::new(); count];
        for (i, label) in labels.into_iter().enumerate() {
            if let Some(label) = label {
                groups[label].push(i);
            }
        }
        groups
    }
}

impl Default for DensityClusterer {
    fn default() -> Self {
        Self::from_config(&InsightConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blobs() -> Vec<Vec<f64>> {
        vec![
            vec![0.0, 0.0],
            vec![0.1, 0.0],
            vec![0.0, 0.1],
            vec![5.0, 5.0],
            vec![5.1, 5.0],
            vec![5.0, 5.2],
            vec![-9.0, 12.0],
        ]
    }

    #[test]
    fn test_rms_distance() {
        assert_eq!(rms_distance(&[0.0, 0.0], &[3.0, 4.0]), (25.0f64 / 2.0).sqrt());
        assert_eq!(rms_distance(&[], &[]), 0.0);
    }

    #[test]
    fn test_separated_blobs_and_noise() {
        let clusterer = DensityClusterer::default();
        let labels = clusterer.fit(&blobs());
        assert_eq!(
            labels,
            vec![Some(0), Some(0), Some(0), Some(1), Some(1), Some(1), None]
        );
        assert_eq!(clusterer.groups(&blobs()), vec![vec![0, 1, 2], vec![3, 4, 5]]);
    }

    #[test]
    fn test_small_clusters_become_noise() {
        let clusterer = DensityClusterer::new(0.7, 2, 3);
        let points = vec![
            vec![0.0],
            vec![0.1],
            vec![0.2],
            vec![10.0],
            vec![10.1],
        ];
        assert_eq!(
            clusterer.fit(&points),
            vec![Some(0), Some(0), Some(0), None, None]
        );
    }

    #[test]
    fn test_border_point_joins_cluster() {
        // The last point only reaches one core point.
        let clusterer = DensityClusterer::new(1.0, 3, 2);
        let points = vec![vec![0.0], vec![0.5], vec![1.0], vec![1.9]];
        let labels = clusterer.fit(&points);
        assert!(labels.iter().all(|l| *l == Some(0)));
    }

    #[test]
    fn test_empty_and_single_point() {
        let clusterer = DensityClusterer::default();
        assert!(clusterer.fit(&[]).is_empty());
        assert!(clusterer.groups(&[]).is_empty());
        assert_eq!(clusterer.fit(&[vec![1.0, 2.0]]), vec![None]);
    }
}
