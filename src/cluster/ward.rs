//! Ward's minimum-variance agglomerative clustering.
//!
//! Implements the `ward.D2` form: the Lance–Williams recurrence runs on
//! squared Euclidean distances and each reported height is the square root
//! of the merged squared distance.
//!
//! Merging is fully deterministic. Every active cluster is stored in the slot
//! of its smallest member, so scanning slot pairs `(a, b)` with `a < b` and
//! keeping only strictly smaller costs resolves ties towards the lowest
//! `(min_a, min_b)` pair. The child with the lower smallest member is always
//! the left one.

use super::distance::DistanceMatrix;
use crate::error::{CodaError, Result};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

const STAGE: &str = "clustering";

/// One agglomeration step.
///
/// Children use signed encoding: `-(i + 1)` is sample `i`, a positive `k`
/// is the cluster formed at step `k` (1-based).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Merge {
    pub left: i64,
    pub right: i64,
    pub height: f64,
    pub size: usize,
}

/// Binary merge tree over samples.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dendrogram {
    /// Sample identifiers, in input order.
    pub sample_ids: Vec<String>,
    /// The `n - 1` merges, in the order they happened.
    pub merges: Vec<Merge>,
    /// Leaf order: sample indices from left to right.
    pub order: Vec<usize>,
}

impl Dendrogram {
    /// Number of leaves.
    pub fn n_samples(&self) -> usize {
        self.sample_ids.len()
    }

    /// Merge heights, in merge order.
    pub fn heights(&self) -> Vec<f64> {
        self.merges.iter().map(|m| m.height).collect()
    }

    /// Sample identifiers in leaf order.
    pub fn ordered_sample_ids(&self) -> Vec<&str> {
        self.order.iter().map(|&i| self.sample_ids[i].as_str()).collect()
    }

    /// Cut the tree into `k` clusters.
    ///
    /// Returns a 1-based cluster label per sample (input order). Labels are
    /// numbered by first appearance in input order.
    pub fn cut(&self, k: usize) -> Result<Vec<usize>> {
        let n = self.n_samples();
        if k == 0 || k > n {
            return Err(CodaError::InvalidParameter(format!(
                "cannot cut {} samples into {} clusters",
                n, k
            )));
        }

        let mut members: Vec<Vec<usize>> = Vec::with_capacity(n - k);
        for merge in self.merges.iter().take(n - k) {
            let mut joined = members_of(merge.left, &members);
            joined.extend(members_of(merge.right, &members));
            members.push(joined);
        }

        // singletons keep a key of their own; merged samples take their last step
        let mut key: Vec<usize> = (0..n).map(|i| n + i).collect();
        for (step, group) in members.iter().enumerate() {
            for &i in group {
                key[i] = step;
            }
        }

        let mut seen: Vec<usize> = Vec::new();
        let out = key
            .iter()
            .map(|k| match seen.iter().position(|s| s == k) {
                Some(pos) => pos + 1,
                None => {
                    seen.push(*k);
                    seen.len()
                }
            })
            .collect();
        Ok(out)
    }

    /// Write merges as TSV (`step left right height size`).
    pub fn to_tsv<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        writeln!(writer, "step\tleft\tright\theight\tsize")?;
        for (step, m) in self.merges.iter().enumerate() {
            writeln!(
                writer,
                "{}\t{}\t{}\t{:.8}\t{}",
                step + 1,
                m.left,
                m.right,
                m.height,
                m.size
            )?;
        }
        Ok(())
    }

    /// Write the leaf order as TSV (`position sample_index sample_id`).
    pub fn leaf_order_to_tsv<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        writeln!(writer, "position\tsample_index\tsample_id")?;
        for (pos, &i) in self.order.iter().enumerate() {
            writeln!(writer, "{}\t{}\t{}", pos + 1, i, self.sample_ids[i])?;
        }
        Ok(())
    }
}

fn members_of(node: i64, merged: &[Vec<usize>]) -> Vec<usize> {
    if node < 0 {
        vec![(-node - 1) as usize]
    } else {
        merged[node as usize - 1].clone()
    }
}

#[derive(Debug, Clone, Copy)]
struct Active {
    node: i64,
    size: usize,
}

/// Ward linkage over a distance matrix.
pub fn ward_linkage(distances: &DistanceMatrix) -> Result<Dendrogram> {
    let n = distances.n_samples();
    if n == 0 {
        return Err(CodaError::EmptyData(
            "Cannot cluster without samples".to_string(),
        ));
    }

    let mut d2 = vec![vec![0.0f64; n]; n];
    for i in 0..n {
        for j in 0..n {
            let d = distances.get(i, j);
            if !d.is_finite() || d < 0.0 {
                return Err(CodaError::NumericalDegeneracy {
                    stage: STAGE,
                    reason: format!(
                        "invalid distance {} between '{}' and '{}'",
                        d, distances.sample_ids[i], distances.sample_ids[j]
                    ),
                });
            }
            d2[i][j] = d * d;
        }
    }

    let mut slots: Vec<Option<Active>> = (0..n)
        .map(|i| {
            Some(Active {
                node: -(i as i64 + 1),
                size: 1,
            })
        })
        .collect();
    let mut merges = Vec::with_capacity(n.saturating_sub(1));

    for step in 1..n {
        let mut best: Option<(usize, usize, f64)> = None;
        for a in 0..n {
            if slots[a].is_none() {
                continue;
            }
            for b in (a + 1)..n {
                if slots[b].is_none() {
                    continue;
                }
                let cost = d2[a][b];
                if best.map_or(true, |(_, _, c)| cost < c) {
                    best = Some((a, b, cost));
                }
            }
        }
        let (a, b, cost) = best.ok_or_else(|| {
            CodaError::Pipeline("no pair of clusters left to merge".to_string())
        })?;
        let (Some(left), Some(right)) = (slots[a], slots[b]) else {
            return Err(CodaError::Pipeline("inactive cluster selected".to_string()));
        };

        let size = left.size + right.size;
        merges.push(Merge {
            left: left.node,
            right: right.node,
            height: cost.sqrt(),
            size,
        });

        let (na, nb) = (left.size as f64, right.size as f64);
        for k in 0..n {
            if k == a || k == b {
                continue;
            }
            let Some(other) = slots[k] else { continue };
            let nk = other.size as f64;
            let updated =
                ((na + nk) * d2[a][k] + (nb + nk) * d2[b][k] - nk * cost) / (na + nb + nk);
            // clamp rounding below zero
            let updated = updated.max(0.0);
            d2[a][k] = updated;
            d2[k][a] = updated;
        }

        slots[a] = Some(Active {
            node: step as i64,
            size,
        });
        slots[b] = None;
    }

    let order = leaf_order(&merges, n);
    log::debug!("Ward linkage merged {} samples in {} steps", n, merges.len());

    Ok(Dendrogram {
        sample_ids: distances.sample_ids.clone(),
        merges,
        order,
    })
}

/// Left-to-right leaves under the final merge.
fn leaf_order(merges: &[Merge], n: usize) -> Vec<usize> {
    if merges.is_empty() {
        return (0..n).collect();
    }
    let mut order = Vec::with_capacity(n);
    let mut stack = vec![merges.len() as i64];
    while let Some(node) = stack.pop() {
        if node < 0 {
            order.push((-node - 1) as usize);
        } else {
            let m = &merges[node as usize - 1];
            stack.push(m.right);
            stack.push(m.left);
        }
    }
    order
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::distance::euclidean_distances;
    use crate::data::LabeledMatrix;
    use approx::assert_relative_eq;
    use nalgebra::DMatrix;

    fn points(values: &[f64], dims: usize) -> DistanceMatrix {
        let rows = values.len() / dims;
        let m = LabeledMatrix::new(
            DMatrix::from_row_slice(rows, dims, values),
            (0..rows).map(|i| format!("S{}", i)).collect(),
            (0..dims).map(|i| format!("f{}", i)).collect(),
        )
        .unwrap();
        euclidean_distances(&m).unwrap()
    }

    #[test]
    fn test_two_clear_groups() {
        let d = points(&[0.0, 10.0, 1.0, 11.0, 0.5], 1);
        let tree = ward_linkage(&d).unwrap();

        assert_eq!(tree.merges.len(), 4);
        assert_eq!(tree.merges.last().unwrap().size, 5);
        assert_eq!(tree.cut(2).unwrap(), vec![1, 2, 1, 2, 1]);
        assert_eq!(tree.order, vec![0, 4, 2, 1, 3]);
    }

    #[test]
    fn test_first_merge_height_is_distance() {
        let d = points(&[0.0, 3.0, 10.0], 1);
        let tree = ward_linkage(&d).unwrap();
        assert_eq!(tree.merges[0].left, -1);
        assert_eq!(tree.merges[0].right, -2);
        assert_relative_eq!(tree.merges[0].height, 3.0, epsilon = 1e-12);
        // ward.D2: sqrt((2*100 + 2*49 - 9) / 3)
        let expected = ((2.0 * 100.0 + 2.0 * 49.0 - 9.0) / 3.0_f64).sqrt();
        assert_relative_eq!(tree.merges[1].height, expected, epsilon = 1e-12);
        assert_eq!(tree.merges[1].left, 1);
        assert_eq!(tree.merges[1].right, -3);
    }

    #[test]
    fn test_ties_merge_lowest_indices_first() {
        // four corners of a unit square: every side ties
        let d = points(&[0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 1.0, 1.0], 2);
        let tree = ward_linkage(&d).unwrap();
        assert_eq!((tree.merges[0].left, tree.merges[0].right), (-1, -2));
        assert_eq!((tree.merges[1].left, tree.merges[1].right), (-3, -4));
        assert_eq!((tree.merges[2].left, tree.merges[2].right), (1, 2));
        assert_eq!(tree.order, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_heights_non_decreasing() {
        let d = points(
            &[0.3, 1.2, -0.7, 2.2, 0.1, -1.5, 1.9, 0.4, -0.2, 0.0, 2.5, -0.9, 1.1, 1.1],
            2,
        );
        let tree = ward_linkage(&d).unwrap();
        let heights = tree.heights();
        assert!(heights.windows(2).all(|w| w[0] <= w[1] + 1e-12));
    }

    #[test]
    fn test_deterministic() {
        let d = points(&[1.0, 2.0, 2.0, 1.0, 5.0, 5.0, 5.0, 6.0, 0.0, 0.0], 2);
        let a = ward_linkage(&d).unwrap();
        let b = ward_linkage(&d).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_order_is_permutation() {
        let d = points(&[3.0, 1.0, 4.0, 1.0, 5.0, 9.0, 2.0, 6.0], 1);
        let tree = ward_linkage(&d).unwrap();
        let mut sorted = tree.order.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, (0..8).collect::<Vec<_>>());
    }

    #[test]
    fn test_single_sample() {
        let d = points(&[1.0, 2.0], 2);
        let tree = ward_linkage(&d).unwrap();
        assert!(tree.merges.is_empty());
        assert_eq!(tree.order, vec![0]);
        assert_eq!(tree.cut(1).unwrap(), vec![1]);
    }

    #[test]
    fn test_cut_bounds() {
        let d = points(&[0.0, 1.0, 5.0], 1);
        let tree = ward_linkage(&d).unwrap();
        assert!(tree.cut(0).is_err());
        assert!(tree.cut(4).is_err());
        assert_eq!(tree.cut(3).unwrap(), vec![1, 2, 3]);
        assert_eq!(tree.cut(1).unwrap(), vec![1, 1, 1]);
    }
}
