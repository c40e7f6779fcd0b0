//! Cost matrices and linear assignment for track association.

use ndarray::Array2;

use crate::detect::BoundingBox;

/// Cost of pairs that must never be matched.
pub(crate) const FORBIDDEN: f32 = 1.0;

const PADDING_COST: f64 = 1e6;

#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct Assignment {
    pub matches: Vec<(usize, usize)>,
    pub unmatched_tracks: Vec<usize>,
    pub unmatched_detections: Vec<usize>,
}

/// `1 - IoU` for every (track, detection) pair.
pub(crate) fn iou_cost(tracks: &[BoundingBox], detections: &[BoundingBox]) -> Array2<f32> {
    let mut cost = Array2::zeros((tracks.len(), detections.len()));
    for (i, track) in tracks.iter().enumerate() {
        for (j, detection) in detections.iter().enumerate() {
            cost[[i, j]] = 1.0 - track.iou(detection);
        }
    }
    cost
}

/// Weight IoU similarity by detection score.
pub(crate) fn fuse_score(cost: &mut Array2<f32>, scores: &[f32]) {
    let (rows, cols) = cost.dim();
    for i in 0..rows {
        for j in 0..cols {
            let similarity = (1.0 - cost[[i, j]]) * scores[j];
            cost[[i, j]] = 1.0 - similarity;
        }
    }
}

/// Minimum-cost assignment; pairs costing more than `threshold` are left
/// unmatched.
pub(crate) fn linear_assignment(cost: &Array2<f32>, threshold: f32) -> Assignment {
    let (rows, cols) = cost.dim();
    if rows == 0 || cols == 0 {
        return Assignment {
            matches: Vec::new(),
            unmatched_tracks: (0..rows).collect(),
            unmatched_detections: (0..cols).collect(),
        };
    }

    // lapjv wants a square matrix.
    let size = rows.max(cols);
    let mut padded = Array2::<f64>::from_elem((size, size), PADDING_COST);
    for i in 0..rows {
        for j in 0..cols {
            padded[[i, j]] = cost[[i, j]] as f64;
        }
    }

    let mut assignment = Assignment::default();
    let mut detection_free = vec![true; cols];
    match lapjv::lapjv(&padded) {
        Ok((row_to_col, _)) => {
            for (row, &col) in row_to_col.iter().enumerate().take(rows) {
                if col < cols && cost[[row, col]] <= threshold {
                    assignment.matches.push((row, col));
                    detection_free[col] = false;
                } else {
                    assignment.unmatched_tracks.push(row);
                }
            }
        }
        Err(err) => {
            log::warn!("track assignment failed, starting fresh tracks: {:?}", err);
            assignment.unmatched_tracks = (0..rows).collect();
        }
    }
    assignment.unmatched_detections = detection_free
        .iter()
        .enumerate()
        .filter_map(|(j, free)| free.then_some(j))
        .collect();
    assignment
}
