use crate::config::DetectionConfig;
use crate::error::{CacheError, Result};
use ndarray::{ArrayView4, Axis};

/// Turn a raw detection tensor into pixel boxes.
///
/// `detections` is `1 x classes x top_k x 5` with rows `[score, x1, y1, x2, y2]`
/// in normalized coordinates, sorted by score within each class. `size` is the
/// (width, height) of the tensor that was fed to the network, `pad` the
/// padding that was added to it.
pub fn decode(
    detections: ArrayView4<'_, f32>,
    size: (usize, usize),
    pad: (usize, usize),
    config: &DetectionConfig,
) -> Result<Vec<[f32; 4]>> {
    let shape = detections.shape();
    if shape[0] != 1 || shape[3] != 5 {
        return Err(CacheError::InvalidDetectionShape(shape.to_vec()));
    }

    let (width, height) = (size.0 as f32, size.1 as f32);
    let (pad_x, pad_y) = (pad.0 as f32, pad.1 as f32);
    let mut boxes = Vec::new();

    let batch = detections.index_axis(Axis(0), 0);
    for class in batch.outer_iter() {
        for row in class.outer_iter() {
            let score = row[0];
            if score < config.conf_thresh {
                break;
            }
            if score <= config.score_thresh {
                continue;
            }
            boxes.push([
                row[1] * width - pad_x,
                row[2] * height - pad_y,
                row[3] * width - pad_x,
                row[4] * height - pad_y,
            ]);
        }
    }

    Ok(boxes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array4;

    fn tensor(classes: Vec<Vec<[f32; 5]>>, top_k: usize) -> Array4<f32> {
        let mut t = Array4::<f32>::zeros((1, classes.len(), top_k, 5));
        for (c, rows) in classes.iter().enumerate() {
            for (j, row) in rows.iter().enumerate() {
                for (k, v) in row.iter().enumerate() {
                    t[[0, c, j, k]] = *v;
                }
            }
        }
        t
    }

    #[test]
    fn test_scales_and_filters() {
        let t = tensor(
            vec![
                vec![],
                vec![
                    [0.99, 0.125, 0.25, 0.375, 0.5],
                    [0.6, 0.5, 0.5, 0.75, 1.0],
                    [0.3, 0.0, 0.0, 1.0, 1.0],
                    [0.01, 0.0, 0.0, 1.0, 1.0],
                ],
            ],
            6,
        );

        let boxes = decode(t.view(), (200, 100), (0, 0), &DetectionConfig::default()).unwrap();
        assert_eq!(boxes, vec![[25.0, 25.0, 75.0, 50.0], [100.0, 50.0, 150.0, 100.0]]);
    }

    #[test]
    fn test_stops_at_first_low_candidate() {
        // Rows after a sub-threshold candidate are never read
        let t = tensor(vec![vec![[0.9, 0.0, 0.0, 0.5, 0.5], [0.01, 0.0, 0.0, 0.5, 0.5], [0.9, 0.5, 0.5, 1.0, 1.0]]], 3);
        let boxes = decode(t.view(), (10, 10), (0, 0), &DetectionConfig::default()).unwrap();
        assert_eq!(boxes, vec![[0.0, 0.0, 5.0, 5.0]]);
    }

    #[test]
    fn test_score_threshold_is_strict() {
        let t = tensor(vec![vec![[0.5, 0.0, 0.0, 1.0, 1.0]]], 1);
        let boxes = decode(t.view(), (10, 10), (0, 0), &DetectionConfig::default()).unwrap();
        assert!(boxes.is_empty());
    }

    #[test]
    fn test_full_class_is_bounded() {
        let t = tensor(vec![vec![[0.9, 0.0, 0.0, 1.0, 1.0]; 2]], 2);
        let boxes = decode(t.view(), (4, 4), (0, 0), &DetectionConfig::default()).unwrap();
        assert_eq!(boxes.len(), 2);
    }

    #[test]
    fn test_removes_padding_offset() {
        let t = tensor(vec![vec![[0.8, 0.25, 0.25, 0.75, 0.75]]], 1);
        let boxes = decode(t.view(), (40, 20), (10, 5), &DetectionConfig::default()).unwrap();
        assert_eq!(boxes, vec![[0.0, 0.0, 20.0, 10.0]]);
    }

    #[test]
    fn test_rejects_bad_shape() {
        let t = Array4::<f32>::zeros((1, 2, 3, 4));
        let result = decode(t.view(), (4, 4), (0, 0), &DetectionConfig::default());
        assert!(matches!(result, Err(CacheError::InvalidDetectionShape(_))));
    }
}
