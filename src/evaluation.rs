use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HoldoutMetrics {
    pub samples: usize,
    pub mae: f64,
    pub rmse: f64,
    pub r2: f64,
}

pub fn evaluate_predictions(predictions: &[f64], targets: &[f64]) -> Option<HoldoutMetrics> {
    if predictions.is_empty() || predictions.len() != targets.len() {
        return None;
    }

    let n = predictions.len() as f64;
    let mean_target = targets.iter().sum::<f64>() / n;
    let mut abs_sum = 0.0_f64;
    let mut sq_sum = 0.0_f64;
    let mut total_sq = 0.0_f64;
    for (p, y) in predictions.iter().zip(targets) {
        let err = p - y;
        abs_sum += err.abs();
        sq_sum += err * err;
        total_sq += (y - mean_target).powi(2);
    }

    // A constant target has no variance to explain.
    let r2 = if total_sq > 0.0 {
        1.0 - sq_sum / total_sq
    } else if sq_sum == 0.0 {
        1.0
    } else {
        0.0
    };

    Some(HoldoutMetrics {
        samples: predictions.len(),
        mae: abs_sum / n,
        rmse: (sq_sum / n).sqrt(),
        r2,
    })
}

#[cfg(test)]
mod tests {
    use super::evaluate_predictions;
    use approx::assert_relative_eq;

    #[test]
    fn perfect_predictions_have_zero_error() {
        let y = vec![150.0, 172.0, 201.0];
        let m = evaluate_predictions(&y, &y).unwrap();
        assert_eq!(m.samples, 3);
        assert!(m.mae < 1e-12);
        assert!(m.rmse < 1e-12);
        assert_relative_eq!(m.r2, 1.0);
    }

    #[test]
    fn mean_predictor_scores_zero_r2() {
        let y = vec![140.0, 160.0, 180.0];
        let p = vec![160.0; 3];
        let m = evaluate_predictions(&p, &y).unwrap();
        assert_relative_eq!(m.r2, 0.0);
        assert_relative_eq!(m.mae, 40.0 / 3.0);
        assert_relative_eq!(m.rmse, (800.0_f64 / 3.0).sqrt());
    }

    #[test]
    fn mismatched_or_empty_input_has_no_metrics() {
        assert!(evaluate_predictions(&[], &[]).is_none());
        assert!(evaluate_predictions(&[1.0], &[1.0, 2.0]).is_none());
    }
}
