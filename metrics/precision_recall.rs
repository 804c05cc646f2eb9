use super::auc_roc::compute_cumulative_tps_fps;

/// A point on the precision/recall curve.
#[derive(Debug, Clone, PartialEq)]
pub struct PrecisionRecallPoint {
	/// Examples with probability >= threshold are predicted positive.
	pub threshold: f32,
	pub precision: f32,
	pub recall: f32,
}

/// This function computes the precision/recall curve from the highest threshold to the lowest. It starts at (recall 0, precision 1) and stops at the first threshold that reaches full recall, since lower thresholds only add false positives.
pub fn compute_precision_recall_curve(
	probabilities: &[f32],
	labels: &[bool],
) -> Vec<PrecisionRecallPoint> {
	let tps_fps = compute_cumulative_tps_fps(probabilities, labels);
	let count_positives = labels.iter().filter(|label| **label).count();
	let max_threshold = tps_fps.first().map(|point| point.threshold).unwrap_or(0.0);
	let mut curve = vec![PrecisionRecallPoint {
		threshold: max_threshold + 1.0,
		precision: 1.0,
		recall: 0.0,
	}];
	for point in tps_fps.iter() {
		let predicted_positives = point.true_positives + point.false_positives;
		let precision = point.true_positives as f32 / predicted_positives as f32;
		let recall = point.true_positives as f32 / count_positives as f32;
		curve.push(PrecisionRecallPoint {
			threshold: point.threshold,
			precision,
			recall,
		});
		if point.true_positives == count_positives {
			break;
		}
	}
	curve
}

/// The average precision summarizes a precision/recall curve as the sum of precisions weighted by the increase in recall at each threshold.
pub fn average_precision(curve: &[PrecisionRecallPoint]) -> f32 {
	curve
		.windows(2)
		.map(|window| (window[1].recall - window[0].recall) * window[1].precision)
		.sum()
}

#[test]
fn test_precision_recall_curve() {
	let labels = vec![false, false, true, true];
	let probabilities = vec![0.1, 0.4, 0.35, 0.8];
	let curve = compute_precision_recall_curve(&probabilities, &labels);
	let points: Vec<(f32, f32)> = curve
		.iter()
		.map(|point| (point.precision, point.recall))
		.collect();
	assert_eq!(
		points,
		vec![(1.0, 0.0), (1.0, 0.5), (0.5, 0.5), (2.0 / 3.0, 1.0)]
	);
	let average_precision = average_precision(&curve);
	assert!((average_precision - 0.8333333).abs() < 1e-6);
}
