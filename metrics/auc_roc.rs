/// A point on the receiver operating characteristic curve.
#[derive(Debug, Clone, PartialEq)]
pub struct RocCurvePoint {
	/// The classification threshold. Examples with probability >= threshold are predicted positive.
	pub threshold: f32,
	/// The true positive rate at this threshold.
	pub true_positive_rate: f32,
	/// The false positive rate at this threshold.
	pub false_positive_rate: f32,
}

/// This function computes the ROC curve, which plots the false positive rate on the x axis and the true positive rate on the y axis for each distinct classification threshold, ordered from the highest threshold to the lowest. The first point is (0, 0) with a threshold one above the highest probability. If `labels` contains no positives or no negatives, the corresponding rate is NaN.
pub fn compute_roc_curve(probabilities: &[f32], labels: &[bool]) -> Vec<RocCurvePoint> {
	let tps_fps = compute_cumulative_tps_fps(probabilities, labels);
	let count_positives = labels.iter().filter(|label| **label).count();
	let count_negatives = labels.len() - count_positives;
	let max_threshold = tps_fps.first().map(|point| point.threshold).unwrap_or(0.0);
	let mut roc_curve = vec![RocCurvePoint {
		threshold: max_threshold + 1.0,
		true_positive_rate: 0.0,
		false_positive_rate: 0.0,
	}];
	roc_curve.extend(tps_fps.iter().map(|point| RocCurvePoint {
		threshold: point.threshold,
		true_positive_rate: point.true_positives as f32 / count_positives as f32,
		false_positive_rate: point.false_positives as f32 / count_negatives as f32,
	}));
	roc_curve
}

/// This function computes the area under a ROC curve using the trapezoid method.
pub fn auc(roc_curve: &[RocCurvePoint]) -> f32 {
	roc_curve
		.windows(2)
		.map(|window| {
			let left = &window[0];
			let right = &window[1];
			let y_average = (left.true_positive_rate + right.true_positive_rate) / 2.0;
			let dx = right.false_positive_rate - left.false_positive_rate;
			y_average * dx
		})
		.sum()
}

#[derive(Debug)]
pub(crate) struct TpsFpsPoint {
	pub threshold: f32,
	/// The number of positives with probability >= threshold.
	pub true_positives: usize,
	/// The number of negatives with probability >= threshold.
	pub false_positives: usize,
}

/// Sort the examples by descending probability and count the true and false positives at or above each distinct probability.
pub(crate) fn compute_cumulative_tps_fps(probabilities: &[f32], labels: &[bool]) -> Vec<TpsFpsPoint> {
	let mut probabilities_labels: Vec<(f32, bool)> = probabilities
		.iter()
		.copied()
		.zip(labels.iter().copied())
		.collect();
	probabilities_labels.sort_by(|a, b| {
		b.0.partial_cmp(&a.0)
			.unwrap_or(std::cmp::Ordering::Equal)
	});
	let mut tps_fps: Vec<TpsFpsPoint> = Vec::new();
	let mut true_positives = 0;
	let mut false_positives = 0;
	for (probability, label) in probabilities_labels {
		if label {
			true_positives += 1;
		} else {
			false_positives += 1;
		}
		match tps_fps.last_mut() {
			// Examples with the same probability share a single point.
			Some(last) if last.threshold == probability => {
				last.true_positives = true_positives;
				last.false_positives = false_positives;
			}
			_ => tps_fps.push(TpsFpsPoint {
				threshold: probability,
				true_positives,
				false_positives,
			}),
		}
	}
	tps_fps
}

#[test]
fn test_roc_curve() {
	let labels = vec![true, true, false, false];
	let probabilities = vec![0.9, 0.4, 0.4, 0.2];
	let left = compute_roc_curve(probabilities.as_slice(), labels.as_slice());
	let right = vec![
		RocCurvePoint {
			threshold: 1.9,
			true_positive_rate: 0.0,
			false_positive_rate: 0.0,
		},
		RocCurvePoint {
			threshold: 0.9,
			true_positive_rate: 0.5,
			false_positive_rate: 0.0,
		},
		RocCurvePoint {
			threshold: 0.4,
			true_positive_rate: 1.0,
			false_positive_rate: 0.5,
		},
		RocCurvePoint {
			threshold: 0.2,
			true_positive_rate: 1.0,
			false_positive_rate: 1.0,
		},
	];
	assert_eq!(left, right);
	let auc = auc(&left);
	assert!(f32::abs(auc - 0.875) < f32::EPSILON)
}

#[test]
fn test_perfect_separation() {
	let labels = vec![false, false, true, true];
	let probabilities = vec![0.1, 0.2, 0.8, 0.9];
	let curve = compute_roc_curve(&probabilities, &labels);
	assert_eq!(auc(&curve), 1.0);
}

#[test]
fn test_no_positives_is_nan() {
	let curve = compute_roc_curve(&[0.3, 0.6], &[false, false]);
	assert!(curve[1].true_positive_rate.is_nan());
}
