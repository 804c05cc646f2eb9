use super::StreamingMetric;
use ndarray::prelude::*;
use num_traits::ToPrimitive;

/// Accumulates a confusion matrix from (label, prediction) pairs and summarizes it into per-class and averaged precision, recall and f1 scores.
#[derive(Debug, Clone)]
pub struct ClassificationMetrics {
	/// The shape of the confusion matrix is (n_classes x n_classes).
	confusion_matrix: Array2<u64>,
}

#[derive(Debug)]
pub struct ClassificationMetricsOutput {
	//                      label   prediction
	//                        |         |
	//                        v         v
	/// The confusion matrix, indexed by (label, prediction).
	pub confusion_matrix: Array2<u64>,
	pub class_metrics: Vec<ClassMetrics>,
	pub accuracy: f32,
	pub precision_macro: f32,
	pub recall_macro: f32,
	pub f1_score_macro: f32,
	pub precision_weighted: f32,
	pub recall_weighted: f32,
	pub f1_score_weighted: f32,
}

/// Metrics for a single class treated one-vs-rest. A ratio whose denominator is zero is reported as 0.
#[derive(Debug)]
pub struct ClassMetrics {
	pub true_positives: u64,
	pub false_positives: u64,
	pub true_negatives: u64,
	pub false_negatives: u64,
	pub support: u64,
	pub precision: f32,
	pub recall: f32,
	pub f1_score: f32,
}

impl ClassificationMetrics {
	pub fn new(n_classes: usize) -> Self {
		let confusion_matrix = <Array2<u64>>::zeros((n_classes, n_classes));
		Self { confusion_matrix }
	}
}

fn ratio(numerator: u64, denominator: u64) -> f32 {
	if denominator == 0 {
		0.0
	} else {
		numerator.to_f32().unwrap_or(0.0) / denominator.to_f32().unwrap_or(1.0)
	}
}

fn harmonic_mean(precision: f32, recall: f32) -> f32 {
	if precision + recall == 0.0 {
		0.0
	} else {
		2.0 * precision * recall / (precision + recall)
	}
}

impl StreamingMetric<'_> for ClassificationMetrics {
	/// (label, prediction), both 0-based class indexes.
	type Input = (usize, usize);
	type Output = ClassificationMetricsOutput;

	fn update(&mut self, (label, prediction): (usize, usize)) {
		self.confusion_matrix[(label, prediction)] += 1;
	}

	fn merge(&mut self, other: Self) {
		self.confusion_matrix += &other.confusion_matrix;
	}

	fn finalize(self) -> ClassificationMetricsOutput {
		let n_classes = self.confusion_matrix.nrows();
		let n_examples = self.confusion_matrix.sum();
		let confusion_matrix = self.confusion_matrix;
		let class_metrics: Vec<ClassMetrics> = (0..n_classes)
			.map(|class_index| {
				let true_positives = confusion_matrix[(class_index, class_index)];
				let support = confusion_matrix.row(class_index).sum();
				let predicted = confusion_matrix.column(class_index).sum();
				let false_negatives = support - true_positives;
				let false_positives = predicted - true_positives;
				let true_negatives =
					n_examples - true_positives - false_positives - false_negatives;
				let precision = ratio(true_positives, predicted);
				let recall = ratio(true_positives, support);
				let f1_score = harmonic_mean(precision, recall);
				ClassMetrics {
					true_positives,
					false_positives,
					true_negatives,
					false_negatives,
					support,
					precision,
					recall,
					f1_score,
				}
			})
			.collect();
		let n_correct: u64 = confusion_matrix.diag().sum();
		let accuracy = ratio(n_correct, n_examples);
		let n_classes_f32 = n_classes.to_f32().unwrap_or(1.0).max(1.0);
		let macro_average = |f: fn(&ClassMetrics) -> f32| {
			class_metrics.iter().map(f).sum::<f32>() / n_classes_f32
		};
		let weighted_average = |f: fn(&ClassMetrics) -> f32| {
			if n_examples == 0 {
				return 0.0;
			}
			class_metrics
				.iter()
				.map(|class| f(class) * class.support.to_f32().unwrap_or(0.0))
				.sum::<f32>()
				/ n_examples.to_f32().unwrap_or(1.0)
		};
		ClassificationMetricsOutput {
			accuracy,
			precision_macro: macro_average(|class| class.precision),
			recall_macro: macro_average(|class| class.recall),
			f1_score_macro: macro_average(|class| class.f1_score),
			precision_weighted: weighted_average(|class| class.precision),
			recall_weighted: weighted_average(|class| class.recall),
			f1_score_weighted: weighted_average(|class| class.f1_score),
			confusion_matrix,
			class_metrics,
		}
	}
}

#[test]
fn test_binary() {
	let mut metrics = ClassificationMetrics::new(2);
	let labels = [0, 0, 0, 0, 0, 0, 0, 0, 1, 1, 1, 1, 1];
	let predictions = [0, 0, 0, 0, 0, 1, 1, 1, 1, 1, 1, 0, 0];
	for (label, prediction) in labels.iter().zip(predictions.iter()) {
		metrics.update((*label, *prediction));
	}
	let metrics = metrics.finalize();
	assert_eq!(metrics.confusion_matrix, arr2(&[[5, 3], [2, 3]]));
	let cat = &metrics.class_metrics[0];
	assert_eq!(cat.true_positives, 5);
	assert_eq!(cat.false_positives, 2);
	assert_eq!(cat.false_negatives, 3);
	assert_eq!(cat.true_negatives, 3);
	assert_eq!(cat.support, 8);
	assert!((cat.precision - 5.0 / 7.0).abs() < 1e-6);
	assert!((cat.recall - 0.625).abs() < 1e-6);
	let dog = &metrics.class_metrics[1];
	assert!((dog.precision - 0.5).abs() < 1e-6);
	assert!((dog.recall - 0.6).abs() < 1e-6);
	assert!((metrics.accuracy - 8.0 / 13.0).abs() < 1e-6);
	assert!((metrics.precision_macro - (5.0 / 7.0 + 0.5) / 2.0).abs() < 1e-6);
	assert!((metrics.recall_macro - 0.6125).abs() < 1e-6);
}

#[test]
fn test_multiclass() {
	// example taken from https://en.wikipedia.org/wiki/Confusion_matrix
	let mut metrics = ClassificationMetrics::new(3);
	let mut add = |label, prediction, count| {
		for _ in 0..count {
			metrics.update((label, prediction));
		}
	};
	add(0, 0, 5);
	add(0, 1, 3);
	add(1, 0, 2);
	add(1, 1, 3);
	add(1, 2, 1);
	add(2, 1, 2);
	add(2, 2, 11);
	let metrics = metrics.finalize();
	let row_sums: Vec<u64> = metrics.confusion_matrix.sum_axis(Axis(1)).to_vec();
	assert_eq!(row_sums, vec![8, 6, 13]);
	let supports: Vec<u64> = metrics.class_metrics.iter().map(|c| c.support).collect();
	assert_eq!(supports, vec![8, 6, 13]);
	assert!((metrics.accuracy - 19.0 / 27.0).abs() < 1e-6);
	let rabbit = &metrics.class_metrics[2];
	assert!((rabbit.precision - 11.0 / 12.0).abs() < 1e-6);
	assert!((rabbit.recall - 11.0 / 13.0).abs() < 1e-6);
}

#[test]
fn test_class_never_predicted_has_zero_precision() {
	let mut metrics = ClassificationMetrics::new(2);
	metrics.update((0, 0));
	metrics.update((1, 0));
	let metrics = metrics.finalize();
	assert_eq!(metrics.class_metrics[1].precision, 0.0);
	assert_eq!(metrics.class_metrics[1].f1_score, 0.0);
	assert!(metrics.f1_score_macro.is_finite());
}
