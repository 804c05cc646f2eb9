use super::{mean::Mean, StreamingMetric};
use ndarray::prelude::*;
use num_traits::clamp;

/// CrossEntropy is the loss function used in multiclass classification. [Learn more](https://en.wikipedia.org/wiki/Cross_entropy#Cross-entropy_loss_function_and_logistic_regression).
#[derive(Debug, Clone, Default)]
pub struct CrossEntropy(Mean);

pub struct CrossEntropyInput<'a> {
	/// (n_classes)
	pub probabilities: ArrayView1<'a, f32>,
	/// 0-based class index
	pub label: usize,
}

impl<'a> StreamingMetric<'a> for CrossEntropy {
	type Input = CrossEntropyInput<'a>;
	type Output = Option<f32>;

	fn update(&mut self, value: CrossEntropyInput) {
		let probability = value.probabilities[value.label];
		self.0
			.update(-clamp(probability, f32::EPSILON, 1.0 - f32::EPSILON).ln())
	}

	fn merge(&mut self, other: Self) {
		self.0.merge(other.0)
	}

	fn finalize(self) -> Self::Output {
		self.0.finalize()
	}
}

#[test]
fn test_cross_entropy() {
	let mut metric = CrossEntropy::default();
	let probabilities = arr1(&[0.5, 0.5]);
	metric.update(CrossEntropyInput {
		probabilities: probabilities.view(),
		label: 1,
	});
	let loss = metric.finalize().unwrap();
	assert!((loss - std::f32::consts::LN_2).abs() < 1e-6);
}
