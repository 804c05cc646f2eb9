/*!
This crate implements Gaussian naive Bayes. Each class is modeled by its prior and an independent normal distribution per feature. To keep the likelihoods finite, `var_smoothing` times the largest feature variance is added to every class variance.
*/

use ndarray::prelude::*;
use std::f64::consts::PI;
use workbench_metrics::{MeanVariance, Metric};

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct NaiveBayesOptions {
	pub var_smoothing: f64,
}

impl Default for NaiveBayesOptions {
	fn default() -> Self {
		Self {
			var_smoothing: 1e-9,
		}
	}
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct GaussianNaiveBayes {
	/// (n_classes)
	pub log_priors: Vec<f64>,
	/// (n_classes, n_features)
	pub means: Array2<f64>,
	/// (n_classes, n_features)
	pub variances: Array2<f64>,
}

impl GaussianNaiveBayes {
	pub fn train(
		features: ArrayView2<f32>,
		labels: ArrayView1<usize>,
		n_classes: usize,
		options: &NaiveBayesOptions,
	) -> GaussianNaiveBayes {
		let n_features = features.ncols();
		let max_variance = features
			.axis_iter(Axis(1))
			.filter_map(|column| MeanVariance::compute(column.to_vec().as_slice()))
			.map(|output| f64::from(output.variance))
			.fold(0.0, f64::max);
		let epsilon = options.var_smoothing * max_variance;
		let mut counts = vec![0usize; n_classes];
		for label in labels.iter() {
			counts[*label] += 1;
		}
		let n_examples = labels.len().max(1) as f64;
		let log_priors = counts
			.iter()
			.map(|count| (*count as f64 / n_examples).ln())
			.collect();
		let mut means = Array2::zeros((n_classes, n_features));
		let mut variances = Array2::from_elem((n_classes, n_features), epsilon);
		for class_index in 0..n_classes {
			let rows: Vec<usize> = labels
				.iter()
				.enumerate()
				.filter(|(_, label)| **label == class_index)
				.map(|(index, _)| index)
				.collect();
			let class_features = features.select(Axis(0), &rows);
			for (feature_index, column) in class_features.axis_iter(Axis(1)).enumerate() {
				if let Some(output) = MeanVariance::compute(column.to_vec().as_slice()) {
					means[[class_index, feature_index]] = f64::from(output.mean);
					variances[[class_index, feature_index]] += f64::from(output.variance);
				}
			}
		}
		// A zero variance would make every likelihood infinite or zero.
		variances.mapv_inplace(|variance| if variance > 0.0 { variance } else { f64::EPSILON });
		GaussianNaiveBayes {
			log_priors,
			means,
			variances,
		}
	}

	/// The joint log likelihood of each class, with shape (n_examples, n_classes).
	pub fn joint_log_likelihood(&self, features: ArrayView2<f32>) -> Array2<f64> {
		let n_classes = self.log_priors.len();
		let mut output = Array2::zeros((features.nrows(), n_classes));
		for (example, mut output) in features.axis_iter(Axis(0)).zip(output.axis_iter_mut(Axis(0))) {
			for (class_index, value) in output.iter_mut().enumerate() {
				let mut log_likelihood = self.log_priors[class_index];
				for ((x, mean), variance) in example
					.iter()
					.zip(self.means.row(class_index))
					.zip(self.variances.row(class_index))
				{
					let x = if x.is_finite() { f64::from(*x) } else { *mean };
					log_likelihood -= 0.5 * (2.0 * PI * variance).ln();
					log_likelihood -= (x - mean).powi(2) / (2.0 * variance);
				}
				*value = log_likelihood;
			}
		}
		output
	}

	pub fn predict_proba(&self, features: ArrayView2<f32>) -> Array2<f32> {
		let joint = self.joint_log_likelihood(features);
		let mut probabilities = Array2::zeros(joint.dim());
		for (joint, mut probabilities) in joint.axis_iter(Axis(0)).zip(probabilities.axis_iter_mut(Axis(0))) {
			// Normalize with log-sum-exp.
			let max = joint.iter().copied().fold(f64::NEG_INFINITY, f64::max);
			let sum: f64 = joint.iter().map(|value| (value - max).exp()).sum();
			let log_normalizer = max + sum.ln();
			for (probability, value) in probabilities.iter_mut().zip(joint.iter()) {
				*probability = (value - log_normalizer).exp() as f32;
			}
		}
		probabilities
	}
}

#[test]
fn test_gaussian_naive_bayes() {
	let features = arr2(&[
		[-2.0, -1.0],
		[-1.0, -1.0],
		[-1.0, -2.0],
		[1.0, 1.0],
		[1.0, 2.0],
		[2.0, 1.0],
	]);
	let labels = arr1(&[0, 0, 0, 1, 1, 1]);
	let model =
		GaussianNaiveBayes::train(features.view(), labels.view(), 2, &NaiveBayesOptions::default());
	assert!((model.means[[0, 0]] - (-4.0 / 3.0)).abs() < 1e-6);
	assert_eq!(model.log_priors, vec![0.5f64.ln(), 0.5f64.ln()]);
	let probabilities = model.predict_proba(arr2(&[[-0.8, -1.0], [3.0, 3.0]]).view());
	assert!(probabilities[[0, 0]] > 0.99);
	assert!(probabilities[[1, 1]] > 0.99);
	for row in probabilities.rows() {
		assert!((row.sum() - 1.0).abs() < 1e-5);
	}
}

#[test]
fn test_constant_feature() {
	let features = arr2(&[[1.0, 0.0], [1.0, 1.0], [1.0, 5.0], [1.0, 6.0]]);
	let labels = arr1(&[0, 0, 1, 1]);
	let model =
		GaussianNaiveBayes::train(features.view(), labels.view(), 2, &NaiveBayesOptions::default());
	let probabilities = model.predict_proba(features.view());
	assert!(probabilities.iter().all(|p| p.is_finite()));
	assert!(probabilities[[0, 0]] > 0.5);
	assert!(probabilities[[3, 1]] > 0.5);
}
