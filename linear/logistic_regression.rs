use super::{
	early_stopping::{train_early_stopping_split, EarlyStoppingMonitor},
	softmax, TrainOptions,
};
use ndarray::prelude::*;
use ndarray::Zip;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256Plus;
use workbench_metrics::{CrossEntropy, CrossEntropyInput, StreamingMetric};

/// A multinomial logistic regression model.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct LogisticRegression {
	/// (n_classes)
	pub biases: Array1<f32>,
	/// (n_features, n_classes)
	pub weights: Array2<f32>,
	/// The early stopping loss after each epoch, if early stopping was enabled.
	pub losses: Vec<f32>,
}

impl LogisticRegression {
	/// Train a model. `labels` are 0-based class indexes less than `n_classes`.
	pub fn train(
		features: ArrayView2<f32>,
		labels: ArrayView1<usize>,
		n_classes: usize,
		options: &TrainOptions,
	) -> LogisticRegression {
		let n_features = features.ncols();
		let early_stopping_fraction = options
			.early_stopping_options
			.as_ref()
			.map(|options| options.early_stopping_fraction)
			.unwrap_or(0.0);
		let (features_train, labels_train, features_early_stopping, labels_early_stopping) =
			train_early_stopping_split(features, labels, early_stopping_fraction);
		let mut model = LogisticRegression {
			biases: Array1::<f32>::zeros(n_classes),
			weights: Array2::<f32>::zeros((n_features, n_classes)),
			losses: Vec::new(),
		};
		let mut early_stopping_monitor = match options.early_stopping_options.as_ref() {
			Some(early_stopping_options) if features_early_stopping.nrows() > 0 => {
				Some(EarlyStoppingMonitor::new(
					early_stopping_options.min_decrease_in_loss_for_significant_change,
					early_stopping_options.n_epochs_without_improvement_to_stop,
				))
			}
			_ => None,
		};
		let n_examples_per_batch = options.n_examples_per_batch.max(1);
		let mut rng = Xoshiro256Plus::seed_from_u64(options.seed);
		let mut example_indexes: Vec<usize> = (0..features_train.nrows()).collect();
		for _ in 0..options.max_epochs {
			example_indexes.shuffle(&mut rng);
			for batch_indexes in example_indexes.chunks(n_examples_per_batch) {
				let features = features_train.select(Axis(0), batch_indexes);
				let labels = labels_train.select(Axis(0), batch_indexes);
				model.train_batch(features.view(), labels.view(), options);
			}
			if let Some(early_stopping_monitor) = early_stopping_monitor.as_mut() {
				let loss = model.compute_loss(features_early_stopping, labels_early_stopping);
				model.losses.push(loss);
				if early_stopping_monitor.update(loss) {
					break;
				}
			}
		}
		model
	}

	fn train_batch(
		&mut self,
		features: ArrayView2<f32>,
		labels: ArrayView1<usize>,
		options: &TrainOptions,
	) {
		let learning_rate = options.learning_rate;
		let l2_regularization = options.l2_regularization;
		let n_examples = features.nrows() as f32;
		let mut predictions = features.dot(&self.weights) + &self.biases;
		softmax(predictions.view_mut());
		// The gradient of the cross entropy with respect to the logits is (probability - one_hot(label)).
		for (mut prediction, label) in predictions.rows_mut().into_iter().zip(labels.iter()) {
			prediction[*label] -= 1.0;
		}
		let weight_gradients = features.t().dot(&predictions) / n_examples;
		let bias_gradients = predictions.sum_axis(Axis(0)) / n_examples;
		Zip::from(&mut self.weights)
			.and(&weight_gradients)
			.for_each(|weight, gradient| {
				*weight -= learning_rate * (gradient + l2_regularization * *weight)
			});
		Zip::from(&mut self.biases)
			.and(&bias_gradients)
			.for_each(|bias, gradient| *bias -= learning_rate * gradient);
	}

	fn compute_loss(&self, features: ArrayView2<f32>, labels: ArrayView1<usize>) -> f32 {
		let probabilities = self.predict_proba(features);
		let mut metric = CrossEntropy::default();
		for (probabilities, label) in probabilities.rows().into_iter().zip(labels.iter()) {
			metric.update(CrossEntropyInput {
				probabilities,
				label: *label,
			});
		}
		metric.finalize().unwrap_or(0.0)
	}

	/// Compute class probabilities, one row per example.
	pub fn predict_proba(&self, features: ArrayView2<f32>) -> Array2<f32> {
		let mut probabilities = Array2::<f32>::zeros((features.nrows(), self.biases.len()));
		for mut row in probabilities.rows_mut() {
			row.assign(&self.biases);
		}
		ndarray::linalg::general_mat_mul(1.0, &features, &self.weights, 1.0, &mut probabilities);
		softmax(probabilities.view_mut());
		probabilities
	}

	/// The coefficients with shape (n_classes, n_features).
	pub fn coefficients(&self) -> Array2<f32> {
		self.weights.t().to_owned()
	}
}

#[test]
fn test_separable() {
	let features = arr2(&[
		[-2.0, 0.1],
		[-1.5, -0.2],
		[-1.0, 0.3],
		[-1.2, 0.0],
		[1.0, 0.2],
		[1.5, -0.1],
		[2.0, 0.0],
		[1.2, 0.1],
	]);
	let labels = arr1(&[0, 0, 0, 0, 1, 1, 1, 1]);
	let options = TrainOptions {
		early_stopping_options: None,
		max_epochs: 200,
		n_examples_per_batch: 4,
		..Default::default()
	};
	let model = LogisticRegression::train(features.view(), labels.view(), 2, &options);
	let probabilities = model.predict_proba(features.view());
	for (row, label) in probabilities.rows().into_iter().zip(labels.iter()) {
		assert!(row[*label] > 0.5);
		assert!((row.sum() - 1.0).abs() < 1e-5);
	}
	let coefficients = model.coefficients();
	assert_eq!(coefficients.dim(), (2, 2));
	// The first feature separates the classes, so it carries the larger weight.
	assert!(coefficients[(1, 0)].abs() > coefficients[(1, 1)].abs());
}

#[test]
fn test_deterministic() {
	let features = arr2(&[[0.0, 1.0], [1.0, 0.0], [0.5, 0.5], [0.9, 0.2], [0.1, 0.8]]);
	let labels = arr1(&[0, 1, 0, 1, 0]);
	let options = TrainOptions {
		max_epochs: 20,
		..Default::default()
	};
	let a = LogisticRegression::train(features.view(), labels.view(), 2, &options);
	let b = LogisticRegression::train(features.view(), labels.view(), 2, &options);
	assert_eq!(a, b);
}
