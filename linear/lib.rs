/*!
This crate implements multinomial logistic regression, a linear classifier that trains `n_classes` linear models whose outputs are combined with the `softmax` function. Binary problems are handled the same way with two classes.

Training uses mini-batch gradient descent over a seeded shuffle of the examples, so the same data and seed always produce the same model. A fraction of the training data can be held out to monitor the cross entropy after each epoch and stop once it stops improving.
*/

use ndarray::prelude::*;

mod early_stopping;
mod logistic_regression;

pub use self::early_stopping::{train_early_stopping_split, EarlyStoppingMonitor};
pub use self::logistic_regression::LogisticRegression;

/// These are the options passed to `LogisticRegression::train`.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TrainOptions {
	/// Specify options for early stopping. If the value is `Some`, early stopping will be enabled. If it is `None`, early stopping will be disabled.
	pub early_stopping_options: Option<EarlyStoppingOptions>,
	/// This is the L2 regularization value to use when updating the model parameters.
	pub l2_regularization: f32,
	/// This is the learning rate to use when updating the model parameters.
	pub learning_rate: f32,
	/// This is the maximum number of epochs to train.
	pub max_epochs: usize,
	/// This is the number of examples to use for each batch of training.
	pub n_examples_per_batch: usize,
	/// Seeds the shuffle of the examples before each epoch.
	pub seed: u64,
}

impl Default for TrainOptions {
	fn default() -> Self {
		Self {
			l2_regularization: 0.0001,
			learning_rate: 0.1,
			max_epochs: 1000,
			n_examples_per_batch: 32,
			seed: 42,
			early_stopping_options: Some(EarlyStoppingOptions::default()),
		}
	}
}

/// The parameters in this struct control how to determine whether training should stop early after each epoch.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct EarlyStoppingOptions {
	/// This is the fraction of the dataset that is set aside to compute the early stopping metric.
	pub early_stopping_fraction: f32,
	/// If this many epochs pass by without a significant improvement in the early stopping metric over the previous epoch, training will be stopped early.
	pub n_epochs_without_improvement_to_stop: usize,
	/// This is the minimum descrease in the early stopping metric for an epoch to be considered a significant improvement over the previous epoch.
	pub min_decrease_in_loss_for_significant_change: f32,
}

impl Default for EarlyStoppingOptions {
	fn default() -> Self {
		Self {
			early_stopping_fraction: 0.1,
			n_epochs_without_improvement_to_stop: 5,
			min_decrease_in_loss_for_significant_change: 1e-4,
		}
	}
}

/// Apply the softmax function to each row of `logits` in place.
pub fn softmax(mut logits: ArrayViewMut2<f32>) {
	for mut logits in logits.rows_mut() {
		let max = logits.iter().fold(f32::MIN, |a, &b| a.max(b));
		logits -= max;
		logits.mapv_inplace(|l| l.exp());
		let sum = logits.iter().fold(0.0, |a, b| a + b);
		logits /= sum;
	}
}

#[test]
fn test_softmax() {
	let mut logits = arr2(&[[0.0, 0.0], [1000.0, 0.0]]);
	softmax(logits.view_mut());
	assert_eq!(logits.row(0).to_vec(), vec![0.5, 0.5]);
	assert_eq!(logits.row(1).to_vec(), vec![1.0, 0.0]);
}
