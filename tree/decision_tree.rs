use crate::{
	binning::BinnedFeatures,
	feature_importances::normalize_feature_gains,
	train::{train_tree, GiniCriterion},
	Tree, TreeOptions,
};
use ndarray::prelude::*;
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256Plus;

/// These are the options passed to `DecisionTreeClassifier::train`.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct DecisionTreeOptions {
	pub tree: TreeOptions,
	/// Seeds feature sampling when `tree.max_features` is set.
	pub seed: u64,
}

impl Default for DecisionTreeOptions {
	fn default() -> Self {
		Self {
			tree: TreeOptions::default(),
			seed: 42,
		}
	}
}

/// A single CART classifier. Each leaf holds the class distribution of the training examples that reached it.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct DecisionTreeClassifier {
	pub tree: Tree<Vec<f32>>,
	pub n_classes: usize,
	pub feature_importances: Vec<f32>,
}

impl DecisionTreeClassifier {
	pub fn train(
		features: ArrayView2<f32>,
		labels: ArrayView1<usize>,
		n_classes: usize,
		options: &DecisionTreeOptions,
	) -> DecisionTreeClassifier {
		let labels = labels.to_vec();
		let binned_features = BinnedFeatures::compute(features);
		let criterion = GiniCriterion {
			labels: &labels,
			n_classes,
		};
		let mut examples_index: Vec<usize> = (0..labels.len()).collect();
		let mut rng = Xoshiro256Plus::seed_from_u64(options.seed);
		let trained = train_tree(
			&binned_features,
			&criterion,
			&mut examples_index,
			&options.tree,
			&mut rng,
		);
		DecisionTreeClassifier {
			tree: trained.tree,
			n_classes,
			feature_importances: normalize_feature_gains(&trained.feature_gains),
		}
	}

	pub fn predict_proba(&self, features: ArrayView2<f32>) -> Array2<f32> {
		let mut probabilities = Array2::zeros((features.nrows(), self.n_classes));
		for (features, mut probabilities) in features
			.axis_iter(Axis(0))
			.zip(probabilities.axis_iter_mut(Axis(0)))
		{
			let leaf = self.tree.predict(features);
			for (probability, value) in probabilities.iter_mut().zip(leaf.iter()) {
				*probability = *value;
			}
		}
		probabilities
	}
}

#[test]
fn test_decision_tree() {
	let features = arr2(&[
		[0.0, 0.0],
		[0.0, 1.0],
		[1.0, 0.0],
		[1.0, 1.0],
		[0.0, 0.0],
		[0.0, 1.0],
		[1.0, 0.0],
		[1.0, 1.0],
	]);
	// The label is the logical and of the two features.
	let labels = arr1(&[0, 0, 0, 1, 0, 0, 0, 1]);
	let model =
		DecisionTreeClassifier::train(features.view(), labels.view(), 2, &Default::default());
	let predictions = crate::argmax_rows(model.predict_proba(features.view()).view());
	assert_eq!(predictions, labels);
	let total: f32 = model.feature_importances.iter().sum();
	assert!((total - 1.0).abs() < 1e-5);
}

#[test]
fn test_unseen_values_split_at_the_midpoint() {
	let features = arr2(&[[0.0], [0.0], [10.0], [10.0]]);
	let labels = arr1(&[0, 0, 1, 1]);
	let model =
		DecisionTreeClassifier::train(features.view(), labels.view(), 2, &Default::default());
	let unseen = arr2(&[[1.0], [4.9], [9.0]]);
	let predictions = crate::argmax_rows(model.predict_proba(unseen.view()).view());
	assert_eq!(predictions, arr1(&[0, 0, 1]));
}
