use crate::{
	binning::BinnedFeatures,
	feature_importances::{average_feature_importances, normalize_feature_gains},
	train::{train_tree, GiniCriterion},
	Tree, TreeOptions,
};
use ndarray::prelude::*;
use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256Plus;
use rayon::prelude::*;

/// How many features each split considers.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaxFeatures {
	Sqrt,
	Log2,
	All,
	Count(usize),
}

impl MaxFeatures {
	pub fn resolve(&self, n_features: usize) -> usize {
		let n = match self {
			MaxFeatures::Sqrt => (n_features as f64).sqrt().floor() as usize,
			MaxFeatures::Log2 => (n_features as f64).log2().floor() as usize,
			MaxFeatures::All => n_features,
			MaxFeatures::Count(n) => *n,
		};
		n.clamp(1, n_features.max(1))
	}
}

/// These are the options passed to `RandomForestClassifier::train`.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct RandomForestOptions {
	pub n_trees: usize,
	pub tree: TreeOptions,
	pub max_features: MaxFeatures,
	/// Train each tree on a bootstrap sample of the examples instead of all of them.
	pub bootstrap: bool,
	pub seed: u64,
}

impl Default for RandomForestOptions {
	fn default() -> Self {
		Self {
			n_trees: 100,
			tree: TreeOptions::default(),
			max_features: MaxFeatures::Sqrt,
			bootstrap: true,
			seed: 42,
		}
	}
}

/// An ensemble of gini trees trained in parallel. The predicted distribution is the mean of the trees' leaf distributions.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct RandomForestClassifier {
	pub trees: Vec<Tree<Vec<f32>>>,
	pub n_classes: usize,
	pub feature_importances: Vec<f32>,
}

impl RandomForestClassifier {
	pub fn train(
		features: ArrayView2<f32>,
		labels: ArrayView1<usize>,
		n_classes: usize,
		options: &RandomForestOptions,
	) -> RandomForestClassifier {
		let labels = labels.to_vec();
		let n_examples = labels.len();
		let n_features = features.ncols();
		let binned_features = BinnedFeatures::compute(features);
		let tree_options = TreeOptions {
			max_features: Some(options.max_features.resolve(n_features)),
			..options.tree.clone()
		};
		let criterion = GiniCriterion {
			labels: &labels,
			n_classes,
		};
		// Each tree gets its own rng so the forest is the same regardless of how rayon schedules the work.
		let (trees, importances): (Vec<_>, Vec<_>) = (0..options.n_trees.max(1))
			.into_par_iter()
			.map(|tree_index| {
				let mut rng = Xoshiro256Plus::seed_from_u64(options.seed.wrapping_add(tree_index as u64));
				let mut examples_index: Vec<usize> = if options.bootstrap {
					(0..n_examples)
						.map(|_| rng.gen_range(0..n_examples))
						.collect()
				} else {
					(0..n_examples).collect()
				};
				let trained = train_tree(
					&binned_features,
					&criterion,
					&mut examples_index,
					&tree_options,
					&mut rng,
				);
				(trained.tree, normalize_feature_gains(&trained.feature_gains))
			})
			.unzip();
		RandomForestClassifier {
			trees,
			n_classes,
			feature_importances: average_feature_importances(&importances, n_features),
		}
	}

	pub fn predict_proba(&self, features: ArrayView2<f32>) -> Array2<f32> {
		let mut probabilities = Array2::zeros((features.nrows(), self.n_classes));
		for (features, mut probabilities) in features
			.axis_iter(Axis(0))
			.zip(probabilities.axis_iter_mut(Axis(0)))
		{
			for tree in self.trees.iter() {
				for (probability, value) in probabilities.iter_mut().zip(tree.predict(features).iter()) {
					*probability += *value;
				}
			}
		}
		probabilities /= self.trees.len().max(1) as f32;
		probabilities
	}
}

#[test]
fn test_max_features() {
	assert_eq!(MaxFeatures::Sqrt.resolve(10), 3);
	assert_eq!(MaxFeatures::Log2.resolve(10), 3);
	assert_eq!(MaxFeatures::All.resolve(10), 10);
	assert_eq!(MaxFeatures::Count(20).resolve(10), 10);
	assert_eq!(MaxFeatures::Sqrt.resolve(1), 1);
}

#[test]
fn test_random_forest_is_deterministic() {
	let features = Array2::from_shape_fn((60, 3), |(i, j)| ((i * (j + 3)) % 17) as f32);
	let labels: Array1<usize> = (0..60).map(|i| if (i * 3) % 17 > 8 { 1 } else { 0 }).collect();
	let options = RandomForestOptions {
		n_trees: 10,
		..Default::default()
	};
	let a = RandomForestClassifier::train(features.view(), labels.view(), 2, &options);
	let b = RandomForestClassifier::train(features.view(), labels.view(), 2, &options);
	assert_eq!(a, b);
	let probabilities = a.predict_proba(features.view());
	for row in probabilities.rows() {
		assert!((row.sum() - 1.0).abs() < 1e-4);
	}
	let accuracy = crate::argmax_rows(probabilities.view())
		.iter()
		.zip(labels.iter())
		.filter(|(a, b)| a == b)
		.count() as f32
		/ 60.0;
	assert!(accuracy > 0.9);
}
