use crate::{
	binning::BinnedFeatures,
	feature_importances::normalize_feature_gains,
	train::{train_tree, GradientCriterion},
	Node, Tree, TreeOptions,
};
use ndarray::prelude::*;
use num_traits::clamp;
use rand::{seq::index::sample, SeedableRng};
use rand_xoshiro::Xoshiro256Plus;
use rayon::prelude::*;
use workbench_linear::softmax;

/// These are the options passed to `GradientBoostingClassifier::train`.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct GradientBoostingOptions {
	/// The number of boosting rounds. Each round trains one tree for binary problems and one tree per class otherwise.
	pub n_rounds: usize,
	/// Every leaf value is multiplied by this before it is added to the model.
	pub learning_rate: f32,
	pub tree: TreeOptions,
	/// The L2 regularization added to the sum of hessians in the split score and leaf values.
	pub l2_regularization: f32,
	/// The fraction of examples each round trains on, sampled without replacement.
	pub subsample: f32,
	/// A split is only valid if each child's sum of hessians is at least this.
	pub min_sum_hessians_per_leaf: f32,
	pub seed: u64,
}

impl Default for GradientBoostingOptions {
	fn default() -> Self {
		Self {
			n_rounds: 100,
			learning_rate: 0.1,
			tree: TreeOptions {
				max_depth: Some(3),
				max_leaf_nodes: Some(8),
				..Default::default()
			},
			l2_regularization: 0.0,
			subsample: 1.0,
			min_sum_hessians_per_leaf: 1e-3,
			seed: 42,
		}
	}
}

/// Gradient boosted trees minimizing the log loss. Binary problems boost a single logit passed through the sigmoid. Multiclass problems boost one logit per class passed through the softmax.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct GradientBoostingClassifier {
	/// The initial logits, computed from the class distribution of the training labels.
	pub biases: Vec<f32>,
	/// The trees in round-major order, `n_trees_per_round` per round.
	pub trees: Vec<Tree<f32>>,
	pub n_classes: usize,
	pub n_rounds: usize,
	pub feature_importances: Vec<f32>,
	/// The training loss after each round.
	pub losses: Vec<f32>,
}

impl GradientBoostingClassifier {
	pub fn train(
		features: ArrayView2<f32>,
		labels: ArrayView1<usize>,
		n_classes: usize,
		options: &GradientBoostingOptions,
	) -> GradientBoostingClassifier {
		let n_examples = labels.len();
		let n_features = features.ncols();
		let n_trees_per_round = n_trees_per_round(n_classes);
		let binned_features = BinnedFeatures::compute(features);
		let biases = compute_biases(labels, n_classes);
		let mut logits = Array2::from_shape_fn((n_examples, n_trees_per_round), |(_, k)| biases[k]);
		let mut gradients = vec![vec![0.0; n_examples]; n_trees_per_round];
		let mut hessians = vec![vec![0.0; n_examples]; n_trees_per_round];
		let mut trees = Vec::with_capacity(options.n_rounds * n_trees_per_round);
		let mut feature_gains = vec![0.0; n_features];
		let mut losses = Vec::with_capacity(options.n_rounds);
		let mut rng = Xoshiro256Plus::seed_from_u64(options.seed);
		let n_examples_per_round =
			((n_examples as f32 * clamp(options.subsample, 0.0, 1.0)).ceil() as usize).max(1);
		for round_index in 0..options.n_rounds {
			update_gradients_and_hessians(
				&mut gradients,
				&mut hessians,
				labels,
				logits.view(),
			);
			let round_examples: Vec<usize> = if n_examples_per_round < n_examples {
				let mut examples = sample(&mut rng, n_examples, n_examples_per_round).into_vec();
				examples.sort_unstable();
				examples
			} else {
				(0..n_examples).collect()
			};
			// Train the trees for this round in parallel, one per logit.
			let round_trees: Vec<_> = (0..n_trees_per_round)
				.into_par_iter()
				.map(|tree_index| {
					let criterion = GradientCriterion {
						gradients: &gradients[tree_index],
						hessians: &hessians[tree_index],
						l2_regularization: f64::from(options.l2_regularization),
						min_sum_hessians_per_leaf: f64::from(options.min_sum_hessians_per_leaf),
					};
					let seed = options
						.seed
						.wrapping_add((round_index * n_trees_per_round + tree_index) as u64);
					let mut tree_rng = Xoshiro256Plus::seed_from_u64(seed);
					let mut examples_index = round_examples.clone();
					let mut trained = train_tree(
						&binned_features,
						&criterion,
						&mut examples_index,
						&options.tree,
						&mut tree_rng,
					);
					scale_leaves(&mut trained.tree, options.learning_rate);
					trained
				})
				.collect();
			for (tree_index, trained) in round_trees.into_iter().enumerate() {
				for (example_index, features) in features.axis_iter(Axis(0)).enumerate() {
					logits[[example_index, tree_index]] += *trained.tree.predict(features);
				}
				for (total, gain) in feature_gains.iter_mut().zip(trained.feature_gains.iter()) {
					*total += gain;
				}
				trees.push(trained.tree);
			}
			losses.push(compute_loss(labels, logits.view()));
		}
		GradientBoostingClassifier {
			biases: biases.to_vec(),
			trees,
			n_classes,
			n_rounds: options.n_rounds,
			feature_importances: normalize_feature_gains(&feature_gains),
			losses,
		}
	}

	pub fn predict_proba(&self, features: ArrayView2<f32>) -> Array2<f32> {
		let n_trees_per_round = n_trees_per_round(self.n_classes);
		let mut logits =
			Array2::from_shape_fn((features.nrows(), n_trees_per_round), |(_, k)| self.biases[k]);
		for (features, mut logits) in features.axis_iter(Axis(0)).zip(logits.axis_iter_mut(Axis(0))) {
			for round in self.trees.chunks(n_trees_per_round) {
				for (logit, tree) in logits.iter_mut().zip(round.iter()) {
					*logit += *tree.predict(features);
				}
			}
		}
		logits_to_probabilities(logits, self.n_classes)
	}
}

fn n_trees_per_round(n_classes: usize) -> usize {
	if n_classes <= 2 {
		1
	} else {
		n_classes
	}
}

fn scale_leaves(tree: &mut Tree<f32>, learning_rate: f32) {
	for node in tree.nodes.iter_mut() {
		if let Node::Leaf(leaf) = node {
			leaf.value *= learning_rate;
		}
	}
}

fn sigmoid(logit: f32) -> f32 {
	1.0 / (1.0 + (-logit).exp())
}

fn logits_to_probabilities(mut logits: Array2<f32>, n_classes: usize) -> Array2<f32> {
	if n_classes <= 2 {
		let mut probabilities = Array2::zeros((logits.nrows(), 2));
		for (mut probabilities, logit) in probabilities.axis_iter_mut(Axis(0)).zip(logits.column(0)) {
			let probability = sigmoid(*logit);
			probabilities[0] = 1.0 - probability;
			probabilities[1] = probability;
		}
		probabilities
	} else {
		softmax(logits.view_mut());
		logits
	}
}

/// Compute the biases. For binary problems this is the log odds of the positive class. Otherwise it is the log of each class's prior.
fn compute_biases(labels: ArrayView1<usize>, n_classes: usize) -> Array1<f32> {
	let mut counts: Array1<f32> = Array::zeros(n_classes.max(2));
	for label in labels {
		counts[*label] += 1.0;
	}
	let n_examples = labels.len().max(1) as f32;
	let priors = counts.mapv(|count| clamp(count / n_examples, f32::EPSILON, 1.0 - f32::EPSILON));
	if n_classes <= 2 {
		arr1(&[(priors[1] / (1.0 - priors[1])).ln()])
	} else {
		priors.mapv(f32::ln)
	}
}

/// Compute the gradients and hessians of the log loss for each example given the labels and current logits.
fn update_gradients_and_hessians(
	gradients: &mut [Vec<f32>],
	hessians: &mut [Vec<f32>],
	labels: ArrayView1<usize>,
	logits: ArrayView2<f32>,
) {
	let n_trees_per_round = logits.ncols();
	for (example_index, (label, logits)) in labels.iter().zip(logits.axis_iter(Axis(0))).enumerate() {
		if n_trees_per_round == 1 {
			let probability = sigmoid(logits[0]);
			let target = if *label == 1 { 1.0 } else { 0.0 };
			gradients[0][example_index] = probability - target;
			hessians[0][example_index] = probability * (1.0 - probability);
		} else {
			let mut probabilities = logits.to_owned().insert_axis(Axis(0));
			softmax(probabilities.view_mut());
			for (class_index, probability) in probabilities.iter().enumerate() {
				let target = if *label == class_index { 1.0 } else { 0.0 };
				gradients[class_index][example_index] = probability - target;
				hessians[class_index][example_index] = probability * (1.0 - probability);
			}
		}
	}
}

/// Compute the cross entropy loss.
fn compute_loss(labels: ArrayView1<usize>, logits: ArrayView2<f32>) -> f32 {
	let n_classes = if logits.ncols() == 1 { 2 } else { logits.ncols() };
	let probabilities = logits_to_probabilities(logits.to_owned(), n_classes);
	let mut loss = 0.0;
	for (label, probabilities) in labels.iter().zip(probabilities.axis_iter(Axis(0))) {
		let probability = clamp(probabilities[*label], f32::EPSILON, 1.0 - f32::EPSILON);
		loss -= probability.ln();
	}
	loss / labels.len().max(1) as f32
}

#[cfg(test)]
fn blobs(n_classes: usize, n_per_class: usize) -> (Array2<f32>, Array1<usize>) {
	let n = n_classes * n_per_class;
	let features = Array2::from_shape_fn((n, 2), |(i, j)| {
		let class = (i / n_per_class) as f32;
		let jitter = ((i * 7 + j * 3) % 10) as f32 / 10.0;
		class * 3.0 + jitter
	});
	let labels = (0..n).map(|i| i / n_per_class).collect();
	(features, labels)
}

#[test]
fn test_binary_gradient_boosting() {
	let (features, labels) = blobs(2, 20);
	let options = GradientBoostingOptions {
		n_rounds: 20,
		..Default::default()
	};
	let model = GradientBoostingClassifier::train(features.view(), labels.view(), 2, &options);
	assert_eq!(model.trees.len(), 20);
	assert!(model.losses.last().unwrap() < model.losses.first().unwrap());
	let probabilities = model.predict_proba(features.view());
	assert_eq!(probabilities.ncols(), 2);
	assert_eq!(crate::argmax_rows(probabilities.view()), labels);
}

#[test]
fn test_multiclass_gradient_boosting() {
	let (features, labels) = blobs(3, 15);
	let options = GradientBoostingOptions {
		n_rounds: 10,
		..Default::default()
	};
	let model = GradientBoostingClassifier::train(features.view(), labels.view(), 3, &options);
	assert_eq!(model.trees.len(), 30);
	let probabilities = model.predict_proba(features.view());
	for row in probabilities.rows() {
		assert!((row.sum() - 1.0).abs() < 1e-4);
	}
	assert_eq!(crate::argmax_rows(probabilities.view()), labels);
	let subsampled = GradientBoostingOptions {
		subsample: 0.8,
		..options
	};
	let a = GradientBoostingClassifier::train(features.view(), labels.view(), 3, &subsampled);
	let b = GradientBoostingClassifier::train(features.view(), labels.view(), 3, &subsampled);
	assert_eq!(a, b);
}
