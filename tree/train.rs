use crate::{binning::BinnedFeatures, BranchNode, LeafNode, Node, Tree, TreeOptions};
use rand::seq::index::sample;
use rand_xoshiro::Xoshiro256Plus;
use std::{cmp::Ordering, collections::BinaryHeap, ops::Range};

/// Splits must improve the criterion by more than this to be taken.
const MIN_GAIN_TO_SPLIT: f64 = 1e-9;

/// A `Criterion` defines the statistics accumulated for the examples in a node, how good those statistics are, and what value a leaf holding them predicts. The gain of a split is `score(left) + score(right) - score(parent)`.
pub trait Criterion: Sync {
	type Stats: Clone;
	type Leaf;
	fn empty_stats(&self) -> Self::Stats;
	fn add_example(&self, stats: &mut Self::Stats, example_index: usize);
	fn add_stats(&self, stats: &mut Self::Stats, other: &Self::Stats);
	fn subtract_stats(&self, total: &Self::Stats, part: &Self::Stats) -> Self::Stats;
	fn n_examples(&self, stats: &Self::Stats) -> usize;
	fn score(&self, stats: &Self::Stats) -> f64;
	fn is_valid_child(&self, _stats: &Self::Stats) -> bool {
		true
	}
	fn leaf_value(&self, stats: &Self::Stats) -> Self::Leaf;
}

/// Gini impurity for classification. Stats are the (possibly repeated, for bootstrap samples) class counts of the examples in a node.
pub struct GiniCriterion<'a> {
	pub labels: &'a [usize],
	pub n_classes: usize,
}

#[derive(Clone, Debug)]
pub struct ClassCounts {
	counts: Vec<f64>,
	n: usize,
}

impl<'a> Criterion for GiniCriterion<'a> {
	type Stats = ClassCounts;
	type Leaf = Vec<f32>;

	fn empty_stats(&self) -> ClassCounts {
		ClassCounts {
			counts: vec![0.0; self.n_classes],
			n: 0,
		}
	}

	fn add_example(&self, stats: &mut ClassCounts, example_index: usize) {
		stats.counts[self.labels[example_index]] += 1.0;
		stats.n += 1;
	}

	fn add_stats(&self, stats: &mut ClassCounts, other: &ClassCounts) {
		for (a, b) in stats.counts.iter_mut().zip(other.counts.iter()) {
			*a += b;
		}
		stats.n += other.n;
	}

	fn subtract_stats(&self, total: &ClassCounts, part: &ClassCounts) -> ClassCounts {
		ClassCounts {
			counts: total
				.counts
				.iter()
				.zip(part.counts.iter())
				.map(|(a, b)| a - b)
				.collect(),
			n: total.n - part.n,
		}
	}

	fn n_examples(&self, stats: &ClassCounts) -> usize {
		stats.n
	}

	/// The negated, count weighted gini impurity: sum(c^2) / n - n.
	fn score(&self, stats: &ClassCounts) -> f64 {
		if stats.n == 0 {
			return 0.0;
		}
		let n = stats.n as f64;
		stats.counts.iter().map(|c| c * c).sum::<f64>() / n - n
	}

	fn leaf_value(&self, stats: &ClassCounts) -> Vec<f32> {
		let n = stats.n.max(1) as f64;
		stats.counts.iter().map(|c| (c / n) as f32).collect()
	}
}

/// Second order gradient statistics for boosting. The leaf value is the Newton step `-G / (H + l2)`.
pub struct GradientCriterion<'a> {
	pub gradients: &'a [f32],
	pub hessians: &'a [f32],
	pub l2_regularization: f64,
	pub min_sum_hessians_per_leaf: f64,
}

#[derive(Clone, Debug)]
pub struct GradientSums {
	sum_gradients: f64,
	sum_hessians: f64,
	n: usize,
}

impl<'a> Criterion for GradientCriterion<'a> {
	type Stats = GradientSums;
	type Leaf = f32;

	fn empty_stats(&self) -> GradientSums {
		GradientSums {
			sum_gradients: 0.0,
			sum_hessians: 0.0,
			n: 0,
		}
	}

	fn add_example(&self, stats: &mut GradientSums, example_index: usize) {
		stats.sum_gradients += f64::from(self.gradients[example_index]);
		stats.sum_hessians += f64::from(self.hessians[example_index]);
		stats.n += 1;
	}

	fn add_stats(&self, stats: &mut GradientSums, other: &GradientSums) {
		stats.sum_gradients += other.sum_gradients;
		stats.sum_hessians += other.sum_hessians;
		stats.n += other.n;
	}

	fn subtract_stats(&self, total: &GradientSums, part: &GradientSums) -> GradientSums {
		GradientSums {
			sum_gradients: total.sum_gradients - part.sum_gradients,
			sum_hessians: total.sum_hessians - part.sum_hessians,
			n: total.n - part.n,
		}
	}

	fn n_examples(&self, stats: &GradientSums) -> usize {
		stats.n
	}

	fn score(&self, stats: &GradientSums) -> f64 {
		stats.sum_gradients * stats.sum_gradients
			/ (stats.sum_hessians + self.l2_regularization).max(f64::EPSILON)
	}

	fn is_valid_child(&self, stats: &GradientSums) -> bool {
		stats.sum_hessians >= self.min_sum_hessians_per_leaf
	}

	fn leaf_value(&self, stats: &GradientSums) -> f32 {
		(-stats.sum_gradients / (stats.sum_hessians + self.l2_regularization).max(f64::EPSILON))
			as f32
	}
}

struct SplitCandidate<S> {
	gain: f64,
	feature_index: usize,
	bin: u8,
	left_stats: S,
	right_stats: S,
}

struct QueueItem<S> {
	/// Items in the priority queue will be sorted by the gain of the split.
	candidate: SplitCandidate<S>,
	/// The index of the leaf in the tree that this item would turn into a branch.
	node_index: usize,
	/// The range in the examples index holding this node's examples.
	examples_index_range: Range<usize>,
	depth: usize,
}

impl<S> PartialEq for QueueItem<S> {
	fn eq(&self, other: &Self) -> bool {
		self.cmp(other) == Ordering::Equal
	}
}

impl<S> Eq for QueueItem<S> {}

impl<S> PartialOrd for QueueItem<S> {
	fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
		Some(self.cmp(other))
	}
}

impl<S> Ord for QueueItem<S> {
	fn cmp(&self, other: &Self) -> Ordering {
		// Ties go to the node created first, which keeps growth deterministic.
		self.candidate
			.gain
			.partial_cmp(&other.candidate.gain)
			.unwrap_or(Ordering::Equal)
			.then(other.node_index.cmp(&self.node_index))
	}
}

/// The result of training one tree.
pub struct TrainedTree<L> {
	pub tree: Tree<L>,
	/// The total gain of the splits on each feature.
	pub feature_gains: Vec<f64>,
}

/// Train a tree on the examples in `examples_index`, which may contain repeated indexes. `examples_index` is reordered in place.
pub fn train_tree<C: Criterion>(
	binned_features: &BinnedFeatures,
	criterion: &C,
	examples_index: &mut [usize],
	options: &TreeOptions,
	rng: &mut Xoshiro256Plus,
) -> TrainedTree<C::Leaf> {
	let n_features = binned_features.n_features();
	let n_total_examples = examples_index.len().max(1) as f32;
	let mut feature_gains = vec![0.0; n_features];
	let mut root_stats = criterion.empty_stats();
	for example_index in examples_index.iter() {
		criterion.add_example(&mut root_stats, *example_index);
	}
	let mut nodes = vec![Node::Leaf(LeafNode {
		value: criterion.leaf_value(&root_stats),
		examples_fraction: 1.0,
	})];
	// This priority queue stores the potential nodes to split ordered by their gain.
	let mut queue: BinaryHeap<QueueItem<C::Stats>> = BinaryHeap::new();
	let root_range = 0..examples_index.len();
	if let Some(candidate) = choose_best_split(
		binned_features,
		criterion,
		&examples_index[root_range.clone()],
		&root_stats,
		0,
		options,
		rng,
	) {
		queue.push(QueueItem {
			candidate,
			node_index: 0,
			examples_index_range: root_range,
			depth: 0,
		});
	}
	let mut n_leaves = 1;
	while let Some(item) = queue.pop() {
		if let Some(max_leaf_nodes) = options.max_leaf_nodes {
			if n_leaves >= max_leaf_nodes {
				break;
			}
		}
		let QueueItem {
			candidate,
			node_index,
			examples_index_range,
			depth,
		} = item;
		let SplitCandidate {
			gain,
			feature_index,
			bin,
			left_stats,
			right_stats,
		} = candidate;
		// Partition the node's examples so the left child's examples come first.
		let examples = &mut examples_index[examples_index_range.clone()];
		let column = &binned_features.columns[feature_index];
		let (left, right): (Vec<usize>, Vec<usize>) = examples
			.iter()
			.partition(|example_index| column[**example_index] <= bin);
		let n_left = left.len();
		for (slot, example_index) in examples.iter_mut().zip(left.into_iter().chain(right)) {
			*slot = example_index;
		}
		let left_range = examples_index_range.start..examples_index_range.start + n_left;
		let right_range = examples_index_range.start + n_left..examples_index_range.end;
		let examples_fraction = examples_index_range.len() as f32 / n_total_examples;
		let left_child_index = nodes.len();
		let right_child_index = nodes.len() + 1;
		nodes.push(Node::Leaf(LeafNode {
			value: criterion.leaf_value(&left_stats),
			examples_fraction: left_range.len() as f32 / n_total_examples,
		}));
		nodes.push(Node::Leaf(LeafNode {
			value: criterion.leaf_value(&right_stats),
			examples_fraction: right_range.len() as f32 / n_total_examples,
		}));
		nodes[node_index] = Node::Branch(BranchNode {
			feature_index,
			split_value: binned_features.split_value(feature_index, bin),
			left_child_index,
			right_child_index,
			examples_fraction,
		});
		feature_gains[feature_index] += gain;
		n_leaves += 1;
		for (child_index, child_range, child_stats) in [
			(left_child_index, left_range, left_stats),
			(right_child_index, right_range, right_stats),
		] {
			if let Some(candidate) = choose_best_split(
				binned_features,
				criterion,
				&examples_index[child_range.clone()],
				&child_stats,
				depth + 1,
				options,
				rng,
			) {
				queue.push(QueueItem {
					candidate,
					node_index: child_index,
					examples_index_range: child_range,
					depth: depth + 1,
				});
			}
		}
	}
	TrainedTree {
		tree: Tree { nodes },
		feature_gains,
	}
}

/// Find the split with the highest gain for a node, or `None` if the node should stay a leaf.
fn choose_best_split<C: Criterion>(
	binned_features: &BinnedFeatures,
	criterion: &C,
	examples: &[usize],
	stats: &C::Stats,
	depth: usize,
	options: &TreeOptions,
	rng: &mut Xoshiro256Plus,
) -> Option<SplitCandidate<C::Stats>> {
	if let Some(max_depth) = options.max_depth {
		if depth >= max_depth {
			return None;
		}
	}
	let n_examples = criterion.n_examples(stats);
	if n_examples < options.min_examples_per_split.max(2) {
		return None;
	}
	let n_features = binned_features.n_features();
	let feature_indexes: Vec<usize> = match options.max_features {
		Some(max_features) if max_features < n_features => {
			let mut indexes = sample(rng, n_features, max_features.max(1)).into_vec();
			indexes.sort_unstable();
			indexes
		}
		_ => (0..n_features).collect(),
	};
	let parent_score = criterion.score(stats);
	let min_examples_per_leaf = options.min_examples_per_leaf.max(1);
	let mut best: Option<SplitCandidate<C::Stats>> = None;
	for feature_index in feature_indexes {
		let column = &binned_features.columns[feature_index];
		let n_bins = binned_features.n_bins(feature_index);
		let mut histogram = vec![criterion.empty_stats(); n_bins];
		for example_index in examples {
			criterion.add_example(&mut histogram[column[*example_index] as usize], *example_index);
		}
		let mut left_stats = criterion.empty_stats();
		criterion.add_stats(&mut left_stats, &histogram[0]);
		// A split at bin b sends bins 0..=b left. Bin 0 alone holds only invalid values, so splits start at bin 1.
		for (bin, bin_stats) in histogram.iter().enumerate().take(n_bins - 1).skip(1) {
			criterion.add_stats(&mut left_stats, bin_stats);
			let n_left = criterion.n_examples(&left_stats);
			if n_left < min_examples_per_leaf {
				continue;
			}
			if n_examples - n_left < min_examples_per_leaf {
				break;
			}
			let right_stats = criterion.subtract_stats(stats, &left_stats);
			if !criterion.is_valid_child(&left_stats) || !criterion.is_valid_child(&right_stats) {
				continue;
			}
			let gain =
				criterion.score(&left_stats) + criterion.score(&right_stats) - parent_score;
			if gain <= MIN_GAIN_TO_SPLIT {
				continue;
			}
			let is_better = best
				.as_ref()
				.map(|best| gain > best.gain)
				.unwrap_or(true);
			if is_better {
				best = Some(SplitCandidate {
					gain,
					feature_index,
					bin: bin as u8,
					left_stats: left_stats.clone(),
					right_stats,
				});
			}
		}
	}
	best
}

#[cfg(test)]
use ndarray::prelude::*;
#[cfg(test)]
use rand::SeedableRng;

#[test]
fn test_gini_tree_separates_classes() {
	let features = arr2(&[[1.0, 5.0], [2.0, 5.0], [3.0, 5.0], [10.0, 5.0], [11.0, 5.0], [12.0, 5.0]]);
	let labels = vec![0, 0, 0, 1, 1, 1];
	let binned = BinnedFeatures::compute(features.view());
	let criterion = GiniCriterion {
		labels: &labels,
		n_classes: 2,
	};
	let mut examples_index: Vec<usize> = (0..6).collect();
	let mut rng = Xoshiro256Plus::seed_from_u64(0);
	let trained = train_tree(
		&binned,
		&criterion,
		&mut examples_index,
		&TreeOptions::default(),
		&mut rng,
	);
	assert_eq!(trained.tree.n_leaves(), 2);
	assert_eq!(trained.tree.predict(arr1(&[2.5, 5.0]).view()), &vec![1.0, 0.0]);
	assert_eq!(trained.tree.predict(arr1(&[11.5, 5.0]).view()), &vec![0.0, 1.0]);
	assert!(trained.feature_gains[0] > 0.0);
	assert_eq!(trained.feature_gains[1], 0.0);
}

#[test]
fn test_max_leaf_nodes() {
	let features = Array2::from_shape_fn((32, 1), |(i, _)| i as f32);
	let labels: Vec<usize> = (0..32).map(|i| (i / 4) % 2).collect();
	let binned = BinnedFeatures::compute(features.view());
	let criterion = GiniCriterion {
		labels: &labels,
		n_classes: 2,
	};
	let mut examples_index: Vec<usize> = (0..32).collect();
	let mut rng = Xoshiro256Plus::seed_from_u64(0);
	let options = TreeOptions {
		max_depth: None,
		max_leaf_nodes: Some(3),
		..Default::default()
	};
	let trained = train_tree(&binned, &criterion, &mut examples_index, &options, &mut rng);
	assert_eq!(trained.tree.n_leaves(), 3);
}
