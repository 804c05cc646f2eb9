/*!
This crate implements decision tree classifiers and ensembles of them: a single CART tree, a random forest, and gradient boosted trees in the spirit of [LightGBM](https://github.com/microsoft/lightgbm) and [XGBoost](https://github.com/dmlc/xgboost), written in pure Rust.

All three share one training core. Number features are first binned into at most 255 bins, then each node's best split is found by scanning per-bin statistics. Trees grow best first: the leaf whose split has the highest gain is split next, until a depth, leaf count or minimum size limit stops growth.
*/

#![allow(clippy::tabs_in_doc_comments)]

use ndarray::prelude::*;

mod binning;
mod decision_tree;
mod feature_importances;
mod gradient_boosting;
mod random_forest;
mod train;

pub use self::decision_tree::{DecisionTreeClassifier, DecisionTreeOptions};
pub use self::gradient_boosting::{GradientBoostingClassifier, GradientBoostingOptions};
pub use self::random_forest::{MaxFeatures, RandomForestClassifier, RandomForestOptions};

/// Options that control the growth of a single tree.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TreeOptions {
	/// The depth of a single tree will never exceed this value. `None` means unlimited.
	pub max_depth: Option<usize>,
	/// The number of leaf nodes in a single tree will never exceed this value. `None` means unlimited.
	pub max_leaf_nodes: Option<usize>,
	/// A node is only split if it holds at least this many training examples.
	pub min_examples_per_split: usize,
	/// A split is only valid if each child receives at least this many training examples.
	pub min_examples_per_leaf: usize,
	/// If set, only this many randomly chosen features are considered at each split.
	pub max_features: Option<usize>,
}

impl Default for TreeOptions {
	fn default() -> Self {
		Self {
			max_depth: Some(10),
			max_leaf_nodes: None,
			min_examples_per_split: 2,
			min_examples_per_leaf: 1,
			max_features: None,
		}
	}
}

/// Trees are stored as a `Vec` of `Node`s. Each branch in the tree has two indexes into the `Vec`, one for each of its children. The root is at index 0.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Tree<T> {
	pub nodes: Vec<Node<T>>,
}

/// A node is either a branch or a leaf.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum Node<T> {
	Branch(BranchNode),
	Leaf(LeafNode<T>),
}

/// A branch sends an example to its left child if the feature value is <= `split_value` or is not finite, and to its right child otherwise.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct BranchNode {
	pub feature_index: usize,
	pub split_value: f32,
	pub left_child_index: usize,
	pub right_child_index: usize,
	/// The fraction of training examples that passed through this node.
	pub examples_fraction: f32,
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct LeafNode<T> {
	pub value: T,
	pub examples_fraction: f32,
}

impl<T> Tree<T> {
	/// Return the value of the leaf that `features` lands in.
	pub fn predict(&self, features: ArrayView1<f32>) -> &T {
		// Start at the root node.
		let mut node_index = 0;
		// Traverse the tree until we get to a leaf.
		loop {
			match &self.nodes[node_index] {
				Node::Branch(BranchNode {
					feature_index,
					split_value,
					left_child_index,
					right_child_index,
					..
				}) => {
					let value = features[*feature_index];
					node_index = if !value.is_finite() || value <= *split_value {
						*left_child_index
					} else {
						*right_child_index
					};
				}
				// We made it to a leaf! The prediction is the leaf's value.
				Node::Leaf(LeafNode { value, .. }) => return value,
			}
		}
	}

	pub fn n_leaves(&self) -> usize {
		self.nodes
			.iter()
			.filter(|node| matches!(node, Node::Leaf(_)))
			.count()
	}

	pub fn depth(&self) -> usize {
		fn depth<T>(tree: &Tree<T>, node_index: usize) -> usize {
			match &tree.nodes[node_index] {
				Node::Branch(branch) => {
					1 + depth(tree, branch.left_child_index).max(depth(tree, branch.right_child_index))
				}
				Node::Leaf(_) => 0,
			}
		}
		if self.nodes.is_empty() {
			0
		} else {
			depth(self, 0)
		}
	}
}

/// Return the index of the first largest probability in each row.
pub fn argmax_rows(probabilities: ArrayView2<f32>) -> Array1<usize> {
	probabilities
		.rows()
		.into_iter()
		.map(|row| {
			let mut best = 0;
			for (index, value) in row.iter().enumerate() {
				if *value > row[best] {
					best = index;
				}
			}
			best
		})
		.collect()
}

#[test]
fn test_predict_routes_nan_left() {
	let tree = Tree {
		nodes: vec![
			Node::Branch(BranchNode {
				feature_index: 0,
				split_value: 0.5,
				left_child_index: 1,
				right_child_index: 2,
				examples_fraction: 1.0,
			}),
			Node::Leaf(LeafNode {
				value: 1.0f32,
				examples_fraction: 0.5,
			}),
			Node::Leaf(LeafNode {
				value: 2.0f32,
				examples_fraction: 0.5,
			}),
		],
	};
	assert_eq!(*tree.predict(arr1(&[0.5]).view()), 1.0);
	assert_eq!(*tree.predict(arr1(&[f32::NAN]).view()), 1.0);
	assert_eq!(*tree.predict(arr1(&[0.6]).view()), 2.0);
	assert_eq!(tree.n_leaves(), 2);
	assert_eq!(tree.depth(), 1);
}
