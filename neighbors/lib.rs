/*!
This crate implements a k-nearest neighbors classifier. Training stores the examples. Prediction finds the `n_neighbors` closest training examples by euclidean distance and lets them vote, either equally or weighted by inverse distance. The vote shares are the class probabilities.
*/

use ndarray::prelude::*;
use rayon::prelude::*;

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Weights {
	Uniform,
	/// Closer neighbors count more. A neighbor at distance zero takes the whole vote.
	Distance,
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct KnnOptions {
	pub n_neighbors: usize,
	pub weights: Weights,
}

impl Default for KnnOptions {
	fn default() -> Self {
		Self {
			n_neighbors: 5,
			weights: Weights::Uniform,
		}
	}
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct KnnClassifier {
	pub features: Array2<f32>,
	pub labels: Array1<usize>,
	pub n_classes: usize,
	pub options: KnnOptions,
}

impl KnnClassifier {
	pub fn train(
		features: ArrayView2<f32>,
		labels: ArrayView1<usize>,
		n_classes: usize,
		options: &KnnOptions,
	) -> KnnClassifier {
		KnnClassifier {
			features: features.to_owned(),
			labels: labels.to_owned(),
			n_classes,
			options: options.clone(),
		}
	}

	pub fn predict_proba(&self, features: ArrayView2<f32>) -> Array2<f32> {
		let rows: Vec<Vec<f32>> = features
			.axis_iter(Axis(0))
			.into_par_iter()
			.map(|example| self.vote(example))
			.collect();
		let mut probabilities = Array2::zeros((features.nrows(), self.n_classes));
		for (mut probabilities, row) in probabilities.axis_iter_mut(Axis(0)).zip(rows) {
			for (probability, value) in probabilities.iter_mut().zip(row) {
				*probability = value;
			}
		}
		probabilities
	}

	fn vote(&self, example: ArrayView1<f32>) -> Vec<f32> {
		let mut distances: Vec<(f32, usize)> = self
			.features
			.axis_iter(Axis(0))
			.enumerate()
			.map(|(index, train)| {
				let squared: f32 = train
					.iter()
					.zip(example.iter())
					.map(|(a, b)| (a - b) * (a - b))
					.sum();
				(squared.sqrt(), index)
			})
			.collect();
		// Ties in distance go to the earlier training example.
		distances.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
		let k = self.options.n_neighbors.clamp(1, distances.len().max(1));
		let neighbors = &distances[..k.min(distances.len())];
		let mut votes = vec![0.0f32; self.n_classes];
		match self.options.weights {
			Weights::Uniform => {
				for (_, index) in neighbors {
					votes[self.labels[*index]] += 1.0;
				}
			}
			Weights::Distance => {
				let has_exact_match = neighbors.iter().any(|(distance, _)| *distance == 0.0);
				for (distance, index) in neighbors {
					let weight = if has_exact_match {
						if *distance == 0.0 {
							1.0
						} else {
							0.0
						}
					} else {
						1.0 / distance
					};
					votes[self.labels[*index]] += weight;
				}
			}
		}
		let total: f32 = votes.iter().sum();
		if total > 0.0 {
			for vote in votes.iter_mut() {
				*vote /= total;
			}
		}
		votes
	}
}

#[test]
fn test_uniform_vote() {
	let features = arr2(&[[0.0], [1.0], [2.0], [10.0], [11.0]]);
	let labels = arr1(&[0, 0, 1, 1, 1]);
	let options = KnnOptions {
		n_neighbors: 3,
		weights: Weights::Uniform,
	};
	let model = KnnClassifier::train(features.view(), labels.view(), 2, &options);
	let probabilities = model.predict_proba(arr2(&[[0.5], [10.5]]).view());
	assert!((probabilities[[0, 0]] - 2.0 / 3.0).abs() < 1e-6);
	assert_eq!(probabilities[[1, 1]], 1.0);
}

#[test]
fn test_distance_vote_with_exact_match() {
	let features = arr2(&[[0.0], [1.0], [1.5]]);
	let labels = arr1(&[0, 1, 1]);
	let options = KnnOptions {
		n_neighbors: 3,
		weights: Weights::Distance,
	};
	let model = KnnClassifier::train(features.view(), labels.view(), 2, &options);
	let probabilities = model.predict_proba(arr2(&[[0.0]]).view());
	assert_eq!(probabilities.row(0).to_vec(), vec![1.0, 0.0]);
}

#[test]
fn test_more_neighbors_than_examples() {
	let features = arr2(&[[0.0], [1.0]]);
	let labels = arr1(&[0, 1]);
	let model = KnnClassifier::train(features.view(), labels.view(), 2, &KnnOptions::default());
	let probabilities = model.predict_proba(arr2(&[[0.2]]).view());
	assert_eq!(probabilities.row(0).to_vec(), vec![0.5, 0.5]);
}
