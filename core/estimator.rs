use crate::{
	algorithm::{Algorithm, AlgorithmParams, Params},
	error::{Error, Result},
};
use ndarray::prelude::*;
use workbench_linear::{EarlyStoppingOptions, LogisticRegression};
use workbench_naive_bayes::{GaussianNaiveBayes, NaiveBayesOptions};
use workbench_neighbors::{KnnClassifier, KnnOptions};
use workbench_nn::{NeuralNetwork, NeuralNetworkOptions};
use workbench_svm::{SvmClassifier, SvmOptions};
use workbench_tree::{
	DecisionTreeClassifier, DecisionTreeOptions, GradientBoostingClassifier,
	GradientBoostingOptions, RandomForestClassifier, RandomForestOptions, TreeOptions,
};

/// A fitted model. The neural network is trained by its own epoch loop, every other algorithm by a single fit call.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Estimator {
	Classical(ClassicalEstimator),
	NeuralNet(NeuralNetwork),
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum ClassicalEstimator {
	LogisticRegression(LogisticRegression),
	DecisionTree(DecisionTreeClassifier),
	RandomForest(RandomForestClassifier),
	GradientBoosting(GradientBoostingClassifier),
	Svm(SvmClassifier),
	NaiveBayes(GaussianNaiveBayes),
	Knn(KnnClassifier),
}

impl Estimator {
	/// Fit `algorithm` on scaled features. `labels` are class indexes less than `n_classes`.
	pub fn fit(
		algorithm: Algorithm,
		params: &Params,
		features: ArrayView2<f32>,
		labels: ArrayView1<usize>,
		n_classes: usize,
		seed: u64,
	) -> Result<Estimator> {
		let estimator = match algorithm.parse_params(params)? {
			AlgorithmParams::LogisticRegression(params) => {
				let options = workbench_linear::TrainOptions {
					early_stopping_options: if params.early_stopping {
						Some(EarlyStoppingOptions::default())
					} else {
						None
					},
					l2_regularization: params.l2_regularization,
					learning_rate: params.learning_rate,
					max_epochs: params.max_iter,
					n_examples_per_batch: params.batch_size,
					seed,
				};
				Estimator::Classical(ClassicalEstimator::LogisticRegression(
					LogisticRegression::train(features, labels, n_classes, &options),
				))
			}
			AlgorithmParams::DecisionTree(params) => {
				let options = DecisionTreeOptions {
					tree: TreeOptions {
						max_depth: limit(params.max_depth),
						max_leaf_nodes: None,
						min_examples_per_split: params.min_samples_split,
						min_examples_per_leaf: params.min_samples_leaf,
						max_features: None,
					},
					seed,
				};
				let model = DecisionTreeClassifier::train(features, labels, n_classes, &options);
				tracing::debug!(
					depth = model.tree.depth(),
					n_leaves = model.tree.n_leaves(),
					"trained decision tree"
				);
				Estimator::Classical(ClassicalEstimator::DecisionTree(model))
			}
			AlgorithmParams::RandomForest(params) => {
				let options = RandomForestOptions {
					n_trees: params.n_estimators,
					tree: TreeOptions {
						max_depth: limit(params.max_depth),
						max_leaf_nodes: None,
						min_examples_per_split: params.min_samples_split,
						min_examples_per_leaf: params.min_samples_leaf,
						max_features: None,
					},
					max_features: params.max_features.into(),
					bootstrap: params.bootstrap,
					seed,
				};
				Estimator::Classical(ClassicalEstimator::RandomForest(
					RandomForestClassifier::train(features, labels, n_classes, &options),
				))
			}
			AlgorithmParams::GradientBoosting(params) => {
				let options = GradientBoostingOptions {
					n_rounds: params.n_estimators,
					learning_rate: params.learning_rate,
					tree: TreeOptions {
						max_depth: limit(params.max_depth),
						max_leaf_nodes: limit(params.max_leaf_nodes),
						min_examples_per_split: 2,
						min_examples_per_leaf: params.min_samples_leaf,
						max_features: None,
					},
					l2_regularization: params.l2_regularization,
					subsample: params.subsample,
					seed,
					..Default::default()
				};
				Estimator::Classical(ClassicalEstimator::GradientBoosting(
					GradientBoostingClassifier::train(features, labels, n_classes, &options),
				))
			}
			AlgorithmParams::Svm(params) => {
				let options = SvmOptions {
					c: params.c,
					kernel: params.kernel,
					gamma: params.gamma.into(),
					coef0: params.coef0,
					degree: params.degree,
					probability: params.probability,
					tol: params.tol,
					max_passes: params.max_passes,
					max_iter: params.max_iter,
					seed,
				};
				let svm = SvmClassifier::train(features, labels, n_classes, &options)
					.map_err(|error| Error::Training(error.to_string()))?;
				Estimator::Classical(ClassicalEstimator::Svm(svm))
			}
			AlgorithmParams::NaiveBayes(params) => {
				let options = NaiveBayesOptions {
					var_smoothing: params.var_smoothing,
				};
				Estimator::Classical(ClassicalEstimator::NaiveBayes(GaussianNaiveBayes::train(
					features, labels, n_classes, &options,
				)))
			}
			AlgorithmParams::Knn(params) => {
				let options = KnnOptions {
					n_neighbors: params.n_neighbors,
					weights: params.weights,
				};
				Estimator::Classical(ClassicalEstimator::Knn(KnnClassifier::train(
					features, labels, n_classes, &options,
				)))
			}
			AlgorithmParams::NeuralNetwork(params) => {
				let options = NeuralNetworkOptions {
					epochs: params.epochs,
					batch_size: params.batch_size,
					learning_rate: params.learning_rate,
					seed,
				};
				Estimator::NeuralNet(NeuralNetwork::train(features, labels, n_classes, &options))
			}
		};
		Ok(estimator)
	}

	/// Class probabilities with shape (n_examples, n_classes). `None` only for a support vector classifier trained without probabilities.
	pub fn predict_proba(&self, features: ArrayView2<f32>) -> Option<Array2<f32>> {
		let probabilities = match self {
			Estimator::NeuralNet(model) => model.predict_proba(features),
			Estimator::Classical(model) => match model {
				ClassicalEstimator::LogisticRegression(model) => model.predict_proba(features),
				ClassicalEstimator::DecisionTree(model) => model.predict_proba(features),
				ClassicalEstimator::RandomForest(model) => model.predict_proba(features),
				ClassicalEstimator::GradientBoosting(model) => model.predict_proba(features),
				ClassicalEstimator::Svm(model) => return model.predict_proba(features),
				ClassicalEstimator::NaiveBayes(model) => model.predict_proba(features),
				ClassicalEstimator::Knn(model) => model.predict_proba(features),
			},
		};
		Some(probabilities)
	}

	/// The predicted class index of each example.
	pub fn predict(&self, features: ArrayView2<f32>) -> Array1<usize> {
		match self.predict_proba(features) {
			Some(probabilities) => argmax_rows(probabilities.view()),
			None => match self {
				Estimator::Classical(ClassicalEstimator::Svm(model)) => model.predict(features),
				_ => Array1::zeros(features.nrows()),
			},
		}
	}

	/// Native per-feature importances, normalized to sum to 1. Only tree models have them.
	pub fn feature_importances(&self) -> Option<Vec<f32>> {
		match self {
			Estimator::Classical(ClassicalEstimator::DecisionTree(model)) => {
				Some(model.feature_importances.clone())
			}
			Estimator::Classical(ClassicalEstimator::RandomForest(model)) => {
				Some(model.feature_importances.clone())
			}
			Estimator::Classical(ClassicalEstimator::GradientBoosting(model)) => {
				Some(model.feature_importances.clone())
			}
			_ => None,
		}
	}

	/// Linear coefficients with shape (n_outputs, n_features), from logistic regression and linear kernel support vector classifiers.
	pub fn coefficients(&self) -> Option<Array2<f32>> {
		match self {
			Estimator::Classical(ClassicalEstimator::LogisticRegression(model)) => {
				Some(model.coefficients())
			}
			Estimator::Classical(ClassicalEstimator::Svm(model)) => model.coefficients(),
			_ => None,
		}
	}
}

fn limit(value: usize) -> Option<usize> {
	if value == 0 {
		None
	} else {
		Some(value)
	}
}

/// The index of the first maximal value of each row.
pub fn argmax_rows(probabilities: ArrayView2<f32>) -> Array1<usize> {
	probabilities
		.axis_iter(Axis(0))
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

#[cfg(test)]
fn blobs() -> (Array2<f32>, Array1<usize>) {
	let features = arr2(&[
		[-2.0, -1.0],
		[-1.5, -1.2],
		[-1.8, -0.8],
		[-1.2, -1.5],
		[-2.2, -1.1],
		[-1.6, -0.9],
		[1.5, 1.0],
		[2.0, 1.2],
		[1.8, 0.9],
		[1.2, 1.4],
		[2.2, 1.1],
		[1.7, 0.8],
	]);
	let labels = arr1(&[0, 0, 0, 0, 0, 0, 1, 1, 1, 1, 1, 1]);
	(features, labels)
}

#[test]
fn test_every_algorithm_fits() {
	let (features, labels) = blobs();
	for algorithm in Algorithm::all() {
		let params = match algorithm {
			Algorithm::Knn => maplit::btreemap! { "n_neighbors".to_owned() => serde_json::json!(3) },
			Algorithm::NeuralNetwork => maplit::btreemap! { "epochs".to_owned() => serde_json::json!(200) },
			_ => Params::new(),
		};
		let estimator =
			Estimator::fit(*algorithm, &params, features.view(), labels.view(), 2, 42).unwrap();
		let predictions = estimator.predict(features.view());
		assert_eq!(predictions.len(), labels.len());
		assert!(predictions.iter().all(|p| *p < 2));
		let probabilities = estimator.predict_proba(features.view()).unwrap();
		assert_eq!(probabilities.dim(), (12, 2));
		for row in probabilities.axis_iter(Axis(0)) {
			assert!((row.sum() - 1.0).abs() < 1e-3, "{} {:?}", algorithm, row);
		}
	}
}

#[test]
fn test_capabilities() {
	let (features, labels) = blobs();
	let fit = |algorithm: Algorithm, params: Params| {
		Estimator::fit(algorithm, &params, features.view(), labels.view(), 2, 42).unwrap()
	};
	let forest = fit(Algorithm::RandomForest, Params::new());
	assert_eq!(forest.feature_importances().unwrap().len(), 2);
	assert!(forest.coefficients().is_none());
	let logistic = fit(Algorithm::LogisticRegression, Params::new());
	assert!(logistic.feature_importances().is_none());
	assert_eq!(logistic.coefficients().unwrap().ncols(), 2);
	let svm = fit(
		Algorithm::Svm,
		maplit::btreemap! {
			"probability".to_owned() => serde_json::json!(false),
			"kernel".to_owned() => serde_json::json!("linear"),
		},
	);
	assert!(svm.predict_proba(features.view()).is_none());
	assert!(svm.coefficients().is_some());
	assert_eq!(svm.predict(features.view()), labels);
	let bayes = fit(Algorithm::NaiveBayes, Params::new());
	assert!(bayes.feature_importances().is_none());
	assert!(bayes.coefficients().is_none());
}

#[test]
fn test_argmax_rows_takes_first_maximum() {
	let probabilities = arr2(&[[0.5, 0.5], [0.2, 0.8], [0.4, 0.3]]);
	assert_eq!(argmax_rows(probabilities.view()), arr1(&[0, 1, 0]));
}
