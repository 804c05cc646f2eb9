use crate::{
	algorithm::{Algorithm, Params},
	artifact::{ArtifactBundle, FORMAT_VERSION},
	error::{Error, Result},
	estimator::Estimator,
	evaluate::{evaluate, Metrics},
	preprocess::{FeatureColumn, TargetLabels},
	split::{clamp_folds, stratified_k_fold, stratified_split},
};
use chrono::Utc;
use ndarray::prelude::*;
use std::{collections::BTreeMap, time::Instant};
use workbench_features::{Scaler, ScalingMethod};
use workbench_metrics::{Accuracy, MeanVariance, Metric, StreamingMetric};
use workbench_util::id::Id;

#[derive(Clone, Debug, PartialEq)]
pub struct TrainOptions {
	/// The fraction of rows held out for evaluation, in (0, 1).
	pub test_size: f32,
	pub seed: u64,
	pub scaling: ScalingMethod,
	/// The number of cross validation folds. Fewer than 2 disables cross validation.
	pub cv_folds: usize,
}

impl Default for TrainOptions {
	fn default() -> Self {
		Self {
			test_size: 0.2,
			seed: 42,
			scaling: ScalingMethod::Standard,
			cv_folds: 5,
		}
	}
}

/// The stages of a training run, reported before each one starts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TrainStage {
	Split,
	Fit,
	Evaluate,
	CrossValidate,
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct CrossValidation {
	pub n_folds: usize,
	/// The accuracy of each fold.
	pub scores: Vec<f32>,
	pub mean: f32,
	pub std: f32,
}

#[derive(Clone, Debug, PartialEq)]
pub struct TrainingResult {
	pub algorithm: Algorithm,
	/// The defaults merged with the caller's overrides.
	pub params: Params,
	pub artifact: ArtifactBundle,
	pub metrics: Metrics,
	pub cross_validation: Option<CrossValidation>,
	pub training_time_seconds: f64,
	pub n_train: usize,
	pub n_test: usize,
}

/// Train one algorithm and evaluate it on a held out split. `on_stage` is called before each stage, and an error from it aborts the run.
pub fn train(
	features: ArrayView2<f32>,
	target: &TargetLabels,
	feature_columns: &[FeatureColumn],
	algorithm: Algorithm,
	params: &Params,
	options: &TrainOptions,
	on_stage: &dyn Fn(TrainStage) -> Result<()>,
) -> Result<TrainingResult> {
	let params = algorithm.merge_params(params)?;
	if features.nrows() != target.len() {
		return Err(Error::InvalidInput(format!(
			"the feature matrix has {} rows but the target has {}",
			features.nrows(),
			target.len()
		)));
	}
	let n_distinct = target.class_counts().len();
	if n_distinct < 2 {
		return Err(Error::InvalidInput(format!(
			"the target must have at least 2 classes, found {}",
			n_distinct
		)));
	}

	// split the rows, keeping the class balance in both splits
	on_stage(TrainStage::Split)?;
	let (train_indexes, test_indexes) =
		stratified_split(&target.labels, options.test_size, options.seed)?;
	let features_train = features.select(Axis(0), &train_indexes);
	let features_test = features.select(Axis(0), &test_indexes);

	// fit the scaler and the label encoder on the training split only
	let scaler = Scaler::fit(options.scaling, features_train.view());
	let features_train = scaler.transform(features_train.view());
	let features_test = scaler.transform(features_test.view());
	let label_encoder = target.fit_encoder(&train_indexes);
	let labels_train = target.encode(&label_encoder, &train_indexes)?;
	let labels_test = target.encode(&label_encoder, &test_indexes)?;
	let n_classes = label_encoder.n_classes();

	on_stage(TrainStage::Fit)?;
	tracing::info!(%algorithm, n_train = train_indexes.len(), n_test = test_indexes.len(), n_classes, "fitting");
	let start = Instant::now();
	let estimator = Estimator::fit(
		algorithm,
		&params,
		features_train.view(),
		labels_train.view(),
		n_classes,
		options.seed,
	)?;
	let training_time_seconds = start.elapsed().as_secs_f64();

	on_stage(TrainStage::Evaluate)?;
	let probabilities = estimator.predict_proba(features_test.view());
	let predictions = estimator.predict(features_test.view());
	let feature_names: Vec<String> = feature_columns.iter().map(|c| c.name.clone()).collect();
	let metrics = evaluate(
		labels_test.view(),
		predictions.view(),
		probabilities.as_ref().map(|p| p.view()),
		&label_encoder.classes,
		&feature_names,
		&estimator,
	)?;

	let cross_validation = if options.cv_folds >= 2 {
		on_stage(TrainStage::CrossValidate)?;
		cross_validate(features, target, algorithm, &params, options)?
	} else {
		None
	};

	tracing::info!(%algorithm, accuracy = metrics.accuracy, training_time_seconds, "trained");
	let artifact = ArtifactBundle {
		format_version: FORMAT_VERSION,
		model_id: Id::new(),
		algorithm,
		params: params.clone(),
		estimator,
		scaler,
		classes: label_encoder.classes.clone(),
		label_encoder,
		feature_columns: feature_columns.to_vec(),
		trained_at: Utc::now(),
	};
	Ok(TrainingResult {
		algorithm,
		params,
		artifact,
		metrics,
		cross_validation,
		training_time_seconds,
		n_train: train_indexes.len(),
		n_test: test_indexes.len(),
	})
}

/// Stratified k-fold cross validation over all rows. Each fold refits the scaler and the estimator. Returns `None` when the smallest class is too small for two folds.
pub fn cross_validate(
	features: ArrayView2<f32>,
	target: &TargetLabels,
	algorithm: Algorithm,
	params: &Params,
	options: &TrainOptions,
) -> Result<Option<CrossValidation>> {
	let n_folds = match clamp_folds(&target.labels, options.cv_folds) {
		Some(n_folds) => n_folds,
		None => return Ok(None),
	};
	let all_indexes: Vec<usize> = (0..target.len()).collect();
	let label_encoder = target.fit_encoder(&all_indexes);
	let labels = target.encode(&label_encoder, &all_indexes)?;
	let n_classes = label_encoder.n_classes();
	let mut scores = Vec::with_capacity(n_folds);
	for (train_indexes, test_indexes) in stratified_k_fold(&target.labels, n_folds, options.seed) {
		let scaler = Scaler::fit(options.scaling, features.select(Axis(0), &train_indexes).view());
		let features_train = scaler.transform(features.select(Axis(0), &train_indexes).view());
		let features_test = scaler.transform(features.select(Axis(0), &test_indexes).view());
		let labels_train = labels.select(Axis(0), &train_indexes);
		let estimator = Estimator::fit(
			algorithm,
			params,
			features_train.view(),
			labels_train.view(),
			n_classes,
			options.seed,
		)?;
		let predictions = estimator.predict(features_test.view());
		let mut accuracy = Accuracy::new();
		for (index, prediction) in test_indexes.iter().zip(predictions.iter()) {
			accuracy.update((labels[*index], *prediction));
		}
		scores.push(accuracy.finalize().unwrap_or(0.0));
	}
	let summary = MeanVariance::compute(&scores);
	let (mean, std) = match summary {
		Some(summary) => (summary.mean, summary.variance.sqrt()),
		None => (0.0, 0.0),
	};
	tracing::debug!(%algorithm, n_folds, mean, std, "cross validated");
	Ok(Some(CrossValidation {
		n_folds,
		scores,
		mean,
		std,
	}))
}

/// Train every algorithm in `algorithms` with its default params. A failure is recorded for its algorithm and the sweep moves on.
pub fn train_all(
	features: ArrayView2<f32>,
	target: &TargetLabels,
	feature_columns: &[FeatureColumn],
	algorithms: &[Algorithm],
	options: &TrainOptions,
) -> BTreeMap<Algorithm, Result<TrainingResult>> {
	let mut results = BTreeMap::new();
	for algorithm in algorithms {
		let result = train(
			features,
			target,
			feature_columns,
			*algorithm,
			&Params::new(),
			options,
			&|_| Ok(()),
		);
		if let Err(error) = &result {
			tracing::warn!(algorithm = %algorithm, %error, "skipping algorithm");
		}
		results.insert(*algorithm, result);
	}
	let n_ok = results.values().filter(|result| result.is_ok()).count();
	tracing::info!(n_ok, n_failed = results.len() - n_ok, "sweep complete");
	results
}

#[cfg(test)]
pub(crate) fn synthetic_dataset(
	n_rows: usize,
	n_features: usize,
	seed: u64,
) -> (Array2<f32>, TargetLabels) {
	use rand::{Rng, SeedableRng};
	let mut rng = rand_xoshiro::Xoshiro256Plus::seed_from_u64(seed);
	let mut features = Array2::zeros((n_rows, n_features));
	let mut labels = Vec::with_capacity(n_rows);
	for (row_index, mut row) in features.axis_iter_mut(Axis(0)).enumerate() {
		let positive = row_index % 2 == 0;
		let center = if positive { 1.5 } else { -1.5 };
		for value in row.iter_mut() {
			*value = center + rng.gen_range(-1.0..1.0);
		}
		labels.push(if positive { "yes" } else { "no" }.to_owned());
	}
	(
		features,
		TargetLabels {
			labels,
			numeric_values: None,
		},
	)
}

#[cfg(test)]
fn number_columns(n: usize) -> Vec<FeatureColumn> {
	(0..n)
		.map(|i| FeatureColumn {
			name: format!("f{}", i),
			kind: crate::preprocess::FeatureKind::Number,
		})
		.collect()
}

#[test]
fn test_train_random_forest() {
	let (features, target) = synthetic_dataset(100, 4, 0);
	let options = TrainOptions::default();
	let stages = std::cell::RefCell::new(Vec::new());
	let result = train(
		features.view(),
		&target,
		&number_columns(4),
		Algorithm::RandomForest,
		&Params::new(),
		&options,
		&|stage| {
			stages.borrow_mut().push(stage);
			Ok(())
		},
	)
	.unwrap();
	assert_eq!(
		stages.into_inner(),
		vec![
			TrainStage::Split,
			TrainStage::Fit,
			TrainStage::Evaluate,
			TrainStage::CrossValidate
		]
	);
	assert_eq!(result.n_train, 80);
	assert_eq!(result.n_test, 20);
	assert_eq!(result.metrics.confusion_matrix.len(), 2);
	assert!((0.0..=1.0).contains(&result.metrics.accuracy));
	let importance = result.metrics.feature_importance.as_ref().unwrap();
	assert_eq!(importance.len(), 4);
	assert!(importance.windows(2).all(|w| w[0].importance >= w[1].importance));
	let cross_validation = result.cross_validation.unwrap();
	assert_eq!(cross_validation.n_folds, 5);
	assert_eq!(cross_validation.scores.len(), 5);
	assert_eq!(result.artifact.classes, vec!["no", "yes"]);
}

#[test]
fn test_every_algorithm_on_a_balanced_dataset() {
	let (features, target) = synthetic_dataset(60, 3, 1);
	let options = TrainOptions {
		cv_folds: 0,
		..Default::default()
	};
	let results = train_all(
		features.view(),
		&target,
		&number_columns(3),
		Algorithm::all(),
		&options,
	);
	assert_eq!(results.len(), Algorithm::all().len());
	for (algorithm, result) in results {
		let result = result.unwrap_or_else(|error| panic!("{}: {}", algorithm, error));
		assert!((0.0..=1.0).contains(&result.metrics.accuracy));
		// Each row of the confusion matrix sums to the test count of its class.
		let row_sums: Vec<u64> = result
			.metrics
			.confusion_matrix
			.iter()
			.map(|row| row.iter().sum())
			.collect();
		assert_eq!(row_sums, vec![6, 6]);
		assert!(result.cross_validation.is_none());
	}
}

#[test]
fn test_stage_error_aborts() {
	let (features, target) = synthetic_dataset(20, 2, 2);
	let error = train(
		features.view(),
		&target,
		&number_columns(2),
		Algorithm::NaiveBayes,
		&Params::new(),
		&TrainOptions::default(),
		&|stage| {
			if stage == TrainStage::Fit {
				Err(Error::Cancelled)
			} else {
				Ok(())
			}
		},
	)
	.unwrap_err();
	assert!(matches!(error, Error::Cancelled));
}

#[test]
fn test_insufficient_class_samples() {
	let features = Array2::zeros((5, 1));
	let target = TargetLabels {
		labels: vec!["a", "a", "a", "a", "b"]
			.into_iter()
			.map(String::from)
			.collect(),
		numeric_values: None,
	};
	let options = TrainOptions {
		test_size: 0.5,
		..Default::default()
	};
	let error = train(
		features.view(),
		&target,
		&number_columns(1),
		Algorithm::DecisionTree,
		&Params::new(),
		&options,
		&|_| Ok(()),
	)
	.unwrap_err();
	assert!(matches!(error, Error::InsufficientClassSamples { count: 1, .. }));
}
