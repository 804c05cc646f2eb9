use crate::{
	algorithm::{list_algorithms, Algorithm, AlgorithmInfo, Params},
	artifact::ArtifactStore,
	config::Config,
	error::{Error, Result},
	jobs::{self, WorkerPool},
	predict::{self, BatchPrediction, Prediction, PredictionInfo},
	preprocess::{
		clean, prepare_features, preview, resolve_target, validate, CleanOptions, DatasetInfo,
		FeatureColumn, Record, TargetLabels,
	},
	store::{DatasetRecord, JobStatus, ModelRecord, ModelStats, Store, TrainingJob},
	train::{train_all, TrainOptions, TrainingResult},
};
use chrono::Utc;
use ndarray::prelude::*;
use std::{
	collections::BTreeMap,
	path::{Path, PathBuf},
	sync::Arc,
	time::{Duration, Instant},
};
use workbench_dataframe::DataFrame;
use workbench_features::ScalingMethod;
use workbench_util::id::Id;

/// State shared between the facade and the training workers.
pub(crate) struct Context {
	pub config: Config,
	pub store: Store,
	pub artifacts: ArtifactStore,
}

/// A cleaned and encoded dataset, ready for training.
pub(crate) struct TrainingData {
	pub features: Array2<f32>,
	pub feature_columns: Vec<FeatureColumn>,
	pub target: TargetLabels,
}

impl Context {
	pub fn load_dataset(&self, dataset: &DatasetRecord) -> Result<DataFrame> {
		Ok(DataFrame::from_path(&dataset.file_path, Default::default())?)
	}

	pub fn prepare(&self, dataframe: &DataFrame, target_column: &str) -> Result<TrainingData> {
		let cleaned = clean(
			dataframe,
			&CleanOptions {
				drop_duplicates: self.config.drop_duplicates,
				missing_values: self.config.missing_values,
			},
		);
		if cleaned.nrows() == 0 {
			return Err(Error::InvalidInput(
				"no rows are left after cleaning the dataset".to_owned(),
			));
		}
		let prepared = prepare_features(&cleaned, Some(target_column))?;
		let target = match prepared.target.as_ref() {
			Some(column) => TargetLabels::from_column(column)?,
			None => return Err(Error::MissingTargetColumn(target_column.to_owned())),
		};
		Ok(TrainingData {
			features: prepared.features,
			feature_columns: prepared.feature_columns,
			target,
		})
	}

	pub fn model_record(
		&self,
		dataset_id: Id,
		result: &TrainingResult,
		artifact_path: PathBuf,
	) -> Result<ModelRecord> {
		let mut metrics = serde_json::to_value(&result.metrics)?;
		if let (Some(cross_validation), serde_json::Value::Object(map)) =
			(&result.cross_validation, &mut metrics)
		{
			map.insert(
				"cross_validation".to_owned(),
				serde_json::to_value(cross_validation)?,
			);
		}
		let now = Utc::now();
		Ok(ModelRecord {
			id: result.artifact.model_id,
			dataset_id,
			algorithm: result.algorithm,
			accuracy: result.metrics.accuracy,
			metrics,
			params: result.params.clone(),
			is_active: true,
			artifact_path,
			training_time_seconds: result.training_time_seconds,
			created_at: now,
			updated_at: now,
		})
	}
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TrainingRequest {
	pub dataset_id: Id,
	/// An algorithm identifier. It is parsed on submission so an unknown one fails before a job exists.
	pub algorithm: String,
	#[serde(default)]
	pub params: Params,
	/// Defaults to the configured test size.
	pub test_size: Option<f32>,
	/// Defaults to the configured seed.
	pub seed: Option<u64>,
	/// Defaults to the configured scaling.
	pub scaling: Option<ScalingMethod>,
}

#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ModelUpdate {
	pub is_active: Option<bool>,
	pub params: Option<Params>,
}

/// Changes to a dataset's record. `None` fields are left as they are.
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct DatasetUpdate {
	pub name: Option<String>,
	/// Must name one of the dataset's columns.
	pub target_column: Option<String>,
}

#[derive(Clone, Debug, PartialEq, serde::Serialize)]
pub struct DatasetDetails {
	pub dataset: DatasetRecord,
	pub info: DatasetInfo,
	pub preview: Vec<Record>,
}

/// The entry point for everything the workbench does: datasets, training jobs, models and predictions.
pub struct Workbench {
	context: Arc<Context>,
	pool: WorkerPool,
}

impl Workbench {
	pub fn open(config: Config) -> Result<Workbench> {
		std::fs::create_dir_all(config.uploads_dir())?;
		std::fs::create_dir_all(config.models_dir())?;
		let store = Store::open(config.records_dir())?;
		let orphaned = store.fail_orphaned_jobs()?;
		if !orphaned.is_empty() {
			tracing::warn!(n_jobs = orphaned.len(), "marked jobs failed whose process exited before they finished");
		}
		let artifacts = ArtifactStore::new(config.models_dir());
		let pool = WorkerPool::new(config.n_workers)?;
		tracing::info!(data_dir = %config.data_dir.display(), n_workers = config.n_workers, "opened workbench");
		Ok(Workbench {
			context: Arc::new(Context {
				config,
				store,
				artifacts,
			}),
			pool,
		})
	}

	pub fn config(&self) -> &Config {
		&self.context.config
	}

	/// Copy a CSV file into the workbench and record it as a dataset. The target column must exist if one is named. Otherwise the last column is the target.
	pub fn upload_dataset(
		&self,
		path: &Path,
		name: Option<&str>,
		target: Option<&str>,
	) -> Result<DatasetRecord> {
		let config = &self.context.config;
		let extension = path
			.extension()
			.and_then(|extension| extension.to_str())
			.map(|extension| format!(".{}", extension.to_lowercase()))
			.unwrap_or_default();
		if !config
			.supported_file_types
			.iter()
			.any(|supported| supported.eq_ignore_ascii_case(&extension))
		{
			return Err(Error::UnsupportedFileType(extension));
		}
		let size = std::fs::metadata(path)?.len();
		if size > config.max_file_size {
			return Err(Error::FileTooLarge {
				size,
				limit: config.max_file_size,
			});
		}
		let id = Id::new();
		let file_path = config.uploads_dir().join(format!("{}{}", id, extension));
		std::fs::copy(path, &file_path)?;
		let parsed = DataFrame::from_path(&file_path, Default::default())
			.map_err(Error::from)
			.and_then(|dataframe| {
				let target_column = resolve_target(&dataframe, target)?;
				if dataframe.nrows() == 0 {
					return Err(Error::InvalidInput("the dataset has no rows".to_owned()));
				}
				Ok((dataframe, target_column))
			});
		let (dataframe, target_column) = match parsed {
			Ok(parsed) => parsed,
			Err(error) => {
				std::fs::remove_file(&file_path).ok();
				return Err(error);
			}
		};
		let file_name = path
			.file_name()
			.map(|file_name| file_name.to_string_lossy().into_owned())
			.unwrap_or_default();
		let dataset = DatasetRecord {
			id,
			name: name
				.map(|name| name.to_owned())
				.unwrap_or_else(|| file_name.clone()),
			file_name,
			file_path,
			target_column,
			n_rows: dataframe.nrows(),
			n_columns: dataframe.ncols(),
			column_names: dataframe
				.column_names()
				.into_iter()
				.map(|name| name.to_owned())
				.collect(),
			created_at: Utc::now(),
			updated_at: None,
		};
		self.context.store.insert_dataset(&dataset)?;
		tracing::info!(dataset_id = %id, n_rows = dataset.n_rows, n_columns = dataset.n_columns, "uploaded dataset");
		Ok(dataset)
	}

	pub fn list_datasets(&self) -> Result<Vec<DatasetRecord>> {
		self.context.store.list_datasets()
	}

	pub fn get_dataset(&self, id: Id) -> Result<DatasetRecord> {
		self.context.store.get_dataset(id)
	}

	/// The dataset's record, its column summaries and its first `n_preview` rows.
	pub fn dataset_info(&self, id: Id, n_preview: usize) -> Result<DatasetDetails> {
		let dataset = self.context.store.get_dataset(id)?;
		let dataframe = self.context.load_dataset(&dataset)?;
		Ok(DatasetDetails {
			info: validate(&dataframe),
			preview: preview(&dataframe, n_preview),
			dataset,
		})
	}

	/// Rename a dataset or choose a different target column. Models already trained on it are unaffected.
	pub fn update_dataset(&self, id: Id, update: DatasetUpdate) -> Result<DatasetRecord> {
		let dataset = self.context.store.update_dataset(id, |dataset| {
			if let Some(target_column) = update.target_column {
				if !dataset.column_names.contains(&target_column) {
					return Err(Error::MissingTargetColumn(target_column));
				}
				dataset.target_column = target_column;
			}
			if let Some(name) = update.name {
				dataset.name = name;
			}
			Ok(())
		})?;
		tracing::info!(dataset_id = %id, "updated dataset");
		Ok(dataset)
	}

	/// Remove the dataset's record and its file. Returns false if there was no such dataset.
	pub fn delete_dataset(&self, id: Id) -> Result<bool> {
		let dataset = match self.context.store.get_dataset(id) {
			Ok(dataset) => dataset,
			Err(Error::NotFound { .. }) => return Ok(false),
			Err(error) => return Err(error),
		};
		match std::fs::remove_file(&dataset.file_path) {
			Ok(()) => {}
			Err(error) if error.kind() == std::io::ErrorKind::NotFound => {}
			Err(error) => return Err(error.into()),
		}
		self.context.store.delete_dataset(id)
	}

	/// Validate a training request and queue it. Returns the job id to poll.
	pub fn submit_training(&self, request: TrainingRequest) -> Result<Id> {
		let config = &self.context.config;
		let algorithm: Algorithm = request.algorithm.parse()?;
		let params = algorithm.merge_params(&request.params)?;
		let test_size = request.test_size.unwrap_or(config.default_test_size);
		if !(test_size > 0.0 && test_size < 1.0) {
			return Err(Error::InvalidInput(format!(
				"test_size must be between 0 and 1, got {}",
				test_size
			)));
		}
		let dataset = self.context.store.get_dataset(request.dataset_id)?;
		let now = Utc::now();
		let mut job = TrainingJob {
			id: Id::new(),
			dataset_id: dataset.id,
			algorithm,
			params,
			test_size,
			seed: request.seed.unwrap_or(config.default_seed),
			scaling: request.scaling.unwrap_or(config.scaling),
			status: JobStatus::Queued,
			progress: 0,
			logs: Vec::new(),
			error_message: None,
			model_id: None,
			owner: Some(self.context.store.owner()),
			created_at: now,
			updated_at: now,
			completed_at: None,
		};
		job.log(format!("queued {} on dataset {}", algorithm, dataset.id));
		self.context.store.insert_job(&job)?;
		let context = self.context.clone();
		let job_id = job.id;
		self.pool.submit(move || jobs::run_job(context, job_id))?;
		tracing::info!(%job_id, %algorithm, "submitted training job");
		Ok(job_id)
	}

	pub fn job(&self, id: Id) -> Result<TrainingJob> {
		self.context.store.get_job(id)
	}

	pub fn list_jobs(&self) -> Result<Vec<TrainingJob>> {
		self.context.store.list_jobs()
	}

	pub fn cancel_job(&self, id: Id) -> Result<TrainingJob> {
		jobs::cancel(&self.context, id)
	}

	/// Poll a job until it is terminal or `timeout` elapses, then return its latest state.
	pub fn wait_for_job(&self, id: Id, timeout: Duration) -> Result<TrainingJob> {
		let start = Instant::now();
		loop {
			let job = self.context.store.get_job(id)?;
			if job.status.is_terminal() || start.elapsed() >= timeout {
				return Ok(job);
			}
			std::thread::sleep(Duration::from_millis(20));
		}
	}

	/// Train each algorithm on a dataset synchronously and save a model for every one that succeeds.
	pub fn train_all(
		&self,
		dataset_id: Id,
		algorithms: &[Algorithm],
		options: &TrainOptions,
	) -> Result<BTreeMap<Algorithm, Result<ModelRecord>>> {
		let dataset = self.context.store.get_dataset(dataset_id)?;
		let dataframe = self.context.load_dataset(&dataset)?;
		let data = self.context.prepare(&dataframe, &dataset.target_column)?;
		let results = train_all(
			data.features.view(),
			&data.target,
			&data.feature_columns,
			algorithms,
			options,
		);
		Ok(results
			.into_iter()
			.map(|(algorithm, result)| {
				let model = result.and_then(|result| self.persist(dataset.id, &result));
				(algorithm, model)
			})
			.collect())
	}

	fn persist(&self, dataset_id: Id, result: &TrainingResult) -> Result<ModelRecord> {
		let model_id = result.artifact.model_id;
		let artifact_path = self.context.artifacts.save(&result.artifact, model_id)?;
		let model = self.context.model_record(dataset_id, result, artifact_path)?;
		self.context.store.insert_model(&model)?;
		Ok(model)
	}

	pub fn list_models(&self) -> Result<Vec<ModelRecord>> {
		self.context.store.list_models()
	}

	pub fn get_model(&self, id: Id) -> Result<ModelRecord> {
		self.context.store.get_model(id)
	}

	/// The models that serve predictions.
	pub fn list_active_models(&self) -> Result<Vec<ModelRecord>> {
		self.context.store.active_models()
	}

	pub fn update_model(&self, id: Id, update: ModelUpdate) -> Result<ModelRecord> {
		self.context.store.update_model(id, |model| {
			if let Some(is_active) = update.is_active {
				model.is_active = is_active;
			}
			if let Some(params) = update.params {
				model.params = params;
			}
		})
	}

	/// Remove a model's record and its artifact. Returns false if there was no such model.
	pub fn delete_model(&self, id: Id) -> Result<bool> {
		let model = match self.context.store.get_model(id) {
			Ok(model) => model,
			Err(Error::NotFound { .. }) => return Ok(false),
			Err(error) => return Err(error),
		};
		match std::fs::remove_file(&model.artifact_path) {
			Ok(()) => {}
			Err(error) if error.kind() == std::io::ErrorKind::NotFound => {}
			Err(error) => return Err(error.into()),
		}
		self.context.store.delete_model(id)
	}

	pub fn model_stats(&self) -> Result<ModelStats> {
		self.context.store.model_stats()
	}

	pub fn list_algorithms(&self) -> Vec<AlgorithmInfo> {
		list_algorithms()
	}

	pub fn predict(&self, model_id: Id, record: &Record) -> Result<Prediction> {
		let bundle = self.load_active_artifact(model_id)?;
		predict::predict(&bundle, record, self.context.config.missing_feature_policy)
	}

	pub fn predict_batch(&self, model_id: Id, records: &[Record]) -> Result<BatchPrediction> {
		let bundle = self.load_active_artifact(model_id)?;
		predict::predict_batch(&bundle, records, self.context.config.missing_feature_policy)
	}

	/// What a model expects as input and what it can output.
	pub fn prediction_info(&self, model_id: Id) -> Result<PredictionInfo> {
		let model = self.context.store.get_model(model_id)?;
		let bundle = self.context.artifacts.load(&model.artifact_path)?;
		Ok(predict::prediction_info(&model, &bundle))
	}

	fn load_active_artifact(&self, model_id: Id) -> Result<crate::artifact::ArtifactBundle> {
		let model = self.context.store.get_model(model_id)?;
		if !model.is_active {
			return Err(Error::InvalidInput(format!(
				"model {} is not active",
				model_id
			)));
		}
		self.context.artifacts.load(&model.artifact_path)
	}

	/// Delete models older than `retention_days`. Returns how many were deleted.
	pub fn cleanup_old_models(&self, retention_days: i64) -> Result<usize> {
		let cutoff = Utc::now() - chrono::Duration::days(retention_days);
		let mut n_deleted = 0;
		for model in self.context.store.models_older_than(cutoff)? {
			if self.delete_model(model.id)? {
				n_deleted += 1;
			}
		}
		tracing::info!(n_deleted, retention_days, "cleaned up old models");
		Ok(n_deleted)
	}

	/// Delete terminal jobs older than `retention_days`. Returns how many were deleted.
	pub fn cleanup_old_jobs(&self, retention_days: i64) -> Result<usize> {
		let cutoff = Utc::now() - chrono::Duration::days(retention_days);
		let mut n_deleted = 0;
		for job in self.context.store.jobs_older_than(cutoff)? {
			if job.status.is_terminal() && self.context.store.delete_job(job.id)? {
				n_deleted += 1;
			}
		}
		tracing::info!(n_deleted, retention_days, "cleaned up old jobs");
		Ok(n_deleted)
	}
}

#[cfg(test)]
fn test_workbench(dir: &Path) -> Workbench {
	let config = Config {
		data_dir: dir.to_owned(),
		cv_folds: 3,
		..Default::default()
	};
	Workbench::open(config).unwrap()
}

/// 100 rows, four number features and a two class categorical label.
#[cfg(test)]
fn write_csv(dir: &Path) -> PathBuf {
	use rand::{Rng, SeedableRng};
	use std::fmt::Write;
	let mut rng = rand_xoshiro::Xoshiro256Plus::seed_from_u64(7);
	let mut csv = String::from("a,b,c,d,label\n");
	for i in 0..100 {
		let (center, label) = if i % 2 == 0 { (2.0, "cat") } else { (-2.0, "dog") };
		let values: Vec<String> = (0..4)
			.map(|_| format!("{:.4}", center + rng.gen_range(-1.5f32..1.5)))
			.collect();
		writeln!(csv, "{},{}", values.join(","), label).unwrap();
	}
	let path = dir.join("animals.csv");
	std::fs::write(&path, csv).unwrap();
	path
}

#[cfg(test)]
fn request(dataset_id: Id, algorithm: &str) -> TrainingRequest {
	TrainingRequest {
		dataset_id,
		algorithm: algorithm.to_owned(),
		params: Params::new(),
		test_size: Some(0.2),
		seed: Some(42),
		scaling: None,
	}
}

#[test]
fn test_random_forest_scenario() {
	let dir = tempfile::tempdir().unwrap();
	let workbench = test_workbench(dir.path());
	let dataset = workbench
		.upload_dataset(&write_csv(dir.path()), Some("animals"), Some("label"))
		.unwrap();
	assert_eq!(dataset.n_rows, 100);
	assert_eq!(dataset.n_columns, 5);
	let job_id = workbench
		.submit_training(request(dataset.id, "random_forest"))
		.unwrap();
	let job = workbench
		.wait_for_job(job_id, Duration::from_secs(120))
		.unwrap();
	assert_eq!(job.status, JobStatus::Finished, "{:?}", job.error_message);
	assert_eq!(job.progress, 100);
	let model = workbench.get_model(job.model_id.unwrap()).unwrap();
	let metrics: crate::evaluate::Metrics = serde_json::from_value(model.metrics.clone()).unwrap();
	assert_eq!(metrics.confusion_matrix.len(), 2);
	assert!((0.0..=1.0).contains(&metrics.accuracy));
	let importance = metrics.feature_importance.unwrap();
	assert_eq!(importance.len(), 4);
	assert!(importance.windows(2).all(|w| w[0].importance >= w[1].importance));
	assert!(metrics.roc.is_some());
	assert!(model.metrics.get("cross_validation").is_some());

	let record: Record =
		serde_json::from_str(r#"{"a": 2.1, "b": 1.9, "c": 2.2, "d": 2.0}"#).unwrap();
	let prediction = workbench.predict(model.id, &record).unwrap();
	assert_eq!(prediction.label, "cat");
	assert!(prediction.confidence.unwrap() > 0.5);
	let batch = workbench
		.predict_batch(model.id, &[record.clone(), record.clone()])
		.unwrap();
	assert_eq!(batch.predictions, vec!["cat", "cat"]);
	assert_eq!(batch.probabilities.unwrap()[0].len(), 2);
	let info = workbench.prediction_info(model.id).unwrap();
	assert_eq!(info.input_features, vec!["a", "b", "c", "d"]);
	assert_eq!(info.output_classes, vec!["cat", "dog"]);
	assert_eq!(info.dataset_id, dataset.id);
	assert_eq!(workbench.list_active_models().unwrap().len(), 1);

	workbench
		.update_model(
			model.id,
			ModelUpdate {
				is_active: Some(false),
				params: None,
			},
		)
		.unwrap();
	assert!(matches!(
		workbench.predict(model.id, &record),
		Err(Error::InvalidInput(_))
	));
	assert!(workbench.list_active_models().unwrap().is_empty());
	// An inactive model still describes itself.
	assert!(workbench.prediction_info(model.id).is_ok());
	assert!(workbench.delete_model(model.id).unwrap());
	assert!(!workbench.delete_model(model.id).unwrap());
	assert!(!workbench.delete_model(model.id).unwrap());
}

#[test]
fn test_unsupported_algorithm_creates_no_job() {
	let dir = tempfile::tempdir().unwrap();
	let workbench = test_workbench(dir.path());
	let dataset = workbench
		.upload_dataset(&write_csv(dir.path()), None, None)
		.unwrap();
	assert_eq!(dataset.target_column, "label");
	let error = workbench
		.submit_training(request(dataset.id, "not_a_real_algo"))
		.unwrap_err();
	assert!(matches!(error, Error::UnsupportedAlgorithm(_)));
	assert!(workbench.list_jobs().unwrap().is_empty());
	let error = workbench.submit_training(request(Id::new(), "knn")).unwrap_err();
	assert!(matches!(error, Error::NotFound { .. }));
}

#[test]
fn test_insufficient_class_samples_fails_job() {
	let dir = tempfile::tempdir().unwrap();
	let workbench = test_workbench(dir.path());
	let path = dir.path().join("tiny.csv");
	std::fs::write(&path, "x,y\n1,a\n2,a\n3,a\n4,a\n5,b\n").unwrap();
	let dataset = workbench.upload_dataset(&path, None, Some("y")).unwrap();
	let healthy = workbench
		.upload_dataset(&write_csv(dir.path()), None, Some("label"))
		.unwrap();
	let mut failing = request(dataset.id, "decision_tree");
	failing.test_size = Some(0.5);
	let failing_id = workbench.submit_training(failing).unwrap();
	let healthy_id = workbench
		.submit_training(request(healthy.id, "naive_bayes"))
		.unwrap();
	let job = workbench
		.wait_for_job(failing_id, Duration::from_secs(60))
		.unwrap();
	assert_eq!(job.status, JobStatus::Failed);
	assert!(job.error_message.unwrap().contains("stratification"));
	assert!(job.model_id.is_none());
	let job = workbench
		.wait_for_job(healthy_id, Duration::from_secs(60))
		.unwrap();
	assert_eq!(job.status, JobStatus::Finished);
	// A failed job cannot be cancelled.
	assert!(matches!(
		workbench.cancel_job(failing_id),
		Err(Error::InvalidInput(_))
	));
}

#[test]
fn test_sweep_and_roc_presence() {
	let dir = tempfile::tempdir().unwrap();
	let workbench = test_workbench(dir.path());
	let dataset = workbench
		.upload_dataset(&write_csv(dir.path()), None, Some("label"))
		.unwrap();
	let options = TrainOptions {
		cv_folds: 0,
		..Default::default()
	};
	let results = workbench
		.train_all(dataset.id, Algorithm::all(), &options)
		.unwrap();
	assert_eq!(results.len(), Algorithm::all().len());
	for (algorithm, result) in results.iter() {
		let model = result
			.as_ref()
			.unwrap_or_else(|error| panic!("{}: {}", algorithm, error));
		assert!(model.metrics.get("roc").is_some(), "{}", algorithm);
		assert!(model.metrics.get("auc").is_some(), "{}", algorithm);
	}
	assert_eq!(workbench.model_stats().unwrap().total, Algorithm::all().len());

	let job_id = workbench
		.submit_training(TrainingRequest {
			params: maplit::btreemap! {
				"probability".to_owned() => serde_json::json!(false),
			},
			..request(dataset.id, "svm")
		})
		.unwrap();
	let job = workbench
		.wait_for_job(job_id, Duration::from_secs(120))
		.unwrap();
	assert_eq!(job.status, JobStatus::Finished, "{:?}", job.error_message);
	let model = workbench.get_model(job.model_id.unwrap()).unwrap();
	assert!(model.metrics.get("roc").is_none());
	assert!(model.metrics.get("auc").is_none());
	let record: Record = serde_json::from_str(r#"{"a": -2, "b": -2, "c": -2, "d": -2}"#).unwrap();
	let prediction = workbench.predict(model.id, &record).unwrap();
	assert_eq!(prediction.label, "dog");
	assert!(prediction.confidence.is_none());
	assert!(prediction.probabilities.is_none());
}

#[test]
fn test_upload_validation() {
	let dir = tempfile::tempdir().unwrap();
	let workbench = test_workbench(dir.path());
	let path = dir.path().join("data.xlsx");
	std::fs::write(&path, b"not a spreadsheet").unwrap();
	assert!(matches!(
		workbench.upload_dataset(&path, None, None),
		Err(Error::UnsupportedFileType(_))
	));
	let csv = write_csv(dir.path());
	assert!(matches!(
		workbench.upload_dataset(&csv, None, Some("missing")),
		Err(Error::MissingTargetColumn(_))
	));
	// The rejected upload leaves no file behind.
	assert_eq!(
		std::fs::read_dir(workbench.config().uploads_dir())
			.unwrap()
			.count(),
		0
	);
	let small = Workbench::open(Config {
		data_dir: dir.path().join("small"),
		max_file_size: 10,
		..Default::default()
	})
	.unwrap();
	assert!(matches!(
		small.upload_dataset(&csv, None, None),
		Err(Error::FileTooLarge { .. })
	));
	let dataset = workbench.upload_dataset(&csv, None, None).unwrap();
	let renamed = workbench
		.update_dataset(
			dataset.id,
			DatasetUpdate {
				name: Some("renamed".to_owned()),
				target_column: Some("a".to_owned()),
			},
		)
		.unwrap();
	assert_eq!(renamed.name, "renamed");
	assert_eq!(renamed.target_column, "a");
	assert!(renamed.updated_at.is_some());
	assert!(matches!(
		workbench.update_dataset(
			dataset.id,
			DatasetUpdate {
				name: Some("ignored".to_owned()),
				target_column: Some("missing".to_owned()),
			},
		),
		Err(Error::MissingTargetColumn(_))
	));
	assert_eq!(workbench.get_dataset(dataset.id).unwrap().name, "renamed");
	assert!(matches!(
		workbench.update_dataset(Id::new(), DatasetUpdate::default()),
		Err(Error::NotFound { .. })
	));
	let details = workbench.dataset_info(dataset.id, 3).unwrap();
	assert_eq!(details.preview.len(), 3);
	assert_eq!(details.info.n_rows, 100);
	assert!(workbench.delete_dataset(dataset.id).unwrap());
	assert!(!workbench.delete_dataset(dataset.id).unwrap());
	assert!(!dataset.file_path.exists());
}

#[test]
fn test_cancel_and_cleanup() {
	let dir = tempfile::tempdir().unwrap();
	let workbench = test_workbench(dir.path());
	let store = &workbench.context.store;
	let queued = crate::store::test_job(Id::new());
	store.insert_job(&queued).unwrap();
	let cancelled = workbench.cancel_job(queued.id).unwrap();
	assert_eq!(cancelled.status, JobStatus::Cancelled);
	// Cancelling again is a no-op.
	assert_eq!(
		workbench.cancel_job(queued.id).unwrap().status,
		JobStatus::Cancelled
	);
	let running = crate::store::test_job(Id::new());
	store.insert_job(&running).unwrap();
	assert_eq!(workbench.cleanup_old_jobs(-1).unwrap(), 1);
	assert!(matches!(workbench.job(queued.id), Err(Error::NotFound { .. })));
	assert!(workbench.job(running.id).is_ok());
	assert_eq!(workbench.cleanup_old_models(30).unwrap(), 0);
}
