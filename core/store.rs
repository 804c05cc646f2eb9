/*!
The record store keeps datasets, models and training jobs as one pretty printed JSON file per record under `datasets/`, `models/` and `jobs/`. Every write goes to a temporary file that is renamed into place, so a reader never sees a partial record. Writes are serialized by one lock, which also makes job transitions compare-and-set: once a job is terminal, no later update applies.

The lock is an in-process mutex plus an exclusive advisory lock on `store.lock`, so stores opened by separate processes on the same directory serialize with each other. Each open store also holds an exclusive lock on `owners/<owner>.lock` for its lifetime. Jobs record the owner that runs them, and a job whose owner no longer holds its lock was interrupted and can be marked failed.
*/

use crate::{
	algorithm::{Algorithm, Params},
	error::{Error, RecordKind, Result},
};
use chrono::{DateTime, Utc};
use fs2::FileExt;
use parking_lot::{Mutex, MutexGuard};
use serde::{de::DeserializeOwned, Serialize};
use std::{
	collections::BTreeMap,
	fs::File,
	io::Write,
	path::{Path, PathBuf},
};
use workbench_features::ScalingMethod;
use workbench_util::id::Id;

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct DatasetRecord {
	pub id: Id,
	pub name: String,
	/// The name of the uploaded file.
	pub file_name: String,
	/// Where the upload was copied to.
	pub file_path: PathBuf,
	pub target_column: String,
	pub n_rows: usize,
	pub n_columns: usize,
	pub column_names: Vec<String>,
	pub created_at: DateTime<Utc>,
	#[serde(default)]
	pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ModelRecord {
	pub id: Id,
	pub dataset_id: Id,
	pub algorithm: Algorithm,
	pub accuracy: f32,
	/// The metrics bundle, with the cross validation summary under `cross_validation`.
	pub metrics: serde_json::Value,
	pub params: Params,
	pub is_active: bool,
	pub artifact_path: PathBuf,
	pub training_time_seconds: f64,
	pub created_at: DateTime<Utc>,
	pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
	Queued,
	Running,
	Finished,
	Failed,
	Cancelled,
}

impl JobStatus {
	pub fn is_terminal(&self) -> bool {
		matches!(
			self,
			JobStatus::Finished | JobStatus::Failed | JobStatus::Cancelled
		)
	}
}

impl std::fmt::Display for JobStatus {
	fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
		let s = match self {
			JobStatus::Queued => "queued",
			JobStatus::Running => "running",
			JobStatus::Finished => "finished",
			JobStatus::Failed => "failed",
			JobStatus::Cancelled => "cancelled",
		};
		write!(f, "{}", s)
	}
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TrainingJob {
	pub id: Id,
	pub dataset_id: Id,
	pub algorithm: Algorithm,
	pub params: Params,
	pub test_size: f32,
	pub seed: u64,
	pub scaling: ScalingMethod,
	pub status: JobStatus,
	/// 0 to 100.
	pub progress: u8,
	pub logs: Vec<String>,
	pub error_message: Option<String>,
	pub model_id: Option<Id>,
	/// The store owner whose workers run this job.
	#[serde(default)]
	pub owner: Option<Id>,
	pub created_at: DateTime<Utc>,
	pub updated_at: DateTime<Utc>,
	pub completed_at: Option<DateTime<Utc>>,
}

impl TrainingJob {
	/// Append a timestamped log line.
	pub fn log(&mut self, line: impl AsRef<str>) {
		self.logs.push(format!(
			"[{}] {}",
			Utc::now().format("%Y-%m-%d %H:%M:%S"),
			line.as_ref()
		));
	}

	/// Move to a terminal status.
	pub fn complete(&mut self, status: JobStatus) {
		let now = Utc::now();
		self.status = status;
		self.completed_at = Some(now);
	}
}

#[derive(Clone, Debug, PartialEq, serde::Serialize)]
pub struct ModelStats {
	pub total: usize,
	pub active: usize,
	pub by_algorithm: BTreeMap<Algorithm, AlgorithmStats>,
}

#[derive(Clone, Debug, PartialEq, serde::Serialize)]
pub struct AlgorithmStats {
	pub count: usize,
	pub mean_accuracy: f32,
}

pub struct Store {
	dir: PathBuf,
	mutex: Mutex<()>,
	owner: Id,
	_owner_lock: File,
}

/// Held while reading and writing records. Dropping it releases both the mutex and the file lock.
struct StoreGuard<'a> {
	_mutex: MutexGuard<'a, ()>,
	_file: File,
}

const OWNERS_DIR: &str = "owners";
const LOCK_FILE: &str = "store.lock";

impl Store {
	pub fn open(dir: impl Into<PathBuf>) -> Result<Store> {
		let dir = dir.into();
		for kind in [RecordKind::Dataset, RecordKind::Model, RecordKind::Job] {
			std::fs::create_dir_all(dir.join(kind_dir(kind)))?;
		}
		std::fs::create_dir_all(dir.join(OWNERS_DIR))?;
		let owner = Id::new();
		let owner_lock = File::create(owner_lock_path(&dir, owner))?;
		owner_lock.lock_exclusive()?;
		Ok(Store {
			dir,
			mutex: Mutex::new(()),
			owner,
			_owner_lock: owner_lock,
		})
	}

	/// Identifies this store among every store open on the same directory.
	pub fn owner(&self) -> Id {
		self.owner
	}

	fn lock(&self) -> Result<StoreGuard<'_>> {
		let mutex = self.mutex.lock();
		let file = std::fs::OpenOptions::new()
			.create(true)
			.write(true)
			.open(self.dir.join(LOCK_FILE))?;
		file.lock_exclusive()?;
		Ok(StoreGuard {
			_mutex: mutex,
			_file: file,
		})
	}

	fn path(&self, kind: RecordKind, id: Id) -> PathBuf {
		self.dir.join(kind_dir(kind)).join(format!("{}.json", id))
	}

	fn write<T: Serialize>(&self, kind: RecordKind, id: Id, record: &T) -> Result<()> {
		let path = self.path(kind, id);
		let dir = path.parent().unwrap_or(&self.dir);
		let mut file = tempfile::NamedTempFile::new_in(dir)?;
		serde_json::to_writer_pretty(&mut file, record)?;
		file.write_all(b"\n")?;
		file.persist(&path).map_err(|error| error.error)?;
		Ok(())
	}

	fn read<T: DeserializeOwned>(&self, kind: RecordKind, id: Id) -> Result<Option<T>> {
		read_json(&self.path(kind, id))
	}

	fn get<T: DeserializeOwned>(&self, kind: RecordKind, id: Id) -> Result<T> {
		self.read(kind, id)?.ok_or_else(|| Error::not_found(kind, id))
	}

	fn list<T: DeserializeOwned>(&self, kind: RecordKind) -> Result<Vec<T>> {
		let mut records = Vec::new();
		for entry in std::fs::read_dir(self.dir.join(kind_dir(kind)))? {
			let path = entry?.path();
			if path.extension().and_then(|e| e.to_str()) != Some("json") {
				continue;
			}
			if let Some(record) = read_json(&path)? {
				records.push(record);
			}
		}
		Ok(records)
	}

	fn remove(&self, kind: RecordKind, id: Id) -> Result<bool> {
		let _guard = self.lock()?;
		match std::fs::remove_file(self.path(kind, id)) {
			Ok(()) => Ok(true),
			Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(false),
			Err(error) => Err(error.into()),
		}
	}

	pub fn insert_dataset(&self, dataset: &DatasetRecord) -> Result<()> {
		let _guard = self.lock()?;
		self.write(RecordKind::Dataset, dataset.id, dataset)
	}

	pub fn get_dataset(&self, id: Id) -> Result<DatasetRecord> {
		self.get(RecordKind::Dataset, id)
	}

	/// Newest first.
	pub fn list_datasets(&self) -> Result<Vec<DatasetRecord>> {
		let mut datasets: Vec<DatasetRecord> = self.list(RecordKind::Dataset)?;
		datasets.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
		Ok(datasets)
	}

	/// Apply `f` to a dataset and stamp `updated_at`.
	pub fn update_dataset(
		&self,
		id: Id,
		f: impl FnOnce(&mut DatasetRecord) -> Result<()>,
	) -> Result<DatasetRecord> {
		let _guard = self.lock()?;
		let mut dataset: DatasetRecord = self.get(RecordKind::Dataset, id)?;
		f(&mut dataset)?;
		dataset.updated_at = Some(Utc::now());
		self.write(RecordKind::Dataset, id, &dataset)?;
		Ok(dataset)
	}

	pub fn delete_dataset(&self, id: Id) -> Result<bool> {
		self.remove(RecordKind::Dataset, id)
	}

	pub fn insert_model(&self, model: &ModelRecord) -> Result<()> {
		let _guard = self.lock()?;
		self.write(RecordKind::Model, model.id, model)
	}

	pub fn get_model(&self, id: Id) -> Result<ModelRecord> {
		self.get(RecordKind::Model, id)
	}

	/// Newest first.
	pub fn list_models(&self) -> Result<Vec<ModelRecord>> {
		let mut models: Vec<ModelRecord> = self.list(RecordKind::Model)?;
		models.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
		Ok(models)
	}

	/// Apply `f` to a model and stamp `updated_at`.
	pub fn update_model(&self, id: Id, f: impl FnOnce(&mut ModelRecord)) -> Result<ModelRecord> {
		let _guard = self.lock()?;
		let mut model: ModelRecord = self.get(RecordKind::Model, id)?;
		f(&mut model);
		model.updated_at = Utc::now();
		self.write(RecordKind::Model, id, &model)?;
		Ok(model)
	}

	pub fn delete_model(&self, id: Id) -> Result<bool> {
		self.remove(RecordKind::Model, id)
	}

	/// The models that serve predictions, newest first.
	pub fn active_models(&self) -> Result<Vec<ModelRecord>> {
		Ok(self
			.list_models()?
			.into_iter()
			.filter(|model| model.is_active)
			.collect())
	}

	pub fn models_for_dataset(&self, dataset_id: Id) -> Result<Vec<ModelRecord>> {
		Ok(self
			.list_models()?
			.into_iter()
			.filter(|model| model.dataset_id == dataset_id)
			.collect())
	}

	pub fn models_older_than(&self, cutoff: DateTime<Utc>) -> Result<Vec<ModelRecord>> {
		Ok(self
			.list_models()?
			.into_iter()
			.filter(|model| model.created_at < cutoff)
			.collect())
	}

	pub fn model_stats(&self) -> Result<ModelStats> {
		let models = self.list_models()?;
		let mut accuracies: BTreeMap<Algorithm, Vec<f32>> = BTreeMap::new();
		for model in models.iter() {
			accuracies.entry(model.algorithm).or_default().push(model.accuracy);
		}
		let by_algorithm = accuracies
			.into_iter()
			.map(|(algorithm, accuracies)| {
				let count = accuracies.len();
				let mean_accuracy = accuracies.iter().sum::<f32>() / count as f32;
				(
					algorithm,
					AlgorithmStats {
						count,
						mean_accuracy,
					},
				)
			})
			.collect();
		Ok(ModelStats {
			total: models.len(),
			active: models.iter().filter(|model| model.is_active).count(),
			by_algorithm,
		})
	}

	pub fn insert_job(&self, job: &TrainingJob) -> Result<()> {
		let _guard = self.lock()?;
		self.write(RecordKind::Job, job.id, job)
	}

	pub fn get_job(&self, id: Id) -> Result<TrainingJob> {
		self.get(RecordKind::Job, id)
	}

	/// Newest first.
	pub fn list_jobs(&self) -> Result<Vec<TrainingJob>> {
		let mut jobs: Vec<TrainingJob> = self.list(RecordKind::Job)?;
		jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
		Ok(jobs)
	}

	/// Apply `f` to a job unless it is already terminal. Returns whether the update applied.
	pub fn update_job(&self, id: Id, f: impl FnOnce(&mut TrainingJob)) -> Result<bool> {
		let _guard = self.lock()?;
		let mut job: TrainingJob = self.get(RecordKind::Job, id)?;
		if job.status.is_terminal() {
			return Ok(false);
		}
		f(&mut job);
		job.updated_at = Utc::now();
		self.write(RecordKind::Job, id, &job)?;
		Ok(true)
	}

	/// Write `model` and mark the job finished as one step. Returns false, writing nothing, if the job is already terminal.
	pub fn finish_job(&self, job_id: Id, model: &ModelRecord) -> Result<bool> {
		let _guard = self.lock()?;
		let mut job: TrainingJob = self.get(RecordKind::Job, job_id)?;
		if job.status.is_terminal() {
			return Ok(false);
		}
		self.write(RecordKind::Model, model.id, model)?;
		job.progress = 100;
		job.model_id = Some(model.id);
		job.log(format!("saved model {}", model.id));
		job.complete(JobStatus::Finished);
		job.updated_at = Utc::now();
		self.write(RecordKind::Job, job_id, &job)?;
		Ok(true)
	}

	/// Mark failed every queued or running job whose owner has gone away without finishing it, and remove the lock files of owners that are gone. Returns the ids of the jobs marked failed.
	pub fn fail_orphaned_jobs(&self) -> Result<Vec<Id>> {
		let _guard = self.lock()?;
		let mut alive = BTreeMap::new();
		let mut failed = Vec::new();
		let jobs: Vec<TrainingJob> = self.list(RecordKind::Job)?;
		for mut job in jobs.into_iter().filter(|job| !job.status.is_terminal()) {
			let owner_alive = match job.owner {
				Some(owner) if owner == self.owner => true,
				Some(owner) => match alive.get(&owner) {
					Some(owner_alive) => *owner_alive,
					None => {
						let owner_alive = self.owner_alive(owner)?;
						alive.insert(owner, owner_alive);
						owner_alive
					}
				},
				None => false,
			};
			if owner_alive {
				continue;
			}
			let message = "the process running this job exited before it finished".to_owned();
			job.log(format!("failed: {}", message));
			job.error_message = Some(message);
			job.complete(JobStatus::Failed);
			job.updated_at = Utc::now();
			self.write(RecordKind::Job, job.id, &job)?;
			failed.push(job.id);
		}
		for entry in std::fs::read_dir(self.dir.join(OWNERS_DIR))? {
			let path = entry?.path();
			let owner = path
				.file_stem()
				.and_then(|stem| stem.to_str())
				.and_then(|stem| stem.parse::<Id>().ok());
			if let Some(owner) = owner {
				if owner != self.owner && !self.owner_alive(owner)? {
					remove_if_exists(&path)?;
				}
			}
		}
		Ok(failed)
	}

	/// An owner is alive while its store holds the owner lock.
	fn owner_alive(&self, owner: Id) -> Result<bool> {
		let file = match File::open(owner_lock_path(&self.dir, owner)) {
			Ok(file) => file,
			Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(false),
			Err(error) => return Err(error.into()),
		};
		match file.try_lock_exclusive() {
			Ok(()) => Ok(false),
			Err(error) if error.raw_os_error() == fs2::lock_contended_error().raw_os_error() => {
				Ok(true)
			}
			Err(error) => Err(error.into()),
		}
	}

	pub fn delete_job(&self, id: Id) -> Result<bool> {
		self.remove(RecordKind::Job, id)
	}

	pub fn jobs_older_than(&self, cutoff: DateTime<Utc>) -> Result<Vec<TrainingJob>> {
		Ok(self
			.list_jobs()?
			.into_iter()
			.filter(|job| job.created_at < cutoff)
			.collect())
	}
}

impl Drop for Store {
	fn drop(&mut self) {
		if let Err(error) = remove_if_exists(&owner_lock_path(&self.dir, self.owner)) {
			tracing::warn!(%error, "failed to remove the owner lock file");
		}
	}
}

fn owner_lock_path(dir: &Path, owner: Id) -> PathBuf {
	dir.join(OWNERS_DIR).join(format!("{}.lock", owner))
}

fn remove_if_exists(path: &Path) -> std::io::Result<()> {
	match std::fs::remove_file(path) {
		Ok(()) => Ok(()),
		Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(()),
		Err(error) => Err(error),
	}
}

fn kind_dir(kind: RecordKind) -> &'static str {
	match kind {
		RecordKind::Dataset => "datasets",
		RecordKind::Model => "models",
		RecordKind::Job => "jobs",
	}
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
	match std::fs::read(path) {
		Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
		Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(None),
		Err(error) => Err(error.into()),
	}
}

#[cfg(test)]
pub(crate) fn test_job(dataset_id: Id) -> TrainingJob {
	let now = Utc::now();
	TrainingJob {
		id: Id::new(),
		dataset_id,
		algorithm: Algorithm::NaiveBayes,
		params: Params::new(),
		test_size: 0.2,
		seed: 42,
		scaling: ScalingMethod::Standard,
		status: JobStatus::Queued,
		progress: 0,
		logs: Vec::new(),
		error_message: None,
		model_id: None,
		owner: None,
		created_at: now,
		updated_at: now,
		completed_at: None,
	}
}

#[cfg(test)]
fn test_model(dataset_id: Id, algorithm: Algorithm, accuracy: f32) -> ModelRecord {
	let now = Utc::now();
	ModelRecord {
		id: Id::new(),
		dataset_id,
		algorithm,
		accuracy,
		metrics: serde_json::json!({ "accuracy": accuracy }),
		params: algorithm.default_params(),
		is_active: true,
		artifact_path: PathBuf::from("model.workbench"),
		training_time_seconds: 0.5,
		created_at: now,
		updated_at: now,
	}
}

#[test]
fn test_job_transitions_are_final() {
	let dir = tempfile::tempdir().unwrap();
	let store = Store::open(dir.path()).unwrap();
	let job = test_job(Id::new());
	store.insert_job(&job).unwrap();
	assert!(store
		.update_job(job.id, |job| {
			job.status = JobStatus::Running;
			job.progress = 10;
		})
		.unwrap());
	let model = test_model(job.dataset_id, Algorithm::NaiveBayes, 0.9);
	assert!(store.finish_job(job.id, &model).unwrap());
	let finished = store.get_job(job.id).unwrap();
	assert_eq!(finished.status, JobStatus::Finished);
	assert_eq!(finished.progress, 100);
	assert_eq!(finished.model_id, Some(model.id));
	assert!(finished.completed_at.is_some());
	// A terminal job cannot be changed again.
	assert!(!store
		.update_job(job.id, |job| job.complete(JobStatus::Failed))
		.unwrap());
	let other = test_model(job.dataset_id, Algorithm::NaiveBayes, 0.1);
	assert!(!store.finish_job(job.id, &other).unwrap());
	assert!(matches!(
		store.get_model(other.id),
		Err(Error::NotFound { .. })
	));
	assert_eq!(store.get_job(job.id).unwrap().status, JobStatus::Finished);
}

#[test]
fn test_models() {
	let dir = tempfile::tempdir().unwrap();
	let store = Store::open(dir.path()).unwrap();
	let dataset_id = Id::new();
	let a = test_model(dataset_id, Algorithm::Knn, 0.5);
	let b = test_model(dataset_id, Algorithm::Knn, 1.0);
	let c = test_model(Id::new(), Algorithm::Svm, 0.75);
	for model in [&a, &b, &c] {
		store.insert_model(model).unwrap();
	}
	assert_eq!(store.list_models().unwrap().len(), 3);
	assert_eq!(store.models_for_dataset(dataset_id).unwrap().len(), 2);
	let updated = store.update_model(c.id, |model| model.is_active = false).unwrap();
	assert!(!updated.is_active);
	let stats = store.model_stats().unwrap();
	assert_eq!(stats.total, 3);
	assert_eq!(stats.active, 2);
	assert_eq!(stats.by_algorithm[&Algorithm::Knn].count, 2);
	assert_eq!(stats.by_algorithm[&Algorithm::Knn].mean_accuracy, 0.75);
	assert!(store.delete_model(a.id).unwrap());
	assert!(!store.delete_model(a.id).unwrap());
	assert!(store
		.models_older_than(Utc::now() + chrono::Duration::days(1))
		.unwrap()
		.len()
		== 2);
}

#[test]
fn test_stores_on_one_directory_share_job_transitions() {
	let dir = tempfile::tempdir().unwrap();
	let worker = Store::open(dir.path()).unwrap();
	let other = Store::open(dir.path()).unwrap();
	let mut job = test_job(Id::new());
	job.owner = Some(worker.owner());
	job.status = JobStatus::Running;
	worker.insert_job(&job).unwrap();
	// The worker's store is still open, so its job is left alone.
	assert!(other.fail_orphaned_jobs().unwrap().is_empty());
	assert!(other
		.update_job(job.id, |job| job.complete(JobStatus::Cancelled))
		.unwrap());
	let model = test_model(job.dataset_id, Algorithm::NaiveBayes, 0.9);
	assert!(!worker.finish_job(job.id, &model).unwrap());
	assert_eq!(worker.get_job(job.id).unwrap().status, JobStatus::Cancelled);
}

#[test]
fn test_orphaned_jobs_fail() {
	let dir = tempfile::tempdir().unwrap();
	let crashed = Store::open(dir.path()).unwrap();
	let mut running = test_job(Id::new());
	running.owner = Some(crashed.owner());
	running.status = JobStatus::Running;
	crashed.insert_job(&running).unwrap();
	let mut finished = test_job(Id::new());
	finished.owner = Some(crashed.owner());
	finished.complete(JobStatus::Finished);
	crashed.insert_job(&finished).unwrap();
	let unowned = test_job(Id::new());
	crashed.insert_job(&unowned).unwrap();
	let crashed_owner = crashed.owner();
	drop(crashed);
	let store = Store::open(dir.path()).unwrap();
	let mut failed = store.fail_orphaned_jobs().unwrap();
	failed.sort();
	let mut expected = vec![running.id, unowned.id];
	expected.sort();
	assert_eq!(failed, expected);
	let running = store.get_job(running.id).unwrap();
	assert_eq!(running.status, JobStatus::Failed);
	assert!(running.error_message.is_some());
	assert_eq!(store.get_job(finished.id).unwrap().status, JobStatus::Finished);
	assert!(!owner_lock_path(dir.path(), crashed_owner).exists());
	assert!(store.fail_orphaned_jobs().unwrap().is_empty());
}
