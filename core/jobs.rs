/*!
Training jobs run on a fixed pool of worker threads. A job moves `queued` → `running` → `finished`, `failed` or `cancelled`, and records its progress as it goes: 10 once the dataset is loaded, 30 once it is preprocessed, 80 once the model is trained and 100 once the artifact and model record are saved.

Cancellation is advisory. Cancelling marks the job record, and the worker checks the record between stages, so a fit that is already running finishes before the job stops. A cancelled job never becomes `finished` and never leaves an artifact behind.
*/

use crate::{
	error::{Error, Result},
	store::{JobStatus, TrainingJob},
	train::{train, TrainOptions, TrainStage},
	workbench::Context,
};
use crossbeam_channel::{unbounded, Sender};
use std::{
	panic::{catch_unwind, AssertUnwindSafe},
	sync::Arc,
	thread::JoinHandle,
};
use workbench_util::id::Id;

type Task = Box<dyn FnOnce() + Send + 'static>;

/// A fixed number of named threads pulling tasks from a shared channel. Dropping the pool waits for queued tasks to finish.
pub struct WorkerPool {
	sender: Option<Sender<Task>>,
	workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
	pub fn new(n_workers: usize) -> Result<WorkerPool> {
		let (sender, receiver) = unbounded::<Task>();
		let workers = (0..n_workers.max(1))
			.map(|index| {
				let receiver = receiver.clone();
				std::thread::Builder::new()
					.name(format!("workbench-worker-{}", index))
					.spawn(move || {
						for task in receiver.iter() {
							if catch_unwind(AssertUnwindSafe(task)).is_err() {
								tracing::error!("a worker task panicked");
							}
						}
					})
			})
			.collect::<std::io::Result<Vec<_>>>()?;
		Ok(WorkerPool {
			sender: Some(sender),
			workers,
		})
	}

	pub fn submit(&self, task: impl FnOnce() + Send + 'static) -> Result<()> {
		self.sender
			.as_ref()
			.ok_or_else(|| Error::Internal("the worker pool is shut down".to_owned()))?
			.send(Box::new(task))
			.map_err(|_| Error::Internal("the worker pool is shut down".to_owned()))
	}
}

impl Drop for WorkerPool {
	fn drop(&mut self) {
		self.sender.take();
		for worker in self.workers.drain(..) {
			if worker.join().is_err() {
				tracing::error!("a worker thread panicked");
			}
		}
	}
}

/// Run a job to completion on the current thread. Every failure, including a panic, is written to the job record.
pub(crate) fn run_job(context: Arc<Context>, job_id: Id) {
	let span = tracing::info_span!("job", %job_id);
	let _enter = span.enter();
	let result = match catch_unwind(AssertUnwindSafe(|| execute(&context, job_id))) {
		Ok(result) => result,
		Err(panic) => Err(Error::Internal(panic_message(panic.as_ref()))),
	};
	match result {
		Ok(()) => {}
		Err(Error::Cancelled) => tracing::info!("job cancelled"),
		Err(error) => {
			tracing::error!(%error, "job failed");
			let message = error.to_string();
			let marked = context.store.update_job(job_id, |job| {
				job.log(format!("failed: {}", message));
				job.error_message = Some(message.clone());
				job.complete(JobStatus::Failed);
			});
			if let Err(error) = marked {
				tracing::error!(%error, "failed to mark the job failed");
			}
		}
	}
}

fn execute(context: &Context, job_id: Id) -> Result<()> {
	let started = context.store.update_job(job_id, |job| {
		job.status = JobStatus::Running;
		job.progress = 0;
		job.log("started");
	})?;
	if !started {
		return Err(Error::Cancelled);
	}
	let job = context.store.get_job(job_id)?;
	tracing::info!(algorithm = %job.algorithm, dataset_id = %job.dataset_id, "job started");

	// load the dataset
	let dataset = context.store.get_dataset(job.dataset_id)?;
	let dataframe = context.load_dataset(&dataset)?;
	advance(context, job_id, 10, format!("loaded {} rows", dataframe.nrows()))?;

	// clean and encode it
	let data = context.prepare(&dataframe, &dataset.target_column)?;
	advance(
		context,
		job_id,
		30,
		format!(
			"preprocessed {} rows and {} features",
			data.features.nrows(),
			data.feature_columns.len()
		),
	)?;

	// train and evaluate
	let options = TrainOptions {
		test_size: job.test_size,
		seed: job.seed,
		scaling: job.scaling,
		cv_folds: context.config.cv_folds,
	};
	let result = train(
		data.features.view(),
		&data.target,
		&data.feature_columns,
		job.algorithm,
		&job.params,
		&options,
		&|stage| check_cancelled(context, job_id, stage),
	)?;
	advance(
		context,
		job_id,
		80,
		format!("trained with accuracy {:.4}", result.metrics.accuracy),
	)?;

	// persist the artifact, then the model record and the terminal job state together
	let model_id = result.artifact.model_id;
	let artifact_path = context.artifacts.save(&result.artifact, model_id)?;
	let model = context.model_record(dataset.id, &result, artifact_path)?;
	if !context.store.finish_job(job_id, &model)? {
		context.artifacts.delete(model_id)?;
		return Err(Error::Cancelled);
	}
	tracing::info!(%model_id, "job finished");
	Ok(())
}

fn advance(context: &Context, job_id: Id, progress: u8, line: String) -> Result<()> {
	tracing::debug!(progress, "{}", line);
	let applied = context.store.update_job(job_id, |job| {
		job.progress = progress;
		job.log(line);
	})?;
	if applied {
		Ok(())
	} else {
		Err(Error::Cancelled)
	}
}

fn check_cancelled(context: &Context, job_id: Id, stage: TrainStage) -> Result<()> {
	tracing::debug!(?stage, "training stage");
	match context.store.get_job(job_id)?.status {
		JobStatus::Cancelled => Err(Error::Cancelled),
		_ => Ok(()),
	}
}

/// Mark a queued or running job cancelled. Cancelling a cancelled job does nothing. A finished or failed job cannot be cancelled.
pub(crate) fn cancel(context: &Context, job_id: Id) -> Result<TrainingJob> {
	let job = context.store.get_job(job_id)?;
	let cannot_cancel = |status: JobStatus| {
		Error::InvalidInput(format!("cannot cancel a completed job, its status is {}", status))
	};
	match job.status {
		JobStatus::Cancelled => return Ok(job),
		JobStatus::Finished | JobStatus::Failed => return Err(cannot_cancel(job.status)),
		JobStatus::Queued | JobStatus::Running => {}
	}
	let applied = context.store.update_job(job_id, |job| {
		job.log("cancelled");
		job.complete(JobStatus::Cancelled);
	})?;
	let job = context.store.get_job(job_id)?;
	if !applied && job.status != JobStatus::Cancelled {
		return Err(cannot_cancel(job.status));
	}
	tracing::info!(%job_id, "job cancelled by request");
	Ok(job)
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
	if let Some(message) = panic.downcast_ref::<&str>() {
		format!("panic: {}", message)
	} else if let Some(message) = panic.downcast_ref::<String>() {
		format!("panic: {}", message)
	} else {
		"panic".to_owned()
	}
}

#[test]
fn test_worker_pool_survives_panics() {
	let (sender, receiver) = crossbeam_channel::unbounded();
	{
		let pool = WorkerPool::new(2).unwrap();
		pool.submit(|| panic!("boom")).unwrap();
		for i in 0..4 {
			let sender = sender.clone();
			pool.submit(move || sender.send(i).unwrap()).unwrap();
		}
	}
	drop(sender);
	let mut received: Vec<i32> = receiver.iter().collect();
	received.sort_unstable();
	assert_eq!(received, vec![0, 1, 2, 3]);
}
