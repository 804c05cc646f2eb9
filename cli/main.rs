//! This module contains the main entrypoint to the workbench cli.

use anyhow::{anyhow, Context, Result};
use backtrace::Backtrace;
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use std::{
	path::PathBuf,
	sync::Mutex,
	time::Duration,
};
use tracing_subscriber::EnvFilter;
use workbench_core::{
	config::LogFormat, preprocess::Record, store::JobStatus, train::TrainOptions, Algorithm,
	Config, DatasetUpdate, Id, ModelUpdate, Params, TrainingRequest, Workbench,
};
use workbench_features::ScalingMethod;

#[derive(Parser)]
#[command(
	name = "workbench",
	about = "Upload datasets, train classifiers and make predictions.",
	disable_help_subcommand = true
)]
struct Options {
	/// The path to a YAML config file.
	#[arg(long, global = true, env = "WORKBENCH_CONFIG")]
	config: Option<PathBuf>,
	/// Overrides the config's data directory.
	#[arg(long, global = true)]
	data_dir: Option<PathBuf>,
	#[command(subcommand)]
	command: Command,
}

#[derive(Subcommand)]
enum Command {
	/// Manage datasets.
	#[command(subcommand)]
	Dataset(DatasetCommand),
	/// Train a model and wait for it.
	Train(TrainArgs),
	/// Inspect and cancel training jobs.
	#[command(subcommand)]
	Job(JobCommand),
	/// Train every algorithm on a dataset.
	Sweep(SweepArgs),
	/// Predict with a model.
	Predict(PredictArgs),
	/// Manage models.
	#[command(subcommand)]
	Model(ModelCommand),
	/// List the available algorithms and their default params.
	Algorithms,
	/// Delete old models and finished jobs.
	Cleanup(CleanupArgs),
}

#[derive(Subcommand)]
enum DatasetCommand {
	/// Upload a csv file.
	Upload {
		file: PathBuf,
		#[arg(long)]
		name: Option<String>,
		/// The column to predict. Defaults to the last column.
		#[arg(long)]
		target: Option<String>,
	},
	List,
	/// Show a dataset's columns and first rows.
	Show {
		id: Id,
		#[arg(long, default_value_t = 5)]
		preview: usize,
	},
	/// Rename a dataset or change its target column.
	Update {
		id: Id,
		#[arg(long)]
		name: Option<String>,
		#[arg(long)]
		target: Option<String>,
	},
	Delete {
		id: Id,
	},
}

#[derive(clap::Args)]
struct TrainArgs {
	dataset_id: Id,
	algorithm: String,
	/// A hyperparameter as key=value. The value is parsed as JSON, or taken as a string if that fails.
	#[arg(long = "param", value_parser = parse_param)]
	params: Vec<(String, serde_json::Value)>,
	#[arg(long)]
	test_size: Option<f32>,
	#[arg(long)]
	seed: Option<u64>,
	#[arg(long, value_enum)]
	scaling: Option<ScalingArg>,
	/// Give up waiting after this many seconds.
	#[arg(long, default_value_t = 3600)]
	timeout: u64,
	/// Print the job id and return without waiting.
	#[arg(long)]
	no_wait: bool,
}

#[derive(Subcommand)]
enum JobCommand {
	Status { id: Id },
	List,
	Cancel { id: Id },
}

#[derive(clap::Args)]
struct SweepArgs {
	dataset_id: Id,
	/// Limit the sweep to these algorithms. Defaults to all of them.
	#[arg(long = "algorithm")]
	algorithms: Vec<String>,
	#[arg(long)]
	test_size: Option<f32>,
	#[arg(long)]
	seed: Option<u64>,
	#[arg(long, value_enum)]
	scaling: Option<ScalingArg>,
	#[arg(long)]
	cv_folds: Option<usize>,
}

#[derive(clap::Args)]
struct PredictArgs {
	model_id: Id,
	/// A JSON file holding one record or an array of records.
	#[arg(long, conflicts_with = "json", required_unless_present = "json")]
	input: Option<PathBuf>,
	/// One record or an array of records as inline JSON.
	#[arg(long)]
	json: Option<String>,
}

#[derive(Subcommand)]
enum ModelCommand {
	List,
	/// List the models that serve predictions.
	Active,
	Show { id: Id },
	/// Show a model's input features and output classes.
	Info { id: Id },
	Activate { id: Id },
	Deactivate { id: Id },
	Delete { id: Id },
	Stats,
}

#[derive(clap::Args)]
struct CleanupArgs {
	/// Defaults to the config's model retention.
	#[arg(long)]
	model_days: Option<i64>,
	/// Defaults to the config's job retention.
	#[arg(long)]
	job_days: Option<i64>,
}

#[derive(Clone, Copy, ValueEnum)]
enum ScalingArg {
	Standard,
	MinMax,
}

impl From<ScalingArg> for ScalingMethod {
	fn from(value: ScalingArg) -> ScalingMethod {
		match value {
			ScalingArg::Standard => ScalingMethod::Standard,
			ScalingArg::MinMax => ScalingMethod::MinMax,
		}
	}
}

fn parse_param(s: &str) -> Result<(String, serde_json::Value), String> {
	let (key, value) = s
		.split_once('=')
		.ok_or_else(|| format!("expected key=value, got \"{}\"", s))?;
	let value = serde_json::from_str(value)
		.unwrap_or_else(|_| serde_json::Value::String(value.to_owned()));
	Ok((key.to_owned(), value))
}

static PANIC_MESSAGE_AND_BACKTRACE: Mutex<Option<(String, Backtrace)>> = Mutex::new(None);

fn main() {
	let options = Options::parse();
	// Store panic messages instead of printing them, so they are reported like any other error.
	std::panic::set_hook(Box::new(|panic_info| {
		if let Ok(mut slot) = PANIC_MESSAGE_AND_BACKTRACE.lock() {
			slot.replace((panic_info.to_string(), Backtrace::new()));
		}
	}));
	let result = match std::panic::catch_unwind(|| run(options)) {
		Ok(result) => result,
		Err(_) => {
			let panic = PANIC_MESSAGE_AND_BACKTRACE
				.lock()
				.ok()
				.and_then(|mut slot| slot.take());
			match panic {
				Some((message, backtrace)) => Err(anyhow!("{}\n{:?}", message, backtrace)),
				None => Err(anyhow!("panicked")),
			}
		}
	};
	if let Err(error) = result {
		eprintln!("{}: {:#}", "error".red().bold(), error);
		std::process::exit(1);
	}
}

fn load_config(options: &Options) -> Result<Config> {
	let mut config = match &options.config {
		Some(path) => Config::from_path(path)
			.with_context(|| format!("failed to load the config from {}", path.display()))?,
		None => Config::default(),
	};
	if let Some(data_dir) = &options.data_dir {
		config.data_dir = data_dir.clone();
	}
	Ok(config)
}

fn init_tracing(config: &Config) {
	let filter =
		EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));
	let builder = tracing_subscriber::fmt()
		.with_env_filter(filter)
		.with_writer(std::io::stderr);
	match config.log_format {
		LogFormat::Json => builder.json().init(),
		LogFormat::Pretty => builder.init(),
	}
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
	println!("{}", serde_json::to_string_pretty(value)?);
	Ok(())
}

fn run(options: Options) -> Result<()> {
	let config = load_config(&options)?;
	init_tracing(&config);
	tracing::debug!(data_dir = %config.data_dir.display(), "opening the workbench");
	let workbench = Workbench::open(config)?;
	match options.command {
		Command::Dataset(command) => cli_dataset(&workbench, command),
		Command::Train(args) => cli_train(&workbench, args),
		Command::Job(command) => cli_job(&workbench, command),
		Command::Sweep(args) => cli_sweep(&workbench, args),
		Command::Predict(args) => cli_predict(&workbench, args),
		Command::Model(command) => cli_model(&workbench, command),
		Command::Algorithms => print_json(&workbench.list_algorithms()),
		Command::Cleanup(args) => cli_cleanup(&workbench, args),
	}
}

fn cli_dataset(workbench: &Workbench, command: DatasetCommand) -> Result<()> {
	match command {
		DatasetCommand::Upload { file, name, target } => {
			let dataset =
				workbench.upload_dataset(&file, name.as_deref(), target.as_deref())?;
			print_json(&dataset)
		}
		DatasetCommand::List => print_json(&workbench.list_datasets()?),
		DatasetCommand::Show { id, preview } => print_json(&workbench.dataset_info(id, preview)?),
		DatasetCommand::Update { id, name, target } => {
			let update = DatasetUpdate {
				name,
				target_column: target,
			};
			print_json(&workbench.update_dataset(id, update)?)
		}
		DatasetCommand::Delete { id } => {
			let deleted = workbench.delete_dataset(id)?;
			print_json(&serde_json::json!({ "id": id, "deleted": deleted }))
		}
	}
}

fn cli_train(workbench: &Workbench, args: TrainArgs) -> Result<()> {
	let request = TrainingRequest {
		dataset_id: args.dataset_id,
		algorithm: args.algorithm,
		params: args.params.into_iter().collect::<Params>(),
		test_size: args.test_size,
		seed: args.seed,
		scaling: args.scaling.map(Into::into),
	};
	let job_id = workbench.submit_training(request)?;
	if args.no_wait {
		return print_json(&serde_json::json!({ "job_id": job_id }));
	}
	eprintln!("Training job {} submitted. Waiting for it to finish.", job_id);
	let job = workbench.wait_for_job(job_id, Duration::from_secs(args.timeout))?;
	match job.status {
		JobStatus::Finished => {
			let model_id = job
				.model_id
				.ok_or_else(|| anyhow!("job {} finished without a model", job_id))?;
			print_json(&workbench.get_model(model_id)?)
		}
		JobStatus::Failed => {
			print_json(&job)?;
			Err(anyhow!(
				"job {} failed: {}",
				job_id,
				job.error_message.unwrap_or_default()
			))
		}
		JobStatus::Cancelled => {
			print_json(&job)?;
			Err(anyhow!("job {} was cancelled", job_id))
		}
		JobStatus::Queued | JobStatus::Running => {
			print_json(&job)?;
			Err(anyhow!(
				"job {} did not finish within {} seconds",
				job_id,
				args.timeout
			))
		}
	}
}

fn cli_job(workbench: &Workbench, command: JobCommand) -> Result<()> {
	match command {
		JobCommand::Status { id } => print_json(&workbench.job(id)?),
		JobCommand::List => print_json(&workbench.list_jobs()?),
		JobCommand::Cancel { id } => print_json(&workbench.cancel_job(id)?),
	}
}

fn cli_sweep(workbench: &Workbench, args: SweepArgs) -> Result<()> {
	let config = workbench.config();
	let algorithms = if args.algorithms.is_empty() {
		Algorithm::all().to_vec()
	} else {
		args.algorithms
			.iter()
			.map(|algorithm| algorithm.parse())
			.collect::<Result<Vec<Algorithm>, _>>()?
	};
	let options = TrainOptions {
		test_size: args.test_size.unwrap_or(config.default_test_size),
		seed: args.seed.unwrap_or(config.default_seed),
		scaling: args.scaling.map(Into::into).unwrap_or(config.scaling),
		cv_folds: args.cv_folds.unwrap_or(config.cv_folds),
	};
	let results = workbench.train_all(args.dataset_id, &algorithms, &options)?;
	let output: serde_json::Map<String, serde_json::Value> = results
		.into_iter()
		.map(|(algorithm, result)| {
			let value = match result {
				Ok(model) => serde_json::json!({
					"model_id": model.id,
					"accuracy": model.accuracy,
					"training_time_seconds": model.training_time_seconds,
				}),
				Err(error) => serde_json::json!({ "error": error.to_string() }),
			};
			(algorithm.to_string(), value)
		})
		.collect();
	print_json(&output)
}

fn cli_predict(workbench: &Workbench, args: PredictArgs) -> Result<()> {
	let json = match (&args.input, &args.json) {
		(Some(path), _) => std::fs::read_to_string(path)
			.with_context(|| format!("failed to read {}", path.display()))?,
		(None, Some(json)) => json.clone(),
		(None, None) => return Err(anyhow!("pass --input or --json")),
	};
	let value: serde_json::Value = serde_json::from_str(&json).context("invalid JSON input")?;
	match value {
		serde_json::Value::Array(_) => {
			let records: Vec<Record> = serde_json::from_value(value)?;
			print_json(&workbench.predict_batch(args.model_id, &records)?)
		}
		value => {
			let record: Record = serde_json::from_value(value)?;
			print_json(&workbench.predict(args.model_id, &record)?)
		}
	}
}

fn cli_model(workbench: &Workbench, command: ModelCommand) -> Result<()> {
	match command {
		ModelCommand::List => print_json(&workbench.list_models()?),
		ModelCommand::Active => print_json(&workbench.list_active_models()?),
		ModelCommand::Show { id } => print_json(&workbench.get_model(id)?),
		ModelCommand::Info { id } => print_json(&workbench.prediction_info(id)?),
		ModelCommand::Activate { id } => print_json(&set_active(workbench, id, true)?),
		ModelCommand::Deactivate { id } => print_json(&set_active(workbench, id, false)?),
		ModelCommand::Delete { id } => {
			let deleted = workbench.delete_model(id)?;
			print_json(&serde_json::json!({ "id": id, "deleted": deleted }))
		}
		ModelCommand::Stats => print_json(&workbench.model_stats()?),
	}
}

fn set_active(
	workbench: &Workbench,
	id: Id,
	is_active: bool,
) -> Result<workbench_core::store::ModelRecord> {
	let update = ModelUpdate {
		is_active: Some(is_active),
		params: None,
	};
	Ok(workbench.update_model(id, update)?)
}

fn cli_cleanup(workbench: &Workbench, args: CleanupArgs) -> Result<()> {
	let config = workbench.config();
	let model_days = args.model_days.unwrap_or(config.model_retention_days);
	let job_days = args.job_days.unwrap_or(config.job_retention_days);
	let n_models = workbench.cleanup_old_models(model_days)?;
	let n_jobs = workbench.cleanup_old_jobs(job_days)?;
	print_json(&serde_json::json!({
		"deleted_models": n_models,
		"deleted_jobs": n_jobs,
	}))
}
