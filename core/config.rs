/*!
This module defines the `Config` struct, which configures a `Workbench`. It is read from an optional YAML file and every field has a default, so an empty file or no file at all is a valid configuration.

```yaml
data_dir: /var/lib/workbench
cv_folds: 0
missing_values: fill
log_format: json
```
*/

use crate::{
	error::Result,
	preprocess::{MissingFeaturePolicy, MissingValues},
};
use std::path::{Path, PathBuf};
use workbench_features::ScalingMethod;

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
	/// The root for persisted state. Uploads, artifacts and records live in subdirectories.
	pub data_dir: PathBuf,
	/// Uploads larger than this many bytes are rejected.
	pub max_file_size: u64,
	/// Accepted upload extensions, including the leading dot.
	pub supported_file_types: Vec<String>,
	pub default_test_size: f32,
	pub default_seed: u64,
	/// The number of cross validation folds. 0 disables cross validation.
	pub cv_folds: usize,
	pub scaling: ScalingMethod,
	pub missing_values: MissingValues,
	pub drop_duplicates: bool,
	pub missing_feature_policy: MissingFeaturePolicy,
	/// The number of training worker threads.
	pub n_workers: usize,
	pub model_retention_days: i64,
	pub job_retention_days: i64,
	pub log_level: String,
	pub log_format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
	Pretty,
	Json,
}

impl Default for Config {
	fn default() -> Self {
		Self {
			data_dir: PathBuf::from("data"),
			max_file_size: 50 * 1024 * 1024,
			supported_file_types: vec![".csv".to_owned()],
			default_test_size: 0.2,
			default_seed: 42,
			cv_folds: 5,
			scaling: ScalingMethod::Standard,
			missing_values: MissingValues::Drop,
			drop_duplicates: true,
			missing_feature_policy: MissingFeaturePolicy::ZeroFill,
			n_workers: 2,
			model_retention_days: 30,
			job_retention_days: 7,
			log_level: "info".to_owned(),
			log_format: LogFormat::Pretty,
		}
	}
}

impl Config {
	/// Load the config from the YAML file at `path`.
	pub fn from_path(path: &Path) -> Result<Config> {
		let contents = std::fs::read_to_string(path)?;
		Config::from_yaml(&contents)
	}

	pub fn from_yaml(yaml: &str) -> Result<Config> {
		// An empty document deserializes as null, not as an empty map.
		if yaml.trim().is_empty() {
			return Ok(Config::default());
		}
		Ok(serde_yaml::from_str(yaml)?)
	}

	pub fn uploads_dir(&self) -> PathBuf {
		self.data_dir.join("uploads")
	}

	pub fn models_dir(&self) -> PathBuf {
		self.data_dir.join("models")
	}

	pub fn records_dir(&self) -> PathBuf {
		self.data_dir.join("records")
	}
}

#[test]
fn test_partial_config() {
	let config = Config::from_yaml("cv_folds: 0\nmissing_values: fill\nscaling: min_max\n").unwrap();
	assert_eq!(config.cv_folds, 0);
	assert_eq!(config.missing_values, MissingValues::Fill);
	assert_eq!(config.scaling, ScalingMethod::MinMax);
	assert_eq!(config.default_seed, 42);
	assert_eq!(config.max_file_size, 52_428_800);
}

#[test]
fn test_empty_and_invalid_config() {
	assert_eq!(Config::from_yaml("").unwrap(), Config::default());
	assert!(Config::from_yaml("not_a_field: 1").is_err());
}
