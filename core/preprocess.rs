/*!
This module turns an uploaded table into model-ready inputs. `clean` removes or imputes bad rows, `prepare_features` pops the target and encodes every remaining column as a number in a fixed order, and `encode_records` repeats that encoding for inference inputs. `validate` describes a table without changing it.
*/

use crate::error::{Error, Result};
use ndarray::prelude::*;
use std::collections::BTreeMap;
use workbench_dataframe::{parse_number, Column, DataFrame, Value};
use workbench_features::{format_number_label, LabelEncoder};
use workbench_metrics::{MeanVariance, Median, Metric, Mode};

/// A named-field input record, as it arrives from a caller.
pub type Record = serde_json::Map<String, serde_json::Value>;

/// The value used to fill a categorical column that has no values at all.
pub const FILL_PLACEHOLDER: &str = "Unknown";

/// The code for a missing or unknown categorical value.
pub const MISSING_CATEGORY: f32 = -1.0;

/// How `clean` handles rows with missing values.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingValues {
	/// Remove every row that has a missing value.
	Drop,
	/// Impute numbers with the column median and categories with the column mode.
	Fill,
}

/// What `encode_records` does when a record lacks a feature.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingFeaturePolicy {
	Fail,
	ZeroFill,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CleanOptions {
	pub drop_duplicates: bool,
	pub missing_values: MissingValues,
}

pub fn clean(dataframe: &DataFrame, options: &CleanOptions) -> DataFrame {
	let mut dataframe = if options.drop_duplicates {
		let keep: Vec<bool> = dataframe.duplicated().into_iter().map(|d| !d).collect();
		dataframe.filter_rows(&keep)
	} else {
		dataframe.clone()
	};
	match options.missing_values {
		MissingValues::Drop => {
			let keep: Vec<bool> = dataframe
				.rows_with_missing()
				.into_iter()
				.map(|missing| !missing)
				.collect();
			dataframe = dataframe.filter_rows(&keep);
		}
		MissingValues::Fill => {
			for column in dataframe.columns.iter_mut() {
				match column {
					Column::Number(column) => {
						let median = Median::compute(&column.data).unwrap_or(0.0);
						column.fill_missing(median);
					}
					Column::Enum(column) => {
						let present: Vec<usize> = column.data.iter().flatten().map(|v| v.get()).collect();
						match Mode::compute(&present).and_then(std::num::NonZeroUsize::new) {
							Some(mode) => column.fill_missing(mode),
							None => column.fill_missing_with_option(FILL_PLACEHOLDER),
						}
					}
				}
			}
		}
	}
	dataframe
}

/// Pick the target column. A designated target must exist. Without one, the last column is the target.
pub fn resolve_target(dataframe: &DataFrame, target: Option<&str>) -> Result<String> {
	match target {
		Some(target) => {
			if dataframe.column(target).is_some() {
				Ok(target.to_owned())
			} else {
				Err(Error::MissingTargetColumn(target.to_owned()))
			}
		}
		None => dataframe
			.columns
			.last()
			.map(|column| column.name().to_owned())
			.ok_or_else(|| Error::InvalidInput("the dataset has no columns".to_owned())),
	}
}

/// How a feature column is encoded.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FeatureKind {
	Number,
	/// Values encode to their 0-based position in `options`.
	Enum { options: Vec<String> },
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct FeatureColumn {
	pub name: String,
	pub kind: FeatureKind,
}

#[derive(Debug)]
pub struct PreparedFeatures {
	/// (n_rows, n_features)
	pub features: Array2<f32>,
	pub feature_columns: Vec<FeatureColumn>,
	pub target: Option<Column>,
}

/// Pop the target column if one is named and encode the remaining columns, in table order, into a matrix with no missing values. Missing numbers encode to 0. Categorical values encode to their option index, and missing ones to -1.
pub fn prepare_features(dataframe: &DataFrame, target: Option<&str>) -> Result<PreparedFeatures> {
	let mut dataframe = dataframe.clone();
	let target = match target {
		Some(target) => Some(
			dataframe
				.remove_column(target)
				.ok_or_else(|| Error::MissingTargetColumn(target.to_owned()))?,
		),
		None => None,
	};
	if dataframe.ncols() == 0 {
		return Err(Error::InvalidInput(
			"the dataset has no feature columns".to_owned(),
		));
	}
	let n_rows = dataframe.nrows();
	let mut features = Array2::zeros((n_rows, dataframe.ncols()));
	let mut feature_columns = Vec::with_capacity(dataframe.ncols());
	for (column, mut feature) in dataframe
		.columns
		.iter()
		.zip(features.axis_iter_mut(Axis(1)))
	{
		match column {
			Column::Number(column) => {
				for (feature, value) in feature.iter_mut().zip(column.data.iter()) {
					*feature = if value.is_finite() { *value } else { 0.0 };
				}
				feature_columns.push(FeatureColumn {
					name: column.name.clone(),
					kind: FeatureKind::Number,
				});
			}
			Column::Enum(column) => {
				for (feature, value) in feature.iter_mut().zip(column.data.iter()) {
					*feature = match value {
						Some(value) => (value.get() - 1) as f32,
						None => MISSING_CATEGORY,
					};
				}
				feature_columns.push(FeatureColumn {
					name: column.name.clone(),
					kind: FeatureKind::Enum {
						options: column.options.clone(),
					},
				});
			}
		}
	}
	Ok(PreparedFeatures {
		features,
		feature_columns,
		target,
	})
}

/// Project records onto the fit-time feature order and encode them the way `prepare_features` did. Fields that are not features are ignored.
pub fn encode_records(
	feature_columns: &[FeatureColumn],
	records: &[Record],
	policy: MissingFeaturePolicy,
) -> Result<Array2<f32>> {
	let mut features = Array2::zeros((records.len(), feature_columns.len()));
	for (record_index, (record, mut row)) in records
		.iter()
		.zip(features.axis_iter_mut(Axis(0)))
		.enumerate()
	{
		for (feature_column, feature) in feature_columns.iter().zip(row.iter_mut()) {
			*feature = match record.get(&feature_column.name) {
				Some(value) => encode_value(&feature_column.kind, value),
				None => match policy {
					MissingFeaturePolicy::Fail => {
						return Err(Error::InvalidInput(format!(
							"record {} is missing the feature \"{}\"",
							record_index, feature_column.name
						)))
					}
					MissingFeaturePolicy::ZeroFill => 0.0,
				},
			};
		}
	}
	Ok(features)
}

fn encode_value(kind: &FeatureKind, value: &serde_json::Value) -> f32 {
	use serde_json::Value as Json;
	match kind {
		FeatureKind::Number => match value {
			Json::Number(number) => number
				.as_f64()
				.map(|number| number as f32)
				.filter(|number| number.is_finite())
				.unwrap_or(0.0),
			Json::String(string) => parse_number(string).unwrap_or(0.0),
			Json::Bool(true) => 1.0,
			_ => 0.0,
		},
		FeatureKind::Enum { options } => {
			let label = match value {
				Json::String(string) => string.clone(),
				Json::Number(number) => number.to_string(),
				Json::Bool(boolean) => boolean.to_string(),
				_ => return MISSING_CATEGORY,
			};
			options
				.iter()
				.position(|option| *option == label)
				.map(|position| position as f32)
				.unwrap_or(MISSING_CATEGORY)
		}
	}
}

/// The class label of every row of the target column.
#[derive(Clone, Debug, PartialEq)]
pub struct TargetLabels {
	pub labels: Vec<String>,
	/// The raw values when the target column is numeric, so classes can be ordered by value.
	pub numeric_values: Option<Vec<f32>>,
}

impl TargetLabels {
	pub fn from_column(column: &Column) -> Result<TargetLabels> {
		let n_missing = column.n_missing();
		if n_missing > 0 {
			return Err(Error::InvalidInput(format!(
				"the target column \"{}\" has {} missing values",
				column.name(),
				n_missing
			)));
		}
		match column {
			Column::Number(column) => Ok(TargetLabels {
				labels: column.data.iter().copied().map(format_number_label).collect(),
				numeric_values: Some(column.data.clone()),
			}),
			Column::Enum(column) => Ok(TargetLabels {
				labels: (0..column.data.len())
					.map(|index| column.value(index).unwrap_or_default().to_owned())
					.collect(),
				numeric_values: None,
			}),
		}
	}

	pub fn len(&self) -> usize {
		self.labels.len()
	}

	pub fn is_empty(&self) -> bool {
		self.labels.is_empty()
	}

	/// The number of rows of each distinct label.
	pub fn class_counts(&self) -> BTreeMap<&str, usize> {
		let mut counts = BTreeMap::new();
		for label in self.labels.iter() {
			*counts.entry(label.as_str()).or_insert(0) += 1;
		}
		counts
	}

	/// Fit a label encoder on the rows at `indexes`.
	pub fn fit_encoder(&self, indexes: &[usize]) -> LabelEncoder {
		match &self.numeric_values {
			Some(values) => {
				let values: Vec<f32> = indexes.iter().map(|index| values[*index]).collect();
				LabelEncoder::fit_numeric(&values)
			}
			None => {
				let labels: Vec<&str> = indexes
					.iter()
					.map(|index| self.labels[*index].as_str())
					.collect();
				LabelEncoder::fit(&labels)
			}
		}
	}

	/// Encode the rows at `indexes`. Labels the encoder was not fit on are an error.
	pub fn encode(&self, encoder: &LabelEncoder, indexes: &[usize]) -> Result<Array1<usize>> {
		let labels: Vec<&str> = indexes
			.iter()
			.map(|index| self.labels[*index].as_str())
			.collect();
		let encoded = encoder
			.transform(&labels)
			.map_err(|error| Error::UnseenLabel(error.0))?;
		Ok(Array1::from(encoded))
	}
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnKind {
	Number,
	Enum,
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ColumnSummary {
	Number {
		min: Option<f32>,
		max: Option<f32>,
		mean: Option<f32>,
	},
	/// The most frequent values, most frequent first.
	Enum { top_values: Vec<(String, u64)> },
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ColumnInfo {
	pub name: String,
	pub column_type: ColumnKind,
	pub n_missing: usize,
	pub n_unique: usize,
	pub summary: ColumnSummary,
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct DatasetInfo {
	pub n_rows: usize,
	pub n_columns: usize,
	pub columns: Vec<ColumnInfo>,
	pub n_duplicate_rows: usize,
	/// Columns with no values at all.
	pub empty_columns: Vec<String>,
	/// Number columns whose values are all equal.
	pub constant_columns: Vec<String>,
}

const MAX_TOP_VALUES: usize = 10;

/// Describe a table without changing it.
pub fn validate(dataframe: &DataFrame) -> DatasetInfo {
	let n_rows = dataframe.nrows();
	let mut empty_columns = Vec::new();
	let mut constant_columns = Vec::new();
	let columns = dataframe
		.columns
		.iter()
		.map(|column| {
			let n_missing = column.n_missing();
			if n_rows > 0 && n_missing == n_rows {
				empty_columns.push(column.name().to_owned());
			}
			let (column_type, n_unique, summary) = match column {
				Column::Number(column) => {
					let mut values: Vec<f32> = column.valid_values().collect();
					values.sort_by(|a, b| a.total_cmp(b));
					values.dedup();
					let mean_variance = MeanVariance::compute(&column.data);
					if let Some(mean_variance) = mean_variance {
						if mean_variance.variance == 0.0 {
							constant_columns.push(column.name.clone());
						}
					}
					let summary = ColumnSummary::Number {
						min: values.first().copied(),
						max: values.last().copied(),
						mean: mean_variance.map(|output| output.mean),
					};
					(ColumnKind::Number, values.len(), summary)
				}
				Column::Enum(column) => {
					let mut counts = vec![0u64; column.options.len()];
					for value in column.data.iter().flatten() {
						counts[value.get() - 1] += 1;
					}
					let n_unique = counts.iter().filter(|count| **count > 0).count();
					let mut top_values: Vec<(String, u64)> = column
						.options
						.iter()
						.cloned()
						.zip(counts)
						.filter(|(_, count)| *count > 0)
						.collect();
					// Sort by descending count. The sort is stable, so ties stay in option order.
					top_values.sort_by(|a, b| b.1.cmp(&a.1));
					top_values.truncate(MAX_TOP_VALUES);
					(ColumnKind::Enum, n_unique, ColumnSummary::Enum { top_values })
				}
			};
			ColumnInfo {
				name: column.name().to_owned(),
				column_type,
				n_missing,
				n_unique,
				summary,
			}
		})
		.collect();
	DatasetInfo {
		n_rows,
		n_columns: dataframe.ncols(),
		columns,
		n_duplicate_rows: dataframe.duplicated().into_iter().filter(|d| *d).count(),
		empty_columns,
		constant_columns,
	}
}

/// The first `n` rows as records. Missing values are null.
pub fn preview(dataframe: &DataFrame, n: usize) -> Vec<Record> {
	let names = dataframe.column_names();
	dataframe
		.head(n)
		.into_iter()
		.map(|row| {
			names
				.iter()
				.zip(row)
				.map(|(name, value)| {
					let value = match value {
						Value::Number(value) => serde_json::Number::from_f64(f64::from(value))
							.map(serde_json::Value::Number)
							.unwrap_or(serde_json::Value::Null),
						Value::Enum(Some(value)) => serde_json::Value::String(value.to_owned()),
						Value::Enum(None) => serde_json::Value::Null,
					};
					(name.to_string(), value)
				})
				.collect()
		})
		.collect()
}

#[cfg(test)]
fn test_dataframe() -> DataFrame {
	use workbench_dataframe::{EnumColumn, NumberColumn};
	DataFrame::new(vec![
		Column::Number(NumberColumn::new(
			"height".to_owned(),
			vec![1.5, 2.5, 1.5, f32::NAN, 3.0],
		)),
		Column::Enum(EnumColumn::from_values(
			"color".to_owned(),
			&[Some("red"), None, Some("red"), Some("blue"), Some("blue")],
		)),
		Column::Enum(EnumColumn::from_values(
			"label".to_owned(),
			&[Some("yes"), Some("no"), Some("yes"), Some("no"), Some("yes")],
		)),
	])
}

#[test]
fn test_clean_drop() {
	let dataframe = test_dataframe();
	let cleaned = clean(
		&dataframe,
		&CleanOptions {
			drop_duplicates: true,
			missing_values: MissingValues::Drop,
		},
	);
	assert_eq!(cleaned.nrows(), 2);
	let label = cleaned.column("label").unwrap().as_enum().unwrap();
	assert_eq!(label.value(0), Some("yes"));
	assert_eq!(label.value(1), Some("yes"));
}

#[test]
fn test_clean_fill() {
	let dataframe = test_dataframe();
	let cleaned = clean(
		&dataframe,
		&CleanOptions {
			drop_duplicates: false,
			missing_values: MissingValues::Fill,
		},
	);
	assert_eq!(cleaned.nrows(), 5);
	let height = cleaned.column("height").unwrap().as_number().unwrap();
	// The median of 1.5, 2.5, 1.5, 3.0.
	assert_eq!(height.data[3], 2.0);
	let color = cleaned.column("color").unwrap().as_enum().unwrap();
	// blue and red are tied, so the lexicographically smaller one wins.
	assert_eq!(color.value(1), Some("blue"));
}

#[test]
fn test_prepare_features() {
	let dataframe = test_dataframe();
	let prepared = prepare_features(&dataframe, Some("label")).unwrap();
	let names: Vec<&str> = prepared
		.feature_columns
		.iter()
		.map(|column| column.name.as_str())
		.collect();
	assert_eq!(names, vec!["height", "color"]);
	assert_eq!(
		prepared.features,
		arr2(&[[1.5, 1.0], [2.5, -1.0], [1.5, 1.0], [0.0, 0.0], [3.0, 0.0]])
	);
	assert_eq!(prepared.target.unwrap().name(), "label");
	// The same input always produces the same output.
	let again = prepare_features(&dataframe, Some("label")).unwrap();
	assert_eq!(again.features, arr2(&[[1.5, 1.0], [2.5, -1.0], [1.5, 1.0], [0.0, 0.0], [3.0, 0.0]]));
	assert!(matches!(
		prepare_features(&dataframe, Some("nope")),
		Err(Error::MissingTargetColumn(_))
	));
}

#[test]
fn test_resolve_target() {
	let dataframe = test_dataframe();
	assert_eq!(resolve_target(&dataframe, None).unwrap(), "label");
	assert_eq!(resolve_target(&dataframe, Some("color")).unwrap(), "color");
	assert!(matches!(
		resolve_target(&dataframe, Some("missing")),
		Err(Error::MissingTargetColumn(_))
	));
}

#[test]
fn test_encode_records() {
	let feature_columns = vec![
		FeatureColumn {
			name: "height".to_owned(),
			kind: FeatureKind::Number,
		},
		FeatureColumn {
			name: "color".to_owned(),
			kind: FeatureKind::Enum {
				options: vec!["blue".to_owned(), "red".to_owned()],
			},
		},
	];
	let records: Vec<Record> = vec![
		serde_json::from_str(r#"{"color": "red", "height": "2", "extra": 1}"#).unwrap(),
		serde_json::from_str(r#"{"color": "green"}"#).unwrap(),
	];
	let features =
		encode_records(&feature_columns, &records, MissingFeaturePolicy::ZeroFill).unwrap();
	assert_eq!(features, arr2(&[[2.0, 1.0], [0.0, -1.0]]));
	let error = encode_records(&feature_columns, &records, MissingFeaturePolicy::Fail).unwrap_err();
	assert!(matches!(error, Error::InvalidInput(_)));
}

#[test]
fn test_validate() {
	let dataframe = test_dataframe();
	let info = validate(&dataframe);
	assert_eq!(info.n_rows, 5);
	assert_eq!(info.n_columns, 3);
	assert_eq!(info.n_duplicate_rows, 1);
	assert_eq!(info.columns[0].n_missing, 1);
	assert_eq!(info.columns[0].n_unique, 3);
	assert_eq!(
		info.columns[2].summary,
		ColumnSummary::Enum {
			top_values: vec![("yes".to_owned(), 3), ("no".to_owned(), 2)]
		}
	);
	assert!(info.empty_columns.is_empty());
	assert!(info.constant_columns.is_empty());
}

#[test]
fn test_target_labels() {
	let column = Column::Number(workbench_dataframe::NumberColumn::new(
		"y".to_owned(),
		vec![10.0, 2.0, 10.0],
	));
	let target = TargetLabels::from_column(&column).unwrap();
	assert_eq!(target.labels, vec!["10", "2", "10"]);
	let encoder = target.fit_encoder(&[0, 1, 2]);
	// Numeric classes are ordered by value, not as strings.
	assert_eq!(encoder.classes, vec!["2", "10"]);
	assert_eq!(target.encode(&encoder, &[0, 1]).unwrap(), arr1(&[1, 0]));
}
