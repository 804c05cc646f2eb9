use super::*;
use std::{
	collections::BTreeSet,
	io::{Read, Seek},
	path::Path,
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LoadError {
	#[error(transparent)]
	Io(#[from] std::io::Error),
	#[error(transparent)]
	Csv(#[from] csv::Error),
	#[error("the csv file has no header row")]
	MissingHeader,
	#[error("the column name \"{0}\" appears more than once")]
	DuplicateColumnName(String),
	#[error("the column name at position {0} is empty")]
	EmptyColumnName(usize),
}

#[derive(Clone, Debug)]
pub struct FromCsvOptions<'a> {
	pub invalid_values: &'a [&'a str],
}

impl<'a> Default for FromCsvOptions<'a> {
	fn default() -> Self {
		Self {
			invalid_values: DEFAULT_INVALID_VALUES,
		}
	}
}

/// These values are the default values that are considered missing.
pub const DEFAULT_INVALID_VALUES: &[&str] = &[
	"", "null", "NULL", "n/a", "N/A", "nan", "-nan", "NaN", "-NaN", "?",
];

impl DataFrame {
	pub fn from_path(path: &Path, options: FromCsvOptions) -> Result<Self, LoadError> {
		let mut reader = csv::ReaderBuilder::new()
			.trim(csv::Trim::All)
			.from_path(path)?;
		Self::from_csv(&mut reader, options)
	}

	/// Read a csv with a header row. The reader is read twice: once to infer the column types, and once more to load the values.
	pub fn from_csv<R>(reader: &mut csv::Reader<R>, options: FromCsvOptions) -> Result<Self, LoadError>
	where
		R: Read + Seek,
	{
		let column_names: Vec<String> = reader
			.headers()?
			.iter()
			.map(|column_name| column_name.to_owned())
			.collect();
		if column_names.is_empty() {
			return Err(LoadError::MissingHeader);
		}
		let mut seen = BTreeSet::new();
		for (index, column_name) in column_names.iter().enumerate() {
			if column_name.is_empty() {
				return Err(LoadError::EmptyColumnName(index));
			}
			if !seen.insert(column_name.as_str()) {
				return Err(LoadError::DuplicateColumnName(column_name.clone()));
			}
		}
		let start_position = reader.position().clone();

		// Pass over the csv once to infer the column types.
		let mut infer_stats: Vec<InferStats> = column_names
			.iter()
			.map(|_| InferStats::new(options.invalid_values))
			.collect();
		let mut record = csv::StringRecord::new();
		let mut n_rows = 0;
		while reader.read_record(&mut record)? {
			n_rows += 1;
			for (infer_stats, value) in infer_stats.iter_mut().zip(record.iter()) {
				infer_stats.update(value);
			}
		}
		reader.seek(start_position)?;

		let mut columns: Vec<Column> = column_names
			.into_iter()
			.zip(infer_stats.into_iter())
			.map(|(name, infer_stats)| match infer_stats.finalize() {
				InferredColumnType::Number => {
					Column::Number(NumberColumn::new(name, Vec::with_capacity(n_rows)))
				}
				InferredColumnType::Enum { options } => Column::Enum(EnumColumn::new(
					name,
					options,
					Vec::with_capacity(n_rows),
				)),
			})
			.collect();
		// Lookup tables from option to its 1-based index for each enum column.
		let option_indexes: Vec<Option<fnv::FnvHashMap<String, NonZeroUsize>>> = columns
			.iter()
			.map(|column| {
				column.as_enum().map(|column| {
					column
						.options
						.iter()
						.enumerate()
						.filter_map(|(index, option)| {
							NonZeroUsize::new(index + 1).map(|index| (option.clone(), index))
						})
						.collect()
				})
			})
			.collect();

		// Read each record again and insert the values into the columns.
		let mut record = csv::StringRecord::new();
		while reader.read_record(&mut record)? {
			for ((column, option_indexes), value) in columns
				.iter_mut()
				.zip(option_indexes.iter())
				.zip(record.iter())
			{
				let is_invalid = options.invalid_values.contains(&value);
				match column {
					Column::Number(column) => {
						let value = if is_invalid {
							f32::NAN
						} else {
							parse_number(value).unwrap_or(f32::NAN)
						};
						column.data.push(value);
					}
					Column::Enum(column) => {
						let value = if is_invalid {
							None
						} else {
							option_indexes
								.as_ref()
								.and_then(|option_indexes| option_indexes.get(value).copied())
						};
						column.data.push(value);
					}
				}
			}
		}
		Ok(DataFrame { columns })
	}
}

/// Parse a finite float. Infinities and NaN are treated as unparsable.
pub fn parse_number(value: &str) -> Option<f32> {
	match lexical::parse::<f32, _>(value.as_bytes()) {
		Ok(value) if value.is_finite() => Some(value),
		_ => None,
	}
}

#[derive(Clone, Debug)]
struct InferStats<'a> {
	invalid_values: &'a [&'a str],
	all_numbers: bool,
	n_valid: usize,
	unique_values: BTreeSet<String>,
}

#[derive(Clone, Debug, PartialEq)]
enum InferredColumnType {
	Number,
	Enum { options: Vec<String> },
}

impl<'a> InferStats<'a> {
	fn new(invalid_values: &'a [&'a str]) -> Self {
		Self {
			invalid_values,
			all_numbers: true,
			n_valid: 0,
			unique_values: BTreeSet::new(),
		}
	}

	fn update(&mut self, value: &str) {
		if self.invalid_values.contains(&value) {
			return;
		}
		self.n_valid += 1;
		if self.all_numbers && parse_number(value).is_none() {
			self.all_numbers = false;
		}
		if !self.unique_values.contains(value) {
			self.unique_values.insert(value.to_owned());
		}
	}

	fn finalize(self) -> InferredColumnType {
		// A column without a single valid value has nothing to suggest it is numeric.
		if self.n_valid > 0 && self.all_numbers {
			InferredColumnType::Number
		} else {
			InferredColumnType::Enum {
				options: self.unique_values.into_iter().collect(),
			}
		}
	}
}

#[cfg(test)]
fn read(csv: &str) -> DataFrame {
	let mut reader = csv::ReaderBuilder::new()
		.trim(csv::Trim::All)
		.from_reader(std::io::Cursor::new(csv.to_owned()));
	DataFrame::from_csv(&mut reader, FromCsvOptions::default()).unwrap()
}

#[test]
fn test_infer() {
	let df = read("number,enum,empty\n1,test,\n2,other,?\n?,test,null\n");
	insta::assert_debug_snapshot!(df.columns[1], @r###"
 Enum(
     EnumColumn {
         name: "enum",
         options: [
             "other",
             "test",
         ],
         data: [
             Some(
                 2,
             ),
             Some(
                 1,
             ),
             Some(
                 2,
             ),
         ],
     },
 )
 "###);
	let number = df.columns[0].as_number().unwrap();
	assert_eq!(&number.data[0..2], &[1.0, 2.0]);
	assert!(number.data[2].is_nan());
	let empty = df.columns[2].as_enum().unwrap();
	assert!(empty.options.is_empty());
	assert_eq!(empty.data, vec![None, None, None]);
}

#[test]
fn test_mixed_column_is_enum() {
	let df = read("a\n1\nx\n2.5\n");
	let column = df.columns[0].as_enum().unwrap();
	assert_eq!(column.options, vec!["1", "2.5", "x"]);
}

#[test]
fn test_duplicate_column_names() {
	let mut reader = csv::Reader::from_reader(std::io::Cursor::new("a,a\n1,2\n"));
	let result = DataFrame::from_csv(&mut reader, FromCsvOptions::default());
	assert!(matches!(result, Err(LoadError::DuplicateColumnName(_))));
}

#[test]
fn test_ragged_rows_are_rejected() {
	let mut reader = csv::Reader::from_reader(std::io::Cursor::new("a,b\n1,2\n3\n"));
	let result = DataFrame::from_csv(&mut reader, FromCsvOptions::default());
	assert!(matches!(result, Err(LoadError::Csv(_))));
}
