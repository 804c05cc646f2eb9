/*!
This crate provides a small columnar dataframe: a two dimensional table where each column is either numeric or categorical. It implements only what the workbench needs to turn an uploaded CSV file into a feature matrix: type inference on load, row selection, duplicate and missing value detection, and imputation.
*/

use std::num::NonZeroUsize;

mod clean;
mod load;

pub use self::load::*;

#[derive(Debug, Clone, PartialEq)]
pub struct DataFrame {
	pub columns: Vec<Column>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Column {
	Number(NumberColumn),
	Enum(EnumColumn),
}

/// A numeric column. Missing values are stored as NaN.
#[derive(Debug, Clone, PartialEq)]
pub struct NumberColumn {
	pub name: String,
	pub data: Vec<f32>,
}

/// A categorical column. Values are 1-based indexes into `options`, and `None` marks a missing value.
#[derive(Debug, Clone, PartialEq)]
pub struct EnumColumn {
	pub name: String,
	pub options: Vec<String>,
	pub data: Vec<Option<NonZeroUsize>>,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ColumnType {
	Number,
	Enum,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Value<'a> {
	Number(f32),
	Enum(Option<&'a str>),
}

impl DataFrame {
	pub fn new(columns: Vec<Column>) -> Self {
		Self { columns }
	}

	pub fn ncols(&self) -> usize {
		self.columns.len()
	}

	pub fn nrows(&self) -> usize {
		self.columns.first().map(|column| column.len()).unwrap_or(0)
	}

	pub fn column_names(&self) -> Vec<&str> {
		self.columns.iter().map(|column| column.name()).collect()
	}

	pub fn column(&self, name: &str) -> Option<&Column> {
		self.columns.iter().find(|column| column.name() == name)
	}

	pub fn column_index(&self, name: &str) -> Option<usize> {
		self.columns.iter().position(|column| column.name() == name)
	}

	/// Remove the column named `name` and return it, leaving the order of the remaining columns unchanged.
	pub fn remove_column(&mut self, name: &str) -> Option<Column> {
		let index = self.column_index(name)?;
		Some(self.columns.remove(index))
	}

	/// Build a new dataframe from the rows at `indexes`, in that order.
	pub fn take_rows(&self, indexes: &[usize]) -> DataFrame {
		let columns = self
			.columns
			.iter()
			.map(|column| column.take_rows(indexes))
			.collect();
		DataFrame { columns }
	}

	/// Build a new dataframe from the rows where `keep` is true.
	pub fn filter_rows(&self, keep: &[bool]) -> DataFrame {
		let indexes: Vec<usize> = keep
			.iter()
			.enumerate()
			.filter_map(|(index, keep)| if *keep { Some(index) } else { None })
			.collect();
		self.take_rows(&indexes)
	}

	pub fn row(&self, index: usize) -> Vec<Value> {
		self.columns.iter().map(|column| column.value(index)).collect()
	}

	/// Return the first `n` rows, or all of them if there are fewer.
	pub fn head(&self, n: usize) -> Vec<Vec<Value>> {
		(0..self.nrows().min(n)).map(|index| self.row(index)).collect()
	}
}

impl Column {
	pub fn len(&self) -> usize {
		match self {
			Self::Number(s) => s.data.len(),
			Self::Enum(s) => s.data.len(),
		}
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	pub fn name(&self) -> &str {
		match self {
			Self::Number(s) => s.name.as_str(),
			Self::Enum(s) => s.name.as_str(),
		}
	}

	pub fn column_type(&self) -> ColumnType {
		match self {
			Self::Number(_) => ColumnType::Number,
			Self::Enum(_) => ColumnType::Enum,
		}
	}

	pub fn as_number(&self) -> Option<&NumberColumn> {
		match self {
			Self::Number(s) => Some(s),
			_ => None,
		}
	}

	pub fn as_enum(&self) -> Option<&EnumColumn> {
		match self {
			Self::Enum(s) => Some(s),
			_ => None,
		}
	}

	pub fn is_missing(&self, index: usize) -> bool {
		match self {
			Self::Number(s) => s.data[index].is_nan(),
			Self::Enum(s) => s.data[index].is_none(),
		}
	}

	pub fn n_missing(&self) -> usize {
		(0..self.len()).filter(|index| self.is_missing(*index)).count()
	}

	pub fn value(&self, index: usize) -> Value {
		match self {
			Self::Number(s) => Value::Number(s.data[index]),
			Self::Enum(s) => Value::Enum(s.value(index)),
		}
	}

	pub fn take_rows(&self, indexes: &[usize]) -> Column {
		match self {
			Self::Number(s) => Column::Number(NumberColumn {
				name: s.name.clone(),
				data: indexes.iter().map(|index| s.data[*index]).collect(),
			}),
			Self::Enum(s) => Column::Enum(EnumColumn {
				name: s.name.clone(),
				options: s.options.clone(),
				data: indexes.iter().map(|index| s.data[*index]).collect(),
			}),
		}
	}
}

impl NumberColumn {
	pub fn new(name: String, data: Vec<f32>) -> Self {
		Self { name, data }
	}

	/// Iterate over the values that are not missing.
	pub fn valid_values(&self) -> impl Iterator<Item = f32> + '_ {
		self.data.iter().copied().filter(|value| !value.is_nan())
	}
}

impl EnumColumn {
	pub fn new(name: String, options: Vec<String>, data: Vec<Option<NonZeroUsize>>) -> Self {
		Self {
			name,
			options,
			data,
		}
	}

	/// Create an enum column from optional string values. The options are the sorted unique values.
	pub fn from_values(name: String, values: &[Option<&str>]) -> Self {
		let mut options: Vec<String> = values
			.iter()
			.flatten()
			.map(|value| value.to_string())
			.collect();
		options.sort();
		options.dedup();
		let data = values
			.iter()
			.map(|value| {
				value.and_then(|value| {
					options
						.binary_search_by(|option| option.as_str().cmp(value))
						.ok()
						.and_then(|position| NonZeroUsize::new(position + 1))
				})
			})
			.collect();
		Self {
			name,
			options,
			data,
		}
	}

	pub fn value(&self, index: usize) -> Option<&str> {
		self.data[index].map(|value| self.options[value.get() - 1].as_str())
	}

	pub fn option_index(&self, option: &str) -> Option<NonZeroUsize> {
		self.options
			.iter()
			.position(|o| o == option)
			.and_then(|position| NonZeroUsize::new(position + 1))
	}
}

#[test]
fn test_take_and_filter_rows() {
	let df = DataFrame::new(vec![
		Column::Number(NumberColumn::new("a".to_owned(), vec![1.0, 2.0, 3.0])),
		Column::Enum(EnumColumn::from_values(
			"b".to_owned(),
			&[Some("x"), None, Some("y")],
		)),
	]);
	let taken = df.take_rows(&[2, 0]);
	assert_eq!(taken.nrows(), 2);
	assert_eq!(taken.row(0), vec![Value::Number(3.0), Value::Enum(Some("y"))]);
	let filtered = df.filter_rows(&[false, true, true]);
	assert_eq!(filtered.row(0)[1], Value::Enum(None));
	assert_eq!(filtered.columns[1].n_missing(), 1);
}

#[test]
fn test_remove_column_keeps_order() {
	let mut df = DataFrame::new(vec![
		Column::Number(NumberColumn::new("a".to_owned(), vec![1.0])),
		Column::Number(NumberColumn::new("b".to_owned(), vec![2.0])),
		Column::Number(NumberColumn::new("c".to_owned(), vec![3.0])),
	]);
	let removed = df.remove_column("b").unwrap();
	assert_eq!(removed.name(), "b");
	assert_eq!(df.column_names(), vec!["a", "c"]);
	assert!(df.remove_column("b").is_none());
}
