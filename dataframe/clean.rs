use super::*;
use fnv::FnvHashSet;

impl DataFrame {
	/// Mark every row that is an exact copy of an earlier row. The first occurrence is not marked. Missing values compare equal to each other.
	pub fn duplicated(&self) -> Vec<bool> {
		let mut seen: FnvHashSet<Vec<u64>> = FnvHashSet::default();
		(0..self.nrows())
			.map(|index| {
				let key: Vec<u64> = self
					.columns
					.iter()
					.map(|column| row_key(column, index))
					.collect();
				!seen.insert(key)
			})
			.collect()
	}

	/// Mark every row that has a missing value in at least one column.
	pub fn rows_with_missing(&self) -> Vec<bool> {
		(0..self.nrows())
			.map(|index| self.columns.iter().any(|column| column.is_missing(index)))
			.collect()
	}
}

fn row_key(column: &Column, index: usize) -> u64 {
	match column {
		Column::Number(column) => {
			let value = column.data[index];
			if value.is_nan() {
				u64::MAX
			} else if value == 0.0 {
				0
			} else {
				u64::from(value.to_bits())
			}
		}
		Column::Enum(column) => column.data[index]
			.map(|value| value.get() as u64)
			.unwrap_or(u64::MAX),
	}
}

impl NumberColumn {
	/// Replace every missing value with `value`.
	pub fn fill_missing(&mut self, value: f32) {
		for v in self.data.iter_mut() {
			if v.is_nan() {
				*v = value;
			}
		}
	}
}

impl EnumColumn {
	/// Replace every missing value with the option at the 1-based index `value`.
	pub fn fill_missing(&mut self, value: NonZeroUsize) {
		for v in self.data.iter_mut() {
			if v.is_none() {
				*v = Some(value);
			}
		}
	}

	/// Replace every missing value with `option`, adding it to the options if it is new.
	pub fn fill_missing_with_option(&mut self, option: &str) {
		let index = match self.option_index(option) {
			Some(index) => index,
			None => {
				self.options.push(option.to_owned());
				match NonZeroUsize::new(self.options.len()) {
					Some(index) => index,
					None => return,
				}
			}
		};
		self.fill_missing(index);
	}
}

#[test]
fn test_duplicated() {
	let df = DataFrame::new(vec![
		Column::Number(NumberColumn::new(
			"a".to_owned(),
			vec![1.0, 1.0, f32::NAN, f32::NAN, 0.0, -0.0],
		)),
		Column::Enum(EnumColumn::from_values(
			"b".to_owned(),
			&[Some("x"), Some("x"), None, None, Some("y"), Some("y")],
		)),
	]);
	assert_eq!(
		df.duplicated(),
		vec![false, true, false, true, false, true]
	);
}

#[test]
fn test_rows_with_missing() {
	let df = DataFrame::new(vec![
		Column::Number(NumberColumn::new("a".to_owned(), vec![1.0, f32::NAN, 3.0])),
		Column::Enum(EnumColumn::from_values(
			"b".to_owned(),
			&[Some("x"), Some("y"), None],
		)),
	]);
	assert_eq!(df.rows_with_missing(), vec![false, true, true]);
}

#[test]
fn test_fill_missing_with_new_option() {
	let mut column = EnumColumn::from_values("b".to_owned(), &[None, None]);
	column.fill_missing_with_option("Unknown");
	assert_eq!(column.options, vec!["Unknown"]);
	assert_eq!(column.value(0), Some("Unknown"));
	assert_eq!(column.value(1), Some("Unknown"));
}
