use ndarray::prelude::*;
use rayon::prelude::*;

/// The largest number of thresholds per feature. Bin 0 holds invalid values and the remaining values fall into bins 1..=MAX_THRESHOLDS + 1, so every bin index fits in a `u8`.
pub const MAX_THRESHOLDS: usize = 254;

/// Features binned column by column. `columns[feature][example]` is the bin of that example's value.
#[derive(Debug)]
pub struct BinnedFeatures {
	pub thresholds: Vec<Vec<f32>>,
	pub columns: Vec<Vec<u8>>,
}

impl BinnedFeatures {
	pub fn compute(features: ArrayView2<f32>) -> BinnedFeatures {
		let (thresholds, columns) = features
			.axis_iter(Axis(1))
			.into_par_iter()
			.map(|column| {
				let thresholds = compute_thresholds(column);
				let binned = column
					.iter()
					.map(|value| bin_for_value(&thresholds, *value))
					.collect::<Vec<u8>>();
				(thresholds, binned)
			})
			.unzip();
		BinnedFeatures {
			thresholds,
			columns,
		}
	}

	pub fn n_features(&self) -> usize {
		self.columns.len()
	}

	pub fn n_bins(&self, feature_index: usize) -> usize {
		self.thresholds[feature_index].len() + 2
	}

	/// The raw value threshold that corresponds to sending bins <= `bin` left.
	pub fn split_value(&self, feature_index: usize, bin: u8) -> f32 {
		self.thresholds[feature_index][bin as usize - 1]
	}
}

/// If the feature has few enough unique values, the thresholds are the midpoints between adjacent unique values, so every unique value gets its own bin. Otherwise they are evenly spaced quantiles of the unique values.
fn compute_thresholds(column: ArrayView1<f32>) -> Vec<f32> {
	let mut values: Vec<f32> = column.iter().copied().filter(|v| v.is_finite()).collect();
	values.sort_by(|a, b| a.total_cmp(b));
	values.dedup();
	if values.len() <= MAX_THRESHOLDS + 1 {
		return values
			.windows(2)
			.map(|window| (window[0] + window[1]) / 2.0)
			.collect();
	}
	let n_unique = values.len();
	let mut thresholds: Vec<f32> = (1..=MAX_THRESHOLDS)
		.map(|i| values[i * n_unique / (MAX_THRESHOLDS + 1)])
		.collect();
	thresholds.dedup();
	thresholds
}

fn bin_for_value(thresholds: &[f32], value: f32) -> u8 {
	// Invalid values go to the first bin.
	if !value.is_finite() {
		return 0;
	}
	// Use binary search on the thresholds to find the bin for the feature value.
	let position = thresholds
		.binary_search_by(|threshold| {
			threshold
				.partial_cmp(&value)
				.unwrap_or(std::cmp::Ordering::Equal)
		})
		.unwrap_or_else(|bin| bin);
	(position + 1) as u8
}

#[test]
fn test_binning() {
	let features = arr2(&[[3.0], [1.0], [2.0], [1.0], [f32::NAN]]);
	let binned = BinnedFeatures::compute(features.view());
	assert_eq!(binned.thresholds[0], vec![1.5, 2.5]);
	assert_eq!(binned.columns[0], vec![3, 1, 2, 1, 0]);
	assert_eq!(binned.split_value(0, 2), 2.5);
	assert_eq!(binned.n_bins(0), 4);
}

#[test]
fn test_split_values_fall_between_training_values() {
	let features = arr2(&[[0.0], [0.0], [10.0], [10.0]]);
	let binned = BinnedFeatures::compute(features.view());
	assert_eq!(binned.split_value(0, 1), 5.0);
	assert_eq!(bin_for_value(&binned.thresholds[0], 4.9), 1);
	assert_eq!(bin_for_value(&binned.thresholds[0], 5.1), 2);
	let constant = arr2(&[[7.0], [7.0]]);
	assert!(BinnedFeatures::compute(constant.view()).thresholds[0].is_empty());
}

#[test]
fn test_many_unique_values_fit_in_u8() {
	let features = Array2::from_shape_fn((1000, 1), |(i, _)| i as f32);
	let binned = BinnedFeatures::compute(features.view());
	assert!(binned.thresholds[0].len() <= MAX_THRESHOLDS);
	let max_bin = binned.columns[0].iter().copied().max().unwrap();
	assert!(max_bin as usize <= MAX_THRESHOLDS + 1);
	// Values are binned monotonically.
	assert!(binned.columns[0].windows(2).all(|w| w[0] <= w[1]));
}
