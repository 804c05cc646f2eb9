use ndarray::prelude::*;

/// A `MinMaxScaler` maps each feature onto [0, 1] using the minimum and maximum seen during fitting. Values outside the fitted range fall outside [0, 1]. A column with a single distinct value, and any value that is not finite, maps to 0.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct MinMaxScaler {
	pub mins: Vec<f32>,
	pub maxs: Vec<f32>,
}

impl MinMaxScaler {
	pub fn fit(features: ArrayView2<f32>) -> MinMaxScaler {
		let (mins, maxs) = features
			.axis_iter(Axis(1))
			.map(|column| {
				let (min, max) = column
					.iter()
					.filter(|value| value.is_finite())
					.fold((f32::INFINITY, f32::NEG_INFINITY), |(min, max), value| {
						(min.min(*value), max.max(*value))
					});
				if min.is_finite() {
					(min, max)
				} else {
					(0.0, 0.0)
				}
			})
			.unzip();
		MinMaxScaler { mins, maxs }
	}

	pub fn transform_value(&self, column_index: usize, value: f32) -> f32 {
		let min = self.mins[column_index];
		let range = self.maxs[column_index] - min;
		if !value.is_finite() || range == 0.0 {
			0.0
		} else {
			(value - min) / range
		}
	}
}

#[test]
fn test_min_max_scaler() {
	let features = arr2(&[[2.0, 1.0], [4.0, 1.0], [6.0, 1.0]]);
	let scaler = MinMaxScaler::fit(features.view());
	assert_eq!(scaler.transform_value(0, 4.0), 0.5);
	assert_eq!(scaler.transform_value(0, 8.0), 1.5);
	assert_eq!(scaler.transform_value(1, 1.0), 0.0);
}
