use ndarray::prelude::*;
use workbench_metrics::{MeanVariance, Metric};

/**
A `StandardScaler` transforms each feature to zero mean and unit variance. [Learn more](https://en.wikipedia.org/wiki/Feature_scaling#Standardization_(Z-score_Normalization).

For the values 0.0, 5.2 and 1.3:

Mean: 2.16667

Standard Deviation (population): 2.20958

`feature_value = (value - mean) / std`

| value | feature value                         |
|-------|---------------------------------------|
| 0.0   | (0.0 - 2.16667) / 2.20958  = -0.98058 |
| 5.2   | (5.2 - 2.16667) / 2.20958  = 1.37281  |
| 1.3   | (1.3 - 2.16667) / 2.20958  = -0.39223 |

A column with zero variance, and any value that is not finite, maps to 0.
*/
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct StandardScaler {
	pub means: Vec<f32>,
	pub variances: Vec<f32>,
}

impl StandardScaler {
	pub fn fit(features: ArrayView2<f32>) -> StandardScaler {
		let (means, variances) = features
			.axis_iter(Axis(1))
			.map(|column| {
				let column = column.to_vec();
				MeanVariance::compute(&column)
					.map(|output| (output.mean, output.variance))
					.unwrap_or((0.0, 0.0))
			})
			.unzip();
		StandardScaler { means, variances }
	}

	pub fn transform_value(&self, column_index: usize, value: f32) -> f32 {
		let variance = self.variances[column_index];
		if !value.is_finite() || variance == 0.0 {
			0.0
		} else {
			(value - self.means[column_index]) / variance.sqrt()
		}
	}
}

#[test]
fn test_standard_scaler() {
	let features = arr2(&[[0.0], [5.2], [1.3]]);
	let scaler = StandardScaler::fit(features.view());
	assert!((scaler.means[0] - 2.166_667).abs() < 1e-5);
	assert!((scaler.transform_value(0, 0.0) - -0.98058).abs() < 1e-4);
	assert_eq!(scaler.transform_value(0, f32::NAN), 0.0);
}
