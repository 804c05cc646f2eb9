/*!
This crate contains the fitted transforms that turn raw feature and target values into model inputs: feature scalers and the target label encoder. Each transform is fit on training data only and serialized into the artifact alongside the model, so inference reproduces exactly the same transformation.
*/

use ndarray::prelude::*;

mod label_encoder;
mod min_max;
mod normalized;

pub use self::label_encoder::{format_number_label, LabelEncoder, UnseenLabelError};
pub use self::min_max::MinMaxScaler;
pub use self::normalized::StandardScaler;

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScalingMethod {
	Standard,
	MinMax,
}

impl Default for ScalingMethod {
	fn default() -> Self {
		ScalingMethod::Standard
	}
}

/// A fitted feature scaler. Every column of the feature matrix is scaled independently.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum Scaler {
	Standard(StandardScaler),
	MinMax(MinMaxScaler),
}

impl Scaler {
	pub fn fit(method: ScalingMethod, features: ArrayView2<f32>) -> Scaler {
		match method {
			ScalingMethod::Standard => Scaler::Standard(StandardScaler::fit(features)),
			ScalingMethod::MinMax => Scaler::MinMax(MinMaxScaler::fit(features)),
		}
	}

	pub fn method(&self) -> ScalingMethod {
		match self {
			Scaler::Standard(_) => ScalingMethod::Standard,
			Scaler::MinMax(_) => ScalingMethod::MinMax,
		}
	}

	pub fn n_features(&self) -> usize {
		match self {
			Scaler::Standard(s) => s.means.len(),
			Scaler::MinMax(s) => s.mins.len(),
		}
	}

	pub fn transform(&self, features: ArrayView2<f32>) -> Array2<f32> {
		let mut output = features.to_owned();
		for (column_index, mut column) in output.axis_iter_mut(Axis(1)).enumerate() {
			column.mapv_inplace(|value| match self {
				Scaler::Standard(s) => s.transform_value(column_index, value),
				Scaler::MinMax(s) => s.transform_value(column_index, value),
			});
		}
		output
	}
}

#[test]
fn test_scaler_ignores_test_data() {
	let train = arr2(&[[0.0, 10.0], [2.0, 10.0]]);
	let test = arr2(&[[100.0, 5.0]]);
	let scaler = Scaler::fit(ScalingMethod::Standard, train.view());
	let transformed = scaler.transform(test.view());
	// mean 1, std 1 for the first column; the second column has zero variance.
	assert_eq!(transformed, arr2(&[[99.0, 0.0]]));
}
