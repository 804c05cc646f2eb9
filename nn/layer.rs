use ndarray::prelude::*;
use rand::Rng;
use rand_xoshiro::Xoshiro256Plus;

/// A fully connected layer computing `inputs · weights + biases`.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Dense {
	/// (n_inputs, n_outputs)
	pub weights: Array2<f32>,
	/// (n_outputs)
	pub biases: Array1<f32>,
}

impl Dense {
	/// Weights and biases are drawn uniformly from `[-1 / sqrt(n_inputs), 1 / sqrt(n_inputs)]`.
	pub fn new(n_inputs: usize, n_outputs: usize, rng: &mut Xoshiro256Plus) -> Dense {
		let bound = 1.0 / (n_inputs.max(1) as f32).sqrt();
		let weights = Array2::from_shape_fn((n_inputs, n_outputs), |_| rng.gen_range(-bound..=bound));
		let biases = Array1::from_shape_fn(n_outputs, |_| rng.gen_range(-bound..=bound));
		Dense { weights, biases }
	}

	pub fn forward(&self, inputs: ArrayView2<f32>) -> Array2<f32> {
		inputs.dot(&self.weights) + &self.biases
	}
}

pub fn relu(values: &Array2<f32>) -> Array2<f32> {
	values.mapv(|value| value.max(0.0))
}

/// The derivative of relu, taken as 0 at 0.
pub fn relu_derivative(values: &Array2<f32>) -> Array2<f32> {
	values.mapv(|value| if value > 0.0 { 1.0 } else { 0.0 })
}

/// Inverted dropout: each unit is kept with probability `1 - rate` and kept units are scaled by `1 / (1 - rate)`.
pub fn dropout_mask(shape: (usize, usize), rate: f32, rng: &mut Xoshiro256Plus) -> Array2<f32> {
	let keep = 1.0 - rate;
	Array2::from_shape_fn(shape, |_| if rng.gen::<f32>() < keep { 1.0 / keep } else { 0.0 })
}

#[test]
fn test_dense_forward() {
	let layer = Dense {
		weights: arr2(&[[1.0, 0.0], [0.0, 2.0]]),
		biases: arr1(&[0.5, -1.0]),
	};
	let output = layer.forward(arr2(&[[1.0, 1.0]]).view());
	assert_eq!(output, arr2(&[[1.5, 1.0]]));
	assert_eq!(relu(&arr2(&[[-1.0, 2.0]])), arr2(&[[0.0, 2.0]]));
}
