/*!
This crate implements the workbench's neural network classifier: a feed-forward network with two hidden layers of 64 and 32 units, relu activations and 20% dropout after each hidden layer, followed by a softmax output layer. It is trained with the softmax cross entropy loss and the Adam optimizer over shuffled mini-batches for a fixed number of epochs.

The architecture is fixed. Only the epoch count, batch size, learning rate and seed are configurable.
*/

use ndarray::prelude::*;
use rand::{seq::SliceRandom, SeedableRng};
use rand_xoshiro::Xoshiro256Plus;
use workbench_linear::softmax;
use workbench_metrics::{CrossEntropy, CrossEntropyInput, StreamingMetric};

mod adam;
mod layer;

use self::{
	adam::AdamState,
	layer::{dropout_mask, relu, relu_derivative, Dense},
};

pub const HIDDEN_LAYER_SIZES: [usize; 2] = [64, 32];
pub const DROPOUT_RATE: f32 = 0.2;

/// These are the options passed to `NeuralNetwork::train`.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct NeuralNetworkOptions {
	pub epochs: usize,
	pub batch_size: usize,
	pub learning_rate: f32,
	/// Seeds the weight initialization, the shuffles and the dropout masks.
	pub seed: u64,
}

impl Default for NeuralNetworkOptions {
	fn default() -> Self {
		Self {
			epochs: 50,
			batch_size: 32,
			learning_rate: 0.001,
			seed: 42,
		}
	}
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct NeuralNetwork {
	/// The two hidden layers followed by the output layer.
	pub layers: Vec<Dense>,
	pub n_classes: usize,
	/// The mean training loss of each epoch.
	pub losses: Vec<f32>,
}

/// Intermediate values of one forward pass, kept for backpropagation.
struct ForwardPass {
	/// The input to each layer, after activation and dropout.
	inputs: Vec<Array2<f32>>,
	/// The pre-activation outputs of the hidden layers.
	hidden_outputs: Vec<Array2<f32>>,
	/// The dropout masks of the hidden layers.
	masks: Vec<Array2<f32>>,
	probabilities: Array2<f32>,
}

impl NeuralNetwork {
	pub fn train(
		features: ArrayView2<f32>,
		labels: ArrayView1<usize>,
		n_classes: usize,
		options: &NeuralNetworkOptions,
	) -> NeuralNetwork {
		let mut rng = Xoshiro256Plus::seed_from_u64(options.seed);
		let mut sizes = vec![features.ncols()];
		sizes.extend(HIDDEN_LAYER_SIZES);
		sizes.push(n_classes);
		let mut layers: Vec<Dense> = sizes
			.windows(2)
			.map(|window| Dense::new(window[0], window[1], &mut rng))
			.collect();
		let mut weight_states: Vec<AdamState<Ix2>> = layers
			.iter()
			.map(|layer| AdamState::new(layer.weights.raw_dim()))
			.collect();
		let mut bias_states: Vec<AdamState<Ix1>> = layers
			.iter()
			.map(|layer| AdamState::new(layer.biases.raw_dim()))
			.collect();
		let n_examples = features.nrows();
		let batch_size = options.batch_size.max(1);
		let mut examples_index: Vec<usize> = (0..n_examples).collect();
		let mut losses = Vec::with_capacity(options.epochs);
		let mut step = 0;
		for _ in 0..options.epochs {
			examples_index.shuffle(&mut rng);
			let mut epoch_loss = CrossEntropy::default();
			for batch in examples_index.chunks(batch_size) {
				let batch_features = features.select(Axis(0), batch);
				let batch_labels: Vec<usize> = batch.iter().map(|index| labels[*index]).collect();
				let pass = forward(&layers, batch_features.view(), Some(&mut rng));
				for (probabilities, label) in pass.probabilities.axis_iter(Axis(0)).zip(batch_labels.iter()) {
					epoch_loss.update(CrossEntropyInput {
						probabilities,
						label: *label,
					});
				}
				let gradients = backward(&layers, &pass, &batch_labels);
				step += 1;
				for (((layer, (weight_gradients, bias_gradients)), weight_state), bias_state) in layers
					.iter_mut()
					.zip(gradients)
					.zip(weight_states.iter_mut())
					.zip(bias_states.iter_mut())
				{
					weight_state.update(
						&mut layer.weights,
						&weight_gradients,
						options.learning_rate,
						step,
					);
					bias_state.update(&mut layer.biases, &bias_gradients, options.learning_rate, step);
				}
			}
			losses.push(epoch_loss.finalize().unwrap_or(0.0));
		}
		NeuralNetwork {
			layers,
			n_classes,
			losses,
		}
	}

	/// Class probabilities with dropout disabled.
	pub fn predict_proba(&self, features: ArrayView2<f32>) -> Array2<f32> {
		forward(&self.layers, features, None).probabilities
	}
}

/// Run the network. Dropout is applied only when an rng is passed.
fn forward(
	layers: &[Dense],
	features: ArrayView2<f32>,
	mut rng: Option<&mut Xoshiro256Plus>,
) -> ForwardPass {
	let n_hidden = layers.len() - 1;
	let mut inputs = vec![features.to_owned()];
	let mut hidden_outputs = Vec::with_capacity(n_hidden);
	let mut masks = Vec::with_capacity(n_hidden);
	for layer in &layers[..n_hidden] {
		let output = layer.forward(inputs[inputs.len() - 1].view());
		let mut activation = relu(&output);
		let mask = match rng.as_deref_mut() {
			Some(rng) => dropout_mask(activation.dim(), DROPOUT_RATE, rng),
			None => Array2::ones(activation.dim()),
		};
		activation *= &mask;
		hidden_outputs.push(output);
		masks.push(mask);
		inputs.push(activation);
	}
	let mut probabilities = layers[n_hidden].forward(inputs[n_hidden].view());
	softmax(probabilities.view_mut());
	ForwardPass {
		inputs,
		hidden_outputs,
		masks,
		probabilities,
	}
}

/// Compute the gradients of the mean cross entropy with respect to each layer's weights and biases.
fn backward(
	layers: &[Dense],
	pass: &ForwardPass,
	labels: &[usize],
) -> Vec<(Array2<f32>, Array1<f32>)> {
	let n = labels.len().max(1) as f32;
	// The gradient of softmax cross entropy with respect to the logits is p - y.
	let mut delta = pass.probabilities.clone();
	for (mut row, label) in delta.axis_iter_mut(Axis(0)).zip(labels.iter()) {
		row[*label] -= 1.0;
	}
	delta /= n;
	let mut gradients = Vec::with_capacity(layers.len());
	for layer_index in (0..layers.len()).rev() {
		let weight_gradients = pass.inputs[layer_index].t().dot(&delta);
		let bias_gradients = delta.sum_axis(Axis(0));
		if layer_index > 0 {
			let hidden_index = layer_index - 1;
			delta = delta.dot(&layers[layer_index].weights.t())
				* &pass.masks[hidden_index]
				* &relu_derivative(&pass.hidden_outputs[hidden_index]);
		}
		gradients.push((weight_gradients, bias_gradients));
	}
	gradients.reverse();
	gradients
}

#[cfg(test)]
fn blobs(n_classes: usize, n_per_class: usize) -> (Array2<f32>, Array1<usize>) {
	let n = n_classes * n_per_class;
	let features = Array2::from_shape_fn((n, 2), |(i, j)| {
		let class = i / n_per_class;
		let jitter = ((i * 7 + j * 3) % 10) as f32 / 20.0;
		let center = if j == 0 { class as f32 * 2.0 } else { (class % 2) as f32 * 2.0 };
		center + jitter - 1.0
	});
	let labels = (0..n).map(|i| i / n_per_class).collect();
	(features, labels)
}

#[test]
fn test_neural_network_learns_blobs() {
	let (features, labels) = blobs(3, 20);
	let options = NeuralNetworkOptions {
		epochs: 150,
		batch_size: 16,
		learning_rate: 0.01,
		..Default::default()
	};
	let model = NeuralNetwork::train(features.view(), labels.view(), 3, &options);
	assert_eq!(model.layers.len(), 3);
	assert_eq!(model.layers[0].weights.dim(), (2, 64));
	assert_eq!(model.layers[1].weights.dim(), (64, 32));
	assert_eq!(model.layers[2].weights.dim(), (32, 3));
	assert!(model.losses.last().unwrap() < model.losses.first().unwrap());
	assert_eq!(model.losses.len(), 150);
	assert!(model.losses.iter().all(|loss| loss.is_finite() && *loss > 0.0));
	let probabilities = model.predict_proba(features.view());
	let correct = probabilities
		.axis_iter(Axis(0))
		.zip(labels.iter())
		.filter(|(row, label)| {
			let best = row
				.iter()
				.enumerate()
				.fold(0, |best, (index, value)| if *value > row[best] { index } else { best });
			best == **label
		})
		.count();
	assert!(correct as f32 / 60.0 > 0.9);
}

#[test]
fn test_neural_network_is_deterministic() {
	let (features, labels) = blobs(2, 10);
	let options = NeuralNetworkOptions {
		epochs: 5,
		..Default::default()
	};
	let a = NeuralNetwork::train(features.view(), labels.view(), 2, &options);
	let b = NeuralNetwork::train(features.view(), labels.view(), 2, &options);
	assert_eq!(a, b);
	// Inference does not use dropout, so it is repeatable.
	assert_eq!(a.predict_proba(features.view()), a.predict_proba(features.view()));
}
