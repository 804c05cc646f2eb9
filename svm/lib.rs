/*!
This crate implements a kernel support vector classifier. Each binary machine is trained with sequential minimal optimization on a precomputed kernel matrix. Problems with more than two classes train one machine per class against the rest, in parallel.

When `probability` is enabled, a sigmoid is fit to each machine's decision values on the training set (Platt scaling). One-vs-rest probabilities are normalized to sum to 1.
*/

use itertools::izip;
use ndarray::prelude::*;
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256Plus;
use rayon::prelude::*;

mod kernel;
mod platt;
mod smo;

pub use self::kernel::{Gamma, Kernel};
pub use self::platt::PlattScaling;

/// The kernel matrix of more examples than this does not reasonably fit in memory.
pub const MAX_TRAINING_EXAMPLES: usize = 10_000;

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KernelType {
	Linear,
	Rbf,
	Poly,
	Sigmoid,
}

/// These are the options passed to `SvmClassifier::train`.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SvmOptions {
	/// The regularization parameter. Larger values penalize margin violations more.
	pub c: f64,
	pub kernel: KernelType,
	/// Not used by the linear kernel.
	pub gamma: Gamma,
	/// The constant term of the poly and sigmoid kernels.
	pub coef0: f64,
	/// The degree of the poly kernel.
	pub degree: u32,
	/// Fit Platt scaling so the classifier can output probabilities.
	pub probability: bool,
	pub tol: f64,
	pub max_passes: usize,
	pub max_iter: usize,
	pub seed: u64,
}

impl Default for SvmOptions {
	fn default() -> Self {
		Self {
			c: 1.0,
			kernel: KernelType::Rbf,
			gamma: Gamma::Scale,
			coef0: 0.0,
			degree: 3,
			probability: true,
			tol: 1e-3,
			max_passes: 5,
			max_iter: 10_000,
			seed: 42,
		}
	}
}

#[derive(Debug, thiserror::Error)]
pub enum SvmError {
	#[error("svm training supports at most {max} examples, got {n}")]
	TooManyExamples { n: usize, max: usize },
}

/// One binary machine. `dual_coefficients[i]` is `alpha_i * y_i` for support vector `i`.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct BinaryMachine {
	pub support_vectors: Array2<f32>,
	pub dual_coefficients: Vec<f64>,
	pub bias: f64,
	pub platt: Option<PlattScaling>,
}

impl BinaryMachine {
	pub fn decision_value(&self, kernel: &Kernel, features: ArrayView1<f32>) -> f64 {
		self.support_vectors
			.axis_iter(Axis(0))
			.zip(self.dual_coefficients.iter())
			.map(|(support_vector, coefficient)| coefficient * kernel.compute(support_vector, features))
			.sum::<f64>()
			+ self.bias
	}
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SvmClassifier {
	pub kernel: Kernel,
	pub n_classes: usize,
	/// A single machine for class 1 vs class 0 when there are two classes, otherwise one machine per class.
	pub machines: Vec<BinaryMachine>,
}

impl SvmClassifier {
	pub fn train(
		features: ArrayView2<f32>,
		labels: ArrayView1<usize>,
		n_classes: usize,
		options: &SvmOptions,
	) -> Result<SvmClassifier, SvmError> {
		let n_examples = features.nrows();
		if n_examples > MAX_TRAINING_EXAMPLES {
			return Err(SvmError::TooManyExamples {
				n: n_examples,
				max: MAX_TRAINING_EXAMPLES,
			});
		}
		let kernel = match options.kernel {
			KernelType::Linear => Kernel::Linear,
			KernelType::Rbf => Kernel::Rbf {
				gamma: options.gamma.resolve(features),
			},
			KernelType::Poly => Kernel::Poly {
				gamma: options.gamma.resolve(features),
				coef0: options.coef0,
				degree: options.degree,
			},
			KernelType::Sigmoid => Kernel::Sigmoid {
				gamma: options.gamma.resolve(features),
				coef0: options.coef0,
			},
		};
		let kernel_matrix = kernel.matrix(features);
		let positive_classes: Vec<usize> = if n_classes <= 2 {
			vec![1]
		} else {
			(0..n_classes).collect()
		};
		let smo_options = smo::SmoOptions {
			c: options.c,
			tol: options.tol,
			max_passes: options.max_passes,
			max_iter: options.max_iter,
		};
		let machines = positive_classes
			.par_iter()
			.map(|positive_class| {
				let is_positive: Vec<bool> = labels.iter().map(|label| label == positive_class).collect();
				let targets: Vec<f64> = is_positive
					.iter()
					.map(|positive| if *positive { 1.0 } else { -1.0 })
					.collect();
				let mut rng =
					Xoshiro256Plus::seed_from_u64(options.seed.wrapping_add(*positive_class as u64));
				let solution = smo::solve(kernel_matrix.view(), &targets, &smo_options, &mut rng);
				let platt = if options.probability {
					// The decision value of a training example, computed from the kernel matrix.
					let decision_values: Vec<f64> = (0..n_examples)
						.map(|index| {
							solution
								.alphas
								.iter()
								.zip(targets.iter())
								.zip(kernel_matrix.column(index).iter())
								.map(|((alpha, target), k)| alpha * target * k)
								.sum::<f64>()
								+ solution.bias
						})
						.collect();
					Some(PlattScaling::fit(&decision_values, &is_positive))
				} else {
					None
				};
				let support_indexes: Vec<usize> = solution
					.alphas
					.iter()
					.enumerate()
					.filter(|(_, alpha)| **alpha > 1e-8)
					.map(|(index, _)| index)
					.collect();
				BinaryMachine {
					support_vectors: features.select(Axis(0), &support_indexes),
					dual_coefficients: support_indexes
						.iter()
						.map(|index| solution.alphas[*index] * targets[*index])
						.collect(),
					bias: solution.bias,
					platt,
				}
			})
			.collect();
		Ok(SvmClassifier {
			kernel,
			n_classes,
			machines,
		})
	}

	/// The raw decision values with shape (n_examples, n_machines).
	pub fn decision_function(&self, features: ArrayView2<f32>) -> Array2<f64> {
		let mut values = Array2::zeros((features.nrows(), self.machines.len()));
		for (features, mut values) in features.axis_iter(Axis(0)).zip(values.axis_iter_mut(Axis(0))) {
			for (value, machine) in values.iter_mut().zip(self.machines.iter()) {
				*value = machine.decision_value(&self.kernel, features);
			}
		}
		values
	}

	pub fn predict(&self, features: ArrayView2<f32>) -> Array1<usize> {
		let decision_values = self.decision_function(features);
		decision_values
			.axis_iter(Axis(0))
			.map(|values| {
				if self.machines.len() == 1 {
					if values[0] >= 0.0 {
						1
					} else {
						0
					}
				} else {
					let mut best = 0;
					for (index, value) in values.iter().enumerate() {
						if *value > values[best] {
							best = index;
						}
					}
					best
				}
			})
			.collect()
	}

	/// Class probabilities, or `None` if the classifier was trained without Platt scaling.
	pub fn predict_proba(&self, features: ArrayView2<f32>) -> Option<Array2<f32>> {
		let platts: Vec<&PlattScaling> = self
			.machines
			.iter()
			.map(|machine| machine.platt.as_ref())
			.collect::<Option<_>>()?;
		let decision_values = self.decision_function(features);
		let n_classes = self.n_classes.max(2);
		let mut probabilities = Array2::zeros((features.nrows(), n_classes));
		for (values, mut probabilities) in decision_values
			.axis_iter(Axis(0))
			.zip(probabilities.axis_iter_mut(Axis(0)))
		{
			if platts.len() == 1 {
				let p = platts[0].probability(values[0]) as f32;
				probabilities[0] = 1.0 - p;
				probabilities[1] = p;
			} else {
				izip!(probabilities.iter_mut(), platts.iter(), values.iter()).for_each(
					|(probability, platt, value)| {
						*probability = platt.probability(*value) as f32;
					},
				);
				let sum = probabilities.sum();
				if sum > 0.0 {
					probabilities /= sum;
				} else {
					probabilities.fill(1.0 / n_classes as f32);
				}
			}
		}
		Some(probabilities)
	}

	/// The primal weights of a linear kernel machine with shape (n_machines, n_features). `None` for other kernels.
	pub fn coefficients(&self) -> Option<Array2<f32>> {
		if self.kernel != Kernel::Linear {
			return None;
		}
		let n_features = self.machines.first()?.support_vectors.ncols();
		let mut coefficients = Array2::zeros((self.machines.len(), n_features));
		for (machine, mut weights) in self.machines.iter().zip(coefficients.axis_iter_mut(Axis(0))) {
			for (support_vector, coefficient) in machine
				.support_vectors
				.axis_iter(Axis(0))
				.zip(machine.dual_coefficients.iter())
			{
				weights.scaled_add(*coefficient as f32, &support_vector);
			}
		}
		Some(coefficients)
	}
}

#[cfg(test)]
fn blobs(n_classes: usize, n_per_class: usize) -> (Array2<f32>, Array1<usize>) {
	let n = n_classes * n_per_class;
	let features = Array2::from_shape_fn((n, 2), |(i, j)| {
		let class = i / n_per_class;
		let jitter = ((i * 7 + j * 3) % 10) as f32 / 20.0;
		let center = if j == 0 { class as f32 * 4.0 } else { (class % 2) as f32 * 4.0 };
		center + jitter
	});
	let labels = (0..n).map(|i| i / n_per_class).collect();
	(features, labels)
}

#[test]
fn test_linear_binary() {
	let (features, labels) = blobs(2, 15);
	let options = SvmOptions {
		kernel: KernelType::Linear,
		..Default::default()
	};
	let model = SvmClassifier::train(features.view(), labels.view(), 2, &options).unwrap();
	assert_eq!(model.predict(features.view()), labels);
	let coefficients = model.coefficients().unwrap();
	assert_eq!(coefficients.dim(), (1, 2));
	assert!(coefficients[[0, 0]] > 0.0);
	let probabilities = model.predict_proba(features.view()).unwrap();
	assert!(probabilities[[0, 0]] > 0.5);
	assert!(probabilities[[29, 1]] > 0.5);
}

#[test]
fn test_rbf_multiclass() {
	let (features, labels) = blobs(3, 12);
	let model =
		SvmClassifier::train(features.view(), labels.view(), 3, &SvmOptions::default()).unwrap();
	assert_eq!(model.machines.len(), 3);
	assert_eq!(model.predict(features.view()), labels);
	assert!(model.coefficients().is_none());
	let probabilities = model.predict_proba(features.view()).unwrap();
	for row in probabilities.rows() {
		assert!((row.sum() - 1.0).abs() < 1e-4);
	}
}

#[test]
fn test_without_probability() {
	let (features, labels) = blobs(2, 10);
	let options = SvmOptions {
		probability: false,
		..Default::default()
	};
	let model = SvmClassifier::train(features.view(), labels.view(), 2, &options).unwrap();
	assert!(model.predict_proba(features.view()).is_none());
}

#[test]
fn test_poly_and_sigmoid_kernels() {
	let (features, labels) = blobs(2, 15);
	let poly = SvmOptions {
		kernel: KernelType::Poly,
		coef0: 1.0,
		degree: 2,
		..Default::default()
	};
	let model = SvmClassifier::train(features.view(), labels.view(), 2, &poly).unwrap();
	assert!(matches!(model.kernel, Kernel::Poly { degree: 2, .. }));
	assert_eq!(model.predict(features.view()), labels);
	assert!(model.coefficients().is_none());
	let sigmoid = SvmOptions {
		kernel: KernelType::Sigmoid,
		gamma: Gamma::Value(0.01),
		..Default::default()
	};
	let model = SvmClassifier::train(features.view(), labels.view(), 2, &sigmoid).unwrap();
	assert!(matches!(model.kernel, Kernel::Sigmoid { .. }));
	assert_eq!(model.predict(features.view()).len(), labels.len());
}
