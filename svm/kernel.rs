use ndarray::prelude::*;

/// The kernel a trained machine evaluates, with `gamma` already resolved.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum Kernel {
	/// K(x, y) = x · y
	Linear,
	/// K(x, y) = exp(-gamma * ||x - y||²)
	Rbf { gamma: f64 },
	/// K(x, y) = (gamma * x · y + coef0)^degree
	Poly { gamma: f64, coef0: f64, degree: u32 },
	/// K(x, y) = tanh(gamma * x · y + coef0)
	Sigmoid { gamma: f64, coef0: f64 },
}

fn dot(a: ArrayView1<f32>, b: ArrayView1<f32>) -> f64 {
	a.iter()
		.zip(b.iter())
		.map(|(a, b)| f64::from(*a) * f64::from(*b))
		.sum()
}

impl Kernel {
	pub fn compute(&self, a: ArrayView1<f32>, b: ArrayView1<f32>) -> f64 {
		match self {
			Kernel::Linear => dot(a, b),
			Kernel::Rbf { gamma } => {
				let squared_distance: f64 = a
					.iter()
					.zip(b.iter())
					.map(|(a, b)| {
						let d = f64::from(*a) - f64::from(*b);
						d * d
					})
					.sum();
				(-gamma * squared_distance).exp()
			}
			Kernel::Poly {
				gamma,
				coef0,
				degree,
			} => (gamma * dot(a, b) + coef0).powi(*degree as i32),
			Kernel::Sigmoid { gamma, coef0 } => (gamma * dot(a, b) + coef0).tanh(),
		}
	}

	/// The full symmetric kernel matrix of the training examples.
	pub fn matrix(&self, features: ArrayView2<f32>) -> Array2<f64> {
		let n = features.nrows();
		let mut matrix = Array2::zeros((n, n));
		for i in 0..n {
			for j in i..n {
				let value = self.compute(features.row(i), features.row(j));
				matrix[[i, j]] = value;
				matrix[[j, i]] = value;
			}
		}
		matrix
	}
}

/// How the gamma of the rbf, poly and sigmoid kernels is chosen.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Gamma {
	/// 1 / (n_features * variance of all feature values).
	Scale,
	/// 1 / n_features.
	Auto,
	Value(f64),
}

impl Gamma {
	pub fn resolve(&self, features: ArrayView2<f32>) -> f64 {
		let n_features = features.ncols().max(1) as f64;
		match self {
			Gamma::Scale => {
				let n = features.len().max(1) as f64;
				let mean = features.iter().map(|v| f64::from(*v)).sum::<f64>() / n;
				let variance = features
					.iter()
					.map(|v| (f64::from(*v) - mean).powi(2))
					.sum::<f64>() / n;
				if variance > 0.0 {
					1.0 / (n_features * variance)
				} else {
					1.0
				}
			}
			Gamma::Auto => 1.0 / n_features,
			Gamma::Value(gamma) => *gamma,
		}
	}
}

#[test]
fn test_kernels() {
	let a = arr1(&[1.0f32, 2.0]);
	let b = arr1(&[3.0f32, 1.0]);
	assert_eq!(Kernel::Linear.compute(a.view(), b.view()), 5.0);
	let rbf = Kernel::Rbf { gamma: 0.5 };
	assert!((rbf.compute(a.view(), b.view()) - (-2.5f64).exp()).abs() < 1e-12);
	assert_eq!(rbf.compute(a.view(), a.view()), 1.0);
	let poly = Kernel::Poly {
		gamma: 0.5,
		coef0: 1.0,
		degree: 2,
	};
	// (0.5 * 5 + 1)^2
	assert_eq!(poly.compute(a.view(), b.view()), 12.25);
	let sigmoid = Kernel::Sigmoid {
		gamma: 0.2,
		coef0: -1.0,
	};
	assert_eq!(sigmoid.compute(a.view(), b.view()), 0.0);
}

#[test]
fn test_gamma() {
	let features = arr2(&[[0.0f32, 2.0], [2.0, 0.0]]);
	// The variance of [0, 2, 2, 0] is 1.
	assert_eq!(Gamma::Scale.resolve(features.view()), 0.5);
	assert_eq!(Gamma::Auto.resolve(features.view()), 0.5);
	assert_eq!(Gamma::Value(3.0).resolve(features.view()), 3.0);
	let constant = arr2(&[[1.0f32], [1.0]]);
	assert_eq!(Gamma::Scale.resolve(constant.view()), 1.0);
}
