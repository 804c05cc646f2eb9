use ndarray::prelude::*;
use rand::Rng;
use rand_xoshiro::Xoshiro256Plus;

pub struct SmoOptions {
	pub c: f64,
	pub tol: f64,
	pub max_passes: usize,
	pub max_iter: usize,
}

pub struct SmoSolution {
	pub alphas: Vec<f64>,
	pub bias: f64,
}

/// Solve the soft margin dual with the simplified sequential minimal optimization algorithm. `targets` are +1 or -1. Training stops after `max_passes` consecutive sweeps change no multiplier, or after `max_iter` sweeps.
pub fn solve(
	kernel_matrix: ArrayView2<f64>,
	targets: &[f64],
	options: &SmoOptions,
	rng: &mut Xoshiro256Plus,
) -> SmoSolution {
	let n = targets.len();
	let c = options.c;
	let mut alphas = vec![0.0; n];
	let mut bias = 0.0;
	if n < 2 {
		return SmoSolution { alphas, bias };
	}
	let decision = |alphas: &[f64], bias: f64, index: usize| -> f64 {
		alphas
			.iter()
			.zip(targets.iter())
			.zip(kernel_matrix.column(index).iter())
			.filter(|((alpha, _), _)| **alpha > 0.0)
			.map(|((alpha, target), k)| alpha * target * k)
			.sum::<f64>()
			+ bias
	};
	let mut passes = 0;
	let mut iteration = 0;
	while passes < options.max_passes && iteration < options.max_iter {
		let mut n_changed = 0;
		for i in 0..n {
			let error_i = decision(&alphas, bias, i) - targets[i];
			let violates_kkt = (targets[i] * error_i < -options.tol && alphas[i] < c)
				|| (targets[i] * error_i > options.tol && alphas[i] > 0.0);
			if !violates_kkt {
				continue;
			}
			let j = loop {
				let j = rng.gen_range(0..n);
				if j != i {
					break j;
				}
			};
			let error_j = decision(&alphas, bias, j) - targets[j];
			let (alpha_i_old, alpha_j_old) = (alphas[i], alphas[j]);
			let (low, high) = if targets[i] != targets[j] {
				((alphas[j] - alphas[i]).max(0.0), (c + alphas[j] - alphas[i]).min(c))
			} else {
				((alphas[i] + alphas[j] - c).max(0.0), (alphas[i] + alphas[j]).min(c))
			};
			if (high - low).abs() < 1e-10 {
				continue;
			}
			let eta = 2.0 * kernel_matrix[[i, j]] - kernel_matrix[[i, i]] - kernel_matrix[[j, j]];
			if eta >= 0.0 {
				continue;
			}
			alphas[j] = (alphas[j] - targets[j] * (error_i - error_j) / eta)
				.max(low)
				.min(high);
			if (alphas[j] - alpha_j_old).abs() < 1e-5 {
				continue;
			}
			alphas[i] += targets[i] * targets[j] * (alpha_j_old - alphas[j]);
			let b1 = bias
				- error_i - targets[i] * (alphas[i] - alpha_i_old) * kernel_matrix[[i, i]]
				- targets[j] * (alphas[j] - alpha_j_old) * kernel_matrix[[i, j]];
			let b2 = bias
				- error_j - targets[i] * (alphas[i] - alpha_i_old) * kernel_matrix[[i, j]]
				- targets[j] * (alphas[j] - alpha_j_old) * kernel_matrix[[j, j]];
			bias = if alphas[i] > 0.0 && alphas[i] < c {
				b1
			} else if alphas[j] > 0.0 && alphas[j] < c {
				b2
			} else {
				(b1 + b2) / 2.0
			};
			n_changed += 1;
		}
		iteration += 1;
		if n_changed == 0 {
			passes += 1;
		} else {
			passes = 0;
		}
	}
	SmoSolution { alphas, bias }
}
