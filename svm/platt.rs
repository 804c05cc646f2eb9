/// A sigmoid `P(y = 1 | f) = 1 / (1 + exp(a * f + b))` fit to a machine's decision values, following Platt's method with the Newton iteration of Lin, Lin and Weng.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct PlattScaling {
	pub a: f64,
	pub b: f64,
}

const MAX_ITERATIONS: usize = 100;
const MIN_STEP: f64 = 1e-10;
const SIGMA: f64 = 1e-12;
const EPSILON: f64 = 1e-5;

impl PlattScaling {
	pub fn fit(decision_values: &[f64], labels: &[bool]) -> PlattScaling {
		let n_positive = labels.iter().filter(|label| **label).count() as f64;
		let n_negative = labels.len() as f64 - n_positive;
		let high_target = (n_positive + 1.0) / (n_positive + 2.0);
		let low_target = 1.0 / (n_negative + 2.0);
		let targets: Vec<f64> = labels
			.iter()
			.map(|label| if *label { high_target } else { low_target })
			.collect();
		let loss = |a: f64, b: f64| -> f64 {
			decision_values
				.iter()
				.zip(targets.iter())
				.map(|(f, t)| {
					let z = f * a + b;
					if z >= 0.0 {
						t * z + (-z).exp().ln_1p()
					} else {
						(t - 1.0) * z + z.exp().ln_1p()
					}
				})
				.sum()
		};
		let mut a = 0.0;
		let mut b = ((n_negative + 1.0) / (n_positive + 1.0)).ln();
		let mut value = loss(a, b);
		for _ in 0..MAX_ITERATIONS {
			let (mut h11, mut h22, mut h21) = (SIGMA, SIGMA, 0.0);
			let (mut g1, mut g2) = (0.0, 0.0);
			for (f, t) in decision_values.iter().zip(targets.iter()) {
				let z = f * a + b;
				let (p, q) = if z >= 0.0 {
					let e = (-z).exp();
					(e / (1.0 + e), 1.0 / (1.0 + e))
				} else {
					let e = z.exp();
					(1.0 / (1.0 + e), e / (1.0 + e))
				};
				let d2 = p * q;
				h11 += f * f * d2;
				h22 += d2;
				h21 += f * d2;
				let d1 = t - p;
				g1 += f * d1;
				g2 += d1;
			}
			if g1.abs() < EPSILON && g2.abs() < EPSILON {
				break;
			}
			let determinant = h11 * h22 - h21 * h21;
			let da = -(h22 * g1 - h21 * g2) / determinant;
			let db = -(-h21 * g1 + h11 * g2) / determinant;
			let gd = g1 * da + g2 * db;
			// Backtracking line search.
			let mut step = 1.0;
			while step >= MIN_STEP {
				let new_a = a + step * da;
				let new_b = b + step * db;
				let new_value = loss(new_a, new_b);
				if new_value < value + 0.0001 * step * gd {
					a = new_a;
					b = new_b;
					value = new_value;
					break;
				}
				step /= 2.0;
			}
			if step < MIN_STEP {
				break;
			}
		}
		PlattScaling { a, b }
	}

	pub fn probability(&self, decision_value: f64) -> f64 {
		let z = decision_value * self.a + self.b;
		if z >= 0.0 {
			let e = (-z).exp();
			e / (1.0 + e)
		} else {
			1.0 / (1.0 + z.exp())
		}
	}
}

#[test]
fn test_platt_scaling_is_monotonic() {
	let decision_values = [-2.0, -1.5, -1.0, -0.2, 0.3, 1.0, 1.4, 2.2];
	let labels = [false, false, false, true, false, true, true, true];
	let platt = PlattScaling::fit(&decision_values, &labels);
	assert!(platt.a < 0.0);
	assert!(platt.probability(2.0) > 0.5);
	assert!(platt.probability(-2.0) < 0.5);
	assert!(platt.probability(1.0) > platt.probability(0.0));
}
