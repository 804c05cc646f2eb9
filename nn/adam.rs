use ndarray::{prelude::*, Zip};

pub const BETA_1: f32 = 0.9;
pub const BETA_2: f32 = 0.999;
pub const EPSILON: f32 = 1e-8;

/// The first and second moment estimates for one parameter array.
#[derive(Clone, Debug)]
pub struct AdamState<D: Dimension> {
	m: Array<f32, D>,
	v: Array<f32, D>,
}

impl<D: Dimension> AdamState<D> {
	pub fn new(shape: D) -> AdamState<D> {
		AdamState {
			m: Array::zeros(shape.clone()),
			v: Array::zeros(shape),
		}
	}

	/// Apply one bias-corrected Adam update. `step` starts at 1.
	pub fn update(
		&mut self,
		parameters: &mut Array<f32, D>,
		gradients: &Array<f32, D>,
		learning_rate: f32,
		step: i32,
	) {
		let bias_correction_1 = 1.0 - BETA_1.powi(step);
		let bias_correction_2 = 1.0 - BETA_2.powi(step);
		Zip::from(parameters)
			.and(&mut self.m)
			.and(&mut self.v)
			.and(gradients)
			.for_each(|parameter, m, v, gradient| {
				*m = BETA_1 * *m + (1.0 - BETA_1) * gradient;
				*v = BETA_2 * *v + (1.0 - BETA_2) * gradient * gradient;
				let m_hat = *m / bias_correction_1;
				let v_hat = *v / bias_correction_2;
				*parameter -= learning_rate * m_hat / (v_hat.sqrt() + EPSILON);
			});
	}
}

#[test]
fn test_adam_first_step_moves_by_learning_rate() {
	let mut parameters = arr1(&[1.0f32, -1.0]);
	let gradients = arr1(&[0.5f32, -2.0]);
	let mut state = AdamState::new(parameters.raw_dim());
	state.update(&mut parameters, &gradients, 0.1, 1);
	// On the first step the bias corrected update is lr * sign(g).
	assert!((parameters[0] - 0.9).abs() < 1e-5);
	assert!((parameters[1] + 0.9).abs() < 1e-5);
}
