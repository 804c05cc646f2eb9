//! https://en.wikipedia.org/wiki/Algorithms_for_calculating_variance#Welford's_online_algorithm

use super::Metric;
use num_traits::ToPrimitive;

/// Computes the mean and the population variance of the finite values in a slice.
pub struct MeanVariance;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeanVarianceOutput {
	pub n: u64,
	pub mean: f32,
	pub variance: f32,
}

impl<'a> Metric<'a> for MeanVariance {
	type Input = &'a [f32];
	type Output = Option<MeanVarianceOutput>;

	fn compute(input: &'a [f32]) -> Self::Output {
		let mut n = 0u64;
		let mut mean = 0.0f64;
		let mut m2 = 0.0f64;
		for value in input.iter().filter(|value| value.is_finite()) {
			let value = f64::from(*value);
			n += 1;
			let delta = value - mean;
			mean += delta / n as f64;
			m2 += delta * (value - mean);
		}
		if n == 0 {
			return None;
		}
		Some(MeanVarianceOutput {
			n,
			mean: mean.to_f32()?,
			variance: (m2 / n as f64).to_f32()?,
		})
	}
}

#[test]
fn test_mean_variance() {
	let output = MeanVariance::compute(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0, f32::NAN]).unwrap();
	assert_eq!(output.n, 8);
	assert_eq!(output.mean, 5.0);
	assert_eq!(output.variance, 4.0);
	assert!(MeanVariance::compute(&[f32::NAN]).is_none());
}
