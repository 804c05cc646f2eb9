use super::Metric;

/// The median of the non-NaN values. With an even count it is the mean of the two middle values.
pub struct Median;

impl<'a> Metric<'a> for Median {
	type Input = &'a [f32];
	type Output = Option<f32>;

	fn compute(input: &'a [f32]) -> Option<f32> {
		let mut values: Vec<f32> = input.iter().copied().filter(|v| !v.is_nan()).collect();
		if values.is_empty() {
			return None;
		}
		values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
		let middle = values.len() / 2;
		if values.len() % 2 == 0 {
			Some((values[middle - 1] + values[middle]) / 2.0)
		} else {
			Some(values[middle])
		}
	}
}

#[test]
fn test_median() {
	assert_eq!(Median::compute(&[3.0, 1.0, 2.0]), Some(2.0));
	assert_eq!(Median::compute(&[4.0, 1.0, f32::NAN, 3.0, 2.0]), Some(2.5));
	assert_eq!(Median::compute(&[f32::NAN]), None);
}
