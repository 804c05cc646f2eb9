use super::Metric;
use std::collections::BTreeMap;

/// The most frequent value. When several values are equally frequent, the smallest one wins.
#[derive(Debug, Clone, Default)]
pub struct Mode;

impl<'a> Metric<'a> for Mode {
	type Input = &'a [usize];
	type Output = Option<usize>;
	fn compute(input: Self::Input) -> Self::Output {
		let mut histogram = BTreeMap::new();
		for value in input.iter() {
			*histogram.entry(*value).or_insert(0usize) += 1;
		}
		histogram
			.into_iter()
			.max_by(|a, b| a.1.cmp(&b.1).then(b.0.cmp(&a.0)))
			.map(|(value, _)| value)
	}
}

#[test]
fn test_mode() {
	assert_eq!(Mode::compute(&[3, 1, 3, 2]), Some(3));
	assert_eq!(Mode::compute(&[2, 1, 2, 1]), Some(1));
	assert_eq!(Mode::compute(&[]), None);
}
