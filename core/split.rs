use crate::error::{Error, Result};
use rand::{seq::SliceRandom, SeedableRng};
use rand_xoshiro::Xoshiro256Plus;
use std::collections::BTreeMap;

/// Stratification needs every class in both the train and the test split.
pub const MIN_CLASS_SAMPLES: usize = 2;

fn group_by_class<S: AsRef<str>>(labels: &[S]) -> BTreeMap<&str, Vec<usize>> {
	let mut classes: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
	for (index, label) in labels.iter().enumerate() {
		classes.entry(label.as_ref()).or_default().push(index);
	}
	classes
}

/// Split row indexes into (train, test) so that each class keeps its relative frequency in both. Every class must have at least two rows.
pub fn stratified_split<S: AsRef<str>>(
	labels: &[S],
	test_size: f32,
	seed: u64,
) -> Result<(Vec<usize>, Vec<usize>)> {
	if !(test_size > 0.0 && test_size < 1.0) {
		return Err(Error::InvalidInput(format!(
			"test_size must be between 0 and 1, got {}",
			test_size
		)));
	}
	let classes = group_by_class(labels);
	if let Some((class, indexes)) = classes
		.iter()
		.find(|(_, indexes)| indexes.len() < MIN_CLASS_SAMPLES)
	{
		return Err(Error::InsufficientClassSamples {
			class: class.to_string(),
			count: indexes.len(),
			required: MIN_CLASS_SAMPLES,
		});
	}
	let mut rng = Xoshiro256Plus::seed_from_u64(seed);
	let mut train = Vec::with_capacity(labels.len());
	let mut test = Vec::new();
	for (_, mut indexes) in classes {
		let count = indexes.len();
		let n_test = ((count as f32 * test_size).round() as usize).clamp(1, count - 1);
		indexes.shuffle(&mut rng);
		test.extend_from_slice(&indexes[..n_test]);
		train.extend_from_slice(&indexes[n_test..]);
	}
	train.shuffle(&mut rng);
	test.shuffle(&mut rng);
	Ok((train, test))
}

/// Partition row indexes into `k` folds that each hold roughly the same share of every class. Returns the (train, test) indexes of each fold.
pub fn stratified_k_fold<S: AsRef<str>>(
	labels: &[S],
	k: usize,
	seed: u64,
) -> Vec<(Vec<usize>, Vec<usize>)> {
	let mut rng = Xoshiro256Plus::seed_from_u64(seed);
	let mut folds: Vec<Vec<usize>> = vec![Vec::new(); k];
	let mut offset = 0;
	for (_, mut indexes) in group_by_class(labels) {
		indexes.shuffle(&mut rng);
		for (position, index) in indexes.iter().enumerate() {
			folds[(offset + position) % k].push(*index);
		}
		offset += indexes.len();
	}
	let mut fold_of = vec![0; labels.len()];
	for (fold_index, fold) in folds.iter().enumerate() {
		for index in fold {
			fold_of[*index] = fold_index;
		}
	}
	folds
		.into_iter()
		.enumerate()
		.map(|(fold_index, test)| {
			let train = (0..labels.len())
				.filter(|index| fold_of[*index] != fold_index)
				.collect();
			(train, test)
		})
		.collect()
}

/// The largest usable fold count: no more than `requested` and no more than the smallest class size. `None` if below two.
pub fn clamp_folds<S: AsRef<str>>(labels: &[S], requested: usize) -> Option<usize> {
	let smallest = group_by_class(labels)
		.values()
		.map(|indexes| indexes.len())
		.min()?;
	let k = requested.min(smallest);
	if k >= 2 {
		Some(k)
	} else {
		None
	}
}

#[test]
fn test_stratified_split() {
	let labels: Vec<&str> = (0..100).map(|i| if i < 70 { "a" } else { "b" }).collect();
	let (train, test) = stratified_split(&labels, 0.2, 42).unwrap();
	assert_eq!(train.len(), 80);
	assert_eq!(test.len(), 20);
	let n_test_b = test.iter().filter(|index| labels[**index] == "b").count();
	assert_eq!(n_test_b, 6);
	let mut all: Vec<usize> = train.iter().chain(test.iter()).copied().collect();
	all.sort_unstable();
	assert_eq!(all, (0..100).collect::<Vec<_>>());
	assert_eq!(stratified_split(&labels, 0.2, 42).unwrap(), (train, test));
}

#[test]
fn test_stratified_split_small_classes() {
	let labels = ["a", "a", "b", "b", "b"];
	let (train, test) = stratified_split(&labels, 0.9, 1).unwrap();
	// Each class keeps at least one row on each side.
	assert_eq!(train.len(), 2);
	assert_eq!(test.len(), 3);
	let labels = ["a", "a", "a", "b"];
	let error = stratified_split(&labels, 0.5, 1).unwrap_err();
	assert!(matches!(
		error,
		Error::InsufficientClassSamples { ref class, count: 1, required: 2 } if class == "b"
	));
	assert!(matches!(
		stratified_split(&labels, 1.0, 1),
		Err(Error::InvalidInput(_))
	));
}

#[test]
fn test_stratified_k_fold() {
	let labels: Vec<&str> = (0..30).map(|i| if i % 3 == 0 { "a" } else { "b" }).collect();
	let folds = stratified_k_fold(&labels, 5, 42);
	assert_eq!(folds.len(), 5);
	for (train, test) in folds.iter() {
		assert_eq!(train.len() + test.len(), 30);
		assert_eq!(test.len(), 6);
		assert_eq!(test.iter().filter(|index| labels[**index] == "a").count(), 2);
	}
	assert_eq!(clamp_folds(&labels, 5), Some(5));
	assert_eq!(clamp_folds(&["a", "a", "b"], 5), None);
	assert_eq!(clamp_folds(&["a", "a", "b", "b", "b"], 5), Some(2));
}
