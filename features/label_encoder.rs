use num_traits::ToPrimitive;
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Error)]
#[error("the label \"{0}\" was not seen when the label encoder was fit")]
pub struct UnseenLabelError(pub String);

/// Maps class labels to contiguous 0-based class indexes. `classes[i]` is the label for class index `i`.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct LabelEncoder {
	pub classes: Vec<String>,
}

impl LabelEncoder {
	/// Fit on categorical labels. Classes are ordered lexicographically.
	pub fn fit<S: AsRef<str>>(labels: &[S]) -> LabelEncoder {
		let mut classes: Vec<String> = labels
			.iter()
			.map(|label| label.as_ref().to_owned())
			.collect();
		classes.sort();
		classes.dedup();
		LabelEncoder { classes }
	}

	/// Fit on numeric labels. Classes are ordered by value and named by their shortest decimal representation, so `1.0` becomes `"1"`.
	pub fn fit_numeric(labels: &[f32]) -> LabelEncoder {
		let mut values: Vec<f32> = labels.iter().copied().filter(|v| !v.is_nan()).collect();
		values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
		values.dedup();
		LabelEncoder {
			classes: values.into_iter().map(format_number_label).collect(),
		}
	}

	pub fn n_classes(&self) -> usize {
		self.classes.len()
	}

	pub fn transform<S: AsRef<str>>(&self, labels: &[S]) -> Result<Vec<usize>, UnseenLabelError> {
		let index: BTreeMap<&str, usize> = self
			.classes
			.iter()
			.enumerate()
			.map(|(i, class)| (class.as_str(), i))
			.collect();
		labels
			.iter()
			.map(|label| {
				index
					.get(label.as_ref())
					.copied()
					.ok_or_else(|| UnseenLabelError(label.as_ref().to_owned()))
			})
			.collect()
	}

	pub fn inverse_transform(&self, class_index: usize) -> Option<&str> {
		self.classes.get(class_index).map(|class| class.as_str())
	}
}

/// Format a numeric class label the way it would be written by hand: integers without a decimal point.
pub fn format_number_label(value: f32) -> String {
	if value.fract() == 0.0 && value.abs() < 1e9 {
		format!("{}", value.to_i64().unwrap_or(0))
	} else {
		format!("{}", value)
	}
}

#[test]
fn test_label_encoder() {
	let encoder = LabelEncoder::fit(&["dog", "cat", "dog", "bird"]);
	assert_eq!(encoder.classes, vec!["bird", "cat", "dog"]);
	assert_eq!(encoder.transform(&["cat", "bird"]).unwrap(), vec![1, 0]);
	assert!(matches!(
		encoder.transform(&["fish"]),
		Err(UnseenLabelError(label)) if label == "fish"
	));
	assert_eq!(encoder.inverse_transform(2), Some("dog"));
}

#[test]
fn test_numeric_labels_sort_by_value() {
	let encoder = LabelEncoder::fit_numeric(&[10.0, 2.0, 2.0, 0.5]);
	assert_eq!(encoder.classes, vec!["0.5", "2", "10"]);
}
