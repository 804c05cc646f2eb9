/// This function computes feature importances using the "gain" method, where a feature's importance is proportional to the total improvement in the split criterion of the nodes that split on it. The result sums to 1, or is all zeros if no tree made a split.
pub fn normalize_feature_gains(feature_gains: &[f64]) -> Vec<f32> {
	let total: f64 = feature_gains.iter().sum();
	if total <= 0.0 {
		return vec![0.0; feature_gains.len()];
	}
	feature_gains
		.iter()
		.map(|gain| (gain / total) as f32)
		.collect()
}

/// Average the normalized importances of many trees.
pub fn average_feature_importances(per_tree: &[Vec<f32>], n_features: usize) -> Vec<f32> {
	let mut feature_importances = vec![0.0; n_features];
	for importances in per_tree.iter() {
		for (total, importance) in feature_importances.iter_mut().zip(importances.iter()) {
			*total += importance;
		}
	}
	let n_trees = per_tree.len().max(1) as f32;
	for feature_importance in feature_importances.iter_mut() {
		*feature_importance /= n_trees;
	}
	feature_importances
}

#[test]
fn test_normalize_feature_gains() {
	assert_eq!(normalize_feature_gains(&[3.0, 1.0, 0.0]), vec![0.75, 0.25, 0.0]);
	assert_eq!(normalize_feature_gains(&[0.0, 0.0]), vec![0.0, 0.0]);
}

#[test]
fn test_average_feature_importances() {
	let averaged = average_feature_importances(&[vec![1.0, 0.0], vec![0.5, 0.5]], 2);
	assert_eq!(averaged, vec![0.75, 0.25]);
}
