/*!
This module computes the metrics bundle of a trained model on its test split. Accuracy, precision, recall, f1 and the confusion matrix are always present. The ROC curve and its AUC are present only when the model produces probabilities. Feature importances come from the model's own importances if it has them, otherwise from the magnitude of its linear coefficients, otherwise they are omitted.
*/

use crate::{
	error::{Error, Result},
	estimator::Estimator,
};
use ndarray::prelude::*;
use workbench_metrics::{
	auc, average_precision, compute_precision_recall_curve, compute_roc_curve,
	ClassificationMetrics, RocCurvePoint, StreamingMetric,
};

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Metrics {
	pub accuracy: f32,
	/// Macro averaged.
	pub precision: f32,
	/// Macro averaged.
	pub recall: f32,
	/// Macro averaged.
	pub f1_score: f32,
	pub classification_report: ClassificationReport,
	/// Indexed by (true class, predicted class) in class order.
	pub confusion_matrix: Vec<Vec<u64>>,
	#[serde(skip_serializing_if = "Option::is_none", default)]
	pub roc: Option<Roc>,
	/// The binary AUC, or the micro averaged AUC for more than two classes.
	#[serde(skip_serializing_if = "Option::is_none", default)]
	pub auc: Option<f32>,
	#[serde(skip_serializing_if = "Option::is_none", default)]
	pub precision_recall: Option<PrecisionRecallCurve>,
	/// Sorted by descending importance.
	#[serde(skip_serializing_if = "Option::is_none", default)]
	pub feature_importance: Option<Vec<FeatureImportance>>,
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ClassificationReport {
	pub classes: Vec<ClassReport>,
	pub macro_avg: AverageReport,
	pub weighted_avg: AverageReport,
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ClassReport {
	pub class: String,
	pub precision: f32,
	pub recall: f32,
	pub f1_score: f32,
	pub support: u64,
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct AverageReport {
	pub precision: f32,
	pub recall: f32,
	pub f1_score: f32,
	pub support: u64,
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Roc {
	Binary(RocCurve),
	/// `per_class[i]` is the one-vs-rest curve of class `i`.
	Multiclass {
		micro: RocCurve,
		per_class: Vec<RocCurve>,
	},
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct RocCurve {
	pub fpr: Vec<f32>,
	pub tpr: Vec<f32>,
	pub thresholds: Vec<f32>,
}

impl From<Vec<RocCurvePoint>> for RocCurve {
	fn from(points: Vec<RocCurvePoint>) -> RocCurve {
		RocCurve {
			fpr: points.iter().map(|p| p.false_positive_rate).collect(),
			tpr: points.iter().map(|p| p.true_positive_rate).collect(),
			thresholds: points.iter().map(|p| p.threshold).collect(),
		}
	}
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct PrecisionRecallCurve {
	pub precision: Vec<f32>,
	pub recall: Vec<f32>,
	pub thresholds: Vec<f32>,
	pub average_precision: f32,
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct FeatureImportance {
	pub feature: String,
	pub importance: f32,
}

/// Compute the metrics bundle. `labels` and `predictions` are class indexes into `classes`. `probabilities` has one column per class.
pub fn evaluate(
	labels: ArrayView1<usize>,
	predictions: ArrayView1<usize>,
	probabilities: Option<ArrayView2<f32>>,
	classes: &[String],
	feature_names: &[String],
	estimator: &Estimator,
) -> Result<Metrics> {
	let n_classes = classes.len();
	let mut classification_metrics = ClassificationMetrics::new(n_classes);
	for (label, prediction) in labels.iter().zip(predictions.iter()) {
		classification_metrics.update((*label, *prediction));
	}
	let output = classification_metrics.finalize();
	let total_support: u64 = output.class_metrics.iter().map(|c| c.support).sum();
	let classification_report = ClassificationReport {
		classes: output
			.class_metrics
			.iter()
			.zip(classes.iter())
			.map(|(class_metrics, class)| ClassReport {
				class: class.clone(),
				precision: class_metrics.precision,
				recall: class_metrics.recall,
				f1_score: class_metrics.f1_score,
				support: class_metrics.support,
			})
			.collect(),
		macro_avg: AverageReport {
			precision: output.precision_macro,
			recall: output.recall_macro,
			f1_score: output.f1_score_macro,
			support: total_support,
		},
		weighted_avg: AverageReport {
			precision: output.precision_weighted,
			recall: output.recall_weighted,
			f1_score: output.f1_score_weighted,
			support: total_support,
		},
	};
	let confusion_matrix = output
		.confusion_matrix
		.axis_iter(Axis(0))
		.map(|row| row.to_vec())
		.collect();

	let (roc, auc, precision_recall) = match probabilities {
		Some(probabilities) => compute_curves(labels, probabilities, n_classes),
		None => (None, None, None),
	};

	let metrics = Metrics {
		accuracy: output.accuracy,
		precision: output.precision_macro,
		recall: output.recall_macro,
		f1_score: output.f1_score_macro,
		classification_report,
		confusion_matrix,
		roc,
		auc,
		precision_recall,
		feature_importance: compute_feature_importance(estimator, feature_names),
	};
	check_finite(&metrics)?;
	Ok(metrics)
}

/// ROC curves need both positives and negatives. When the test labels do not provide them, the curves are omitted.
fn compute_curves(
	labels: ArrayView1<usize>,
	probabilities: ArrayView2<f32>,
	n_classes: usize,
) -> (Option<Roc>, Option<f32>, Option<PrecisionRecallCurve>) {
	let mut class_counts = vec![0usize; n_classes];
	for label in labels.iter() {
		class_counts[*label] += 1;
	}
	if class_counts.iter().any(|count| *count == 0) {
		return (None, None, None);
	}
	if n_classes == 2 {
		let positive_probabilities = probabilities.column(1).to_vec();
		let positives: Vec<bool> = labels.iter().map(|label| *label == 1).collect();
		let points = compute_roc_curve(&positive_probabilities, &positives);
		let auc = auc(&points);
		let pr_points = compute_precision_recall_curve(&positive_probabilities, &positives);
		let precision_recall = PrecisionRecallCurve {
			average_precision: average_precision(&pr_points),
			precision: pr_points.iter().map(|p| p.precision).collect(),
			recall: pr_points.iter().map(|p| p.recall).collect(),
			thresholds: pr_points.iter().map(|p| p.threshold).collect(),
		};
		(
			Some(Roc::Binary(points.into())),
			Some(auc),
			Some(precision_recall),
		)
	} else {
		// The micro average pools every (example, class) pair of the one-hot expansion.
		let mut pooled_probabilities = Vec::with_capacity(labels.len() * n_classes);
		let mut pooled_labels = Vec::with_capacity(labels.len() * n_classes);
		for (label, row) in labels.iter().zip(probabilities.axis_iter(Axis(0))) {
			for (class_index, probability) in row.iter().enumerate() {
				pooled_probabilities.push(*probability);
				pooled_labels.push(class_index == *label);
			}
		}
		let micro = compute_roc_curve(&pooled_probabilities, &pooled_labels);
		let micro_auc = auc(&micro);
		let per_class = (0..n_classes)
			.map(|class_index| {
				let class_probabilities = probabilities.column(class_index).to_vec();
				let positives: Vec<bool> =
					labels.iter().map(|label| *label == class_index).collect();
				compute_roc_curve(&class_probabilities, &positives).into()
			})
			.collect();
		(
			Some(Roc::Multiclass {
				micro: micro.into(),
				per_class,
			}),
			Some(micro_auc),
			None,
		)
	}
}

fn compute_feature_importance(
	estimator: &Estimator,
	feature_names: &[String],
) -> Option<Vec<FeatureImportance>> {
	let importances = match estimator.feature_importances() {
		Some(importances) => importances,
		None => {
			let coefficients = estimator.coefficients()?;
			coefficients
				.mapv(f32::abs)
				.mean_axis(Axis(0))?
				.to_vec()
		}
	};
	let mut importances: Vec<FeatureImportance> = feature_names
		.iter()
		.zip(importances)
		.map(|(feature, importance)| FeatureImportance {
			feature: feature.clone(),
			importance,
		})
		.collect();
	importances.sort_by(|a, b| b.importance.total_cmp(&a.importance));
	Some(importances)
}

fn check_finite(metrics: &Metrics) -> Result<()> {
	fn check(name: &str, values: &[f32]) -> Result<()> {
		if values.iter().all(|value| value.is_finite()) {
			Ok(())
		} else {
			Err(Error::MetricsComputation(name.to_owned()))
		}
	}
	fn check_curve(name: &str, curve: &RocCurve) -> Result<()> {
		check(name, &curve.fpr)?;
		check(name, &curve.tpr)?;
		check(name, &curve.thresholds)
	}
	check("accuracy", &[metrics.accuracy])?;
	check("precision", &[metrics.precision])?;
	check("recall", &[metrics.recall])?;
	check("f1_score", &[metrics.f1_score])?;
	for class in metrics.classification_report.classes.iter() {
		check(
			"classification_report",
			&[class.precision, class.recall, class.f1_score],
		)?;
	}
	let weighted = &metrics.classification_report.weighted_avg;
	check(
		"classification_report",
		&[weighted.precision, weighted.recall, weighted.f1_score],
	)?;
	match &metrics.roc {
		Some(Roc::Binary(curve)) => check_curve("roc", curve)?,
		Some(Roc::Multiclass { micro, per_class }) => {
			check_curve("roc", micro)?;
			for curve in per_class {
				check_curve("roc", curve)?;
			}
		}
		None => {}
	}
	if let Some(auc) = metrics.auc {
		check("auc", &[auc])?;
	}
	if let Some(curve) = &metrics.precision_recall {
		check("precision_recall", &curve.precision)?;
		check("precision_recall", &curve.recall)?;
		check("average_precision", &[curve.average_precision])?;
	}
	if let Some(importances) = &metrics.feature_importance {
		let values: Vec<f32> = importances.iter().map(|i| i.importance).collect();
		check("feature_importance", &values)?;
	}
	Ok(())
}

#[cfg(test)]
fn naive_bayes_estimator() -> Estimator {
	let features = arr2(&[[0.0f32], [0.1], [1.0], [1.1], [2.0], [2.1]]);
	let labels = arr1(&[0usize, 0, 1, 1, 2, 2]);
	Estimator::fit(
		crate::algorithm::Algorithm::NaiveBayes,
		&Default::default(),
		features.view(),
		labels.view(),
		3,
		0,
	)
	.unwrap()
}

#[test]
fn test_binary_metrics() {
	let estimator = naive_bayes_estimator();
	let labels = arr1(&[0, 0, 1, 1]);
	let predictions = arr1(&[0, 1, 1, 1]);
	let probabilities = arr2(&[[0.9, 0.1], [0.4, 0.6], [0.3, 0.7], [0.2, 0.8]]);
	let classes = vec!["no".to_owned(), "yes".to_owned()];
	let metrics = evaluate(
		labels.view(),
		predictions.view(),
		Some(probabilities.view()),
		&classes,
		&["x".to_owned()],
		&estimator,
	)
	.unwrap();
	assert_eq!(metrics.accuracy, 0.75);
	insta::assert_debug_snapshot!(metrics.confusion_matrix, @r###"
 [
     [
         1,
         1,
     ],
     [
         0,
         2,
     ],
 ]
 "###);
	assert!(matches!(metrics.roc, Some(Roc::Binary(_))));
	assert_eq!(metrics.auc, Some(1.0));
	assert!(metrics.precision_recall.is_some());
	assert_eq!(metrics.classification_report.classes[1].class, "yes");
	assert_eq!(metrics.classification_report.macro_avg.support, 4);
	// Naive Bayes has neither importances nor coefficients.
	assert!(metrics.feature_importance.is_none());
}

#[test]
fn test_without_probabilities() {
	let estimator = naive_bayes_estimator();
	let labels = arr1(&[0, 1]);
	let predictions = arr1(&[0, 0]);
	let classes = vec!["a".to_owned(), "b".to_owned()];
	let metrics = evaluate(labels.view(), predictions.view(), None, &classes, &[], &estimator).unwrap();
	assert!(metrics.roc.is_none());
	assert!(metrics.auc.is_none());
	// The precision of class b has a zero denominator.
	assert_eq!(metrics.classification_report.classes[1].precision, 0.0);
	let json = serde_json::to_value(&metrics).unwrap();
	assert!(json.get("roc").is_none());
}

#[test]
fn test_multiclass_roc() {
	let estimator = naive_bayes_estimator();
	let labels = arr1(&[0, 1, 2]);
	let predictions = arr1(&[0, 1, 2]);
	let probabilities = arr2(&[[0.8, 0.1, 0.1], [0.1, 0.8, 0.1], [0.1, 0.1, 0.8]]);
	let classes = vec!["a".to_owned(), "b".to_owned(), "c".to_owned()];
	let metrics = evaluate(
		labels.view(),
		predictions.view(),
		Some(probabilities.view()),
		&classes,
		&["x".to_owned()],
		&estimator,
	)
	.unwrap();
	match metrics.roc {
		Some(Roc::Multiclass { per_class, .. }) => assert_eq!(per_class.len(), 3),
		_ => panic!("expected a multiclass roc"),
	}
	assert_eq!(metrics.auc, Some(1.0));
	assert!(metrics.precision_recall.is_none());
}

#[test]
fn test_single_class_test_split_omits_roc() {
	let estimator = naive_bayes_estimator();
	let labels = arr1(&[1, 1]);
	let predictions = arr1(&[1, 0]);
	let probabilities = arr2(&[[0.2, 0.8], [0.6, 0.4]]);
	let classes = vec!["a".to_owned(), "b".to_owned()];
	let metrics = evaluate(
		labels.view(),
		predictions.view(),
		Some(probabilities.view()),
		&classes,
		&[],
		&estimator,
	)
	.unwrap();
	assert!(metrics.roc.is_none());
}

#[test]
fn test_non_finite_curve_is_an_error() {
	let estimator = naive_bayes_estimator();
	let labels = arr1(&[0, 1]);
	let predictions = arr1(&[0, 1]);
	let probabilities = arr2(&[[0.9, 0.1], [f32::NEG_INFINITY, f32::INFINITY]]);
	let classes = vec!["a".to_owned(), "b".to_owned()];
	let result = evaluate(
		labels.view(),
		predictions.view(),
		Some(probabilities.view()),
		&classes,
		&[],
		&estimator,
	);
	assert!(matches!(result, Err(Error::MetricsComputation(name)) if name == "roc"));
}

#[test]
fn test_coefficient_importances() {
	let features = arr2(&[
		[0.0f32, 0.1, 0.5],
		[0.2, -0.1, 0.4],
		[0.1, 0.0, 0.6],
		[2.0, 0.1, 0.5],
		[2.2, -0.1, 0.4],
		[2.1, 0.0, 0.6],
	]);
	let labels = arr1(&[0usize, 0, 0, 1, 1, 1]);
	let feature_names = vec!["a".to_owned(), "b".to_owned(), "c".to_owned()];
	let classes = vec!["no".to_owned(), "yes".to_owned()];
	let linear_svm = maplit::btreemap! { "kernel".to_owned() => serde_json::json!("linear") };
	for (algorithm, params) in [
		(crate::algorithm::Algorithm::LogisticRegression, Default::default()),
		(crate::algorithm::Algorithm::Svm, linear_svm),
	] {
		let estimator =
			Estimator::fit(algorithm, &params, features.view(), labels.view(), 2, 0).unwrap();
		let coefficients = estimator.coefficients().unwrap();
		let metrics = evaluate(
			labels.view(),
			labels.view(),
			None,
			&classes,
			&feature_names,
			&estimator,
		)
		.unwrap();
		let importances = metrics.feature_importance.unwrap();
		assert_eq!(importances.len(), 3);
		for importance in importances.iter() {
			let column = feature_names
				.iter()
				.position(|name| *name == importance.feature)
				.unwrap();
			let expected = coefficients.column(column).mapv(f32::abs).mean().unwrap();
			assert!((importance.importance - expected).abs() < 1e-6);
		}
		for pair in importances.windows(2) {
			assert!(pair[0].importance >= pair[1].importance);
		}
		assert_eq!(importances[0].feature, "a");
	}
}
