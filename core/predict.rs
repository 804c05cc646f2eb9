use crate::{
	algorithm::Algorithm,
	artifact::ArtifactBundle,
	error::{Error, Result},
	preprocess::{encode_records, MissingFeaturePolicy, Record},
	store::ModelRecord,
};
use chrono::{DateTime, Utc};
use ndarray::prelude::*;
use std::collections::BTreeMap;
use workbench_features::ScalingMethod;
use workbench_util::id::Id;

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Prediction {
	pub label: String,
	/// The probability of the predicted class, if the model outputs probabilities.
	pub confidence: Option<f32>,
	pub probabilities: Option<BTreeMap<String, f32>>,
}

/// Predictions for a batch of records as parallel arrays.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct BatchPrediction {
	pub predictions: Vec<String>,
	pub confidences: Vec<Option<f32>>,
	pub probabilities: Option<Vec<BTreeMap<String, f32>>>,
}

/// Describes the inputs a model expects and the classes it predicts.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct PredictionInfo {
	pub model_id: Id,
	pub algorithm: Algorithm,
	pub dataset_id: Id,
	/// Record fields in the order the model was fit on.
	pub input_features: Vec<String>,
	pub output_classes: Vec<String>,
	pub scaling: ScalingMethod,
	pub is_active: bool,
	pub created_at: DateTime<Utc>,
}

pub fn prediction_info(model: &ModelRecord, bundle: &ArtifactBundle) -> PredictionInfo {
	PredictionInfo {
		model_id: model.id,
		algorithm: model.algorithm,
		dataset_id: model.dataset_id,
		input_features: bundle.feature_names(),
		output_classes: bundle.classes.clone(),
		scaling: bundle.scaler.method(),
		is_active: model.is_active,
		created_at: model.created_at,
	}
}

pub fn predict_batch(
	bundle: &ArtifactBundle,
	records: &[Record],
	policy: MissingFeaturePolicy,
) -> Result<BatchPrediction> {
	if records.is_empty() {
		return Err(Error::InvalidInput("no records to predict".to_owned()));
	}
	let features = encode_records(&bundle.feature_columns, records, policy)?;
	let probabilities = bundle.predict_proba(features.view());
	let class_indexes = match &probabilities {
		Some(probabilities) => crate::estimator::argmax_rows(probabilities.view()),
		None => bundle.predict(features.view()),
	};
	let label = |class_index: usize| -> Result<String> {
		bundle
			.label_encoder
			.inverse_transform(class_index)
			.map(|label| label.to_owned())
			.ok_or_else(|| Error::Internal(format!("class index {} out of range", class_index)))
	};
	let predictions = class_indexes
		.iter()
		.map(|class_index| label(*class_index))
		.collect::<Result<Vec<_>>>()?;
	let confidences = match &probabilities {
		Some(probabilities) => class_indexes
			.iter()
			.zip(probabilities.axis_iter(Axis(0)))
			.map(|(class_index, row)| Some(row[*class_index]))
			.collect(),
		None => vec![None; records.len()],
	};
	let probabilities = probabilities.map(|probabilities| {
		probabilities
			.axis_iter(Axis(0))
			.map(|row| {
				bundle
					.classes
					.iter()
					.cloned()
					.zip(row.iter().copied())
					.collect()
			})
			.collect()
	});
	Ok(BatchPrediction {
		predictions,
		confidences,
		probabilities,
	})
}

pub fn predict(
	bundle: &ArtifactBundle,
	record: &Record,
	policy: MissingFeaturePolicy,
) -> Result<Prediction> {
	let batch = predict_batch(bundle, std::slice::from_ref(record), policy)?;
	let BatchPrediction {
		predictions,
		confidences,
		probabilities,
	} = batch;
	Ok(Prediction {
		label: predictions.into_iter().next().unwrap_or_default(),
		confidence: confidences.into_iter().next().flatten(),
		probabilities: probabilities.and_then(|p| p.into_iter().next()),
	})
}
