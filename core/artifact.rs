/*!
An artifact bundle is everything inference needs from one training run: the fitted estimator, the scaler and label encoder fit alongside it, and the feature columns it was fit on.

On disk a bundle is a single file, `<model_id>.workbench`. The first byte is the format version. The next 32 bytes are the SHA-256 digest of the payload, and the rest is the payload: the bundle serialized as MessagePack with named fields. Files are written to a temporary file in the same directory and renamed into place, so readers only ever see a complete bundle.
*/

use crate::{
	algorithm::{Algorithm, Params},
	error::{Error, Result},
	estimator::Estimator,
	preprocess::FeatureColumn,
};
use chrono::{DateTime, Utc};
use ndarray::prelude::*;
use sha2::{Digest, Sha256};
use std::{
	io::Write,
	path::{Path, PathBuf},
};
use workbench_features::{LabelEncoder, Scaler};
use workbench_util::id::Id;

pub const FORMAT_VERSION: u8 = 0;
const DIGEST_LEN: usize = 32;
const HEADER_LEN: usize = 1 + DIGEST_LEN;
pub const ARTIFACT_EXTENSION: &str = "workbench";

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ArtifactBundle {
	pub format_version: u8,
	pub model_id: Id,
	pub algorithm: Algorithm,
	pub params: Params,
	pub estimator: Estimator,
	pub scaler: Scaler,
	pub label_encoder: LabelEncoder,
	/// The fit-time feature order. Inference inputs are projected onto it.
	pub feature_columns: Vec<FeatureColumn>,
	/// `classes[i]` is the label of class index `i`.
	pub classes: Vec<String>,
	pub trained_at: DateTime<Utc>,
}

impl ArtifactBundle {
	/// Class probabilities for raw, unscaled features.
	pub fn predict_proba(&self, features: ArrayView2<f32>) -> Option<Array2<f32>> {
		let features = self.scaler.transform(features);
		self.estimator.predict_proba(features.view())
	}

	/// Class indexes for raw, unscaled features.
	pub fn predict(&self, features: ArrayView2<f32>) -> Array1<usize> {
		let features = self.scaler.transform(features);
		self.estimator.predict(features.view())
	}

	pub fn feature_names(&self) -> Vec<String> {
		self.feature_columns
			.iter()
			.map(|column| column.name.clone())
			.collect()
	}

	fn to_bytes(&self) -> Result<Vec<u8>> {
		let payload = rmp_serde::to_vec_named(self)?;
		let digest = Sha256::digest(&payload);
		let mut bytes = Vec::with_capacity(HEADER_LEN + payload.len());
		bytes.push(FORMAT_VERSION);
		bytes.extend_from_slice(&digest);
		bytes.extend_from_slice(&payload);
		Ok(bytes)
	}

	fn from_bytes(path: &Path, bytes: &[u8]) -> Result<ArtifactBundle> {
		let corrupt = |reason: String| Error::ArtifactCorrupt {
			path: path.to_owned(),
			reason,
		};
		if bytes.len() < HEADER_LEN {
			return Err(corrupt(format!("the file is only {} bytes", bytes.len())));
		}
		let format_version = bytes[0];
		if format_version != FORMAT_VERSION {
			return Err(corrupt(format!("unknown format version {}", format_version)));
		}
		let (digest, payload) = bytes[1..].split_at(DIGEST_LEN);
		if Sha256::digest(payload).as_slice() != digest {
			return Err(corrupt("the digest does not match the payload".to_owned()));
		}
		let bundle: ArtifactBundle =
			rmp_serde::from_slice(payload).map_err(|error| corrupt(error.to_string()))?;
		if bundle.scaler.n_features() != bundle.feature_columns.len() {
			return Err(corrupt(format!(
				"the scaler has {} features but the bundle lists {} feature columns",
				bundle.scaler.n_features(),
				bundle.feature_columns.len()
			)));
		}
		Ok(bundle)
	}
}

/// Reads and writes artifact bundles in one directory.
#[derive(Clone, Debug)]
pub struct ArtifactStore {
	dir: PathBuf,
}

impl ArtifactStore {
	pub fn new(dir: impl Into<PathBuf>) -> ArtifactStore {
		ArtifactStore { dir: dir.into() }
	}

	pub fn path(&self, model_id: Id) -> PathBuf {
		self.dir
			.join(format!("{}.{}", model_id, ARTIFACT_EXTENSION))
	}

	pub fn save(&self, bundle: &ArtifactBundle, model_id: Id) -> Result<PathBuf> {
		std::fs::create_dir_all(&self.dir)?;
		let path = self.path(model_id);
		let bytes = bundle.to_bytes()?;
		let mut file = tempfile::NamedTempFile::new_in(&self.dir)?;
		file.write_all(&bytes)?;
		file.as_file().sync_all()?;
		file.persist(&path).map_err(|error| error.error)?;
		tracing::debug!(model_id = %model_id, path = %path.display(), bytes = bytes.len(), "wrote artifact");
		Ok(path)
	}

	pub fn load(&self, path: &Path) -> Result<ArtifactBundle> {
		let bytes = match std::fs::read(path) {
			Ok(bytes) => bytes,
			Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
				return Err(Error::ArtifactNotFound(path.to_owned()))
			}
			Err(error) => return Err(error.into()),
		};
		ArtifactBundle::from_bytes(path, &bytes)
	}

	/// Remove a bundle. Returns false if there was nothing to remove.
	pub fn delete(&self, model_id: Id) -> Result<bool> {
		match std::fs::remove_file(self.path(model_id)) {
			Ok(()) => Ok(true),
			Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(false),
			Err(error) => Err(error.into()),
		}
	}
}

#[cfg(test)]
fn test_bundle() -> (ArtifactBundle, Array2<f32>) {
	use crate::preprocess::FeatureKind;
	use workbench_features::ScalingMethod;
	let features = arr2(&[
		[0.0, 1.0],
		[0.2, 0.8],
		[0.1, 1.2],
		[3.0, -1.0],
		[3.2, -0.8],
		[2.9, -1.1],
	]);
	let labels = arr1(&[0, 0, 0, 1, 1, 1]);
	let scaler = Scaler::fit(ScalingMethod::Standard, features.view());
	let scaled = scaler.transform(features.view());
	let estimator = Estimator::fit(
		Algorithm::GradientBoosting,
		&Params::new(),
		scaled.view(),
		labels.view(),
		2,
		42,
	)
	.unwrap();
	let model_id = Id::new();
	let bundle = ArtifactBundle {
		format_version: FORMAT_VERSION,
		model_id,
		algorithm: Algorithm::GradientBoosting,
		params: Algorithm::GradientBoosting.default_params(),
		estimator,
		scaler,
		label_encoder: LabelEncoder::fit(&["a", "b"]),
		feature_columns: vec![
			FeatureColumn {
				name: "x".to_owned(),
				kind: FeatureKind::Number,
			},
			FeatureColumn {
				name: "y".to_owned(),
				kind: FeatureKind::Number,
			},
		],
		classes: vec!["a".to_owned(), "b".to_owned()],
		trained_at: Utc::now(),
	};
	(bundle, features)
}

#[test]
fn test_round_trip_is_bit_identical() {
	let dir = tempfile::tempdir().unwrap();
	let store = ArtifactStore::new(dir.path());
	let (bundle, features) = test_bundle();
	let path = store.save(&bundle, bundle.model_id).unwrap();
	assert_eq!(path, store.path(bundle.model_id));
	let loaded = store.load(&path).unwrap();
	assert_eq!(loaded, bundle);
	let expected = bundle.predict_proba(features.view()).unwrap();
	let actual = loaded.predict_proba(features.view()).unwrap();
	let expected_bits: Vec<u32> = expected.iter().map(|p| p.to_bits()).collect();
	let actual_bits: Vec<u32> = actual.iter().map(|p| p.to_bits()).collect();
	assert_eq!(expected_bits, actual_bits);
	assert_eq!(loaded.predict(features.view()), arr1(&[0, 0, 0, 1, 1, 1]));
}

#[test]
fn test_corrupt_and_missing() {
	let dir = tempfile::tempdir().unwrap();
	let store = ArtifactStore::new(dir.path());
	let (bundle, _) = test_bundle();
	let path = store.save(&bundle, bundle.model_id).unwrap();
	let mut bytes = std::fs::read(&path).unwrap();
	let last = bytes.len() - 1;
	bytes[last] ^= 0xff;
	std::fs::write(&path, &bytes).unwrap();
	assert!(matches!(store.load(&path), Err(Error::ArtifactCorrupt { .. })));
	std::fs::write(&path, [1u8, 2, 3]).unwrap();
	assert!(matches!(store.load(&path), Err(Error::ArtifactCorrupt { .. })));
	let (mut mismatched, _) = test_bundle();
	mismatched.feature_columns.pop();
	let path = store.save(&mismatched, mismatched.model_id).unwrap();
	assert!(matches!(store.load(&path), Err(Error::ArtifactCorrupt { .. })));
	let missing = store.path(Id::new());
	assert!(matches!(store.load(&missing), Err(Error::ArtifactNotFound(_))));
}

#[test]
fn test_delete_is_idempotent() {
	let dir = tempfile::tempdir().unwrap();
	let store = ArtifactStore::new(dir.path());
	let (bundle, _) = test_bundle();
	store.save(&bundle, bundle.model_id).unwrap();
	assert!(store.delete(bundle.model_id).unwrap());
	assert!(!store.delete(bundle.model_id).unwrap());
	assert!(!store.delete(bundle.model_id).unwrap());
}
