use std::path::PathBuf;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// The kinds of record the store holds, used in `NotFound` errors.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecordKind {
	Dataset,
	Model,
	Job,
}

impl std::fmt::Display for RecordKind {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		let s = match self {
			RecordKind::Dataset => "dataset",
			RecordKind::Model => "model",
			RecordKind::Job => "job",
		};
		write!(f, "{}", s)
	}
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("unsupported algorithm \"{0}\"")]
	UnsupportedAlgorithm(String),
	#[error("unsupported file type \"{0}\"")]
	UnsupportedFileType(String),
	#[error("target column \"{0}\" was not found in the dataset")]
	MissingTargetColumn(String),
	#[error("invalid params for {algorithm}: {message}")]
	InvalidParams { algorithm: String, message: String },
	#[error("{0}")]
	InvalidInput(String),
	#[error("{kind} {id} not found")]
	NotFound { kind: RecordKind, id: String },
	#[error("file is {size} bytes but at most {limit} bytes are allowed")]
	FileTooLarge { size: u64, limit: u64 },
	#[error("class \"{class}\" has {count} samples but stratification requires at least {required}")]
	InsufficientClassSamples {
		class: String,
		count: usize,
		required: usize,
	},
	#[error("label \"{0}\" in the test split was not seen in the training split")]
	UnseenLabel(String),
	#[error("metric \"{0}\" is not finite")]
	MetricsComputation(String),
	#[error("training failed: {0}")]
	Training(String),
	#[error("artifact not found at {}", .0.display())]
	ArtifactNotFound(PathBuf),
	#[error("artifact at {} is corrupt: {reason}", .path.display())]
	ArtifactCorrupt { path: PathBuf, reason: String },
	#[error("job was cancelled")]
	Cancelled,
	#[error(transparent)]
	Load(#[from] workbench_dataframe::LoadError),
	#[error("invalid config: {0}")]
	Config(#[from] serde_yaml::Error),
	#[error(transparent)]
	Io(#[from] std::io::Error),
	#[error(transparent)]
	Json(#[from] serde_json::Error),
	#[error(transparent)]
	Encode(#[from] rmp_serde::encode::Error),
	#[error("internal error: {0}")]
	Internal(String),
}

/// Coarse error categories an outer surface maps to responses.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
	Validation,
	NotFound,
	ResourceExhausted,
	TrainingFailure,
	PersistenceFailure,
	Internal,
}

impl ErrorKind {
	/// The equivalent HTTP status code.
	pub fn status_code(self) -> u16 {
		match self {
			ErrorKind::Validation => 400,
			ErrorKind::NotFound => 404,
			ErrorKind::ResourceExhausted => 413,
			ErrorKind::TrainingFailure => 422,
			ErrorKind::PersistenceFailure | ErrorKind::Internal => 500,
		}
	}
}

impl Error {
	pub fn kind(&self) -> ErrorKind {
		match self {
			Error::UnsupportedAlgorithm(_)
			| Error::UnsupportedFileType(_)
			| Error::MissingTargetColumn(_)
			| Error::InvalidParams { .. }
			| Error::InvalidInput(_)
			| Error::Load(_)
			| Error::Config(_) => ErrorKind::Validation,
			Error::NotFound { .. } => ErrorKind::NotFound,
			Error::FileTooLarge { .. } => ErrorKind::ResourceExhausted,
			Error::InsufficientClassSamples { .. }
			| Error::UnseenLabel(_)
			| Error::MetricsComputation(_)
			| Error::Training(_)
			| Error::Cancelled => ErrorKind::TrainingFailure,
			Error::ArtifactNotFound(_) | Error::ArtifactCorrupt { .. } => {
				ErrorKind::PersistenceFailure
			}
			Error::Io(_) | Error::Json(_) | Error::Encode(_) | Error::Internal(_) => {
				ErrorKind::Internal
			}
		}
	}

	/// A missing artifact reads as not found to an inference caller. Everything else follows its kind.
	pub fn status_code(&self) -> u16 {
		match self {
			Error::ArtifactNotFound(_) => 404,
			_ => self.kind().status_code(),
		}
	}

	pub(crate) fn not_found(kind: RecordKind, id: impl std::fmt::Display) -> Error {
		Error::NotFound {
			kind,
			id: id.to_string(),
		}
	}
}

#[test]
fn test_status_codes() {
	assert_eq!(
		Error::UnsupportedAlgorithm("x".to_owned()).status_code(),
		400
	);
	assert_eq!(Error::not_found(RecordKind::Model, "abc").status_code(), 404);
	assert_eq!(
		Error::FileTooLarge { size: 2, limit: 1 }.status_code(),
		413
	);
	assert_eq!(Error::Training("boom".to_owned()).status_code(), 422);
	assert_eq!(Error::ArtifactNotFound(PathBuf::from("a")).status_code(), 404);
	assert_eq!(
		Error::ArtifactCorrupt {
			path: PathBuf::from("a"),
			reason: "digest mismatch".to_owned()
		}
		.status_code(),
		500
	);
	assert_eq!(
		Error::not_found(RecordKind::Dataset, "abc").to_string(),
		"dataset abc not found"
	);
}
