use crate::error::{Error, Result};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::json;
use std::{collections::BTreeMap, fmt, str::FromStr};
use workbench_neighbors::Weights;
use workbench_svm::KernelType;
use workbench_tree::MaxFeatures;

/// Hyperparameters by name, as a caller supplies them and as they are recorded on a model.
pub type Params = BTreeMap<String, serde_json::Value>;

/// Every algorithm the workbench can train.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Algorithm {
	LogisticRegression,
	DecisionTree,
	RandomForest,
	GradientBoosting,
	Xgboost,
	Lightgbm,
	Catboost,
	Svm,
	NaiveBayes,
	Knn,
	NeuralNetwork,
}

impl Algorithm {
	pub fn all() -> &'static [Algorithm] {
		&[
			Algorithm::LogisticRegression,
			Algorithm::DecisionTree,
			Algorithm::RandomForest,
			Algorithm::GradientBoosting,
			Algorithm::Xgboost,
			Algorithm::Lightgbm,
			Algorithm::Catboost,
			Algorithm::Svm,
			Algorithm::NaiveBayes,
			Algorithm::Knn,
			Algorithm::NeuralNetwork,
		]
	}

	pub fn as_str(&self) -> &'static str {
		match self {
			Algorithm::LogisticRegression => "logistic_regression",
			Algorithm::DecisionTree => "decision_tree",
			Algorithm::RandomForest => "random_forest",
			Algorithm::GradientBoosting => "gradient_boosting",
			Algorithm::Xgboost => "xgboost",
			Algorithm::Lightgbm => "lightgbm",
			Algorithm::Catboost => "catboost",
			Algorithm::Svm => "svm",
			Algorithm::NaiveBayes => "naive_bayes",
			Algorithm::Knn => "knn",
			Algorithm::NeuralNetwork => "neural_network",
		}
	}

	pub fn display_name(&self) -> &'static str {
		match self {
			Algorithm::LogisticRegression => "Logistic Regression",
			Algorithm::DecisionTree => "Decision Tree",
			Algorithm::RandomForest => "Random Forest",
			Algorithm::GradientBoosting => "Gradient Boosting",
			Algorithm::Xgboost => "XGBoost",
			Algorithm::Lightgbm => "LightGBM",
			Algorithm::Catboost => "CatBoost",
			Algorithm::Svm => "Support Vector Machine",
			Algorithm::NaiveBayes => "Naive Bayes",
			Algorithm::Knn => "K-Nearest Neighbors",
			Algorithm::NeuralNetwork => "Neural Network",
		}
	}

	/// The gradient boosting presets share one engine and differ only in their defaults.
	pub fn is_gradient_boosting(&self) -> bool {
		matches!(
			self,
			Algorithm::GradientBoosting
				| Algorithm::Xgboost
				| Algorithm::Lightgbm
				| Algorithm::Catboost
		)
	}

	pub fn default_params(&self) -> Params {
		let value = match self {
			Algorithm::LogisticRegression => json!({
				"max_iter": 1000,
				"learning_rate": 0.1,
				"l2_regularization": 0.0001,
				"batch_size": 32,
				"early_stopping": true,
			}),
			Algorithm::DecisionTree => json!({
				"max_depth": 10,
				"min_samples_split": 2,
				"min_samples_leaf": 1,
			}),
			Algorithm::RandomForest => json!({
				"n_estimators": 100,
				"max_depth": 10,
				"min_samples_split": 2,
				"min_samples_leaf": 1,
				"max_features": "sqrt",
				"bootstrap": true,
			}),
			Algorithm::GradientBoosting => gradient_boosting_defaults(100, 0.1, 3, 8, 1, 0.0),
			Algorithm::Xgboost => gradient_boosting_defaults(100, 0.3, 6, 64, 1, 1.0),
			Algorithm::Lightgbm => gradient_boosting_defaults(100, 0.1, 0, 31, 20, 0.0),
			Algorithm::Catboost => gradient_boosting_defaults(300, 0.05, 6, 64, 1, 3.0),
			Algorithm::Svm => json!({
				"c": 1.0,
				"kernel": "rbf",
				"gamma": "scale",
				"coef0": 0.0,
				"degree": 3,
				"probability": true,
				"tol": 0.001,
				"max_passes": 5,
				"max_iter": 10000,
			}),
			Algorithm::NaiveBayes => json!({ "var_smoothing": 1e-9 }),
			Algorithm::Knn => json!({ "n_neighbors": 5, "weights": "uniform" }),
			Algorithm::NeuralNetwork => json!({
				"epochs": 50,
				"batch_size": 32,
				"learning_rate": 0.001,
			}),
		};
		match value {
			serde_json::Value::Object(map) => map.into_iter().collect(),
			_ => Params::new(),
		}
	}

	/// Merge `overrides` on top of the defaults and check that the result is a valid parameter set for this algorithm.
	pub fn merge_params(&self, overrides: &Params) -> Result<Params> {
		let mut params = self.default_params();
		params.extend(overrides.iter().map(|(k, v)| (k.clone(), v.clone())));
		self.parse_params(&params)?;
		Ok(params)
	}

	/// Merge `params` on top of the defaults and convert them into typed options.
	pub fn parse_params(&self, params: &Params) -> Result<AlgorithmParams> {
		let mut merged = self.default_params();
		merged.extend(params.iter().map(|(k, v)| (k.clone(), v.clone())));
		let parsed = match self {
			Algorithm::LogisticRegression => {
				AlgorithmParams::LogisticRegression(self.deserialize(merged)?)
			}
			Algorithm::DecisionTree => AlgorithmParams::DecisionTree(self.deserialize(merged)?),
			Algorithm::RandomForest => AlgorithmParams::RandomForest(self.deserialize(merged)?),
			Algorithm::GradientBoosting
			| Algorithm::Xgboost
			| Algorithm::Lightgbm
			| Algorithm::Catboost => AlgorithmParams::GradientBoosting(self.deserialize(merged)?),
			Algorithm::Svm => AlgorithmParams::Svm(self.deserialize(merged)?),
			Algorithm::NaiveBayes => AlgorithmParams::NaiveBayes(self.deserialize(merged)?),
			Algorithm::Knn => AlgorithmParams::Knn(self.deserialize(merged)?),
			Algorithm::NeuralNetwork => AlgorithmParams::NeuralNetwork(self.deserialize(merged)?),
		};
		parsed.check().map_err(|message| self.invalid_params(message))?;
		Ok(parsed)
	}

	fn deserialize<T: DeserializeOwned>(&self, params: Params) -> Result<T> {
		let value = serde_json::Value::Object(params.into_iter().collect());
		serde_json::from_value(value).map_err(|error| self.invalid_params(error.to_string()))
	}

	fn invalid_params(&self, message: String) -> Error {
		Error::InvalidParams {
			algorithm: self.as_str().to_owned(),
			message,
		}
	}
}

fn gradient_boosting_defaults(
	n_estimators: usize,
	learning_rate: f64,
	max_depth: usize,
	max_leaf_nodes: usize,
	min_samples_leaf: usize,
	l2_regularization: f64,
) -> serde_json::Value {
	json!({
		"n_estimators": n_estimators,
		"learning_rate": learning_rate,
		"max_depth": max_depth,
		"max_leaf_nodes": max_leaf_nodes,
		"min_samples_leaf": min_samples_leaf,
		"l2_regularization": l2_regularization,
		"subsample": 1.0,
	})
}

impl fmt::Display for Algorithm {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		write!(f, "{}", self.as_str())
	}
}

impl FromStr for Algorithm {
	type Err = Error;
	fn from_str(s: &str) -> Result<Algorithm> {
		let algorithm = match s {
			"svc" => Algorithm::Svm,
			"k_nearest_neighbors" => Algorithm::Knn,
			"gaussian_nb" => Algorithm::NaiveBayes,
			"mlp" => Algorithm::NeuralNetwork,
			s => Algorithm::all()
				.iter()
				.find(|algorithm| algorithm.as_str() == s)
				.copied()
				.ok_or_else(|| Error::UnsupportedAlgorithm(s.to_owned()))?,
		};
		Ok(algorithm)
	}
}

/// An entry of the algorithm catalog.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AlgorithmInfo {
	pub id: Algorithm,
	pub name: &'static str,
	pub default_params: Params,
}

pub fn list_algorithms() -> Vec<AlgorithmInfo> {
	Algorithm::all()
		.iter()
		.map(|algorithm| AlgorithmInfo {
			id: *algorithm,
			name: algorithm.display_name(),
			default_params: algorithm.default_params(),
		})
		.collect()
}

/// Validated, typed hyperparameters for one algorithm.
#[derive(Clone, Debug, PartialEq)]
pub enum AlgorithmParams {
	LogisticRegression(LogisticRegressionParams),
	DecisionTree(DecisionTreeParams),
	RandomForest(RandomForestParams),
	GradientBoosting(GradientBoostingParams),
	Svm(SvmParams),
	NaiveBayes(NaiveBayesParams),
	Knn(KnnParams),
	NeuralNetwork(NeuralNetworkParams),
}

impl AlgorithmParams {
	fn check(&self) -> std::result::Result<(), String> {
		match self {
			AlgorithmParams::LogisticRegression(params) => {
				positive("max_iter", params.max_iter as f64)?;
				positive("learning_rate", f64::from(params.learning_rate))?;
				non_negative("l2_regularization", f64::from(params.l2_regularization))?;
				positive("batch_size", params.batch_size as f64)
			}
			AlgorithmParams::DecisionTree(params) => {
				check_tree(params.min_samples_split, params.min_samples_leaf)
			}
			AlgorithmParams::RandomForest(params) => {
				positive("n_estimators", params.n_estimators as f64)?;
				if let MaxFeaturesParam::Count(0) = params.max_features {
					return Err("max_features must be positive".to_owned());
				}
				check_tree(params.min_samples_split, params.min_samples_leaf)
			}
			AlgorithmParams::GradientBoosting(params) => {
				positive("n_estimators", params.n_estimators as f64)?;
				positive("learning_rate", f64::from(params.learning_rate))?;
				positive("min_samples_leaf", params.min_samples_leaf as f64)?;
				non_negative("l2_regularization", f64::from(params.l2_regularization))?;
				if !(params.subsample > 0.0 && params.subsample <= 1.0) {
					return Err("subsample must be in (0, 1]".to_owned());
				}
				Ok(())
			}
			AlgorithmParams::Svm(params) => {
				positive("c", params.c)?;
				positive("tol", params.tol)?;
				positive("max_passes", params.max_passes as f64)?;
				positive("max_iter", params.max_iter as f64)?;
				positive("degree", f64::from(params.degree))?;
				if let GammaParam::Value(gamma) = params.gamma {
					positive("gamma", gamma)?;
				}
				Ok(())
			}
			AlgorithmParams::NaiveBayes(params) => non_negative("var_smoothing", params.var_smoothing),
			AlgorithmParams::Knn(params) => positive("n_neighbors", params.n_neighbors as f64),
			AlgorithmParams::NeuralNetwork(params) => {
				positive("epochs", params.epochs as f64)?;
				positive("batch_size", params.batch_size as f64)?;
				positive("learning_rate", f64::from(params.learning_rate))
			}
		}
	}
}

fn positive(name: &str, value: f64) -> std::result::Result<(), String> {
	if value.is_finite() && value > 0.0 {
		Ok(())
	} else {
		Err(format!("{} must be positive, got {}", name, value))
	}
}

fn non_negative(name: &str, value: f64) -> std::result::Result<(), String> {
	if value.is_finite() && value >= 0.0 {
		Ok(())
	} else {
		Err(format!("{} must not be negative, got {}", name, value))
	}
}

fn check_tree(min_samples_split: usize, min_samples_leaf: usize) -> std::result::Result<(), String> {
	if min_samples_split < 2 {
		return Err(format!(
			"min_samples_split must be at least 2, got {}",
			min_samples_split
		));
	}
	positive("min_samples_leaf", min_samples_leaf as f64)
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LogisticRegressionParams {
	pub max_iter: usize,
	pub learning_rate: f32,
	pub l2_regularization: f32,
	pub batch_size: usize,
	pub early_stopping: bool,
}

/// `max_depth` 0 means unlimited.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DecisionTreeParams {
	pub max_depth: usize,
	pub min_samples_split: usize,
	pub min_samples_leaf: usize,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RandomForestParams {
	pub n_estimators: usize,
	pub max_depth: usize,
	pub min_samples_split: usize,
	pub min_samples_leaf: usize,
	pub max_features: MaxFeaturesParam,
	pub bootstrap: bool,
}

/// Either a feature count or one of `"sqrt"`, `"log2"` and `"all"`.
#[derive(Clone, Copy, Debug, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum MaxFeaturesParam {
	Count(usize),
	Named(MaxFeatures),
}

impl From<MaxFeaturesParam> for MaxFeatures {
	fn from(value: MaxFeaturesParam) -> MaxFeatures {
		match value {
			MaxFeaturesParam::Count(n) => MaxFeatures::Count(n),
			MaxFeaturesParam::Named(max_features) => max_features,
		}
	}
}

/// `max_depth` and `max_leaf_nodes` 0 mean unlimited.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GradientBoostingParams {
	pub n_estimators: usize,
	pub learning_rate: f32,
	pub max_depth: usize,
	pub max_leaf_nodes: usize,
	pub min_samples_leaf: usize,
	pub l2_regularization: f32,
	pub subsample: f32,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SvmParams {
	pub c: f64,
	pub kernel: KernelType,
	pub gamma: GammaParam,
	pub coef0: f64,
	pub degree: u32,
	pub probability: bool,
	pub tol: f64,
	pub max_passes: usize,
	pub max_iter: usize,
}

/// Either a number or one of `"scale"` and `"auto"`.
#[derive(Clone, Copy, Debug, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum GammaParam {
	Value(f64),
	Named(NamedGamma),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NamedGamma {
	Scale,
	Auto,
}

impl From<GammaParam> for workbench_svm::Gamma {
	fn from(value: GammaParam) -> workbench_svm::Gamma {
		match value {
			GammaParam::Value(gamma) => workbench_svm::Gamma::Value(gamma),
			GammaParam::Named(NamedGamma::Scale) => workbench_svm::Gamma::Scale,
			GammaParam::Named(NamedGamma::Auto) => workbench_svm::Gamma::Auto,
		}
	}
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NaiveBayesParams {
	pub var_smoothing: f64,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct KnnParams {
	pub n_neighbors: usize,
	pub weights: Weights,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NeuralNetworkParams {
	pub epochs: usize,
	pub batch_size: usize,
	pub learning_rate: f32,
}

#[test]
fn test_from_str() {
	assert_eq!("random_forest".parse::<Algorithm>().unwrap(), Algorithm::RandomForest);
	assert_eq!("svc".parse::<Algorithm>().unwrap(), Algorithm::Svm);
	assert_eq!("mlp".parse::<Algorithm>().unwrap(), Algorithm::NeuralNetwork);
	assert!(matches!(
		"not_a_real_algo".parse::<Algorithm>(),
		Err(Error::UnsupportedAlgorithm(name)) if name == "not_a_real_algo"
	));
	for algorithm in Algorithm::all() {
		assert_eq!(algorithm.as_str().parse::<Algorithm>().unwrap(), *algorithm);
		assert_eq!(
			serde_json::to_value(algorithm).unwrap(),
			serde_json::Value::String(algorithm.as_str().to_owned())
		);
	}
}

#[test]
fn test_default_params_are_valid() {
	for algorithm in Algorithm::all() {
		algorithm.parse_params(&Params::new()).unwrap();
	}
}

#[test]
fn test_merge_params() {
	let params = Algorithm::RandomForest
		.merge_params(&maplit::btreemap! {
			"n_estimators".to_owned() => json!(10),
			"max_features".to_owned() => json!(2),
		})
		.unwrap();
	assert_eq!(params["n_estimators"], json!(10));
	assert_eq!(params["bootstrap"], json!(true));
	match Algorithm::RandomForest.parse_params(&params).unwrap() {
		AlgorithmParams::RandomForest(params) => {
			assert_eq!(params.max_features, MaxFeaturesParam::Count(2))
		}
		_ => panic!("expected random forest params"),
	}
	let unknown = Algorithm::Knn.merge_params(&maplit::btreemap! {
		"n_trees".to_owned() => json!(10),
	});
	assert!(matches!(unknown, Err(Error::InvalidParams { .. })));
	let ill_typed = Algorithm::Svm.merge_params(&maplit::btreemap! {
		"kernel".to_owned() => json!("cubic"),
	});
	assert!(matches!(ill_typed, Err(Error::InvalidParams { .. })));
	let zero_degree = Algorithm::Svm.merge_params(&maplit::btreemap! {
		"kernel".to_owned() => json!("poly"),
		"degree".to_owned() => json!(0),
	});
	assert!(matches!(zero_degree, Err(Error::InvalidParams { .. })));
	let out_of_range = Algorithm::Xgboost.merge_params(&maplit::btreemap! {
		"subsample".to_owned() => json!(1.5),
	});
	assert!(matches!(out_of_range, Err(Error::InvalidParams { .. })));
	let gamma = Algorithm::Svm
		.merge_params(&maplit::btreemap! { "gamma".to_owned() => json!(0.5) })
		.unwrap();
	assert_eq!(gamma["gamma"], json!(0.5));
}
