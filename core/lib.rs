/*!
This crate is the workbench itself. It turns uploaded CSV files into datasets, trains classifiers on them in background jobs, evaluates each model on a held out split, saves every trained model as a versioned artifact, and serves predictions from saved models.

Start with [`Workbench`]. Everything else is reachable from it, and the modules are public for callers that want to drive the pipeline directly: [`preprocess`] cleans and encodes a table, [`train::train`] fits and evaluates one algorithm, and [`artifact::ArtifactStore`] saves and loads the result.
*/

#![allow(clippy::tabs_in_doc_comments)]

pub mod algorithm;
pub mod artifact;
pub mod config;
pub mod error;
pub mod estimator;
pub mod evaluate;
pub mod jobs;
pub mod predict;
pub mod preprocess;
pub mod split;
pub mod store;
pub mod train;
mod workbench;

pub use self::{
	algorithm::{Algorithm, Params},
	config::Config,
	error::{Error, ErrorKind, Result},
	workbench::{DatasetDetails, DatasetUpdate, ModelUpdate, TrainingRequest, Workbench},
};
pub use workbench_util::id::Id;
