/*!
Small building blocks shared by every crate in the workbench. For now that is the random hex `Id` that keys datasets, models and jobs.
*/

pub mod id;
