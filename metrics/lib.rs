/*!
This crate defines the [`Metric`](trait.Metric.html) and [`StreamingMetric`](trait.StreamingMetric.html) traits and a number of concrete types that implement them, such as [`Accuracy`](struct.Accuracy.html) and [`ClassificationMetrics`](struct.ClassificationMetrics.html). It also provides the curve computations used to evaluate probabilistic classifiers: the ROC curve with its AUC and the precision/recall curve with average precision.
*/

#![allow(clippy::tabs_in_doc_comments)]

mod accuracy;
mod auc_roc;
mod classification;
mod cross_entropy;
mod mean;
mod mean_variance;
mod median;
mod mode;
mod precision_recall;

pub use self::accuracy::Accuracy;
pub use self::auc_roc::{auc, compute_roc_curve, RocCurvePoint};
pub use self::classification::{ClassMetrics, ClassificationMetrics, ClassificationMetricsOutput};
pub use self::cross_entropy::{CrossEntropy, CrossEntropyInput};
pub use self::mean::Mean;
pub use self::mean_variance::{MeanVariance, MeanVarianceOutput};
pub use self::median::Median;
pub use self::mode::Mode;
pub use self::precision_recall::{
	average_precision, compute_precision_recall_curve, PrecisionRecallPoint,
};

/**
The `Metric` trait defines a common interface to metrics that can be computed when the entire input is available at once.

The seemingly unused generic lifetime `'a` exists here to allow `Input`s and `Output`s to borrow from their enclosing scope.
*/
pub trait Metric<'a> {
	type Input;
	type Output;
	fn compute(input: Self::Input) -> Self::Output;
}

/**
The `StreamingMetric` trait defines a common interface to metrics that can be computed in a streaming manner, where the input is available in chunks, such as accuracy and cross entropy.

After being initialized, a value of type `T` implementing the `StreamingMetric` trait can have `update()` called on it with values of the associated type `Input`. Multiple values of `T` can be merged together by calling `merge()`. This is useful when computing a metric across multiple threads. When finished aggregating, you can call `finalize()` on the metric to produce the associated type `Output`.

# Examples

Here is a basic example implementation of a `Min` metric, which takes `f32`s as input and produces an `f32` as output that is the minimum of all the inputs.

```
use workbench_metrics::StreamingMetric;

struct Min(f32);

impl StreamingMetric<'_> for Min {
	type Input = f32;
	type Output = f32;
	fn update(&mut self, input: Self::Input) {
		self.0 = self.0.min(input)
	}
	fn merge(&mut self, other: Self) { self.0 = self.0.min(other.0) }
	fn finalize(self) -> Self::Output { self.0 }
}
```
*/
pub trait StreamingMetric<'a> {
	/// `Input` is the type to aggregate in calls to `update()`.
	type Input;
	/// `Output` is the return type of `finalize()`.
	type Output;
	/// Update this streaming metric with the `Input` `input`.
	fn update(&mut self, input: Self::Input);
	/// Merge multiple independently computed streaming metrics.
	fn merge(&mut self, other: Self);
	/// When you are done aggregating `Input`s, call `finalize()` to produce an `Output`.
	fn finalize(self) -> Self::Output;
}
