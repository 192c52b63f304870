pub mod estimator;

pub use estimator::{FeeBudget, FeeEstimator, FeeSource};
