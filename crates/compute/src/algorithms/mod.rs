pub mod isolation_forest;
pub mod regression_forest;
pub mod scaler;
pub mod split;

pub use isolation_forest::{IsolationForest, IsolationParams};
pub use regression_forest::{ForestParams, RegressionForest};
pub use scaler::StandardScaler;
pub use split::train_test_split;
