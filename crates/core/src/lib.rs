pub mod config;
pub mod error;
pub mod metric;

pub use config::Config;
pub use error::{Result, VigilError};
pub use metric::{MetricPoint, SeriesKey};
