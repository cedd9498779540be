pub mod engine;
pub mod models;

pub use engine::AlertEngine;
pub use models::{Alert, AlertType, Metric};
