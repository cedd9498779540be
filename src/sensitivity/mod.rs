pub mod models;
pub mod registry;

pub use models::SensitivityProfile;
pub use registry::SensitivityRegistry;
