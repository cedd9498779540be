pub mod cache;
pub mod client;
pub mod models;

pub use cache::PlantCache;
pub use client::{PlantsClient, PlantsError, PlantsSource};
pub use models::{Plant, User};
