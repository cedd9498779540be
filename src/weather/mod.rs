pub mod client;
pub mod models;

pub use client::{WeatherClient, WeatherSource};
pub use models::WeatherSnapshot;
