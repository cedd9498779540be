use chrono::{DateTime, Utc};

/// A normalized weather reading for one coordinate, as consumed by
/// `AlertEngine`. Missing upstream fields are normalized to 0 before this
/// type is constructed.
#[derive(Debug, Clone, PartialEq)]
pub struct WeatherSnapshot {
    pub temperature: f64,
    pub temperature_max: f64,
    pub temperature_min: f64,
    pub precipitation: f64,
    pub wind_speed: f64,
    pub observed_at: DateTime<Utc>,
}
