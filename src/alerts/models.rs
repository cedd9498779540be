use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertType {
    HighTemperature,
    LowTemperature,
    HeavyRain,
    StrongWind,
}

impl AlertType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertType::HighTemperature => "HIGH_TEMPERATURE",
            AlertType::LowTemperature => "LOW_TEMPERATURE",
            AlertType::HeavyRain => "HEAVY_RAIN",
            AlertType::StrongWind => "STRONG_WIND",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            AlertType::HighTemperature => "High Temperature",
            AlertType::LowTemperature => "Low Temperature",
            AlertType::HeavyRain => "Heavy Rain",
            AlertType::StrongWind => "Strong Wind",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub enum Metric {
    Temperature,
    Precipitation,
    WindSpeed,
}

impl Metric {
    pub fn unit(&self) -> &'static str {
        match self {
            Metric::Temperature => "\u{00b0}C",
            Metric::Precipitation => "mm/h",
            Metric::WindSpeed => "km/h",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Metric::Temperature => "Temperature",
            Metric::Precipitation => "Precipitation",
            Metric::WindSpeed => "Wind speed",
        }
    }
}

/// An emitted alert. Created by `AlertEngine`, consumed by each sink, and
/// never mutated after construction.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    pub alert_id: String,
    pub garden_id: String,
    pub user_id: i64,
    pub garden_name: String,
    pub timestamp: DateTime<Utc>,
    pub alert_type: AlertType,
    pub metric: Metric,
    pub current_value: f64,
    pub threshold: f64,
    pub affected_plant_types: Vec<String>,
    pub affected_plant_names: Vec<String>,
}
