use std::collections::HashSet;
use std::sync::Arc;

use uuid::Uuid;

use crate::config::GardenConfig;
use crate::plants::PlantCache;
use crate::sensitivity::{SensitivityProfile, SensitivityRegistry};
use crate::weather::WeatherSource;

use super::models::{Alert, AlertType, Metric};

/// Evaluates one garden per tick: fetches weather, derives the garden's
/// distinct plant types from the cache, and checks the four threshold
/// rules. Never raises — any internal failure degrades to `vec![]`.
pub struct AlertEngine {
    weather: Arc<dyn WeatherSource>,
    plants: Arc<PlantCache>,
    sensitivity: Arc<SensitivityRegistry>,
}

impl AlertEngine {
    pub fn new(
        weather: Arc<dyn WeatherSource>,
        plants: Arc<PlantCache>,
        sensitivity: Arc<SensitivityRegistry>,
    ) -> Self {
        Self {
            weather,
            plants,
            sensitivity,
        }
    }

    pub async fn evaluate_garden(&self, garden: &GardenConfig) -> Vec<Alert> {
        let weather = match self.weather.fetch_weather(garden.latitude, garden.longitude).await {
            Some(w) => w,
            None => return vec![],
        };

        let plants = match self.plants.get(garden.user_id) {
            Some(p) if !p.is_empty() => p,
            _ => return vec![],
        };

        let types: HashSet<&str> = plants.iter().map(|p| p.type_.as_str()).collect();
        let profiles: Vec<&SensitivityProfile> =
            types.iter().map(|t| self.sensitivity.resolve(t)).collect();

        let mut alerts = Vec::with_capacity(4);

        if let Some(alert) = check_high_temperature(garden, &weather, &profiles, &plants) {
            alerts.push(alert);
        }
        if let Some(alert) = check_low_temperature(garden, &weather, &profiles, &plants) {
            alerts.push(alert);
        }
        if let Some(alert) = check_heavy_rain(garden, &weather, &profiles, &plants) {
            alerts.push(alert);
        }
        if let Some(alert) = check_strong_wind(garden, &weather, &profiles, &plants) {
            alerts.push(alert);
        }

        alerts
    }
}

fn new_alert_id() -> String {
    let millis = chrono::Utc::now().timestamp_millis();
    let uuid = Uuid::new_v4();
    format!("{}-{:x}", millis, uuid.as_u128() as u32)
}

fn affected_names(plants: &[crate::plants::Plant], types: &[String]) -> Vec<String> {
    plants
        .iter()
        .filter(|p| types.contains(&p.type_))
        .map(|p| p.name.clone())
        .collect()
}

fn check_high_temperature(
    garden: &GardenConfig,
    weather: &crate::weather::WeatherSnapshot,
    profiles: &[&SensitivityProfile],
    plants: &[crate::plants::Plant],
) -> Option<Alert> {
    let hit: Vec<&&SensitivityProfile> = profiles
        .iter()
        .filter(|p| weather.temperature > p.max_temperature)
        .collect();
    if hit.is_empty() {
        return None;
    }
    let threshold = hit
        .iter()
        .map(|p| p.max_temperature)
        .fold(f64::INFINITY, f64::min);
    let types: Vec<String> = hit.iter().map(|p| p.plant_type.clone()).collect();

    Some(build_alert(
        garden,
        AlertType::HighTemperature,
        Metric::Temperature,
        weather.temperature,
        threshold,
        types,
        plants,
    ))
}

fn check_low_temperature(
    garden: &GardenConfig,
    weather: &crate::weather::WeatherSnapshot,
    profiles: &[&SensitivityProfile],
    plants: &[crate::plants::Plant],
) -> Option<Alert> {
    let hit: Vec<&&SensitivityProfile> = profiles
        .iter()
        .filter(|p| weather.temperature < p.min_temperature)
        .collect();
    if hit.is_empty() {
        return None;
    }
    let threshold = hit
        .iter()
        .map(|p| p.min_temperature)
        .fold(f64::NEG_INFINITY, f64::max);
    let types: Vec<String> = hit.iter().map(|p| p.plant_type.clone()).collect();

    Some(build_alert(
        garden,
        AlertType::LowTemperature,
        Metric::Temperature,
        weather.temperature,
        threshold,
        types,
        plants,
    ))
}

fn check_heavy_rain(
    garden: &GardenConfig,
    weather: &crate::weather::WeatherSnapshot,
    profiles: &[&SensitivityProfile],
    plants: &[crate::plants::Plant],
) -> Option<Alert> {
    let hit: Vec<&&SensitivityProfile> = profiles
        .iter()
        .filter(|p| weather.precipitation > p.max_precipitation)
        .collect();
    if hit.is_empty() {
        return None;
    }
    let threshold = hit
        .iter()
        .map(|p| p.max_precipitation)
        .fold(f64::INFINITY, f64::min);
    let types: Vec<String> = hit.iter().map(|p| p.plant_type.clone()).collect();

    Some(build_alert(
        garden,
        AlertType::HeavyRain,
        Metric::Precipitation,
        weather.precipitation,
        threshold,
        types,
        plants,
    ))
}

fn check_strong_wind(
    garden: &GardenConfig,
    weather: &crate::weather::WeatherSnapshot,
    profiles: &[&SensitivityProfile],
    plants: &[crate::plants::Plant],
) -> Option<Alert> {
    let hit: Vec<&&SensitivityProfile> = profiles
        .iter()
        .filter(|p| weather.wind_speed > p.max_wind_speed)
        .collect();
    if hit.is_empty() {
        return None;
    }
    let threshold = hit
        .iter()
        .map(|p| p.max_wind_speed)
        .fold(f64::INFINITY, f64::min);
    let types: Vec<String> = hit.iter().map(|p| p.plant_type.clone()).collect();

    Some(build_alert(
        garden,
        AlertType::StrongWind,
        Metric::WindSpeed,
        weather.wind_speed,
        threshold,
        types,
        plants,
    ))
}

#[allow(clippy::too_many_arguments)]
fn build_alert(
    garden: &GardenConfig,
    alert_type: AlertType,
    metric: Metric,
    current_value: f64,
    threshold: f64,
    affected_plant_types: Vec<String>,
    plants: &[crate::plants::Plant],
) -> Alert {
    Alert {
        alert_id: new_alert_id(),
        garden_id: garden.garden_id.clone(),
        user_id: garden.user_id,
        garden_name: garden.name.clone(),
        timestamp: chrono::Utc::now(),
        alert_type,
        metric,
        current_value,
        threshold,
        affected_plant_names: affected_names(plants, &affected_plant_types),
        affected_plant_types,
    }
}
