/// Per-plant-type climatic tolerance. Invariant enforced at load time:
/// `min_temperature < max_temperature`.
#[derive(Debug, Clone, PartialEq)]
pub struct SensitivityProfile {
    pub plant_type: String,
    pub max_temperature: f64,
    pub min_temperature: f64,
    pub max_precipitation: f64,
    pub max_wind_speed: f64,
}

impl From<&crate::config::ProfileConfig> for SensitivityProfile {
    fn from(config: &crate::config::ProfileConfig) -> Self {
        Self {
            plant_type: config.plant_type.clone(),
            max_temperature: config.max_temperature,
            min_temperature: config.min_temperature,
            max_precipitation: config.max_precipitation,
            max_wind_speed: config.max_wind_speed,
        }
    }
}
