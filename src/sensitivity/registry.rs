use std::collections::HashMap;

use crate::config::ProfileConfig;

use super::models::SensitivityProfile;

/// Mapping `plantType -> SensitivityProfile` with a mandatory `default`
/// fallback. Loaded once at startup; absence of `default` is caught by
/// `config::load_profiles` before this registry is ever constructed.
pub struct SensitivityRegistry {
    profiles: HashMap<String, SensitivityProfile>,
}

impl SensitivityRegistry {
    pub fn new(profiles: HashMap<String, ProfileConfig>) -> Self {
        let profiles = profiles
            .iter()
            .map(|(key, config)| (key.clone(), SensitivityProfile::from(config)))
            .collect();
        Self { profiles }
    }

    /// Returns the profile for `plant_type`, falling back to `"default"`
    /// when absent. Panics if `default` is missing — callers must construct
    /// this registry only from a map already validated by
    /// `config::load_profiles`.
    pub fn resolve(&self, plant_type: &str) -> &SensitivityProfile {
        self.profiles
            .get(plant_type)
            .unwrap_or_else(|| self.profiles.get("default").expect("default profile must exist"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(plant_type: &str, max_temp: f64) -> ProfileConfig {
        ProfileConfig {
            plant_type: plant_type.to_string(),
            max_temperature: max_temp,
            min_temperature: 0.0,
            max_precipitation: 10.0,
            max_wind_speed: 40.0,
        }
    }

    fn registry_with_default() -> SensitivityRegistry {
        let mut profiles = HashMap::new();
        profiles.insert("default".to_string(), profile("default", 30.0));
        profiles.insert("tomato".to_string(), profile("tomato", 35.0));
        SensitivityRegistry::new(profiles)
    }

    #[test]
    fn test_resolve_returns_exact_match() {
        let registry = registry_with_default();
        assert_eq!(registry.resolve("tomato").max_temperature, 35.0);
    }

    #[test]
    fn test_resolve_falls_back_to_default_for_unknown_type() {
        let registry = registry_with_default();
        let resolved = registry.resolve("cactus");
        assert_eq!(resolved, registry.resolve("default"));
    }
}
