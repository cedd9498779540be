use config::{Case, Config, ConfigError, Environment};
use serde::Deserialize;
use std::fs;
use std::path::Path;

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    /// Operational HTTP surface port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Base URL of the plants/users backend
    #[serde(default = "default_backend_url")]
    pub backend_url: String,

    /// MongoDB connection string for the alert history store
    #[serde(default)]
    pub mongo_url: Option<String>,

    /// Twilio credentials; absence of any one disables SMS, not fatal
    #[serde(default)]
    pub twilio_account_sid: Option<String>,
    #[serde(default)]
    pub twilio_auth_token: Option<String>,
    #[serde(default)]
    pub twilio_phone_number: Option<String>,

    /// Path to the gardens configuration file
    #[serde(default = "default_gardens_config_path")]
    pub gardens_config_path: String,

    /// Path to the plant sensitivity profiles file
    #[serde(default = "default_profiles_config_path")]
    pub profiles_config_path: String,
}

fn default_port() -> u16 {
    3000
}

fn default_backend_url() -> String {
    "http://localhost:4000".to_string()
}

fn default_gardens_config_path() -> String {
    "config/gardens.config.json".to_string()
}

fn default_profiles_config_path() -> String {
    "config/plant-sensitivity-profiles.json".to_string()
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        // Load .env file if present
        let _ = dotenvy::dotenv();

        let config = Config::builder()
            .set_default("port", default_port())?
            .set_default("backend_url", default_backend_url())?
            .set_default("gardens_config_path", default_gardens_config_path())?
            .set_default("profiles_config_path", default_profiles_config_path())?
            // Override with the environment variables named in the external
            // interface contract (PORT, BACKEND_URL, MONGO_URL, TWILIO_*) --
            // unprefixed, since operators and the Twilio/Mongo tooling around
            // this service expect those literal names.
            .add_source(
                Environment::default()
                    .separator("__")
                    .convert_case(Case::Snake)
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Returns `true` iff all three Twilio credentials are present and non-empty.
    pub fn twilio_configured(&self) -> bool {
        fn non_empty(value: &Option<String>) -> bool {
            value.as_deref().is_some_and(|s| !s.trim().is_empty())
        }

        non_empty(&self.twilio_account_sid)
            && non_empty(&self.twilio_auth_token)
            && non_empty(&self.twilio_phone_number)
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct GardenConfig {
    pub garden_id: String,
    pub user_id: i64,
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Deserialize)]
struct GardensFile {
    gardens: Vec<GardenConfig>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ProfileConfig {
    pub plant_type: String,
    pub max_temperature: f64,
    pub min_temperature: f64,
    pub max_precipitation: f64,
    pub max_wind_speed: f64,
}

#[derive(Debug, Deserialize)]
struct ProfilesFile {
    profiles: std::collections::HashMap<String, ProfileConfig>,
}

/// Load and validate `gardens.config.json`. Any structural or range violation
/// is fatal at startup.
pub fn load_gardens(path: impl AsRef<Path>) -> anyhow::Result<Vec<GardenConfig>> {
    let path = path.as_ref();
    let raw = fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("failed to read gardens config {}: {}", path.display(), e))?;
    let parsed: GardensFile = serde_json::from_str(&raw)
        .map_err(|e| anyhow::anyhow!("failed to parse gardens config {}: {}", path.display(), e))?;

    for garden in &parsed.gardens {
        if !(-90.0..=90.0).contains(&garden.latitude) {
            anyhow::bail!(
                "garden {} has out-of-range latitude {}",
                garden.garden_id,
                garden.latitude
            );
        }
        if !(-180.0..=180.0).contains(&garden.longitude) {
            anyhow::bail!(
                "garden {} has out-of-range longitude {}",
                garden.garden_id,
                garden.longitude
            );
        }
        if garden.garden_id.trim().is_empty() {
            anyhow::bail!("garden config contains an empty gardenId");
        }
    }

    Ok(parsed.gardens)
}

/// Load and validate `plant-sensitivity-profiles.json`. A missing `default`
/// profile or an inverted min/max temperature invariant is fatal.
pub fn load_profiles(
    path: impl AsRef<Path>,
) -> anyhow::Result<std::collections::HashMap<String, ProfileConfig>> {
    let path = path.as_ref();
    let raw = fs::read_to_string(path).map_err(|e| {
        anyhow::anyhow!("failed to read sensitivity profiles {}: {}", path.display(), e)
    })?;
    let parsed: ProfilesFile = serde_json::from_str(&raw).map_err(|e| {
        anyhow::anyhow!("failed to parse sensitivity profiles {}: {}", path.display(), e)
    })?;

    if !parsed.profiles.contains_key("default") {
        anyhow::bail!("sensitivity profiles file is missing the mandatory \"default\" profile");
    }

    for (key, profile) in &parsed.profiles {
        if profile.min_temperature >= profile.max_temperature {
            anyhow::bail!(
                "profile \"{}\" has minTemperature ({}) >= maxTemperature ({})",
                key,
                profile.min_temperature,
                profile.max_temperature
            );
        }
    }

    Ok(parsed.profiles)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    /// Writes `contents` to a uniquely-named file under the OS temp dir and
    /// returns its path; the file is left for the OS to reap (test-only).
    fn write_temp(contents: &str) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!(
            "gardensentry-test-{}-{:x}.json",
            std::process::id(),
            contents.len() as u64 * 2654435761
        ));
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        path
    }

    #[test]
    fn test_load_gardens_valid() {
        let path = write_temp(
            r#"{"gardens": [{"gardenId":"g1","userId":1,"name":"G1","latitude":40.0,"longitude":-3.0}]}"#,
        );
        let gardens = load_gardens(&path).unwrap();
        assert_eq!(gardens.len(), 1);
        assert_eq!(gardens[0].garden_id, "g1");
    }

    #[test]
    fn test_load_gardens_rejects_out_of_range_latitude() {
        let path = write_temp(
            r#"{"gardens": [{"gardenId":"g1","userId":1,"name":"G1","latitude":190.0,"longitude":-3.0}]}"#,
        );
        assert!(load_gardens(&path).is_err());
    }

    #[test]
    fn test_load_profiles_requires_default() {
        let path = write_temp(
            r#"{"profiles": {"tomato": {"plantType":"tomato","maxTemperature":35.0,"minTemperature":5.0,"maxPrecipitation":10.0,"maxWindSpeed":40.0}}}"#,
        );
        assert!(load_profiles(&path).is_err());
    }

    #[test]
    fn test_load_profiles_rejects_inverted_temperature_bounds() {
        let path = write_temp(
            r#"{"profiles": {"default": {"plantType":"default","maxTemperature":10.0,"minTemperature":20.0,"maxPrecipitation":10.0,"maxWindSpeed":40.0}}}"#,
        );
        assert!(load_profiles(&path).is_err());
    }

    #[test]
    fn test_load_profiles_valid() {
        let path = write_temp(
            r#"{"profiles": {"default": {"plantType":"default","maxTemperature":35.0,"minTemperature":5.0,"maxPrecipitation":10.0,"maxWindSpeed":40.0}}}"#,
        );
        let profiles = load_profiles(&path).unwrap();
        assert!(profiles.contains_key("default"));
    }

    #[test]
    fn test_twilio_configured_requires_all_three() {
        let mut cfg = base_config();
        assert!(!cfg.twilio_configured());
        cfg.twilio_account_sid = Some("AC123".to_string());
        cfg.twilio_auth_token = Some("token".to_string());
        cfg.twilio_phone_number = Some("+15550000".to_string());
        assert!(cfg.twilio_configured());
    }

    fn base_config() -> AppConfig {
        AppConfig {
            port: default_port(),
            backend_url: default_backend_url(),
            mongo_url: None,
            twilio_account_sid: None,
            twilio_auth_token: None,
            twilio_phone_number: None,
            gardens_config_path: default_gardens_config_path(),
            profiles_config_path: default_profiles_config_path(),
        }
    }
}
