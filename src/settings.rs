use config::{Config, ConfigError};

pub const API_URL: &str = "https://espace-client.urbansolar.energy";
const ENV_PREFIX: &str = "USE";

#[derive(Clone, serde::Deserialize)]
pub struct Settings {
    pub api_url: String,
    pub username: String,
    pub password: String,
    /// Seconds between two refreshes
    pub interval: u64,
    /// Seconds a refresh may take
    pub timeout: u64,
    pub device_id: Option<String>,
}

impl Settings {
    /// Identifier of the device the sensors are grouped under, the username unless set.
    pub fn device_id(&self) -> &str {
        self.device_id.as_deref().unwrap_or(&self.username)
    }
}

/// Read `USE_*` environment variables.
pub fn read_settings() -> Result<Settings, ConfigError> {
    let mut settings = Config::default();
    settings.merge(config::Environment::with_prefix(ENV_PREFIX))?;
    build(settings)
}

fn build(mut settings: Config) -> Result<Settings, ConfigError> {
    settings
        .set_default("api_url", API_URL)?
        .set_default("interval", 3600_i64)?
        .set_default("timeout", 10_i64)?;

    let settings: Settings = settings.try_into()?;

    if settings.interval == 0 {
        return Err(ConfigError::Message("interval must be positive".to_string()));
    }
    if settings.timeout == 0 {
        return Err(ConfigError::Message("timeout must be positive".to_string()));
    }
    Ok(settings)
}

#[cfg(test)]
mod test {
    use super::*;

    fn config(pairs: &[(&str, &str)]) -> Config {
        let mut config = Config::default();
        for (key, value) in pairs {
            config.set(key, *value).unwrap();
        }
        config
    }

    #[test]
    fn defaults() {
        let settings = build(config(&[("username", "jean"), ("password", "secret")])).unwrap();
        assert_eq!(API_URL, settings.api_url);
        assert_eq!(3600, settings.interval);
        assert_eq!(10, settings.timeout);
        assert_eq!("jean", settings.device_id());
    }

    #[test]
    fn overrides() {
        let settings = build(config(&[
            ("username", "jean"),
            ("password", "secret"),
            ("api_url", "http://localhost:8000"),
            ("interval", "60"),
            ("timeout", "5"),
            ("device_id", "maison"),
        ]))
        .unwrap();
        assert_eq!("http://localhost:8000", settings.api_url);
        assert_eq!(60, settings.interval);
        assert_eq!(5, settings.timeout);
        assert_eq!("maison", settings.device_id());
    }

    #[test]
    fn password_is_required() {
        assert!(build(config(&[("username", "jean")])).is_err());
    }

    #[test]
    fn zero_interval_is_rejected() {
        let result = build(config(&[
            ("username", "jean"),
            ("password", "secret"),
            ("interval", "0"),
        ]));
        assert!(result.is_err());
    }
}
