use std::path::Path;
use std::time::Duration;

use hygro_core::{Credentials, DeviceProfile, Endpoint};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::fetcher::DEFAULT_API_BASE;
use crate::scheduler::ScheduleConfig;
use crate::sink::InfluxConfig;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("SwitchBot token and secret are required")]
    MissingCredentials,
    #[error("no device endpoints configured")]
    NoEndpoints,
    #[error("collector interval must be greater than zero")]
    ZeroInterval,
    #[error("influx sink is missing `{0}`")]
    IncompleteInflux(&'static str),
}

/// Variable names used by older `.env` files, keyed by their current name.
const LEGACY_ENV: [(&str, &str); 5] = [
    ("SWITCHBOT_TOKEN", "switchbottoken"),
    ("SWITCHBOT_SECRET", "switchbotsecret"),
    ("METER_PRO_URL", "MeterProurl"),
    ("WOIOSENSOR_URL", "WoIOSensor"),
    ("INFLUXDB_BUCKET", "INFLUXDB_Bucket"),
];

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub collector: CollectorConfig,
    pub switchbot: SwitchBotConfig,
    pub endpoints: Vec<Endpoint>,
    pub sink: SinkConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectorConfig {
    pub interval_secs: u64,
    pub deadline_secs: Option<u64>,
    pub request_timeout_secs: u64,
    pub write_timeout_secs: u64,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            interval_secs: 60,
            deadline_secs: None,
            request_timeout_secs: 10,
            write_timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SwitchBotConfig {
    pub token: String,
    pub secret: String,
    pub api_base: String,
}

impl Default for SwitchBotConfig {
    fn default() -> Self {
        Self {
            token: String::new(),
            secret: String::new(),
            api_base: DEFAULT_API_BASE.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SinkConfig {
    #[default]
    Log,
    Influx(InfluxConfig),
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    pub fn parse(contents: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(contents)?)
    }

    /// Apply overrides from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_env_from(|key| std::env::var(key).ok());
    }

    /// Apply overrides from `lookup`. Blank values count as unset.
    ///
    /// `METER_PRO_URL` and `WOIOSENSOR_URL` add an endpoint each; any
    /// `INFLUXDB_*` variable switches the sink to InfluxDB. The legacy
    /// `.env` names (`switchbottoken`, `MeterProurl`, `INFLUXDB_Bucket`, ...)
    /// are read when the canonical name is unset.
    pub fn apply_env_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            let legacy = LEGACY_ENV
                .iter()
                .find(|(canonical, _)| *canonical == key)
                .map(|(_, legacy)| *legacy);
            std::iter::once(key)
                .chain(legacy)
                .filter_map(|key| lookup(key))
                .map(|value| value.trim().to_string())
                .find(|value| !value.is_empty())
        };

        if let Some(token) = get("SWITCHBOT_TOKEN") {
            self.switchbot.token = token;
        }
        if let Some(secret) = get("SWITCHBOT_SECRET") {
            self.switchbot.secret = secret;
        }
        if let Some(api_base) = get("SWITCHBOT_API_BASE") {
            self.switchbot.api_base = api_base;
        }

        for (key, profile) in [
            ("METER_PRO_URL", DeviceProfile::MeterPro),
            ("WOIOSENSOR_URL", DeviceProfile::WoIOSensor),
        ] {
            if let Some(url) = get(key)
                && !self.endpoints.iter().any(|e| *e.url == *url)
            {
                self.endpoints.push(Endpoint::new(url, profile));
            }
        }

        let influx_keys = ["INFLUXDB_URL", "INFLUXDB_ORG", "INFLUXDB_BUCKET", "INFLUXDB_TOKEN"];
        if influx_keys.into_iter().any(|key| get(key).is_some()) {
            let mut influx = match &self.sink {
                SinkConfig::Influx(influx) => influx.clone(),
                SinkConfig::Log => InfluxConfig {
                    url: String::new(),
                    org: String::new(),
                    bucket: String::new(),
                    token: String::new(),
                },
            };
            if let Some(url) = get("INFLUXDB_URL") {
                influx.url = url;
            }
            if let Some(org) = get("INFLUXDB_ORG") {
                influx.org = org;
            }
            if let Some(bucket) = get("INFLUXDB_BUCKET") {
                influx.bucket = bucket;
            }
            if let Some(token) = get("INFLUXDB_TOKEN") {
                influx.token = token;
            }
            self.sink = SinkConfig::Influx(influx);
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.collector.interval_secs == 0 {
            return Err(ConfigError::ZeroInterval);
        }
        if !self.credentials().is_complete() {
            return Err(ConfigError::MissingCredentials);
        }
        if self.endpoints.is_empty() {
            return Err(ConfigError::NoEndpoints);
        }
        if let SinkConfig::Influx(influx) = &self.sink {
            for (name, value) in [
                ("url", &influx.url),
                ("org", &influx.org),
                ("bucket", &influx.bucket),
                ("token", &influx.token),
            ] {
                if value.is_empty() {
                    return Err(ConfigError::IncompleteInflux(name));
                }
            }
        }
        Ok(())
    }

    pub fn credentials(&self) -> Credentials {
        Credentials::new(self.switchbot.token.as_str(), self.switchbot.secret.as_str())
    }

    pub fn schedule(&self) -> ScheduleConfig {
        ScheduleConfig {
            interval: Duration::from_secs(self.collector.interval_secs),
            deadline: self.collector.deadline_secs.map(Duration::from_secs),
            write_timeout: Duration::from_secs(self.collector.write_timeout_secs),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.collector.request_timeout_secs)
    }
}
