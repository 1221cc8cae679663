use anyhow::{bail, Context, Result};
use dotenvy::dotenv;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub callsign: String,
    pub ssid: u8,
    /// Poll interval as a humantime duration string, e.g. "10m" or "90s".
    pub interval: String,
    pub lat: f64,
    pub lon: f64,
    pub comment: String,
    pub influxdb: InfluxConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InfluxConfig {
    pub url: String,
    pub token: Option<String>,
    pub org: Option<String>,
    pub db: String,
    pub rp: String,
    pub measurement: String,
    pub station: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            callsign: String::new(),
            ssid: 13,
            interval: "10m".to_string(),
            lat: 0.0,
            lon: 0.0,
            comment: "wx-beacon".to_string(),
            influxdb: InfluxConfig::default(),
        }
    }
}

impl Default for InfluxConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8086".to_string(),
            token: None,
            org: None,
            db: "rtl_433_wx".to_string(),
            rp: "autogen".to_string(),
            measurement: "Fineoffset-WH24".to_string(),
            station: "10".to_string(),
        }
    }
}

impl Config {
    pub fn load(path: Option<&Path>) -> Result<Self> {
        dotenv().ok();

        let path: Option<PathBuf> = path
            .map(Path::to_path_buf)
            .or_else(|| env_optional("BEACON_CONFIG").map(PathBuf::from));

        let mut config = match path {
            Some(path) => {
                let contents = fs::read_to_string(&path)
                    .with_context(|| format!("failed to read config file {}", path.display()))?;
                serde_yaml::from_str(&contents)
                    .with_context(|| format!("failed to parse config file {}", path.display()))?
            }
            None => Self::default(),
        };

        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Some(value) = env_optional("BEACON_CALLSIGN") {
            self.callsign = value;
        }
        if let Some(value) = env_optional("BEACON_SSID") {
            self.ssid = value.parse().context("invalid BEACON_SSID")?;
        }
        if let Some(value) = env_optional("BEACON_INTERVAL") {
            self.interval = value;
        }
        if let Some(value) = env_optional("BEACON_LAT") {
            self.lat = value.parse().context("invalid BEACON_LAT")?;
        }
        if let Some(value) = env_optional("BEACON_LON") {
            self.lon = value.parse().context("invalid BEACON_LON")?;
        }
        if let Some(value) = env_optional("BEACON_COMMENT") {
            self.comment = value;
        }
        if let Some(value) = env_optional("BEACON_INFLUX_URL") {
            self.influxdb.url = value;
        }
        if let Some(value) = env_optional("BEACON_INFLUX_TOKEN") {
            self.influxdb.token = Some(value);
        }
        if let Some(value) = env_optional("BEACON_INFLUX_ORG") {
            self.influxdb.org = Some(value);
        }
        if let Some(value) = env_optional("BEACON_INFLUX_DB") {
            self.influxdb.db = value;
        }
        if let Some(value) = env_optional("BEACON_INFLUX_RP") {
            self.influxdb.rp = value;
        }
        if let Some(value) = env_optional("BEACON_INFLUX_MEASUREMENT") {
            self.influxdb.measurement = value;
        }
        if let Some(value) = env_optional("BEACON_INFLUX_STATION") {
            self.influxdb.station = value;
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.callsign.trim().is_empty() {
            bail!("callsign is required (set it in the config file or via BEACON_CALLSIGN)");
        }
        self.poll_interval()?;
        Ok(())
    }

    pub fn poll_interval(&self) -> Result<Duration> {
        humantime::parse_duration(self.interval.trim())
            .with_context(|| format!("invalid interval {:?}", self.interval))
    }
}

fn env_optional(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn defaults_match_expected_station_setup() {
        let config = Config::default();
        assert_eq!(config.ssid, 13);
        assert_eq!(config.interval, "10m");
        assert_eq!(config.influxdb.url, "http://localhost:8086");
        assert_eq!(config.influxdb.db, "rtl_433_wx");
        assert_eq!(config.influxdb.rp, "autogen");
        assert_eq!(config.influxdb.measurement, "Fineoffset-WH24");
        assert_eq!(config.influxdb.station, "10");
        assert_eq!(config.poll_interval().unwrap(), Duration::from_secs(600));
    }

    #[test]
    fn partial_yaml_keeps_defaults_for_missing_keys() {
        let config: Config = serde_yaml::from_str(
            r#"
callsign: N0CALL
lat: 40.125
lon: -105.5
influxdb:
  db: weather
"#,
        )
        .unwrap();
        assert_eq!(config.callsign, "N0CALL");
        assert_eq!(config.ssid, 13);
        assert_eq!(config.lat, 40.125);
        assert_eq!(config.lon, -105.5);
        assert_eq!(config.influxdb.db, "weather");
        assert_eq!(config.influxdb.rp, "autogen");
    }

    #[test]
    fn env_overrides_take_precedence() {
        // The only test that touches BEACON_* vars, to keep the suite
        // safe under parallel execution.
        env::set_var("BEACON_CALLSIGN", "W1AW");
        env::set_var("BEACON_SSID", "9");
        env::set_var("BEACON_INFLUX_STATION", "42");
        let mut config = Config::default();
        config.apply_env_overrides().unwrap();
        env::remove_var("BEACON_CALLSIGN");
        env::remove_var("BEACON_SSID");
        env::remove_var("BEACON_INFLUX_STATION");

        assert_eq!(config.callsign, "W1AW");
        assert_eq!(config.ssid, 9);
        assert_eq!(config.influxdb.station, "42");
    }

    #[test]
    fn missing_callsign_is_fatal() {
        let config = Config::default();
        assert!(config.validate().is_err());
    }

    #[test]
    fn bad_interval_is_fatal() {
        let config = Config {
            callsign: "N0CALL".to_string(),
            interval: "tenminutes".to_string(),
            ..Config::default()
        };
        assert!(config.validate().is_err());
        assert!(config.poll_interval().is_err());
    }
}
