//! Process-wide configuration read from the environment (and `.env`).

use std::time::Duration;

use thiserror::Error;

use crate::api::client::NetworkFailurePolicy;
use crate::location::{CheckInSite, Coordinates};

pub const DEFAULT_API_URL: &str = "http://localhost:3000";
pub const DEFAULT_WAITING_TIME: Duration = Duration::from_secs(10);
pub const DEFAULT_KEYCHAIN_SERVICE: &str = "kr.practiceroom.client";
pub const DEFAULT_CHECKIN_RADIUS_METERS: f64 = 50.0;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("{var} has invalid value {value:?}: {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: &'static str,
    },
    #[error("CHECKIN_LATITUDE and CHECKIN_LONGITUDE must be set together")]
    PartialCheckInSite,
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL every endpoint is appended to.
    pub api_url: String,
    /// Budget for each HTTP call (initial, refresh, and retry).
    pub waiting_time: Duration,
    pub network_failure_policy: NetworkFailurePolicy,
    /// Keychain service the token entries are stored under.
    pub keychain_service: String,
    /// Where check-in is accepted. Location verification is unavailable without it.
    pub checkin_site: Option<CheckInSite>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            waiting_time: DEFAULT_WAITING_TIME,
            network_failure_policy: NetworkFailurePolicy::default(),
            keychain_service: DEFAULT_KEYCHAIN_SERVICE.to_string(),
            checkin_site: None,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Build a config from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Config::default();

        if let Some(url) = lookup("API_URL").filter(|v| !v.is_empty()) {
            config.api_url = url.trim_end_matches('/').to_string();
        }

        if let Some(raw) = lookup("WAITING_TIME_MS") {
            let millis = parse_positive::<u64>("WAITING_TIME_MS", &raw)?;
            config.waiting_time = Duration::from_millis(millis);
        }

        if let Some(raw) = lookup("SIGN_OUT_ON_NETWORK_ERROR") {
            config.network_failure_policy = if parse_bool("SIGN_OUT_ON_NETWORK_ERROR", &raw)? {
                NetworkFailurePolicy::SignOut
            } else {
                NetworkFailurePolicy::Report
            };
        }

        if let Some(service) = lookup("KEYCHAIN_SERVICE").filter(|v| !v.is_empty()) {
            config.keychain_service = service;
        }

        let latitude = lookup("CHECKIN_LATITUDE");
        let longitude = lookup("CHECKIN_LONGITUDE");
        config.checkin_site = match (latitude, longitude) {
            (Some(lat), Some(lon)) => {
                let radius = match lookup("CHECKIN_RADIUS_METERS") {
                    Some(raw) => parse_positive::<f64>("CHECKIN_RADIUS_METERS", &raw)?,
                    None => DEFAULT_CHECKIN_RADIUS_METERS,
                };
                Some(CheckInSite {
                    center: Coordinates {
                        latitude: parse_coordinate("CHECKIN_LATITUDE", &lat, 90.0)?,
                        longitude: parse_coordinate("CHECKIN_LONGITUDE", &lon, 180.0)?,
                    },
                    radius_meters: radius,
                })
            }
            (None, None) => None,
            _ => return Err(ConfigError::PartialCheckInSite),
        };

        Ok(config)
    }
}

fn parse_positive<T>(var: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr + PartialOrd + Default,
{
    let invalid = |reason| ConfigError::Invalid {
        var,
        value: raw.to_string(),
        reason,
    };
    let value: T = raw.trim().parse().map_err(|_| invalid("not a number"))?;
    if value.partial_cmp(&T::default()) != Some(std::cmp::Ordering::Greater) {
        return Err(invalid("must be greater than zero"));
    }
    Ok(value)
}

fn parse_bool(var: &'static str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" => Ok(true),
        "0" | "false" | "no" => Ok(false),
        _ => Err(ConfigError::Invalid {
            var,
            value: raw.to_string(),
            reason: "expected true or false",
        }),
    }
}

fn parse_coordinate(var: &'static str, raw: &str, bound: f64) -> Result<f64, ConfigError> {
    let invalid = |reason| ConfigError::Invalid {
        var,
        value: raw.to_string(),
        reason,
    };
    let value: f64 = raw.trim().parse().map_err(|_| invalid("not a number"))?;
    if !value.is_finite() || value.abs() > bound {
        return Err(invalid("out of range"));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_nothing_set() {
        let config = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.api_url, DEFAULT_API_URL);
        assert_eq!(config.waiting_time, DEFAULT_WAITING_TIME);
        assert_eq!(config.network_failure_policy, NetworkFailurePolicy::Report);
        assert_eq!(config.keychain_service, DEFAULT_KEYCHAIN_SERVICE);
        assert!(config.checkin_site.is_none());
    }

    #[test]
    fn test_overrides() {
        let config = Config::from_lookup(lookup(&[
            ("API_URL", "https://rooms.example.ac.kr/api/"),
            ("WAITING_TIME_MS", "2500"),
            ("SIGN_OUT_ON_NETWORK_ERROR", "true"),
            ("CHECKIN_LATITUDE", "35.1336"),
            ("CHECKIN_LONGITUDE", "129.1030"),
            ("CHECKIN_RADIUS_METERS", "80"),
        ]))
        .unwrap();
        assert_eq!(config.api_url, "https://rooms.example.ac.kr/api");
        assert_eq!(config.waiting_time, Duration::from_millis(2500));
        assert_eq!(config.network_failure_policy, NetworkFailurePolicy::SignOut);
        let site = config.checkin_site.unwrap();
        assert_eq!(site.radius_meters, 80.0);
        assert_eq!(site.center.latitude, 35.1336);
    }

    #[test]
    fn test_site_gets_default_radius() {
        let config = Config::from_lookup(lookup(&[
            ("CHECKIN_LATITUDE", "35.0"),
            ("CHECKIN_LONGITUDE", "129.0"),
        ]))
        .unwrap();
        assert_eq!(
            config.checkin_site.unwrap().radius_meters,
            DEFAULT_CHECKIN_RADIUS_METERS
        );
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        assert!(matches!(
            Config::from_lookup(lookup(&[("WAITING_TIME_MS", "0")])),
            Err(ConfigError::Invalid { var: "WAITING_TIME_MS", .. })
        ));
        assert!(matches!(
            Config::from_lookup(lookup(&[("WAITING_TIME_MS", "soon")])),
            Err(ConfigError::Invalid { var: "WAITING_TIME_MS", .. })
        ));
        assert!(matches!(
            Config::from_lookup(lookup(&[("SIGN_OUT_ON_NETWORK_ERROR", "maybe")])),
            Err(ConfigError::Invalid { .. })
        ));
        assert!(matches!(
            Config::from_lookup(lookup(&[
                ("CHECKIN_LATITUDE", "95"),
                ("CHECKIN_LONGITUDE", "129"),
            ])),
            Err(ConfigError::Invalid { var: "CHECKIN_LATITUDE", .. })
        ));
    }

    #[test]
    fn test_partial_site_is_an_error() {
        assert_eq!(
            Config::from_lookup(lookup(&[("CHECKIN_LATITUDE", "35.0")])).unwrap_err(),
            ConfigError::PartialCheckInSite
        );
    }
}
