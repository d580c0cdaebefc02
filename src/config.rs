//! Provider configuration: the JSON config file, credentials, and the
//! transport mode requested from every provider.

use std::env;
use std::fmt;

use anyhow::{Context, Result, bail};
use clap::ValueEnum;
use serde::Deserialize;

use crate::collect::{OSRM_API, TRAVELTIME_API};

/// API credentials for one provider. Only TravelTime uses the secondary
/// application id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub api_key: String,
    pub app_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Provider {
    pub name: String,
    pub max_rpm: u32,
    pub credentials: Credentials,
}

/// The baseline provider plus every enabled competitor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Providers {
    pub base: Provider,
    pub competitors: Vec<Provider>,
}

impl Providers {
    pub fn all_names(&self) -> Vec<String> {
        let mut names = vec![self.base.name.clone()];
        names.extend(self.competitors.iter().map(|c| c.name.clone()));
        names
    }
}

/// Transport mode requested from every provider in a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Mode {
    Driving,
    PublicTransport,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Driving => write!(f, "driving"),
            Mode::PublicTransport => write!(f, "public_transport"),
        }
    }
}

/// `max-rpm` appears both quoted and unquoted in config files in the wild.
#[derive(Deserialize)]
#[serde(untagged)]
enum MaxRpm {
    Number(u32),
    Text(String),
}

impl MaxRpm {
    fn into_rpm(self) -> Result<u32> {
        let value = match self {
            MaxRpm::Number(value) => value,
            MaxRpm::Text(text) => text
                .parse()
                .with_context(|| format!("Invalid max-rpm value: `{text}`"))?,
        };
        if value == 0 {
            bail!("max-rpm must be a positive number");
        }
        Ok(value)
    }
}

#[derive(Deserialize)]
struct RawConfig {
    traveltime: RawTravelTime,
    #[serde(rename = "api-providers", default)]
    api_providers: Vec<RawCompetitor>,
}

#[derive(Deserialize)]
struct RawTravelTime {
    #[serde(rename = "app-id")]
    app_id: Option<String>,
    #[serde(rename = "api-key")]
    api_key: Option<String>,
    #[serde(rename = "max-rpm")]
    max_rpm: MaxRpm,
}

#[derive(Deserialize)]
struct RawCompetitor {
    name: String,
    enabled: bool,
    #[serde(rename = "api-key")]
    api_key: Option<String>,
    #[serde(rename = "max-rpm")]
    max_rpm: MaxRpm,
}

/// Parses the JSON provider config.
///
/// Disabled competitors are dropped. A config with no enabled competitor is
/// rejected: comparing the baseline against nothing is a setup mistake.
pub fn parse_json_to_providers(json_data: &str) -> Result<Providers> {
    let raw: RawConfig =
        serde_json::from_str(json_data).context("Malformed provider config file")?;

    let base = Provider {
        name: TRAVELTIME_API.to_string(),
        max_rpm: raw.traveltime.max_rpm.into_rpm()?,
        credentials: Credentials {
            api_key: resolve_key(raw.traveltime.api_key, TRAVELTIME_API)?,
            app_id: Some(resolve_app_id(raw.traveltime.app_id)?),
        },
    };

    let mut competitors = Vec::new();
    for competitor in raw.api_providers {
        if !competitor.enabled {
            continue;
        }
        competitors.push(Provider {
            max_rpm: competitor.max_rpm.into_rpm()?,
            credentials: Credentials {
                api_key: resolve_key(competitor.api_key, &competitor.name)?,
                app_id: None,
            },
            name: competitor.name,
        });
    }

    if competitors.is_empty() {
        bail!("There should be at least one enabled API provider that's not TravelTime.");
    }

    Ok(Providers { base, competitors })
}

/// Loads and parses the provider config file at `path`.
pub fn parse_config(path: &str) -> Result<Providers> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {path}"))?;
    parse_json_to_providers(&content)
}

/// A key from the config file wins; otherwise `{NAME}_API_KEY` from the
/// environment. OSRM's public router needs no key at all.
fn resolve_key(configured: Option<String>, provider: &str) -> Result<String> {
    if let Some(key) = configured.filter(|k| !k.is_empty()) {
        return Ok(key);
    }
    if provider == TRAVELTIME_API {
        return env::var("TRAVELTIME_API_KEY")
            .context("Missing TravelTime API key: set `api-key` or TRAVELTIME_API_KEY");
    }
    let var_name = format!("{}_API_KEY", provider.to_uppercase());
    match env::var(&var_name) {
        Ok(key) => Ok(key),
        Err(_) if provider == OSRM_API => Ok(String::new()),
        Err(_) => bail!("Missing API key for {provider}: set `api-key` or {var_name}"),
    }
}

fn resolve_app_id(configured: Option<String>) -> Result<String> {
    if let Some(app_id) = configured.filter(|id| !id.is_empty()) {
        return Ok(app_id);
    }
    env::var("TRAVELTIME_APP_ID")
        .context("Missing TravelTime application id: set `app-id` or TRAVELTIME_APP_ID")
}
