//! Upstream provider configuration

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Provider dialect
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ProviderType {
    Xtream,
    Agtv,
    #[serde(other)]
    Unknown,
}

/// HTTP method used to validate a candidate URL
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "UPPERCASE")]
pub enum ProbeMethod {
    Head,
    Get,
}

impl ProviderType {
    /// Ordering rank before scoring; lower sorts first
    pub fn rank(self) -> u32 {
        match self {
            Self::Xtream => 0,
            Self::Agtv => 1,
            Self::Unknown => 999,
        }
    }

    /// AGTV endpoints are checked with HEAD, everything else with a capped GET
    pub fn probe_method(self) -> ProbeMethod {
        match self {
            Self::Agtv => ProbeMethod::Head,
            Self::Xtream | Self::Unknown => ProbeMethod::Get,
        }
    }
}

/// Account state reported by the provider
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProviderDetails {
    #[serde(default)]
    pub max_connections: u32,
    #[serde(default)]
    pub active_connections: u32,
    #[serde(default)]
    pub active: bool,
    #[serde(default)]
    pub expiration_date: Option<DateTime<Utc>>,
}

impl ProviderDetails {
    /// `max - active`, negative when the account is oversubscribed
    pub fn free_connections(&self) -> i64 {
        i64::from(self.max_connections) - i64::from(self.active_connections)
    }

    /// `(max - active) / max`, zero when the provider reports no limit
    pub fn availability(&self) -> f64 {
        if self.max_connections == 0 {
            return 0.0;
        }
        self.free_connections() as f64 / f64::from(self.max_connections)
    }

    /// `active / max`, zero when the provider reports no limit
    pub fn utilization(&self) -> f64 {
        if self.max_connections == 0 {
            return 0.0;
        }
        f64::from(self.active_connections) / f64::from(self.max_connections)
    }
}

/// An upstream catalog and stream source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Provider {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type")]
    pub provider_type: ProviderType,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub deleted: bool,
    /// Lower ranks higher
    #[serde(default)]
    pub priority: i32,
    /// Base URLs that root-relative source paths are joined with, in order
    #[serde(default)]
    pub streams_urls: Vec<String>,
    /// API endpoint; falls back to the first stream base
    #[serde(default)]
    pub api_url: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub provider_details: ProviderDetails,
}

fn default_true() -> bool {
    true
}

impl Provider {
    pub fn new<S: Into<String>>(id: S, provider_type: ProviderType) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            provider_type,
            enabled: true,
            deleted: false,
            priority: 0,
            streams_urls: Vec::new(),
            api_url: None,
            username: None,
            password: None,
            provider_details: ProviderDetails::default(),
        }
    }

    /// Enabled and not soft-deleted
    pub fn is_usable(&self) -> bool {
        self.enabled && !self.deleted
    }

    pub fn api_base(&self) -> Option<&str> {
        self.api_url
            .as_deref()
            .or_else(|| self.streams_urls.first().map(String::as_str))
    }
}
