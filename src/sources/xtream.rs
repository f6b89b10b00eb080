//! Xtream Codes provider client
//!
//! Talks to `player_api.php`. Stream paths are returned root-relative
//! (`/movie/{user}/{pass}/{id}.{ext}`) so the selector can join them with
//! every base in the provider's `streams_urls`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use url::Url;

use super::traits::ProviderClient;
use crate::errors::{ProviderError, ProviderResult};
use crate::models::{
    CatalogItem, EpisodeDetails, MediaType, Provider, ProviderDetails, ProviderType, TitleDetails,
};
use crate::utils::url::obfuscate_credentials;

const PROVIDER_TYPE: &str = "xtream";

/// Xtream Codes API client
pub struct XtreamClient {
    http: Client,
}

impl XtreamClient {
    pub fn new(request_timeout: Duration, user_agent: &str) -> ProviderResult<Self> {
        let http = Client::builder()
            .timeout(request_timeout)
            .connect_timeout(Duration::from_secs(10))
            .user_agent(user_agent)
            .build()?;
        Ok(Self { http })
    }

    pub fn with_client(http: Client) -> Self {
        Self { http }
    }

    fn credentials(provider: &Provider) -> ProviderResult<(&str, &str)> {
        let username = provider.username.as_deref().ok_or_else(|| ProviderError::InvalidConfig {
            field: "username".to_string(),
            message: format!("Xtream provider '{}' requires a username", provider.id),
        })?;
        let password = provider.password.as_deref().ok_or_else(|| ProviderError::InvalidConfig {
            field: "password".to_string(),
            message: format!("Xtream provider '{}' requires a password", provider.id),
        })?;
        Ok((username, password))
    }

    /// `{base}/player_api.php?username=..&password=..[&action=..]`
    fn api_url(provider: &Provider, action: Option<&str>, extra: &[(&str, &str)]) -> ProviderResult<Url> {
        let base = provider.api_base().ok_or_else(|| ProviderError::InvalidConfig {
            field: "api_url".to_string(),
            message: format!("Xtream provider '{}' has no API or stream URL", provider.id),
        })?;
        let (username, password) = Self::credentials(provider)?;

        let mut url = Url::parse(&format!("{}/player_api.php", base.trim_end_matches('/')))
            .map_err(|e| ProviderError::InvalidConfig {
                field: "api_url".to_string(),
                message: format!("invalid Xtream URL '{base}': {e}"),
            })?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("username", username);
            query.append_pair("password", password);
            if let Some(action) = action {
                query.append_pair("action", action);
            }
            for (key, value) in extra {
                query.append_pair(key, value);
            }
        }
        Ok(url)
    }

    async fn get_json<T: DeserializeOwned>(&self, token: &CancellationToken, url: Url) -> ProviderResult<T> {
        debug!("Xtream request: {}", obfuscate_credentials(url.as_str()));

        let request = async {
            let response = self.http.get(url.clone()).send().await.map_err(|e| {
                if e.is_timeout() {
                    ProviderError::Timeout {
                        url: obfuscate_credentials(url.as_str()),
                    }
                } else {
                    ProviderError::Transport(e)
                }
            })?;
            let status = response.status();
            if !status.is_success() {
                return Err(ProviderError::Http {
                    status: status.as_u16(),
                    message: status.canonical_reason().unwrap_or("unknown").to_string(),
                });
            }
            let bytes = response.bytes().await?;
            serde_json::from_slice::<T>(&bytes).map_err(|e| ProviderError::parse(PROVIDER_TYPE, e.to_string()))
        };

        tokio::select! {
            _ = token.cancelled() => Err(ProviderError::Cancelled),
            result = request => result,
        }
    }

    fn stream_path(kind: &str, provider: &Provider, id: &str, extension: &str) -> ProviderResult<String> {
        let (username, password) = Self::credentials(provider)?;
        Ok(format!("/{kind}/{username}/{password}/{id}.{extension}"))
    }
}

#[async_trait]
impl ProviderClient for XtreamClient {
    fn provider_type(&self) -> ProviderType {
        ProviderType::Xtream
    }

    async fn fetch_catalog(
        &self,
        token: &CancellationToken,
        provider: &Provider,
        media_type: MediaType,
    ) -> ProviderResult<Vec<CatalogItem>> {
        let items = match media_type {
            MediaType::Movies => {
                let url = Self::api_url(provider, Some("get_vod_streams"), &[])?;
                let streams: Vec<XtreamVodStream> = self.get_json(token, url).await?;
                streams
                    .into_iter()
                    .map(|s| {
                        let ext = s.container_extension.as_deref().unwrap_or("mp4");
                        Ok(CatalogItem {
                            provider_id: provider.id.clone(),
                            stream_url: Some(Self::stream_path("movie", provider, &s.stream_id, ext)?),
                            item_id: s.stream_id,
                            media_type,
                            name: s.name,
                            external_id: s.tmdb,
                            category: s.category_id,
                        })
                    })
                    .collect::<ProviderResult<Vec<_>>>()?
            }
            MediaType::Tvshows => {
                let url = Self::api_url(provider, Some("get_series"), &[])?;
                let series: Vec<XtreamSeries> = self.get_json(token, url).await?;
                series
                    .into_iter()
                    .map(|s| CatalogItem {
                        provider_id: provider.id.clone(),
                        item_id: s.series_id,
                        media_type,
                        name: s.name,
                        external_id: s.tmdb,
                        stream_url: None,
                        category: s.category_id,
                    })
                    .collect()
            }
            MediaType::Channels => {
                let url = Self::api_url(provider, Some("get_live_streams"), &[])?;
                let channels: Vec<XtreamLiveStream> = self.get_json(token, url).await?;
                channels
                    .into_iter()
                    .map(|c| {
                        Ok(CatalogItem {
                            provider_id: provider.id.clone(),
                            stream_url: Some(Self::stream_path("live", provider, &c.stream_id, "ts")?),
                            item_id: c.stream_id,
                            media_type,
                            name: c.name,
                            external_id: None,
                            category: c.category_id,
                        })
                    })
                    .collect::<ProviderResult<Vec<_>>>()?
            }
        };

        debug!(
            "Fetched {} {} items from provider {}",
            items.len(),
            media_type,
            provider.id
        );
        Ok(items)
    }

    async fn fetch_details(
        &self,
        token: &CancellationToken,
        provider: &Provider,
        media_type: MediaType,
        item_id: &str,
    ) -> ProviderResult<TitleDetails> {
        match media_type {
            MediaType::Movies => {
                let url = Self::api_url(provider, Some("get_vod_info"), &[("vod_id", item_id)])?;
                let info: XtreamVodInfo = self.get_json(token, url).await?;
                Ok(TitleDetails {
                    item_id: item_id.to_string(),
                    plot: info.info.and_then(|i| i.plot),
                    episodes: Vec::new(),
                })
            }
            MediaType::Tvshows => {
                let url = Self::api_url(provider, Some("get_series_info"), &[("series_id", item_id)])?;
                let info: XtreamSeriesInfo = self.get_json(token, url).await?;

                let mut episodes = Vec::new();
                for (season_key, entries) in info.episodes {
                    for entry in entries {
                        let season = entry
                            .season
                            .or_else(|| season_key.parse().ok())
                            .unwrap_or_default();
                        let ext = entry.container_extension.as_deref().unwrap_or("mp4");
                        episodes.push(EpisodeDetails {
                            season,
                            episode: entry.episode_num,
                            name: entry.title,
                            stream_url: Self::stream_path("series", provider, &entry.id, ext)?,
                        });
                    }
                }
                episodes.sort_by_key(|e| (e.season, e.episode));

                Ok(TitleDetails {
                    item_id: item_id.to_string(),
                    plot: info.info.and_then(|i| i.plot),
                    episodes,
                })
            }
            MediaType::Channels => Err(ProviderError::Unsupported {
                provider_type: format!("{PROVIDER_TYPE} channel details"),
            }),
        }
    }

    async fn authenticate(
        &self,
        token: &CancellationToken,
        provider: &Provider,
    ) -> ProviderResult<ProviderDetails> {
        let url = Self::api_url(provider, None, &[])?;
        let response: XtreamAuthResponse = self.get_json(token, url).await?;

        let user_info = response
            .user_info
            .ok_or_else(|| ProviderError::unavailable(&provider.id, "server did not return user information"))?;
        if user_info.auth == Some(0) {
            return Err(ProviderError::unavailable(&provider.id, "credentials rejected"));
        }
        let status = user_info.status.unwrap_or_default();
        if !status.eq_ignore_ascii_case("active") {
            return Err(ProviderError::unavailable(
                &provider.id,
                format!("account status is '{status}'"),
            ));
        }

        Ok(ProviderDetails {
            max_connections: user_info.max_connections.unwrap_or_default(),
            active_connections: user_info.active_cons.unwrap_or_default(),
            active: true,
            expiration_date: user_info
                .exp_date
                .and_then(|ts| DateTime::<Utc>::from_timestamp(ts, 0)),
        })
    }
}

#[derive(Debug, Deserialize)]
struct XtreamAuthResponse {
    user_info: Option<XtreamUserInfo>,
}

#[derive(Debug, Deserialize)]
struct XtreamUserInfo {
    #[serde(default, deserialize_with = "deserialize_string_or_int_option")]
    auth: Option<i64>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default, deserialize_with = "deserialize_string_or_int_option")]
    exp_date: Option<i64>,
    #[serde(default, deserialize_with = "deserialize_string_or_u32_option")]
    active_cons: Option<u32>,
    #[serde(default, deserialize_with = "deserialize_string_or_u32_option")]
    max_connections: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct XtreamVodStream {
    #[serde(deserialize_with = "deserialize_id")]
    stream_id: String,
    name: String,
    #[serde(default)]
    container_extension: Option<String>,
    #[serde(default, deserialize_with = "deserialize_id_option")]
    tmdb: Option<String>,
    #[serde(default, deserialize_with = "deserialize_id_option")]
    category_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct XtreamSeries {
    #[serde(deserialize_with = "deserialize_id")]
    series_id: String,
    name: String,
    #[serde(default, deserialize_with = "deserialize_id_option")]
    tmdb: Option<String>,
    #[serde(default, deserialize_with = "deserialize_id_option")]
    category_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct XtreamLiveStream {
    #[serde(deserialize_with = "deserialize_id")]
    stream_id: String,
    name: String,
    #[serde(default, deserialize_with = "deserialize_id_option")]
    category_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct XtreamInfo {
    #[serde(default)]
    plot: Option<String>,
}

#[derive(Debug, Deserialize)]
struct XtreamVodInfo {
    #[serde(default, deserialize_with = "deserialize_info")]
    info: Option<XtreamInfo>,
}

#[derive(Debug, Deserialize)]
struct XtreamSeriesInfo {
    #[serde(default, deserialize_with = "deserialize_info")]
    info: Option<XtreamInfo>,
    /// Keyed by season number
    #[serde(default, deserialize_with = "deserialize_episodes")]
    episodes: BTreeMap<String, Vec<XtreamEpisode>>,
}

#[derive(Debug, Deserialize)]
struct XtreamEpisode {
    #[serde(deserialize_with = "deserialize_id")]
    id: String,
    #[serde(deserialize_with = "deserialize_string_or_u32")]
    episode_num: u32,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    container_extension: Option<String>,
    #[serde(default, deserialize_with = "deserialize_string_or_u32_option")]
    season: Option<u32>,
}

// Some panels send `"info": []` instead of an object when there is nothing.
fn deserialize_info<'de, D>(deserializer: D) -> Result<Option<XtreamInfo>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    match value {
        serde_json::Value::Object(_) => serde_json::from_value(value).map(Some).map_err(serde::de::Error::custom),
        _ => Ok(None),
    }
}

// Likewise `"episodes": []` for shows without episodes.
fn deserialize_episodes<'de, D>(deserializer: D) -> Result<BTreeMap<String, Vec<XtreamEpisode>>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    match value {
        serde_json::Value::Object(_) => serde_json::from_value(value).map_err(serde::de::Error::custom),
        _ => Ok(BTreeMap::new()),
    }
}

fn deserialize_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    deserialize_id_option(deserializer)?
        .ok_or_else(|| serde::de::Error::custom("expected a string or integer id"))
}

fn deserialize_id_option<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de::{self, Visitor};

    struct IdVisitor;

    impl<'de> Visitor<'de> for IdVisitor {
        type Value = Option<String>;

        fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
            formatter.write_str("a string, integer, or null")
        }

        fn visit_none<E>(self) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(None)
        }

        fn visit_unit<E>(self) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(None)
        }

        fn visit_i64<E>(self, value: i64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(Some(value.to_string()))
        }

        fn visit_u64<E>(self, value: u64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(Some(value.to_string()))
        }

        fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            let value = value.trim();
            Ok((!value.is_empty()).then(|| value.to_string()))
        }
    }

    deserializer.deserialize_any(IdVisitor)
}

fn deserialize_string_or_int_option<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de::{self, Unexpected, Visitor};

    struct StringOrIntOptionVisitor;

    impl<'de> Visitor<'de> for StringOrIntOptionVisitor {
        type Value = Option<i64>;

        fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
            formatter.write_str("a string, integer, or null")
        }

        fn visit_none<E>(self) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(None)
        }

        fn visit_unit<E>(self) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(None)
        }

        fn visit_i64<E>(self, value: i64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(Some(value))
        }

        fn visit_u64<E>(self, value: u64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            i64::try_from(value)
                .map(Some)
                .map_err(|_| E::invalid_value(Unexpected::Unsigned(value), &self))
        }

        fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            if value.trim().is_empty() {
                Ok(None)
            } else {
                value
                    .trim()
                    .parse()
                    .map(Some)
                    .map_err(|_| E::invalid_value(Unexpected::Str(value), &self))
            }
        }
    }

    deserializer.deserialize_any(StringOrIntOptionVisitor)
}

fn deserialize_string_or_u32_option<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    match deserialize_string_or_int_option(deserializer)? {
        None => Ok(None),
        Some(value) => u32::try_from(value)
            .map(Some)
            .map_err(|_| serde::de::Error::custom(format!("{value} is out of range"))),
    }
}

fn deserialize_string_or_u32<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: serde::Deserializer<'de>,
{
    deserialize_string_or_u32_option(deserializer)?
        .ok_or_else(|| serde::de::Error::custom("expected a string or integer"))
}
