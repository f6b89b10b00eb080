//! Consolidated titles and the catalog items providers report

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use strum::{Display, EnumIter, EnumString};

static SLUG_SEPARATORS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^a-z0-9]+").expect("slug pattern is a valid regex"));

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Display, EnumString, EnumIter,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum MediaType {
    Movies,
    Tvshows,
    Channels,
}

/// One provider's playable copy of a title
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MediaSource {
    pub provider_id: String,
    /// Absolute URL, or a root-relative path joined with the provider's bases
    pub url: String,
}

impl MediaSource {
    pub fn new<P: Into<String>, U: Into<String>>(provider_id: P, url: U) -> Self {
        Self {
            provider_id: provider_id.into(),
            url: url.into(),
        }
    }
}

/// A provider's own identifier for a title
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProviderRef {
    pub provider_id: String,
    pub item_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Episode {
    pub season: u32,
    pub episode: u32,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub sources: Vec<MediaSource>,
}

/// A title as seen across all providers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Title {
    pub id: String,
    pub media_type: MediaType,
    pub name: String,
    /// Providers that list this title
    #[serde(default)]
    pub provider_refs: Vec<ProviderRef>,
    /// Movie and channel sources
    #[serde(default)]
    pub sources: Vec<MediaSource>,
    #[serde(default)]
    pub episodes: Vec<Episode>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Title {
    pub fn new<I: Into<String>, N: Into<String>>(id: I, media_type: MediaType, name: N) -> Self {
        Self {
            id: id.into(),
            media_type,
            name: name.into(),
            provider_refs: Vec::new(),
            sources: Vec::new(),
            episodes: Vec::new(),
            updated_at: None,
        }
    }

    /// Sources for the requested movie, channel or episode
    ///
    /// Shows need both `season` and `episode`; other media types ignore them.
    pub fn media_sources(&self, season: Option<u32>, episode: Option<u32>) -> &[MediaSource] {
        match self.media_type {
            MediaType::Tvshows => match (season, episode) {
                (Some(season), Some(episode)) => self
                    .episodes
                    .iter()
                    .find(|e| e.season == season && e.episode == episode)
                    .map(|e| e.sources.as_slice())
                    .unwrap_or_default(),
                _ => &[],
            },
            MediaType::Movies | MediaType::Channels => &self.sources,
        }
    }

    /// Add a source unless the same provider already serves the same URL
    pub fn add_source(&mut self, source: MediaSource) -> bool {
        if self.sources.contains(&source) {
            return false;
        }
        self.sources.push(source);
        true
    }

    pub fn add_provider_ref(&mut self, provider_ref: ProviderRef) {
        if !self.provider_refs.contains(&provider_ref) {
            self.provider_refs.push(provider_ref);
        }
    }

    /// Attach an episode source, creating the episode if needed
    pub fn add_episode_source(&mut self, season: u32, episode: u32, name: Option<String>, source: MediaSource) {
        let entry = match self
            .episodes
            .iter_mut()
            .position(|e| e.season == season && e.episode == episode)
        {
            Some(index) => &mut self.episodes[index],
            None => {
                self.episodes.push(Episode {
                    season,
                    episode,
                    name: None,
                    sources: Vec::new(),
                });
                let last = self.episodes.len() - 1;
                &mut self.episodes[last]
            }
        };
        if entry.name.is_none() {
            entry.name = name;
        }
        if !entry.sources.contains(&source) {
            entry.sources.push(source);
        }
    }

    /// No provider lists the title and nothing is left to play
    pub fn is_orphaned(&self) -> bool {
        self.provider_refs.is_empty()
            && self.sources.is_empty()
            && self.episodes.iter().all(|e| e.sources.is_empty())
    }
}

/// A catalog entry as reported by one provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogItem {
    pub provider_id: String,
    /// The provider's own id (stream id, series id)
    pub item_id: String,
    pub media_type: MediaType,
    pub name: String,
    /// Shared external id such as a TMDB id, used to merge across providers
    #[serde(default)]
    pub external_id: Option<String>,
    /// Playable path for movies and channels; shows get theirs from details
    #[serde(default)]
    pub stream_url: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
}

impl CatalogItem {
    /// Consolidated title id
    ///
    /// Items sharing an external id merge; otherwise the normalised name is
    /// the key.
    pub fn title_id(&self) -> String {
        match self.external_id.as_deref().map(str::trim) {
            Some(external) if !external.is_empty() && external != "0" => format!("tmdb-{external}"),
            _ => slugify(&self.name),
        }
    }
}

/// Episode list returned by a details fetch
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TitleDetails {
    pub item_id: String,
    #[serde(default)]
    pub plot: Option<String>,
    #[serde(default)]
    pub episodes: Vec<EpisodeDetails>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpisodeDetails {
    pub season: u32,
    pub episode: u32,
    #[serde(default)]
    pub name: Option<String>,
    pub stream_url: String,
}

fn slugify(name: &str) -> String {
    SLUG_SEPARATORS
        .replace_all(&name.to_lowercase(), "-")
        .trim_matches('-')
        .to_string()
}
