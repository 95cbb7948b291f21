use std::fmt;
use std::str::FromStr;

use crate::errors::{HianimeError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AudioTrack {
    Sub,
    Dub,
}

impl AudioTrack {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sub => "sub",
            Self::Dub => "dub",
        }
    }
}

impl fmt::Display for AudioTrack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AudioTrack {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sub" => Ok(Self::Sub),
            "dub" => Ok(Self::Dub),
            other => Err(format!("unknown audio track {other:?}; expected sub or dub")),
        }
    }
}

/// the episode a user picked, in one audio track.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EpisodeReference {
    pub audio_track: AudioTrack,
    /// numeric id from the `ep=` query parameter.
    pub episode_id: String,
    /// watch path, e.g. `/watch/one-piece-100?ep=2142`.
    pub episode_path: String,
}

impl EpisodeReference {
    pub fn new(audio_track: AudioTrack, episode_path: impl Into<String>) -> Result<Self> {
        let episode_path = episode_path.into();
        let episode_id = episode_path
            .rsplit('=')
            .next()
            .map(str::trim)
            .filter(|id| !id.is_empty() && *id != episode_path.trim())
            .ok_or_else(|| HianimeError::InvalidEpisodeData {
                data: episode_path.clone(),
            })?
            .to_string();

        Ok(Self {
            audio_track,
            episode_id,
            episode_path,
        })
    }

    /// parses `"<sub|dub>|<path>"`.
    pub fn parse(data: &str) -> Result<Self> {
        let invalid = || HianimeError::InvalidEpisodeData {
            data: data.to_string(),
        };

        let (track, path) = data.split_once('|').ok_or_else(invalid)?;
        let track = track
            .rsplit('/')
            .next()
            .unwrap_or(track)
            .parse::<AudioTrack>()
            .map_err(|_| invalid())?;

        Self::new(track, path).map_err(|_| invalid())
    }

    /// episode slug used by the sources api, e.g. `one-piece-100`.
    pub fn slug(&self) -> &str {
        let tail = self
            .episode_path
            .rsplit('/')
            .next()
            .unwrap_or(&self.episode_path);
        tail.split('?').next().unwrap_or(tail)
    }

    pub fn to_data(&self) -> String {
        format!("{}|{}", self.audio_track, self.episode_path)
    }
}

impl FromStr for EpisodeReference {
    type Err = HianimeError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// one streaming mirror listed for an episode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MirrorServer {
    /// short label, lower-cased, e.g. `hd-1`.
    pub name: String,
    /// the site's id for this mirror entry.
    pub internal_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SkipWindow {
    pub start: u64,
    pub end: u64,
}

/// what the structured sources api returned for one mirror.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourcePayload {
    pub manifest_urls: Vec<String>,
    pub subtitle_tracks: Vec<hianime_core::SubtitleTrack>,
    pub intro: Option<SkipWindow>,
    pub outro: Option<SkipWindow>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Anime,
    Movie,
    Ova,
}

impl MediaKind {
    pub fn from_label(label: &str) -> Self {
        if label.contains("OVA") || label.contains("Special") {
            Self::Ova
        } else if label.contains("Movie") {
            Self::Movie
        } else {
            Self::Anime
        }
    }
}

/// a card from search results or a listing page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchItem {
    pub title: String,
    pub url: String,
    pub poster: Option<String>,
    pub kind: MediaKind,
    pub sub_count: Option<u32>,
    pub dub_count: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Episode {
    pub name: Option<String>,
    pub number: Option<u32>,
    pub reference: EpisodeReference,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnimeDetail {
    pub title: String,
    pub url: String,
    pub poster: Option<String>,
    pub synopsis: Option<String>,
    pub status: Option<String>,
    pub mal_id: Option<u32>,
    pub anilist_id: Option<u32>,
    pub sub_episodes: Vec<Episode>,
    pub dub_episodes: Vec<Episode>,
}

/// listing pages on the site's home.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HomeSection {
    LatestEpisodes,
    RecentlyUpdatedSub,
    RecentlyUpdatedDub,
    RecentlyAdded,
    TopAiring,
    MostPopular,
    MostFavorite,
    Completed,
}

impl HomeSection {
    pub const ALL: [HomeSection; 8] = [
        Self::LatestEpisodes,
        Self::RecentlyUpdatedSub,
        Self::RecentlyUpdatedDub,
        Self::RecentlyAdded,
        Self::TopAiring,
        Self::MostPopular,
        Self::MostFavorite,
        Self::Completed,
    ];

    pub fn title(&self) -> &'static str {
        match self {
            Self::LatestEpisodes => "Latest Episodes",
            Self::RecentlyUpdatedSub => "Recently Updated (SUB)",
            Self::RecentlyUpdatedDub => "Recently Updated (DUB)",
            Self::RecentlyAdded => "New On HiAnime",
            Self::TopAiring => "Top Airing",
            Self::MostPopular => "Most Popular",
            Self::MostFavorite => "Most Favorite",
            Self::Completed => "Latest Completed",
        }
    }

    /// path and query, without the page number.
    pub(crate) fn path(&self) -> &'static str {
        match self {
            Self::LatestEpisodes => "/recently-updated?",
            Self::RecentlyUpdatedSub => "/filter?status=2&language=1&sort=recently_updated&",
            Self::RecentlyUpdatedDub => "/filter?status=2&language=2&sort=recently_updated&",
            Self::RecentlyAdded => "/recently-added?",
            Self::TopAiring => "/top-airing?",
            Self::MostPopular => "/most-popular?",
            Self::MostFavorite => "/most-favorite?",
            Self::Completed => "/completed?",
        }
    }
}
