use std::sync::LazyLock;

use reqwest::Url;
use scraper::{ElementRef, Html, Selector};
use serde::Deserialize;
use tracing::{debug, info};

use crate::client::{HianimeClient, HtmlEnvelope};
use crate::errors::{HianimeError, Result};
use crate::models::{
    AnimeDetail, AudioTrack, Episode, EpisodeReference, HomeSection, MediaKind, SearchItem,
};

fn selector(css: &str) -> Selector {
    Selector::parse(css).expect("invalid selector")
}

static CARD: LazyLock<Selector> = LazyLock::new(|| selector("div.flw-item"));
static CARD_LINK: LazyLock<Selector> = LazyLock::new(|| selector("a"));
static CARD_TITLE: LazyLock<Selector> = LazyLock::new(|| selector("h3.film-name"));
static CARD_IMG: LazyLock<Selector> = LazyLock::new(|| selector("img"));
static CARD_SUB: LazyLock<Selector> =
    LazyLock::new(|| selector(".film-poster > .tick.ltr > .tick-sub"));
static CARD_DUB: LazyLock<Selector> =
    LazyLock::new(|| selector(".film-poster > .tick.ltr > .tick-dub"));
static CARD_KIND: LazyLock<Selector> = LazyLock::new(|| selector("div.fd-infor > span.fdi-item"));

static SYNC_DATA: LazyLock<Selector> = LazyLock::new(|| selector("#syncData"));
static DETAIL_TITLE: LazyLock<Selector> = LazyLock::new(|| selector(".anisc-detail > .film-name"));
static DETAIL_POSTER: LazyLock<Selector> = LazyLock::new(|| selector(".anisc-poster img"));
static DETAIL_SUB: LazyLock<Selector> = LazyLock::new(|| selector(".anisc-detail .tick-sub"));
static DETAIL_DUB: LazyLock<Selector> = LazyLock::new(|| selector(".anisc-detail .tick-dub"));
static INFO_ITEM: LazyLock<Selector> = LazyLock::new(|| selector(".anisc-info > .item"));
static INFO_HEAD: LazyLock<Selector> = LazyLock::new(|| selector("span.item-head"));
static INFO_TEXT: LazyLock<Selector> = LazyLock::new(|| selector(".text"));
static INFO_NAME: LazyLock<Selector> = LazyLock::new(|| selector(".name"));

static EPISODE_ITEM: LazyLock<Selector> =
    LazyLock::new(|| selector(".ss-list > a[href].ssl-item.ep-item"));
static EPISODE_ORDER: LazyLock<Selector> = LazyLock::new(|| selector(".ssli-order"));

#[derive(Debug, Default, Deserialize)]
struct SyncData {
    mal_id: Option<String>,
    anilist_id: Option<String>,
}

/// whitespace-normalised text content, like a browser's `innerText`.
fn text_of(el: ElementRef<'_>) -> String {
    el.text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

fn first_text(scope: ElementRef<'_>, sel: &Selector) -> Option<String> {
    scope
        .select(sel)
        .next()
        .map(text_of)
        .filter(|t| !t.is_empty())
}

fn first_count(scope: ElementRef<'_>, sel: &Selector) -> Option<u32> {
    first_text(scope, sel).and_then(|t| t.parse().ok())
}

impl HianimeClient {
    /// searches the site catalog by keyword.
    pub async fn search(&self, query: &str) -> Result<Vec<SearchItem>> {
        let url = format!("{}/search", self.base_url);
        let page = self
            .get_text(&url, &[("keyword", query)], "searching catalog")
            .await?;

        let items = self.parse_cards(&page);
        info!(query, count = items.len(), "search finished");
        Ok(items)
    }

    /// one page (1-based) of a home listing.
    pub async fn fetch_section(&self, section: HomeSection, page: u32) -> Result<Vec<SearchItem>> {
        let url = format!("{}{}page={page}", self.base_url, section.path());
        let html = self
            .get_text(&url, &[], &format!("loading {}", section.title()))
            .await?;

        let items = self.parse_cards(&html);
        debug!(section = section.title(), page, count = items.len(), "section loaded");
        Ok(items)
    }

    /// loads an anime page and its episode list.
    pub async fn load_detail(&self, url: &str) -> Result<AnimeDetail> {
        let url = self.absolute(url);
        let anime_id = Self::anime_id(&url)?;

        let html = self.get_text(&url, &[], "loading anime page").await?;
        let mut detail = self.parse_detail(&html, &url);

        let doc = Html::parse_document(&html);
        let root = doc.root_element();
        let sub_count = first_count(root, &DETAIL_SUB);
        let dub_count = first_count(root, &DETAIL_DUB);

        let list_url = format!("{}/ajax/v2/episode/list/{anime_id}", self.base_url);
        let envelope: HtmlEnvelope = self
            .get_json(&list_url, &[], "requesting episode list")
            .await?;

        let (sub, dub) = parse_episodes(&envelope.html, sub_count, dub_count);
        detail.sub_episodes = sub;
        detail.dub_episodes = dub;

        info!(
            %anime_id,
            sub = detail.sub_episodes.len(),
            dub = detail.dub_episodes.len(),
            "loaded anime detail"
        );
        Ok(detail)
    }

    /// numeric id trailing the anime page's slug, e.g. `one-piece-100` -> `100`.
    fn anime_id(link: &str) -> Result<String> {
        let invalid = || HianimeError::InvalidAnimeLink {
            link: link.to_string(),
        };
        let parsed = Url::parse(link).map_err(|_| invalid())?;
        parsed
            .path()
            .rsplit('-')
            .next()
            .map(|id| id.trim_end_matches('/'))
            .filter(|id| !id.is_empty() && id.chars().all(|c| c.is_ascii_digit()))
            .map(str::to_string)
            .ok_or_else(invalid)
    }

    pub(crate) fn parse_cards(&self, html: &str) -> Vec<SearchItem> {
        let doc = Html::parse_document(html);
        doc.select(&CARD)
            .filter_map(|card| {
                let href = card.select(&CARD_LINK).next()?.value().attr("href")?;
                let poster = card
                    .select(&CARD_IMG)
                    .next()
                    .and_then(|img| img.value().attr("data-src"))
                    .filter(|src| !src.is_empty())
                    .map(|src| self.absolute(src));

                Some(SearchItem {
                    title: first_text(card, &CARD_TITLE).unwrap_or_default(),
                    url: self.absolute(href),
                    poster,
                    kind: MediaKind::from_label(&first_text(card, &CARD_KIND).unwrap_or_default()),
                    sub_count: first_count(card, &CARD_SUB),
                    dub_count: first_count(card, &CARD_DUB),
                })
            })
            .collect()
    }

    /// everything on the anime page except the episode lists.
    pub(crate) fn parse_detail(&self, html: &str, url: &str) -> AnimeDetail {
        let doc = Html::parse_document(html);
        let root = doc.root_element();

        let sync = doc
            .select(&SYNC_DATA)
            .next()
            .map(|el| el.text().collect::<String>())
            .and_then(|raw| serde_json::from_str::<SyncData>(&raw).ok())
            .unwrap_or_default();

        let mut synopsis = None;
        let mut status = None;
        for item in doc.select(&INFO_ITEM) {
            let head = first_text(item, &INFO_HEAD).unwrap_or_default();
            match head.trim_end_matches(':') {
                "Overview" => synopsis = first_text(item, &INFO_TEXT),
                "Status" => status = first_text(item, &INFO_NAME),
                _ => {}
            }
        }

        AnimeDetail {
            title: first_text(root, &DETAIL_TITLE).unwrap_or_default(),
            url: url.to_string(),
            poster: doc
                .select(&DETAIL_POSTER)
                .next()
                .and_then(|img| img.value().attr("src"))
                .map(|src| self.absolute(src)),
            synopsis,
            status,
            mal_id: sync.mal_id.and_then(|id| id.trim().parse().ok()),
            anilist_id: sync.anilist_id.and_then(|id| id.trim().parse().ok()),
            sub_episodes: Vec::new(),
            dub_episodes: Vec::new(),
        }
    }
}

/// splits the episode list into sub and dub; each track only lists as many
/// episodes as its advertised count. a missing count means no episodes.
pub(crate) fn parse_episodes(
    html: &str,
    sub_count: Option<u32>,
    dub_count: Option<u32>,
) -> (Vec<Episode>, Vec<Episode>) {
    let doc = Html::parse_fragment(html);
    let mut sub = Vec::new();
    let mut dub = Vec::new();

    for (index, item) in doc.select(&EPISODE_ITEM).enumerate() {
        let Some(href) = item.value().attr("href") else {
            continue;
        };
        let name = item
            .value()
            .attr("title")
            .map(str::to_string)
            .filter(|t| !t.is_empty());
        let number = first_count(item, &EPISODE_ORDER);

        for (track, count, out) in [
            (AudioTrack::Sub, sub_count, &mut sub),
            (AudioTrack::Dub, dub_count, &mut dub),
        ] {
            if !count.is_some_and(|c| (index as u32) < c) {
                continue;
            }
            match EpisodeReference::new(track, href) {
                Ok(reference) => out.push(Episode {
                    name: name.clone(),
                    number,
                    reference,
                }),
                Err(err) => debug!(href, error = %err, "skipping episode without id"),
            }
        }
    }

    (sub, dub)
}
