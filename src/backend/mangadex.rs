use image::DynamicImage;
use reqwest::{Client, Url};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::io::Cursor;

use crate::config::Config;
use crate::error::{Error, Result};

/// Path segment of the bandwidth-reduced image set served by the image host.
const DATA_SAVER_SEGMENT: &str = "data-saver";

#[derive(Debug, Clone, PartialEq)]
pub struct MangaSummary {
    pub id: String,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MangaDetail {
    pub title: String,
    pub description: String,
}

#[derive(Debug, Clone)]
pub struct ChapterSummary {
    pub id: String,
    pub volume_label: String,
    pub chapter_label: String,
    pub title: String,
    /// Sort key only. `NaN` when the chapter label is absent or not numeric.
    pub chapter_number: f64,
}

impl ChapterSummary {
    /// `"Vol. 3, Ch. 12 Title"`; the title part is dropped when empty.
    pub fn display_line(&self) -> String {
        let line = format!("{}, {}", self.volume_label, self.chapter_label);
        if self.title.is_empty() {
            line
        } else {
            format!("{line} {}", self.title)
        }
    }
}

/// One offset window of a manga's chapter feed.
#[derive(Debug, Clone)]
pub struct ChapterPage {
    pub offset: usize,
    pub items: Vec<ChapterSummary>,
    pub returned_count: usize,
}

impl ChapterPage {
    pub fn empty(offset: usize) -> Self {
        Self {
            offset,
            items: Vec::new(),
            returned_count: 0,
        }
    }

    pub fn has_next(&self, page_size: usize) -> bool {
        self.returned_count >= page_size
    }

    pub fn has_previous(&self) -> bool {
        self.offset > 0
    }
}

// List endpoints come in two shapes: the legacy `results: [{ data }]`
// envelope and the current flat `data: [..]` array.
#[derive(Debug, Deserialize)]
struct Listing<T> {
    #[serde(default = "Vec::new")]
    results: Vec<Envelope<T>>,
    #[serde(default = "Vec::new")]
    data: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    data: T,
}

impl<T> Listing<T> {
    fn into_items(self) -> Vec<T> {
        if self.results.is_empty() {
            self.data
        } else {
            self.results.into_iter().map(|e| e.data).collect()
        }
    }
}

#[derive(Debug, Deserialize)]
struct MangaData {
    id: String,
    #[serde(default)]
    attributes: TitleAttributes,
}

#[derive(Debug, Default, Deserialize)]
struct TitleAttributes {
    #[serde(default)]
    title: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct DetailResponse {
    data: Option<DetailData>,
}

#[derive(Debug, Deserialize)]
struct DetailData {
    attributes: Option<DetailAttributes>,
}

#[derive(Debug, Deserialize)]
struct DetailAttributes {
    title: Option<HashMap<String, String>>,
    description: Option<HashMap<String, String>>,
}

#[derive(Debug, Deserialize)]
struct ChapterData {
    id: String,
    attributes: ChapterAttributes,
}

#[derive(Debug, Deserialize)]
struct ChapterAttributes {
    volume: Option<String>,
    chapter: Option<String>,
    title: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChapterMetaData {
    attributes: ChapterFiles,
}

#[derive(Debug, Deserialize)]
struct ChapterFiles {
    hash: Option<String>,
    #[serde(rename = "dataSaver")]
    data_saver: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct AtHomeResponse {
    #[serde(rename = "baseUrl")]
    base_url: Option<String>,
}

pub fn volume_label(volume: Option<&str>) -> String {
    match volume.map(str::trim) {
        Some(v) if !v.is_empty() => format!("Vol. {v}"),
        _ => "Vol. ?".to_string(),
    }
}

pub fn chapter_label(chapter: Option<&str>) -> String {
    match chapter.map(str::trim) {
        Some(c) if !c.is_empty() => format!("Ch. {c}"),
        _ => "Ch. ?".to_string(),
    }
}

/// Longest prefix of `s` shaped like a decimal float: optional sign, digits
/// with an optional fraction, optional exponent.
fn numeric_prefix(s: &str) -> &str {
    let bytes = s.as_bytes();
    let mut end = 0;
    if matches!(bytes.first(), Some(b'+' | b'-')) {
        end += 1;
    }

    let digits_from = |mut i: usize| {
        while bytes.get(i).is_some_and(u8::is_ascii_digit) {
            i += 1;
        }
        i
    };

    let int_end = digits_from(end);
    let mut mantissa_digits = int_end - end;
    end = int_end;
    if bytes.get(end) == Some(&b'.') {
        let frac_end = digits_from(end + 1);
        mantissa_digits += frac_end - (end + 1);
        end = frac_end;
    }
    if mantissa_digits == 0 {
        return "";
    }

    if matches!(bytes.get(end), Some(b'e' | b'E')) {
        let mut exp = end + 1;
        if matches!(bytes.get(exp), Some(b'+' | b'-')) {
            exp += 1;
        }
        let exp_end = digits_from(exp);
        if exp_end > exp {
            end = exp_end;
        }
    }
    &s[..end]
}

/// Parses a chapter label into its sort key from its leading number, so
/// `"12a"` sorts as 12. Labels without a leading number (including `"inf"`)
/// become a positive `NaN`, which `f64::total_cmp` orders after every number.
pub fn parse_chapter_number(chapter: Option<&str>) -> f64 {
    let prefix = chapter.map(|c| numeric_prefix(c.trim_start())).unwrap_or("");
    match prefix.parse::<f64>() {
        Ok(n) if n.is_finite() => n,
        _ => f64::NAN,
    }
}

/// Stable ascending sort by chapter number; unnumbered chapters go last and
/// keep their upstream order.
pub fn sort_chapters(items: &mut [ChapterSummary]) {
    items.sort_by(|a, b| a.chapter_number.total_cmp(&b.chapter_number));
}

impl From<ChapterData> for ChapterSummary {
    fn from(c: ChapterData) -> Self {
        let ChapterAttributes {
            volume,
            chapter,
            title,
        } = c.attributes;

        ChapterSummary {
            id: c.id,
            volume_label: volume_label(volume.as_deref()),
            chapter_label: chapter_label(chapter.as_deref()),
            title: title.unwrap_or_default(),
            chapter_number: parse_chapter_number(chapter.as_deref()),
        }
    }
}

fn chapter_page(offset: usize, chapters: Vec<ChapterData>) -> ChapterPage {
    let mut items: Vec<ChapterSummary> = chapters.into_iter().map(ChapterSummary::from).collect();
    let returned_count = items.len();
    sort_chapters(&mut items);

    ChapterPage {
        offset,
        items,
        returned_count,
    }
}

fn pick_title(titles: &HashMap<String, String>, language: &str) -> String {
    titles
        .get(language)
        .or_else(|| titles.values().next())
        .cloned()
        .unwrap_or_else(|| "Untitled".to_string())
}

fn detail_from(response: DetailResponse, language: &str) -> Option<MangaDetail> {
    let attributes = response.data?.attributes?;
    let title = attributes.title?.remove(language)?;
    let description = attributes.description?.remove(language)?;
    Some(MangaDetail {
        title,
        description: html_escape::decode_html_entities(&description).into_owned(),
    })
}

/// Combines an image-host base URL, a chapter hash and the data-saver
/// filenames into absolute page URLs. Any missing or malformed part yields
/// an empty list.
pub fn build_page_urls(
    base_url: Option<&str>,
    hash: Option<&str>,
    filenames: Option<&[String]>,
) -> Vec<String> {
    let (Some(base_url), Some(hash), Some(filenames)) = (base_url, hash, filenames) else {
        return Vec::new();
    };

    let base_url = base_url.trim_end_matches('/');
    let base_ok = Url::parse(base_url)
        .map(|u| matches!(u.scheme(), "http" | "https") && !u.cannot_be_a_base())
        .unwrap_or(false);

    if !base_ok || hash.is_empty() || filenames.iter().any(|f| f.is_empty()) {
        return Vec::new();
    }

    filenames
        .iter()
        .map(|filename| format!("{base_url}/{DATA_SAVER_SEGMENT}/{hash}/{filename}"))
        .collect()
}

pub fn build_client(user_agent: &str) -> Result<Client> {
    Ok(Client::builder().user_agent(user_agent).build()?)
}

/// MangaDex API client holding the shared HTTP client and request settings.
#[derive(Debug, Clone)]
pub struct MangaDex {
    client: Client,
    base_url: String,
    language: String,
    page_size: usize,
}

impl MangaDex {
    pub fn new(config: &Config) -> Result<Self> {
        Ok(Self::with_client(build_client(&config.user_agent)?, config))
    }

    pub fn with_client(client: Client, config: &Config) -> Self {
        Self {
            client,
            base_url: config.api_root().to_string(),
            language: config.language.clone(),
            page_size: config.chapter_page_size,
        }
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        log::debug!("GET {url}");
        let body = self
            .client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;

        Ok(serde_json::from_str(&body)?)
    }

    pub fn search_url(&self, query: &str) -> String {
        if query.is_empty() {
            format!("{}/manga", self.base_url)
        } else {
            format!("{}/manga?title={}", self.base_url, urlencoding::encode(query))
        }
    }

    pub fn detail_url(&self, manga_id: &str) -> String {
        format!("{}/manga/{}", self.base_url, urlencoding::encode(manga_id))
    }

    pub fn feed_url(&self, manga_id: &str, offset: usize) -> String {
        format!(
            "{}/manga/{}/feed?translatedLanguage[]={}&order[chapter]=asc&limit={}&offset={}",
            self.base_url,
            urlencoding::encode(manga_id),
            urlencoding::encode(&self.language),
            self.page_size,
            offset
        )
    }

    pub fn chapter_url(&self, chapter_id: &str) -> String {
        format!(
            "{}/chapter?ids[]={}",
            self.base_url,
            urlencoding::encode(chapter_id)
        )
    }

    pub fn at_home_url(&self, chapter_id: &str) -> String {
        format!(
            "{}/at-home/server/{}",
            self.base_url,
            urlencoding::encode(chapter_id)
        )
    }

    /// Searches the catalog by title. An empty query lists the catalog
    /// without a title filter.
    pub async fn search(&self, query: &str) -> Result<Vec<MangaSummary>> {
        let listing: Listing<MangaData> = self.get_json(&self.search_url(query)).await?;

        Ok(listing
            .into_items()
            .into_iter()
            .map(|m| MangaSummary {
                title: pick_title(&m.attributes.title, &self.language),
                id: m.id,
            })
            .collect())
    }

    /// `Ok(None)` when the title or description has no entry in the
    /// configured language.
    pub async fn fetch_detail(&self, manga_id: &str) -> Result<Option<MangaDetail>> {
        let response: DetailResponse = self.get_json(&self.detail_url(manga_id)).await?;
        Ok(detail_from(response, &self.language))
    }

    pub async fn fetch_chapters(&self, manga_id: &str, offset: usize) -> Result<ChapterPage> {
        let listing: Listing<ChapterData> =
            self.get_json(&self.feed_url(manga_id, offset)).await?;
        let page = chapter_page(offset, listing.into_items());

        log::info!(
            "manga {manga_id}: {} chapters at offset {offset}",
            page.returned_count
        );
        Ok(page)
    }

    async fn chapter_files(&self, chapter_id: &str) -> Result<ChapterFiles> {
        let listing: Listing<ChapterMetaData> =
            self.get_json(&self.chapter_url(chapter_id)).await?;

        listing
            .into_items()
            .into_iter()
            .next()
            .map(|c| c.attributes)
            .ok_or_else(|| Error::NotFound(format!("chapter {chapter_id}")))
    }

    async fn at_home_server(&self, chapter_id: &str) -> Result<AtHomeResponse> {
        self.get_json(&self.at_home_url(chapter_id)).await
    }

    /// Resolves a chapter into ordered data-saver page URLs. The metadata
    /// lookup and the image-host handshake run concurrently; the URLs are
    /// only built once both have answered.
    pub async fn resolve_pages(&self, chapter_id: &str) -> Result<Vec<String>> {
        let (files, server) = tokio::join!(
            self.chapter_files(chapter_id),
            self.at_home_server(chapter_id)
        );
        let files = files?;
        let server = server?;

        let urls = build_page_urls(
            server.base_url.as_deref(),
            files.hash.as_deref(),
            files.data_saver.as_deref(),
        );
        if urls.is_empty() {
            log::warn!("chapter {chapter_id}: incomplete page data, no pages resolved");
        }
        Ok(urls)
    }

    pub async fn fetch_page_image(&self, page_url: &str) -> Option<DynamicImage> {
        let response = self.client.get(page_url).send().await.ok()?;
        let bytes = response.error_for_status().ok()?.bytes().await.ok()?;

        image::ImageReader::new(Cursor::new(bytes))
            .with_guessed_format()
            .ok()?
            .decode()
            .ok()
    }
}
