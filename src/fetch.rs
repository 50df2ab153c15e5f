//! Google Drive file downloads.
//!
//! Large Drive files are served behind an HTML "can't scan for viruses"
//! interstitial. The page carries a `confirm` token (and, on the newer
//! endpoint, a `uuid`) that must be echoed back to receive the file body.

use crate::traits::{FetchError, FileFetcher};
use async_trait::async_trait;
use futures_util::StreamExt;
use regex::Regex;
use reqwest::{Client, Response};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

const DEFAULT_UC_URL: &str = "https://drive.google.com/uc";
const DEFAULT_USERCONTENT_URL: &str = "https://drive.usercontent.google.com/download";

/// Tokens echoed back to Drive to confirm a large download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmTokens {
    pub confirm: String,
    pub uuid: Option<String>,
}

static CONFIRM_INPUT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"name="confirm"\s+value="([^"]+)""#).unwrap());
static UUID_INPUT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"name="uuid"\s+value="([^"]+)""#).unwrap());
static CONFIRM_LINK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"confirm=([0-9A-Za-z_-]+)").unwrap());

fn capture(re: &Regex, html: &str) -> Option<String> {
    re.captures(html).map(|caps| caps[1].to_string())
}

/// Extracts the confirmation tokens from a Drive interstitial page.
pub fn parse_confirm_tokens(html: &str) -> Option<ConfirmTokens> {
    let confirm = capture(&CONFIRM_INPUT, html).or_else(|| capture(&CONFIRM_LINK, html))?;

    Some(ConfirmTokens {
        confirm,
        uuid: capture(&UUID_INPUT, html),
    })
}

/// Downloads public files from Google Drive by file id.
#[derive(Debug, Clone)]
pub struct GoogleDriveFetcher {
    client: Client,
    uc_url: String,
    usercontent_url: String,
}

impl Default for GoogleDriveFetcher {
    fn default() -> Self {
        Self::new(Client::new())
    }
}

impl GoogleDriveFetcher {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            uc_url: DEFAULT_UC_URL.to_string(),
            usercontent_url: DEFAULT_USERCONTENT_URL.to_string(),
        }
    }

    /// Overrides the Drive endpoints (e.g., for a mirror).
    pub fn with_endpoints(mut self, uc_url: impl Into<String>, usercontent_url: impl Into<String>) -> Self {
        self.uc_url = uc_url.into();
        self.usercontent_url = usercontent_url.into();
        self
    }

    async fn request(&self, url: &str, query: &[(&str, &str)]) -> Result<Response, FetchError> {
        Ok(self
            .client
            .get(url)
            .query(query)
            .header("User-Agent", concat!("dota-importer/", env!("CARGO_PKG_VERSION")))
            .send()
            .await?)
    }
}

fn is_html(response: &Response) -> bool {
    response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.starts_with("text/html"))
        .unwrap_or(false)
}

fn check_status(response: &Response, file_id: &str) -> Result<(), FetchError> {
    if !response.status().is_success() {
        return Err(FetchError::Status {
            status: response.status().as_u16(),
            file_id: file_id.to_string(),
        });
    }
    Ok(())
}

/// `labelTxt.zip` → `labelTxt.zip.part`.
pub fn partial_path(dest: &Path) -> PathBuf {
    let mut name = dest.file_name().unwrap_or_default().to_os_string();
    name.push(".part");
    dest.with_file_name(name)
}

/// Streams the body to a `.part` sibling and renames it onto `dest` once
/// complete, so `dest` never holds a truncated file.
async fn stream_to_file(response: Response, dest: &Path) -> Result<u64, FetchError> {
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent).await?;
    }

    let part = partial_path(dest);
    let mut file = File::create(&part).await?;
    let mut downloaded: u64 = 0;
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        file.write_all(&chunk).await?;
        downloaded += chunk.len() as u64;
    }
    file.flush().await?;
    drop(file);

    fs::rename(&part, dest).await?;
    Ok(downloaded)
}

#[async_trait]
impl FileFetcher for GoogleDriveFetcher {
    fn source_name(&self) -> &str {
        "google-drive"
    }

    async fn fetch(&self, file_id: &str, dest: &Path) -> Result<u64, FetchError> {
        debug!(file_id, dest = %dest.display(), "Requesting Drive file");

        let response = self
            .request(&self.uc_url, &[("export", "download"), ("id", file_id)])
            .await?;
        check_status(&response, file_id)?;

        let response = if is_html(&response) {
            let page = response.text().await?;
            let tokens = parse_confirm_tokens(&page)
                .ok_or_else(|| FetchError::ConfirmTokenMissing(file_id.to_string()))?;
            debug!(file_id, "Confirming large file download");

            let mut query = vec![
                ("id", file_id),
                ("export", "download"),
                ("confirm", tokens.confirm.as_str()),
            ];
            if let Some(uuid) = tokens.uuid.as_deref() {
                query.push(("uuid", uuid));
            }

            let confirmed = self.request(&self.usercontent_url, &query).await?;
            check_status(&confirmed, file_id)?;
            if is_html(&confirmed) {
                return Err(FetchError::ConfirmTokenMissing(file_id.to_string()));
            }
            confirmed
        } else {
            response
        };

        let bytes = stream_to_file(response, dest).await?;
        info!(file_id, bytes, dest = %dest.display(), "Download complete");
        Ok(bytes)
    }
}
