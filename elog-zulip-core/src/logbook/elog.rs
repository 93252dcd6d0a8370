//! ELOG server client.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use async_trait::async_trait;
use scraper::{Html, Selector};

use super::{Logbook, LogbookError};
use crate::config::Credentials;
use crate::entry::{ATTR_ATTACHMENT, ATTR_ENCODING, ATTR_ID, Attributes, Entry};

static LINK_SELECTOR: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("a[href]").expect("BUG: hardcoded selector 'a[href]' is statically valid")
});

/// Minimum length of the `=` line separating header and body in a download.
const SEPARATOR_MIN_LEN: usize = 20;

/// Client for one logbook of an ELOG server.
pub struct ElogClient {
    client: reqwest::Client,
    url: String,
    credentials: Option<Credentials>,
}

impl ElogClient {
    /// Create a client for the logbook at `url`.
    pub fn new(url: impl Into<String>, credentials: Option<Credentials>) -> Self {
        let mut url = url.into();
        if !url.ends_with('/') {
            url.push('/');
        }
        Self {
            client: reqwest::Client::new(),
            url,
            credentials,
        }
    }

    async fn get(&self, url: &str) -> Result<reqwest::Response, LogbookError> {
        let mut request = self.client.get(url);
        if let Some(credentials) = &self.credentials {
            request = request.header(
                reqwest::header::COOKIE,
                format!("unm={}; upwd={}", credentials.user, credentials.password),
            );
        }

        let response = request
            .send()
            .await
            .map_err(|e| LogbookError::RequestFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(LogbookError::RequestFailed(format!(
                "HTTP {}: {}",
                status,
                error_text.chars().take(200).collect::<String>()
            )));
        }

        Ok(response)
    }
}

#[async_trait]
impl Logbook for ElogClient {
    fn url(&self) -> &str {
        &self.url
    }

    async fn message_ids(&self) -> Result<Vec<u64>, LogbookError> {
        let page = self
            .get(&format!("{}page", self.url))
            .await?
            .text()
            .await
            .map_err(|e| LogbookError::InvalidResponse(e.to_string()))?;
        let ids = parse_message_ids(&page, &self.url);
        tracing::debug!("{} lists {} entries", self.url, ids.len());
        Ok(ids)
    }

    async fn read(&self, id: u64) -> Result<Entry, LogbookError> {
        let response = self
            .get(&format!("{}{}?cmd=download", self.url, id))
            .await
            .map_err(|e| match e {
                LogbookError::RequestFailed(msg) if msg.starts_with("HTTP 404") => {
                    LogbookError::NotFound(id)
                }
                other => other,
            })?;
        let text = response
            .text()
            .await
            .map_err(|e| LogbookError::InvalidResponse(e.to_string()))?;
        parse_download(id, &text, &self.url)
    }

    async fn download_attachment(&self, url: &str) -> Result<Vec<u8>, LogbookError> {
        let bytes = self
            .get(url)
            .await?
            .bytes()
            .await
            .map_err(|e| LogbookError::InvalidResponse(e.to_string()))?;
        Ok(bytes.to_vec())
    }
}

/// Last non-empty path segment of the logbook URL.
fn logbook_name(base: &str) -> &str {
    base.trim_end_matches('/').rsplit('/').next().unwrap_or_default()
}

/// Entry ids linked from a logbook listing page, ascending.
///
/// Only links to entries of this logbook count: a bare `<id>` or `<logbook>/<id>`.
fn parse_message_ids(page: &str, base: &str) -> Vec<u64> {
    let name = logbook_name(base);
    let document = Html::parse_document(page);
    let mut ids = BTreeSet::new();

    for link in document.select(&LINK_SELECTOR) {
        let Some(href) = link.value().attr("href") else {
            continue;
        };
        let path = href.split(['?', '#']).next().unwrap_or_default();
        let mut segments = path.trim_end_matches('/').rsplit('/');
        let Some(Ok(id)) = segments.next().map(str::parse::<u64>) else {
            continue;
        };
        match segments.next() {
            None => {}
            Some(parent) if parent == name => {}
            Some(_) => continue,
        }
        ids.insert(id);
    }

    ids.into_iter().collect()
}

fn is_separator(line: &str) -> bool {
    let line = line.trim_end();
    line.len() >= SEPARATOR_MIN_LEN && line.chars().all(|c| c == '=')
}

/// Parse the response of `<id>?cmd=download`: `Key: Value` lines, a `=` line, the body.
fn parse_download(id: u64, text: &str, base: &str) -> Result<Entry, LogbookError> {
    let lines: Vec<&str> = text.lines().collect();
    let separator = lines.iter().position(|l| is_separator(l)).ok_or_else(|| {
        LogbookError::InvalidResponse(format!("entry {} has no header separator", id))
    })?;

    let mut attributes = Attributes::new();
    let mut attachments = Vec::new();
    for line in &lines[..separator] {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let (key, value) = (key.trim(), value.trim());
        if key == ATTR_ATTACHMENT {
            attachments = value
                .split(',')
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map(|name| format!("{}{}", base, name))
                .collect();
        }
        attributes.insert(key, value);
    }

    if attributes.get(ATTR_ID).is_none() {
        attributes.insert(ATTR_ID, id.to_string());
    }

    let body = lines[separator + 1..].join("\n");
    let body = match attributes.get(ATTR_ENCODING) {
        Some(encoding) if encoding.eq_ignore_ascii_case("plain") => plain_to_html(&body),
        _ => body,
    };

    Ok(Entry {
        id,
        body,
        attributes,
        attachments,
    })
}

/// Escape a plain-text body and keep its line breaks.
fn plain_to_html(body: &str) -> String {
    body.lines()
        .map(|line| html_escape::encode_text(line).into_owned())
        .collect::<Vec<_>>()
        .join("<br>\n")
}
