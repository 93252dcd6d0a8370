//! Extraction of inline base64 images.
//!
//! Logbook editors embed pasted screenshots as `data:` URIs. Those cannot be sent as chat
//! text, so each one is decoded, swapped for a placeholder token and handed back as an
//! attachment to upload.

use std::path::Path;

use base64::Engine;
use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD};

use super::html::{self, Visit};
use super::placeholder::{Placeholder, PlaceholderIssuer, PlaceholderKind};

/// An image extracted from an entry body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineImage {
    /// Token standing in for the image in the text.
    pub placeholder: Placeholder,
    /// Suggested file name for the upload.
    pub filename: String,
    /// MIME type declared by the data URI.
    pub mime_type: String,
    /// Decoded payload.
    pub data: Vec<u8>,
}

/// A fragment with its inline images replaced by placeholders.
#[derive(Debug, Clone, Default)]
pub struct Extraction {
    pub html: String,
    pub images: Vec<InlineImage>,
}

/// A decoded `data:` URI.
struct DataUri {
    mime_type: String,
    data: Vec<u8>,
}

/// Why a `data:` URI could not be used.
#[derive(Debug, PartialEq)]
enum DataUriError {
    Malformed,
    NotBase64,
    Decode(String),
}

/// Extracts inline images, numbering unnamed ones across one entry.
#[derive(Debug, Default)]
pub struct ImageExtractor {
    extracted: usize,
}

impl ImageExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace every base64 `<img>` in `fragment` with a placeholder token.
    ///
    /// Images hosted elsewhere are left untouched. A `data:` URI that cannot be decoded
    /// is replaced by its alt text.
    pub fn extract(&mut self, fragment: &str, issuer: &mut PlaceholderIssuer) -> Extraction {
        let document = html::parse(fragment);
        let mut images = Vec::new();

        let html = html::rewrite(&document, &mut |element, _| {
            if element.value().name() != "img" {
                return Visit::Keep;
            }
            let src = element.value().attr("src").unwrap_or_default();
            let alt = element.value().attr("alt").unwrap_or_default().trim();

            if !is_data_uri(src) {
                tracing::debug!("leaving externally hosted image in place: {}", src);
                return Visit::Keep;
            }

            match decode_data_uri(src) {
                Ok(uri) => {
                    self.extracted += 1;
                    let placeholder = issuer.issue(PlaceholderKind::Image);
                    let filename = image_filename(alt, &uri.mime_type, self.extracted);
                    tracing::debug!(
                        "extracted inline image {} ({} bytes) as {}",
                        filename,
                        uri.data.len(),
                        placeholder.id()
                    );
                    images.push(InlineImage {
                        placeholder,
                        filename,
                        mime_type: uri.mime_type,
                        data: uri.data,
                    });
                    Visit::Replace(placeholder.token())
                }
                Err(e) => {
                    tracing::warn!("unsupported embedded image ({:?}), keeping alt text", e);
                    Visit::Replace(html_escape::encode_text(alt).into_owned())
                }
            }
        });

        Extraction { html, images }
    }
}

fn is_data_uri(src: &str) -> bool {
    src.get(..5)
        .is_some_and(|scheme| scheme.eq_ignore_ascii_case("data:"))
}

fn decode_data_uri(src: &str) -> Result<DataUri, DataUriError> {
    let rest = src.get(5..).ok_or(DataUriError::Malformed)?;
    let (meta, payload) = rest.split_once(',').ok_or(DataUriError::Malformed)?;

    let mut params = meta.split(';');
    let mime_type = params.next().unwrap_or_default().trim().to_ascii_lowercase();
    if !params.any(|p| p.trim().eq_ignore_ascii_case("base64")) {
        return Err(DataUriError::NotBase64);
    }

    let payload: String = payload.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    let data = STANDARD
        .decode(&payload)
        .or_else(|_| STANDARD_NO_PAD.decode(&payload))
        .map_err(|e| DataUriError::Decode(e.to_string()))?;

    Ok(DataUri { mime_type, data })
}

/// File extension for an image MIME type.
fn extension_for(mime_type: &str) -> &str {
    match mime_type.strip_prefix("image/") {
        Some("jpeg") => "jpg",
        Some("svg+xml") => "svg",
        Some(subtype) if !subtype.is_empty() => subtype,
        _ => "bin",
    }
}

fn image_filename(alt: &str, mime_type: &str, index: usize) -> String {
    let ext = extension_for(mime_type);
    let name = sanitize_filename::sanitize(alt);
    if name.trim().is_empty() {
        return format!("image_{}.{}", index, ext);
    }
    if Path::new(&name).extension().is_some() {
        name
    } else {
        format!("{}.{}", name, ext)
    }
}
