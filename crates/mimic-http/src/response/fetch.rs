//! `text/uri-list` response bodies: `file:`, `http(s):` and `data:` URIs.

use base64::Engine;
use bytes::Bytes;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("unsupported URI scheme in {0:?}")]
    UnsupportedScheme(String),
    #[error("invalid URI {uri:?}: {reason}")]
    InvalidUri { uri: String, reason: String },
    #[error("malformed data URI: {0}")]
    MalformedDataUri(String),
    #[error("invalid base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("HTTP fetch failed: {0}")]
    Http(#[from] reqwest::Error),
}

/// Bytes obtained from a URI, plus media type information when the URI carried it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedBody {
    pub bytes: Bytes,
    pub mime: Option<String>,
    pub charset: Option<String>,
}

impl FetchedBody {
    fn raw(bytes: impl Into<Bytes>) -> Self {
        Self {
            bytes: bytes.into(),
            mime: None,
            charset: None,
        }
    }
}

pub type FetchResult = Result<FetchedBody, FetchError>;

/// First URI of a `text/uri-list` document: comment lines (`#`) and blank
/// lines are skipped.
pub fn first_uri(list: &str) -> Option<&str> {
    list.lines()
        .map(str::trim)
        .find(|line| !line.is_empty() && !line.starts_with('#'))
}

/// Resolves URIs to bytes. Holds one shared HTTP client.
#[derive(Debug, Clone)]
pub struct Fetcher {
    client: reqwest::Client,
}

impl Fetcher {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    pub async fn fetch(&self, uri: &str) -> FetchResult {
        if uri.starts_with("data:") {
            decode_data_uri(uri)
        } else if uri.starts_with("file:") {
            read_file_uri(uri).await
        } else if uri.starts_with("http:") || uri.starts_with("https:") {
            let response = self.client.get(uri).send().await?.error_for_status()?;
            Ok(FetchedBody::raw(response.bytes().await?))
        } else {
            Err(FetchError::UnsupportedScheme(uri.to_string()))
        }
    }
}

impl Default for Fetcher {
    fn default() -> Self {
        Self::new()
    }
}

async fn read_file_uri(uri: &str) -> FetchResult {
    let invalid = |reason: String| FetchError::InvalidUri {
        uri: uri.to_string(),
        reason,
    };
    let url = url::Url::parse(uri).map_err(|e| invalid(e.to_string()))?;
    let path = url
        .to_file_path()
        .map_err(|_| invalid("not a local file path".to_string()))?;
    match tokio::fs::read(&path).await {
        Ok(bytes) => Ok(FetchedBody::raw(bytes)),
        Err(source) => Err(FetchError::Io { path, source }),
    }
}

/// Decode an RFC 2397 `data:[<mediatype>][;charset=<enc>][;base64],<data>` URI.
pub fn decode_data_uri(uri: &str) -> FetchResult {
    let rest = uri
        .strip_prefix("data:")
        .ok_or_else(|| FetchError::MalformedDataUri("missing 'data:' prefix".to_string()))?;
    let (meta, data) = rest
        .split_once(',')
        .ok_or_else(|| FetchError::MalformedDataUri("missing ',' separator".to_string()))?;

    let mut mime = None;
    let mut charset = None;
    let mut base64 = false;
    for (index, part) in meta.split(';').map(str::trim).enumerate() {
        if part.is_empty() {
            continue;
        }
        if part.eq_ignore_ascii_case("base64") {
            base64 = true;
        } else if let Some((key, value)) = part.split_once('=') {
            if key.trim().eq_ignore_ascii_case("charset") {
                charset = Some(value.trim().to_string()).filter(|v| !v.is_empty());
            }
        } else if index == 0 {
            mime = Some(part.to_string());
        }
    }

    let bytes = if base64 {
        let payload = urlencoding::decode_binary(data.as_bytes());
        let compact: Vec<u8> = payload
            .iter()
            .copied()
            .filter(|b| !b.is_ascii_whitespace())
            .collect();
        base64::engine::general_purpose::STANDARD.decode(compact)?
    } else {
        urlencoding::decode_binary(data.as_bytes()).into_owned()
    };

    Ok(FetchedBody {
        bytes: Bytes::from(bytes),
        mime,
        charset,
    })
}
