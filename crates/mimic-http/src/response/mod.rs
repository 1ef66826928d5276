//! Response synthesis for matched rules.
//!
//! Steps, in order: directive extraction, outgoing header assembly,
//! request delay, body resolution, response delay, content headers, ETag.
//!
//! ## Module Structure
//!
//! - `fetch`: `file:` / `http(s):` / `data:` URI bodies
//! - `template`: `text/template` bodies
//! - `etag`: entity tag hashing

pub mod etag;
pub mod fetch;
pub mod template;

use crate::request::IncomingRequest;
use crate::rule::{is_directive_header, Header, Rule};
use bytes::Bytes;
use fetch::{first_uri, FetchedBody, Fetcher};
use std::time::Duration;
use tracing::{debug, warn};

/// Product identifier injected as `X-Powered-By`.
pub const POWERED_BY: &str = concat!("Mimic/", env!("CARGO_PKG_VERSION"));

/// How the response body text of a rule is interpreted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BodyType {
    Literal,
    Template,
    UriList,
    Unsupported(String),
}

impl BodyType {
    pub fn from_directive(directive: Option<&str>) -> Self {
        match directive {
            None => BodyType::Literal,
            Some(value) if value.eq_ignore_ascii_case("text/template") => BodyType::Template,
            Some(value) if value.eq_ignore_ascii_case("text/uri-list") => BodyType::UriList,
            Some(value) => BodyType::Unsupported(value.to_string()),
        }
    }
}

/// Final status, headers and body handed to the transport.
#[derive(Debug, Clone)]
pub struct SynthesizedResponse {
    pub status: u16,
    pub message: Option<String>,
    pub protocol: String,
    pub headers: Vec<Header>,
    pub body: Bytes,
    /// The rule asked for `Connection: keep-alive`. Informational: the rule's
    /// `Connection` header is forwarded as-is and hyper keeps or closes the
    /// connection according to it.
    pub keep_alive: bool,
}

impl SynthesizedResponse {
    /// Bare `400` with an empty body, used when no rule and no fallback exist.
    pub fn bad_request() -> Self {
        Self {
            status: 400,
            message: None,
            protocol: "HTTP/1.1".to_string(),
            headers: Vec::new(),
            body: Bytes::new(),
            keep_alive: false,
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|h| h.is(name))
            .map(|h| h.value.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SynthesisOptions {
    pub no_etag: bool,
}

/// Builds responses from rules.
#[derive(Debug, Clone, Default)]
pub struct Synthesizer {
    options: SynthesisOptions,
    fetcher: Fetcher,
}

impl Synthesizer {
    pub fn new(options: SynthesisOptions) -> Self {
        Self {
            options,
            fetcher: Fetcher::new(),
        }
    }

    pub async fn respond(&self, rule: Option<&Rule>, request: &IncomingRequest) -> SynthesizedResponse {
        match rule {
            Some(rule) => self.synthesize(rule, request).await,
            None => SynthesizedResponse::bad_request(),
        }
    }

    pub async fn synthesize(&self, rule: &Rule, request: &IncomingRequest) -> SynthesizedResponse {
        let directives = rule.directives();
        let template = &rule.response;

        let mut headers: Vec<Header> = template
            .headers
            .iter()
            .filter(|h| {
                if is_directive_header(&h.name) {
                    return false;
                }
                if h.is("Transfer-Encoding") {
                    debug!(
                        value = %h.value,
                        "Dropping Transfer-Encoding from rule, the body is re-framed on send"
                    );
                    return false;
                }
                true
            })
            .cloned()
            .collect();
        if !has_header(&headers, "X-Powered-By") {
            headers.push(Header::new("X-Powered-By", POWERED_BY));
        }

        if directives.request_delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(directives.request_delay_ms)).await;
        }

        let body_type = BodyType::from_directive(directives.body_type.as_deref());
        let resolved = self.resolve_body(&body_type, &template.body, request).await;

        if directives.response_delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(directives.response_delay_ms)).await;
        }

        if let Some(mime) = &resolved.mime {
            let content_type = match &resolved.charset {
                Some(charset) => format!("{mime}; charset={charset}"),
                None => mime.clone(),
            };
            set_header(&mut headers, "Content-Type", content_type);
        }
        if !has_header(&headers, "Content-Length") {
            headers.push(Header::new("Content-Length", resolved.bytes.len().to_string()));
        }

        let mut status = template.status.code;
        if !self.options.no_etag {
            let tag = etag::compute(&resolved.bytes);
            if etag::matches(&tag, request.header("If-None-Match")) {
                debug!(etag = %tag, "If-None-Match hit, answering 304");
                status = 304;
            } else {
                set_header(&mut headers, "ETag", tag);
            }
        }

        SynthesizedResponse {
            status,
            message: template.status.message.clone(),
            protocol: template.status.protocol.clone(),
            headers,
            body: resolved.bytes,
            keep_alive: directives.keep_alive,
        }
    }

    /// Resolve the body text according to its type. Every failure falls back
    /// to the literal text (or the partial template output) with a warning.
    pub async fn resolve_body(
        &self,
        body_type: &BodyType,
        text: &str,
        request: &IncomingRequest,
    ) -> FetchedBody {
        match body_type {
            BodyType::Literal => literal(text),
            BodyType::Unsupported(kind) => {
                warn!(body_type = %kind, "Unsupported X-Body-Type, serving body as-is");
                literal(text)
            }
            BodyType::Template => match template::render(text, &request.parameters) {
                Ok(rendered) => literal(&rendered),
                Err(e) => {
                    warn!(error = %e, "Template rendering failed, serving empty body");
                    literal("")
                }
            },
            BodyType::UriList => {
                let uri = first_uri(text).unwrap_or(text);
                match self.fetcher.fetch(uri).await {
                    Ok(fetched) => fetched,
                    Err(e) => {
                        warn!(uri, error = %e, "Failed to resolve X-Body-Type: text/uri-list body, serving it as-is");
                        literal(text)
                    }
                }
            }
        }
    }
}

fn literal(text: &str) -> FetchedBody {
    FetchedBody {
        bytes: Bytes::copy_from_slice(text.as_bytes()),
        mime: None,
        charset: None,
    }
}

fn has_header(headers: &[Header], name: &str) -> bool {
    headers.iter().any(|h| h.is(name))
}

/// Replace the first header with this name (keeping its position) and drop
/// any later duplicates, or append when absent.
fn set_header(headers: &mut Vec<Header>, name: &str, value: String) {
    match headers.iter().position(|h| h.is(name)) {
        Some(index) => {
            headers[index].value = value;
            let mut seen = false;
            headers.retain(|h| {
                if !h.is(name) {
                    return true;
                }
                let keep = !seen;
                seen = true;
                keep
            });
        }
        None => headers.push(Header::new(name, value)),
    }
}

#[cfg(test)]
mod tests;
