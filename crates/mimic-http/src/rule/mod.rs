//! Rule model for dump-driven stubbing.
//!
//! This module provides:
//! - `Rule`: one request pattern paired with one response template
//! - `RuleSet`: the ordered, immutable collection scanned for every request
//! - `WildcardPattern`: glob matcher used for first lines and header values
//!
//! Rules are built once when a dump is loaded and never mutated afterwards.
//! Reloading produces a brand new `RuleSet`.

mod wildcard;

pub use wildcard::WildcardPattern;

use indexmap::IndexMap;
use std::sync::Arc;
use tracing::warn;

/// Selects how the response body text is interpreted.
pub const BODY_TYPE_HEADER: &str = "X-Body-Type";
/// Milliseconds to wait before the response body is resolved.
pub const REQUEST_DELAY_HEADER: &str = "X-Request-Delay";
/// Milliseconds to wait after the response body is resolved.
pub const RESPONSE_DELAY_HEADER: &str = "X-Response-Delay";

const DIRECTIVE_HEADERS: [&str; 3] = [BODY_TYPE_HEADER, REQUEST_DELAY_HEADER, RESPONSE_DELAY_HEADER];

/// Returns true for the reserved headers that carry engine instructions.
/// They are never forwarded to the client.
pub fn is_directive_header(name: &str) -> bool {
    DIRECTIVE_HEADERS
        .iter()
        .any(|directive| directive.eq_ignore_ascii_case(name))
}

/// A single header line as written in a dump.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub name: String,
    pub value: String,
}

impl Header {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }

    /// Case-insensitive name comparison.
    pub fn is(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
    }
}

/// Response status line: `HTTP/1.1 200 OK`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusLine {
    pub protocol: String,
    pub code: u16,
    pub message: Option<String>,
}

/// Request side of a rule.
#[derive(Debug, Clone)]
pub struct RequestPattern {
    /// `METHOD PATH PROTOCOL`, each token may contain wildcards.
    pub first_line: String,
    pub headers: Vec<Header>,
    pub body: String,
    first_line_pattern: WildcardPattern,
    /// Lower-cased header name -> required value patterns (comma-split).
    /// Every request header of the rule is a requirement, directives included.
    required_headers: IndexMap<String, Vec<WildcardPattern>>,
}

impl RequestPattern {
    pub fn new(
        first_line: impl Into<String>,
        headers: Vec<Header>,
        body: impl Into<String>,
    ) -> Result<Self, regex::Error> {
        let first_line = first_line.into();
        let first_line_pattern = WildcardPattern::compile(&first_line)?;

        let mut required_headers: IndexMap<String, Vec<WildcardPattern>> = IndexMap::new();
        for header in &headers {
            let values = required_headers
                .entry(header.name.to_ascii_lowercase())
                .or_default();
            for value in split_header_values(&header.value) {
                values.push(WildcardPattern::compile(value)?);
            }
        }

        Ok(Self {
            first_line,
            headers,
            body: body.into(),
            first_line_pattern,
            required_headers,
        })
    }

    pub fn first_line_pattern(&self) -> &WildcardPattern {
        &self.first_line_pattern
    }

    pub fn required_headers(&self) -> impl Iterator<Item = (&str, &[WildcardPattern])> {
        self.required_headers
            .iter()
            .map(|(name, values)| (name.as_str(), values.as_slice()))
    }
}

/// Response side of a rule, before any body resolution.
#[derive(Debug, Clone)]
pub struct ResponseTemplate {
    pub status: StatusLine,
    pub headers: Vec<Header>,
    pub body: String,
}

/// Engine instructions extracted from a rule's directive headers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Directives {
    pub body_type: Option<String>,
    pub request_delay_ms: u64,
    pub response_delay_ms: u64,
    pub keep_alive: bool,
}

impl Directives {
    /// Request headers are scanned first, then response headers, so a value on
    /// the response side overwrites one on the request side.
    fn extract(request: &[Header], response: &[Header]) -> Self {
        let mut directives = Self::default();

        for header in request {
            if header.is(REQUEST_DELAY_HEADER) {
                directives.request_delay_ms = parse_delay(header);
            } else if header.is("Connection") {
                directives.keep_alive = header.value.trim().eq_ignore_ascii_case("keep-alive");
            }
        }

        for header in response {
            if header.is(BODY_TYPE_HEADER) {
                directives.body_type = Some(header.value.trim().to_string());
            } else if header.is(REQUEST_DELAY_HEADER) {
                directives.request_delay_ms = parse_delay(header);
            } else if header.is(RESPONSE_DELAY_HEADER) {
                directives.response_delay_ms = parse_delay(header);
            } else if header.is("Connection") {
                directives.keep_alive = header.value.trim().eq_ignore_ascii_case("keep-alive");
            }
        }

        directives
    }
}

fn parse_delay(header: &Header) -> u64 {
    match header.value.trim().parse::<u64>() {
        Ok(ms) => ms,
        Err(_) => {
            warn!(
                header = %header.name,
                value = %header.value,
                "Delay directive is not a non-negative integer, ignoring"
            );
            0
        }
    }
}

/// Split a raw header value on commas, trimming and dropping empty tokens.
pub fn split_header_values(raw: &str) -> impl Iterator<Item = &str> {
    raw.split(',').map(str::trim).filter(|v| !v.is_empty())
}

/// One request/response pair loaded from a dump.
#[derive(Debug, Clone)]
pub struct Rule {
    pub request: RequestPattern,
    pub response: ResponseTemplate,
    /// Dump the rule was loaded from, for logging.
    pub source: Arc<str>,
    directives: Directives,
}

impl Rule {
    pub fn new(request: RequestPattern, response: ResponseTemplate, source: Arc<str>) -> Self {
        let directives = Directives::extract(&request.headers, &response.headers);
        Self {
            request,
            response,
            source,
            directives,
        }
    }

    pub fn directives(&self) -> &Directives {
        &self.directives
    }
}

/// Ordered rules across all dumps. First match wins.
#[derive(Debug, Default)]
pub struct RuleSet {
    rules: Vec<Rule>,
    fallback: Option<usize>,
}

impl RuleSet {
    pub fn new(rules: Vec<Rule>) -> Self {
        let fallback = rules.iter().position(|rule| rule.response.status.code == 400);
        Self { rules, fallback }
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// First rule answering with `400`, served when nothing matches.
    pub fn fallback(&self) -> Option<&Rule> {
        self.fallback.map(|index| &self.rules[index])
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
