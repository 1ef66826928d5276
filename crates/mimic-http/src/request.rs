//! Snapshot of an incoming request, as seen by matching and synthesis.

use crate::rule::{split_header_values, Header};
use bytes::Bytes;
use indexmap::IndexMap;

/// Request headers keyed by lower-cased name. Each raw value is split on
/// commas and repeated header lines accumulate into the same list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProvidedHeaders {
    values: IndexMap<String, Vec<String>>,
}

impl ProvidedHeaders {
    pub fn collect<'a>(headers: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let mut values: IndexMap<String, Vec<String>> = IndexMap::new();
        for (name, raw) in headers {
            values
                .entry(name.to_ascii_lowercase())
                .or_default()
                .extend(split_header_values(raw).map(str::to_string));
        }
        Self { values }
    }

    pub fn get(&self, name: &str) -> Option<&[String]> {
        self.values
            .get(&name.to_ascii_lowercase())
            .map(Vec::as_slice)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.values
            .iter()
            .map(|(name, values)| (name.as_str(), values.as_slice()))
    }
}

/// Query-string and form parameters, in arrival order, multi-valued.
pub type Parameters = IndexMap<String, Vec<String>>;

/// Everything the engine needs from a request once its body has been read.
#[derive(Debug, Clone)]
pub struct IncomingRequest {
    /// Upper-cased method.
    pub method: String,
    /// Path including the query string.
    pub path: String,
    pub protocol: String,
    /// Raw header lines as received.
    pub headers: Vec<Header>,
    pub body: Bytes,
    pub provided_headers: ProvidedHeaders,
    pub parameters: Parameters,
    body_text: String,
}

impl IncomingRequest {
    pub fn new(
        method: &str,
        path: impl Into<String>,
        protocol: impl Into<String>,
        headers: Vec<Header>,
        body: Bytes,
    ) -> Self {
        let path = path.into();
        let body_text = String::from_utf8_lossy(&body).into_owned();
        let provided_headers =
            ProvidedHeaders::collect(headers.iter().map(|h| (h.name.as_str(), h.value.as_str())));

        let mut parameters = Parameters::new();
        if let Some((_, query)) = path.split_once('?') {
            parse_parameters(query, &mut parameters);
        }
        let is_form = headers.iter().any(|h| {
            h.is("Content-Type") && h.value.trim_start().starts_with("application/x-www-form-urlencoded")
        });
        if is_form {
            parse_parameters(&body_text, &mut parameters);
        }

        Self {
            method: method.trim().to_ascii_uppercase(),
            path,
            protocol: protocol.into(),
            headers,
            body,
            provided_headers,
            parameters,
            body_text,
        }
    }

    /// `METHOD PATH PROTOCOL`, the subject for first-line patterns.
    pub fn first_line(&self) -> String {
        format!("{} {} {}", self.method, self.path, self.protocol)
    }

    /// Body decoded as UTF-8 (lossy).
    pub fn body_text(&self) -> &str {
        &self.body_text
    }

    /// First raw value of a header, case-insensitive.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|h| h.is(name))
            .map(|h| h.value.as_str())
    }
}

/// Parse `a=1&b=2&a=3` style input into `parameters`, percent-decoding names
/// and values and treating `+` as a space.
pub fn parse_parameters(input: &str, parameters: &mut Parameters) {
    for pair in input.split('&').filter(|p| !p.is_empty()) {
        let (name, value) = pair.split_once('=').unwrap_or((pair, ""));
        parameters
            .entry(decode_component(name))
            .or_default()
            .push(decode_component(value));
    }
}

fn decode_component(raw: &str) -> String {
    let raw = raw.replace('+', " ");
    match urlencoding::decode(&raw) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => raw,
    }
}
