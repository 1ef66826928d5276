//! Request matching against the loaded rules.
//!
//! Rules are scanned in load order and the first one whose first line,
//! headers and body all match wins.

use crate::request::{IncomingRequest, ProvidedHeaders};
use crate::rule::{RequestPattern, Rule, RuleSet};
use tracing::debug;

/// Find the first matching rule, without considering the fallback.
pub fn find_match<'a>(rules: &'a RuleSet, request: &IncomingRequest) -> Option<&'a Rule> {
    let first_line = request.first_line();
    rules.rules().iter().enumerate().find_map(|(index, rule)| {
        if pattern_matches(
            &rule.request,
            &first_line,
            &request.provided_headers,
            request.body_text(),
        ) {
            debug!(index, source = %rule.source, pattern = %rule.request.first_line, "Rule matched");
            Some(rule)
        } else {
            None
        }
    })
}

/// Matching rule, or the fallback rule when nothing matches.
pub fn select<'a>(rules: &'a RuleSet, request: &IncomingRequest) -> Option<&'a Rule> {
    find_match(rules, request).or_else(|| {
        debug!(first_line = %request.first_line(), "No rule matched, using fallback");
        rules.fallback()
    })
}

pub fn pattern_matches(
    pattern: &RequestPattern,
    first_line: &str,
    provided: &ProvidedHeaders,
    body: &str,
) -> bool {
    pattern.first_line_pattern().matches(first_line)
        && headers_match(pattern, provided)
        && body_matches(&pattern.body, body)
}

/// Every required value must match at least one provided value of the same
/// header. A required header that is absent fails the match.
fn headers_match(pattern: &RequestPattern, provided: &ProvidedHeaders) -> bool {
    pattern.required_headers().all(|(name, required)| {
        let Some(candidates) = provided.get(name) else {
            return false;
        };
        required
            .iter()
            .all(|value| candidates.iter().any(|candidate| value.matches(candidate)))
    })
}

/// An empty body pattern matches anything; otherwise trimmed bodies must be equal.
fn body_matches(pattern: &str, body: &str) -> bool {
    let pattern = pattern.trim();
    pattern.is_empty() || pattern == body.trim()
}
