//! Line-oriented parser for request/response dumps.
//!
//! A dump is a sequence of pairs:
//!
//! ```text
//! GET /users/* HTTP/1.1
//! Accept: application/json
//!
//! HTTP/1.1 200 OK
//! Content-Type: application/json
//!
//! {"id": 1}
//! ```
//!
//! Header order and duplicates are kept verbatim. Bodies are joined with `\n`
//! and lose their trailing blank lines, which act as pair separators.

use super::DumpError;
use crate::rule::{Header, RequestPattern, ResponseTemplate, Rule, StatusLine};
use regex::Regex;
use std::sync::{Arc, OnceLock};

static REQUEST_LINE: OnceLock<Regex> = OnceLock::new();
static STATUS_LINE: OnceLock<Regex> = OnceLock::new();

fn request_line_regex() -> &'static Regex {
    REQUEST_LINE.get_or_init(|| {
        Regex::new(r"^[A-Z*?]+[ \t]+\S+[ \t]+(?:HTTP|\*|\?)\S*$").expect("valid request line regex")
    })
}

fn status_line_regex() -> &'static Regex {
    STATUS_LINE.get_or_init(|| {
        Regex::new(r"^(HTTP/\d+(?:\.\d+)?)[ \t]+(\d{3})(?:[ \t]+(.*))?$")
            .expect("valid status line regex")
    })
}

fn is_request_line(line: &str) -> bool {
    !is_status_line(line) && request_line_regex().is_match(line.trim())
}

fn is_status_line(line: &str) -> bool {
    status_line_regex().is_match(line.trim())
}

fn is_comment(line: &str) -> bool {
    let line = line.trim_start();
    line.starts_with('#') || line.starts_with("//")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Start,
    RequestHeaders,
    RequestBody,
    ResponseHeaders,
    ResponseBody,
}

#[derive(Default)]
struct PendingPair {
    line: usize,
    first_line: String,
    request_headers: Vec<Header>,
    request_body: Vec<String>,
    status: Option<StatusLine>,
    response_headers: Vec<Header>,
    response_body: Vec<String>,
}

impl PendingPair {
    fn start(line: usize, first_line: &str) -> Self {
        Self {
            line,
            first_line: normalize_first_line(first_line),
            ..Default::default()
        }
    }

    fn finish(self, source: &Arc<str>) -> Result<Rule, DumpError> {
        let status = self.status.ok_or_else(|| DumpError::Syntax {
            line: self.line,
            reason: "request has no response".to_string(),
        })?;
        let request = RequestPattern::new(
            self.first_line,
            self.request_headers,
            join_body(self.request_body),
        )
        .map_err(|source| DumpError::Pattern {
            line: self.line,
            source,
        })?;
        let response = ResponseTemplate {
            status,
            headers: self.response_headers,
            body: join_body(self.response_body),
        };
        Ok(Rule::new(request, response, Arc::clone(source)))
    }
}

/// Collapse the separators between tokens of a request line to single spaces,
/// so the pattern lines up with how incoming first lines are rendered.
fn normalize_first_line(line: &str) -> String {
    line.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn join_body(mut lines: Vec<String>) -> String {
    while lines.last().is_some_and(|l| l.trim().is_empty()) {
        lines.pop();
    }
    lines.join("\n")
}

fn parse_header(line: &str, line_no: usize) -> Result<Header, DumpError> {
    let (name, value) = line.split_once(':').ok_or_else(|| DumpError::Syntax {
        line: line_no,
        reason: format!("expected 'Name: value' header, found {line:?}"),
    })?;
    let name = name.trim();
    if name.is_empty() || name.contains(char::is_whitespace) {
        return Err(DumpError::Syntax {
            line: line_no,
            reason: format!("invalid header name {name:?}"),
        });
    }
    Ok(Header::new(name, value.trim()))
}

fn parse_status_line(line: &str, line_no: usize) -> Result<StatusLine, DumpError> {
    let caps = status_line_regex()
        .captures(line.trim())
        .ok_or_else(|| DumpError::Syntax {
            line: line_no,
            reason: format!("invalid status line {line:?}"),
        })?;
    let code = caps[2].parse::<u16>().map_err(|_| DumpError::Syntax {
        line: line_no,
        reason: format!("invalid status code {:?}", &caps[2]),
    })?;
    let message = caps
        .get(3)
        .map(|m| m.as_str().trim().to_string())
        .filter(|m| !m.is_empty());
    Ok(StatusLine {
        protocol: caps[1].to_string(),
        code,
        message,
    })
}

/// Parse a whole dump into rules, in file order.
pub fn parse_dump(source: &Arc<str>, text: &str) -> Result<Vec<Rule>, DumpError> {
    let mut rules = Vec::new();
    let mut state = State::Start;
    let mut pending: Option<PendingPair> = None;

    for (index, line) in text.lines().enumerate() {
        let line_no = index + 1;

        match state {
            State::Start => {
                if line.trim().is_empty() || is_comment(line) {
                    continue;
                }
                if !is_request_line(line) {
                    return Err(DumpError::Syntax {
                        line: line_no,
                        reason: format!("expected request line, found {line:?}"),
                    });
                }
                pending = Some(PendingPair::start(line_no, line));
                state = State::RequestHeaders;
            }
            State::RequestHeaders | State::RequestBody => {
                let pair = pending.as_mut().ok_or_else(|| DumpError::Syntax {
                    line: line_no,
                    reason: "request section without a request line".to_string(),
                })?;
                if is_status_line(line) {
                    pair.status = Some(parse_status_line(line, line_no)?);
                    state = State::ResponseHeaders;
                } else if state == State::RequestBody {
                    pair.request_body.push(line.to_string());
                } else if line.trim().is_empty() {
                    state = State::RequestBody;
                } else {
                    pair.request_headers.push(parse_header(line, line_no)?);
                }
            }
            State::ResponseHeaders | State::ResponseBody => {
                if is_request_line(line) {
                    if let Some(pair) = pending.take() {
                        rules.push(pair.finish(source)?);
                    }
                    pending = Some(PendingPair::start(line_no, line));
                    state = State::RequestHeaders;
                    continue;
                }
                let pair = pending.as_mut().ok_or_else(|| DumpError::Syntax {
                    line: line_no,
                    reason: "response section without a request".to_string(),
                })?;
                if state == State::ResponseBody {
                    pair.response_body.push(line.to_string());
                } else if line.trim().is_empty() {
                    state = State::ResponseBody;
                } else {
                    pair.response_headers.push(parse_header(line, line_no)?);
                }
            }
        }
    }

    if let Some(pair) = pending {
        rules.push(pair.finish(source)?);
    }

    Ok(rules)
}
