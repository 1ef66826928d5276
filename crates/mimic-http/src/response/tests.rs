//! Tests for response synthesis.

use super::*;
use crate::dump;
use std::time::Instant;
use tracing_test::traced_test;

fn rule_from(dump_text: &str) -> Rule {
    dump::load("test.txt", dump_text)
        .into_iter()
        .next()
        .expect("dump has one rule")
}

fn get(path: &str, headers: Vec<Header>) -> IncomingRequest {
    IncomingRequest::new("GET", path, "HTTP/1.1", headers, Bytes::new())
}

fn header_names(response: &SynthesizedResponse) -> Vec<String> {
    response.headers.iter().map(|h| h.name.clone()).collect()
}

#[tokio::test]
async fn test_literal_body_and_default_headers() {
    let rule = rule_from("GET / HTTP/1.1\n\nHTTP/1.1 201 Created\nContent-Type: text/plain\n\nhello\n");
    let response = Synthesizer::default().synthesize(&rule, &get("/", vec![])).await;

    assert_eq!(response.status, 201);
    assert_eq!(response.message.as_deref(), Some("Created"));
    assert_eq!(&response.body[..], b"hello");
    assert_eq!(response.header("content-type"), Some("text/plain"));
    assert_eq!(response.header("X-Powered-By"), Some(POWERED_BY));
    assert_eq!(response.header("Content-Length"), Some("5"));
    assert!(response.header("ETag").is_some());
}

#[tokio::test]
async fn test_directive_headers_never_forwarded() {
    let rule = rule_from(
        "GET / HTTP/1.1\n\
         X-Request-Delay: 1\n\
         \n\
         HTTP/1.1 200 OK\n\
         x-body-type: text/unknown\n\
         X-REQUEST-DELAY: 1\n\
         x-Response-Delay: 1\n\
         X-Custom: kept\n\
         \n\
         body\n",
    );
    let response = Synthesizer::default().synthesize(&rule, &get("/", vec![])).await;

    assert_eq!(
        header_names(&response),
        vec!["X-Custom", "X-Powered-By", "Content-Length", "ETag"]
    );
    assert_eq!(&response.body[..], b"body");
}

#[traced_test]
#[tokio::test]
async fn test_transfer_encoding_dropped_with_log() {
    let rule = rule_from("GET / HTTP/1.1\n\nHTTP/1.1 200 OK\nTransfer-Encoding: chunked\nX-Custom: kept\n\nbody\n");
    let response = Synthesizer::default().synthesize(&rule, &get("/", vec![])).await;

    assert!(response.header("Transfer-Encoding").is_none());
    assert_eq!(response.header("X-Custom"), Some("kept"));
    assert_eq!(response.header("Content-Length"), Some("4"));
    assert!(logs_contain("Dropping Transfer-Encoding"));
}

#[tokio::test]
async fn test_powered_by_from_rule_is_kept() {
    let rule = rule_from("GET / HTTP/1.1\n\nHTTP/1.1 200 OK\nx-powered-by: Legacy\n\n");
    let response = Synthesizer::default().synthesize(&rule, &get("/", vec![])).await;
    assert_eq!(response.header("X-Powered-By"), Some("Legacy"));
    assert_eq!(
        response
            .headers
            .iter()
            .filter(|h| h.is("x-powered-by"))
            .count(),
        1
    );
}

#[tokio::test]
async fn test_duplicate_headers_preserved_in_order() {
    let rule = rule_from("GET / HTTP/1.1\n\nHTTP/1.1 200 OK\nSet-Cookie: a=1\nSet-Cookie: b=2\n\n");
    let response = Synthesizer::default().synthesize(&rule, &get("/", vec![])).await;
    let cookies: Vec<&str> = response
        .headers
        .iter()
        .filter(|h| h.is("set-cookie"))
        .map(|h| h.value.as_str())
        .collect();
    assert_eq!(cookies, vec!["a=1", "b=2"]);
}

#[tokio::test]
async fn test_explicit_content_length_is_kept() {
    let rule = rule_from("GET / HTTP/1.1\n\nHTTP/1.1 200 OK\nContent-Length: 2\n\nok\n");
    let response = Synthesizer::default().synthesize(&rule, &get("/", vec![])).await;
    assert_eq!(
        response
            .headers
            .iter()
            .filter(|h| h.is("content-length"))
            .count(),
        1
    );
}

#[tokio::test]
async fn test_etag_round_trip_yields_304() {
    let rule = rule_from("GET / HTTP/1.1\n\nHTTP/1.1 200 OK\n\nstable body\n");
    let synthesizer = Synthesizer::default();

    let first = synthesizer.synthesize(&rule, &get("/", vec![])).await;
    let second = synthesizer.synthesize(&rule, &get("/", vec![])).await;
    let etag = first.header("ETag").unwrap().to_string();
    assert_eq!(second.header("ETag"), Some(etag.as_str()));
    assert_eq!(etag, etag::compute(b"stable body"));

    let conditional = synthesizer
        .synthesize(&rule, &get("/", vec![Header::new("If-None-Match", etag.clone())]))
        .await;
    assert_eq!(conditional.status, 304);
    assert!(conditional.header("ETag").is_none());

    let mismatched = synthesizer
        .synthesize(&rule, &get("/", vec![Header::new("If-None-Match", "\"nope\"")]))
        .await;
    assert_eq!(mismatched.status, 200);
    assert_eq!(mismatched.header("ETag"), Some(etag.as_str()));
}

#[tokio::test]
async fn test_etag_disabled() {
    let rule = rule_from("GET / HTTP/1.1\n\nHTTP/1.1 200 OK\n\nbody\n");
    let synthesizer = Synthesizer::new(SynthesisOptions { no_etag: true });
    let etag = etag::compute(b"body");

    let response = synthesizer
        .synthesize(&rule, &get("/", vec![Header::new("If-None-Match", etag)]))
        .await;
    assert_eq!(response.status, 200);
    assert!(response.header("ETag").is_none());
}

#[tokio::test]
async fn test_template_body_uses_parameters() {
    let rule = rule_from(
        "GET /greet?* HTTP/1.1\n\nHTTP/1.1 200 OK\nX-Body-Type: text/template\n\nHello {{ name }}\n",
    );
    let response = Synthesizer::default()
        .synthesize(&rule, &get("/greet?name=World", vec![]))
        .await;
    assert_eq!(&response.body[..], b"Hello World");
    assert_eq!(response.header("Content-Length"), Some("11"));
}

#[tokio::test]
async fn test_broken_template_degrades_to_empty_body() {
    let rule = rule_from("GET / HTTP/1.1\n\nHTTP/1.1 200 OK\nX-Body-Type: text/template\n\n{% if %}\n");
    let response = Synthesizer::default().synthesize(&rule, &get("/", vec![])).await;
    assert_eq!(response.status, 200);
    assert!(response.body.is_empty());
}

#[tokio::test]
async fn test_data_uri_overrides_content_type() {
    let rule = rule_from(
        "GET / HTTP/1.1\n\n\
         HTTP/1.1 200 OK\n\
         Content-Type: application/octet-stream\n\
         X-Body-Type: text/uri-list\n\
         \n\
         data:text/plain;charset=UTF-8;base64,SGVsbG8=\n",
    );
    let response = Synthesizer::default().synthesize(&rule, &get("/", vec![])).await;
    assert_eq!(&response.body[..], b"Hello");
    assert_eq!(
        response.header("Content-Type"),
        Some("text/plain; charset=UTF-8")
    );
    assert_eq!(response.header("Content-Length"), Some("5"));
}

#[tokio::test]
async fn test_data_uri_without_mime_keeps_content_type() {
    let rule = rule_from(
        "GET / HTTP/1.1\n\nHTTP/1.1 200 OK\nContent-Type: text/html\nX-Body-Type: text/uri-list\n\ndata:,<p>hi</p>\n",
    );
    let response = Synthesizer::default().synthesize(&rule, &get("/", vec![])).await;
    assert_eq!(&response.body[..], b"<p>hi</p>");
    assert_eq!(response.header("Content-Type"), Some("text/html"));
}

#[tokio::test]
async fn test_unsupported_uri_scheme_falls_back_to_literal() {
    let rule = rule_from(
        "GET / HTTP/1.1\n\nHTTP/1.1 200 OK\nX-Body-Type: text/uri-list\n\nftp://example.com/file\n",
    );
    let response = Synthesizer::default().synthesize(&rule, &get("/", vec![])).await;
    assert_eq!(&response.body[..], b"ftp://example.com/file");
}

#[tokio::test]
async fn test_unknown_body_type_is_literal() {
    let rule = rule_from("GET / HTTP/1.1\n\nHTTP/1.1 200 OK\nX-Body-Type: text/markdown\n\n# title\n");
    let response = Synthesizer::default().synthesize(&rule, &get("/", vec![])).await;
    assert_eq!(&response.body[..], b"# title");
}

#[tokio::test]
async fn test_delays_are_cumulative() {
    let rule = rule_from(
        "GET / HTTP/1.1\n\nHTTP/1.1 200 OK\nX-Request-Delay: 50\nX-Response-Delay: 30\n\nslow\n",
    );
    let start = Instant::now();
    let response = Synthesizer::default().synthesize(&rule, &get("/", vec![])).await;
    assert!(start.elapsed() >= Duration::from_millis(80));
    assert_eq!(&response.body[..], b"slow");
}

#[tokio::test]
async fn test_keep_alive_flag() {
    let rule = rule_from("GET / HTTP/1.1\n\nHTTP/1.1 200 OK\nConnection: keep-alive\n\n");
    let response = Synthesizer::default().synthesize(&rule, &get("/", vec![])).await;
    assert!(response.keep_alive);
    assert_eq!(response.header("Connection"), Some("keep-alive"));
}

#[tokio::test]
async fn test_no_rule_is_bare_400() {
    let response = Synthesizer::default().respond(None, &get("/", vec![])).await;
    assert_eq!(response.status, 400);
    assert!(response.body.is_empty());
    assert!(response.headers.is_empty());
}

#[test]
fn test_body_type_from_directive() {
    assert_eq!(BodyType::from_directive(None), BodyType::Literal);
    assert_eq!(
        BodyType::from_directive(Some("TEXT/TEMPLATE")),
        BodyType::Template
    );
    assert_eq!(
        BodyType::from_directive(Some("text/uri-list")),
        BodyType::UriList
    );
    assert_eq!(
        BodyType::from_directive(Some("application/json")),
        BodyType::Unsupported("application/json".to_string())
    );
}

#[test]
fn test_set_header_replaces_first_and_drops_duplicates() {
    let mut headers = vec![
        Header::new("content-type", "a"),
        Header::new("X", "1"),
        Header::new("Content-Type", "b"),
    ];
    set_header(&mut headers, "Content-Type", "c".to_string());
    assert_eq!(
        headers,
        vec![Header::new("content-type", "c"), Header::new("X", "1")]
    );
}
