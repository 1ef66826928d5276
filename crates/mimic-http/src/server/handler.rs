//! Request handling: hyper request in, synthesized response out.

use super::body::HookedBody;
use super::AppState;
use crate::hooks::HookContext;
use crate::matcher;
use crate::request::IncomingRequest;
use crate::response::SynthesizedResponse;
use crate::rule::Header;
use bytes::Bytes;
use http_body_util::BodyExt;
use hyper::body::Incoming;
use hyper::ext::ReasonPhrase;
use hyper::header::{HeaderName, HeaderValue};
use hyper::{Request, Response, StatusCode, Version};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{debug, warn};

pub async fn handle_request(
    req: Request<Incoming>,
    state: Arc<AppState>,
    client_addr: SocketAddr,
) -> Result<Response<HookedBody>, Infallible> {
    let request = read_request(req, client_addr).await;

    // One snapshot per request: a concurrent reload never changes it
    let rules = state.store.snapshot();
    let rule = matcher::select(&rules, &request);
    let synthesized = state.synthesizer.respond(rule, &request).await;
    drop(rules);

    debug!(
        client = %client_addr,
        first_line = %request.first_line(),
        status = synthesized.status,
        keep_alive = synthesized.keep_alive,
        "Request served"
    );

    let mut body = HookedBody::new(synthesized.body.clone());
    if state.hooks.is_enabled() {
        body = body.with_hook(
            Arc::clone(&state.hooks),
            HookContext::new(&request, &synthesized),
        );
    }
    Ok(build_response(&synthesized, body))
}

async fn read_request(req: Request<Incoming>, client_addr: SocketAddr) -> IncomingRequest {
    let (parts, incoming) = req.into_parts();

    let path = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/")
        .to_string();
    let headers = parts
        .headers
        .iter()
        .map(|(name, value)| {
            Header::new(
                name.as_str(),
                String::from_utf8_lossy(value.as_bytes()).into_owned(),
            )
        })
        .collect();

    let body = match incoming.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            warn!(client = %client_addr, error = %e, "Failed to read request body");
            Bytes::new()
        }
    };

    IncomingRequest::new(
        parts.method.as_str(),
        path,
        protocol_name(parts.version),
        headers,
        body,
    )
}

fn protocol_name(version: Version) -> &'static str {
    match version {
        Version::HTTP_09 => "HTTP/0.9",
        Version::HTTP_10 => "HTTP/1.0",
        Version::HTTP_2 => "HTTP/2.0",
        Version::HTTP_3 => "HTTP/3.0",
        _ => "HTTP/1.1",
    }
}

/// Turn a synthesized response into a hyper response. Headers that are not
/// valid on the wire are logged and left out.
pub fn build_response(synthesized: &SynthesizedResponse, body: HookedBody) -> Response<HookedBody> {
    let mut response = Response::new(body);

    *response.status_mut() = StatusCode::from_u16(synthesized.status).unwrap_or_else(|_| {
        warn!(status = synthesized.status, "Invalid status code, answering 500");
        StatusCode::INTERNAL_SERVER_ERROR
    });

    if let Some(message) = &synthesized.message {
        match ReasonPhrase::try_from(message.clone().into_bytes()) {
            Ok(reason) => {
                response.extensions_mut().insert(reason);
            }
            Err(_) => warn!(message = %message, "Invalid reason phrase, using the default"),
        }
    }

    let headers = response.headers_mut();
    for header in &synthesized.headers {
        match (
            HeaderName::from_bytes(header.name.as_bytes()),
            HeaderValue::from_str(&header.value),
        ) {
            (Ok(name), Ok(value)) => {
                headers.append(name, value);
            }
            _ => warn!(header = %header.name, value = %header.value, "Skipping invalid response header"),
        }
    }

    response
}
