//! HTTP request/response ↔ `Event` adaptation.
//!
//! The HTTP server itself is a collaborator; this module maps an inbound
//! request (method-agnostic) into an event and a reply event back into a
//! response. Credentials are never forwarded downstream: the `Authorization`
//! header is stripped before the metadata is exposed.

use bytes::Bytes;
use conduit_core::{headers, Cri, Event, Metadata};
use tracing::warn;

use crate::gateway::GatewayError;

/// Adapts an inbound HTTP request into an [`Event`].
///
/// The CRI is derived from the request path: the configured `root_path`
/// prefix is stripped, the remainder must be non-blank, and its first `/`
/// is rewritten into `://`, so `/api/srv/org.acme.Foo/bar` with root `/api`
/// becomes `srv://org.acme.Foo/bar`.
///
/// # Errors
///
/// Fails fast with [`GatewayError::InvalidPath`] when the path does not
/// resolve to a non-blank resource, or with the CRI parse failure.
pub fn adapt_request(
    root_path: &str,
    parts: &http::request::Parts,
    body: Bytes,
) -> Result<Event, GatewayError> {
    let mut metadata = Metadata::new();
    for (name, value) in &parts.headers {
        if name == &http::header::AUTHORIZATION {
            continue;
        }
        match value.to_str() {
            Ok(value) => metadata.put(name.as_str(), value),
            Err(_) => warn!(header = %name, "dropping non-text header value"),
        }
    }

    let path = parts.uri.path();
    let remainder = path.strip_prefix(root_path).unwrap_or(path);
    let remainder = remainder.strip_prefix('/').unwrap_or(remainder);
    if remainder.is_empty() {
        return Err(GatewayError::InvalidPath(path.to_string()));
    }

    let literal = remainder.replacen('/', "://", 1);
    let cri = Cri::parse(&literal)?;
    Ok(Event::with_metadata(cri, metadata, body))
}

/// Adapts a reply [`Event`] into an HTTP response: an error reply maps to
/// 500 with the error message exposed in the error header, a success reply
/// to 200 with the payload and content type.
#[must_use]
pub fn adapt_response(event: &Event) -> http::Response<Bytes> {
    let mut builder = http::Response::builder();
    if let Some(content_type) = event.metadata().get(headers::CONTENT_TYPE) {
        builder = builder.header(http::header::CONTENT_TYPE, content_type);
    }
    let builder = match event.metadata().get(headers::ERROR) {
        Some(message) => builder
            .status(http::StatusCode::INTERNAL_SERVER_ERROR)
            .header(headers::ERROR, message),
        None => builder.status(http::StatusCode::OK),
    };
    builder
        .body(event.data().clone())
        .unwrap_or_else(|_| http::Response::new(event.data().clone()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parts(path: &str, extra_headers: &[(&str, &str)]) -> http::request::Parts {
        let mut builder = http::Request::builder().uri(path);
        for (name, value) in extra_headers {
            builder = builder.header(*name, *value);
        }
        builder.body(()).unwrap().into_parts().0
    }

    #[test]
    fn path_rewrites_into_service_cri() {
        let parts = parts("/api/srv/org.acme.Foo/bar", &[]);
        let event = adapt_request("/api", &parts, Bytes::new()).unwrap();
        assert_eq!(event.cri().to_string(), "srv://org.acme.Foo/bar");
    }

    #[test]
    fn authorization_header_is_stripped() {
        let parts = parts(
            "/api/srv/org.acme.Foo/bar",
            &[("authorization", "Bearer xyz"), ("x-request-id", "r-1")],
        );
        let event = adapt_request("/api", &parts, Bytes::new()).unwrap();
        assert!(!event.metadata().contains("authorization"));
        assert_eq!(event.metadata().get("x-request-id"), Some("r-1"));
    }

    #[test]
    fn blank_remainder_is_rejected() {
        for path in ["/api", "/api/"] {
            let parts = parts(path, &[]);
            assert!(matches!(
                adapt_request("/api", &parts, Bytes::new()),
                Err(GatewayError::InvalidPath(_))
            ));
        }
    }

    #[test]
    fn unrecognized_scheme_segment_is_rejected() {
        let parts = parts("/api/ftp/org.acme.Foo/bar", &[]);
        assert!(matches!(
            adapt_request("/api", &parts, Bytes::new()),
            Err(GatewayError::Address(_))
        ));
    }

    #[test]
    fn success_reply_maps_to_ok_response() {
        let metadata: Metadata = [(headers::CONTENT_TYPE, headers::CONTENT_TYPE_JSON)]
            .into_iter()
            .collect();
        let event = Event::with_metadata(
            Cri::parse("stream://abc@rpc.replies").unwrap(),
            metadata,
            "42",
        );

        let response = adapt_response(&event);
        assert_eq!(response.status(), http::StatusCode::OK);
        assert_eq!(response.body().as_ref(), b"42");
    }

    #[test]
    fn error_reply_maps_to_internal_server_error() {
        let metadata: Metadata = [(headers::ERROR, "it broke")].into_iter().collect();
        let event = Event::with_metadata(
            Cri::parse("stream://abc@rpc.replies").unwrap(),
            metadata,
            "{}",
        );

        let response = adapt_response(&event);
        assert_eq!(response.status(), http::StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            response.headers().get(headers::ERROR).unwrap(),
            "it broke"
        );
    }
}
