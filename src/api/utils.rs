//! Request helpers: content type, bounded body reads, identity headers.

use axum::body::Body;
use axum::http::{HeaderMap, header::CONTENT_TYPE};
use bytes::Bytes;
use http_body_util::{BodyExt, LengthLimitError, Limited};

use crate::api::error::ApiError;

pub const TENANT_HEADER: &str = "X-Tenant-ID";
pub const USER_HEADER: &str = "X-User-ID";

/// Caller identity taken from the request headers.
///
/// An empty tenant is an administrative caller that may act on every tenant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub tenant_id: String,
    pub user_id: String,
}

fn header_value(headers: &HeaderMap, name: &str) -> Result<String, ApiError> {
    match headers.get(name) {
        None => Ok(String::new()),
        Some(value) => value
            .to_str()
            .map(|value| value.trim().to_string())
            .map_err(|_| ApiError::InvalidPayload(format!("{name} header must be visible ASCII"))),
    }
}

/// `X-User-ID` is required; `X-Tenant-ID` may be absent.
pub fn identity(headers: &HeaderMap) -> Result<Identity, ApiError> {
    let user_id = header_value(headers, USER_HEADER)?;
    if user_id.is_empty() {
        return Err(ApiError::InvalidPayload(format!("{USER_HEADER} header is required")));
    }

    Ok(Identity {
        tenant_id: header_value(headers, TENANT_HEADER)?,
        user_id,
    })
}

/// Accepts `application/json` with optional parameters.
pub fn parse_content_type(content_type: &str) -> Result<mime::Mime, ApiError> {
    let media_type: mime::Mime = content_type.parse().map_err(|_| {
        ApiError::InvalidPayload(format!("invalid Content-Type: {}", content_type))
    })?;

    if media_type.type_() != mime::APPLICATION || media_type.subtype() != mime::JSON {
        return Err(ApiError::InvalidPayload(format!(
            "Content-Type must be application/json, got: {}/{}",
            media_type.type_(),
            media_type.subtype()
        )));
    }

    Ok(media_type)
}

pub fn require_json(headers: &HeaderMap) -> Result<(), ApiError> {
    let content_type = headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| ApiError::InvalidPayload("missing Content-Type header".into()))?;
    parse_content_type(content_type)?;
    Ok(())
}

/// Collect the (already decompressed) body, refusing more than `max_size` bytes.
pub async fn read_body(body: Body, max_size: usize) -> Result<Bytes, ApiError> {
    match Limited::new(body, max_size).collect().await {
        Ok(collected) => Ok(collected.to_bytes()),
        Err(err) if err.downcast_ref::<LengthLimitError>().is_some() => {
            Err(ApiError::PayloadTooLarge(max_size))
        }
        Err(err) => Err(ApiError::InvalidPayload(format!("failed to read body: {err}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_parse_content_type_valid() {
        assert!(parse_content_type("application/json").is_ok());
        assert!(parse_content_type("application/json; charset=utf-8").is_ok());
        assert!(parse_content_type("application/json; charset=UTF-8").is_ok());
    }

    #[test]
    fn test_parse_content_type_invalid() {
        assert!(parse_content_type("application/jsonp").is_err());
        assert!(parse_content_type("application/json-patch+json").is_err());
        assert!(parse_content_type("text/json").is_err());
        assert!(parse_content_type("invalid").is_err());
        assert!(parse_content_type("").is_err());
    }

    #[test]
    fn test_identity_headers() {
        let mut headers = HeaderMap::new();
        assert!(matches!(identity(&headers), Err(ApiError::InvalidPayload(_))));

        headers.insert(USER_HEADER, HeaderValue::from_static("u1"));
        assert_eq!(
            identity(&headers).unwrap(),
            Identity {
                tenant_id: String::new(),
                user_id: "u1".to_string()
            }
        );

        headers.insert(TENANT_HEADER, HeaderValue::from_static("acme"));
        assert_eq!(identity(&headers).unwrap().tenant_id, "acme");
    }

    #[tokio::test]
    async fn test_read_body_enforces_limit() {
        let body = read_body(Body::from(vec![b'x'; 10]), 10).await.unwrap();
        assert_eq!(body.len(), 10);

        let err = read_body(Body::from(vec![b'x'; 11]), 10).await.unwrap_err();
        assert!(matches!(err, ApiError::PayloadTooLarge(10)));
    }
}
