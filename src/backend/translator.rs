//! Protocol-independent part of request translation.
//!
//! Method whitelisting, payload rules and the accept list are the same for
//! every back-end; adapters only encode the result in their wire format.

use axum::http::Method;
use bytes::Bytes;
use url::Url;

use super::adapter::TranslationError;
use crate::dispatch::ProxyRequest;
use crate::rdf::Language;

/// Methods that can be forwarded to an origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestMethod {
    Get,
    Post,
    Put,
    Delete,
}

impl RequestMethod {
    pub fn carries_payload(self) -> bool {
        matches!(self, RequestMethod::Post | RequestMethod::Put)
    }
}

impl TryFrom<&Method> for RequestMethod {
    type Error = TranslationError;

    fn try_from(method: &Method) -> Result<Self, Self::Error> {
        match *method {
            Method::GET => Ok(RequestMethod::Get),
            Method::POST => Ok(RequestMethod::Post),
            Method::PUT => Ok(RequestMethod::Put),
            Method::DELETE => Ok(RequestMethod::Delete),
            _ => Err(TranslationError::MethodNotAllowed(method.clone())),
        }
    }
}

/// A proxy request checked and reduced to what an origin needs.
#[derive(Debug, Clone)]
pub struct PreparedRequest {
    pub method: RequestMethod,
    pub origin: Url,
    /// Present only for POST/PUT with a non-empty body.
    pub payload: Option<Bytes>,
    /// Language of the payload, when the client declared a supported one.
    pub payload_language: Option<Language>,
    /// Languages offered to the origin, always in the same order.
    pub accept: [Language; 3],
}

/// Validate the method and apply the payload rules.
///
/// GET and DELETE never carry a body; a supplied one is dropped.
pub fn prepare(
    request: &ProxyRequest,
    origin: &Url,
    scheme: &str,
) -> Result<PreparedRequest, TranslationError> {
    let method = RequestMethod::try_from(request.method())?;

    if origin.scheme() != scheme {
        return Err(TranslationError::InvalidTarget {
            uri: origin.to_string(),
            reason: format!("expected a {scheme} URI"),
        });
    }
    if origin.host().is_none() {
        return Err(TranslationError::InvalidTarget {
            uri: origin.to_string(),
            reason: "missing host".to_string(),
        });
    }

    let payload = if method.carries_payload() {
        request.body().cloned()
    } else {
        if request.body().is_some() {
            tracing::debug!(origin = %origin, method = %request.method(), "Dropping body of bodiless method");
        }
        None
    };
    let payload_language = payload
        .as_ref()
        .and(request.content_type())
        .and_then(Language::from_mime_type);

    Ok(PreparedRequest {
        method,
        origin: origin.clone(),
        payload,
        payload_language,
        accept: Language::ACCEPT_PRIORITY,
    })
}
