//! Embedded favicon.

use async_trait::async_trait;
use axum::http::{Method, StatusCode};

use crate::dispatch::{PageResponse, ProxyRequest, WebPage};

static ICON: &[u8] = include_bytes!("../../assets/favicon.ico");

pub struct Favicon;

#[async_trait]
impl WebPage for Favicon {
    async fn respond(&self, request: &ProxyRequest) -> PageResponse {
        if request.method() != Method::GET {
            return PageResponse::text(
                StatusCode::METHOD_NOT_ALLOWED,
                format!("Method {} is not allowed.", request.method()),
            );
        }
        PageResponse::ok("image/x-icon", ICON)
    }
}
