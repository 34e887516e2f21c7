//! CoAP message types, codes and the CoAP → HTTP status map.

use axum::http::StatusCode;
use std::fmt;

/// Message type from the header's `T` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    Confirmable,
    NonConfirmable,
    Acknowledgement,
    Reset,
}

impl MessageType {
    pub fn from_bits(bits: u8) -> MessageType {
        match bits & 0x03 {
            0 => MessageType::Confirmable,
            1 => MessageType::NonConfirmable,
            2 => MessageType::Acknowledgement,
            _ => MessageType::Reset,
        }
    }

    pub fn bits(self) -> u8 {
        match self {
            MessageType::Confirmable => 0,
            MessageType::NonConfirmable => 1,
            MessageType::Acknowledgement => 2,
            MessageType::Reset => 3,
        }
    }
}

/// Code byte, `class.detail` with a 3-bit class and 5-bit detail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MessageCode(u8);

impl MessageCode {
    pub const EMPTY: MessageCode = MessageCode::new(0, 0);

    pub const GET: MessageCode = MessageCode::new(0, 1);
    pub const POST: MessageCode = MessageCode::new(0, 2);
    pub const PUT: MessageCode = MessageCode::new(0, 3);
    pub const DELETE: MessageCode = MessageCode::new(0, 4);

    pub const CREATED: MessageCode = MessageCode::new(2, 1);
    pub const DELETED: MessageCode = MessageCode::new(2, 2);
    pub const VALID: MessageCode = MessageCode::new(2, 3);
    pub const CHANGED: MessageCode = MessageCode::new(2, 4);
    pub const CONTENT: MessageCode = MessageCode::new(2, 5);

    pub const BAD_REQUEST: MessageCode = MessageCode::new(4, 0);
    pub const UNAUTHORIZED: MessageCode = MessageCode::new(4, 1);
    pub const BAD_OPTION: MessageCode = MessageCode::new(4, 2);
    pub const FORBIDDEN: MessageCode = MessageCode::new(4, 3);
    pub const NOT_FOUND: MessageCode = MessageCode::new(4, 4);
    pub const METHOD_NOT_ALLOWED: MessageCode = MessageCode::new(4, 5);
    pub const NOT_ACCEPTABLE: MessageCode = MessageCode::new(4, 6);
    pub const PRECONDITION_FAILED: MessageCode = MessageCode::new(4, 12);
    pub const REQUEST_ENTITY_TOO_LARGE: MessageCode = MessageCode::new(4, 13);
    pub const UNSUPPORTED_CONTENT_FORMAT: MessageCode = MessageCode::new(4, 15);

    pub const INTERNAL_SERVER_ERROR: MessageCode = MessageCode::new(5, 0);
    pub const NOT_IMPLEMENTED: MessageCode = MessageCode::new(5, 1);
    pub const BAD_GATEWAY: MessageCode = MessageCode::new(5, 2);
    pub const SERVICE_UNAVAILABLE: MessageCode = MessageCode::new(5, 3);
    pub const GATEWAY_TIMEOUT: MessageCode = MessageCode::new(5, 4);
    pub const PROXYING_NOT_SUPPORTED: MessageCode = MessageCode::new(5, 5);

    pub const fn new(class: u8, detail: u8) -> MessageCode {
        MessageCode(((class & 0x07) << 5) | (detail & 0x1f))
    }

    pub const fn from_byte(byte: u8) -> MessageCode {
        MessageCode(byte)
    }

    pub const fn byte(self) -> u8 {
        self.0
    }

    pub const fn class(self) -> u8 {
        self.0 >> 5
    }

    pub const fn detail(self) -> u8 {
        self.0 & 0x1f
    }

    pub fn is_empty(self) -> bool {
        self == MessageCode::EMPTY
    }

    pub fn is_request(self) -> bool {
        self.class() == 0 && !self.is_empty()
    }

    pub fn is_response(self) -> bool {
        (2..=5).contains(&self.class())
    }

    pub fn is_success(self) -> bool {
        self.class() == 2
    }

    pub fn is_error(self) -> bool {
        matches!(self.class(), 4 | 5)
    }

    /// HTTP status for a response code. Total: unmapped error codes are 502.
    pub fn to_http_status(self) -> StatusCode {
        match (self.class(), self.detail()) {
            (2, 1) => StatusCode::CREATED,
            (2, 2) | (2, 4) => StatusCode::NO_CONTENT,
            (2, 3) => StatusCode::NOT_MODIFIED,
            (2, _) => StatusCode::OK,
            (4, 0) | (4, 2) => StatusCode::BAD_REQUEST,
            (4, 1) => StatusCode::UNAUTHORIZED,
            (4, 3) => StatusCode::FORBIDDEN,
            (4, 4) => StatusCode::NOT_FOUND,
            (4, 5) => StatusCode::METHOD_NOT_ALLOWED,
            (4, 6) => StatusCode::NOT_ACCEPTABLE,
            (4, 12) => StatusCode::PRECONDITION_FAILED,
            (4, 13) => StatusCode::PAYLOAD_TOO_LARGE,
            (4, 15) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            (5, 0) => StatusCode::INTERNAL_SERVER_ERROR,
            (5, 1) => StatusCode::NOT_IMPLEMENTED,
            (5, 3) => StatusCode::SERVICE_UNAVAILABLE,
            (5, 4) => StatusCode::GATEWAY_TIMEOUT,
            _ => StatusCode::BAD_GATEWAY,
        }
    }

    fn reason(self) -> Option<&'static str> {
        let reason = match (self.class(), self.detail()) {
            (0, 0) => "Empty",
            (0, 1) => "GET",
            (0, 2) => "POST",
            (0, 3) => "PUT",
            (0, 4) => "DELETE",
            (2, 1) => "Created",
            (2, 2) => "Deleted",
            (2, 3) => "Valid",
            (2, 4) => "Changed",
            (2, 5) => "Content",
            (4, 0) => "Bad Request",
            (4, 1) => "Unauthorized",
            (4, 2) => "Bad Option",
            (4, 3) => "Forbidden",
            (4, 4) => "Not Found",
            (4, 5) => "Method Not Allowed",
            (4, 6) => "Not Acceptable",
            (4, 12) => "Precondition Failed",
            (4, 13) => "Request Entity Too Large",
            (4, 15) => "Unsupported Content-Format",
            (5, 0) => "Internal Server Error",
            (5, 1) => "Not Implemented",
            (5, 2) => "Bad Gateway",
            (5, 3) => "Service Unavailable",
            (5, 4) => "Gateway Timeout",
            (5, 5) => "Proxying Not Supported",
            _ => return None,
        };
        Some(reason)
    }
}

impl fmt::Display for MessageCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}", self.class(), self.detail())?;
        if let Some(reason) = self.reason() {
            write!(f, " {reason}")?;
        }
        Ok(())
    }
}
