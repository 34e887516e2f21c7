//! CoAP option numbers, content formats and option value encoding.

use crate::rdf::Language;

pub const URI_HOST: u16 = 3;
pub const OBSERVE: u16 = 6;
pub const URI_PORT: u16 = 7;
pub const URI_PATH: u16 = 11;
pub const CONTENT_FORMAT: u16 = 12;
pub const MAX_AGE: u16 = 14;
pub const URI_QUERY: u16 = 15;
pub const ACCEPT: u16 = 17;

/// Content-Format registry entries for the RDF languages.
pub mod content_format {
    pub const RDF_XML: u16 = 201;
    pub const N3: u16 = 202;
    pub const TURTLE: u16 = 203;
}

/// Default CoAP port. A Uri-Port option is only sent for other ports.
pub const DEFAULT_PORT: u16 = 5683;

/// A single option as it appears in a message, sorted by number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoapOption {
    pub number: u16,
    pub value: Vec<u8>,
}

impl CoapOption {
    pub fn new(number: u16, value: impl Into<Vec<u8>>) -> Self {
        Self {
            number,
            value: value.into(),
        }
    }

    pub fn uint(number: u16, value: u32) -> Self {
        Self::new(number, encode_uint(value))
    }

    pub fn string(number: u16, value: &str) -> Self {
        Self::new(number, value.as_bytes())
    }

    pub fn as_uint(&self) -> u32 {
        decode_uint(&self.value)
    }

    pub fn as_string(&self) -> Option<&str> {
        std::str::from_utf8(&self.value).ok()
    }
}

/// Shortest big-endian encoding of an unsigned option value (0 is empty).
pub fn encode_uint(value: u32) -> Vec<u8> {
    let bytes = value.to_be_bytes();
    let skip = bytes.iter().take_while(|byte| **byte == 0).count();
    bytes[skip..].to_vec()
}

/// Decode an unsigned option value; excess leading bytes are ignored.
pub fn decode_uint(value: &[u8]) -> u32 {
    value
        .iter()
        .rev()
        .take(4)
        .rev()
        .fold(0u32, |acc, byte| (acc << 8) | u32::from(*byte))
}

pub fn language_for(content_format: u16) -> Option<Language> {
    match content_format {
        content_format::RDF_XML => Some(Language::RdfXml),
        content_format::N3 => Some(Language::N3),
        content_format::TURTLE => Some(Language::Turtle),
        _ => None,
    }
}

pub fn format_for(language: Language) -> u16 {
    match language {
        Language::RdfXml => content_format::RDF_XML,
        Language::N3 => content_format::N3,
        Language::Turtle => content_format::TURTLE,
    }
}

/// Name of a content format for log and error messages.
pub fn describe_format(content_format: u16) -> String {
    match content_format {
        0 => "text/plain".to_string(),
        40 => "application/link-format".to_string(),
        41 => "application/xml".to_string(),
        42 => "application/octet-stream".to_string(),
        50 => "application/json".to_string(),
        other => match language_for(other) {
            Some(language) => language.mime_type().to_string(),
            None => format!("content format {other}"),
        },
    }
}
