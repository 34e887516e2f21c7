//! CoAP message model and wire codec (RFC 7252 section 3).
//!
//! ```text
//!  0                   1                   2                   3
//! |Ver| T |  TKL  |      Code     |          Message ID           |
//! |   Token (if any, TKL bytes) ...
//! |   Options (if any) ...
//! |1 1 1 1 1 1 1 1|    Payload (if any) ...
//! ```

use rand::Rng;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

use super::code::{MessageCode, MessageType};
use super::option::{self, CoapOption};

const VERSION: u8 = 1;
const PAYLOAD_MARKER: u8 = 0xff;
const MAX_TOKEN_LENGTH: usize = 8;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("message is shorter than its header")]
    Truncated,

    #[error("unsupported CoAP version {0}")]
    UnsupportedVersion(u8),

    #[error("token length {0} exceeds 8")]
    InvalidTokenLength(usize),

    #[error("empty message carries a token, options or payload")]
    InvalidEmptyMessage,

    #[error("option delta or length uses the reserved nibble 15")]
    ReservedNibble,

    #[error("option extends past the end of the message")]
    TruncatedOption,

    #[error("option number overflows")]
    OptionNumberOverflow,

    #[error("payload marker is not followed by a payload")]
    EmptyPayload,

    #[error("option {number} value of {length} bytes is too long")]
    OptionTooLong { number: u16, length: usize },
}

/// Request/response matching token, 0 to 8 bytes.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Token {
    length: u8,
    bytes: [u8; MAX_TOKEN_LENGTH],
}

impl Token {
    pub fn new(token: &[u8]) -> Result<Token, CodecError> {
        if token.len() > MAX_TOKEN_LENGTH {
            return Err(CodecError::InvalidTokenLength(token.len()));
        }
        let mut bytes = [0u8; MAX_TOKEN_LENGTH];
        bytes[..token.len()].copy_from_slice(token);
        Ok(Token {
            length: token.len() as u8,
            bytes,
        })
    }

    /// Random 8-byte token.
    pub fn random() -> Token {
        Token {
            length: MAX_TOKEN_LENGTH as u8,
            bytes: rand::thread_rng().gen(),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..usize::from(self.length)]
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.as_bytes() {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Token({self})")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoapMessage {
    pub message_type: MessageType,
    pub code: MessageCode,
    pub message_id: u16,
    pub token: Token,
    options: Vec<CoapOption>,
    pub payload: Vec<u8>,
}

impl CoapMessage {
    pub fn new(message_type: MessageType, code: MessageCode, message_id: u16, token: Token) -> Self {
        Self {
            message_type,
            code,
            message_id,
            token,
            options: Vec::new(),
            payload: Vec::new(),
        }
    }

    /// Empty ACK for a confirmable message.
    pub fn acknowledgement(message_id: u16) -> Self {
        Self::new(MessageType::Acknowledgement, MessageCode::EMPTY, message_id, Token::default())
    }

    /// RST rejecting a message.
    pub fn reset(message_id: u16) -> Self {
        Self::new(MessageType::Reset, MessageCode::EMPTY, message_id, Token::default())
    }

    pub fn is_confirmable(&self) -> bool {
        self.message_type == MessageType::Confirmable
    }

    /// Add an option, keeping options ordered by number and repeated
    /// options in insertion order.
    pub fn add_option(&mut self, option: CoapOption) {
        let position = self
            .options
            .iter()
            .position(|existing| existing.number > option.number)
            .unwrap_or(self.options.len());
        self.options.insert(position, option);
    }

    pub fn with_option(mut self, option: CoapOption) -> Self {
        self.add_option(option);
        self
    }

    pub fn with_payload(mut self, payload: impl Into<Vec<u8>>) -> Self {
        self.payload = payload.into();
        self
    }

    pub fn options(&self) -> &[CoapOption] {
        &self.options
    }

    pub fn option(&self, number: u16) -> Option<&CoapOption> {
        self.options.iter().find(|option| option.number == number)
    }

    pub fn options_of(&self, number: u16) -> impl Iterator<Item = &CoapOption> {
        self.options.iter().filter(move |option| option.number == number)
    }

    pub fn remove_options(&mut self, number: u16) {
        self.options.retain(|option| option.number != number);
    }

    pub fn content_format(&self) -> Option<u16> {
        self.option(option::CONTENT_FORMAT)
            .map(|option| option.as_uint() as u16)
    }

    pub fn max_age(&self) -> Option<Duration> {
        self.option(option::MAX_AGE)
            .map(|option| Duration::from_secs(u64::from(option.as_uint())))
    }

    pub fn observe(&self) -> Option<u32> {
        self.option(option::OBSERVE).map(CoapOption::as_uint)
    }

    pub fn uri_path(&self) -> String {
        let segments: Vec<&str> = self
            .options_of(option::URI_PATH)
            .filter_map(CoapOption::as_string)
            .collect();
        format!("/{}", segments.join("/"))
    }

    pub fn encode(&self) -> Result<Vec<u8>, CodecError> {
        let token = self.token.as_bytes();
        let mut buffer = Vec::with_capacity(4 + token.len() + self.payload.len() + 16);
        buffer.push((VERSION << 6) | (self.message_type.bits() << 4) | token.len() as u8);
        buffer.push(self.code.byte());
        buffer.extend_from_slice(&self.message_id.to_be_bytes());
        buffer.extend_from_slice(token);

        let mut previous = 0u16;
        for option in &self.options {
            let delta = option.number - previous;
            let length = option.value.len();
            if length > usize::from(u16::MAX) + 269 {
                return Err(CodecError::OptionTooLong {
                    number: option.number,
                    length,
                });
            }

            let (delta_nibble, delta_ext) = split_nibble(usize::from(delta));
            let (length_nibble, length_ext) = split_nibble(length);
            buffer.push((delta_nibble << 4) | length_nibble);
            buffer.extend_from_slice(&delta_ext);
            buffer.extend_from_slice(&length_ext);
            buffer.extend_from_slice(&option.value);
            previous = option.number;
        }

        if !self.payload.is_empty() {
            buffer.push(PAYLOAD_MARKER);
            buffer.extend_from_slice(&self.payload);
        }
        Ok(buffer)
    }

    pub fn decode(datagram: &[u8]) -> Result<CoapMessage, CodecError> {
        if datagram.len() < 4 {
            return Err(CodecError::Truncated);
        }

        let version = datagram[0] >> 6;
        if version != VERSION {
            return Err(CodecError::UnsupportedVersion(version));
        }
        let message_type = MessageType::from_bits(datagram[0] >> 4);
        let token_length = usize::from(datagram[0] & 0x0f);
        if token_length > MAX_TOKEN_LENGTH {
            return Err(CodecError::InvalidTokenLength(token_length));
        }
        let code = MessageCode::from_byte(datagram[1]);
        let message_id = u16::from_be_bytes([datagram[2], datagram[3]]);

        let token = datagram
            .get(4..4 + token_length)
            .ok_or(CodecError::Truncated)
            .and_then(Token::new)?;
        let mut message = CoapMessage::new(message_type, code, message_id, token);

        let mut rest = &datagram[4 + token_length..];
        let mut number = 0u16;
        while let Some((&first, tail)) = rest.split_first() {
            if first == PAYLOAD_MARKER {
                if tail.is_empty() {
                    return Err(CodecError::EmptyPayload);
                }
                message.payload = tail.to_vec();
                break;
            }

            let (delta, tail) = read_extended(first >> 4, tail)?;
            let (length, tail) = read_extended(first & 0x0f, tail)?;
            number = u16::try_from(delta)
                .ok()
                .and_then(|delta| number.checked_add(delta))
                .ok_or(CodecError::OptionNumberOverflow)?;
            let value = tail.get(..length).ok_or(CodecError::TruncatedOption)?;
            message.options.push(CoapOption::new(number, value));
            rest = &tail[length..];
        }

        if code.is_empty() && (!token.is_empty() || !message.options.is_empty() || !message.payload.is_empty()) {
            return Err(CodecError::InvalidEmptyMessage);
        }
        Ok(message)
    }
}

/// Split a delta or length into its nibble and extended bytes.
fn split_nibble(value: usize) -> (u8, Vec<u8>) {
    match value {
        0..=12 => (value as u8, Vec::new()),
        13..=268 => (13, vec![(value - 13) as u8]),
        _ => (14, ((value - 269) as u16).to_be_bytes().to_vec()),
    }
}

fn read_extended(nibble: u8, bytes: &[u8]) -> Result<(usize, &[u8]), CodecError> {
    match nibble {
        0..=12 => Ok((usize::from(nibble), bytes)),
        13 => {
            let (&extended, rest) = bytes.split_first().ok_or(CodecError::TruncatedOption)?;
            Ok((usize::from(extended) + 13, rest))
        }
        14 => {
            let extended = bytes.get(..2).ok_or(CodecError::TruncatedOption)?;
            let value = usize::from(u16::from_be_bytes([extended[0], extended[1]])) + 269;
            Ok((value, &bytes[2..]))
        }
        _ => Err(CodecError::ReservedNibble),
    }
}
