//! Message framing.
//!
//! Every exchange is one framed message: a fixed 9-byte header (`u32` magic,
//! `u8` type, `u32` payload size) followed by the payload bytes of exactly
//! that size. [`Message`] is the sum type over every message kind; encoding
//! serializes the payload first so the header's size field is exact, and
//! decoding dispatches on the type byte through [`MessageType::from_u8`]
//! rather than any runtime type machinery.

use thiserror::Error;

use super::codec::{Deserializer, SerializationError, Serializer};
use super::query::{QueryRequest, QueryResponse};

/// Sentinel leading every framed message.
pub const MAGIC_NUMBER: u32 = 0xDEADBEEF;

/// Fixed size of the frame header in bytes.
pub const HEADER_SIZE: usize = 9;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("invalid magic number")]
    InvalidMagicNumber,
    #[error("invalid message type 0x{0:02X}")]
    InvalidMessageType(u8),
    #[error("payload size mismatch: header declares {declared} bytes, {available} available")]
    PayloadSizeMismatch { declared: usize, available: usize },
    #[error("failed to deserialize message: {0}")]
    DeserializationFailed(#[from] SerializationError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageType {
    LoginRequest = 0x10,
    LoginSuccess = 0x11,
    LoginFailure = 0x12,
    QueryRequest = 0x20,
    QueryResponse = 0x21,
    PingRequest = 0x30,
    PongResponse = 0x31,
    ErrorResponse = 0x99,
}

impl MessageType {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x10 => Some(Self::LoginRequest),
            0x11 => Some(Self::LoginSuccess),
            0x12 => Some(Self::LoginFailure),
            0x20 => Some(Self::QueryRequest),
            0x21 => Some(Self::QueryResponse),
            0x30 => Some(Self::PingRequest),
            0x31 => Some(Self::PongResponse),
            0x99 => Some(Self::ErrorResponse),
            _ => None,
        }
    }
}

/// The 9-byte frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageHeader {
    pub message_type: MessageType,
    pub payload_size: u32,
}

impl MessageHeader {
    pub fn new(message_type: MessageType, payload_size: u32) -> Self {
        Self {
            message_type,
            payload_size,
        }
    }

    pub fn encode(&self, s: &mut Serializer) {
        s.write_u32(MAGIC_NUMBER);
        s.write_u8(self.message_type as u8);
        s.write_u32(self.payload_size);
    }

    pub fn decode(d: &mut Deserializer) -> Result<Self, ProtocolError> {
        let magic = d.read_u32()?;
        if magic != MAGIC_NUMBER {
            return Err(ProtocolError::InvalidMagicNumber);
        }
        let type_byte = d.read_u8()?;
        let message_type =
            MessageType::from_u8(type_byte).ok_or(ProtocolError::InvalidMessageType(type_byte))?;
        let payload_size = d.read_u32()?;
        Ok(Self {
            message_type,
            payload_size,
        })
    }
}

/// One protocol message, either direction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    LoginRequest {
        username: String,
        password: String,
    },
    LoginSuccess {
        session_token: String,
        user_id: u32,
    },
    LoginFailure {
        error_message: String,
    },
    Query(QueryRequest),
    QueryResult(QueryResponse),
    Ping {
        timestamp: u64,
    },
    Pong {
        original_timestamp: u64,
        server_timestamp: u64,
    },
    Error {
        error_message: String,
        error_code: u32,
    },
}

impl Message {
    pub fn message_type(&self) -> MessageType {
        match self {
            Self::LoginRequest { .. } => MessageType::LoginRequest,
            Self::LoginSuccess { .. } => MessageType::LoginSuccess,
            Self::LoginFailure { .. } => MessageType::LoginFailure,
            Self::Query(_) => MessageType::QueryRequest,
            Self::QueryResult(_) => MessageType::QueryResponse,
            Self::Ping { .. } => MessageType::PingRequest,
            Self::Pong { .. } => MessageType::PongResponse,
            Self::Error { .. } => MessageType::ErrorResponse,
        }
    }

    /// Full frame: payload serialized first, header prepended with the exact
    /// payload size.
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        let mut payload = Serializer::new();
        self.encode_payload(&mut payload)?;

        let mut frame = Serializer::with_capacity(HEADER_SIZE + payload.len());
        MessageHeader::new(self.message_type(), payload.len() as u32).encode(&mut frame);
        frame.write_bytes(payload.as_bytes());
        Ok(frame.into_bytes())
    }

    /// Decodes one full frame. `data` must hold the header and the complete
    /// payload; a shortfall is a [`ProtocolError::PayloadSizeMismatch`].
    pub fn decode(data: &[u8]) -> Result<Self, ProtocolError> {
        let mut d = Deserializer::new(data);
        let header = MessageHeader::decode(&mut d)?;

        let declared = header.payload_size as usize;
        if d.remaining() < declared {
            return Err(ProtocolError::PayloadSizeMismatch {
                declared,
                available: d.remaining(),
            });
        }

        let payload = &data[HEADER_SIZE..HEADER_SIZE + declared];
        let mut d = Deserializer::new(payload);
        let message = Self::decode_payload(header.message_type, &mut d)?;

        if d.remaining() != 0 {
            return Err(ProtocolError::PayloadSizeMismatch {
                declared,
                available: declared - d.remaining(),
            });
        }
        Ok(message)
    }

    fn encode_payload(&self, s: &mut Serializer) -> Result<(), SerializationError> {
        match self {
            Self::LoginRequest { username, password } => {
                s.write_string(username)?;
                s.write_string(password)?;
            }
            Self::LoginSuccess {
                session_token,
                user_id,
            } => {
                s.write_string(session_token)?;
                s.write_u32(*user_id);
            }
            Self::LoginFailure { error_message } => {
                s.write_string(error_message)?;
            }
            Self::Query(request) => request.encode_payload(s)?,
            Self::QueryResult(response) => response.encode_payload(s)?,
            Self::Ping { timestamp } => s.write_u64(*timestamp),
            Self::Pong {
                original_timestamp,
                server_timestamp,
            } => {
                s.write_u64(*original_timestamp);
                s.write_u64(*server_timestamp);
            }
            Self::Error {
                error_message,
                error_code,
            } => {
                s.write_string(error_message)?;
                s.write_u32(*error_code);
            }
        }
        Ok(())
    }

    /// Per-variant payload decoder, keyed by the header's type byte.
    fn decode_payload(
        message_type: MessageType,
        d: &mut Deserializer,
    ) -> Result<Self, ProtocolError> {
        let message = match message_type {
            MessageType::LoginRequest => Self::LoginRequest {
                username: d.read_string()?,
                password: d.read_string()?,
            },
            MessageType::LoginSuccess => Self::LoginSuccess {
                session_token: d.read_string()?,
                user_id: d.read_u32()?,
            },
            MessageType::LoginFailure => Self::LoginFailure {
                error_message: d.read_string()?,
            },
            MessageType::QueryRequest => Self::Query(QueryRequest::decode_payload(d)?),
            MessageType::QueryResponse => Self::QueryResult(QueryResponse::decode_payload(d)?),
            MessageType::PingRequest => Self::Ping {
                timestamp: d.read_u64()?,
            },
            MessageType::PongResponse => Self::Pong {
                original_timestamp: d.read_u64()?,
                server_timestamp: d.read_u64()?,
            },
            MessageType::ErrorResponse => Self::Error {
                error_message: d.read_string()?,
                error_code: d.read_u32()?,
            },
        };
        Ok(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::query::{DataType, LiteralValue, Operation, WhereCondition};

    fn sample_messages() -> Vec<Message> {
        let mut request = QueryRequest::new(Operation::Select);
        request.session_token = "tok".into();
        request.table_name = "users".into();
        request.where_condition = Some(WhereCondition::new(
            "age",
            ">=",
            LiteralValue::new(DataType::Int, "25"),
        ));

        vec![
            Message::LoginRequest {
                username: "admin".into(),
                password: "123456".into(),
            },
            Message::LoginSuccess {
                session_token: "b2c7".into(),
                user_id: 1001,
            },
            Message::LoginFailure {
                error_message: "invalid username or password".into(),
            },
            Message::Query(request),
            Message::QueryResult(QueryResponse::ok(
                vec!["id".into()],
                vec![vec!["1".into()]],
            )),
            Message::QueryResult(QueryResponse::failure("permission denied")),
            Message::Ping { timestamp: 17 },
            Message::Pong {
                original_timestamp: 17,
                server_timestamp: 42,
            },
            Message::Error {
                error_message: "unsupported message type".into(),
                error_code: 400,
            },
        ]
    }

    #[test]
    fn every_variant_round_trips() {
        for message in sample_messages() {
            let encoded = message.encode().unwrap();
            let decoded = Message::decode(&encoded).unwrap();
            assert_eq!(decoded, message);
        }
    }

    #[test]
    fn frame_length_is_header_plus_payload() {
        for message in sample_messages() {
            let encoded = message.encode().unwrap();
            let mut d = Deserializer::new(&encoded);
            let header = MessageHeader::decode(&mut d).unwrap();
            assert_eq!(encoded.len(), HEADER_SIZE + header.payload_size as usize);
        }
    }

    #[test]
    fn login_request_matches_wire_fixture() {
        // Literal bytes from the protocol definition: username "u",
        // password "p".
        let message = Message::LoginRequest {
            username: "u".into(),
            password: "p".into(),
        };
        let expected = [
            0xDE, 0xAD, 0xBE, 0xEF, 0x10, 0x00, 0x00, 0x00, 0x0A, // header
            0x00, 0x00, 0x00, 0x01, 0x75, // "u"
            0x00, 0x00, 0x00, 0x01, 0x70, // "p"
        ];
        assert_eq!(message.encode().unwrap(), expected);
        assert_eq!(Message::decode(&expected).unwrap(), message);
    }

    #[test]
    fn corrupt_magic_is_rejected() {
        let encoded = Message::Ping { timestamp: 1 }.encode().unwrap();
        for i in 0..4 {
            let mut corrupted = encoded.clone();
            corrupted[i] ^= 0xFF;
            assert_eq!(
                Message::decode(&corrupted),
                Err(ProtocolError::InvalidMagicNumber),
                "flipping header byte {i} must invalidate the magic"
            );
        }
    }

    #[test]
    fn unknown_type_byte_is_rejected() {
        let mut encoded = Message::Ping { timestamp: 1 }.encode().unwrap();
        encoded[4] = 0x55;
        assert_eq!(
            Message::decode(&encoded),
            Err(ProtocolError::InvalidMessageType(0x55))
        );
    }

    #[test]
    fn truncated_frames_are_rejected() {
        let encoded = Message::LoginRequest {
            username: "admin".into(),
            password: "123456".into(),
        }
        .encode()
        .unwrap();

        // Below the header: the header decode itself runs dry.
        assert_eq!(
            Message::decode(&encoded[..5]),
            Err(ProtocolError::DeserializationFailed(
                SerializationError::InsufficientData
            ))
        );

        // Header intact, payload short of the declared size.
        let declared = encoded.len() - HEADER_SIZE;
        assert_eq!(
            Message::decode(&encoded[..encoded.len() - 3]),
            Err(ProtocolError::PayloadSizeMismatch {
                declared,
                available: declared - 3,
            })
        );
    }

    #[test]
    fn oversized_payload_string_is_rejected() {
        // Hand-build a LOGIN_FAILURE frame declaring a > 1 MiB string.
        let mut s = Serializer::new();
        MessageHeader::new(MessageType::LoginFailure, 4).encode(&mut s);
        s.write_u32(2 * 1024 * 1024);
        assert_eq!(
            Message::decode(s.as_bytes()),
            Err(ProtocolError::DeserializationFailed(
                SerializationError::StringTooLong
            ))
        );
    }
}
