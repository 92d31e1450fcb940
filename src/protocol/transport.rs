//! Exact-length message transport.
//!
//! [`MessageStream`] wraps any bidirectional byte stream and moves whole
//! frames across it: a send is one encode followed by a write-all loop, a
//! receive is exactly [`HEADER_SIZE`] bytes, then exactly the payload size
//! the header declares. Short reads and writes are retried until the count
//! is met; a zero-length read mid-frame is reported as
//! [`SocketError::ConnectionClosed`].

use std::io::{self, Read, Write};

use thiserror::Error;

use super::codec::Deserializer;
use super::message::{HEADER_SIZE, Message, MessageHeader, ProtocolError};

#[derive(Debug, Error)]
pub enum SocketError {
    #[error("failed to create socket: {0}")]
    SocketCreateFailed(#[source] io::Error),
    #[error("invalid address '{0}'")]
    InvalidAddress(String),
    #[error("failed to bind address: {0}")]
    BindFailed(#[source] io::Error),
    #[error("failed to listen: {0}")]
    ListenFailed(#[source] io::Error),
    #[error("failed to accept client: {0}")]
    AcceptFailed(#[source] io::Error),
    #[error("failed to send: {0}")]
    SendFailed(#[source] io::Error),
    #[error("failed to receive: {0}")]
    RecvFailed(#[source] io::Error),
    #[error("connection closed by peer")]
    ConnectionClosed,
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

/// Frame-oriented wrapper over a blocking byte stream.
pub struct MessageStream<T: Read + Write> {
    stream: T,
}

impl<T: Read + Write> MessageStream<T> {
    pub fn new(stream: T) -> Self {
        Self { stream }
    }

    pub fn get_ref(&self) -> &T {
        &self.stream
    }

    pub fn send(&mut self, message: &Message) -> Result<(), SocketError> {
        let frame = message.encode()?;
        self.write_all_bytes(&frame)
    }

    pub fn receive(&mut self) -> Result<Message, SocketError> {
        let mut frame = vec![0u8; HEADER_SIZE];
        self.read_exact_bytes(&mut frame)?;

        // Validate the header before trusting its payload size.
        let header = MessageHeader::decode(&mut Deserializer::new(&frame))?;

        let payload_size = header.payload_size as usize;
        if payload_size > 0 {
            frame.resize(HEADER_SIZE + payload_size, 0);
            self.read_exact_bytes(&mut frame[HEADER_SIZE..])?;
        }

        Ok(Message::decode(&frame)?)
    }

    fn read_exact_bytes(&mut self, buffer: &mut [u8]) -> Result<(), SocketError> {
        let mut filled = 0;
        while filled < buffer.len() {
            match self.stream.read(&mut buffer[filled..]) {
                Ok(0) => return Err(SocketError::ConnectionClosed),
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(SocketError::RecvFailed(e)),
            }
        }
        Ok(())
    }

    fn write_all_bytes(&mut self, data: &[u8]) -> Result<(), SocketError> {
        let mut written = 0;
        while written < data.len() {
            match self.stream.write(&data[written..]) {
                Ok(0) => {
                    return Err(SocketError::SendFailed(io::ErrorKind::WriteZero.into()));
                }
                Ok(n) => written += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(SocketError::SendFailed(e)),
            }
        }
        self.stream.flush().map_err(SocketError::SendFailed)
    }
}
