//! Blocking client connection.
//!
//! [`DbClient`] owns one TCP connection and the session token the server
//! issued for it. The flow is strictly request/response: `login` first, then
//! any number of `execute` calls, each of which stamps the stored token into
//! the outgoing request.

use std::net::{SocketAddr, TcpStream};
use std::time::{SystemTime, UNIX_EPOCH};

use log::debug;
use thiserror::Error;

use crate::Command;
use crate::protocol::message::Message;
use crate::protocol::query::{QueryRequest, QueryResponse};
use crate::protocol::transport::{MessageStream, SocketError};

#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Socket(#[from] SocketError),
    #[error("login rejected: {0}")]
    LoginRejected(String),
    #[error("not authenticated, log in first")]
    NotAuthenticated,
    #[error("server error {code}: {message}")]
    Server { message: String, code: u32 },
    #[error("unexpected message from server: {0:?}")]
    UnexpectedMessage(Box<Message>),
}

pub struct DbClient {
    transport: MessageStream<TcpStream>,
    session_token: Option<String>,
}

impl DbClient {
    /// Connects to `address` (`host:port`).
    pub fn connect(address: &str) -> Result<Self, ClientError> {
        let address: SocketAddr = address
            .parse()
            .map_err(|_| SocketError::InvalidAddress(address.to_string()))?;
        let stream = TcpStream::connect(address).map_err(SocketError::SocketCreateFailed)?;
        debug!("connected to {address}");
        Ok(Self {
            transport: MessageStream::new(stream),
            session_token: None,
        })
    }

    pub fn is_authenticated(&self) -> bool {
        self.session_token.is_some()
    }

    pub fn clear_authentication(&mut self) {
        self.session_token = None;
    }

    /// Performs the login exchange; on success the returned user id is the
    /// server-side account id and the token is kept for later requests.
    pub fn login(&mut self, username: &str, password: &str) -> Result<u32, ClientError> {
        self.transport.send(&Message::LoginRequest {
            username: username.to_string(),
            password: password.to_string(),
        })?;

        match self.transport.receive()? {
            Message::LoginSuccess {
                session_token,
                user_id,
            } => {
                self.session_token = Some(session_token);
                Ok(user_id)
            }
            Message::LoginFailure { error_message } => {
                Err(ClientError::LoginRejected(error_message))
            }
            other => Err(ClientError::UnexpectedMessage(Box::new(other))),
        }
    }

    /// Sends one command and waits for its result.
    pub fn execute(&mut self, command: Command) -> Result<QueryResponse, ClientError> {
        let mut request: QueryRequest = command.into();
        request.session_token = self
            .session_token
            .clone()
            .ok_or(ClientError::NotAuthenticated)?;

        self.transport.send(&Message::Query(request))?;
        match self.transport.receive()? {
            Message::QueryResult(response) => Ok(response),
            Message::Error {
                error_message,
                error_code,
            } => Err(ClientError::Server {
                message: error_message,
                code: error_code,
            }),
            other => Err(ClientError::UnexpectedMessage(Box::new(other))),
        }
    }

    /// Heartbeat; returns the server's timestamp from the pong.
    pub fn ping(&mut self) -> Result<u64, ClientError> {
        let timestamp = now_millis();
        self.transport.send(&Message::Ping { timestamp })?;
        match self.transport.receive()? {
            Message::Pong {
                server_timestamp, ..
            } => Ok(server_timestamp),
            Message::Error {
                error_message,
                error_code,
            } => Err(ClientError::Server {
                message: error_message,
                code: error_code,
            }),
            other => Err(ClientError::UnexpectedMessage(Box::new(other))),
        }
    }
}

pub(crate) fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
