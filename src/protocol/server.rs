//! The database server.
//!
//! One [`DbServer`] owns the accept loop and a [`ServerContext`] holding the
//! engine, the user store, and the live sessions behind a single mutex.
//! Connections are handed to a worker pool; each worker runs a serial
//! receive → dispatch → reply loop so a client's requests are applied in
//! order, while the context mutex serializes catalog changes across clients.
//!
//! Failure policy: contract errors (missing table, duplicate key, denied
//! permission) travel back inside a `QueryResponse` and the connection
//! stays up; malformed frames get an `ErrorResponse` and the connection is
//! dropped; transport errors end the session, rolling back any open
//! transaction.

use std::{
    error::Error,
    net::{SocketAddr, TcpListener, TcpStream},
    path::Path,
    sync::{Arc, Mutex, mpsc},
    thread,
};

use log::{debug, info, warn};

use crate::auth::session::{Session, SessionManager};
use crate::auth::{AuthError, UserStore};
use crate::engine::{Engine, EngineError};
use crate::protocol::client::now_millis;
use crate::protocol::message::Message;
use crate::protocol::query::{Operation, QueryRequest, QueryResponse};
use crate::protocol::transport::{MessageStream, SocketError};
use crate::storage::FileBackend;

use super::ThreadPool;

/// Address the server binds when none is configured.
pub const DEFAULT_ADDRESS: &str = "127.0.0.1:4399";

const ERROR_BAD_REQUEST: u32 = 400;
const ERROR_INVALID_TOKEN: u32 = 401;
const WORKER_COUNT: usize = 15;

/// Everything the handlers share: engine, accounts, live sessions.
pub struct ServerContext {
    pub engine: Engine,
    pub users: UserStore,
    pub sessions: SessionManager,
}

impl ServerContext {
    pub fn new(data_dir: &Path, admin_password: &str) -> Result<Self, Box<dyn Error>> {
        let backend = FileBackend::open(data_dir)?;
        let users = UserStore::open(backend.root(), admin_password)?;
        let engine = Engine::new(Box::new(backend))?;
        Ok(Self {
            engine,
            users,
            sessions: SessionManager::new(),
        })
    }
}

pub struct DbServer {
    address: SocketAddr,
    context: Arc<Mutex<ServerContext>>,
    pool: ThreadPool,
}

impl DbServer {
    pub fn new(
        address: SocketAddr,
        data_dir: &Path,
        admin_password: &str,
    ) -> Result<Self, Box<dyn Error>> {
        let context = ServerContext::new(data_dir, admin_password)?;
        Ok(Self {
            address,
            context: Arc::new(Mutex::new(context)),
            pool: ThreadPool::new(WORKER_COUNT),
        })
    }

    pub fn listen(self) -> Result<(), SocketError> {
        info!("listening at {}", self.address);
        let listener = TcpListener::bind(self.address).map_err(SocketError::BindFailed)?;
        let (sender, receiver) = mpsc::channel();
        let tx = sender.clone();

        ctrlc::set_handler(move || {
            let _ = tx.send(None);
        })
        .expect("failed to set Ctrl-C signal handler.");

        let tx = sender.clone();
        thread::spawn(move || {
            for stream in listener.incoming() {
                match stream {
                    Ok(stream) => {
                        let _ = tx.send(Some(stream));
                    }
                    Err(e) => {
                        info!("broken listener: {e:?}");
                        let _ = tx.send(None);
                        break;
                    }
                }
            }
        });

        while let Ok(event) = receiver.recv() {
            match event {
                Some(stream) => {
                    let context = Arc::clone(&self.context);
                    self.pool.execute(move || {
                        if let Err(e) = handle_connection(stream, context) {
                            warn!("client session ended with error: {e}");
                        }
                    });
                }
                None => {
                    info!("shutting down server.");
                    break;
                }
            }
        }
        Ok(())
    }
}

fn handle_connection(
    stream: TcpStream,
    context: Arc<Mutex<ServerContext>>,
) -> Result<(), SocketError> {
    if let Ok(peer) = stream.peer_addr() {
        debug!("client connected from {peer}");
    }

    let mut transport = MessageStream::new(stream);
    let mut login_token = None;
    let outcome = serve_client(&mut transport, &context, &mut login_token);

    close_session(&context, login_token);
    match outcome {
        // A peer hanging up is the normal end of a session.
        Err(SocketError::ConnectionClosed) => Ok(()),
        other => other,
    }
}

/// Serial request loop for one client. Returns when the client disconnects
/// or a malformed frame forces a drop.
fn serve_client(
    transport: &mut MessageStream<TcpStream>,
    context: &Arc<Mutex<ServerContext>>,
    login_token: &mut Option<String>,
) -> Result<(), SocketError> {
    loop {
        let message = match transport.receive() {
            Ok(message) => message,
            Err(SocketError::Protocol(e)) => {
                warn!("malformed frame from client: {e}");
                let _ = transport.send(&Message::Error {
                    error_message: e.to_string(),
                    error_code: ERROR_BAD_REQUEST,
                });
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        debug!("received {:?}", message.message_type());
        let reply = {
            let mut ctx = context.lock().unwrap();
            dispatch(&mut ctx, message, login_token)
        };
        transport.send(&reply)?;
    }
}

/// Removes the connection's session, rolling back any open transaction.
fn close_session(context: &Arc<Mutex<ServerContext>>, login_token: Option<String>) {
    let Some(token) = login_token else {
        return;
    };
    let mut ctx = context.lock().unwrap();
    let ServerContext {
        engine, sessions, ..
    } = &mut *ctx;
    if let Some(mut session) = sessions.remove(&token) {
        engine.rollback_if_active(&mut session);
    }
}

fn dispatch(
    ctx: &mut ServerContext,
    message: Message,
    login_token: &mut Option<String>,
) -> Message {
    match message {
        Message::LoginRequest { username, password } => {
            match ctx.users.authenticate(&username, &password) {
                Ok(user) => {
                    let user_id = user.user_id;
                    let token = ctx.sessions.create(&username);
                    *login_token = Some(token.clone());
                    Message::LoginSuccess {
                        session_token: token,
                        user_id,
                    }
                }
                Err(e) => {
                    info!("login failed for '{username}'");
                    Message::LoginFailure {
                        error_message: e.to_string(),
                    }
                }
            }
        }
        Message::Ping { timestamp } => Message::Pong {
            original_timestamp: timestamp,
            server_timestamp: now_millis(),
        },
        Message::Query(request) => handle_query(ctx, request),
        other => Message::Error {
            error_message: format!("unsupported message type {:?}", other.message_type()),
            error_code: ERROR_BAD_REQUEST,
        },
    }
}

fn handle_query(ctx: &mut ServerContext, request: QueryRequest) -> Message {
    let ServerContext {
        engine,
        users,
        sessions,
    } = ctx;

    let Some(session) = sessions.get_mut(&request.session_token) else {
        return Message::Error {
            error_message: AuthError::InvalidToken.to_string(),
            error_code: ERROR_INVALID_TOKEN,
        };
    };

    if let Err(e) = users.authorize(&session.user, request.operation, request.object_name()) {
        return Message::QueryResult(QueryResponse::failure(e.to_string()));
    }

    match execute(engine, session, &request) {
        Ok(response) => Message::QueryResult(response),
        Err(e) => Message::QueryResult(QueryResponse::failure(e.to_string())),
    }
}

fn execute(
    engine: &mut Engine,
    session: &mut Session,
    request: &QueryRequest,
) -> Result<QueryResponse, EngineError> {
    let condition = request
        .where_condition
        .as_ref()
        .map(|w| w.to_expression())
        .unwrap_or_default();

    match request.operation {
        Operation::CreateDatabase => {
            engine.create_database(&request.database_name)?;
            Ok(QueryResponse::empty())
        }
        Operation::DropDatabase => {
            engine.drop_database(&request.database_name, session)?;
            Ok(QueryResponse::empty())
        }
        Operation::UseDatabase => {
            engine.use_database(&request.database_name, session)?;
            Ok(QueryResponse::empty())
        }
        Operation::CreateTable => {
            engine.create_table(session, &request.table_name, request.columns.clone())?;
            Ok(QueryResponse::empty())
        }
        Operation::DropTable => {
            engine.drop_table(session, &request.table_name)?;
            Ok(QueryResponse::empty())
        }
        Operation::Insert => {
            let affected = engine.insert(session, &request.table_name, &request.insert_values)?;
            Ok(affected_rows(affected))
        }
        Operation::Select => {
            let result = engine.select(
                session,
                &request.table_name,
                &condition,
                "",
                &request.select_columns,
            )?;
            Ok(QueryResponse::ok(result.columns, result.rows))
        }
        Operation::Update => {
            let affected = engine.update(
                session,
                &request.table_name,
                &request.update_clauses,
                &condition,
            )?;
            Ok(affected_rows(affected))
        }
        Operation::Delete => {
            let affected = engine.delete(session, &request.table_name, &condition)?;
            Ok(affected_rows(affected))
        }
    }
}

fn affected_rows(count: usize) -> QueryResponse {
    QueryResponse::ok(vec!["affected_rows".into()], vec![vec![count.to_string()]])
}
