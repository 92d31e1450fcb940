//! Users, permissions, and the credential store.
//!
//! A [`User`] owns a password digest and a flat list of [`Permission`]
//! records. A record names an operation kind, an object kind, and an object
//! name, where the empty name is a wildcard over every object of that kind.
//! The store persists itself to a single bincode artifact under the data
//! root so accounts survive a server restart; the built-in `admin` user is
//! created on first start and always authorizes.

pub mod session;

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use bincode::config::{BigEndian, Configuration, Fixint};
use bincode::{Decode, Encode, decode_from_slice, encode_to_vec};
use log::{debug, info, warn};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::protocol::query::Operation;

/// Name of the built-in administrator account.
pub const ADMIN_USER: &str = "admin";

/// Reference default password for `admin`; operators are expected to
/// override it at startup.
pub const DEFAULT_ADMIN_PASSWORD: &str = "123456";

const USERS_FILE: &str = "users.db";

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid username or password")]
    InvalidCredentials,
    #[error("invalid or expired session token")]
    InvalidToken,
    #[error("user '{0}' already exists")]
    UserExists(String),
    #[error("user '{0}' does not exist")]
    UnknownUser(String),
    #[error("the built-in '{ADMIN_USER}' user cannot be dropped")]
    ProtectedUser,
    #[error("permission denied: user '{user}' may not {operation} on '{object}'")]
    PermissionDenied {
        user: String,
        operation: Operation,
        object: String,
    },
    #[error("no matching permission record to revoke")]
    PermissionNotFound,
    #[error("failed to persist the user store: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to encode the user store: {0}")]
    Encode(#[from] bincode::error::EncodeError),
    #[error("failed to decode the user store: {0}")]
    Decode(#[from] bincode::error::DecodeError),
}

/// What a permission record applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode)]
pub enum ObjectKind {
    Database,
    Table,
    System,
}

/// Operations a permission record can name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode)]
pub enum PermissionKind {
    CreateDatabase,
    DropDatabase,
    CreateTable,
    DropTable,
    Insert,
    Select,
    Update,
    Delete,
    CreateUser,
    DropUser,
    Grant,
    Revoke,
}

/// One grant: kind × object kind × object name (empty = wildcard).
#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub struct Permission {
    pub kind: PermissionKind,
    pub object: ObjectKind,
    pub object_name: String,
}

impl Permission {
    pub fn new(kind: PermissionKind, object: ObjectKind, object_name: impl Into<String>) -> Self {
        Self {
            kind,
            object,
            object_name: object_name.into(),
        }
    }

    /// Wildcard grant over every object of `object`'s kind.
    pub fn any(kind: PermissionKind, object: ObjectKind) -> Self {
        Self::new(kind, object, "")
    }

    fn grants(&self, kind: PermissionKind, object: ObjectKind, object_name: &str) -> bool {
        self.kind == kind
            && self.object == object
            && (self.object_name.is_empty() || self.object_name == object_name)
    }
}

#[derive(Debug, Clone, Encode, Decode)]
pub struct User {
    pub name: String,
    pub user_id: u32,
    password_hash: String,
    permissions: Vec<Permission>,
}

impl User {
    pub fn permissions(&self) -> &[Permission] {
        &self.permissions
    }
}

/// Maps a wire operation to the permission it requires.
pub fn required_permission(operation: Operation) -> (PermissionKind, ObjectKind) {
    match operation {
        Operation::CreateDatabase => (PermissionKind::CreateDatabase, ObjectKind::Database),
        Operation::DropDatabase => (PermissionKind::DropDatabase, ObjectKind::Database),
        // Selecting a database only requires the right to read it.
        Operation::UseDatabase => (PermissionKind::Select, ObjectKind::Database),
        Operation::CreateTable => (PermissionKind::CreateTable, ObjectKind::Table),
        Operation::DropTable => (PermissionKind::DropTable, ObjectKind::Table),
        Operation::Insert => (PermissionKind::Insert, ObjectKind::Table),
        Operation::Select => (PermissionKind::Select, ObjectKind::Table),
        Operation::Update => (PermissionKind::Update, ObjectKind::Table),
        Operation::Delete => (PermissionKind::Delete, ObjectKind::Table),
    }
}

/// On-disk shape of the store.
#[derive(Debug, Encode, Decode)]
struct StoredUsers {
    users: Vec<User>,
    next_user_id: u32,
}

/// Process-wide account registry, persisted under the data root.
pub struct UserStore {
    path: PathBuf,
    config: Configuration<BigEndian, Fixint>,
    users: HashMap<String, User>,
    next_user_id: u32,
}

impl UserStore {
    /// Loads the store from `root`, creating it (with the default `admin`
    /// account) when absent.
    pub fn open(root: &Path, admin_password: &str) -> Result<Self, AuthError> {
        let path = root.join(USERS_FILE);
        let config = bincode::config::standard()
            .with_big_endian()
            .with_fixed_int_encoding();

        let mut store = if path.is_file() {
            let bytes = fs::read(&path)?;
            let (stored, _): (StoredUsers, _) = decode_from_slice(&bytes, config)?;
            let users = stored
                .users
                .into_iter()
                .map(|user| (user.name.clone(), user))
                .collect();
            Self {
                path,
                config,
                users,
                next_user_id: stored.next_user_id,
            }
        } else {
            Self {
                path,
                config,
                users: HashMap::new(),
                next_user_id: 1001,
            }
        };

        if !store.users.contains_key(ADMIN_USER) {
            store.insert_user(ADMIN_USER, admin_password, admin_permissions());
            store.save()?;
            info!("created default '{ADMIN_USER}' user");
        }
        Ok(store)
    }

    pub fn get(&self, name: &str) -> Option<&User> {
        self.users.get(name)
    }

    /// Verifies credentials. Unknown users and bad passwords produce the
    /// same error so callers cannot enumerate accounts.
    pub fn authenticate(&self, username: &str, password: &str) -> Result<&User, AuthError> {
        let user = self
            .users
            .get(username)
            .ok_or(AuthError::InvalidCredentials)?;
        if user.password_hash != hash_password(password) {
            return Err(AuthError::InvalidCredentials);
        }
        Ok(user)
    }

    /// Checks `username` against the permission `operation` requires for
    /// `object_name`. `admin` always passes.
    pub fn authorize(
        &self,
        username: &str,
        operation: Operation,
        object_name: &str,
    ) -> Result<(), AuthError> {
        if username == ADMIN_USER {
            return Ok(());
        }

        let (kind, object) = required_permission(operation);
        let allowed = self
            .users
            .get(username)
            .is_some_and(|user| {
                user.permissions
                    .iter()
                    .any(|p| p.grants(kind, object, object_name))
            });

        if allowed {
            Ok(())
        } else {
            debug!("denied {operation} on '{object_name}' for '{username}'");
            Err(AuthError::PermissionDenied {
                user: username.to_string(),
                operation,
                object: object_name.to_string(),
            })
        }
    }

    pub fn create_user(&mut self, name: &str, password: &str) -> Result<(), AuthError> {
        if self.users.contains_key(name) {
            return Err(AuthError::UserExists(name.to_string()));
        }
        self.insert_user(name, password, Vec::new());
        self.save()?;
        info!("created user '{name}'");
        Ok(())
    }

    pub fn drop_user(&mut self, name: &str) -> Result<(), AuthError> {
        if name == ADMIN_USER {
            return Err(AuthError::ProtectedUser);
        }
        if self.users.remove(name).is_none() {
            return Err(AuthError::UnknownUser(name.to_string()));
        }
        self.save()?;
        info!("dropped user '{name}'");
        Ok(())
    }

    /// Grants `permission` to `name`. Granting an already-held permission is
    /// a no-op.
    pub fn grant(&mut self, name: &str, permission: Permission) -> Result<(), AuthError> {
        let user = self
            .users
            .get_mut(name)
            .ok_or_else(|| AuthError::UnknownUser(name.to_string()))?;
        if user.permissions.contains(&permission) {
            warn!("user '{name}' already holds {permission:?}");
            return Ok(());
        }
        user.permissions.push(permission);
        self.save()
    }

    pub fn revoke(&mut self, name: &str, permission: &Permission) -> Result<(), AuthError> {
        let user = self
            .users
            .get_mut(name)
            .ok_or_else(|| AuthError::UnknownUser(name.to_string()))?;
        let before = user.permissions.len();
        user.permissions.retain(|p| p != permission);
        if user.permissions.len() == before {
            return Err(AuthError::PermissionNotFound);
        }
        self.save()
    }

    fn insert_user(&mut self, name: &str, password: &str, permissions: Vec<Permission>) {
        let user = User {
            name: name.to_string(),
            user_id: self.next_user_id,
            password_hash: hash_password(password),
            permissions,
        };
        self.next_user_id += 1;
        self.users.insert(name.to_string(), user);
    }

    fn save(&self) -> Result<(), AuthError> {
        let mut users: Vec<User> = self.users.values().cloned().collect();
        users.sort_by(|a, b| a.user_id.cmp(&b.user_id));
        let stored = StoredUsers {
            users,
            next_user_id: self.next_user_id,
        };
        fs::write(&self.path, encode_to_vec(&stored, self.config)?)?;
        Ok(())
    }
}

/// Full grant set for the built-in administrator.
fn admin_permissions() -> Vec<Permission> {
    use PermissionKind::*;

    let mut permissions = vec![
        Permission::any(CreateDatabase, ObjectKind::Database),
        Permission::any(DropDatabase, ObjectKind::Database),
        Permission::any(Select, ObjectKind::Database),
    ];
    for kind in [CreateTable, DropTable, Insert, Select, Update, Delete] {
        permissions.push(Permission::any(kind, ObjectKind::Table));
    }
    for kind in [CreateUser, DropUser, Grant, Revoke] {
        permissions.push(Permission::any(kind, ObjectKind::System));
    }
    permissions
}

fn hash_password(password: &str) -> String {
    format!("{:x}", Sha256::digest(password.as_bytes()))
}
