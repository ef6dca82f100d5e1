use std::collections::HashMap;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use rand::Rng;
use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::db::Database;
use crate::error::{TrainerError, is_not_found};
use crate::models::{NewUser, Role, User, validate_new_user};

/// Key the signed-in user is persisted under.
pub const SESSION_KEY: &str = "phinpt_user";

#[cfg(test)]
const HASH_COST: u32 = 4;
#[cfg(not(test))]
const HASH_COST: u32 = bcrypt::DEFAULT_COST;

pub fn hash_password(password: &str) -> Result<String> {
    bcrypt::hash(password, HASH_COST).context("Failed to hash password")
}

/// A malformed stored hash counts as a mismatch.
#[must_use]
pub fn verify_password(password: &str, hash: &str) -> bool {
    match bcrypt::verify(password, hash) {
        Ok(matched) => matched,
        Err(e) => {
            warn!(error = %e, "stored password hash could not be verified");
            false
        }
    }
}

/// Resolve `identifier` as a username or an email and check the password.
pub fn authenticate(db: &Database, identifier: &str, password: &str) -> Result<Option<User>> {
    let Some((user, hash)) = db.find_user_credentials(identifier.trim())? else {
        warn!(identifier, "login failed: unknown user");
        return Ok(None);
    };
    if verify_password(password, &hash) {
        Ok(Some(user))
    } else {
        warn!(identifier, "login failed: wrong password");
        Ok(None)
    }
}

/// Validate, hash, and store a new account.
pub fn create_user(db: &Database, user: &NewUser) -> Result<User> {
    validate_new_user(user)?;
    let hash = hash_password(&user.password)?;
    create_user_with_hash(db, user, &hash)
}

/// Store a new account whose password the caller already hashed.
pub fn create_user_with_hash(db: &Database, user: &NewUser, password_hash: &str) -> Result<User> {
    validate_new_user(user)?;
    let created = db.insert_user(user, password_hash)?;
    info!(user_id = %created.id, username = %created.username, role = %created.role, "user created");
    Ok(created)
}

/// Create the first admin account. Refused once any admin exists.
pub fn setup_admin_user(db: &Database, username: &str, email: &str, password: &str) -> Result<User> {
    if db.admin_exists()? {
        bail!(TrainerError::invalid("An admin account already exists"));
    }
    create_user(
        db,
        &NewUser {
            username: username.to_string(),
            email: email.to_string(),
            password: password.to_string(),
            full_name: username.to_string(),
            phone: None,
            role: Role::Admin,
            avatar: None,
            start_date: None,
        },
    )
}

// --- Persisted session slot ---

pub trait SessionSlot {
    fn load(&self) -> Result<Option<User>>;
    fn store(&mut self, user: &User) -> Result<()>;
    fn clear(&mut self) -> Result<()>;
}

fn decode_slot(raw: &str) -> Result<Option<User>> {
    let mut doc: Map<String, Value> =
        serde_json::from_str(raw).context("Session file is not a JSON object")?;
    match doc.remove(SESSION_KEY) {
        Some(Value::Null) | None => Ok(None),
        Some(value) => Ok(Some(
            serde_json::from_value(value).context("Stored session user is malformed")?,
        )),
    }
}

fn encode_slot(user: &User) -> Result<String> {
    let mut doc = Map::new();
    doc.insert(SESSION_KEY.to_string(), serde_json::to_value(user)?);
    Ok(serde_json::to_string_pretty(&doc)?)
}

/// A JSON document on disk holding the user under [`SESSION_KEY`].
pub struct FileSlot {
    path: PathBuf,
}

impl FileSlot {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SessionSlot for FileSlot {
    fn load(&self) -> Result<Option<User>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let raw = std::fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read session file: {}", self.path.display()))?;
        decode_slot(&raw)
    }

    fn store(&mut self, user: &User) -> Result<()> {
        let doc = encode_slot(user)?;
        std::fs::write(&self.path, doc)
            .with_context(|| format!("Failed to write session file: {}", self.path.display()))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&self.path, std::fs::Permissions::from_mode(0o600))
                .context("Failed to set session file permissions")?;
        }
        Ok(())
    }

    fn clear(&mut self) -> Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e)
                .with_context(|| format!("Failed to remove session file: {}", self.path.display())),
        }
    }
}

/// In-process slot holding the same JSON document a [`FileSlot`] would write.
#[derive(Debug, Default)]
pub struct MemorySlot {
    raw: Option<String>,
}

impl MemorySlot {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an arbitrary stored document.
    pub fn with_raw(raw: impl Into<String>) -> Self {
        Self {
            raw: Some(raw.into()),
        }
    }

    #[must_use]
    pub fn raw(&self) -> Option<&str> {
        self.raw.as_deref()
    }
}

impl SessionSlot for MemorySlot {
    fn load(&self) -> Result<Option<User>> {
        self.raw.as_deref().map_or(Ok(None), decode_slot)
    }

    fn store(&mut self, user: &User) -> Result<()> {
        self.raw = Some(encode_slot(user)?);
        Ok(())
    }

    fn clear(&mut self) -> Result<()> {
        self.raw = None;
        Ok(())
    }
}

// --- Auth gate ---

/// The current signed-in user, mirrored to a [`SessionSlot`].
pub struct AuthGate<S: SessionSlot> {
    slot: S,
    user: Option<User>,
}

impl<S: SessionSlot> AuthGate<S> {
    /// Start signed out, ignoring whatever the slot holds.
    pub fn new(slot: S) -> Self {
        Self { slot, user: None }
    }

    /// Start from the persisted user. An unreadable slot means signed out.
    pub fn restore(slot: S) -> Self {
        let user = match slot.load() {
            Ok(user) => user,
            Err(e) => {
                warn!(error = %format!("{e:#}"), "discarding unreadable session");
                None
            }
        };
        Self { slot, user }
    }

    /// On failure neither the current user nor the slot changes.
    pub fn login(&mut self, db: &Database, identifier: &str, password: &str) -> Result<bool> {
        let Some(user) = authenticate(db, identifier, password)? else {
            return Ok(false);
        };
        self.slot.store(&user)?;
        info!(user_id = %user.id, role = %user.role, "signed in");
        self.user = Some(user);
        Ok(true)
    }

    pub fn logout(&mut self) -> Result<()> {
        self.user = None;
        self.slot.clear()
    }

    /// Refresh the persisted user from the store; signs out if the account is gone.
    pub fn revalidate(&mut self, db: &Database) -> Result<()> {
        let Some(id) = self.user.as_ref().map(|u| u.id.clone()) else {
            return Ok(());
        };
        match db.get_user(&id) {
            Ok(fresh) => {
                if self.user.as_ref() != Some(&fresh) {
                    self.slot.store(&fresh)?;
                    self.user = Some(fresh);
                }
                Ok(())
            }
            Err(e) if is_not_found(&e) => {
                warn!(user_id = %id, "session user no longer exists");
                self.logout()
            }
            Err(e) => Err(e),
        }
    }

    #[must_use]
    pub fn user(&self) -> Option<&User> {
        self.user.as_ref()
    }

    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.user.as_ref().is_some_and(User::is_admin)
    }

    pub fn require_user(&self) -> Result<&User> {
        self.user
            .as_ref()
            .context("Not signed in. Run `phinpt login` first.")
    }

    pub fn require_admin(&self) -> Result<&User> {
        let user = self.require_user()?;
        if !user.is_admin() {
            bail!("This command requires an admin account (signed in as '{}')", user.username);
        }
        Ok(user)
    }
}

// --- Bearer sessions ---

fn generate_token() -> String {
    let bytes: [u8; 32] = rand::rng().random();
    bytes
        .iter()
        .fold(String::with_capacity(64), |mut acc: String, b| {
            let _ = write!(acc, "{b:02x}");
            acc
        })
}

/// Bearer tokens handed out by the HTTP server, mapped to user ids.
#[derive(Debug, Default)]
pub struct SessionTable {
    sessions: HashMap<String, String>,
}

impl SessionTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&mut self, user_id: &str) -> String {
        let token = generate_token();
        self.sessions.insert(token.clone(), user_id.to_string());
        token
    }

    #[must_use]
    pub fn resolve(&self, token: &str) -> Option<&str> {
        self.sessions.get(token).map(String::as_str)
    }

    pub fn revoke(&mut self, token: &str) -> bool {
        self.sessions.remove(token).is_some()
    }

    /// Drop every token held by `user_id`.
    pub fn revoke_user(&mut self, user_id: &str) -> usize {
        let before = self.sessions.len();
        self.sessions.retain(|_, owner| owner != user_id);
        before - self.sessions.len()
    }
}
