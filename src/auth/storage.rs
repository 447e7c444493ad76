//! Encrypted session persistence.
//!
//! The session's cookies are stored encrypted at rest at
//! `~/.config/redeemer/session.enc` (or `$XDG_CONFIG_HOME/redeemer/session.enc`)
//! so a later run can skip the interactive login. Persistence is best-effort:
//! [`SessionStore::load`] and [`SessionStore::save`] never fail the run.

use std::env;
use std::ffi::OsString;
use std::fs;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::{Path, PathBuf};

use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{Key, XChaCha20Poly1305, XNonce};
use rand::RngCore;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use super::{Session, SessionCookie};

const SESSION_FILE_NAME: &str = "session.enc";
const APP_DIR_NAME: &str = "redeemer";
const KEYRING_SERVICE: &str = "redeemer";
const KEYRING_ENTRY_NAME: &str = "session-master-key-v1";
const MASTER_KEY_ENV: &str = "REDEEMER_MASTER_KEY";
const MAGIC: &[u8; 4] = b"RKS1";
const NONCE_LEN: usize = 24;
const KEY_LEN: usize = 32;

/// Persists and restores sessions across process runs.
pub trait SessionStore: Send + Sync {
    /// Restores the last saved session, or `None` when there is nothing usable.
    fn load(&self) -> Option<Session>;

    /// Saves the session. Returns `false` (after logging) on failure.
    fn save(&self, session: &Session) -> bool;
}

/// Errors for persisted session storage operations.
///
/// These stay inside the store; callers only see `None`/`false`.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// No suitable user config directory is available.
    #[error("unable to determine config directory (set XDG_CONFIG_HOME or HOME)")]
    ConfigDirUnavailable,
    /// Filesystem I/O failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),
    /// Serialization/deserialization failed.
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    /// Could not access keychain and no env fallback key was provided.
    #[error(
        "unable to access system keychain for session encryption key; set REDEEMER_MASTER_KEY or configure keychain access"
    )]
    KeychainUnavailable,
    /// Stored payload is not one of ours.
    #[error("persisted session payload is invalid")]
    InvalidPayload,
    /// Encryption failed.
    #[error("failed to encrypt session")]
    EncryptionFailed,
    /// Decryption failed (wrong key or tampered file).
    #[error("failed to decrypt persisted session")]
    DecryptionFailed,
}

#[derive(Debug, serde::Serialize, serde::Deserialize)]
struct StoredSession {
    account: Option<String>,
    cookies: Vec<StoredCookie>,
}

#[derive(Debug, serde::Serialize, serde::Deserialize)]
struct StoredCookie {
    domain: String,
    tailmatch: bool,
    path: String,
    secure: bool,
    expires: u64,
    name: String,
    value: String,
}

impl From<&SessionCookie> for StoredCookie {
    fn from(cookie: &SessionCookie) -> Self {
        Self {
            domain: cookie.domain.clone(),
            tailmatch: cookie.tailmatch,
            path: cookie.path.clone(),
            secure: cookie.secure,
            expires: cookie.expires,
            name: cookie.name.clone(),
            value: cookie.value().to_string(),
        }
    }
}

impl From<StoredCookie> for SessionCookie {
    fn from(stored: StoredCookie) -> Self {
        SessionCookie::new(
            stored.domain,
            stored.tailmatch,
            stored.path,
            stored.secure,
            stored.expires,
            stored.name,
            stored.value,
        )
    }
}

#[derive(Debug, Clone)]
enum KeySource {
    /// `REDEEMER_MASTER_KEY`, else the system keychain.
    Ambient,
    Explicit(String),
}

/// File-backed [`SessionStore`] encrypted with XChaCha20-Poly1305.
#[derive(Debug, Clone)]
pub struct EncryptedSessionStore {
    path: PathBuf,
    key_source: KeySource,
}

impl EncryptedSessionStore {
    /// Creates a store at `path` using the ambient key source.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            key_source: KeySource::Ambient,
        }
    }

    /// Creates a store at the default per-user location.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::ConfigDirUnavailable`] if no config dir is found.
    pub fn at_default_location() -> Result<Self, StorageError> {
        Ok(Self::new(default_session_path()?))
    }

    /// Creates a store with fixed key material instead of env/keychain lookup.
    #[must_use]
    pub fn with_key_material(path: impl Into<PathBuf>, key_material: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            key_source: KeySource::Explicit(key_material.into()),
        }
    }

    /// Location of the encrypted blob.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Removes the persisted session. Returns `true` when a file was deleted.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Io`] when the file exists but cannot be removed.
    pub fn clear(&self) -> Result<bool, StorageError> {
        if !self.path.exists() {
            return Ok(false);
        }
        fs::remove_file(&self.path)?;
        Ok(true)
    }

    fn try_load(&self) -> Result<Option<Session>, StorageError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let key = self.key_material()?;
        let payload = fs::read(&self.path)?;
        let plaintext = decrypt_bytes(&payload, &key)?;
        let stored = serde_json::from_slice::<StoredSession>(&plaintext)?;
        let cookies = stored.cookies.into_iter().map(SessionCookie::from).collect();
        Ok(Some(Session::new(cookies, stored.account)))
    }

    fn try_save(&self, session: &Session) -> Result<(), StorageError> {
        let stored = StoredSession {
            account: session.account().map(str::to_string),
            cookies: session.cookies().iter().map(StoredCookie::from).collect(),
        };
        let plaintext = serde_json::to_vec(&stored)?;
        let key = self.key_material()?;
        let encrypted = encrypt_bytes(&plaintext, &key)?;
        write_atomic(&self.path, &encrypted)
    }

    fn key_material(&self) -> Result<String, StorageError> {
        match &self.key_source {
            KeySource::Explicit(key) => Ok(key.clone()),
            KeySource::Ambient => load_or_create_key(),
        }
    }
}

impl SessionStore for EncryptedSessionStore {
    fn load(&self) -> Option<Session> {
        match self.try_load() {
            Ok(Some(session)) => {
                debug!(
                    path = %self.path.display(),
                    cookies = session.cookies().len(),
                    "restored persisted session"
                );
                Some(session)
            }
            Ok(None) => {
                debug!(path = %self.path.display(), "no persisted session");
                None
            }
            Err(error) => {
                warn!(
                    path = %self.path.display(),
                    error = %error,
                    "ignoring unreadable persisted session"
                );
                None
            }
        }
    }

    fn save(&self, session: &Session) -> bool {
        match self.try_save(session) {
            Ok(()) => {
                info!(path = %self.path.display(), "saved session for future runs");
                true
            }
            Err(error) => {
                warn!(
                    path = %self.path.display(),
                    error = %error,
                    "failed to persist session; continuing"
                );
                false
            }
        }
    }
}

/// Returns the default persisted session path.
///
/// # Errors
///
/// Returns [`StorageError::ConfigDirUnavailable`] if no usable config dir is found.
pub fn default_session_path() -> Result<PathBuf, StorageError> {
    Ok(default_config_dir()?.join(SESSION_FILE_NAME))
}

/// Resolves the per-user config directory for the redeemer.
///
/// # Errors
///
/// Returns [`StorageError::ConfigDirUnavailable`] if no usable config dir is found.
pub fn default_config_dir() -> Result<PathBuf, StorageError> {
    resolve_config_dir(
        sanitize_env_path(env::var_os("XDG_CONFIG_HOME")),
        sanitize_env_path(env::var_os("HOME")),
        sanitize_env_path(env::var_os("APPDATA")),
    )
}

fn sanitize_env_path(value: Option<OsString>) -> Option<PathBuf> {
    let value = value?;
    if value.to_string_lossy().trim().is_empty() {
        return None;
    }
    Some(PathBuf::from(value))
}

fn resolve_config_dir(
    xdg_config_home: Option<PathBuf>,
    home: Option<PathBuf>,
    app_data: Option<PathBuf>,
) -> Result<PathBuf, StorageError> {
    if let Some(xdg) = xdg_config_home {
        return Ok(xdg.join(APP_DIR_NAME));
    }
    if let Some(home) = home {
        return Ok(home.join(".config").join(APP_DIR_NAME));
    }
    if let Some(app_data) = app_data {
        return Ok(app_data.join(APP_DIR_NAME));
    }
    Err(StorageError::ConfigDirUnavailable)
}

fn load_or_create_key() -> Result<String, StorageError> {
    if let Some(from_env) = env::var_os(MASTER_KEY_ENV) {
        let key = from_env.to_string_lossy().trim().to_string();
        if !key.is_empty() {
            return Ok(key);
        }
    }

    // keyring backends can panic on headless systems without a secret service.
    let entry = catch_unwind(|| keyring::Entry::new(KEYRING_SERVICE, KEYRING_ENTRY_NAME))
        .map_err(|_| StorageError::KeychainUnavailable)?
        .map_err(|_| StorageError::KeychainUnavailable)?;

    let existing = catch_unwind(AssertUnwindSafe(|| entry.get_password()))
        .map_err(|_| StorageError::KeychainUnavailable)?;
    if let Ok(existing) = existing
        && !existing.trim().is_empty()
    {
        return Ok(existing);
    }

    let generated = generate_key_material();
    catch_unwind(AssertUnwindSafe(|| entry.set_password(&generated)))
        .map_err(|_| StorageError::KeychainUnavailable)?
        .map_err(|_| StorageError::KeychainUnavailable)?;
    Ok(generated)
}

fn generate_key_material() -> String {
    let mut bytes = [0_u8; KEY_LEN];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes.iter().map(|byte| format!("{byte:02x}")).collect()
}

fn derive_key_bytes(key_material: &str) -> [u8; KEY_LEN] {
    Sha256::digest(key_material.as_bytes()).into()
}

/// Path of the scratch file `write_atomic` writes before renaming.
fn temp_path_for(path: &Path) -> PathBuf {
    let file_name = path
        .file_name()
        .map_or_else(|| SESSION_FILE_NAME.into(), |name| name.to_string_lossy());
    path.with_file_name(format!(".{file_name}.tmp.{}", std::process::id()))
}

/// Writes `payload` to a sibling temp file, then renames it over `path`.
///
/// A crash or error mid-write leaves the previous blob untouched.
fn write_atomic(path: &Path, payload: &[u8]) -> Result<(), StorageError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }

    let tmp_path = temp_path_for(path);
    let result = fs::write(&tmp_path, payload)
        .and_then(|()| set_owner_only_permissions(&tmp_path))
        .and_then(|()| fs::rename(&tmp_path, path));

    if result.is_err() {
        let _ = fs::remove_file(&tmp_path);
    }
    Ok(result?)
}

#[cfg(unix)]
fn set_owner_only_permissions(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    fs::set_permissions(path, fs::Permissions::from_mode(0o600))
}

#[cfg(not(unix))]
fn set_owner_only_permissions(_path: &Path) -> std::io::Result<()> {
    Ok(())
}

fn encrypt_bytes(plaintext: &[u8], key_material: &str) -> Result<Vec<u8>, StorageError> {
    let key_bytes = derive_key_bytes(key_material);
    let cipher = XChaCha20Poly1305::new(Key::from_slice(&key_bytes));

    let mut nonce = [0_u8; NONCE_LEN];
    rand::thread_rng().fill_bytes(&mut nonce);

    let ciphertext = cipher
        .encrypt(XNonce::from_slice(&nonce), plaintext)
        .map_err(|_| StorageError::EncryptionFailed)?;

    let mut output = Vec::with_capacity(MAGIC.len() + NONCE_LEN + ciphertext.len());
    output.extend_from_slice(MAGIC);
    output.extend_from_slice(&nonce);
    output.extend_from_slice(&ciphertext);
    Ok(output)
}

fn decrypt_bytes(payload: &[u8], key_material: &str) -> Result<Vec<u8>, StorageError> {
    let Some(rest) = payload.strip_prefix(MAGIC.as_slice()) else {
        return Err(StorageError::InvalidPayload);
    };
    if rest.len() < NONCE_LEN {
        return Err(StorageError::InvalidPayload);
    }
    let (nonce, ciphertext) = rest.split_at(NONCE_LEN);

    let key_bytes = derive_key_bytes(key_material);
    let cipher = XChaCha20Poly1305::new(Key::from_slice(&key_bytes));
    cipher
        .decrypt(XNonce::from_slice(nonce), ciphertext)
        .map_err(|_| StorageError::DecryptionFailed)
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    fn sample_session() -> Session {
        Session::new(
            vec![
                SessionCookie::new(
                    "store.steampowered.com".to_string(),
                    false,
                    "/".to_string(),
                    true,
                    0,
                    "sessionid".to_string(),
                    "tok123".to_string(),
                ),
                SessionCookie::new(
                    "store.steampowered.com".to_string(),
                    false,
                    "/".to_string(),
                    true,
                    4_102_444_800,
                    "steamLoginSecure".to_string(),
                    "secret".to_string(),
                ),
            ],
            Some("gaben".to_string()),
        )
    }

    #[test]
    fn test_save_then_load_restores_cookies_and_account() {
        let dir = TempDir::new().unwrap();
        let store = EncryptedSessionStore::with_key_material(dir.path().join("s.enc"), "k");

        assert!(store.save(&sample_session()));
        let restored = store.load().expect("session restored");

        assert_eq!(restored.account(), Some("gaben"));
        assert_eq!(restored.session_id(), Some("tok123"));
        assert_eq!(restored.cookies().len(), 2);
        assert!(!restored.is_verified(), "restored sessions must be re-verified");
    }

    #[test]
    fn test_load_missing_file_is_none() {
        let dir = TempDir::new().unwrap();
        let store = EncryptedSessionStore::with_key_material(dir.path().join("none.enc"), "k");
        assert!(store.load().is_none());
    }

    #[test]
    fn test_load_with_wrong_key_is_none() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("s.enc");
        assert!(EncryptedSessionStore::with_key_material(&path, "key-a").save(&sample_session()));

        let other = EncryptedSessionStore::with_key_material(&path, "key-b");
        assert!(matches!(other.try_load(), Err(StorageError::DecryptionFailed)));
        assert!(other.load().is_none());
    }

    #[test]
    fn test_load_garbage_is_none() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("s.enc");
        fs::write(&path, b"not-encrypted").unwrap();

        let store = EncryptedSessionStore::with_key_material(&path, "k");
        assert!(matches!(store.try_load(), Err(StorageError::InvalidPayload)));
        assert!(store.load().is_none());
    }

    #[test]
    fn test_truncated_payload_is_invalid() {
        let mut payload = MAGIC.to_vec();
        payload.extend_from_slice(&[0_u8; 10]);
        assert!(matches!(
            decrypt_bytes(&payload, "k"),
            Err(StorageError::InvalidPayload)
        ));
    }

    #[test]
    fn test_failed_save_keeps_previous_blob() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("s.enc");
        let store = EncryptedSessionStore::with_key_material(&path, "k");
        assert!(store.save(&sample_session()));
        let before = fs::read(&path).unwrap();

        // A directory squatting on the temp path makes the write fail.
        fs::create_dir(temp_path_for(&path)).unwrap();
        assert!(!store.save(&Session::new(Vec::new(), None)));

        assert_eq!(fs::read(&path).unwrap(), before);
        assert_eq!(store.load().unwrap().session_id(), Some("tok123"));
    }

    #[test]
    fn test_save_creates_missing_parent_dirs() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("redeemer").join("s.enc");
        let store = EncryptedSessionStore::with_key_material(&path, "k");
        assert!(store.save(&sample_session()));
        assert!(path.exists());
        assert!(!temp_path_for(&path).exists());
    }

    #[test]
    fn test_clear_removes_blob() {
        let dir = TempDir::new().unwrap();
        let store = EncryptedSessionStore::with_key_material(dir.path().join("s.enc"), "k");
        assert!(!store.clear().unwrap());
        assert!(store.save(&sample_session()));
        assert!(store.clear().unwrap());
        assert!(store.load().is_none());
    }

    #[cfg(unix)]
    #[test]
    fn test_save_sets_owner_only_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("s.enc");
        assert!(EncryptedSessionStore::with_key_material(&path, "k").save(&sample_session()));
        let mode = fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o600);
    }

    #[test]
    fn test_generated_key_material_is_hex() {
        let key = generate_key_material();
        assert_eq!(key.len(), KEY_LEN * 2);
        assert!(key.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_resolve_config_dir_precedence() {
        let xdg = resolve_config_dir(
            Some(PathBuf::from("/tmp/xdg")),
            Some(PathBuf::from("/tmp/home")),
            None,
        )
        .unwrap();
        assert_eq!(xdg, PathBuf::from("/tmp/xdg/redeemer"));

        let home = resolve_config_dir(None, Some(PathBuf::from("/tmp/home")), None).unwrap();
        assert_eq!(home, PathBuf::from("/tmp/home/.config/redeemer"));

        let app_data = resolve_config_dir(None, None, Some(PathBuf::from("/tmp/ad"))).unwrap();
        assert_eq!(app_data, PathBuf::from("/tmp/ad/redeemer"));

        assert!(matches!(
            resolve_config_dir(None, None, None),
            Err(StorageError::ConfigDirUnavailable)
        ));
    }

    #[test]
    fn test_sanitize_env_path_rejects_blank() {
        assert!(sanitize_env_path(Some(OsString::from("  "))).is_none());
        assert!(sanitize_env_path(None).is_none());
    }
}
