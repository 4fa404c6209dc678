//! Session lifecycle and permissions
//!
//! A [`Session`] is created by [`SessionManager::login`] once the token has
//! been validated and the caller holds at least one permission. Workflows take
//! the session explicitly; nothing here is process-global. A 401 anywhere tears
//! the session down through [`SessionManager::observe`].

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::ArmoryConfig;
use crate::error::{ArmoryError, ArmoryResult};
use crate::sheets::{Connector, SheetStore};
use crate::types::{AuditLogEntry, RawGrid};

/// Capability key → granted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permissions(BTreeMap<String, bool>);

fn is_granted_cell(cell: &str) -> bool {
    matches!(
        cell.trim().to_lowercase().as_str(),
        "true" | "כן" | "yes" | "1"
    )
}

impl Permissions {
    /// Read the row of `email` from a permissions tab laid out as
    /// `email, key1, key2, ...`. Unknown users get an empty set.
    pub fn from_grid(grid: &RawGrid, email: &str) -> Self {
        let Some((header, rows)) = grid.split_first() else {
            return Self::default();
        };
        let Some(row) = rows.iter().find(|r| {
            r.first()
                .is_some_and(|cell| cell.trim().eq_ignore_ascii_case(email.trim()))
        }) else {
            return Self::default();
        };

        let map = header
            .iter()
            .enumerate()
            .skip(1)
            .filter(|(_, key)| !key.trim().is_empty())
            .map(|(col, key)| {
                let granted = row.get(col).is_some_and(|c| is_granted_cell(c));
                (key.trim().to_string(), granted)
            })
            .collect();
        Self(map)
    }

    pub fn from_keys<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(keys.into_iter().map(|k| (k.into(), true)).collect())
    }

    pub fn granted(&self, key: &str) -> bool {
        self.0.get(key).copied().unwrap_or(false)
    }

    pub fn granted_keys(&self) -> Vec<&str> {
        self.0
            .iter()
            .filter(|&(_, &v)| v)
            .map(|(k, _)| k.as_str())
            .collect()
    }

    pub fn any_granted(&self) -> bool {
        self.0.values().any(|&v| v)
    }
}

/// Authenticated caller plus the store acting on their behalf.
#[derive(Clone)]
pub struct Session {
    pub email: String,
    pub permissions: Permissions,
    store: Arc<dyn SheetStore>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("email", &self.email)
            .field("permissions", &self.permissions)
            .finish_non_exhaustive()
    }
}

impl Session {
    pub fn new(email: impl Into<String>, permissions: Permissions, store: Arc<dyn SheetStore>) -> Self {
        Self {
            email: email.into(),
            permissions,
            store,
        }
    }

    pub fn store(&self) -> &Arc<dyn SheetStore> {
        &self.store
    }

    pub fn can(&self, key: &str) -> bool {
        self.permissions.granted(key)
    }

    /// Status and read-flag edits
    pub fn can_edit_status(&self, config: &ArmoryConfig) -> bool {
        self.can(&config.logistics_role)
    }

    /// Whether the per-status tables of `unit_range` are shown.
    pub fn can_view_unit_tables(&self, config: &ArmoryConfig, unit_range: &str) -> bool {
        self.can(unit_range) || self.can(&config.logistics_role)
    }

    pub fn require(&self, key: &str) -> ArmoryResult<()> {
        if self.can(key) {
            Ok(())
        } else {
            Err(ArmoryError::AccessDenied(format!(
                "{} lacks permission '{}'",
                self.email, key
            )))
        }
    }

    /// Read access to any configured tab: unit rosters need the unit's
    /// permission, logistics tabs the visibility rule, every other tab is
    /// open to any signed-in user.
    pub fn require_readable(&self, config: &ArmoryConfig, range: &str) -> ArmoryResult<()> {
        if config.unit(range).is_ok() {
            self.require(range)?;
        }
        if config.logistics_sheet(range).is_ok() && !self.can_view_unit_tables(config, range) {
            return Err(ArmoryError::AccessDenied(format!(
                "{} may not see '{}'",
                self.email, range
            )));
        }
        Ok(())
    }

    pub fn audit(&self, message: impl Into<String>) -> AuditLogEntry {
        AuditLogEntry::new(message, self.email.clone())
    }
}

//==============================================================================
// Token cache
//==============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedToken {
    pub access_token: String,
    pub email: String,
}

/// Access token persisted between runs as a small JSON file.
#[derive(Debug, Clone)]
pub struct TokenCache {
    path: PathBuf,
}

impl TokenCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// A missing or unreadable file is treated as "nothing cached".
    pub fn load(&self) -> Option<CachedToken> {
        let content = std::fs::read_to_string(&self.path).ok()?;
        match serde_json::from_str(&content) {
            Ok(token) => Some(token),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "ignoring corrupt token cache");
                None
            }
        }
    }

    pub fn save(&self, token: &CachedToken) -> ArmoryResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(&self.path, serde_json::to_string_pretty(token)?)?;
        Ok(())
    }

    pub fn clear(&self) -> ArmoryResult<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

//==============================================================================
// Manager
//==============================================================================

pub struct SessionManager {
    connector: Arc<dyn Connector>,
    config: Arc<ArmoryConfig>,
    cache: Option<TokenCache>,
    current: Mutex<Option<Arc<Session>>>,
}

impl SessionManager {
    pub fn new(connector: Arc<dyn Connector>, config: Arc<ArmoryConfig>) -> Self {
        let cache = config.token_cache.clone().map(TokenCache::new);
        Self {
            connector,
            config,
            cache,
            current: Mutex::new(None),
        }
    }

    pub fn with_cache(mut self, cache: TokenCache) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn config(&self) -> &Arc<ArmoryConfig> {
        &self.config
    }

    /// Validate `token`, load the caller's permissions and start a session.
    pub async fn login(&self, token: &str) -> ArmoryResult<Arc<Session>> {
        let result = self.open(token).await;
        match &result {
            Ok(session) => {
                info!(email = %session.email, keys = ?session.permissions.granted_keys(), "session started");
                if let Some(cache) = &self.cache {
                    cache.save(&CachedToken {
                        access_token: token.to_string(),
                        email: session.email.clone(),
                    })?;
                }
                self.set_current(Some(Arc::clone(session)));
            }
            Err(e) => {
                warn!(error = %e, "login failed");
                self.teardown();
            }
        }
        result
    }

    /// Resolve a token into a session without touching the current session
    /// or the cache. Used by stateless callers such as the HTTP server.
    pub async fn authenticate(&self, token: &str) -> ArmoryResult<Arc<Session>> {
        self.open(token).await
    }

    async fn open(&self, token: &str) -> ArmoryResult<Arc<Session>> {
        let email = self.connector.resolve_email(token).await?;
        let store = self.connector.store(token)?;
        let grid = store.fetch_sheet(&self.config.permissions).await?;
        let permissions = Permissions::from_grid(&grid, &email);
        if !permissions.any_granted() {
            return Err(ArmoryError::AccessDenied(format!(
                "no permissions granted to {}",
                email
            )));
        }
        Ok(Arc::new(Session::new(email, permissions, store)))
    }

    /// Restart from the cached token. An expired token is discarded and
    /// `None` returned; the caller then has to log in again.
    pub async fn resume(&self) -> ArmoryResult<Option<Arc<Session>>> {
        let Some(cached) = self.cache.as_ref().and_then(TokenCache::load) else {
            return Ok(None);
        };
        match self.login(&cached.access_token).await {
            Ok(session) => Ok(Some(session)),
            Err(ArmoryError::AuthExpired) => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub fn current(&self) -> Option<Arc<Session>> {
        match self.current.lock() {
            Ok(current) => current.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Tear the session down when `err` says the token is gone. Returns
    /// whether it did.
    pub fn observe(&self, err: &ArmoryError) -> bool {
        if !err.is_auth_expired() {
            return false;
        }
        warn!("access token expired, signing out");
        self.teardown();
        true
    }

    /// Forget the session and the cached token.
    pub fn teardown(&self) {
        self.set_current(None);
        if let Some(cache) = &self.cache {
            if let Err(e) = cache.clear() {
                warn!(error = %e, "failed to clear token cache");
            }
        }
    }

    fn set_current(&self, session: Option<Arc<Session>>) {
        let mut current = match self.current.lock() {
            Ok(current) => current,
            Err(poisoned) => poisoned.into_inner(),
        };
        *current = session;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sheets::{MemoryConnector, MemorySheetStore};
    use crate::types::SheetRef;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn row(cells: &[&str]) -> Vec<String> {
        cells.iter().map(|c| c.to_string()).collect()
    }

    fn permissions_grid() -> RawGrid {
        vec![
            row(&["email", "א", "Logistic", "Plugot"]),
            row(&["officer@unit.il", "TRUE", "", "כן"]),
            row(&["nobody@unit.il", "FALSE", "לא"]),
            row(&["log@unit.il", "", "yes"]),
        ]
    }

    fn manager(dir: &TempDir) -> (SessionManager, Arc<MemorySheetStore>) {
        let config = ArmoryConfig::default();
        let store = Arc::new(MemorySheetStore::new().with_sheet(
            SheetRef::new("הרשאות", "הרשאות", config.permissions.id),
            permissions_grid(),
        ));
        let connector = MemoryConnector::new(Arc::clone(&store))
            .with_account("t-officer", "officer@unit.il")
            .with_account("t-nobody", "nobody@unit.il");
        let manager = SessionManager::new(Arc::new(connector), Arc::new(config))
            .with_cache(TokenCache::new(dir.path().join("token.json")));
        (manager, store)
    }

    #[test]
    fn test_require_readable() {
        let mut config = ArmoryConfig::default();
        config.units = vec![SheetRef::new("א", "א", 1), SheetRef::new("ב", "ב", 2)];
        config.logistics = vec![SheetRef::new("לוגיסטיקה ב", "לוגיסטיקה-ב", 3)];
        let store: Arc<dyn SheetStore> = Arc::new(MemorySheetStore::new());
        let officer = Session::new("a@unit.il", Permissions::from_keys(["א"]), Arc::clone(&store));
        let logistics = Session::new("log@unit.il", Permissions::from_keys(["Logistic"]), store);

        assert!(officer.require_readable(&config, "א").is_ok());
        assert!(officer.require_readable(&config, "תיעוד").is_ok());
        for range in ["ב", "לוגיסטיקה-ב"] {
            assert!(matches!(
                officer.require_readable(&config, range),
                Err(ArmoryError::AccessDenied(_))
            ));
        }
        assert!(logistics.require_readable(&config, "לוגיסטיקה-ב").is_ok());
        assert!(logistics.require_readable(&config, "ב").is_err());
    }

    #[test]
    fn test_permissions_from_grid() {
        let perms = Permissions::from_grid(&permissions_grid(), "Officer@Unit.il");
        assert_eq!(perms.granted_keys(), vec!["Plugot", "א"]);
        assert!(!perms.granted("Logistic"));

        let missing = Permissions::from_grid(&permissions_grid(), "who@unit.il");
        assert!(!missing.any_granted());
    }

    #[tokio::test]
    async fn test_login_and_cache() {
        let dir = TempDir::new().unwrap();
        let (manager, _) = manager(&dir);
        let session = manager.login("t-officer").await.unwrap();
        assert_eq!(session.email, "officer@unit.il");
        assert!(session.can_view_unit_tables(manager.config(), "א"));
        assert!(!session.can_view_unit_tables(manager.config(), "ב"));
        assert!(!session.can_edit_status(manager.config()));

        let cached = TokenCache::new(dir.path().join("token.json")).load().unwrap();
        assert_eq!(cached.access_token, "t-officer");
    }

    #[tokio::test]
    async fn test_no_permissions_denies_login() {
        let dir = TempDir::new().unwrap();
        let (manager, _) = manager(&dir);
        assert!(matches!(
            manager.login("t-nobody").await,
            Err(ArmoryError::AccessDenied(_))
        ));
        assert!(manager.current().is_none());
    }

    #[tokio::test]
    async fn test_observe_tears_down_on_401() {
        let dir = TempDir::new().unwrap();
        let (manager, store) = manager(&dir);
        let session = manager.login("t-officer").await.unwrap();
        store.expire_token();

        let err = session
            .store()
            .fetch_sheet(&manager.config().permissions)
            .await
            .unwrap_err();
        assert!(!manager.observe(&ArmoryError::Validation("x".into())));
        assert!(manager.observe(&err));
        assert!(manager.current().is_none());
        assert!(TokenCache::new(dir.path().join("token.json")).load().is_none());
    }

    #[tokio::test]
    async fn test_resume_discards_invalid_token() {
        let dir = TempDir::new().unwrap();
        let (manager, _) = manager(&dir);
        let cache = TokenCache::new(dir.path().join("token.json"));
        cache
            .save(&CachedToken {
                access_token: "stale".into(),
                email: "officer@unit.il".into(),
            })
            .unwrap();
        assert!(manager.resume().await.unwrap().is_none());
        assert!(cache.load().is_none());

        manager.login("t-officer").await.unwrap();
        let resumed = manager.resume().await.unwrap().unwrap();
        assert_eq!(resumed.email, "officer@unit.il");
    }
}
