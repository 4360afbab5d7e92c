use crate::core::{Result, StoreError};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_APP_NAME: &str = "docguard";
pub const DEFAULT_DOCUMENT_FILE: &str = "data.json";
pub const DEFAULT_SESSION_FILE: &str = "session.json";

/// Retry schedule for the atomic writer.
#[derive(Debug, Clone)]
pub struct WritePolicy {
    /// Total attempts before falling back to an emergency rescue file
    pub attempts: u32,

    /// Delay before the second attempt; doubles after every failure
    pub backoff_base: Duration,

    /// Upper bound for a single backoff delay
    pub backoff_cap: Duration,

    /// Attempts with an index at or above this value delete the destination
    /// before committing
    pub delete_destination_from: u32,
}

impl Default for WritePolicy {
    fn default() -> Self {
        Self {
            attempts: 5,
            backoff_base: Duration::from_millis(200),
            backoff_cap: Duration::from_millis(2000),
            delete_destination_from: 3,
        }
    }
}

impl WritePolicy {
    /// Delay after the failed attempt with zero-based index `attempt`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.backoff_base
            .checked_mul(factor)
            .unwrap_or(self.backoff_cap)
            .min(self.backoff_cap)
    }
}

/// Retry schedule for the recovering reader.
#[derive(Debug, Clone)]
pub struct ReadPolicy {
    pub attempts: u32,
    pub backoff_base: Duration,
}

impl Default for ReadPolicy {
    fn default() -> Self {
        Self {
            attempts: 5,
            backoff_base: Duration::from_millis(50),
        }
    }
}

impl ReadPolicy {
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.backoff_base
            .checked_mul(factor)
            .unwrap_or(Duration::from_secs(60))
    }
}

/// How long to wait for slow network mounts before reading.
#[derive(Debug, Clone)]
pub struct MountPolicy {
    pub poll_interval: Duration,
    pub timeout: Duration,

    /// Path prefixes that live on network storage in addition to UNC paths
    pub network_roots: Vec<PathBuf>,
}

impl Default for MountPolicy {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(500),
            timeout: Duration::from_secs(10),
            network_roots: Vec::new(),
        }
    }
}

impl MountPolicy {
    /// UNC-style paths and anything below a configured network root are
    /// treated as manifestly non-local.
    pub fn is_network_path(&self, path: &Path) -> bool {
        let text = path.to_string_lossy();
        if text.starts_with("\\\\") || text.starts_with("//") {
            return true;
        }
        self.network_roots.iter().any(|root| path.starts_with(root))
    }
}

/// Engine configuration
///
/// All paths default to the platform directories of the current user.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Application name used for default directory names
    pub app_name: String,

    /// Primary location of the config record
    pub primary_config_path: PathBuf,

    /// Redundant copy of the config record, kept in a different directory
    pub backup_config_path: PathBuf,

    /// Storage directory used when no config record resolves
    pub default_documents_dir: PathBuf,

    /// File name of the canonical document inside the storage directory
    pub document_file_name: String,

    /// File name of the session snapshot, stored next to the primary config
    pub session_file_name: String,

    pub write: WritePolicy,
    pub read: ReadPolicy,
    pub mount: MountPolicy,

    /// Upper bound on `RetryRead` decisions during one load
    pub max_prompt_rounds: u32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::new(DEFAULT_APP_NAME)
    }
}

impl StoreConfig {
    /// Create a configuration using the platform directories
    pub fn new(app_name: &str) -> Self {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        let config_root = dirs::config_dir().unwrap_or_else(|| home.join(".config"));
        let documents = dirs::document_dir().unwrap_or_else(|| home.join("Documents"));

        Self {
            app_name: app_name.to_string(),
            primary_config_path: config_root.join(app_name).join("config.json"),
            backup_config_path: home.join(format!(".{}-config-backup.json", app_name)),
            default_documents_dir: documents.join(app_name),
            document_file_name: DEFAULT_DOCUMENT_FILE.to_string(),
            session_file_name: DEFAULT_SESSION_FILE.to_string(),
            write: WritePolicy::default(),
            read: ReadPolicy::default(),
            mount: MountPolicy::default(),
            max_prompt_rounds: 10,
        }
    }

    /// Create a configuration with every path below `root`
    ///
    /// Useful for sandboxes and tests:
    /// `root/config/config.json`, `root/backup/config.json`, `root/documents`.
    pub fn rooted_at(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        Self::new(DEFAULT_APP_NAME)
            .primary_config_path(root.join("config").join("config.json"))
            .backup_config_path(root.join("backup").join("config.json"))
            .default_documents_dir(root.join("documents"))
    }

    pub fn primary_config_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.primary_config_path = path.into();
        self
    }

    pub fn backup_config_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.backup_config_path = path.into();
        self
    }

    pub fn default_documents_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.default_documents_dir = dir.into();
        self
    }

    pub fn document_file_name(mut self, name: &str) -> Self {
        self.document_file_name = name.to_string();
        self
    }

    pub fn write_policy(mut self, policy: WritePolicy) -> Self {
        self.write = policy;
        self
    }

    pub fn read_policy(mut self, policy: ReadPolicy) -> Self {
        self.read = policy;
        self
    }

    pub fn mount_policy(mut self, policy: MountPolicy) -> Self {
        self.mount = policy;
        self
    }

    pub fn network_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.mount.network_roots.push(root.into());
        self
    }

    pub fn max_prompt_rounds(mut self, rounds: u32) -> Self {
        self.max_prompt_rounds = rounds;
        self
    }

    /// Shrinks every delay so retry paths run quickly in tests
    pub fn fast_retries(mut self) -> Self {
        self.write.backoff_base = Duration::from_millis(1);
        self.write.backoff_cap = Duration::from_millis(5);
        self.read.backoff_base = Duration::from_millis(1);
        self.mount.poll_interval = Duration::from_millis(5);
        self.mount.timeout = Duration::from_millis(50);
        self
    }

    pub fn default_document_path(&self) -> PathBuf {
        self.default_documents_dir.join(&self.document_file_name)
    }

    pub fn session_path(&self) -> PathBuf {
        self.primary_config_path
            .parent()
            .map(|dir| dir.join(&self.session_file_name))
            .unwrap_or_else(|| PathBuf::from(&self.session_file_name))
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.document_file_name.trim().is_empty() {
            return Err(StoreError::InvalidConfig(
                "document_file_name cannot be empty".to_string(),
            ));
        }

        if self.write.attempts == 0 || self.read.attempts == 0 {
            return Err(StoreError::InvalidConfig(
                "retry attempts must be > 0".to_string(),
            ));
        }

        if self.primary_config_path == self.backup_config_path {
            return Err(StoreError::InvalidConfig(
                "primary and backup config paths must differ".to_string(),
            ));
        }

        Ok(())
    }
}
