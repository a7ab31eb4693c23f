use std::path::PathBuf;

/// Application-level constants
pub const APP_NAME: &str = "guias-sync";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Environment variable that overrides the database location.
pub const DB_PATH_ENV: &str = "GUIAS_DB_PATH";

/// Get the application data directory (~/.guias-sync/)
pub fn data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(format!(".{APP_NAME}"))
}

/// SQLite file shared by every worker.
pub fn database_path() -> PathBuf {
    match std::env::var(DB_PATH_ENV) {
        Ok(path) if !path.trim().is_empty() => PathBuf::from(path),
        _ => data_dir().join("guias.db"),
    }
}

/// Default local bucket root for uploaded documents.
pub fn storage_dir() -> PathBuf {
    data_dir().join("storage")
}

/// Log filter used when `RUST_LOG` is unset.
pub fn default_log_filter() -> &'static str {
    if cfg!(debug_assertions) {
        "guias_sync=debug,info"
    } else {
        "guias_sync=info,warn"
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Tunables for the staging/reconciliation pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Detail-capture attempts per queued guide before it is parked as `error`.
    pub max_queue_attempts: u32,
    /// Staged rows loaded per reconciliation pass.
    pub reconcile_batch_size: u32,
    /// Minutes a row may sit in `processando` before it is released back to `pendente`.
    pub stale_after_minutes: u32,
    /// Seconds between background worker passes.
    pub poll_interval_secs: u64,
    /// Optional cap on guides captured per task.
    pub max_results: Option<usize>,
    /// Source tag written on staged rows.
    pub origem: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_queue_attempts: 3,
            reconcile_batch_size: 500,
            stale_after_minutes: 30,
            poll_interval_secs: 60,
            max_results: None,
            origem: "portal".to_string(),
        }
    }
}

impl PipelineConfig {
    /// Defaults overridden by `GUIAS_*` environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_queue_attempts: env_parse("GUIAS_MAX_QUEUE_ATTEMPTS")
                .unwrap_or(defaults.max_queue_attempts),
            reconcile_batch_size: env_parse("GUIAS_RECONCILE_BATCH_SIZE")
                .unwrap_or(defaults.reconcile_batch_size),
            stale_after_minutes: env_parse("GUIAS_STALE_AFTER_MINUTES")
                .unwrap_or(defaults.stale_after_minutes),
            poll_interval_secs: env_parse("GUIAS_POLL_INTERVAL_SECS")
                .unwrap_or(defaults.poll_interval_secs),
            max_results: env_parse("GUIAS_MAX_RESULTS"),
            origem: env_string("GUIAS_ORIGEM").unwrap_or(defaults.origem),
        }
    }
}

/// CSS selectors for the portal pages the capture adapter drives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortalSelectors {
    pub username_input: String,
    pub password_input: String,
    pub login_button: String,
    pub logged_in_marker: String,
    pub date_start_input: String,
    pub date_end_input: String,
    pub search_button: String,
    pub result_rows: String,
    pub next_page: String,
}

impl Default for PortalSelectors {
    fn default() -> Self {
        Self {
            username_input: "#username".into(),
            password_input: "#password".into(),
            login_button: "button[type=submit]".into(),
            logged_in_marker: "#menu-principal".into(),
            date_start_input: "#dataInicial".into(),
            date_end_input: "#dataFinal".into(),
            search_button: "#btnPesquisar".into(),
            result_rows: "table.resultado tbody tr".into(),
            next_page: "a.next, li.next > a".into(),
        }
    }
}

/// Portal location, credentials and selectors.
#[derive(Debug, Clone)]
pub struct PortalConfig {
    pub base_url: String,
    pub login_path: String,
    pub search_path: String,
    pub username: String,
    pub password: String,
    pub selectors: PortalSelectors,
}

impl PortalConfig {
    /// Read `PORTAL_URL`, `PORTAL_USER` and `PORTAL_PASSWORD`. `None` if any is missing.
    pub fn from_env() -> Option<Self> {
        Some(Self {
            base_url: env_string("PORTAL_URL")?.trim_end_matches('/').to_string(),
            login_path: env_string("PORTAL_LOGIN_PATH").unwrap_or_else(|| "/login".into()),
            search_path: env_string("PORTAL_SEARCH_PATH")
                .unwrap_or_else(|| "/guias/execucoes".into()),
            username: env_string("PORTAL_USER")?,
            password: env_string("PORTAL_PASSWORD")?,
            selectors: PortalSelectors::default(),
        })
    }

    pub fn login_url(&self) -> String {
        format!("{}{}", self.base_url, self.login_path)
    }

    pub fn search_url(&self) -> String {
        format!("{}{}", self.base_url, self.search_path)
    }
}

/// Where routed documents are uploaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageConfig {
    Local { root: PathBuf },
    Http { base_url: String, bucket: String, token: String },
}

impl StorageConfig {
    /// HTTP object storage when `STORAGE_URL` is set, local directory otherwise.
    pub fn from_env() -> Self {
        match env_string("STORAGE_URL") {
            Some(base_url) => Self::Http {
                base_url: base_url.trim_end_matches('/').to_string(),
                bucket: env_string("STORAGE_BUCKET").unwrap_or_else(|| "documentos".into()),
                token: env_string("STORAGE_TOKEN").unwrap_or_default(),
            },
            None => Self::Local { root: storage_dir() },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_dir_is_named_after_app() {
        let dir = data_dir();
        assert!(dir.ends_with(".guias-sync"));
    }

    #[test]
    fn storage_dir_under_data_dir() {
        assert!(storage_dir().starts_with(data_dir()));
    }

    #[test]
    fn default_pipeline_config() {
        let config = PipelineConfig::default();
        assert_eq!(config.max_queue_attempts, 3);
        assert_eq!(config.reconcile_batch_size, 500);
        assert_eq!(config.stale_after_minutes, 30);
        assert!(config.max_results.is_none());
    }

    #[test]
    fn portal_urls_join_base_and_path() {
        let portal = PortalConfig {
            base_url: "https://portal.example".into(),
            login_path: "/login".into(),
            search_path: "/guias/execucoes".into(),
            username: "u".into(),
            password: "p".into(),
            selectors: PortalSelectors::default(),
        };
        assert_eq!(portal.login_url(), "https://portal.example/login");
        assert_eq!(portal.search_url(), "https://portal.example/guias/execucoes");
    }

    #[test]
    fn app_name_is_guias_sync() {
        assert_eq!(APP_NAME, "guias-sync");
    }
}
