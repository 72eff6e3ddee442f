use std::path::PathBuf;
use std::time::Duration;

use depot_blob::{BlobConfig, DEFAULT_SESSION_TTL};

/// Server settings read from `DEPOT_*` environment variables
#[derive(Debug, Clone)]
pub struct Settings {
    pub data_dir: PathBuf,
    pub host: String,
    pub port: u16,
    pub session_ttl: Duration,
    /// `None` disables the expiry sweeper
    pub sweep_interval: Option<Duration>,
    pub max_blob_bytes: Option<u64>,
    pub max_body_bytes: Option<usize>,
    pub log_json: bool,
}

impl Settings {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build settings from any key lookup; unparsable values fall back to defaults
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let sweep_secs: u64 = var_or(&lookup, "DEPOT_SWEEP_INTERVAL_SECS", 300);

        Self {
            data_dir: PathBuf::from(var_or(&lookup, "DEPOT_DATA_DIR", "./data".to_string())),
            host: var_or(&lookup, "DEPOT_HTTP_HOST", "127.0.0.1".to_string()),
            port: var_or(&lookup, "DEPOT_HTTP_PORT", 3030),
            session_ttl: Duration::from_secs(var_or(
                &lookup,
                "DEPOT_SESSION_TTL_SECS",
                DEFAULT_SESSION_TTL.as_secs(),
            )),
            sweep_interval: (sweep_secs > 0).then(|| Duration::from_secs(sweep_secs)),
            max_blob_bytes: optional_var(&lookup, "DEPOT_MAX_BLOB_BYTES"),
            max_body_bytes: optional_var(&lookup, "DEPOT_MAX_BODY_BYTES"),
            log_json: var_or(&lookup, "DEPOT_LOG_JSON", false),
        }
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn blob_config(&self) -> BlobConfig {
        let config = BlobConfig::new().with_session_ttl(self.session_ttl);
        match self.max_blob_bytes {
            Some(bytes) => config.with_max_blob_bytes(bytes),
            None => config,
        }
    }

    pub fn files_dir(&self) -> PathBuf {
        self.data_dir.join("files")
    }

    pub fn uploads_dir(&self) -> PathBuf {
        self.data_dir.join("uploads")
    }
}

fn var_or<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    lookup(key)
        .and_then(|value| value.trim().parse().ok())
        .unwrap_or(default)
}

fn optional_var<F, T>(lookup: &F, key: &str) -> Option<T>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    lookup(key).and_then(|value| value.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn settings(pairs: &[(&str, &str)]) -> Settings {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Settings::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_without_environment() {
        let s = settings(&[]);
        assert_eq!(s.data_dir, PathBuf::from("./data"));
        assert_eq!(s.addr(), "127.0.0.1:3030");
        assert_eq!(s.session_ttl, DEFAULT_SESSION_TTL);
        assert_eq!(s.sweep_interval, Some(Duration::from_secs(300)));
        assert_eq!(s.max_blob_bytes, None);
        assert_eq!(s.max_body_bytes, None);
        assert!(!s.log_json);
        assert_eq!(s.blob_config().max_blob_bytes, BlobConfig::default().max_blob_bytes);
    }

    #[test]
    fn overrides_are_applied() {
        let s = settings(&[
            ("DEPOT_DATA_DIR", "/var/lib/depot"),
            ("DEPOT_HTTP_HOST", "0.0.0.0"),
            ("DEPOT_HTTP_PORT", "8080"),
            ("DEPOT_SESSION_TTL_SECS", "60"),
            ("DEPOT_MAX_BLOB_BYTES", "1024"),
            ("DEPOT_MAX_BODY_BYTES", "2048"),
            ("DEPOT_LOG_JSON", "true"),
        ]);
        assert_eq!(s.addr(), "0.0.0.0:8080");
        assert_eq!(s.files_dir(), PathBuf::from("/var/lib/depot/files"));
        assert_eq!(s.uploads_dir(), PathBuf::from("/var/lib/depot/uploads"));
        assert_eq!(s.max_body_bytes, Some(2048));
        assert!(s.log_json);

        let config = s.blob_config();
        assert_eq!(config.session_ttl, Duration::from_secs(60));
        assert_eq!(config.max_blob_bytes, 1024);
    }

    #[test]
    fn zero_interval_disables_the_sweeper() {
        assert_eq!(settings(&[("DEPOT_SWEEP_INTERVAL_SECS", "0")]).sweep_interval, None);
    }

    #[test]
    fn dotenv_files_feed_the_same_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".env");
        std::fs::write(&path, "DEPOT_HTTP_PORT=4040\n# comment\nDEPOT_DATA_DIR=\"/srv/depot\"\n")
            .unwrap();

        let vars: HashMap<String, String> = dotenvy::from_path_iter(&path)
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        let s = Settings::from_lookup(|key| vars.get(key).cloned());
        assert_eq!(s.port, 4040);
        assert_eq!(s.data_dir, PathBuf::from("/srv/depot"));
    }

    #[test]
    fn garbage_falls_back_to_defaults() {
        let s = settings(&[("DEPOT_HTTP_PORT", "http"), ("DEPOT_MAX_BODY_BYTES", "lots")]);
        assert_eq!(s.port, 3030);
        assert_eq!(s.max_body_bytes, None);
    }
}
