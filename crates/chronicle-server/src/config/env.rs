// config/env.rs
// Environment-based configuration - single source of truth for all env vars

use std::path::PathBuf;

/// Default embedding dimension when none is configured.
const DEFAULT_EMBEDDING_DIM: usize = 768;
/// Embeddings smaller than this are suspicious (the data model requires 32+).
const MIN_EMBEDDING_DIM: usize = 32;
/// Default decay cycle period (15 minutes).
const DEFAULT_DECAY_INTERVAL_MS: i64 = 900_000;

/// Server configuration loaded from the environment.
///
/// Recognised variables:
/// - `DATABASE_URL` — database location: a filesystem path or `sqlite:` URL.
///   Defaults to `~/.chronicle/chronicle.db`.
/// - `SALIENCE_DECAY_LOG_LEVEL` — tracing level (default `info`).
/// - `CHRONICLE_EMBEDDING_DIM` — embedding dimension (default 768).
/// - `CHRONICLE_DECAY_INTERVAL_MS` — decay cycle period (default 900000).
#[derive(Debug, Clone)]
pub struct EnvConfig {
    pub database_path: PathBuf,
    pub log_level: String,
    pub embedding_dim: usize,
    pub decay_interval_ms: i64,
    /// Raw DATABASE_URL value when it could not be used as a location.
    unusable_database_url: Option<String>,
}

/// Non-fatal findings from config validation.
#[derive(Debug, Default)]
pub struct ValidationReport {
    pub warnings: Vec<String>,
}

impl EnvConfig {
    /// Load configuration from environment variables.
    pub fn load() -> Self {
        let (database_path, unusable_database_url) =
            match read_var("DATABASE_URL").map(|raw| (parse_database_location(&raw), raw)) {
                Some((Some(path), _)) => (path, None),
                Some((None, raw)) => (default_database_path(), Some(raw)),
                None => (default_database_path(), None),
            };

        let log_level =
            read_var("SALIENCE_DECAY_LOG_LEVEL").unwrap_or_else(|| "info".to_string());

        let embedding_dim = read_var("CHRONICLE_EMBEDDING_DIM")
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_EMBEDDING_DIM);

        let decay_interval_ms = read_var("CHRONICLE_DECAY_INTERVAL_MS")
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_DECAY_INTERVAL_MS);

        Self {
            database_path,
            log_level,
            embedding_dim,
            decay_interval_ms,
            unusable_database_url,
        }
    }

    /// Validate the loaded configuration, collecting warnings for the
    /// startup log. Nothing here is fatal.
    pub fn validate(&self) -> ValidationReport {
        let mut report = ValidationReport::default();

        if let Some(raw) = &self.unusable_database_url {
            report.warnings.push(format!(
                "DATABASE_URL '{}' is not a usable location for the embedded engine; \
                 using {}",
                raw,
                self.database_path.display()
            ));
        }

        if self.embedding_dim < MIN_EMBEDDING_DIM {
            report.warnings.push(format!(
                "CHRONICLE_EMBEDDING_DIM={} is below the supported minimum of {}",
                self.embedding_dim, MIN_EMBEDDING_DIM
            ));
        }

        if parse_log_level(&self.log_level).is_none() && self.log_level != "off" {
            report.warnings.push(format!(
                "Unknown SALIENCE_DECAY_LOG_LEVEL '{}', using info",
                self.log_level
            ));
        }

        if self.decay_interval_ms <= 0 {
            report.warnings.push(format!(
                "CHRONICLE_DECAY_INTERVAL_MS={} disables the reprocess guard",
                self.decay_interval_ms
            ));
        }

        report
    }

    /// Effective tracing level; `None` means logging is off.
    pub fn tracing_level(&self) -> Option<tracing::Level> {
        if self.log_level.eq_ignore_ascii_case("off") {
            return None;
        }
        Some(parse_log_level(&self.log_level).unwrap_or(tracing::Level::INFO))
    }
}

/// Read a single environment variable, filtering empty values.
fn read_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parse_log_level(level: &str) -> Option<tracing::Level> {
    match level.to_lowercase().as_str() {
        "error" => Some(tracing::Level::ERROR),
        "warn" => Some(tracing::Level::WARN),
        "info" => Some(tracing::Level::INFO),
        "debug" => Some(tracing::Level::DEBUG),
        "trace" => Some(tracing::Level::TRACE),
        _ => None,
    }
}

/// Interpret a DATABASE_URL as a filesystem location for the embedded
/// engine. Accepts plain paths and `sqlite:`/`file:` URLs; other schemes
/// (e.g. a server database URL) are rejected and fall back to the default.
fn parse_database_location(raw: &str) -> Option<PathBuf> {
    for prefix in ["sqlite://", "sqlite:", "file://", "file:"] {
        if let Some(rest) = raw.strip_prefix(prefix) {
            return (!rest.is_empty()).then(|| PathBuf::from(rest));
        }
    }
    if raw.contains("://") {
        return None;
    }
    Some(PathBuf::from(raw))
}

fn default_database_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".chronicle")
        .join("chronicle.db")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_database_location() {
        assert_eq!(
            parse_database_location("/tmp/a.db"),
            Some(PathBuf::from("/tmp/a.db"))
        );
        assert_eq!(
            parse_database_location("sqlite:///var/db/x.db"),
            Some(PathBuf::from("/var/db/x.db"))
        );
        assert_eq!(
            parse_database_location("sqlite:archive.db"),
            Some(PathBuf::from("archive.db"))
        );
        assert_eq!(
            parse_database_location("postgresql://postgres@localhost:5432/db"),
            None
        );
        assert_eq!(parse_database_location("sqlite:"), None);
    }

    #[test]
    fn test_validate_flags_bad_dimension() {
        let config = EnvConfig {
            database_path: PathBuf::from("/tmp/x.db"),
            log_level: "info".into(),
            embedding_dim: 8,
            decay_interval_ms: 900_000,
            unusable_database_url: None,
        };
        let report = config.validate();
        assert_eq!(report.warnings.len(), 1);
        assert!(report.warnings[0].contains("CHRONICLE_EMBEDDING_DIM"));
    }

    #[test]
    fn test_tracing_level() {
        let mut config = EnvConfig {
            database_path: PathBuf::from("/tmp/x.db"),
            log_level: "warn".into(),
            embedding_dim: 768,
            decay_interval_ms: 900_000,
            unusable_database_url: None,
        };
        assert_eq!(config.tracing_level(), Some(tracing::Level::WARN));

        config.log_level = "off".into();
        assert_eq!(config.tracing_level(), None);

        config.log_level = "bogus".into();
        assert_eq!(config.tracing_level(), Some(tracing::Level::INFO));
    }
}
