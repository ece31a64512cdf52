use rollcall_core::{CheckInPolicy, MatchConfig, DEFAULT_EMBEDDING_SIZE};
use std::path::PathBuf;
use std::time::Duration;

/// Daemon configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to the SQLite database file.
    pub db_path: PathBuf,
    /// Maximum cosine distance for a duplicate at enrollment.
    pub registration_threshold: f32,
    /// Maximum cosine distance for a positive recognition.
    pub recognition_threshold: f32,
    /// Minimum gap between best and second-best distances.
    pub min_margin: f32,
    /// Expected embedding length from the recognition model.
    pub embedding_size: usize,
    /// Minimum time between two check-ins of one person.
    pub cooldown_secs: u64,
    /// Minimum spacing between admitted probe frames.
    pub frame_interval_ms: u64,
}

impl Config {
    /// Load configuration from `ROLLCALL_*` environment variables with defaults.
    pub fn from_env() -> Self {
        let data_dir = std::env::var("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
                PathBuf::from(home).join(".local/share")
            })
            .join("rollcall");

        let db_path = std::env::var("ROLLCALL_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("attendance.db"));

        let defaults = MatchConfig::default();

        Self {
            db_path,
            registration_threshold: env_f32(
                "ROLLCALL_REGISTRATION_THRESHOLD",
                defaults.registration_threshold,
            ),
            recognition_threshold: env_f32(
                "ROLLCALL_RECOGNITION_THRESHOLD",
                defaults.recognition_threshold,
            ),
            min_margin: env_f32("ROLLCALL_MIN_MARGIN", defaults.min_margin),
            embedding_size: env_usize("ROLLCALL_EMBEDDING_SIZE", DEFAULT_EMBEDDING_SIZE),
            cooldown_secs: env_u64("ROLLCALL_COOLDOWN_SECS", 120),
            frame_interval_ms: env_u64("ROLLCALL_FRAME_INTERVAL_MS", 100),
        }
    }

    pub fn match_config(&self) -> MatchConfig {
        MatchConfig {
            registration_threshold: self.registration_threshold,
            recognition_threshold: self.recognition_threshold,
            min_margin: self.min_margin,
        }
    }

    pub fn check_in_policy(&self) -> CheckInPolicy {
        CheckInPolicy::from_secs(self.cooldown_secs)
    }

    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_interval_ms)
    }
}

fn env_f32(key: &str, default: f32) -> f32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_usize(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
