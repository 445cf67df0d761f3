use std::time::Duration;

pub const DEFAULT_LOOKUP_ENDPOINT: &str = "/book/lookup";
pub const DEFAULT_ADD_ENDPOINT: &str = "/book";
pub const DEFAULT_ADD_METHOD: &str = "POST";
pub const DEFAULT_QUALITY_PROFILE_ID: i64 = 1;
pub const DEFAULT_METADATA_PROFILE_ID: i64 = 1;

pub const DEFAULT_LOOKUP_CACHE_TTL: Duration = Duration::from_secs(60 * 60);
pub const DEFAULT_LOOKUP_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(6);
pub const DEFAULT_SUBMIT_TIMEOUT: Duration = Duration::from_secs(12);
pub const DEFAULT_MONITOR_INTERVAL: Duration = Duration::from_secs(30);
pub const DEFAULT_MONITOR_BUDGET: Duration = Duration::from_secs(5 * 60);
pub const DEFAULT_MONITOR_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(12);
pub const DEFAULT_APPROVAL_TOKEN_TTL: Duration = Duration::from_secs(60 * 60);

pub const CONFIG_PATH_ENV: &str = "QUIRE_CONFIG_PATH";
pub const CONFIG_JSON_ENV: &str = "QUIRE_CONFIG_JSON";
pub const ENV_PREFIX: &str = "QUIRE";

pub const DEFAULT_CONFIG_CANDIDATES: &[&str] = &[
    "quire.toml",
    "quire.json",
    "config/quire.toml",
    "config/quire.json",
];
