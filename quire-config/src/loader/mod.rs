pub mod error;

use std::{
    env, fs,
    path::{Path, PathBuf},
};

use quire_model::CollectionKind;
use tracing::debug;

use crate::{
    constants::{
        CONFIG_JSON_ENV, CONFIG_PATH_ENV, DEFAULT_CONFIG_CANDIDATES, ENV_PREFIX,
    },
    models::Config,
    validation::{ConfigWarnings, apply_guard_rails},
};
use error::ConfigLoadError;

/// Where the configuration document came from.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ConfigSource {
    #[default]
    Default,
    EnvPath(PathBuf),
    EnvInline,
    File(PathBuf),
}

#[derive(Debug, Clone)]
pub struct ConfigLoad {
    pub config: Config,
    pub warnings: ConfigWarnings,
    pub source: ConfigSource,
    pub env_file_loaded: bool,
}

/// Loads [`Config`] from files, inline JSON and environment overrides.
///
/// Evaluation order:
/// 1) `.env` (unless disabled),
/// 2) an explicit path from [`ConfigLoader::with_config_path`], else
///    `$QUIRE_CONFIG_PATH` (TOML or JSON file),
/// 3) `$QUIRE_CONFIG_JSON` (inline JSON),
/// 4) the first existing default file under the search root,
/// 5) built-in defaults,
///
/// then `QUIRE_{EBOOK|AUDIOBOOK}_*` overrides and guard rails.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    config_path: Option<PathBuf>,
    env_file: Option<PathBuf>,
    load_env_file: bool,
    search_root: Option<PathBuf>,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self {
            config_path: None,
            env_file: None,
            load_env_file: true,
            search_root: None,
        }
    }

    pub fn with_config_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_path = Some(path.into());
        self
    }

    pub fn with_env_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.env_file = Some(path.into());
        self.load_env_file = true;
        self
    }

    pub fn without_env_file(mut self) -> Self {
        self.load_env_file = false;
        self
    }

    pub fn with_search_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.search_root = Some(root.into());
        self
    }

    pub fn load(&self) -> Result<ConfigLoad, ConfigLoadError> {
        let env_file_loaded = self.load_env_file()?;
        let mut load = self.load_with_env(|key| env::var(key).ok())?;
        load.env_file_loaded = env_file_loaded;
        Ok(load)
    }

    /// Same as [`ConfigLoader::load`] but reads variables through `lookup`
    /// and never touches `.env`.
    pub fn load_with_env<F>(&self, lookup: F) -> Result<ConfigLoad, ConfigLoadError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let (mut config, source) = if let Some(path) = &self.config_path {
            (load_from_file(path)?, ConfigSource::File(path.clone()))
        } else if let Some(path) = var(CONFIG_PATH_ENV) {
            let path = PathBuf::from(path.trim());
            (load_from_file(&path)?, ConfigSource::EnvPath(path))
        } else if let Some(raw) = var(CONFIG_JSON_ENV) {
            (parse_json(&raw, CONFIG_JSON_ENV)?, ConfigSource::EnvInline)
        } else if let Some(path) = self.find_default_file() {
            (load_from_file(&path)?, ConfigSource::File(path))
        } else {
            (Config::default(), ConfigSource::Default)
        };

        apply_env_overrides(&mut config, &var)?;
        config.normalize();

        let warnings = apply_guard_rails(&config)?;
        debug!(?source, "configuration loaded");

        Ok(ConfigLoad {
            config,
            warnings,
            source,
            env_file_loaded: false,
        })
    }

    fn load_env_file(&self) -> Result<bool, ConfigLoadError> {
        if !self.load_env_file {
            return Ok(false);
        }

        let result = match &self.env_file {
            Some(path) => dotenvy::from_path(path).map(|_| ()),
            None => dotenvy::dotenv().map(|_| ()),
        };

        match result {
            Ok(()) => Ok(true),
            Err(err) if err.not_found() => Ok(false),
            Err(err) => Err(ConfigLoadError::EnvFile(err)),
        }
    }

    fn find_default_file(&self) -> Option<PathBuf> {
        let root = self
            .search_root
            .clone()
            .or_else(|| env::current_dir().ok())?;
        DEFAULT_CONFIG_CANDIDATES
            .iter()
            .map(|candidate| root.join(candidate))
            .find(|path| path.is_file())
    }
}

pub fn load_from_file(path: &Path) -> Result<Config, ConfigLoadError> {
    let contents =
        fs::read_to_string(path).map_err(|source| ConfigLoadError::FileIo {
            path: path.to_path_buf(),
            source,
        })?;
    let origin = path.display().to_string();

    match path.extension().and_then(|ext| ext.to_str()) {
        Some("json") => parse_json(&contents, &origin),
        Some("toml") | Some("tml") => parse_toml(&contents, &origin),
        _ => parse_from_str(&contents, &origin),
    }
}

pub fn parse_from_str(contents: &str, origin: &str) -> Result<Config, ConfigLoadError> {
    // Try TOML first, then JSON for convenience.
    toml::from_str(contents).or_else(|toml_err| {
        serde_json::from_str(contents).map_err(|json_err| ConfigLoadError::Parse {
            origin: origin.to_string(),
            message: format!("toml error: {toml_err}; json error: {json_err}"),
        })
    })
}

fn parse_toml(contents: &str, origin: &str) -> Result<Config, ConfigLoadError> {
    toml::from_str(contents).map_err(|err| ConfigLoadError::Parse {
        origin: origin.to_string(),
        message: err.to_string(),
    })
}

fn parse_json(contents: &str, origin: &str) -> Result<Config, ConfigLoadError> {
    serde_json::from_str(contents).map_err(|err| ConfigLoadError::Parse {
        origin: origin.to_string(),
        message: err.to_string(),
    })
}

fn apply_env_overrides<F>(config: &mut Config, var: &F) -> Result<(), ConfigLoadError>
where
    F: Fn(&str) -> Option<String>,
{
    for kind in [CollectionKind::Ebook, CollectionKind::Audiobook] {
        let prefix = format!("{ENV_PREFIX}_{}", kind.as_str().to_ascii_uppercase());
        let key = |suffix: &str| format!("{prefix}_{suffix}");

        let base_url = var(&key("BASE_URL"));
        let api_key = var(&key("API_KEY"));
        let root_folder = var(&key("ROOT_FOLDER"));
        let quality_profile = var(&key("QUALITY_PROFILE_ID"));
        let tags = var(&key("TAGS"));
        let insecure = var(&key("INSECURE_SKIP_VERIFY"));

        let touched = [&base_url, &api_key, &root_folder, &quality_profile, &tags, &insecure]
            .iter()
            .any(|value| value.is_some());
        if !touched {
            continue;
        }

        let instance = config.catalogs.get_or_insert(kind);
        if let Some(value) = base_url {
            instance.base_url = value;
        }
        if let Some(value) = api_key {
            instance.api_key = value;
        }
        if let Some(value) = root_folder {
            instance.default_root_folder_path = value;
        }
        if let Some(value) = quality_profile {
            instance.default_quality_profile_id =
                value.trim().parse().map_err(|_| ConfigLoadError::InvalidEnv {
                    key: key("QUALITY_PROFILE_ID"),
                    message: format!("`{value}` is not an integer"),
                })?;
        }
        if let Some(value) = tags {
            instance.default_tags = parse_tag_list(&value).ok_or_else(|| {
                ConfigLoadError::InvalidEnv {
                    key: key("TAGS"),
                    message: format!("`{value}` is not a comma separated list of integers"),
                }
            })?;
        }
        if let Some(value) = insecure {
            instance.insecure_skip_verify = parse_bool(&value).ok_or_else(|| {
                ConfigLoadError::InvalidEnv {
                    key: key("INSECURE_SKIP_VERIFY"),
                    message: format!("`{value}` is not a boolean"),
                }
            })?;
        }
    }

    Ok(())
}

fn parse_tag_list(raw: &str) -> Option<Vec<i64>> {
    raw.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| part.parse::<i64>().ok())
        .collect()
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_lists_parse_or_fail_as_a_whole() {
        assert_eq!(parse_tag_list("1, 2,3"), Some(vec![1, 2, 3]));
        assert_eq!(parse_tag_list(""), Some(vec![]));
        assert_eq!(parse_tag_list("1,x"), None);
    }

    #[test]
    fn booleans_accept_common_spellings() {
        assert_eq!(parse_bool("YES"), Some(true));
        assert_eq!(parse_bool("off"), Some(false));
        assert_eq!(parse_bool("maybe"), None);
    }
}
