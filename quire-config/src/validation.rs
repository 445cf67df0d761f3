use quire_model::CollectionKind;
use thiserror::Error;
use url::Url;

use super::models::{CatalogInstanceConfig, Config};

#[derive(Debug, Error)]
pub enum ConfigGuardRailError {
    #[error("{kind} catalog base_url `{value}` is not a valid http(s) URL")]
    InvalidBaseUrl { kind: CollectionKind, value: String },
    #[error("{kind} catalog add_method `{value}` must be one of POST, PUT or GET")]
    InvalidAddMethod { kind: CollectionKind, value: String },
    #[error("engine setting {field} must be greater than zero")]
    ZeroDuration { field: &'static str },
}

#[derive(Debug, Clone)]
pub struct ConfigWarning {
    pub message: String,
    pub hint: Option<String>,
}

#[derive(Debug, Default, Clone)]
pub struct ConfigWarnings {
    pub items: Vec<ConfigWarning>,
}

impl ConfigWarnings {
    pub fn push<S: Into<String>>(&mut self, message: S) {
        self.items.push(ConfigWarning {
            message: message.into(),
            hint: None,
        });
    }

    pub fn push_with_hint<S: Into<String>, H: Into<String>>(
        &mut self,
        message: S,
        hint: H,
    ) {
        self.items.push(ConfigWarning {
            message: message.into(),
            hint: Some(hint.into()),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn extend(&mut self, other: ConfigWarnings) {
        self.items.extend(other.items);
    }
}

pub fn apply_guard_rails(
    config: &Config,
) -> Result<ConfigWarnings, ConfigGuardRailError> {
    let mut warnings = ConfigWarnings::default();

    let engine = &config.engine;
    for (field, value) in [
        ("lookup_timeout", engine.lookup_timeout),
        ("probe_timeout", engine.probe_timeout),
        ("submit_timeout", engine.submit_timeout),
        ("approval_token_ttl", engine.approval_token_ttl),
        ("monitor.interval", engine.monitor.interval),
        ("monitor.budget", engine.monitor.budget),
        ("monitor.attempt_timeout", engine.monitor.attempt_timeout),
    ] {
        if value.is_zero() {
            return Err(ConfigGuardRailError::ZeroDuration { field });
        }
    }

    if engine.monitor.interval > engine.monitor.budget {
        warnings.push_with_hint(
            "monitor.interval exceeds monitor.budget; only the immediate monitor update will run",
            "Lower engine.monitor.interval or raise engine.monitor.budget",
        );
    }

    let mut any_configured = false;
    for kind in [CollectionKind::Ebook, CollectionKind::Audiobook] {
        let Some(instance) = config.catalogs.get(kind) else {
            continue;
        };
        validate_instance(kind, instance, &mut warnings)?;
        any_configured |= instance.is_configured();
    }

    if !any_configured {
        warnings.push_with_hint(
            "No catalog service configured; approvals will be recorded without submission",
            "Set catalogs.ebook.base_url/api_key or QUIRE_EBOOK_BASE_URL/QUIRE_EBOOK_API_KEY",
        );
    }

    Ok(warnings)
}

fn validate_instance(
    kind: CollectionKind,
    instance: &CatalogInstanceConfig,
    warnings: &mut ConfigWarnings,
) -> Result<(), ConfigGuardRailError> {
    if instance.base_url.is_empty() {
        if !instance.api_key.is_empty() {
            warnings.push(format!(
                "{kind} catalog has an api_key but no base_url; it will be ignored"
            ));
        }
        return Ok(());
    }

    let parsed = Url::parse(&instance.base_url).map_err(|_| {
        ConfigGuardRailError::InvalidBaseUrl {
            kind,
            value: instance.base_url.clone(),
        }
    })?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(ConfigGuardRailError::InvalidBaseUrl {
            kind,
            value: instance.base_url.clone(),
        });
    }

    if !matches!(instance.add_method.as_str(), "POST" | "PUT" | "GET") {
        return Err(ConfigGuardRailError::InvalidAddMethod {
            kind,
            value: instance.add_method.clone(),
        });
    }

    if instance.api_key.is_empty() {
        warnings.push_with_hint(
            format!("{kind} catalog base_url set without api_key; it will be ignored"),
            format!("Set QUIRE_{}_API_KEY", kind.as_str().to_ascii_uppercase()),
        );
    }

    if instance.insecure_skip_verify {
        warnings.push(format!(
            "{kind} catalog TLS certificate verification is disabled"
        ));
    }

    if instance.default_root_folder_path.is_empty() {
        warnings.push_with_hint(
            format!("{kind} catalog has no default_root_folder_path"),
            "The first root folder reported by the service will be used",
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with(instance: CatalogInstanceConfig) -> Config {
        let mut config = Config::default();
        config.catalogs.ebook = Some(instance);
        config
    }

    #[test]
    fn empty_config_only_warns() {
        let warnings = apply_guard_rails(&Config::default()).unwrap();
        assert_eq!(warnings.items.len(), 1);
        assert!(warnings.items[0].message.contains("No catalog service"));
    }

    #[test]
    fn rejects_non_http_base_url() {
        let config =
            config_with(CatalogInstanceConfig::new("ftp://readarr", "key"));
        let err = apply_guard_rails(&config).unwrap_err();
        assert!(matches!(err, ConfigGuardRailError::InvalidBaseUrl { .. }));
    }

    #[test]
    fn rejects_unknown_add_method() {
        let mut instance =
            CatalogInstanceConfig::new("http://readarr:8787/api/v1", "key");
        instance.add_method = "PATCH".into();
        let err = apply_guard_rails(&config_with(instance)).unwrap_err();
        assert!(matches!(err, ConfigGuardRailError::InvalidAddMethod { .. }));
    }

    #[test]
    fn insecure_tls_is_a_warning() {
        let mut instance =
            CatalogInstanceConfig::new("https://readarr/api/v1", "key");
        instance.insecure_skip_verify = true;
        instance.default_root_folder_path = "/books".into();
        let warnings = apply_guard_rails(&config_with(instance)).unwrap();
        assert_eq!(warnings.items.len(), 1);
        assert!(warnings.items[0].message.contains("verification is disabled"));
    }

    #[test]
    fn zero_monitor_interval_is_rejected() {
        let mut config = Config::default();
        config.engine.monitor.interval = std::time::Duration::ZERO;
        let err = apply_guard_rails(&config).unwrap_err();
        assert!(matches!(
            err,
            ConfigGuardRailError::ZeroDuration { field: "monitor.interval" }
        ));
    }
}
