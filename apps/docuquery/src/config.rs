use std::{fs, path::Path, time::Duration};

use anyhow::Context;
use client_core::{ClientOptions, DEFAULT_API_URL, DEFAULT_SESSION_SCOPE};
use serde::Deserialize;
use shared::protocol::DEFAULT_ANSWER_FIELDS;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub api_url: String,
    pub database_url: String,
    pub session_scope: String,
    pub answer_fields: Vec<String>,
    pub max_upload_mb: Option<u64>,
    pub request_timeout_secs: Option<u64>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.into(),
            database_url: "sqlite://./data/docuquery.db".into(),
            session_scope: DEFAULT_SESSION_SCOPE.into(),
            answer_fields: DEFAULT_ANSWER_FIELDS.iter().map(|f| f.to_string()).collect(),
            max_upload_mb: None,
            request_timeout_secs: None,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct FileSettings {
    api_url: Option<String>,
    database_url: Option<String>,
    session_scope: Option<String>,
    answer_fields: Option<Vec<String>>,
    max_upload_mb: Option<u64>,
    request_timeout_secs: Option<u64>,
}

impl Settings {
    pub fn client_options(&self) -> ClientOptions {
        ClientOptions {
            api_url: self.api_url.clone(),
            answer_fields: self.answer_fields.clone(),
            max_upload_bytes: self.max_upload_mb.map(|mb| mb.saturating_mul(1024 * 1024)),
            request_timeout: self.request_timeout_secs.map(Duration::from_secs),
        }
    }

    fn apply_file(&mut self, file_cfg: FileSettings) {
        if let Some(v) = file_cfg.api_url {
            self.api_url = v;
        }
        if let Some(v) = file_cfg.database_url {
            self.database_url = v;
        }
        if let Some(v) = file_cfg.session_scope {
            self.session_scope = v;
        }
        if let Some(v) = file_cfg.answer_fields.filter(|fields| !fields.is_empty()) {
            self.answer_fields = v;
        }
        if file_cfg.max_upload_mb.is_some() {
            self.max_upload_mb = file_cfg.max_upload_mb;
        }
        if file_cfg.request_timeout_secs.is_some() {
            self.request_timeout_secs = file_cfg.request_timeout_secs;
        }
    }

    /// Later keys win, so `APP__*` overrides the bare names.
    fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        for key in ["VITE_API_URL", "API_URL", "APP__API_URL"] {
            if let Some(v) = var(key) {
                self.api_url = v;
            }
        }
        for key in ["DATABASE_URL", "APP__DATABASE_URL"] {
            if let Some(v) = var(key) {
                self.database_url = v;
            }
        }
        if let Some(v) = var("APP__SESSION_SCOPE") {
            self.session_scope = v;
        }
        if let Some(v) = var("APP__ANSWER_FIELDS") {
            let fields: Vec<String> = v
                .split(',')
                .map(str::trim)
                .filter(|field| !field.is_empty())
                .map(str::to_string)
                .collect();
            if !fields.is_empty() {
                self.answer_fields = fields;
            }
        }
        for key in ["MAX_PDF_SIZE_MB", "APP__MAX_UPLOAD_MB"] {
            if let Some(parsed) = var(key).and_then(|v| v.trim().parse::<u64>().ok()) {
                self.max_upload_mb = Some(parsed);
            }
        }
        if let Some(parsed) =
            var("APP__REQUEST_TIMEOUT_SECS").and_then(|v| v.trim().parse::<u64>().ok())
        {
            self.request_timeout_secs = Some(parsed).filter(|secs| *secs > 0);
        }
    }
}

/// Defaults, then the optional TOML file, then environment variables.
pub fn load_settings(config_path: &Path) -> anyhow::Result<Settings> {
    let mut settings = Settings::default();

    if config_path.exists() {
        let raw = fs::read_to_string(config_path)
            .with_context(|| format!("failed to read config file '{}'", config_path.display()))?;
        let file_cfg: FileSettings = toml::from_str(&raw)
            .with_context(|| format!("invalid config file '{}'", config_path.display()))?;
        settings.apply_file(file_cfg);
    }

    settings.apply_env(|key| std::env::var(key).ok());
    Ok(settings)
}

pub fn normalize_database_url(raw_database_url: &str) -> String {
    let raw_database_url = raw_database_url.trim();

    if raw_database_url.is_empty() {
        return Settings::default().database_url;
    }

    if raw_database_url.starts_with("sqlite:") || raw_database_url.contains("://") {
        return raw_database_url.to_string();
    }

    format!("sqlite://{}", raw_database_url.replace('\\', "/"))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_have_no_size_guard_or_timeout() {
        let options = Settings::default().client_options();
        assert!(options.max_upload_bytes.is_none());
        assert!(options.request_timeout.is_none());
        assert_eq!(options.answer_fields, vec!["answer", "reply", "response"]);
    }

    #[test]
    fn prefixed_env_overrides_plain_env() {
        let mut settings = Settings::default();
        settings.apply_env(env(&[
            ("API_URL", "http://plain:8000"),
            ("APP__API_URL", "http://prefixed:8000"),
            ("APP__ANSWER_FIELDS", " reply , ,answer"),
            ("APP__MAX_UPLOAD_MB", "5"),
            ("APP__REQUEST_TIMEOUT_SECS", "30"),
        ]));

        assert_eq!(settings.api_url, "http://prefixed:8000");
        assert_eq!(settings.answer_fields, vec!["reply", "answer"]);
        let options = settings.client_options();
        assert_eq!(options.max_upload_bytes, Some(5 * 1024 * 1024));
        assert_eq!(options.request_timeout, Some(Duration::from_secs(30)));
    }

    #[test]
    fn huge_upload_limit_saturates() {
        let mut settings = Settings::default();
        settings.apply_env(env(&[("MAX_PDF_SIZE_MB", "18446744073709551615")]));
        assert_eq!(settings.client_options().max_upload_bytes, Some(u64::MAX));
    }

    #[test]
    fn unparsable_numbers_are_ignored() {
        let mut settings = Settings::default();
        settings.apply_env(env(&[
            ("APP__MAX_UPLOAD_MB", "five"),
            ("APP__REQUEST_TIMEOUT_SECS", "0"),
        ]));
        assert_eq!(settings.max_upload_mb, None);
        assert_eq!(settings.request_timeout_secs, None);
    }

    #[test]
    fn file_settings_apply_before_env() {
        let temp_dir = tempfile::tempdir().expect("tempdir");
        let path = temp_dir.path().join("docuquery.toml");
        fs::write(
            &path,
            r#"
api_url = "http://from-file:9000"
session_scope = "work"
answer_fields = ["response"]
max_upload_mb = 10
"#,
        )
        .expect("write config");

        let raw = fs::read_to_string(&path).expect("read");
        let mut settings = Settings::default();
        settings.apply_file(toml::from_str(&raw).expect("parse"));
        assert_eq!(settings.api_url, "http://from-file:9000");
        assert_eq!(settings.session_scope, "work");
        assert_eq!(settings.answer_fields, vec!["response"]);
        assert_eq!(settings.max_upload_mb, Some(10));

        settings.apply_env(env(&[("APP__SESSION_SCOPE", "override")]));
        assert_eq!(settings.session_scope, "override");
        assert_eq!(settings.api_url, "http://from-file:9000");
    }

    #[test]
    fn invalid_config_file_is_reported() {
        let temp_dir = tempfile::tempdir().expect("tempdir");
        let path = temp_dir.path().join("docuquery.toml");
        fs::write(&path, "max_upload_mb = \"lots\"").expect("write config");
        assert!(load_settings(&path).is_err());
    }

    #[test]
    fn normalizes_plain_file_path_to_sqlite_url() {
        assert_eq!(
            normalize_database_url("./data/sessions.db"),
            "sqlite://./data/sessions.db"
        );
        assert_eq!(
            normalize_database_url("sqlite::memory:"),
            "sqlite::memory:"
        );
        assert_eq!(
            normalize_database_url("  "),
            Settings::default().database_url
        );
    }
}
