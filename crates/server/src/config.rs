use std::{collections::HashMap, fs, path::PathBuf};

use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub server_bind: String,
    pub upload_dir: PathBuf,
    pub max_upload_bytes: usize,
    pub github_repo: String,
    pub github_branch: String,
    pub github_api_url: String,
    pub github_path_prefix: String,
    pub github_token: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server_bind: "0.0.0.0:5000".into(),
            upload_dir: PathBuf::from("/tmp/images"),
            max_upload_bytes: 16 * 1024 * 1024,
            github_repo: "NitinBot001/EasyFarms_assets".into(),
            github_branch: "main".into(),
            github_api_url: "https://api.github.com".into(),
            github_path_prefix: "images".into(),
            github_token: None,
        }
    }
}

pub fn load_settings() -> Settings {
    let file = fs::read_to_string("server.toml").ok();
    load_settings_from(file.as_deref(), |key| std::env::var(key).ok())
}

/// Defaults, then the flat `server.toml` table, then environment variables.
pub fn load_settings_from(
    file: Option<&str>,
    env: impl Fn(&str) -> Option<String>,
) -> Settings {
    let mut settings = Settings::default();

    if let Some(raw) = file {
        match toml::from_str::<HashMap<String, String>>(raw) {
            Ok(file_cfg) => apply_file(&mut settings, &file_cfg),
            Err(error) => warn!(%error, "ignoring unreadable server.toml"),
        }
    }

    if let Some(v) = env("SERVER_BIND") {
        settings.server_bind = v;
    }
    if let Some(v) = env("APP__BIND_ADDR") {
        settings.server_bind = v;
    }

    if let Some(v) = env("UPLOAD_FOLDER") {
        settings.upload_dir = PathBuf::from(v);
    }
    if let Some(v) = env("APP__UPLOAD_DIR") {
        settings.upload_dir = PathBuf::from(v);
    }

    if let Some(v) = env("APP__MAX_UPLOAD_BYTES") {
        set_max_upload_bytes(&mut settings, &v);
    }

    if let Some(v) = env("GITHUB_REPO") {
        settings.github_repo = v;
    }
    if let Some(v) = env("GITHUB_BRANCH") {
        settings.github_branch = v;
    }
    if let Some(v) = env("GITHUB_API_URL") {
        settings.github_api_url = v;
    }
    if let Some(v) = env("APP__GITHUB_PATH_PREFIX") {
        settings.github_path_prefix = v;
    }
    if let Some(v) = env("GITHUB_PAT") {
        settings.github_token = Some(v);
    }
    settings.github_token = settings
        .github_token
        .take()
        .filter(|token| !token.trim().is_empty());

    settings
}

fn apply_file(settings: &mut Settings, file_cfg: &HashMap<String, String>) {
    if let Some(v) = file_cfg.get("bind_addr") {
        settings.server_bind = v.clone();
    }
    if let Some(v) = file_cfg.get("upload_dir") {
        settings.upload_dir = PathBuf::from(v);
    }
    if let Some(v) = file_cfg.get("max_upload_bytes") {
        set_max_upload_bytes(settings, v);
    }
    if let Some(v) = file_cfg.get("github_repo") {
        settings.github_repo = v.clone();
    }
    if let Some(v) = file_cfg.get("github_branch") {
        settings.github_branch = v.clone();
    }
    if let Some(v) = file_cfg.get("github_api_url") {
        settings.github_api_url = v.clone();
    }
    if let Some(v) = file_cfg.get("github_path_prefix") {
        settings.github_path_prefix = v.clone();
    }
}

fn set_max_upload_bytes(settings: &mut Settings, raw: &str) {
    match raw.trim().parse::<usize>() {
        Ok(parsed) if parsed > 0 => settings.max_upload_bytes = parsed,
        _ => warn!(value = raw, "ignoring invalid max_upload_bytes"),
    }
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
