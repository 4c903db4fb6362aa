pub mod tracing;

use axum_extra::extract::cookie::Key;
use figment::{providers::Format, Figment};
use serde::Deserialize;

#[derive(Deserialize, Debug, Clone)]
pub struct AppCfg {
    /// Without one the server keeps everything in memory.
    #[serde(default)]
    pub database_url: Option<String>,
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    #[serde(default = "default_pool_size")]
    pub db_pool_size: usize,
    #[serde(default)]
    pub session_secret: Option<String>,
    #[serde(default = "default_templates")]
    pub templates: String,
    #[serde(default = "default_assets_dir")]
    pub assets_dir: String,
}

fn default_listen_addr() -> String {
    "0.0.0.0:3000".into()
}

fn default_pool_size() -> usize {
    10
}

fn default_templates() -> String {
    "templates/**/*".into()
}

fn default_assets_dir() -> String {
    "./assets/".into()
}

impl AppCfg {
    pub fn load() -> Result<Self, figment::Error> {
        Figment::new()
            .merge(figment::providers::Json::file("appsettings.json"))
            .merge(figment::providers::Env::prefixed("APP_"))
            .extract()
    }

    /// Signing key for the session cookie. A missing secret yields a random key, so
    /// sessions do not survive a restart.
    pub fn session_key(&self) -> anyhow::Result<Key> {
        match &self.session_secret {
            Some(secret) => Key::try_from(secret.as_bytes()).map_err(|_| {
                anyhow::anyhow!(
                    "session_secret must be at least 64 bytes, got {}",
                    secret.len()
                )
            }),
            None => {
                ::tracing::warn!("no session_secret configured, generating an ephemeral key");
                Ok(Key::generate())
            }
        }
    }
}
