//! ---
//! culvert_section: "03-agent-surface"
//! culvert_subsection: "module"
//! culvert_type: "source"
//! culvert_scope: "code"
//! culvert_description: "JSON persistence of the supervised agent's config document."
//! culvert_version: "v0.1.0"
//! culvert_owner: "tbd"
//! ---
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use culvert_proto::Config;
use tokio::fs;
use tracing::info;

/// File-backed store of the agent configuration document.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    /// Store backed by `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Backing file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read and decode the document.
    pub async fn load(&self) -> Result<Config> {
        let contents = fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("failed to read config file {}", self.path.display()))?;
        let config = serde_json::from_str(&contents)
            .with_context(|| format!("failed to parse config file {}", self.path.display()))?;
        Ok(config)
    }

    /// Encode and persist the document.
    pub async fn save(&self, config: &Config) -> Result<()> {
        let mut serialised = config
            .to_pretty_json()
            .context("failed to serialise configuration")?;
        serialised.push('\n');
        fs::write(&self.path, serialised)
            .await
            .with_context(|| format!("failed to write config file {}", self.path.display()))?;
        info!(path = %self.path.display(), "configuration file replaced");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use culvert_proto::IngressRule;

    fn sample() -> Config {
        Config {
            tunnel: Some("edge-tunnel".to_string()),
            ingress: Some(vec![IngressRule {
                hostname: None,
                service: "http_status:404".to_string(),
                path: None,
            }]),
            ..Config::default()
        }
    }

    #[tokio::test]
    async fn save_then_load_roundtrips() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = ConfigStore::new(dir.path().join("config.json"));

        store.save(&sample()).await.expect("save");
        let loaded = store.load().await.expect("load");
        assert_eq!(loaded, sample());
    }

    #[tokio::test]
    async fn load_of_a_missing_file_names_the_path() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = ConfigStore::new(dir.path().join("absent.json"));

        let err = store.load().await.expect_err("missing file");
        assert!(err.to_string().contains("absent.json"));
    }

    #[tokio::test]
    async fn unknown_keys_survive_persistence() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.json");
        tokio::fs::write(
            &path,
            r#"{"ingress":[{"service":"http_status:404"}],"warp-routing":{"enabled":true}}"#,
        )
        .await
        .expect("seed");

        let store = ConfigStore::new(&path);
        let config = store.load().await.expect("load");
        store.save(&config).await.expect("save");

        let text = tokio::fs::read_to_string(&path).await.expect("read back");
        assert!(text.contains("warp-routing"));
    }
}
