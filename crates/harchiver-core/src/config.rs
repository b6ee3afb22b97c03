use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

/// How entries reach the archive file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WriteMode {
    /// Rewrite the whole document to a temp file and rename it over the archive.
    /// Readers never see a partial file.
    #[default]
    Rewrite,
    /// Append each entry in place before the closing brackets. Cheaper for large
    /// archives, but a crash mid-write can leave the file incomplete.
    Append,
}

/// Options for the `record` command's transport (optional section in config.toml).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordConfig {
    /// Redirect hops followed per URL before giving up.
    pub max_redirects: u32,
    pub connect_timeout_secs: u64,
    pub timeout_secs: u64,
    /// Sent as `User-Agent` unless the command line sets one.
    #[serde(default)]
    pub user_agent: Option<String>,
}

impl Default for RecordConfig {
    fn default() -> Self {
        Self {
            max_redirects: 10,
            connect_timeout_secs: 15,
            timeout_secs: 30,
            user_agent: None,
        }
    }
}

/// Global configuration loaded from `~/.config/harchiver/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarchiverConfig {
    pub write_mode: WriteMode,
    /// Request/response bodies larger than this are left out of the archive
    /// (their size is still recorded).
    pub max_body_bytes: usize,
    /// Pretty-print the archive (rewrite mode only).
    pub pretty: bool,
    /// fsync after every write.
    pub sync_writes: bool,
    #[serde(default)]
    pub record: Option<RecordConfig>,
}

impl Default for HarchiverConfig {
    fn default() -> Self {
        Self {
            write_mode: WriteMode::Rewrite,
            max_body_bytes: 1024 * 1024,
            pretty: false,
            sync_writes: true,
            record: None,
        }
    }
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("harchiver")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<HarchiverConfig> {
    let path = config_path()?;
    if !path.exists() {
        let default_cfg = HarchiverConfig::default();
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, toml)?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }

    let data = fs::read_to_string(&path)?;
    let cfg: HarchiverConfig = toml::from_str(&data)?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_values() {
        let cfg = HarchiverConfig::default();
        assert_eq!(cfg.write_mode, WriteMode::Rewrite);
        assert_eq!(cfg.max_body_bytes, 1024 * 1024);
        assert!(!cfg.pretty);
        assert!(cfg.sync_writes);
        assert!(cfg.record.is_none());
    }

    #[test]
    fn config_toml_roundtrip() {
        let cfg = HarchiverConfig::default();
        let toml = toml::to_string_pretty(&cfg).unwrap();
        let parsed: HarchiverConfig = toml::from_str(&toml).unwrap();
        assert_eq!(parsed.write_mode, cfg.write_mode);
        assert_eq!(parsed.max_body_bytes, cfg.max_body_bytes);
        assert_eq!(parsed.sync_writes, cfg.sync_writes);
    }

    #[test]
    fn config_toml_append_and_record_section() {
        let toml = r#"
            write_mode = "append"
            max_body_bytes = 4096
            pretty = true
            sync_writes = false

            [record]
            max_redirects = 3
            connect_timeout_secs = 5
            timeout_secs = 10
            user_agent = "harchiver-test"
        "#;
        let cfg: HarchiverConfig = toml::from_str(toml).unwrap();
        assert_eq!(cfg.write_mode, WriteMode::Append);
        assert_eq!(cfg.max_body_bytes, 4096);
        assert!(cfg.pretty);
        assert!(!cfg.sync_writes);
        let record = cfg.record.as_ref().unwrap();
        assert_eq!(record.max_redirects, 3);
        assert_eq!(record.timeout_secs, 10);
        assert_eq!(record.user_agent.as_deref(), Some("harchiver-test"));
    }

    #[test]
    fn config_toml_rejects_unknown_write_mode() {
        let toml = r#"
            write_mode = "mmap"
            max_body_bytes = 1
            pretty = false
            sync_writes = false
        "#;
        assert!(toml::from_str::<HarchiverConfig>(toml).is_err());
    }
}
