use std::fmt::Write as _;
use std::fs;

use anyhow::{Context, Result, bail};
use camino::Utf8Path;
use oskit::os;
use serde::Deserialize;
use toml_edit::{DocumentMut, Item, Table, value};

use crate::templates;

const EXAMPLE_TEMPLATE: &str = "config/example.config.toml";

/// Root configuration document loaded from `.oskit/config.toml`.
#[derive(Debug, Default, Deserialize)]
pub struct OsKitConfig {
    #[serde(default)]
    pub files: FilesConfig,
    #[serde(default)]
    pub directories: DirectoriesConfig,
}

#[derive(Debug, Deserialize)]
pub struct FilesConfig {
    #[serde(default = "default_auto_flush")]
    pub auto_flush: bool,
}

impl Default for FilesConfig {
    fn default() -> Self {
        Self {
            auto_flush: default_auto_flush(),
        }
    }
}

fn default_auto_flush() -> bool {
    true
}

#[derive(Debug, Default, Deserialize)]
pub struct DirectoriesConfig {
    /// Octal string such as `"755"` or `"0o750"`.
    pub mode: Option<String>,
}

impl DirectoriesConfig {
    pub fn mode(&self) -> Result<u32> {
        match &self.mode {
            Some(raw) => parse_mode(raw),
            None => Ok(os::DEFAULT_DIRECTORY_MODE),
        }
    }
}

/// Parse an octal permission string, with or without a `0o` prefix.
pub fn parse_mode(raw: &str) -> Result<u32> {
    let trimmed = raw.trim();
    let digits = trimmed.strip_prefix("0o").unwrap_or(trimmed);
    let mode = u32::from_str_radix(digits, 8)
        .with_context(|| format!("invalid octal mode `{}`", raw))?;
    if mode > 0o7777 {
        bail!("mode `{}` is out of range (max 7777)", raw);
    }
    Ok(mode)
}

/// Load a configuration file from disk and deserialize it.
pub fn load_from_path(path: &Utf8Path) -> Result<OsKitConfig> {
    let raw = fs::read_to_string(path).with_context(|| format!("reading config {}", path))?;
    let config: OsKitConfig =
        toml::from_str(&raw).with_context(|| format!("parsing config {}", path))?;
    config.directories.mode()?;
    Ok(config)
}

/// Like [`load_from_path`], but a missing file yields the defaults.
pub fn load_or_default(path: &Utf8Path) -> Result<OsKitConfig> {
    if os::file_exists(path, true) {
        load_from_path(path)
    } else {
        Ok(OsKitConfig::default())
    }
}

pub fn write_example_config(path: &Utf8Path, overwrite: bool) -> Result<()> {
    if os::file_exists(path, false) && !overwrite {
        bail!("{} already exists; rerun with --force to overwrite", path);
    }

    templates::write_template(path, EXAMPLE_TEMPLATE)
}

/// Update a single setting in place, keeping the rest of the document intact.
pub fn set_value(path: &Utf8Path, key: &str, raw: &str) -> Result<()> {
    let mut doc: DocumentMut = if os::file_exists(path, true) {
        let raw = fs::read_to_string(path).with_context(|| format!("reading config {}", path))?;
        raw.parse()
            .with_context(|| format!("parsing config {}", path))?
    } else {
        DocumentMut::new()
    };

    let (section, field, item) = match key {
        "files.auto_flush" => {
            let flag: bool = raw
                .parse()
                .with_context(|| format!("`{}` expects true or false, got `{}`", key, raw))?;
            ("files", "auto_flush", value(flag))
        }
        "directories.mode" => {
            let mode = parse_mode(raw)?;
            ("directories", "mode", value(format!("{:o}", mode)))
        }
        other => bail!("unknown config key `{}`", other),
    };

    if !doc.as_table().contains_key(section) {
        doc[section] = Item::Table(Table::new());
    }
    let table = doc
        .get_mut(section)
        .and_then(Item::as_table_mut)
        .ok_or_else(|| anyhow::anyhow!("config has non-table `{}` entry", section))?;
    table.insert(field, item);

    templates::write_to(path, doc.to_string().as_bytes())
}

pub fn format_summary(config: &OsKitConfig) -> String {
    let mut out = String::new();
    let mode = config
        .directories
        .mode()
        .map(|mode| format!("{:o}", mode))
        .unwrap_or_else(|_| "<invalid>".to_owned());

    let _ = writeln!(out, "Auto-flush checks: {}", config.files.auto_flush);
    let _ = writeln!(out, "Directory mode: {}", mode);
    let _ = writeln!(out, "File mode: {:o}", os::DEFAULT_FILE_MODE);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino::Utf8PathBuf;

    fn temp_root() -> (tempfile::TempDir, Utf8PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
        (dir, root)
    }

    #[test]
    fn parse_mode_accepts_plain_and_prefixed_octal() {
        assert_eq!(parse_mode("755").unwrap(), 0o755);
        assert_eq!(parse_mode("0o700").unwrap(), 0o700);
        assert_eq!(parse_mode(" 0750 ").unwrap(), 0o750);
        assert!(parse_mode("789").is_err());
        assert!(parse_mode("").is_err());
        assert!(parse_mode("17777").is_err());
    }

    #[test]
    fn missing_config_yields_defaults() {
        let (_dir, root) = temp_root();
        let config = load_or_default(&root.join("absent.toml")).unwrap();
        assert!(config.files.auto_flush);
        assert_eq!(config.directories.mode().unwrap(), os::DEFAULT_DIRECTORY_MODE);
    }

    #[test]
    fn invalid_mode_is_rejected_on_load() {
        let (_dir, root) = temp_root();
        let path = root.join("config.toml");
        fs::write(&path, "[directories]\nmode = \"9\"\n").unwrap();
        assert!(load_from_path(&path).is_err());
    }

    #[test]
    fn generated_example_parses() {
        let (_dir, root) = temp_root();
        let path = root.join(".oskit").join("config.toml");
        write_example_config(&path, false).unwrap();

        let config = load_from_path(&path).unwrap();
        assert!(config.files.auto_flush);
        assert_eq!(config.directories.mode().unwrap(), 0o755);

        assert!(write_example_config(&path, false).is_err());
        write_example_config(&path, true).unwrap();
    }

    #[test]
    fn set_value_keeps_comments() {
        let (_dir, root) = temp_root();
        let path = root.join("config.toml");
        fs::write(&path, "# keep me\n[files]\nauto_flush = true\n").unwrap();

        set_value(&path, "files.auto_flush", "false").unwrap();
        set_value(&path, "directories.mode", "0o700").unwrap();

        let raw = fs::read_to_string(&path).unwrap();
        assert!(raw.contains("# keep me"));
        let config = load_from_path(&path).unwrap();
        assert!(!config.files.auto_flush);
        assert_eq!(config.directories.mode().unwrap(), 0o700);
    }

    #[test]
    fn set_value_rejects_unknown_keys() {
        let (_dir, root) = temp_root();
        let path = root.join("config.toml");
        assert!(set_value(&path, "files.mode", "644").is_err());
        assert!(set_value(&path, "files.auto_flush", "maybe").is_err());
        assert!(!os::file_exists(&path, false));
    }
}
