use crate::errors::StbtError;
use crate::runtime::{FileSystem, ProductionFileSystem};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, OnceLock};
use toml::{Table, Value};

pub const CONFIG_FILE_ENV: &str = "STBT_CONFIG_FILE";

const DEFAULT_CONFIG: &str = r#"
[global]
verbose = 0
"#;

pub type EnvMap = HashMap<String, String>;

/// Where configuration comes from, lowest precedence first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigSources {
    pub files: Vec<PathBuf>,
}

impl ConfigSources {
    /// `STBT_CONFIG_FILE` is colon-separated with the first entry winning, so the
    /// list is reversed into ascending precedence. `explicit` beats all of them.
    pub fn resolve(env: &EnvMap, explicit: Option<PathBuf>) -> Self {
        let mut files = env
            .get(CONFIG_FILE_ENV)
            .map(|value| {
                value
                    .split(':')
                    .filter(|part| !part.trim().is_empty())
                    .map(PathBuf::from)
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();
        files.reverse();
        files.extend(explicit);
        Self { files }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    table: Table,
}

impl Default for Config {
    fn default() -> Self {
        let table = DEFAULT_CONFIG
            .parse::<Table>()
            .unwrap_or_else(|_| Table::new());
        Self { table }
    }
}

impl Config {
    pub fn from_toml_str(text: &str) -> Result<Self, StbtError> {
        let mut cfg = Self::default();
        cfg.merge_str(text)?;
        Ok(cfg)
    }

    /// Overlays `text` onto this config, key by key within each section.
    pub fn merge_str(&mut self, text: &str) -> Result<(), StbtError> {
        let overlay = text
            .parse::<Table>()
            .map_err(|e| StbtError::ConfigParse(e.to_string()))?;
        for (section, value) in overlay {
            match (self.table.get_mut(&section), value) {
                (Some(Value::Table(existing)), Value::Table(incoming)) => {
                    existing.extend(incoming);
                }
                (_, value) => {
                    self.table.insert(section, value);
                }
            }
        }
        Ok(())
    }

    pub fn get<T: ConfigType>(&self, section: &str, key: &str) -> Result<T, StbtError> {
        let value = self
            .table
            .get(section)
            .and_then(Value::as_table)
            .and_then(|table| table.get(key))
            .ok_or_else(|| StbtError::MissingConfig {
                section: section.to_string(),
                key: key.to_string(),
            })?;
        T::from_value(value).ok_or_else(|| {
            StbtError::InvalidConfig(format!(
                "{section}.{key} must be {}, got {value}",
                T::TYPE_NAME
            ))
        })
    }
}

pub trait ConfigType: Sized {
    const TYPE_NAME: &'static str;
    fn from_value(value: &Value) -> Option<Self>;
}

impl ConfigType for i64 {
    const TYPE_NAME: &'static str = "an integer";

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Integer(v) => Some(*v),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

impl ConfigType for u32 {
    const TYPE_NAME: &'static str = "a non-negative integer";

    fn from_value(value: &Value) -> Option<Self> {
        i64::from_value(value).and_then(|v| u32::try_from(v).ok())
    }
}

impl ConfigType for f64 {
    const TYPE_NAME: &'static str = "a number";

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Float(v) => Some(*v),
            Value::Integer(v) => Some(*v as f64),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

impl ConfigType for bool {
    const TYPE_NAME: &'static str = "a boolean";

    fn from_value(value: &Value) -> Option<Self> {
        value.as_bool()
    }
}

impl ConfigType for String {
    const TYPE_NAME: &'static str = "a string";

    fn from_value(value: &Value) -> Option<Self> {
        value.as_str().map(str::to_string)
    }
}

pub fn load_config(sources: &ConfigSources, fs: &dyn FileSystem) -> Result<Config, StbtError> {
    let mut cfg = Config::default();
    for path in &sources.files {
        let text = fs.read_to_string(path)?;
        cfg.merge_str(&text)?;
    }
    Ok(cfg)
}

static INSTALLED_CONFIG: OnceLock<Mutex<Option<Arc<Config>>>> = OnceLock::new();

fn config_slot() -> &'static Mutex<Option<Arc<Config>>> {
    INSTALLED_CONFIG.get_or_init(|| Mutex::new(None))
}

/// Makes `cfg` the process-wide configuration read by [`get_config`].
pub fn install_config(cfg: Config) {
    let mut slot = config_slot()
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    *slot = Some(Arc::new(cfg));
}

fn installed_config() -> Result<Arc<Config>, StbtError> {
    let mut slot = config_slot()
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    if let Some(cfg) = slot.as_ref() {
        return Ok(Arc::clone(cfg));
    }
    let env = std::env::vars().collect::<EnvMap>();
    let cfg = Arc::new(load_config(
        &ConfigSources::resolve(&env, None),
        &ProductionFileSystem,
    )?);
    *slot = Some(Arc::clone(&cfg));
    Ok(cfg)
}

/// Typed lookup of `section.key` in the process-wide configuration.
pub fn get_config<T: ConfigType>(section: &str, key: &str) -> Result<T, StbtError> {
    installed_config()?.get(section, key)
}

#[cfg(test)]
mod tests {
    use super::{load_config, Config, ConfigSources, EnvMap, CONFIG_FILE_ENV};
    use crate::errors::StbtError;
    use crate::runtime::{FakeFileSystem, FileSystem};
    use std::path::{Path, PathBuf};

    #[test]
    fn defaults_set_global_verbose_to_zero() {
        let cfg = Config::default();
        assert_eq!(cfg.get::<i64>("global", "verbose").expect("verbose"), 0);
    }

    #[test]
    fn overlay_replaces_keys_but_keeps_siblings() {
        let cfg = Config::from_toml_str(
            "[global]\nverbose = 2\nsource_pipeline = \"videotestsrc\"\n",
        )
        .expect("parse");
        assert_eq!(cfg.get::<u32>("global", "verbose").expect("verbose"), 2);
        assert_eq!(
            cfg.get::<String>("global", "source_pipeline").expect("pipeline"),
            "videotestsrc"
        );
    }

    #[test]
    fn integer_keys_accept_decimal_strings() {
        let cfg = Config::from_toml_str("[global]\nverbose = \"1\"\n").expect("parse");
        assert_eq!(cfg.get::<i64>("global", "verbose").expect("verbose"), 1);
    }

    #[test]
    fn missing_and_mistyped_keys_are_errors() {
        let cfg = Config::from_toml_str("[global]\nverbose = true\n").expect("parse");
        assert!(matches!(
            cfg.get::<i64>("global", "verbose"),
            Err(StbtError::InvalidConfig(_))
        ));
        assert!(matches!(
            cfg.get::<i64>("match", "threshold"),
            Err(StbtError::MissingConfig { .. })
        ));
        assert!(matches!(
            cfg.get::<u32>("global", "verbose"),
            Err(StbtError::InvalidConfig(_))
        ));
    }

    #[test]
    fn malformed_toml_is_a_parse_error() {
        assert!(matches!(
            Config::from_toml_str("[global\nverbose = 1"),
            Err(StbtError::ConfigParse(_))
        ));
    }

    #[test]
    fn env_files_are_listed_first_wins_and_explicit_path_beats_them() {
        let mut env = EnvMap::new();
        env.insert(CONFIG_FILE_ENV.to_string(), "/a.toml:/b.toml".to_string());
        let sources = ConfigSources::resolve(&env, Some(PathBuf::from("/cli.toml")));
        assert_eq!(
            sources.files,
            vec![
                PathBuf::from("/b.toml"),
                PathBuf::from("/a.toml"),
                PathBuf::from("/cli.toml")
            ]
        );

        let fs = FakeFileSystem::with_file("/a.toml", "[global]\nverbose = 1\n");
        fs.write_bytes(Path::new("/b.toml"), b"[global]\nverbose = 3\n")
            .expect("seed");
        let env_only = ConfigSources::resolve(&env, None);
        let cfg = load_config(&env_only, &fs).expect("load");
        assert_eq!(cfg.get::<i64>("global", "verbose").expect("verbose"), 1);
    }

    #[test]
    fn missing_config_file_propagates() {
        let fs = FakeFileSystem::default();
        let sources = ConfigSources {
            files: vec![PathBuf::from("/nope.toml")],
        };
        assert!(matches!(load_config(&sources, &fs), Err(StbtError::Io(_))));
    }
}
