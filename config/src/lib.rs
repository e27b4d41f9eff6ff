//! Load configuration from the noctua `config.toml` and project `.env`, then
//! apply it to the process environment with priority
//! **existing env > .env > config.toml**.
//!
//! The runtime reads everything through environment variables afterwards
//! (`RuntimeConfig::from_env` in the noctua crate), so this crate is the
//! single place where files become env. Keys the runtime knows about:
//!
//! | Key | Meaning |
//! |---|---|
//! | `NOCTUA_GATEWAY_ADDR` | Bind address for the gateway (default `127.0.0.1:18789`) |
//! | `NOCTUA_GATEWAY_TOKEN` | Optional shared token adapters must present |
//! | `NOCTUA_PROJECT_DIR` | Project directory holding `noctua.db`, `vault.salt`, `vault.enc`, `scratchpad.md` |
//! | `NOCTUA_PERMISSION_MODE` | `ask_always` \| `smart_auto` \| `full_auto` |
//! | `NOCTUA_VAULT_PASSWORD` | Master password used to unlock the vault at boot |
//! | `OPENAI_API_KEY` / `ANTHROPIC_API_KEY` | Provider credentials |

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum LoadError {
    #[error("read config.toml: {0}")]
    TomlRead(std::io::Error),
    #[error("parse config.toml: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("read .env: {0}")]
    DotenvRead(std::io::Error),
}

#[derive(serde::Deserialize, Default)]
struct ConfigFile {
    #[serde(default)]
    env: HashMap<String, String>,
}

fn config_toml_path(app_name: &str) -> Option<PathBuf> {
    let base = std::env::var_os("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .or_else(dirs::config_dir);
    let path = base?.join(app_name).join("config.toml");
    path.is_file().then_some(path)
}

fn load_toml_env(app_name: &str) -> Result<HashMap<String, String>, LoadError> {
    let Some(path) = config_toml_path(app_name) else {
        return Ok(HashMap::new());
    };
    let content = std::fs::read_to_string(&path).map_err(LoadError::TomlRead)?;
    let file: ConfigFile = toml::from_str(&content)?;
    Ok(file.env)
}

/// KEY=VALUE lines, `#` comments, surrounding quotes stripped. No multiline.
fn parse_dotenv(content: &str) -> HashMap<String, String> {
    let mut out = HashMap::new();
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim();
        if key.is_empty() {
            continue;
        }
        let value = value.trim();
        let value = value
            .strip_prefix('"')
            .and_then(|v| v.strip_suffix('"'))
            .map(|v| v.replace("\\\"", "\""))
            .or_else(|| {
                value
                    .strip_prefix('\'')
                    .and_then(|v| v.strip_suffix('\''))
                    .map(str::to_string)
            })
            .unwrap_or_else(|| value.to_string());
        out.insert(key.to_string(), value);
    }
    out
}

fn load_dotenv(dir: Option<&Path>) -> Result<HashMap<String, String>, LoadError> {
    let dir = match dir {
        Some(d) => d.to_path_buf(),
        None => std::env::current_dir().map_err(LoadError::DotenvRead)?,
    };
    let path = dir.join(".env");
    if !path.is_file() {
        return Ok(HashMap::new());
    }
    let content = std::fs::read_to_string(&path).map_err(LoadError::DotenvRead)?;
    Ok(parse_dotenv(&content))
}

/// Loads `~/.config/<app_name>/config.toml` (its `[env]` table) and the
/// project `.env` (from `project_dir` or the current directory) and sets each
/// key that is **not** already in the process environment, so existing env
/// always wins, then `.env`, then the toml file.
pub fn load_and_apply(app_name: &str, project_dir: Option<&Path>) -> Result<(), LoadError> {
    let toml_env = load_toml_env(app_name)?;
    let dotenv = load_dotenv(project_dir)?;

    let mut keys: std::collections::HashSet<&String> = toml_env.keys().collect();
    keys.extend(dotenv.keys());

    for key in keys {
        if std::env::var_os(key).is_some() {
            continue;
        }
        if let Some(value) = dotenv.get(key).or_else(|| toml_env.get(key)) {
            std::env::set_var(key, value);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_dotenv_basics() {
        let m = parse_dotenv("A=1\n# comment\nB = \"two words\"\nC='x'\n\nBROKEN\n=skipped\n");
        assert_eq!(m.get("A").map(String::as_str), Some("1"));
        assert_eq!(m.get("B").map(String::as_str), Some("two words"));
        assert_eq!(m.get("C").map(String::as_str), Some("x"));
        assert_eq!(m.len(), 3);
    }

    #[test]
    fn parse_dotenv_escaped_quote() {
        let m = parse_dotenv(r#"K="say \"hi\"""#);
        assert_eq!(m.get("K").map(String::as_str), Some(r#"say "hi""#));
    }

    #[test]
    fn existing_env_wins() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(".env"), "NOCTUA_CFG_TEST_A=from_dotenv\n").unwrap();
        std::env::set_var("NOCTUA_CFG_TEST_A", "from_env");
        load_and_apply("noctua-config-test-none", Some(dir.path())).unwrap();
        assert_eq!(
            std::env::var("NOCTUA_CFG_TEST_A").as_deref(),
            Ok("from_env")
        );
        std::env::remove_var("NOCTUA_CFG_TEST_A");
    }

    #[test]
    fn dotenv_applied_when_env_unset() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(".env"), "NOCTUA_CFG_TEST_B=from_dotenv\n").unwrap();
        std::env::remove_var("NOCTUA_CFG_TEST_B");
        load_and_apply("noctua-config-test-none", Some(dir.path())).unwrap();
        assert_eq!(
            std::env::var("NOCTUA_CFG_TEST_B").as_deref(),
            Ok("from_dotenv")
        );
        std::env::remove_var("NOCTUA_CFG_TEST_B");
    }

    #[test]
    fn missing_files_ok() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_and_apply("noctua-config-test-none", Some(dir.path())).is_ok());
    }
}
