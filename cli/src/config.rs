use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::Deserialize;
use std::path::{Path, PathBuf};

const URL_ENV: &str = "LARDER_SUPABASE_URL";
const KEY_ENV: &str = "LARDER_SUPABASE_ANON_KEY";

/// Contents of `config.toml`.
#[derive(Debug, Default, Deserialize)]
struct FileConfig {
    #[serde(default)]
    supabase: FileSupabase,
}

/// The `[supabase]` table. Either field may come from the environment instead.
#[derive(Debug, Default, PartialEq, Eq, Deserialize)]
struct FileSupabase {
    url: Option<String>,
    anon_key: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupabaseSettings {
    pub url: String,
    pub anon_key: String,
}

pub struct Config {
    pub db_path: PathBuf,
    pub config_path: PathBuf,
    pub supabase: Option<SupabaseSettings>,
}

impl Config {
    pub fn load() -> Result<Self> {
        let proj_dirs =
            ProjectDirs::from("", "", "larder").context("Could not determine home directory")?;

        let data_dir = proj_dirs.data_dir().to_path_buf();
        std::fs::create_dir_all(&data_dir)
            .with_context(|| format!("Failed to create data directory: {}", data_dir.display()))?;

        let config_path = proj_dirs.config_dir().join("config.toml");
        let file = read_config_file(&config_path)?;
        let supabase = resolve_supabase(
            file.supabase,
            std::env::var(URL_ENV).ok(),
            std::env::var(KEY_ENV).ok(),
        );

        Ok(Config {
            db_path: data_dir.join("larder.db"),
            config_path,
            supabase,
        })
    }
}

fn read_config_file(path: &Path) -> Result<FileConfig> {
    if !path.exists() {
        return Ok(FileConfig::default());
    }
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    toml::from_str(&text).with_context(|| format!("Invalid config file: {}", path.display()))
}

/// Each field comes from its environment variable if set, else from the
/// file. A URL without a key (or the reverse) counts as not configured.
fn resolve_supabase(
    file: FileSupabase,
    env_url: Option<String>,
    env_key: Option<String>,
) -> Option<SupabaseSettings> {
    let pick = |env: Option<String>, file: Option<String>| {
        env.into_iter()
            .chain(file)
            .map(|v| v.trim().to_string())
            .find(|v| !v.is_empty())
    };
    Some(SupabaseSettings {
        url: pick(env_url, file.url)?,
        anon_key: pick(env_key, file.anon_key)?,
    })
}
