//! Application-level configuration loading, including the name pool used to provision tickets.

use std::{env, fs, io::ErrorKind, path::PathBuf};

use serde::Deserialize;
use tracing::{info, warn};

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "TICKET_BINGO_CONFIG_PATH";

#[derive(Debug, Clone)]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    names: Vec<String>,
    ticket_count: Option<usize>,
}

impl AppConfig {
    /// Load the application configuration from disk, falling back to the baked-in name pool.
    pub fn load() -> Self {
        let path = resolve_config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<RawConfig>(&contents) {
                Ok(raw) => {
                    let app_config: Self = raw.into();
                    info!(
                        path = %path.display(),
                        names = app_config.names.len(),
                        tickets = app_config.ticket_count(),
                        "loaded name pool from config"
                    );
                    app_config
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse config; falling back to defaults"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                Self::default()
            }
        }
    }

    /// Build a configuration from an explicit pool.
    pub fn new(names: Vec<String>, ticket_count: Option<usize>) -> Self {
        RawConfig {
            names,
            ticket_count,
        }
        .into()
    }

    /// Names seeded into the pool at provisioning time.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Number of tickets pre-generated when the store is empty.
    ///
    /// Defaults to one ticket per pool name.
    pub fn ticket_count(&self) -> usize {
        self.ticket_count.unwrap_or(self.names.len())
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self::new(
            DEFAULT_NAMES.iter().map(|name| (*name).to_owned()).collect(),
            None,
        )
    }
}

#[derive(Debug, Deserialize)]
/// JSON representation of the configuration file located at [`DEFAULT_CONFIG_PATH`].
struct RawConfig {
    names: Vec<String>,
    #[serde(default)]
    ticket_count: Option<usize>,
}

impl From<RawConfig> for AppConfig {
    fn from(value: RawConfig) -> Self {
        // Trim, drop blanks and keep the first occurrence of every name.
        let mut names: Vec<String> = Vec::with_capacity(value.names.len());
        for name in value.names {
            let name = name.trim();
            if !name.is_empty() && !names.iter().any(|existing| existing == name) {
                names.push(name.to_owned());
            }
        }
        Self {
            names,
            ticket_count: value.ticket_count,
        }
    }
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

/// Built-in pool shipped with the binary.
const DEFAULT_NAMES: &[&str] = &[
    "Aaliyah", "Abel", "Ada", "Adrian", "Agnes", "Aiden", "Alba", "Alice", "Amara", "Amos",
    "Anika", "Arlo", "Astrid", "Aurora", "Basil", "Beatrix", "Benedict", "Bianca", "Bruno",
    "Cassius", "Celeste", "Clara", "Cormac", "Dalia", "Damian", "Daphne", "Dario", "Delphine",
    "Edgar", "Elena", "Elio", "Elsa", "Emeric", "Esme", "Ezra", "Fabian", "Felix", "Fiona",
    "Flora", "Gideon", "Greta", "Hana", "Hector", "Helena", "Hugo", "Ida", "Ilya", "Imogen",
    "Ines", "Isaac", "Ivo", "Jasper", "Joel", "Juno", "Kai", "Kaspar", "Leda", "Leon", "Lina",
    "Luca", "Mabel", "Magnus", "Marta", "Milo", "Mira", "Nadia", "Nico", "Nora", "Odile",
    "Olive", "Oren", "Otto", "Pablo", "Petra", "Quentin", "Rhea", "Rosa", "Rufus", "Saga",
    "Silas", "Soren", "Tessa", "Theo", "Una", "Vera", "Viggo", "Wren", "Xavier", "Yara", "Zane",
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_pool_has_ninety_distinct_names() {
        let config = AppConfig::default();
        assert_eq!(config.names().len(), 90);
        assert_eq!(config.ticket_count(), 90);
    }

    #[test]
    fn raw_names_are_trimmed_and_deduplicated() {
        let config = AppConfig::new(
            vec![" Ada ".into(), "Ada".into(), "".into(), "Bea".into()],
            Some(4),
        );
        assert_eq!(config.names(), ["Ada".to_owned(), "Bea".to_owned()]);
        assert_eq!(config.ticket_count(), 4);
    }
}
