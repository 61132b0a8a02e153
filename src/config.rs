//! Application-level configuration loading: timings, bus sizing, wager table and name pools.

use std::{env, fs, io::ErrorKind, path::PathBuf, time::Duration};

use serde::Deserialize;
use tracing::{info, warn};

use crate::scoring::ConfidenceTable;

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "QUIZ_SESSION_CONFIG_PATH";

const DEFAULT_PREVIEW_DELAY_MS: u64 = 4000;
const DEFAULT_TRANSITION_TIMEOUT_MS: u64 = 5000;
const DEFAULT_BUS_CAPACITY: usize = 64;
const DEFAULT_HOST_IDLE_TIMEOUT_MS: u64 = 30 * 60 * 1000;
const DEFAULT_IDLE_SWEEP_INTERVAL_MS: u64 = 60 * 1000;

#[derive(Debug, Clone)]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    /// Time a timed question stays in preview before answers open.
    pub preview_delay: Duration,
    /// Upper bound on the persistence step of a transition.
    pub transition_timeout: Duration,
    /// Per-session broadcast channel capacity.
    pub bus_capacity: usize,
    /// Host inactivity after which a session is closed as abandoned. Zero disables it.
    pub host_idle_timeout: Duration,
    /// Period of the abandoned session sweep.
    pub idle_sweep_interval: Duration,
    /// Stakes used in wager mode.
    pub confidence: ConfidenceTable,
    adjectives: Vec<String>,
    nouns: Vec<String>,
    team_names: Vec<String>,
}

impl AppConfig {
    /// Load the application configuration from disk, falling back to built-in defaults.
    pub fn load() -> Self {
        let path = resolve_config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => match Self::from_json_str(&contents) {
                Ok(app_config) => {
                    info!(
                        path = %path.display(),
                        preview_delay_ms = app_config.preview_delay.as_millis() as u64,
                        host_idle_timeout_ms = app_config.host_idle_timeout.as_millis() as u64,
                        team_names = app_config.team_names.len(),
                        "loaded configuration"
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

    /// Parse a JSON document; missing keys keep their default value.
    pub fn from_json_str(contents: &str) -> serde_json::Result<Self> {
        serde_json::from_str::<RawConfig>(contents).map(Into::into)
    }

    /// Adjectives used to build random display names.
    pub fn adjectives(&self) -> &[String] {
        &self.adjectives
    }

    /// Nouns used to build random display names.
    pub fn nouns(&self) -> &[String] {
        &self.nouns
    }

    /// Pool of team names for grid sessions.
    pub fn team_names(&self) -> &[String] {
        &self.team_names
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        RawConfig::default().into()
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
/// JSON representation of the configuration file located at [`DEFAULT_CONFIG_PATH`].
struct RawConfig {
    preview_delay_ms: Option<u64>,
    transition_timeout_ms: Option<u64>,
    bus_capacity: Option<usize>,
    host_idle_timeout_ms: Option<u64>,
    idle_sweep_interval_ms: Option<u64>,
    confidence: Option<RawConfidence>,
    adjectives: Option<Vec<String>>,
    nouns: Option<Vec<String>>,
    team_names: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
/// JSON representation of the wager stakes.
struct RawConfidence {
    guess: i64,
    believe: i64,
    know: i64,
}

impl From<RawConfig> for AppConfig {
    fn from(value: RawConfig) -> Self {
        Self {
            preview_delay: Duration::from_millis(
                value.preview_delay_ms.unwrap_or(DEFAULT_PREVIEW_DELAY_MS),
            ),
            transition_timeout: Duration::from_millis(
                value
                    .transition_timeout_ms
                    .unwrap_or(DEFAULT_TRANSITION_TIMEOUT_MS),
            ),
            bus_capacity: value.bus_capacity.unwrap_or(DEFAULT_BUS_CAPACITY).max(1),
            host_idle_timeout: Duration::from_millis(
                value
                    .host_idle_timeout_ms
                    .unwrap_or(DEFAULT_HOST_IDLE_TIMEOUT_MS),
            ),
            idle_sweep_interval: Duration::from_millis(
                value
                    .idle_sweep_interval_ms
                    .unwrap_or(DEFAULT_IDLE_SWEEP_INTERVAL_MS)
                    .max(1),
            ),
            confidence: value
                .confidence
                .map(|raw| ConfidenceTable {
                    guess: raw.guess,
                    believe: raw.believe,
                    know: raw.know,
                })
                .unwrap_or_default(),
            adjectives: non_empty_or(value.adjectives, DEFAULT_ADJECTIVES),
            nouns: non_empty_or(value.nouns, DEFAULT_NOUNS),
            team_names: non_empty_or(value.team_names, DEFAULT_TEAM_NAMES),
        }
    }
}

fn non_empty_or(value: Option<Vec<String>>, fallback: &[&str]) -> Vec<String> {
    match value {
        Some(list) if !list.is_empty() => list,
        _ => fallback.iter().map(|entry| (*entry).to_string()).collect(),
    }
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

const DEFAULT_ADJECTIVES: &[&str] = &[
    "Happy", "Quick", "Sneaky", "Silly", "Clever", "Strong", "Wild", "Brave", "Red", "Blue",
    "Bouncy", "Sleepy", "Crafty", "Perky", "Cool", "Super", "Mega", "Ultra", "Epic", "Crazy",
    "Giant", "Tiny", "Grumpy", "Shiny", "Digital", "Analog", "Caffeinated", "Laggy",
];

const DEFAULT_NOUNS: &[&str] = &[
    "Banana", "Tiger", "Robot", "Cactus", "Muffin", "Dragon", "Ninja", "Pirate", "Viking", "Cat",
    "Dog", "Owl", "Fox", "Bear", "Shark", "Eagle", "Seal", "Whale", "Panda", "Zombie", "Ghost",
    "Alien", "Troll", "Pickle", "Potato", "Bug", "Server", "Pixel", "Router",
];

const DEFAULT_TEAM_NAMES: &[&str] = &[
    "Syntax Error",
    "Ctrl+Alt+Defeat",
    "404 Brain Not Found",
    "Quiz Knights",
    "The Last Cell",
    "Beta Testers",
    "Hard Drivers",
    "Pixel Pirates",
    "Cyber Mushrooms",
    "Zoom Zombies",
    "Git Push It",
    "Python Charmers",
    "Stylesheet Stylists",
    "Markup Heroes",
    "Screen Savers",
    "Keyboard Warriors",
    "Wi-Fi Wizards",
    "The Buffering",
    "Binary Bears",
    "The Compilers",
    "Bug Hunters",
    "Blue Screen Survivors",
];
