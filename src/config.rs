//! Configuration for termview.
//!
//! Settings are read from `~/.termview/config.toml`. Top-level keys configure
//! the session, `[titleBar]` configures the binary's title bar:
//!
//! ```toml
//! shellOverride = "/bin/zsh"
//! shellArguments = "-l"
//! runCommand = "git status"
//! titleTemplate = "({{ bashName }}) on {{ hostName }}"
//! scrollback = 5000
//! forkPTY = true
//!
//! [titleBar]
//! visible = true
//! colorScheme = "nord"
//! ```
//!
//! A missing or unreadable file falls back to defaults.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::core::screen::ScreenOptions;
use crate::core::title::DEFAULT_TITLE_TEMPLATE;

const CONFIG_DIR: &str = ".termview";
const CONFIG_FILE: &str = "config.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Invalid config {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Everything read from the config file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Config {
    #[serde(flatten)]
    pub session: SessionConfig,
    pub title_bar: TitleBarConfig,
}

/// Options recognized by a terminal session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SessionConfig {
    /// Whitespace-delimited arguments passed to the shell
    pub shell_arguments: String,
    /// Shell to run instead of the platform default
    pub shell_override: Option<String>,
    /// Submitted once as input right after attach
    pub run_command: Option<String>,
    pub colors: Vec<String>,
    pub cursor_blink: bool,
    pub scrollback: usize,
    pub font_family: Option<String>,
    pub font_size: Option<f32>,
    pub title_template: String,
    /// Run a child shell; `false` gives a local echo session
    #[serde(rename = "forkPTY")]
    pub fork_pty: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            shell_arguments: String::new(),
            shell_override: None,
            run_command: None,
            colors: Vec::new(),
            cursor_blink: true,
            scrollback: 1000,
            font_family: None,
            font_size: None,
            title_template: DEFAULT_TITLE_TEMPLATE.to_string(),
            fork_pty: true,
        }
    }
}

impl SessionConfig {
    /// `shell_arguments` split on whitespace, empty tokens dropped
    pub fn shell_args(&self) -> Vec<String> {
        self.shell_arguments
            .split_whitespace()
            .map(str::to_string)
            .collect()
    }

    /// Shell override, if one is set and non-blank
    pub fn shell(&self) -> Option<&str> {
        self.shell_override
            .as_deref()
            .map(str::trim)
            .filter(|shell| !shell.is_empty())
    }

    /// Run command, if one is set and non-blank
    pub fn run_command(&self) -> Option<&str> {
        self.run_command
            .as_deref()
            .filter(|command| !command.trim().is_empty())
    }

    pub fn title_template(&self) -> &str {
        if self.title_template.is_empty() {
            DEFAULT_TITLE_TEMPLATE
        } else {
            &self.title_template
        }
    }

    pub fn screen_options(&self) -> ScreenOptions {
        let defaults = ScreenOptions::default();
        ScreenOptions {
            colors: self.colors.clone(),
            cursor_blink: self.cursor_blink,
            scrollback: self.scrollback,
            font_family: self
                .font_family
                .clone()
                .filter(|family| !family.is_empty())
                .unwrap_or(defaults.font_family),
            font_size: self.font_size.filter(|size| *size > 0.0),
        }
    }
}

/// Title bar drawn above the terminal by the binary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TitleBarConfig {
    pub visible: bool,
    pub color_scheme: String,
}

impl Default for TitleBarConfig {
    fn default() -> Self {
        Self {
            visible: true,
            color_scheme: "default".to_string(),
        }
    }
}

impl TitleBarConfig {
    pub fn colors(&self) -> TitleBarColors {
        TitleBarColors::by_name(&self.color_scheme)
    }
}

/// RGB color
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    pub fn to_crossterm(self) -> crossterm::style::Color {
        crossterm::style::Color::Rgb {
            r: self.r,
            g: self.g,
            b: self.b,
        }
    }
}

/// Colors for the title bar
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TitleBarColors {
    pub bg: Color,
    pub fg: Color,
}

impl Default for TitleBarColors {
    fn default() -> Self {
        Self {
            bg: Color::new(40, 40, 40),
            fg: Color::new(200, 200, 200),
        }
    }
}

impl TitleBarColors {
    pub fn by_name(name: &str) -> Self {
        match name.to_lowercase().as_str() {
            "nord" => Self {
                bg: Color::new(59, 66, 82),
                fg: Color::new(216, 222, 233),
            },
            "dracula" => Self {
                bg: Color::new(68, 71, 90),
                fg: Color::new(248, 248, 242),
            },
            "solarized-dark" | "solarized_dark" => Self {
                bg: Color::new(7, 54, 66),
                fg: Color::new(147, 161, 161),
            },
            _ => Self::default(),
        }
    }
}

impl Config {
    /// Load `~/.termview/config.toml`, falling back to defaults
    pub fn load() -> Self {
        let Some(path) = Self::config_path() else {
            return Self::default();
        };
        if !path.exists() {
            debug!(path = %path.display(), "No config file, using defaults");
            return Self::default();
        }
        match Self::load_from(&path) {
            Ok(config) => config,
            Err(e) => {
                warn!(error = %e, "Using default configuration");
                Self::default()
            }
        }
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Directory holding the config file and the log
    pub fn config_dir() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(CONFIG_DIR))
    }

    fn config_path() -> Option<PathBuf> {
        Self::config_dir().map(|dir| dir.join(CONFIG_FILE))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = SessionConfig::default();
        assert!(config.fork_pty);
        assert_eq!(config.scrollback, 1000);
        assert_eq!(config.title_template(), "({{ bashName }})");
        assert_eq!(config.shell(), None);
        assert!(config.shell_args().is_empty());
    }

    #[test]
    fn test_parse_original_option_names() {
        let config: Config = toml::from_str(
            r#"
            shellOverride = "/bin/zsh"
            shellArguments = "  -l   --no-rcs "
            runCommand = "ls"
            cursorBlink = false
            scrollback = 42
            fontFamily = "Iosevka"
            fontSize = 13.5
            titleTemplate = "{{ hostName }}"
            forkPTY = false

            [titleBar]
            visible = false
            colorScheme = "nord"
            "#,
        )
        .unwrap();

        let session = &config.session;
        assert_eq!(session.shell(), Some("/bin/zsh"));
        assert_eq!(session.shell_args(), vec!["-l", "--no-rcs"]);
        assert_eq!(session.run_command(), Some("ls"));
        assert!(!session.cursor_blink);
        assert!(!session.fork_pty);
        assert_eq!(session.title_template(), "{{ hostName }}");
        assert!(!config.title_bar.visible);
        assert_eq!(config.title_bar.colors(), TitleBarColors::by_name("nord"));

        let options = session.screen_options();
        assert_eq!(options.scrollback, 42);
        assert_eq!(options.font_family, "Iosevka");
        assert_eq!(options.font_size, Some(13.5));
    }

    #[test]
    fn test_missing_keys_use_defaults() {
        let config: Config = toml::from_str("runCommand = \"make\"").unwrap();
        assert_eq!(config.session.run_command(), Some("make"));
        assert!(config.session.fork_pty);
        assert_eq!(config.title_bar, TitleBarConfig::default());
        assert_eq!(config.session.screen_options().font_family, "monospace");
    }

    #[test]
    fn test_blank_values_are_unset() {
        let config = SessionConfig {
            shell_override: Some("   ".to_string()),
            run_command: Some(" ".to_string()),
            title_template: String::new(),
            ..Default::default()
        };
        assert_eq!(config.shell(), None);
        assert_eq!(config.run_command(), None);
        assert_eq!(config.title_template(), DEFAULT_TITLE_TEMPLATE);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "scrollback = 7").unwrap();
        let config = Config::load_from(file.path()).unwrap();
        assert_eq!(config.session.scrollback, 7);
    }

    #[test]
    fn test_load_from_reports_errors() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "scrollback = \"many\"").unwrap();
        assert!(matches!(
            Config::load_from(file.path()),
            Err(ConfigError::Parse { .. })
        ));

        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            Config::load_from(&dir.path().join("absent.toml")),
            Err(ConfigError::Read { .. })
        ));
    }

    #[test]
    fn test_unknown_scheme_falls_back() {
        assert_eq!(TitleBarColors::by_name("nope"), TitleBarColors::default());
    }
}
