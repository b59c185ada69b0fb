use std::io::IsTerminal;

use crate::logger::{error::LoggerError, format::LoggerFormat};

#[derive(Debug, Clone)]
pub struct LoggerConfig {
    pub format: LoggerFormat,
    /// `EnvFilter` directive, e.g. `info` or `warn,dockstage.core=debug`.
    pub level: String,
    pub with_targets: bool,
    /// ANSI colors for the text format; on by default when stderr is a terminal.
    pub use_color: bool,
}

impl LoggerConfig {
    /// Builds a config from the command line's `--log-level` / `--log-format` values.
    pub fn from_flags(level: &str, format: &str) -> Result<Self, LoggerError> {
        let format = format.parse::<LoggerFormat>()?;
        let level = level.trim();
        if level.is_empty() {
            return Err(LoggerError::InvalidLogLevel(level.to_string()));
        }
        Ok(Self {
            format,
            level: level.to_string(),
            ..Self::default()
        })
    }
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            format: LoggerFormat::Text,
            level: "info".to_string(),
            with_targets: true,
            use_color: std::io::stderr().is_terminal(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_build_config() {
        let cfg = LoggerConfig::from_flags(" debug ", "JSON").unwrap();
        assert_eq!(cfg.level, "debug");
        assert_eq!(cfg.format, LoggerFormat::Json);
        assert_eq!(cfg.use_color, std::io::stderr().is_terminal());
    }

    #[test]
    fn blank_level_is_rejected() {
        assert!(matches!(
            LoggerConfig::from_flags("  ", "text"),
            Err(LoggerError::InvalidLogLevel(_))
        ));
    }

    #[test]
    fn unknown_format_is_rejected() {
        assert!(matches!(
            LoggerConfig::from_flags("info", "xml"),
            Err(LoggerError::InvalidFormat(f)) if f == "xml"
        ));
    }
}
