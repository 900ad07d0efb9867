//! Extended command parsing: `NAME KEY=VALUE ...` lines.
//!
//! Command names and parameter keys are case-insensitive and stored
//! upper-cased. Anything after `;` is a comment.

use std::collections::HashMap;
use std::fmt;

use thiserror::Error;

use crate::control::ControlError;
use crate::soak::SoakError;

/// Commands understood by the host, with a one-line description.
pub const COMMAND_HELP: &[(&str, &str)] = &[
    ("CHAMBER_HEAT_ON", "Start heating the chamber: [HEATER=<name>] TEMP=<degrees>"),
    ("CHAMBER_HEAT_OFF", "Stop heating the chamber: [HEATER=<name>]"),
    ("CHAMBER_HEAT_WAIT", "Wait for the chamber to reach a temperature: [HEATER=<name>] [TEMP=<degrees>]"),
    ("CHAMBER_HEAT_STATUS", "Report chamber heater state: [HEATER=<name>]"),
    ("HEAT_SOAK_BASELINE", "Record baseline temperatures for heat soak estimation"),
    ("HEAT_SOAK_WAIT", "Wait for a heat soak: FOR=<bed|extruder|chamber> TEMP=<degrees> [START_TEMP=<degrees>]"),
    ("HEAT_SOAK_STATUS", "Report heat soak baselines and progress"),
    ("STATUS", "Report the display status message"),
    ("HELP", "List available commands"),
];

#[derive(Debug, Clone, PartialEq)]
pub struct GCodeCommand {
    pub command: String,
    pub parameters: HashMap<String, String>,
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum CommandError {
    #[error("Unknown command: \"{0}\"")]
    UnknownCommand(String),
    #[error("Malformed command line: \"{0}\"")]
    Malformed(String),
    #[error("Error on '{command}': missing {key}")]
    MissingParameter { command: String, key: String },
    #[error("Error on '{command}': unable to parse {key}={value}")]
    InvalidParameter { command: String, key: String, value: String },
    #[error("Unknown chamber heater '{0}'")]
    UnknownHeater(String),
    #[error("HEATER must be specified, configured heaters: {0}")]
    AmbiguousHeater(String),
    #[error("No chamber heaters configured")]
    NoHeaters,
    #[error("heat_soak is not configured")]
    EstimatorDisabled,
    #[error(transparent)]
    Control(#[from] ControlError),
    #[error(transparent)]
    Soak(#[from] SoakError),
}

impl GCodeCommand {
    /// Parses one line. Blank and comment-only lines yield `None`.
    pub fn parse(line: &str) -> Result<Option<Self>, CommandError> {
        let line = match line.find(';') {
            Some(idx) => &line[..idx],
            None => line,
        };
        let mut words = line.split_whitespace();
        let Some(name) = words.next() else {
            return Ok(None);
        };
        if name.contains('=') {
            return Err(CommandError::Malformed(line.trim().to_string()));
        }

        let mut parameters = HashMap::new();
        for word in words {
            let Some((key, value)) = word.split_once('=') else {
                return Err(CommandError::Malformed(line.trim().to_string()));
            };
            if key.is_empty() {
                return Err(CommandError::Malformed(line.trim().to_string()));
            }
            parameters.insert(key.to_ascii_uppercase(), value.to_string());
        }
        Ok(Some(Self { command: name.to_ascii_uppercase(), parameters }))
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.parameters.get(key).map(String::as_str)
    }

    pub fn get_float(&self, key: &str) -> Result<Option<f64>, CommandError> {
        let Some(value) = self.get(key) else {
            return Ok(None);
        };
        match value.parse::<f64>() {
            Ok(parsed) if parsed.is_finite() => Ok(Some(parsed)),
            _ => Err(CommandError::InvalidParameter {
                command: self.command.clone(),
                key: key.to_string(),
                value: value.to_string(),
            }),
        }
    }

    pub fn require_float(&self, key: &str) -> Result<f64, CommandError> {
        self.get_float(key)?.ok_or_else(|| self.missing(key))
    }

    pub fn require(&self, key: &str) -> Result<&str, CommandError> {
        self.get(key).ok_or_else(|| self.missing(key))
    }

    fn missing(&self, key: &str) -> CommandError {
        CommandError::MissingParameter { command: self.command.clone(), key: key.to_string() }
    }
}

impl fmt::Display for GCodeCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.command)?;
        let mut keys: Vec<_> = self.parameters.keys().collect();
        keys.sort();
        for key in keys {
            write!(f, " {}={}", key, self.parameters[key])?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_extended_command() {
        let cmd = GCodeCommand::parse("chamber_heat_on heater=chamber temp=60 ; warm up")
            .unwrap()
            .unwrap();
        assert_eq!(cmd.command, "CHAMBER_HEAT_ON");
        assert_eq!(cmd.get("HEATER"), Some("chamber"));
        assert_eq!(cmd.require_float("TEMP").unwrap(), 60.0);
        assert_eq!(cmd.to_string(), "CHAMBER_HEAT_ON HEATER=chamber TEMP=60");
    }

    #[test]
    fn blank_and_comment_lines_are_skipped() {
        assert_eq!(GCodeCommand::parse("").unwrap(), None);
        assert_eq!(GCodeCommand::parse("   ").unwrap(), None);
        assert_eq!(GCodeCommand::parse("; only a comment").unwrap(), None);
    }

    #[test]
    fn rejects_bare_words() {
        assert!(matches!(
            GCodeCommand::parse("HEAT_SOAK_WAIT bed"),
            Err(CommandError::Malformed(_))
        ));
        assert!(matches!(GCodeCommand::parse("TEMP=5"), Err(CommandError::Malformed(_))));
        assert!(matches!(GCodeCommand::parse("X =5"), Err(CommandError::Malformed(_))));
    }

    #[test]
    fn float_parameters() {
        let cmd = GCodeCommand::parse("HEAT_SOAK_WAIT FOR=bed TEMP=abc").unwrap().unwrap();
        assert_eq!(cmd.get_float("START_TEMP").unwrap(), None);
        assert_eq!(
            cmd.require_float("TEMP"),
            Err(CommandError::InvalidParameter {
                command: "HEAT_SOAK_WAIT".to_string(),
                key: "TEMP".to_string(),
                value: "abc".to_string(),
            })
        );
        assert!(matches!(
            cmd.require_float("MISSING"),
            Err(CommandError::MissingParameter { .. })
        ));
        let cmd = GCodeCommand::parse("CHAMBER_HEAT_ON TEMP=nan").unwrap().unwrap();
        assert!(cmd.require_float("TEMP").is_err());
    }
}
