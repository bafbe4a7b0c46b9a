//! Host inspection through external utilities.
//!
//! None of these tools is required; a missing binary is reported as a
//! recoverable [`Error::Command`].

use crate::error::{Error, Result};
use std::process::Command;
use tracing::debug;

/// An external utility to run and how much of its output to keep
#[derive(Debug, Clone, Copy)]
pub struct Utility {
    /// Program name, looked up on `PATH`
    pub program: &'static str,
    /// Arguments
    pub args: &'static [&'static str],
    /// Keep only lines containing one of these (case-insensitive); empty keeps all
    pub keywords: &'static [&'static str],
}

/// Utilities run by the system diagnostics mode, in order
pub const UTILITIES: [Utility; 4] = [
    Utility {
        program: "whoami",
        args: &[],
        keywords: &[],
    },
    Utility {
        program: "groups",
        args: &[],
        keywords: &[],
    },
    Utility {
        program: "lsusb",
        args: &[],
        keywords: &[],
    },
    Utility {
        program: "lsmod",
        args: &[],
        keywords: &["usb", "hid"],
    },
];

/// Captured result of one utility
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// Command line as run
    pub command: String,
    /// Exit code; `None` when killed by a signal
    pub status: Option<i32>,
    /// Filtered standard output lines
    pub lines: Vec<String>,
    /// Standard error, trimmed
    pub stderr: String,
}

impl CommandOutput {
    /// True when the utility exited with status 0
    pub fn succeeded(&self) -> bool {
        self.status == Some(0)
    }
}

impl Utility {
    /// Command line for display
    pub fn command_line(&self) -> String {
        std::iter::once(self.program)
            .chain(self.args.iter().copied())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Runs the utility and captures its output
    pub fn run(&self) -> Result<CommandOutput> {
        let command = self.command_line();
        debug!("Running {}", command);

        let output = Command::new(self.program)
            .args(self.args)
            .output()
            .map_err(|e| Error::command(&command, e))?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(CommandOutput {
            command,
            status: output.status.code(),
            lines: self.filter(&stdout),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }

    fn filter(&self, stdout: &str) -> Vec<String> {
        stdout
            .lines()
            .filter(|line| {
                let lower = line.to_ascii_lowercase();
                self.keywords.is_empty() || self.keywords.iter().any(|k| lower.contains(k))
            })
            .map(str::to_string)
            .collect()
    }
}
