//! dongleprobe - Exercise a vendor dongle library without linking against it
//!
//! This tool loads the vendor's shared library at run time, resolves its
//! `Dongle_*` entry points and reports what each step of the device
//! lifecycle returned.

use anyhow::{Context, Result};
use clap::{Args, CommandFactory, Parser};
use dongleprobe_core::{run, HarnessConfig, PlatformPolicy, RunMode};
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{debug, Level};
use tracing_subscriber::EnvFilter;

/// Load a dongle vendor library at run time and exercise the device
#[derive(Parser, Debug)]
#[command(name = "dongleprobe")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(flatten)]
    mode: ModeFlags,

    /// Explicit path to the vendor library (skips the platform table)
    #[arg(long, env = "DONGLEPROBE_LIBRARY")]
    library: Option<PathBuf>,

    /// Directory containing the vendor `lib/` tree
    #[arg(long, env = "DONGLEPROBE_LIB_ROOT", default_value = ".")]
    lib_root: PathBuf,

    /// Refuse to run on anything but Linux
    #[arg(long)]
    linux_only: bool,

    /// Zero-based index of the device to open
    #[arg(long, default_value = "0")]
    index: usize,

    /// File id to read (decimal or 0x-prefixed hex)
    #[arg(long, default_value = "0x0001", value_parser = parse_u16)]
    file_id: u16,

    /// Offset within the file (decimal or 0x-prefixed hex)
    #[arg(long, default_value = "0", value_parser = parse_u16)]
    offset: u16,

    /// Number of bytes to read
    #[arg(long, default_value = "1024")]
    size: usize,

    /// File-type value passed by the six-parameter read form
    #[arg(long, default_value = "1", value_parser = parse_u16)]
    file_type: u16,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Args, Debug)]
#[group(required = false, multiple = false)]
struct ModeFlags {
    /// Enumerate, open, read and close the first device
    #[arg(short, long)]
    test: bool,

    /// Report platform, library file and exported symbols
    #[arg(short, long)]
    probe: bool,

    /// Read a fixed table of (file id, offset) pairs
    #[arg(short, long)]
    sweep: bool,

    /// Run whoami, groups, lsusb and lsmod, then probe
    #[arg(long)]
    sysinfo: bool,
}

impl ModeFlags {
    fn mode(&self) -> Option<RunMode> {
        if self.test {
            Some(RunMode::Cycle)
        } else if self.probe {
            Some(RunMode::Probe)
        } else if self.sweep {
            Some(RunMode::Sweep)
        } else if self.sysinfo {
            Some(RunMode::System)
        } else {
            None
        }
    }
}

impl Cli {
    fn config(&self) -> HarnessConfig {
        let policy = if self.linux_only {
            PlatformPolicy::LinuxOnly
        } else {
            PlatformPolicy::Generic
        };

        let mut config = HarnessConfig::new()
            .policy(policy)
            .lib_root(&self.lib_root)
            .device_index(self.index)
            .read(self.file_id, self.offset, self.size)
            .file_type(self.file_type);
        if let Some(ref library) = self.library {
            config = config.library(library);
        }
        config
    }
}

/// Parses decimal or `0x`-prefixed hexadecimal
fn parse_u16(s: &str) -> Result<u16, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u16::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.map_err(|e| format!("'{}' is not a 16-bit value: {}", s, e))
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // Initialize tracing
    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(level.into()))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let Some(mode) = cli.mode.mode() else {
        Cli::command().print_help().context("Failed to print usage")?;
        return Ok(ExitCode::SUCCESS);
    };

    let config = cli.config();
    debug!("Running {} with {:?}", mode, config);

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    let summary = run(mode, &config, &mut out).context("Failed to write report")?;

    writeln!(
        out,
        "\n{} run finished in state {}: {} failure(s)",
        mode, summary.reached, summary.failures
    )
    .context("Failed to write report")?;

    Ok(if summary.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
