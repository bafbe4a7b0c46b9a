//! Run modes and the single entry point that drives them.

use super::{EntryPoints, Enumeration, Session, State};
use crate::error::{Error, Result};
use crate::loader::{self, LoadedLibrary};
use crate::platform::{self, Arch, Os, PlatformPolicy};
use crate::probe::{CallSignature, ForeignEntry, Operation, DATA_FILE_TYPE};
use crate::report::{fingerprint, Reporter};
use crate::status::ResultCode;
use crate::symbol;
use crate::system::UTILITIES;
use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// (file id, offset) pairs visited by [`RunMode::Sweep`]
pub const DEFAULT_SWEEP: [(u16, u16); 6] = [
    (0x0001, 0x0000),
    (0x0001, 0x0100),
    (0x0002, 0x0000),
    (0x0003, 0x0000),
    (0x1000, 0x0000),
    (0xFFFF, 0x0000),
];

/// Which diagnostic run to perform
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Enumerate, open, read and close one device
    Cycle,
    /// Report platform, library file and exported symbols
    Probe,
    /// Read a fixed table of (file id, offset) pairs
    Sweep,
    /// Run host inspection utilities, then probe
    System,
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Cycle => "cycle",
            Self::Probe => "probe",
            Self::Sweep => "sweep",
            Self::System => "system",
        })
    }
}

/// Configuration for a harness run
#[derive(Debug, Clone)]
pub struct HarnessConfig {
    /// Which operating systems are accepted
    pub policy: PlatformPolicy,
    /// Directory the platform table paths are relative to
    pub lib_root: PathBuf,
    /// Explicit library path, bypassing the platform table
    pub library: Option<PathBuf>,
    /// Zero-based index of the device to open
    pub device_index: usize,
    /// File read by [`RunMode::Cycle`]
    pub file_id: u16,
    /// Offset read by [`RunMode::Cycle`]
    pub offset: u16,
    /// Bytes read by [`RunMode::Cycle`]
    pub read_size: usize,
    /// Discriminator for the six-parameter read form
    pub file_type: u16,
    /// Pairs visited by [`RunMode::Sweep`]
    pub sweep: Vec<(u16, u16)>,
    /// Bytes read per sweep entry
    pub sweep_size: usize,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            policy: PlatformPolicy::Generic,
            lib_root: PathBuf::from("."),
            library: None,
            device_index: 0,
            file_id: 0x0001,
            offset: 0,
            read_size: 1024,
            file_type: DATA_FILE_TYPE,
            sweep: DEFAULT_SWEEP.to_vec(),
            sweep_size: 64,
        }
    }
}

impl HarnessConfig {
    /// Creates a config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the platform policy
    pub fn policy(mut self, policy: PlatformPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Sets the library root directory
    pub fn lib_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.lib_root = root.into();
        self
    }

    /// Sets an explicit library path
    pub fn library(mut self, path: impl Into<PathBuf>) -> Self {
        self.library = Some(path.into());
        self
    }

    /// Sets the device index
    pub fn device_index(mut self, index: usize) -> Self {
        self.device_index = index;
        self
    }

    /// Sets the file, offset and size read by the cycle
    pub fn read(mut self, file_id: u16, offset: u16, size: usize) -> Self {
        self.file_id = file_id;
        self.offset = offset;
        self.read_size = size;
        self
    }

    /// Sets the six-parameter read discriminator
    pub fn file_type(mut self, file_type: u16) -> Self {
        self.file_type = file_type;
        self
    }

    /// Sets the sweep table and per-entry size
    pub fn sweep(mut self, pairs: Vec<(u16, u16)>, size: usize) -> Self {
        self.sweep = pairs;
        self.sweep_size = size;
        self
    }

    /// Library to load on this host.
    ///
    /// The platform policy is checked even when an explicit path is set.
    pub fn library_path(&self) -> Result<PathBuf> {
        let relative = platform::resolve_current(self.policy)?;
        Ok(match &self.library {
            Some(path) => path.clone(),
            None => self.lib_root.join(relative),
        })
    }
}

/// What a run achieved
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    /// Mode that ran
    pub mode: RunMode,
    /// Last lifecycle state reached
    pub reached: State,
    /// Failures reported
    pub failures: usize,
    /// Devices enumerated
    pub devices: usize,
    /// Bytes successfully read
    pub bytes_read: usize,
}

impl RunSummary {
    fn new(mode: RunMode) -> Self {
        Self {
            mode,
            reached: State::Unloaded,
            failures: 0,
            devices: 0,
            bytes_read: 0,
        }
    }

    /// True when no step failed
    pub fn is_success(&self) -> bool {
        self.failures == 0
    }
}

/// Performs one diagnostic run, writing the report to `out`.
///
/// Foreign and loader failures are printed and counted in the summary; the
/// returned error is reserved for failing to write the report itself.
pub fn run<W: Write>(mode: RunMode, config: &HarnessConfig, out: W) -> Result<RunSummary> {
    info!("Starting {} run", mode);
    let mut reporter = Reporter::new(out);
    let mut summary = RunSummary::new(mode);

    match mode {
        RunMode::Probe => probe_library(config, &mut reporter, &mut summary)?,
        RunMode::System => {
            system_report(&mut reporter)?;
            probe_library(config, &mut reporter, &mut summary)?;
        }
        RunMode::Cycle | RunMode::Sweep => {
            if let Some(library) = load(config, &mut reporter, &mut summary)? {
                match EntryPoints::resolve(&library) {
                    Ok(entries) => {
                        summary.reached = State::SymbolsResolved;
                        drive(mode, entries, config, &mut reporter, &mut summary)?;
                    }
                    Err(e) => reporter.failure(&e)?,
                }
            }
        }
    }

    summary.failures = reporter.failures();
    info!(
        "Finished {} run in state {} with {} failure(s)",
        mode, summary.reached, summary.failures
    );
    Ok(summary)
}

/// Runs [`RunMode::Cycle`] or [`RunMode::Sweep`] over already-resolved entries
pub fn run_entries<E: ForeignEntry, W: Write>(
    mode: RunMode,
    entries: EntryPoints<E>,
    config: &HarnessConfig,
    out: W,
) -> Result<RunSummary> {
    let mut reporter = Reporter::new(out);
    let mut summary = RunSummary::new(mode);
    summary.reached = State::SymbolsResolved;

    drive(mode, entries, config, &mut reporter, &mut summary)?;

    summary.failures = reporter.failures();
    Ok(summary)
}

fn drive<E: ForeignEntry, W: Write>(
    mode: RunMode,
    entries: EntryPoints<E>,
    config: &HarnessConfig,
    reporter: &mut Reporter<W>,
    summary: &mut RunSummary,
) -> Result<()> {
    let mut session = Session::new(entries).with_file_type(config.file_type);

    let steps = match mode {
        RunMode::Sweep => sweep_steps(&mut session, config, reporter, summary),
        _ => cycle_steps(&mut session, config, reporter, summary),
    };

    // Cleanup runs whatever the steps reached.
    if session.device().is_open() {
        reporter.section("Close")?;
        let closable = session.can_close();
        let code = session.close();
        if !closable {
            reporter.line("no close entry point; handle released")?;
        } else if code.is_success() {
            reporter.ok("device closed")?;
        } else {
            reporter.failure(&Error::status(Operation::Close, code))?;
        }
    }
    summary.reached = session.state();
    steps
}

fn open_device<E: ForeignEntry, W: Write>(
    session: &mut Session<E>,
    config: &HarnessConfig,
    reporter: &mut Reporter<W>,
    summary: &mut RunSummary,
) -> Result<bool> {
    reporter.section("Enumerate")?;
    match session.enumerate() {
        Ok(Enumeration::NotFound) => {
            reporter.notice(ResultCode::NOT_FOUND)?;
            return Ok(false);
        }
        Ok(Enumeration::Found(devices)) => {
            summary.devices = devices.len();
            reporter.ok(format!("{} device(s) found", devices.len()))?;
            reporter.devices(&devices)?;
        }
        Err(e) => {
            reporter.failure(&e)?;
            return Ok(false);
        }
    }

    reporter.section("Open")?;
    match session.open(config.device_index) {
        Ok(handle) => {
            reporter.ok(format!(
                "device {} opened, handle {}",
                config.device_index, handle
            ))?;
            Ok(true)
        }
        Err(e) => {
            reporter.failure(&e)?;
            Ok(false)
        }
    }
}

fn cycle_steps<E: ForeignEntry, W: Write>(
    session: &mut Session<E>,
    config: &HarnessConfig,
    reporter: &mut Reporter<W>,
    summary: &mut RunSummary,
) -> Result<()> {
    if !open_device(session, config, reporter, summary)? {
        return Ok(());
    }

    reporter.section("Read")?;
    let mut buffer = vec![0u8; config.read_size];
    match session.read(config.file_id, config.offset, &mut buffer) {
        Ok(outcome) => {
            summary.bytes_read += buffer.len();
            reporter.ok(format!(
                "read {} bytes of file 0x{:04X} at offset {} via {}",
                buffer.len(),
                config.file_id,
                config.offset,
                outcome.signature
            ))?;
            reporter.hexdump(&buffer)?;
        }
        Err(e) => reporter.failure(&e)?,
    }
    Ok(())
}

fn sweep_steps<E: ForeignEntry, W: Write>(
    session: &mut Session<E>,
    config: &HarnessConfig,
    reporter: &mut Reporter<W>,
    summary: &mut RunSummary,
) -> Result<()> {
    if !open_device(session, config, reporter, summary)? {
        return Ok(());
    }

    reporter.section("Sweep")?;
    for &(file_id, offset) in &config.sweep {
        let mut buffer = vec![0u8; config.sweep_size];
        let label = format!("file 0x{:04X} offset 0x{:04X}", file_id, offset);
        // Rejections here map the device layout; they are not run failures.
        match session.read(file_id, offset, &mut buffer) {
            Ok(outcome) => {
                summary.bytes_read += buffer.len();
                reporter.line(format!(
                    "{}: OK via {} [{}]",
                    label,
                    outcome.signature,
                    fingerprint(&buffer)
                ))?;
            }
            Err(e) if !e.is_recoverable() => {
                reporter.failure(&e)?;
                break;
            }
            Err(e) => match e.result_code() {
                Some(code) => reporter.listed(&label, code)?,
                None => reporter.failure(&e)?,
            },
        }
    }
    Ok(())
}

fn load<W: Write>(
    config: &HarnessConfig,
    reporter: &mut Reporter<W>,
    summary: &mut RunSummary,
) -> Result<Option<LoadedLibrary>> {
    reporter.section("Library")?;
    let path = match config.library_path() {
        Ok(path) => path,
        Err(e) => {
            reporter.failure(&e)?;
            return Ok(None);
        }
    };
    reporter.field("path", path.display())?;

    match loader::open(&path) {
        Ok(library) => {
            let meta = library.metadata();
            reporter.field("size", format!("{} bytes", meta.size))?;
            reporter.field("permissions", meta.permissions())?;
            reporter.ok(format!("loaded as library {}", library.handle()))?;
            summary.reached = State::Loaded;
            Ok(Some(library))
        }
        Err(e) => {
            let missing = matches!(e, Error::LibraryNotFound { .. });
            reporter.failure(&e)?;
            if missing {
                suggest_libraries(&config.lib_root, reporter)?;
            }
            Ok(None)
        }
    }
}

fn suggest_libraries<W: Write>(root: &Path, reporter: &mut Reporter<W>) -> Result<()> {
    let found = platform::discover(root);
    debug!("Found {} candidate libraries under {}", found.len(), root.display());
    for path in found {
        reporter.line(format!("  hint: found {}", path.display()))?;
    }
    Ok(())
}

fn probe_library<W: Write>(
    config: &HarnessConfig,
    reporter: &mut Reporter<W>,
    summary: &mut RunSummary,
) -> Result<()> {
    reporter.section("Platform")?;
    reporter.field("os", Os::current())?;
    reporter.field("arch", Arch::current())?;
    match std::thread::available_parallelism() {
        Ok(cpus) => reporter.field("cpus", cpus)?,
        Err(_) => reporter.field("cpus", "unknown")?,
    }
    reporter.field("policy", format!("{:?}", config.policy))?;

    let Some(library) = load(config, reporter, summary)? else {
        return Ok(());
    };

    reporter.section("Symbols")?;
    let mut resolved_all = true;
    for operation in Operation::ALL {
        let name = operation.symbol_name();
        match symbol::resolve(&library, name) {
            Ok(symbol) => {
                let resolution = symbol.resolution();
                let alias = if resolution.used_alias() { " (alias)" } else { "" };
                reporter.field(
                    name,
                    format!("{} at {}{}", resolution.matched, resolution.address, alias),
                )?;
            }
            Err(e) if !operation.is_required() => reporter.skipped(&e)?,
            Err(e) => {
                resolved_all = false;
                reporter.failure(&e)?;
            }
        }
    }
    if resolved_all {
        summary.reached = State::SymbolsResolved;
    }

    reporter.section("Read forms")?;
    for signature in CallSignature::read_candidates(config.file_type) {
        reporter.line(format!("  {} parameters: {}", signature.arity(), signature))?;
    }
    Ok(())
}

fn system_report<W: Write>(reporter: &mut Reporter<W>) -> Result<()> {
    reporter.section("System")?;
    for utility in UTILITIES {
        match utility.run() {
            Ok(output) => {
                reporter.line(format!("$ {}", output.command))?;
                for line in &output.lines {
                    reporter.line(format!("  {}", line))?;
                }
                if !output.succeeded() {
                    reporter.line(format!(
                        "  exited with {:?}: {}",
                        output.status, output.stderr
                    ))?;
                }
            }
            Err(e) if e.is_recoverable() => reporter.skipped(&e)?,
            Err(e) => reporter.failure(&e)?,
        }
    }
    Ok(())
}
