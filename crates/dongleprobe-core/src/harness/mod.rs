//! Device lifecycle over the resolved entry points.
//!
//! A [`Session`] walks one dongle through
//! `SymbolsResolved → DeviceEnumerated → DeviceOpen → Closed`. Every foreign
//! call goes through [`probe`], and every failure leaves the session in a
//! state from which [`Session::close`] is still safe. Dropping a session with
//! an open device closes it.
//!
//! Loading the library and resolving symbols (`Unloaded → Loaded →
//! SymbolsResolved`) happens in [`EntryPoints::resolve`]; [`run`] ties the
//! whole sequence to a [`RunMode`].

mod run;

use crate::device::{DeviceHandle, DeviceInfo};
use crate::error::{Error, Result};
use crate::loader::LoadedLibrary;
use crate::probe::{
    probe, CallArgs, CallSignature, ForeignEntry, Operation, ProbeOutcome, DATA_FILE_TYPE,
};
use crate::status::ResultCode;
use crate::symbol::{self, Symbol};
use std::fmt;
use std::os::raw::c_int;
use tracing::{debug, warn};

pub use run::{run, run_entries, HarnessConfig, RunMode, RunSummary, DEFAULT_SWEEP};

/// Lifecycle states of one harness run
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum State {
    /// Nothing loaded yet
    Unloaded,
    /// Library mapped into the process
    Loaded,
    /// Required entry points found
    SymbolsResolved,
    /// At least one device listed
    DeviceEnumerated,
    /// A device handle is held
    DeviceOpen,
    /// Device released; terminal
    Closed,
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Unloaded => "unloaded",
            Self::Loaded => "loaded",
            Self::SymbolsResolved => "symbols-resolved",
            Self::DeviceEnumerated => "device-enumerated",
            Self::DeviceOpen => "device-open",
            Self::Closed => "closed",
        })
    }
}

/// The four entry points; close is optional
#[derive(Debug, Clone)]
pub struct EntryPoints<E> {
    /// `Dongle_Enum`
    pub enumerate: E,
    /// `Dongle_Open`
    pub open: E,
    /// `Dongle_ReadFile`
    pub read: E,
    /// `Dongle_Close`, if exported
    pub close: Option<E>,
}

impl<'lib> EntryPoints<Symbol<'lib>> {
    /// Resolves every entry point in `library`.
    ///
    /// Fails on the first missing required symbol. A missing close symbol is
    /// logged and tolerated.
    pub fn resolve(library: &'lib LoadedLibrary) -> Result<Self> {
        let enumerate = symbol::resolve(library, Operation::Enumerate.symbol_name())?;
        let open = symbol::resolve(library, Operation::Open.symbol_name())?;
        let read = symbol::resolve(library, Operation::Read.symbol_name())?;
        let close = match symbol::resolve(library, Operation::Close.symbol_name()) {
            Ok(close) => Some(close),
            Err(Error::SymbolNotFound { name }) => {
                warn!("{} not exported; closing will be a no-op", name);
                None
            }
            Err(e) => return Err(e),
        };

        Ok(Self {
            enumerate,
            open,
            read,
            close,
        })
    }
}

/// Result of the two-phase enumeration
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Enumeration {
    /// The count query reported zero devices
    NotFound,
    /// Every record the library filled in
    Found(Vec<DeviceInfo>),
}

/// One dongle driven through its lifecycle
#[derive(Debug)]
pub struct Session<E: ForeignEntry> {
    entries: EntryPoints<E>,
    state: State,
    device: DeviceHandle,
    read_candidates: [CallSignature; 2],
}

impl<E: ForeignEntry> Session<E> {
    /// Starts a session over already-resolved entry points
    pub fn new(entries: EntryPoints<E>) -> Self {
        Self {
            entries,
            state: State::SymbolsResolved,
            device: DeviceHandle::CLOSED,
            read_candidates: CallSignature::read_candidates(DATA_FILE_TYPE),
        }
    }

    /// Overrides the discriminator used by the six-parameter read form
    pub fn with_file_type(mut self, file_type: u16) -> Self {
        self.read_candidates = CallSignature::read_candidates(file_type);
        self
    }

    /// Current state
    pub fn state(&self) -> State {
        self.state
    }

    /// Handle of the open device, or [`DeviceHandle::CLOSED`]
    pub fn device(&self) -> DeviceHandle {
        self.device
    }

    /// Whether a close entry point is available
    pub(crate) fn can_close(&self) -> bool {
        self.entries.close.is_some()
    }

    /// Lists attached devices: count query first, then the fill call.
    pub fn enumerate(&mut self) -> Result<Enumeration> {
        if self.state == State::DeviceOpen {
            return Err(Error::invalid_state("enumerate", self.state));
        }

        let mut count: c_int = 0;
        let outcome = probe(
            &self.entries.enumerate,
            &[CallSignature::Enumerate],
            &mut CallArgs::Enumerate {
                records: None,
                count: &mut count,
            },
        )?;
        if !outcome.is_success() {
            return Err(Error::status(Operation::Enumerate, outcome.code));
        }

        if count < 0 {
            warn!("Count query reported {} devices", count);
            return Err(Error::status(
                Operation::Enumerate,
                ResultCode::INVALID_PARAMETER,
            ));
        }
        if count == 0 {
            debug!("Count query reported no devices");
            return Ok(Enumeration::NotFound);
        }

        let expected = count;
        let mut records = vec![DeviceInfo::default(); expected as usize];
        let outcome = probe(
            &self.entries.enumerate,
            &[CallSignature::Enumerate],
            &mut CallArgs::Enumerate {
                records: Some(records.as_mut_slice()),
                count: &mut count,
            },
        )?;
        if !outcome.is_success() {
            return Err(Error::status(Operation::Enumerate, outcome.code));
        }
        if count != expected {
            debug!("Fill call changed count from {} to {}", expected, count);
        }

        debug!("Enumerated {} device(s)", records.len());
        self.state = State::DeviceEnumerated;
        Ok(Enumeration::Found(records))
    }

    /// Opens the device at zero-based `index`
    pub fn open(&mut self, index: usize) -> Result<DeviceHandle> {
        match self.state {
            State::DeviceEnumerated => {}
            State::SymbolsResolved | State::Closed => {
                return Err(Error::rejected(Operation::Open, ResultCode::ENUM_REQUIRED));
            }
            state => return Err(Error::invalid_state("open", state)),
        }
        let index = c_int::try_from(index)
            .map_err(|_| Error::rejected(Operation::Open, ResultCode::INVALID_PARAMETER))?;

        let mut handle = DeviceHandle::CLOSED;
        let outcome = probe(
            &self.entries.open,
            &[CallSignature::Open],
            &mut CallArgs::Open {
                handle: &mut handle,
                index,
            },
        )?;
        if !outcome.is_success() {
            return Err(Error::status(Operation::Open, outcome.code));
        }
        if !handle.is_open() {
            return Err(Error::rejected(Operation::Open, ResultCode::INVALID_HANDLE));
        }

        debug!("Opened device {} as {}", index, handle);
        self.device = handle;
        self.state = State::DeviceOpen;
        Ok(handle)
    }

    /// Reads `buffer.len()` bytes of `file_id` starting at `offset`.
    ///
    /// A closed handle or empty buffer is refused without calling the
    /// library. On failure the buffer is zeroed.
    pub fn read(&mut self, file_id: u16, offset: u16, buffer: &mut [u8]) -> Result<ProbeOutcome> {
        if !self.device.is_open() {
            return Err(Error::rejected(Operation::Read, ResultCode::INVALID_HANDLE));
        }
        if buffer.is_empty() {
            return Err(Error::rejected(Operation::Read, ResultCode::INVALID_BUFFER));
        }

        let outcome = probe(
            &self.entries.read,
            &self.read_candidates,
            &mut CallArgs::Read {
                handle: self.device,
                file_id,
                offset,
                buffer: &mut *buffer,
            },
        )?;

        if !outcome.is_success() {
            debug!("Read attempts: {:?}", outcome.attempts);
            buffer.fill(0);
            return Err(Error::status(Operation::Read, outcome.code));
        }
        Ok(outcome)
    }

    /// Releases the device.
    ///
    /// A closed handle or a missing close symbol counts as success, and the
    /// handle is forgotten whatever the library returns.
    pub fn close(&mut self) -> ResultCode {
        if !self.device.is_open() {
            return ResultCode::SUCCESS;
        }
        let handle = std::mem::replace(&mut self.device, DeviceHandle::CLOSED);
        self.state = State::Closed;

        let Some(entry) = &self.entries.close else {
            warn!("No close entry point; dropping handle {}", handle);
            return ResultCode::SUCCESS;
        };

        match probe(entry, &[CallSignature::Close], &mut CallArgs::Close { handle }) {
            Ok(outcome) => {
                debug!("Closed {}: {}", handle, outcome.code);
                outcome.code
            }
            Err(e) => {
                warn!("Closing {} failed: {}", handle, e);
                ResultCode::UNKNOWN
            }
        }
    }
}

impl<E: ForeignEntry> Drop for Session<E> {
    fn drop(&mut self) {
        if self.device.is_open() {
            let code = self.close();
            if !code.is_success() {
                warn!("Close during drop returned {}", code);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Call, StubDongle};
    use pretty_assertions::assert_eq;

    fn opened(stub: &StubDongle) -> Session<crate::testing::StubEntry> {
        let mut session = Session::new(stub.entries());
        session.enumerate().unwrap();
        session.open(0).unwrap();
        session
    }

    #[test]
    fn test_enumerate_zero_skips_fill_call() {
        let stub = StubDongle::new();
        let mut session = Session::new(stub.entries());

        assert_eq!(session.enumerate().unwrap(), Enumeration::NotFound);
        assert_eq!(session.state(), State::SymbolsResolved);
        assert_eq!(
            stub.calls(),
            vec![Call::Enumerate { with_buffer: false, count: 0 }]
        );
    }

    #[test]
    fn test_enumerate_negative_count_is_an_error() {
        let stub = StubDongle::new().reporting_count(-1);
        let mut session = Session::new(stub.entries());

        let err = session.enumerate().unwrap_err();
        assert!(matches!(err, Error::Status { .. }));
        assert_eq!(err.result_code(), Some(ResultCode::INVALID_PARAMETER));
        assert_eq!(session.state(), State::SymbolsResolved);
        assert_eq!(stub.calls().len(), 1);
    }

    #[test]
    fn test_close_before_open_keeps_state() {
        let stub = StubDongle::new().with_devices(1);
        let mut session = Session::new(stub.entries());
        session.enumerate().unwrap();

        assert!(session.close().is_success());
        assert_eq!(session.state(), State::DeviceEnumerated);
    }

    #[test]
    fn test_enumerate_fill_uses_exact_count() {
        let stub = StubDongle::new().with_devices(3);
        let mut session = Session::new(stub.entries());

        let Enumeration::Found(devices) = session.enumerate().unwrap() else {
            panic!("expected devices");
        };
        assert_eq!(devices.len(), 3);
        assert_eq!(devices[2].product_id, 0x1002);
        assert_eq!(session.state(), State::DeviceEnumerated);
        assert_eq!(
            stub.calls(),
            vec![
                Call::Enumerate { with_buffer: false, count: 0 },
                Call::Enumerate { with_buffer: true, count: 3 },
            ]
        );
    }

    #[test]
    fn test_enumerate_failure_in_either_phase() {
        let stub = StubDongle::new()
            .with_devices(1)
            .enum_status(ResultCode::ACCESS_DENIED, ResultCode::SUCCESS);
        let err = Session::new(stub.entries()).enumerate().unwrap_err();
        assert_eq!(err.result_code(), Some(ResultCode::ACCESS_DENIED));
        assert_eq!(stub.calls().len(), 1);

        let stub = StubDongle::new()
            .with_devices(1)
            .enum_status(ResultCode::SUCCESS, ResultCode::UNKNOWN);
        let mut session = Session::new(stub.entries());
        let err = session.enumerate().unwrap_err();
        assert_eq!(err.result_code(), Some(ResultCode::UNKNOWN));
        assert_eq!(session.state(), State::SymbolsResolved);
    }

    #[test]
    fn test_open_requires_enumeration() {
        let stub = StubDongle::new().with_devices(1);
        let mut session = Session::new(stub.entries());
        let err = session.open(0).unwrap_err();
        assert!(matches!(err, Error::Rejected { .. }));
        assert_eq!(err.result_code(), Some(ResultCode::ENUM_REQUIRED));
        assert!(stub.calls().is_empty());
    }

    #[test]
    fn test_open_failure_does_not_enter_open_state() {
        let stub = StubDongle::new()
            .with_devices(1)
            .open_status(ResultCode::NO_MORE_DEVICES);
        let mut session = Session::new(stub.entries());
        session.enumerate().unwrap();

        let err = session.open(0).unwrap_err();
        assert_eq!(err.result_code(), Some(ResultCode::NO_MORE_DEVICES));
        assert_eq!(session.state(), State::DeviceEnumerated);
        assert!(!session.device().is_open());
    }

    #[test]
    fn test_read_rejects_closed_handle_locally() {
        let stub = StubDongle::new().accepting_direct_read();
        let mut session = Session::new(stub.entries());
        let mut buf = [0u8; 8];

        let err = session.read(1, 0, &mut buf).unwrap_err();
        assert!(matches!(err, Error::Rejected { .. }));
        assert_eq!(err.result_code(), Some(ResultCode::INVALID_HANDLE));
        assert!(stub.calls().is_empty());
    }

    #[test]
    fn test_read_rejects_empty_buffer_locally() {
        let stub = StubDongle::new().with_devices(1).accepting_direct_read();
        let mut session = opened(&stub);
        let before = stub.calls().len();

        let err = session.read(1, 0, &mut []).unwrap_err();
        assert_eq!(err.result_code(), Some(ResultCode::INVALID_BUFFER));
        assert_eq!(stub.calls().len(), before);
    }

    #[test]
    fn test_read_falls_back_to_typed_form() {
        let stub = StubDongle::new().with_devices(1).accepting_typed_read();
        let mut session = opened(&stub);
        let mut buf = [0u8; 4];

        let outcome = session.read(1, 0, &mut buf).unwrap();
        assert_eq!(outcome.signature, CallSignature::ReadTyped { file_type: 1 });
        assert_eq!(buf, [0, 1, 2, 3]);
    }

    #[test]
    fn test_read_uses_configured_file_type() {
        let stub = StubDongle::new()
            .with_devices(1)
            .read_status(CallSignature::ReadTyped { file_type: 2 }, ResultCode::SUCCESS);
        let mut session = Session::new(stub.entries()).with_file_type(2);
        session.enumerate().unwrap();
        session.open(0).unwrap();

        let mut buf = [0u8; 4];
        assert!(session.read(1, 0, &mut buf).is_ok());
    }

    #[test]
    fn test_failed_read_yields_no_output() {
        let stub = StubDongle::new().with_devices(1);
        let mut session = opened(&stub);
        let mut buf = [0xEEu8; 4];

        let err = session.read(7, 0, &mut buf).unwrap_err();
        assert!(matches!(err, Error::Status { .. }));
        assert_eq!(buf, [0; 4]);
    }

    #[test]
    fn test_close_is_tolerant() {
        let stub = StubDongle::new().with_devices(1);
        let mut session = Session::new(stub.entries());
        assert!(session.close().is_success());
        assert!(stub.calls().is_empty());

        let mut session = opened(&stub);
        assert!(session.close().is_success());
        assert!(session.close().is_success());
        let closes = stub
            .calls()
            .into_iter()
            .filter(|c| matches!(c, Call::Close { .. }))
            .count();
        assert_eq!(closes, 1);
        assert_eq!(session.state(), State::Closed);
    }

    #[test]
    fn test_close_without_symbol() {
        let stub = StubDongle::new().with_devices(1);
        let mut entries = stub.entries();
        entries.close = None;
        let mut session = Session::new(entries);
        session.enumerate().unwrap();
        session.open(0).unwrap();

        assert!(!session.can_close());
        assert!(session.close().is_success());
        assert!(!session.device().is_open());
    }

    #[test]
    fn test_drop_closes_open_device() {
        let stub = StubDongle::new().with_devices(1);
        {
            let _session = opened(&stub);
        }
        assert_eq!(stub.calls().last(), Some(&Call::Close { handle: 1 }));
    }
}
