//! In-process stand-in for the vendor library.

use crate::device::{DeviceHandle, DeviceInfo};
use crate::error::{Error, Result};
use crate::harness::EntryPoints;
use crate::probe::{CallArgs, CallSignature, ForeignEntry, DATA_FILE_TYPE};
use crate::status::ResultCode;
use std::cell::RefCell;
use std::collections::HashMap;
use std::os::raw::{c_int, c_ulong};
use std::rc::Rc;

/// One recorded foreign call
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Call {
    Enumerate { with_buffer: bool, count: c_int },
    Open { index: c_int },
    ReadDirect { file_id: u16, offset: u16, size: usize },
    ReadTyped { file_type: u16, file_id: u16, offset: u16, size: usize },
    Close { handle: usize },
}

#[derive(Debug)]
struct State {
    devices: usize,
    reported_count: Option<c_int>,
    library_closed: bool,
    enum_status: [ResultCode; 2],
    open_status: ResultCode,
    handle: usize,
    read_status: HashMap<CallSignature, ResultCode>,
    close_status: ResultCode,
    calls: Vec<Call>,
}

/// Configurable fake dongle library that records every call
#[derive(Debug, Clone)]
pub(crate) struct StubDongle {
    state: Rc<RefCell<State>>,
}

impl StubDongle {
    /// No devices attached, every read rejected
    pub(crate) fn new() -> Self {
        Self {
            state: Rc::new(RefCell::new(State {
                devices: 0,
                reported_count: None,
                library_closed: false,
                enum_status: [ResultCode::SUCCESS; 2],
                open_status: ResultCode::SUCCESS,
                handle: 0x1,
                read_status: HashMap::new(),
                close_status: ResultCode::SUCCESS,
                calls: Vec::new(),
            })),
        }
    }

    pub(crate) fn with_devices(self, devices: usize) -> Self {
        self.state.borrow_mut().devices = devices;
        self
    }

    /// Count query answers `count` regardless of attached devices
    pub(crate) fn reporting_count(self, count: c_int) -> Self {
        self.state.borrow_mut().reported_count = Some(count);
        self
    }

    /// Reads fail as though the library had been unloaded underneath them
    pub(crate) fn unloaded_during_read(self) -> Self {
        self.state.borrow_mut().library_closed = true;
        self
    }

    pub(crate) fn enum_status(self, count_query: ResultCode, fill: ResultCode) -> Self {
        self.state.borrow_mut().enum_status = [count_query, fill];
        self
    }

    pub(crate) fn open_status(self, code: ResultCode) -> Self {
        self.state.borrow_mut().open_status = code;
        self
    }

    pub(crate) fn read_status(self, signature: CallSignature, code: ResultCode) -> Self {
        self.state.borrow_mut().read_status.insert(signature, code);
        self
    }

    pub(crate) fn accepting_direct_read(self) -> Self {
        self.read_status(CallSignature::ReadDirect, ResultCode::SUCCESS)
    }

    pub(crate) fn accepting_typed_read(self) -> Self {
        self.read_status(
            CallSignature::ReadTyped {
                file_type: DATA_FILE_TYPE,
            },
            ResultCode::SUCCESS,
        )
    }

    pub(crate) fn entry(&self) -> StubEntry {
        StubEntry {
            state: Rc::clone(&self.state),
        }
    }

    pub(crate) fn entries(&self) -> EntryPoints<StubEntry> {
        EntryPoints {
            enumerate: self.entry(),
            open: self.entry(),
            read: self.entry(),
            close: Some(self.entry()),
        }
    }

    pub(crate) fn calls(&self) -> Vec<Call> {
        self.state.borrow().calls.clone()
    }
}

/// One entry point of a [`StubDongle`]
#[derive(Debug, Clone)]
pub(crate) struct StubEntry {
    state: Rc<RefCell<State>>,
}

impl ForeignEntry for StubEntry {
    fn invoke(&self, signature: CallSignature, args: &mut CallArgs<'_>) -> Result<ResultCode> {
        if signature.operation() != args.operation() {
            return Err(Error::SignatureMismatch {
                signature: signature.to_string(),
                operation: args.operation(),
            });
        }

        let mut state = self.state.borrow_mut();
        let code = match args {
            CallArgs::Enumerate { records, count } => {
                state.calls.push(Call::Enumerate {
                    with_buffer: records.is_some(),
                    count: **count,
                });
                match records {
                    None => {
                        **count = state
                            .reported_count
                            .unwrap_or(state.devices as c_int);
                        state.enum_status[0]
                    }
                    Some(records) => {
                        for (i, record) in records.iter_mut().enumerate() {
                            *record = DeviceInfo {
                                version: 0x0100,
                                kind: 0x0002,
                                product_id: 0x1000 + i as c_ulong,
                                hardware_id: [i as u8; 8],
                                ..Default::default()
                            };
                        }
                        state.enum_status[1]
                    }
                }
            }
            CallArgs::Open { handle, index } => {
                state.calls.push(Call::Open { index: *index });
                if state.open_status.is_success() {
                    **handle = DeviceHandle::from_raw(state.handle);
                }
                state.open_status
            }
            CallArgs::Read {
                file_id,
                offset,
                buffer,
                ..
            } => {
                state.calls.push(match signature {
                    CallSignature::ReadTyped { file_type } => Call::ReadTyped {
                        file_type,
                        file_id: *file_id,
                        offset: *offset,
                        size: buffer.len(),
                    },
                    _ => Call::ReadDirect {
                        file_id: *file_id,
                        offset: *offset,
                        size: buffer.len(),
                    },
                });
                if state.library_closed {
                    return Err(Error::LibraryClosed(1));
                }
                let code = state
                    .read_status
                    .get(&signature)
                    .copied()
                    .unwrap_or(ResultCode::INVALID_PARAMETER);
                if code.is_success() {
                    for (i, byte) in buffer.iter_mut().enumerate() {
                        *byte = i as u8;
                    }
                }
                code
            }
            CallArgs::Close { handle } => {
                state.calls.push(Call::Close {
                    handle: handle.as_raw(),
                });
                state.close_status
            }
        };

        Ok(code)
    }
}
