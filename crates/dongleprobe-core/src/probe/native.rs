//! Binding resolved addresses to concrete `extern "C"` function types.

use super::{CallArgs, CallSignature, ForeignEntry};
use crate::device::{DeviceHandle, DeviceInfo};
use crate::error::{Error, Result};
use crate::status::ResultCode;
use crate::symbol::Symbol;
use std::ffi::c_void;
use std::os::raw::c_int;
use std::ptr;
use tracing::trace;

type EnumFn = unsafe extern "C" fn(*mut DeviceInfo, *mut c_int) -> u32;
type OpenFn = unsafe extern "C" fn(*mut usize, c_int) -> u32;
type ReadDirectFn = unsafe extern "C" fn(usize, u16, u16, *mut u8, c_int) -> u32;
type ReadTypedFn = unsafe extern "C" fn(usize, u16, u16, u16, *mut u8, c_int) -> u32;
type CloseFn = unsafe extern "C" fn(usize) -> u32;

impl ForeignEntry for Symbol<'_> {
    fn invoke(&self, signature: CallSignature, args: &mut CallArgs<'_>) -> Result<ResultCode> {
        let address = self.address().value() as *const c_void;
        trace!("Binding {} at {} as {}", self.name(), self.address(), signature);

        // SAFETY: `address` is a live export of a loaded library (the borrow on
        // `Symbol` keeps it mapped). Calling it under a signature the library
        // does not actually use is the probe itself; every candidate takes
        // only word-sized or narrower arguments, and buffers are sized from
        // the slices handed in.
        let raw = unsafe {
            match (signature, args) {
                (CallSignature::Enumerate, CallArgs::Enumerate { records, count }) => {
                    let f = std::mem::transmute::<*const c_void, EnumFn>(address);
                    let out = match records {
                        Some(records) => records.as_mut_ptr(),
                        None => ptr::null_mut(),
                    };
                    f(out, &mut **count)
                }
                (CallSignature::Open, CallArgs::Open { handle, index }) => {
                    let f = std::mem::transmute::<*const c_void, OpenFn>(address);
                    let mut opened: usize = 0;
                    let raw = f(&mut opened, *index);
                    if raw == 0 {
                        **handle = DeviceHandle::from_raw(opened);
                    }
                    raw
                }
                (
                    CallSignature::ReadDirect,
                    CallArgs::Read {
                        handle,
                        file_id,
                        offset,
                        buffer,
                    },
                ) => {
                    let size = buffer_size(buffer)?;
                    let f = std::mem::transmute::<*const c_void, ReadDirectFn>(address);
                    f(handle.as_raw(), *file_id, *offset, buffer.as_mut_ptr(), size)
                }
                (
                    CallSignature::ReadTyped { file_type },
                    CallArgs::Read {
                        handle,
                        file_id,
                        offset,
                        buffer,
                    },
                ) => {
                    let size = buffer_size(buffer)?;
                    let f = std::mem::transmute::<*const c_void, ReadTypedFn>(address);
                    f(
                        handle.as_raw(),
                        file_type,
                        *file_id,
                        *offset,
                        buffer.as_mut_ptr(),
                        size,
                    )
                }
                (CallSignature::Close, CallArgs::Close { handle }) => {
                    let f = std::mem::transmute::<*const c_void, CloseFn>(address);
                    f(handle.as_raw())
                }
                (signature, args) => {
                    return Err(Error::SignatureMismatch {
                        signature: signature.to_string(),
                        operation: args.operation(),
                    })
                }
            }
        };

        Ok(ResultCode(raw))
    }
}

fn buffer_size(buffer: &[u8]) -> Result<c_int> {
    c_int::try_from(buffer.len())
        .map_err(|_| Error::rejected(super::Operation::Read, ResultCode::INVALID_SIZE))
}
