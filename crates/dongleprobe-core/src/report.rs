//! Human-readable rendering of harness results.
//!
//! The free functions are pure formatters. [`Reporter`] writes them to any
//! `io::Write` and counts the failures it was asked to print; it never
//! decides what runs next.

use crate::device::DeviceInfo;
use crate::error::{Error, Result};
use crate::status::ResultCode;
use std::fmt::Write as FmtWrite;
use std::io::Write;

/// Bytes per hex dump row
pub const BYTES_PER_ROW: usize = 16;

/// Renders `data` as offset, hex and ASCII columns, sixteen bytes per row
pub fn hexdump(data: &[u8]) -> String {
    let mut out = String::with_capacity(data.len().div_ceil(BYTES_PER_ROW) * 78);

    for (row, chunk) in data.chunks(BYTES_PER_ROW).enumerate() {
        let _ = write!(out, "{:08x} ", row * BYTES_PER_ROW);
        for i in 0..BYTES_PER_ROW {
            if i == BYTES_PER_ROW / 2 {
                out.push(' ');
            }
            match chunk.get(i) {
                Some(byte) => {
                    let _ = write!(out, " {:02x}", byte);
                }
                None => out.push_str("   "),
            }
        }
        out.push_str("  |");
        out.extend(chunk.iter().map(|&b| {
            if b.is_ascii_graphic() || b == b' ' {
                b as char
            } else {
                '.'
            }
        }));
        out.push_str("|\n");
    }

    out
}

fn hex_bytes(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02X}", b)).collect()
}

/// Multi-line listing of one enumerated device (`index` is zero-based)
pub fn device_summary(index: usize, info: &DeviceInfo) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Device #{}", index + 1);
    let _ = writeln!(out, "  version:      0x{:04X}", info.version);
    let _ = writeln!(out, "  type:         0x{:04X}", info.kind);
    let _ = writeln!(out, "  birthday:     {}", hex_bytes(&info.birthday));
    let _ = writeln!(out, "  agent id:     0x{:08X}", info.agent_id);
    let _ = writeln!(out, "  product id:   0x{:08X}", info.product_id);
    let _ = writeln!(out, "  user id:      0x{:08X}", info.user_id);
    let _ = writeln!(out, "  hardware id:  {}", hex_bytes(&info.hardware_id));
    let _ = writeln!(
        out,
        "  mother:       {}",
        if info.is_mother() { "yes" } else { "no" }
    );
    let _ = writeln!(out, "  device type:  0x{:08X}", info.device_type);
    out
}

/// Short BLAKE3 fingerprint for comparing payloads without dumping them
pub fn fingerprint(data: &[u8]) -> String {
    blake3::hash(data).to_hex()[..16].to_string()
}

/// Writes diagnostic output and tallies reported failures
#[derive(Debug)]
pub struct Reporter<W: Write> {
    out: W,
    failures: usize,
}

impl<W: Write> Reporter<W> {
    /// Creates a reporter writing to `out`
    pub fn new(out: W) -> Self {
        Self { out, failures: 0 }
    }

    /// Number of failures printed so far
    pub fn failures(&self) -> usize {
        self.failures
    }

    /// Starts a titled section
    pub fn section(&mut self, title: &str) -> Result<()> {
        writeln!(self.out, "\n== {} ==", title)?;
        Ok(())
    }

    /// Writes one free-form line
    pub fn line(&mut self, text: impl AsRef<str>) -> Result<()> {
        writeln!(self.out, "{}", text.as_ref())?;
        Ok(())
    }

    /// Writes an aligned `key: value` line
    pub fn field(&mut self, key: &str, value: impl std::fmt::Display) -> Result<()> {
        writeln!(self.out, "  {:<14} {}", format!("{}:", key), value)?;
        Ok(())
    }

    /// Reports a successful step
    pub fn ok(&mut self, what: impl std::fmt::Display) -> Result<()> {
        writeln!(self.out, "OK: {}", what)?;
        Ok(())
    }

    /// Reports a failed step, with hints for the common status codes
    pub fn failure(&mut self, error: &Error) -> Result<()> {
        self.failures += 1;
        writeln!(self.out, "FAILED: {}", error)?;
        if let Some(code) = error.result_code() {
            for hint in code.hints() {
                writeln!(self.out, "  hint: {}", hint)?;
            }
        }
        Ok(())
    }

    /// Reports a terminal but expected status, such as no device attached
    pub fn notice(&mut self, code: ResultCode) -> Result<()> {
        writeln!(self.out, "NOTE: {}", code)?;
        for hint in code.hints() {
            writeln!(self.out, "  hint: {}", hint)?;
        }
        Ok(())
    }

    /// Lists a status against `label` with its hints; not counted as a failure
    pub fn listed(&mut self, label: &str, code: ResultCode) -> Result<()> {
        writeln!(self.out, "{}: {}", label, code)?;
        for hint in code.hints() {
            writeln!(self.out, "  hint: {}", hint)?;
        }
        Ok(())
    }

    /// Reports an optional step that could not run; not counted as a failure
    pub fn skipped(&mut self, error: &Error) -> Result<()> {
        writeln!(self.out, "SKIPPED: {}", error)?;
        Ok(())
    }

    /// Lists every enumerated device
    pub fn devices(&mut self, devices: &[DeviceInfo]) -> Result<()> {
        for (i, info) in devices.iter().enumerate() {
            self.out.write_all(device_summary(i, info).as_bytes())?;
        }
        Ok(())
    }

    /// Writes a hex dump of `data`
    pub fn hexdump(&mut self, data: &[u8]) -> Result<()> {
        self.out.write_all(hexdump(data).as_bytes())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::Operation;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_hexdump_full_row() {
        let dump = hexdump(b"0123456789ABCDEF");
        assert_eq!(
            dump,
            "00000000  30 31 32 33 34 35 36 37  38 39 41 42 43 44 45 46  |0123456789ABCDEF|\n"
        );
    }

    #[test]
    fn test_hexdump_partial_row_is_padded() {
        let dump = hexdump(&[0x00, 0x41, 0xFF]);
        assert_eq!(
            dump,
            "00000000  00 41 ff                                          |.A.|\n"
        );
    }

    #[test]
    fn test_hexdump_row_count() {
        let data = vec![0u8; 1024];
        let dump = hexdump(&data);
        assert_eq!(dump.lines().count(), 64);
        assert!(dump.lines().last().unwrap().starts_with("000003f0"));
        assert!(hexdump(&[]).is_empty());
    }

    #[test]
    fn test_device_summary() {
        let info = DeviceInfo {
            version: 0x0100,
            product_id: 0xCAFE,
            hardware_id: [1, 2, 3, 4, 5, 6, 7, 8],
            is_mother: 1,
            ..Default::default()
        };
        let text = device_summary(0, &info);
        assert!(text.starts_with("Device #1\n"));
        assert!(text.contains("0x0000CAFE"));
        assert!(text.contains("0102030405060708"));
        assert!(text.contains("mother:       yes"));
    }

    #[test]
    fn test_fingerprint_is_stable() {
        assert_eq!(fingerprint(b"abc"), fingerprint(b"abc"));
        assert_ne!(fingerprint(b"abc"), fingerprint(b"abd"));
        assert_eq!(fingerprint(b"").len(), 16);
    }

    #[test]
    fn test_failure_prints_hints_and_counts() {
        let mut buf = Vec::new();
        let mut reporter = Reporter::new(&mut buf);
        reporter
            .failure(&Error::status(Operation::Enumerate, ResultCode::NOT_FOUND))
            .unwrap();
        reporter
            .failure(&Error::status(Operation::Read, ResultCode::INVALID_OFFSET))
            .unwrap();
        assert_eq!(reporter.failures(), 2);

        let text = String::from_utf8(buf).unwrap();
        assert!(text.contains("FAILED: enumerate failed: 0xF0000001 (device not found)"));
        assert_eq!(text.matches("hint:").count(), 3);
    }

    #[test]
    fn test_listed_prints_hints_without_counting() {
        let mut buf = Vec::new();
        let mut reporter = Reporter::new(&mut buf);
        reporter
            .listed("file 0x0001 offset 0x0000", ResultCode::UNKNOWN)
            .unwrap();
        reporter
            .listed("file 0x0002 offset 0x0000", ResultCode::INVALID_FILE_ID)
            .unwrap();
        assert_eq!(reporter.failures(), 0);

        let text = String::from_utf8(buf).unwrap();
        assert!(text.contains("file 0x0001 offset 0x0000: 0xFFFFFFFF (unknown error)"));
        assert_eq!(text.matches("hint:").count(), ResultCode::UNKNOWN.hints().len());
    }
}
