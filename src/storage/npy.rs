//! NumPy `.npy` codec.
//!
//! Format (version 1.0):
//! ```text
//! [\x93NUMPY][major: 1][minor: 1][header_len: 2 bytes LE][header: ASCII dict][data]
//! ```
//! The header is a Python dict literal padded with spaces so that the data
//! starts on a 64-byte boundary. Arrays are one-dimensional and C-ordered.
//! Version 2.0 files (4-byte header length) are accepted on read.

use std::fs;
use std::path::Path;
use std::sync::OnceLock;

use chrono::{Duration, NaiveDate};
use regex::Regex;

use crate::storage::StorageError;
use crate::value::Array;

/// Magic bytes opening every `.npy` file.
pub const MAGIC: [u8; 6] = *b"\x93NUMPY";

const ALIGNMENT: usize = 64;

/// Reject headers larger than this; real headers are well under 1 KiB.
const MAX_HEADER_LEN: usize = 64 * 1024;

static HEADER: OnceLock<Regex> = OnceLock::new();

fn header_regex() -> &'static Regex {
    HEADER.get_or_init(|| {
        Regex::new(
            r"^\{\s*'descr'\s*:\s*'(?P<descr>[^']+)'\s*,\s*'fortran_order'\s*:\s*(?P<fortran>True|False)\s*,\s*'shape'\s*:\s*\((?P<len>\d*)\s*,?\s*\)\s*,?\s*\}\s*$",
        )
        .expect("valid npy header regex")
    })
}

fn epoch() -> NaiveDate {
    NaiveDate::from_ymd_opt(1970, 1, 1).unwrap_or_default()
}

fn descr(array: &Array) -> String {
    match array {
        Array::Bool(_) => "|b1".to_string(),
        Array::Int(_) => "<i8".to_string(),
        Array::Float(_) => "<f8".to_string(),
        Array::Enum(_) => "<i2".to_string(),
        Array::Date(_) => "<M8[D]".to_string(),
        Array::Str(values) => {
            let width = values.iter().map(|s| s.chars().count()).max().unwrap_or(0).max(1);
            format!("<U{width}")
        }
    }
}

/// Serializes an array to `.npy` bytes.
#[must_use]
pub fn encode(array: &Array) -> Vec<u8> {
    let descr = descr(array);
    let mut header = format!(
        "{{'descr': '{descr}', 'fortran_order': False, 'shape': ({},), }}",
        array.len()
    );
    // magic + version + u16 length + header + '\n' must be a multiple of 64.
    let unpadded = MAGIC.len() + 2 + 2 + header.len() + 1;
    let padding = (ALIGNMENT - unpadded % ALIGNMENT) % ALIGNMENT;
    header.extend(std::iter::repeat(' ').take(padding));
    header.push('\n');

    let mut out = Vec::with_capacity(unpadded + padding + array.nbytes());
    out.extend_from_slice(&MAGIC);
    out.extend_from_slice(&[1, 0]);
    #[allow(clippy::cast_possible_truncation)]
    out.extend_from_slice(&(header.len() as u16).to_le_bytes());
    out.extend_from_slice(header.as_bytes());

    match array {
        Array::Bool(values) => out.extend(values.iter().map(|&b| u8::from(b))),
        Array::Int(values) => values.iter().for_each(|v| out.extend_from_slice(&v.to_le_bytes())),
        Array::Float(values) => values.iter().for_each(|v| out.extend_from_slice(&v.to_le_bytes())),
        Array::Enum(values) => values.iter().for_each(|v| out.extend_from_slice(&v.to_le_bytes())),
        Array::Date(values) => {
            let epoch = epoch();
            for date in values {
                out.extend_from_slice(&(*date - epoch).num_days().to_le_bytes());
            }
        }
        Array::Str(values) => {
            let width = values.iter().map(|s| s.chars().count()).max().unwrap_or(0).max(1);
            for value in values {
                let mut written = 0;
                for c in value.chars() {
                    out.extend_from_slice(&u32::from(c).to_le_bytes());
                    written += 1;
                }
                for _ in written..width {
                    out.extend_from_slice(&0_u32.to_le_bytes());
                }
            }
        }
    }
    out
}

fn fixed_chunks<const N: usize>(data: &[u8], len: usize) -> Result<Vec<[u8; N]>, String> {
    if data.len() != len * N {
        return Err(format!("expected {} data bytes, found {}", len * N, data.len()));
    }
    Ok(data
        .chunks_exact(N)
        .map(|chunk| {
            let mut bytes = [0_u8; N];
            bytes.copy_from_slice(chunk);
            bytes
        })
        .collect())
}

fn decode_body(descr: &str, len: usize, data: &[u8]) -> Result<Array, String> {
    match descr {
        "|b1" | "<b1" => {
            let bytes = fixed_chunks::<1>(data, len)?;
            Ok(Array::Bool(bytes.into_iter().map(|[b]| b != 0).collect()))
        }
        "<i8" => Ok(Array::Int(
            fixed_chunks::<8>(data, len)?.into_iter().map(i64::from_le_bytes).collect(),
        )),
        "<f8" => Ok(Array::Float(
            fixed_chunks::<8>(data, len)?.into_iter().map(f64::from_le_bytes).collect(),
        )),
        "<i2" => Ok(Array::Enum(
            fixed_chunks::<2>(data, len)?.into_iter().map(i16::from_le_bytes).collect(),
        )),
        "<M8[D]" => {
            let epoch = epoch();
            fixed_chunks::<8>(data, len)?
                .into_iter()
                .map(i64::from_le_bytes)
                .map(|days| {
                    Duration::try_days(days)
                        .and_then(|d| epoch.checked_add_signed(d))
                        .ok_or_else(|| format!("day offset {days} is not a valid date"))
                })
                .collect::<Result<_, _>>()
                .map(Array::Date)
        }
        other => {
            let width: usize = other
                .strip_prefix("<U")
                .and_then(|w| w.parse().ok())
                .ok_or_else(|| format!("unsupported dtype '{other}'"))?;
            if width == 0 || data.len() != len * width * 4 {
                return Err(format!("string data does not match width {width}"));
            }
            data.chunks_exact(width * 4)
                .map(|cell| {
                    cell.chunks_exact(4)
                        .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                        .take_while(|&code| code != 0)
                        .map(|code| char::from_u32(code).ok_or_else(|| format!("invalid code point {code}")))
                        .collect::<Result<String, _>>()
                })
                .collect::<Result<_, _>>()
                .map(Array::Str)
        }
    }
}

/// Parses `.npy` bytes.
///
/// # Errors
///
/// Returns a human-readable reason when the bytes are not a supported
/// one-dimensional array.
pub fn decode(bytes: &[u8]) -> Result<Array, String> {
    if bytes.len() < MAGIC.len() + 4 || bytes[..MAGIC.len()] != MAGIC {
        return Err("missing NUMPY magic".to_string());
    }
    let major = bytes[MAGIC.len()];
    let rest = &bytes[MAGIC.len() + 2..];
    let (header_len, rest) = match major {
        1 => (usize::from(u16::from_le_bytes([rest[0], rest[1]])), &rest[2..]),
        2 | 3 => {
            if rest.len() < 4 {
                return Err("truncated header length".to_string());
            }
            let len = u32::from_le_bytes([rest[0], rest[1], rest[2], rest[3]]);
            (usize::try_from(len).map_err(|_| "header too large".to_string())?, &rest[4..])
        }
        other => return Err(format!("unsupported format version {other}")),
    };
    if header_len > MAX_HEADER_LEN || rest.len() < header_len {
        return Err(format!("header length {header_len} exceeds the file"));
    }
    let header = std::str::from_utf8(&rest[..header_len]).map_err(|e| e.to_string())?;
    let captures = header_regex()
        .captures(header.trim_end())
        .ok_or_else(|| format!("unsupported header {header:?}"))?;
    if &captures["fortran"] == "True" {
        return Err("fortran-ordered arrays are not supported".to_string());
    }
    let len_text = &captures["len"];
    if len_text.is_empty() {
        return Err("scalar arrays are not supported".to_string());
    }
    let len: usize = len_text.parse().map_err(|_| format!("invalid shape {len_text}"))?;
    decode_body(&captures["descr"], len, &rest[header_len..])
}

/// Writes `array` to `path`.
///
/// # Errors
///
/// Returns `StorageError::Io` when the file cannot be written.
pub fn write_array(path: &Path, array: &Array) -> Result<(), StorageError> {
    fs::write(path, encode(array)).map_err(|e| StorageError::io(path, e))
}

/// Reads the array stored at `path`.
///
/// # Errors
///
/// Returns `StorageError::Io` when the file cannot be read and
/// `StorageError::Codec` when it is not a supported `.npy` array.
pub fn read_array(path: &Path) -> Result<Array, StorageError> {
    let bytes = fs::read(path).map_err(|e| StorageError::io(path, e))?;
    decode(&bytes).map_err(|reason| StorageError::Codec {
        path: path.to_path_buf(),
        reason,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_is_aligned() {
        let bytes = encode(&Array::from(vec![1.0, 2.0, 3.0]));
        let header_len = usize::from(u16::from_le_bytes([bytes[8], bytes[9]]));
        assert_eq!((10 + header_len) % 64, 0);
        assert_eq!(bytes[10 + header_len - 1], b'\n');
        assert_eq!(bytes.len(), 10 + header_len + 24);
        let header = std::str::from_utf8(&bytes[10..10 + header_len]).unwrap();
        assert!(header.starts_with("{'descr': '<f8', 'fortran_order': False, 'shape': (3,), }"));
    }

    #[test]
    fn test_typed_arrays_decode() {
        let date = NaiveDate::from_ymd_opt(2022, 3, 5).unwrap();
        for array in [
            Array::from(vec![true, false, true]),
            Array::from(vec![-3_i64, 0, 7]),
            Array::from(vec![0.5, -1.25]),
            Array::Enum(vec![0, 2, 1]),
            Array::from(vec![date, epoch()]),
            Array::from(vec!["tenant", "", "é"]),
            Array::Float(Vec::new()),
        ] {
            assert_eq!(decode(&encode(&array)).unwrap(), array);
        }
    }

    #[test]
    fn test_date_is_days_since_epoch() {
        let bytes = encode(&Array::from(vec![NaiveDate::from_ymd_opt(1970, 1, 11).unwrap()]));
        let data = &bytes[bytes.len() - 8..];
        assert_eq!(i64::from_le_bytes(data.try_into().unwrap()), 10);
    }

    #[test]
    fn test_rejects_bad_input() {
        assert!(decode(b"not an npy file").is_err());
        let mut bytes = encode(&Array::from(vec![1.0]));
        bytes.truncate(bytes.len() - 1);
        assert!(decode(&bytes).unwrap_err().contains("data bytes"));

        let mut bytes = encode(&Array::from(vec![1.0]));
        let pos = bytes.windows(5).position(|w| w == b"False").unwrap();
        bytes[pos..pos + 5].copy_from_slice(b"True ");
        assert!(decode(&bytes).is_err());
    }

    #[test]
    fn test_file_io() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("2022-01.npy");
        let array = Array::from(vec![1000.0, 0.0]);
        write_array(&path, &array).unwrap();
        assert_eq!(read_array(&path).unwrap(), array);
        assert!(read_array(&dir.path().join("missing.npy")).is_err());
    }
}
