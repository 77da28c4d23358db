//! On-disk matrix format.
//!
//! A matrix file is a single line of JSON describing the matrix (format
//! version, shape, axis headers, payload encoding), a newline, and then the
//! row-major little-endian `f64` payload, zstd-compressed by default.

use crate::error::MatrixError;
use crate::headers::Headers;
use crate::Matrix;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

/// Version written into every file header.
pub const FORMAT_VERSION: &str = "2.0.0";

const DTYPE_F64: &str = "f64";
const ZSTD_LEVEL: i32 = 3;

/// Payload encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    /// Raw little-endian values.
    None,
    /// Zstd-compressed little-endian values.
    #[default]
    Zstd,
}

#[derive(Debug, Serialize, Deserialize)]
struct FileHeader {
    version: String,
    headers: Headers,
    shape: Vec<usize>,
    #[serde(default = "default_dtype")]
    dtype: String,
    #[serde(default)]
    compression: Compression,
}

fn default_dtype() -> String {
    DTYPE_F64.to_string()
}

impl Matrix {
    /// Write the matrix to `path` using zstd compression.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), MatrixError> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        self.write_to(&mut writer, Compression::Zstd)?;
        writer.flush()?;
        Ok(())
    }

    /// Read a matrix from `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, MatrixError> {
        let file = File::open(path)?;
        Self::read_from(&mut BufReader::new(file))
    }

    /// Serialize into any writer.
    pub fn write_to<W: Write>(&self, writer: &mut W, compression: Compression) -> Result<(), MatrixError> {
        let header = FileHeader {
            version: FORMAT_VERSION.to_string(),
            headers: self.headers.clone(),
            shape: self.shape.clone(),
            dtype: DTYPE_F64.to_string(),
            compression,
        };
        serde_json::to_writer(&mut *writer, &header)?;
        writer.write_all(b"\n")?;

        let mut raw = Vec::with_capacity(self.data.len() * 8);
        for v in &self.data {
            raw.extend_from_slice(&v.to_le_bytes());
        }
        match compression {
            Compression::None => writer.write_all(&raw)?,
            Compression::Zstd => {
                let packed = zstd::bulk::compress(&raw, ZSTD_LEVEL)?;
                writer.write_all(&packed)?;
            }
        }
        Ok(())
    }

    /// Deserialize from a buffered reader positioned at the header line.
    pub fn read_from<R: BufRead>(reader: &mut R) -> Result<Self, MatrixError> {
        let mut line = String::new();
        if reader.read_line(&mut line)? == 0 {
            return Err(MatrixError::Format("empty input".into()));
        }
        let header: FileHeader = serde_json::from_str(line.trim_end())?;
        if header.dtype != DTYPE_F64 {
            return Err(MatrixError::Format(format!(
                "unsupported dtype '{}'",
                header.dtype
            )));
        }

        let mut payload = Vec::new();
        reader.read_to_end(&mut payload)?;
        let raw = match header.compression {
            Compression::None => payload,
            Compression::Zstd => zstd::stream::decode_all(std::io::Cursor::new(payload))
                .map_err(|e| MatrixError::Format(format!("zstd decompression failed: {e}")))?,
        };

        let expected = header
            .shape
            .iter()
            .try_fold(8usize, |acc, &dim| acc.checked_mul(dim))
            .ok_or_else(|| MatrixError::Format(format!("shape {:?} is too large", header.shape)))?;
        if raw.len() != expected {
            return Err(MatrixError::Format(format!(
                "payload has {} bytes, shape {:?} needs {expected}",
                raw.len(),
                header.shape
            )));
        }
        let data = raw
            .chunks_exact(8)
            .map(|chunk| {
                let mut bytes = [0u8; 8];
                bytes.copy_from_slice(chunk);
                f64::from_le_bytes(bytes)
            })
            .collect();
        Matrix::new(data, header.shape, header.headers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn labeled() -> Matrix {
        Matrix::from_rows(&[vec![0.5, -1.0], vec![2.0, 3.25], vec![0.0, 1e-9]])
            .unwrap()
            .with_headers(
                Headers::new()
                    .with_axis(0, ["r0", "r1", "r2"])
                    .with_axis(1, ["x", "y"]),
            )
            .unwrap()
    }

    #[test]
    fn test_save_and_load_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("m.lmm");
        let m = labeled();
        m.save(&path).unwrap();
        assert_eq!(Matrix::load(&path).unwrap(), m);
    }

    #[test]
    fn test_header_line_is_json() {
        let mut buf = Vec::new();
        labeled().write_to(&mut buf, Compression::None).unwrap();
        let newline = buf.iter().position(|&b| b == b'\n').unwrap();
        let value: serde_json::Value = serde_json::from_slice(&buf[..newline]).unwrap();
        assert_eq!(value["version"], FORMAT_VERSION);
        assert_eq!(value["headers"]["1"][1], "y");
        assert_eq!(buf.len() - newline - 1, 6 * 8);
    }

    #[test]
    fn test_truncated_payload_is_rejected() {
        let mut buf = Vec::new();
        labeled().write_to(&mut buf, Compression::None).unwrap();
        buf.truncate(buf.len() - 3);
        let err = Matrix::read_from(&mut buf.as_slice()).unwrap_err();
        assert!(matches!(err, MatrixError::Format(_)));
    }

    #[test]
    fn test_oversized_shape_is_rejected() {
        let mut buf = br#"{"version":"2.0.0","headers":{},"shape":[4294967296,4294967296,2],"compression":"none"}"#.to_vec();
        buf.push(b'\n');
        buf.extend_from_slice(&[0u8; 16]);
        let err = Matrix::read_from(&mut buf.as_slice()).unwrap_err();
        assert!(matches!(err, MatrixError::Format(msg) if msg.contains("too large")));
    }

    #[test]
    fn test_empty_input_is_rejected() {
        let empty: &[u8] = &[];
        assert!(Matrix::read_from(&mut &*empty).is_err());
    }
}
