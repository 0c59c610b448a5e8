//! The local device interface the reader pulls records from.

use crate::sensor::record::RECORD_LEN;
use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

/// A sequential byte source yielding one record per read.
///
/// Implementations return at most [`RECORD_LEN`] bytes; an empty buffer
/// means the source has nothing more to give.
pub trait RecordSource: Send + Sync {
    fn read_record(&self) -> io::Result<Vec<u8>>;

    /// Human-readable name for log lines.
    fn describe(&self) -> String;
}

/// Character device (or plain file) that is opened, read once and closed on every call.
#[derive(Debug, Clone)]
pub struct CharDevice {
    path: PathBuf,
}

impl CharDevice {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        CharDevice { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl RecordSource for CharDevice {
    fn read_record(&self) -> io::Result<Vec<u8>> {
        let file = File::open(&self.path)?;
        let mut buf = Vec::with_capacity(RECORD_LEN);
        file.take(RECORD_LEN as u64).read_to_end(&mut buf)?;
        Ok(buf)
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensor::record::Record;
    use std::io::Write;

    #[test]
    fn reads_one_record_per_open() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        let first = Record { time: 1, type_id: 2, value: 3.0 };
        let second = Record { time: 4, type_id: 5, value: 6.0 };
        file.write_all(&first.encode()).unwrap();
        file.write_all(&second.encode()).unwrap();
        file.flush().unwrap();

        let device = CharDevice::new(file.path());
        // reopened every time, so a regular file always yields its head
        for _ in 0..2 {
            let bytes = device.read_record().unwrap();
            assert_eq!(Record::from_slice(&bytes).unwrap(), first);
        }
    }

    #[test]
    fn short_file_yields_short_buffer() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&[1, 2, 3]).unwrap();
        file.flush().unwrap();

        let bytes = CharDevice::new(file.path()).read_record().unwrap();
        assert_eq!(bytes, vec![1, 2, 3]);
    }

    #[test]
    fn missing_device_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let device = CharDevice::new(dir.path().join("rdp_cdev"));
        let err = device.read_record().unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }
}
