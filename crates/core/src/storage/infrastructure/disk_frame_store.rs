use std::fs;
use std::io::{BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};

use crate::shared::constants::{FRAME_FILE_EXTENSION, FRAME_FILE_PREFIX};
use crate::shared::raw_frame::RawFrame;
use crate::storage::domain::frame_record::{decode_record, encode_header};
use crate::storage::domain::frame_store::{FrameStore, StoreError};

/// Stores one file per frame under a private scratch directory.
///
/// Layout: `<dir>/frame_<index>.yuv` holding an 8-byte header followed by the
/// raw pixels. The directory is created lazily on the first write.
pub struct DiskFrameStore {
    dir: PathBuf,
}

impl DiskFrameStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn record_path(&self, index: u64) -> PathBuf {
        self.dir
            .join(format!("{FRAME_FILE_PREFIX}{index}.{FRAME_FILE_EXTENSION}"))
    }

    fn io_error(path: &Path, source: std::io::Error) -> StoreError {
        StoreError::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    fn write_record(path: &Path, frame: &RawFrame) -> std::io::Result<()> {
        let file = fs::File::create(path)?;
        let mut writer = BufWriter::new(file);
        writer.write_all(&encode_header(frame.width(), frame.height()))?;
        writer.write_all(frame.data())?;
        writer.flush()?;
        Ok(())
    }
}

impl FrameStore for DiskFrameStore {
    fn persist(&mut self, index: u64, frame: &RawFrame) -> Result<(), StoreError> {
        if !frame.is_well_sized() {
            return Err(StoreError::SizeMismatch {
                index,
                expected: frame.expected_len(),
                actual: frame.data().len(),
            });
        }

        fs::create_dir_all(&self.dir).map_err(|e| Self::io_error(&self.dir, e))?;

        // Write to a temp file first, then rename so a failed write never
        // leaves a readable partial record behind.
        let path = self.record_path(index);
        let temp_path = path.with_extension("part");
        if let Err(e) = Self::write_record(&temp_path, frame) {
            let _ = fs::remove_file(&temp_path);
            return Err(Self::io_error(&temp_path, e));
        }
        fs::rename(&temp_path, &path).map_err(|e| {
            let _ = fs::remove_file(&temp_path);
            Self::io_error(&path, e)
        })?;

        log::debug!("Stored frame #{index} ({} bytes)", frame.data().len());
        Ok(())
    }

    fn exists(&self, index: u64) -> bool {
        self.record_path(index).is_file()
    }

    fn read(&self, index: u64) -> Result<RawFrame, StoreError> {
        let path = self.record_path(index);
        let bytes = fs::read(&path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => StoreError::NotFound(index),
            _ => Self::io_error(&path, e),
        })?;

        let (width, height, pixels) = decode_record(&bytes).ok_or(StoreError::CorruptHeader {
            index,
            len: bytes.len(),
        })?;
        Ok(RawFrame::new(pixels.to_vec(), width, height))
    }

    fn delete(&mut self, index: u64) -> bool {
        fs::remove_file(self.record_path(index)).is_ok()
    }

    fn purge_all(&mut self) {
        match fs::remove_dir_all(&self.dir) {
            Ok(()) => log::debug!("Purged scratch frames at {}", self.dir.display()),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => log::warn!(
                "Failed to purge scratch frames at {}: {e}",
                self.dir.display()
            ),
        }
    }
}
