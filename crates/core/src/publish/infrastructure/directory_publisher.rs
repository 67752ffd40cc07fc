use std::fs;
use std::path::{Path, PathBuf};

use crate::publish::domain::clip_publisher::{ClipPublisher, PublishError, PublishedClip};
use crate::shared::constants::CONTAINER_MIME;

const PENDING_PREFIX: &str = ".pending-";
const MAX_NAME_ATTEMPTS: u32 = 1000;

/// Publishes clips into a plain directory acting as the library.
///
/// The clip is copied under a hidden pending name and renamed to its display
/// name only once the copy is complete. A failed copy leaves the pending
/// entry behind for the caller to inspect or clean up. Existing entries are
/// never overwritten; `name.mp4` becomes `name (1).mp4` and so on.
pub struct DirectoryPublisher {
    library_dir: PathBuf,
}

impl DirectoryPublisher {
    pub fn new(library_dir: impl Into<PathBuf>) -> Self {
        Self {
            library_dir: library_dir.into(),
        }
    }

    pub fn library_dir(&self) -> &Path {
        &self.library_dir
    }

    fn io_error(path: &Path, source: std::io::Error) -> PublishError {
        PublishError::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    fn free_destination(&self, file_name: &str) -> Result<PathBuf, PublishError> {
        let candidate = self.library_dir.join(file_name);
        if !candidate.exists() {
            return Ok(candidate);
        }
        let (stem, extension) = split_extension(file_name);
        for n in 1..MAX_NAME_ATTEMPTS {
            let candidate = self.library_dir.join(format!("{stem} ({n}){extension}"));
            if !candidate.exists() {
                return Ok(candidate);
            }
        }
        Err(PublishError::NameTaken(file_name.to_string()))
    }
}

impl ClipPublisher for DirectoryPublisher {
    fn publish(&self, clip: &Path, display_name: &str) -> Result<PublishedClip, PublishError> {
        if !clip.is_file() {
            return Err(PublishError::SourceMissing(clip.to_path_buf()));
        }
        let file_name = library_file_name(display_name, clip)?;

        fs::create_dir_all(&self.library_dir).map_err(|e| Self::io_error(&self.library_dir, e))?;
        let destination = self.free_destination(&file_name)?;
        let pending = self
            .library_dir
            .join(format!("{PENDING_PREFIX}{file_name}"));

        let size_bytes = fs::copy(clip, &pending).map_err(|e| Self::io_error(&pending, e))?;
        fs::rename(&pending, &destination).map_err(|e| Self::io_error(&destination, e))?;

        log::info!(
            "Published {} as {} ({size_bytes} bytes)",
            clip.display(),
            destination.display()
        );
        Ok(PublishedClip {
            path: destination,
            mime: CONTAINER_MIME,
            size_bytes,
        })
    }
}

/// Display name as a file name, with the clip's extension when it has none.
fn library_file_name(display_name: &str, clip: &Path) -> Result<String, PublishError> {
    let name = display_name.trim();
    if name.is_empty()
        || name == "."
        || name == ".."
        || name.starts_with('.')
        || name.contains(|c: char| c == '/' || c == '\\')
    {
        return Err(PublishError::InvalidName(display_name.to_string()));
    }
    if Path::new(name).extension().is_some() {
        return Ok(name.to_string());
    }
    let extension = clip
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("mp4");
    Ok(format!("{name}.{extension}"))
}

fn split_extension(file_name: &str) -> (&str, &str) {
    match file_name.rfind('.') {
        Some(dot) if dot > 0 => file_name.split_at(dot),
        _ => (file_name, ""),
    }
}
