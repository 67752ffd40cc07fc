use std::path::{Path, PathBuf};

use crate::shared::constants::THUMBNAIL_SUFFIX;
use crate::shared::raw_frame::RawFrame;

/// Produces a still preview image for a finished clip.
pub trait ThumbnailExtractor: Send {
    /// Writes a thumbnail derived from `frame` next to `video_path` and
    /// returns where it went.
    fn extract(
        &self,
        frame: &RawFrame,
        video_path: &Path,
    ) -> Result<PathBuf, Box<dyn std::error::Error>>;
}

/// `clips/run.mp4` → `clips/run_thumb.jpg`.
pub fn thumbnail_path_for(video_path: &Path) -> PathBuf {
    let stem = video_path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("clip");
    video_path.with_file_name(format!("{stem}{THUMBNAIL_SUFFIX}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_thumbnail_is_sibling_of_video() {
        assert_eq!(
            thumbnail_path_for(Path::new("/tmp/clips/run.mp4")),
            PathBuf::from("/tmp/clips/run_thumb.jpg")
        );
    }

    #[test]
    fn test_thumbnail_without_extension() {
        assert_eq!(
            thumbnail_path_for(Path::new("out")),
            PathBuf::from("out_thumb.jpg")
        );
    }
}
