use std::path::{Path, PathBuf};

use image::imageops::FilterType;
use image::{GrayImage, ImageFormat};

use crate::shared::raw_frame::RawFrame;
use crate::video::domain::thumbnail_extractor::{thumbnail_path_for, ThumbnailExtractor};

/// Writes the luma plane of a frame as a greyscale JPEG next to the clip.
///
/// With `max_side` set, the image is downscaled (aspect preserved) so its
/// longer side fits.
pub struct JpegThumbnailExtractor {
    max_side: Option<u32>,
}

impl JpegThumbnailExtractor {
    pub fn new() -> Self {
        Self { max_side: None }
    }

    pub fn with_max_side(max_side: u32) -> Self {
        Self {
            max_side: Some(max_side.max(1)),
        }
    }

    fn target_size(&self, width: u32, height: u32) -> Option<(u32, u32)> {
        let max_side = self.max_side?;
        let longest = width.max(height);
        if longest <= max_side {
            return None;
        }
        let scale = |side: u32| ((side as u64 * max_side as u64) / longest as u64).max(1) as u32;
        Some((scale(width), scale(height)))
    }
}

impl Default for JpegThumbnailExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl ThumbnailExtractor for JpegThumbnailExtractor {
    fn extract(
        &self,
        frame: &RawFrame,
        video_path: &Path,
    ) -> Result<PathBuf, Box<dyn std::error::Error>> {
        let path = thumbnail_path_for(video_path);
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let img = GrayImage::from_raw(frame.width(), frame.height(), frame.luma().to_vec())
            .ok_or("failed to create image from luma plane")?;

        let img = match self.target_size(frame.width(), frame.height()) {
            Some((w, h)) => image::imageops::resize(&img, w, h, FilterType::Triangle),
            None => img,
        };

        img.save_with_format(&path, ImageFormat::Jpeg)?;
        log::debug!("Thumbnail written to {}", path.display());
        Ok(path)
    }
}
