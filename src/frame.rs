use crate::error::{Error, Result};

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use image::{DynamicImage, ImageFormat};

pub const FRAME_PREFIX: &str = "frame_";
pub const FRAME_EXTENSION: &str = "png";
/// ffmpeg pattern matching [`Frame::file_name`].
pub const FRAME_PATTERN: &str = "frame_%08d.png";

pub struct Frame {
    pub index: usize,
    pub image: DynamicImage,
}

impl Frame {
    pub fn new(index: usize, image: DynamicImage) -> Self {
        Self { index, image }
    }

    pub fn file_name(index: usize) -> String {
        format!("{}{:08}.{}", FRAME_PREFIX, index, FRAME_EXTENSION)
    }

    pub fn parse_index(path: &Path) -> Option<usize> {
        let name = path.file_name()?.to_str()?;
        let digits = name
            .strip_prefix(FRAME_PREFIX)?
            .strip_suffix(FRAME_EXTENSION)?
            .strip_suffix('.')?;
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        digits.parse().ok()
    }

    pub fn load(index: usize, path: &Path) -> Result<Self> {
        let image = image::open(path)?;
        Ok(Self::new(index, image))
    }

    pub fn save(&self, directory: &Path) -> Result<PathBuf> {
        let path = directory.join(Self::file_name(self.index));
        self.image.save_with_format(&path, ImageFormat::Png)?;
        Ok(path)
    }
}

/// Frames in `directory`, ordered by index. Files not following the frame
/// naming scheme are ignored.
pub fn list_frames(directory: &Path) -> Result<Vec<(usize, PathBuf)>> {
    let mut frames = Vec::new();
    for entry in fs::read_dir(directory)? {
        let path = entry?.path();
        if let Some(index) = Frame::parse_index(&path) {
            frames.push((index, path));
        }
    }
    frames.sort_by_key(|(index, _)| *index);
    Ok(frames)
}

/// Checks that `output` holds exactly one enhanced frame per input index.
pub fn verify_frame_sets(input: &Path, output: &Path) -> Result<usize> {
    let inputs: BTreeSet<usize> = list_frames(input)?.into_iter().map(|(index, _)| index).collect();
    let outputs: BTreeSet<usize> = list_frames(output)?.into_iter().map(|(index, _)| index).collect();

    if inputs.is_empty() {
        return Err(Error::Media("no frames were extracted".to_string()));
    }
    if inputs.len() != outputs.len() {
        return Err(Error::Media(format!(
            "frame count mismatch: {} extracted, {} upscaled",
            inputs.len(),
            outputs.len()
        )));
    }
    if let Some(missing) = inputs.difference(&outputs).next() {
        return Err(Error::Media(format!("upscaled frame {} is missing", missing)));
    }
    Ok(inputs.len())
}

/// Checks that every frame in `directory` is exactly `width`x`height`.
/// Only PNG headers are read.
pub fn verify_frame_dimensions(directory: &Path, width: u32, height: u32) -> Result<()> {
    for (index, path) in list_frames(directory)? {
        let (actual_width, actual_height) = image::image_dimensions(&path)?;
        if (actual_width, actual_height) != (width, height) {
            return Err(Error::Media(format!(
                "upscaled frame {} is {}x{}, expected {}x{}",
                index, actual_width, actual_height, width, height
            )));
        }
    }
    Ok(())
}
