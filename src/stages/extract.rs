use crate::error::{Error, Result};
use crate::frame::{self, FRAME_PATTERN};
use crate::process::Tool;
use crate::workspace::Artifact;

use std::path::Path;

/// Decomposes a video into lossless, sequentially numbered PNG frames.
pub struct Extract;

impl Extract {
    pub fn arguments(input: &Path, frames_dir: &Path) -> Vec<String> {
        let mut args = super::ffmpeg_preamble();
        args.extend([
            "-i".into(), input.display().to_string(),
            "-map".into(), "0:v:0".into(),
            "-fps_mode".into(), "passthrough".into(),
            "-pix_fmt".into(), "rgb24".into(),
            "-vcodec".into(), "png".into(),
            "-start_number".into(), "1".into(),
            frames_dir.join(FRAME_PATTERN).display().to_string(),
        ]);
        args
    }

    pub fn execute(ffmpeg: &Tool, input: &Artifact, frames_dir: &Path) -> Result<usize> {
        tracing::info!(input = %input.local_path.display(), "extracting frames");
        ffmpeg.run(Self::arguments(&input.local_path, frames_dir))?;

        let count = frame::list_frames(frames_dir)?.len();
        if count == 0 {
            return Err(Error::Media("no frames could be extracted".to_string()));
        }
        tracing::info!(frames = count, "frames extracted");
        Ok(count)
    }
}
