use crate::config::EncodingConfig;
use crate::error::{Error, Result};
use crate::frame::FRAME_PATTERN;
use crate::process::Tool;
use crate::workspace::Artifact;

use std::path::Path;

/// Reassembles enhanced frames into a video, taking audio from the source.
pub struct Merge<'a> {
    pub ffmpeg: &'a Tool,
    pub encoding: &'a EncodingConfig,
}

impl<'a> Merge<'a> {
    pub fn arguments(&self, frames_dir: &Path, frame_rate: f64, source: &Path, output: &Path) -> Vec<String> {
        let mut args = super::ffmpeg_preamble();
        args.extend([
            "-framerate".into(), frame_rate.to_string(),
            "-start_number".into(), "1".into(),
            "-i".into(), frames_dir.join(FRAME_PATTERN).display().to_string(),
            "-i".into(), source.display().to_string(),
            "-map".into(), "0:v:0".into(),
            "-map".into(), "1:a?".into(),
            "-r".into(), frame_rate.to_string(),
        ]);
        args.extend(super::encode_arguments(self.encoding, &self.encoding.quality_preset));
        args.push(output.display().to_string());
        args
    }

    pub fn execute(&self, frames_dir: &Path, frame_rate: f64, source: &Artifact, output: &Path) -> Result<Artifact> {
        if frame_rate <= 0.0 {
            return Err(Error::Media("source frame rate is unknown, cannot reassemble frames".to_string()));
        }
        tracing::info!(frame_rate, output = %output.display(), "reassembling frames");
        self.ffmpeg.run(self.arguments(frames_dir, frame_rate, &source.local_path, output))?;
        Artifact::from_path(output)
    }

    /// Rescales an assembled video to an exact size in one extra pass.
    pub fn correct(&self, input: &Artifact, output: &Path, width: u32, height: u32) -> Result<Artifact> {
        tracing::info!(width, height, "applying corrective scale pass");
        let args = super::scale_arguments(
            self.encoding,
            &self.encoding.quality_preset,
            &input.local_path,
            output,
            width,
            height,
        );
        self.ffmpeg.run(args)?;
        Artifact::from_path(output)
    }
}
