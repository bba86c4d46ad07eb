use crate::config::EncodingConfig;
use crate::error::{Error, Result};
use crate::frame;
use crate::policy::ScaleDecision;
use crate::process::Tool;
use crate::stages::{self, Extract, FrameRunner, Merge};
use crate::video::VideoMetadata;
use crate::workspace::{Artifact, Workspace};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UpscaledVideo {
    pub artifact: Artifact,
    pub width: u32,
    pub height: u32,
}

/// Transforms an input video into a larger one inside the job's workspace.
/// The input artifact is never written to.
pub trait UpscaleBackend: Send + Sync {
    fn name(&self) -> String;
    fn upscale(
        &self,
        input: &Artifact,
        metadata: &VideoMetadata,
        decision: &ScaleDecision,
        workspace: &Workspace,
    ) -> Result<UpscaledVideo>;
}

pub fn output_file_name(stem: &str, width: u32, height: u32) -> String {
    format!("{}_upscaled_{}x{}.mp4", stem, width, height)
}

/// Size for an exact target height, keeping the aspect ratio and an even width.
pub fn dimensions_for_height(width: u32, height: u32, target_height: u32) -> (u32, u32) {
    let scaled = (width as f64 * target_height as f64 / height as f64).round() as u32;
    let even = (scaled + 1) / 2 * 2;
    (even.max(2), target_height)
}

/// One ffmpeg pass with a Lanczos resampling filter.
pub struct FilterScale {
    pub ffmpeg: Tool,
    pub encoding: EncodingConfig,
}

impl UpscaleBackend for FilterScale {
    fn name(&self) -> String {
        "filter".to_string()
    }

    fn upscale(
        &self,
        input: &Artifact,
        metadata: &VideoMetadata,
        decision: &ScaleDecision,
        workspace: &Workspace,
    ) -> Result<UpscaledVideo> {
        let (width, height) = decision.output_dimensions(metadata);
        let output = workspace.output.join(output_file_name(&input.file_stem(), width, height));

        tracing::info!(width, height, "scaling with lanczos filter");
        let args = stages::scale_arguments(
            &self.encoding,
            &self.encoding.fast_preset,
            &input.local_path,
            &output,
            width,
            height,
        );
        self.ffmpeg.run(args)?;

        Ok(UpscaledVideo { artifact: Artifact::from_path(output)?, width, height })
    }
}

/// Frame-by-frame AI upscaling: extract, infer, reassemble and optionally
/// correct to an exact height.
pub struct FramePipeline {
    pub ffmpeg: Tool,
    pub encoding: EncodingConfig,
    pub runner: Box<dyn FrameRunner>,
    pub target_height: Option<u32>,
}

impl UpscaleBackend for FramePipeline {
    fn name(&self) -> String {
        format!("ai: {}", self.runner.describe())
    }

    fn upscale(
        &self,
        input: &Artifact,
        metadata: &VideoMetadata,
        decision: &ScaleDecision,
        workspace: &Workspace,
    ) -> Result<UpscaledVideo> {
        if metadata.fps <= 0.0 {
            return Err(Error::Media("source frame rate is unknown, cannot rebuild the video".to_string()));
        }

        Extract::execute(&self.ffmpeg, input, &workspace.frames_in)?;

        tracing::info!(runner = %self.runner.describe(), scale = decision.scale_factor, "upscaling frames");
        self.runner.run(&workspace.frames_in, &workspace.frames_out, decision.scale_factor)?;
        let frames = frame::verify_frame_sets(&workspace.frames_in, &workspace.frames_out)?;
        let (width, height) = decision.output_dimensions(metadata);
        frame::verify_frame_dimensions(&workspace.frames_out, width, height)?;
        tracing::info!(frames, width, height, "frames upscaled");

        let merge = Merge { ffmpeg: &self.ffmpeg, encoding: &self.encoding };
        let stem = input.file_stem();

        match self.target_height {
            Some(target_height) if target_height != height => {
                let assembled = merge.execute(
                    &workspace.frames_out,
                    metadata.fps,
                    input,
                    &workspace.output.join(format!("{}_assembled.mp4", stem)),
                )?;
                let (width, height) = dimensions_for_height(width, height, target_height);
                let output = workspace.output.join(output_file_name(&stem, width, height));
                let artifact = merge.correct(&assembled, &output, width, height)?;
                Ok(UpscaledVideo { artifact, width, height })
            }
            _ => {
                let output = workspace.output.join(output_file_name(&stem, width, height));
                let artifact = merge.execute(&workspace.frames_out, metadata.fps, input, &output)?;
                Ok(UpscaledVideo { artifact, width, height })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::{JobId, UpscaleMethod};
    use crate::workspace::WorkspaceManager;

    #[test]
    fn names_carry_dimensions() {
        assert_eq!(output_file_name("in", 2560, 1440), "in_upscaled_2560x1440.mp4");
    }

    #[test]
    fn corrective_dimensions_keep_aspect_and_parity() {
        assert_eq!(dimensions_for_height(2560, 1440, 2160), (3840, 2160));
        assert_eq!(dimensions_for_height(3840, 2160, 2160), (3840, 2160));
        assert_eq!(dimensions_for_height(2000, 1500, 2160), (2880, 2160));
        let (width, _) = dimensions_for_height(1442, 1080, 2160);
        assert_eq!(width % 2, 0);
    }

    fn metadata(fps: f64) -> VideoMetadata {
        VideoMetadata {
            width: 8,
            height: 6,
            fps,
            duration_seconds: 0.125,
            codec: "h264".into(),
            pixel_format: "yuv420p".into(),
        }
    }

    fn doubled(method: UpscaleMethod) -> ScaleDecision {
        ScaleDecision { scale_factor: 2, method }
    }

    #[cfg(unix)]
    mod orchestration {
        use super::*;
        use crate::frame::Frame;
        use crate::stages::FrameRunner;

        use std::fs;
        use std::os::unix::fs::PermissionsExt;
        use std::path::{Path, PathBuf};

        use image::imageops::FilterType;
        use image::{DynamicImage, ImageFormat};

        /// Resizes every frame by a fixed factor, whatever scale it is asked for.
        struct FixedFactor(u32);

        impl FrameRunner for FixedFactor {
            fn describe(&self) -> String {
                format!("fixed x{}", self.0)
            }

            fn run(&self, frames_in: &Path, frames_out: &Path, _scale: u32) -> Result<()> {
                for (index, path) in frame::list_frames(frames_in)? {
                    let mut frame = Frame::load(index, &path)?;
                    let (width, height) = (frame.image.width() * self.0, frame.image.height() * self.0);
                    frame.image = frame.image.resize_exact(width, height, FilterType::Nearest);
                    frame.save(frames_out)?;
                }
                Ok(())
            }
        }

        /// A job workspace plus an `ffmpeg` stand-in that logs its arguments,
        /// writes three 8x6 frames when asked to extract and an empty file
        /// for any other output.
        struct Scratch {
            root: PathBuf,
            log: PathBuf,
            ffmpeg: Tool,
            workspace: Workspace,
            input: Artifact,
        }

        impl Scratch {
            fn new() -> Self {
                let root = std::env::temp_dir().join(format!("backend-test-{}", uuid::Uuid::new_v4()));
                fs::create_dir_all(&root).unwrap();

                let template = root.join("template.png");
                DynamicImage::new_rgb8(8, 6).save_with_format(&template, ImageFormat::Png).unwrap();
                let log = root.join("ffmpeg.log");
                let script = root.join("ffmpeg");
                fs::write(
                    &script,
                    format!(
                        r#"#!/bin/sh
echo "$*" >> '{log}'
for last; do :; done
case "$last" in
  *%08d.png) dir=$(dirname "$last"); for i in 1 2 3; do cp '{template}' "$dir/frame_0000000$i.png"; done ;;
  *) printf video > "$last" ;;
esac
"#,
                        log = log.display(),
                        template = template.display(),
                    ),
                )
                .unwrap();
                fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).unwrap();

                let workspace = WorkspaceManager::new(root.join("work"))
                    .acquire(&JobId::parse("backend").unwrap())
                    .unwrap();
                fs::write(workspace.path("in.mp4"), b"source").unwrap();
                let input = Artifact::from_path(workspace.path("in.mp4")).unwrap();

                Self { ffmpeg: Tool::new(&script), root, log, workspace, input }
            }

            fn pipeline(&self, runner: FixedFactor, target_height: Option<u32>) -> FramePipeline {
                FramePipeline {
                    ffmpeg: self.ffmpeg.clone(),
                    encoding: EncodingConfig::default(),
                    runner: Box::new(runner),
                    target_height,
                }
            }

            fn invocations(&self) -> Vec<String> {
                fs::read_to_string(&self.log)
                    .map(|log| log.lines().map(String::from).collect())
                    .unwrap_or_default()
            }
        }

        impl Drop for Scratch {
            fn drop(&mut self) {
                let _ = fs::remove_dir_all(&self.root);
            }
        }

        #[test]
        fn frames_are_extracted_upscaled_and_reassembled() {
            let scratch = Scratch::new();
            let upscaled = scratch
                .pipeline(FixedFactor(2), None)
                .upscale(&scratch.input, &metadata(24.0), &doubled(UpscaleMethod::Ai), &scratch.workspace)
                .unwrap();

            assert_eq!((upscaled.width, upscaled.height), (16, 12));
            assert_eq!(upscaled.artifact.file_name(), "in_upscaled_16x12.mp4");
            assert!(upscaled.artifact.local_path.starts_with(&scratch.workspace.output));
            assert_eq!(frame::verify_frame_sets(&scratch.workspace.frames_in, &scratch.workspace.frames_out).unwrap(), 3);

            let calls = scratch.invocations();
            assert_eq!(calls.len(), 2, "{calls:?}");
            assert!(calls[0].ends_with("frame_%08d.png"));
            assert!(calls[1].contains("-framerate 24"));
            assert!(calls[1].ends_with("in_upscaled_16x12.mp4"));
        }

        #[test]
        fn frames_that_ignore_the_scale_are_rejected() {
            let scratch = Scratch::new();
            let error = scratch
                .pipeline(FixedFactor(1), None)
                .upscale(&scratch.input, &metadata(24.0), &doubled(UpscaleMethod::Ai), &scratch.workspace)
                .unwrap_err();

            assert_eq!(error.kind(), crate::error::ErrorKind::Media);
            assert!(error.to_string().contains("expected 16x12"), "{error}");
            assert_eq!(scratch.invocations().len(), 1);
        }

        #[test]
        fn target_height_adds_a_corrective_pass() {
            let scratch = Scratch::new();
            let upscaled = scratch
                .pipeline(FixedFactor(2), Some(24))
                .upscale(&scratch.input, &metadata(24.0), &doubled(UpscaleMethod::Ai), &scratch.workspace)
                .unwrap();

            assert_eq!((upscaled.width, upscaled.height), (32, 24));
            assert_eq!(upscaled.artifact.file_name(), "in_upscaled_32x24.mp4");
            let calls = scratch.invocations();
            assert_eq!(calls.len(), 3, "{calls:?}");
            assert!(calls[1].ends_with("in_assembled.mp4"));
            assert!(calls[2].contains("scale=32:24:flags=lanczos"));
        }

        #[test]
        fn matching_target_height_skips_the_corrective_pass() {
            let scratch = Scratch::new();
            let upscaled = scratch
                .pipeline(FixedFactor(2), Some(12))
                .upscale(&scratch.input, &metadata(24.0), &doubled(UpscaleMethod::Ai), &scratch.workspace)
                .unwrap();

            assert_eq!(upscaled.artifact.file_name(), "in_upscaled_16x12.mp4");
            assert_eq!(scratch.invocations().len(), 2);
        }

        #[test]
        fn unknown_frame_rate_fails_before_extraction() {
            let scratch = Scratch::new();
            let error = scratch
                .pipeline(FixedFactor(2), None)
                .upscale(&scratch.input, &metadata(0.0), &doubled(UpscaleMethod::Ai), &scratch.workspace)
                .unwrap_err();

            assert_eq!(error.kind(), crate::error::ErrorKind::Media);
            assert!(scratch.invocations().is_empty());
        }

        #[test]
        fn filter_scale_is_a_single_lanczos_pass() {
            let scratch = Scratch::new();
            let backend = FilterScale { ffmpeg: scratch.ffmpeg.clone(), encoding: EncodingConfig::default() };
            let upscaled = backend
                .upscale(&scratch.input, &metadata(24.0), &doubled(UpscaleMethod::Filter), &scratch.workspace)
                .unwrap();

            assert_eq!((upscaled.width, upscaled.height), (16, 12));
            assert_eq!(upscaled.artifact.file_name(), "in_upscaled_16x12.mp4");
            let calls = scratch.invocations();
            assert_eq!(calls.len(), 1);
            assert!(calls[0].contains("scale=16:12:flags=lanczos"));
            assert!(calls[0].contains("-preset medium"));
            assert!(fs::read_dir(&scratch.workspace.frames_in).unwrap().next().is_none());
        }
    }
}
