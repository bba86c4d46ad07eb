use crate::error::{Error, Result};
use crate::frame::{self, Frame};
use crate::model::{ModelLoader, Upscaler};
use crate::process::Tool;
use super::Progress;

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use crossbeam_channel::{bounded, unbounded, Receiver, Sender};

/// Runs a super-resolution model over every frame of `frames_in`, writing one
/// frame with the same index into `frames_out`.
pub trait FrameRunner: Send + Sync {
    fn describe(&self) -> String;
    fn run(&self, frames_in: &Path, frames_out: &Path, scale: u32) -> Result<()>;
}

/// A GPU-accelerated executable in the style of `realesrgan-ncnn-vulkan`.
pub struct GpuBinary {
    pub tool: Tool,
    pub model_name: String,
    pub model_dir: Option<PathBuf>,
}

impl GpuBinary {
    pub fn arguments(&self, frames_in: &Path, frames_out: &Path, scale: u32) -> Vec<String> {
        let mut args = vec![
            "-i".into(), frames_in.display().to_string(),
            "-o".into(), frames_out.display().to_string(),
            "-n".into(), self.model_name.clone(),
            "-s".into(), scale.to_string(),
            "-f".into(), "png".into(),
        ];
        if let Some(model_dir) = &self.model_dir {
            args.extend(["-m".into(), model_dir.display().to_string()]);
        }
        args
    }
}

impl FrameRunner for GpuBinary {
    fn describe(&self) -> String {
        format!("{} ({})", self.tool.program().display(), self.model_name)
    }

    fn run(&self, frames_in: &Path, frames_out: &Path, scale: u32) -> Result<()> {
        self.tool.run(self.arguments(frames_in, frames_out, scale))?;
        Ok(())
    }
}

/// An inference script run through an interpreter, e.g. Real-ESRGAN's
/// `inference_realesrgan.py`.
pub struct Script {
    pub interpreter: Tool,
    pub script: PathBuf,
    pub model_name: String,
    pub weights: PathBuf,
}

impl Script {
    pub fn arguments(&self, frames_in: &Path, frames_out: &Path, scale: u32) -> Vec<String> {
        vec![
            self.script.display().to_string(),
            "-i".into(), frames_in.display().to_string(),
            "-o".into(), frames_out.display().to_string(),
            "-n".into(), self.model_name.clone(),
            "-s".into(), scale.to_string(),
            "--model_path".into(), self.weights.display().to_string(),
            "--suffix".into(), String::new(),
            "--ext".into(), "png".into(),
        ]
    }
}

impl FrameRunner for Script {
    fn describe(&self) -> String {
        format!("{} ({})", self.script.display(), self.model_name)
    }

    fn run(&self, frames_in: &Path, frames_out: &Path, scale: u32) -> Result<()> {
        self.interpreter.run(self.arguments(frames_in, frames_out, scale))?;
        Ok(())
    }
}

/// Calls a model linked into this process from a pool of worker threads.
pub struct InProcess {
    loader: Arc<dyn ModelLoader>,
    workers: usize,
}

impl InProcess {
    pub fn new(loader: Arc<dyn ModelLoader>, workers: usize) -> Self {
        Self { loader, workers: workers.max(1) }
    }

    fn process_frame(model: &dyn Upscaler, index: usize, path: &Path, frames_out: &Path, scale: u32) -> Result<usize> {
        let mut frame = Frame::load(index, path)?;
        let (width, height) = (frame.image.width(), frame.image.height());
        frame.image = model.upscale(frame.image)?;

        let expected = (width * scale, height * scale);
        let actual = (frame.image.width(), frame.image.height());
        if actual != expected {
            return Err(Error::Media(format!(
                "frame {} upscaled to {}x{}, expected {}x{}",
                index, actual.0, actual.1, expected.0, expected.1
            )));
        }
        frame.save(frames_out)?;
        Ok(index)
    }

    fn process_incoming_frames(
        model: Arc<dyn Upscaler>,
        receiver: Receiver<(usize, PathBuf)>,
        sender: Sender<Result<usize>>,
        frames_out: &Path,
        scale: u32,
        shutdown_flag: &AtomicBool,
    ) {
        for (index, path) in receiver.iter() {
            if shutdown_flag.load(Ordering::SeqCst) {
                break;
            }
            let result = Self::process_frame(model.as_ref(), index, &path, frames_out, scale);
            if result.is_err() {
                shutdown_flag.store(true, Ordering::SeqCst);
            }
            if sender.send(result).is_err() {
                break;
            }
        }
    }
}

impl FrameRunner for InProcess {
    fn describe(&self) -> String {
        format!("in-process {} x{} workers", self.loader.name(), self.workers)
    }

    fn run(&self, frames_in: &Path, frames_out: &Path, scale: u32) -> Result<()> {
        let model = self.loader.load(scale)?;
        let frames = frame::list_frames(frames_in)?;
        let mut progress = Progress::new(frames.len(), &self.loader.name());
        let shutdown_flag = AtomicBool::new(false);

        let (frame_sender, frame_receiver) = bounded::<(usize, PathBuf)>(self.workers * 2);
        let (result_sender, result_receiver) = unbounded::<Result<usize>>();

        let outcome = thread::scope(|scope| {
            for _ in 0..self.workers {
                let model = Arc::clone(&model);
                let receiver = frame_receiver.clone();
                let sender = result_sender.clone();
                let shutdown_flag = &shutdown_flag;
                scope.spawn(move || {
                    Self::process_incoming_frames(model, receiver, sender, frames_out, scale, shutdown_flag)
                });
            }
            drop(frame_receiver);
            drop(result_sender);

            let shutdown_flag = &shutdown_flag;
            scope.spawn(move || {
                for frame in frames {
                    if shutdown_flag.load(Ordering::SeqCst) || frame_sender.send(frame).is_err() {
                        break;
                    }
                }
            });

            let mut first_error = None;
            for result in result_receiver.iter() {
                match result {
                    Ok(_) => progress.advance(),
                    Err(e) => {
                        if first_error.is_none() {
                            first_error = Some(e);
                        }
                    }
                }
            }
            first_error.map_or(Ok(()), Err)
        });

        progress.finish();
        outcome
    }
}
