use crate::policy::Policy;
use crate::storage::StorageSettings;

use std::path::PathBuf;
use std::time::Duration;

#[derive(Clone, Debug)]
pub struct Config {
    pub work_root: PathBuf,
    pub fetch: FetchConfig,
    pub tools: ToolConfig,
    pub encoding: EncodingConfig,
    pub ai: AiConfig,
    pub policy: Policy,
    pub storage: StorageSettings,
}

#[derive(Clone, Debug)]
pub struct FetchConfig {
    pub timeout: Duration,
    pub user_agent: String,
}

#[derive(Clone, Debug)]
pub struct ToolConfig {
    pub ffmpeg: PathBuf,
    pub ffprobe: PathBuf,
    pub timeout: Option<Duration>,
}

#[derive(Clone, Debug)]
pub struct EncodingConfig {
    pub encoder: String,
    pub crf: u8,
    pub pixel_format: String,
    /// Preset for the single filter-scale pass.
    pub fast_preset: String,
    /// Preset for frame reassembly and the corrective pass.
    pub quality_preset: String,
}

/// How the super-resolution model is invoked on a frame directory.
#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum AiRunnerKind {
    GpuBinary,
    Script,
    InProcess,
}

#[derive(Clone, Debug)]
pub struct AiConfig {
    pub runner: AiRunnerKind,
    pub binary: PathBuf,
    pub model_name: String,
    pub model_dir: Option<PathBuf>,
    pub interpreter: PathBuf,
    pub script: Option<PathBuf>,
    pub weights: Option<PathBuf>,
    pub workers: usize,
    /// Height of the optional corrective pass applied after reassembly.
    pub target_height: Option<u32>,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(600),
            user_agent: concat!("video-upscale-worker/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            ffmpeg: PathBuf::from("ffmpeg"),
            ffprobe: PathBuf::from("ffprobe"),
            timeout: None,
        }
    }
}

impl Default for EncodingConfig {
    fn default() -> Self {
        Self {
            encoder: String::from("libx264"),
            crf: 18,
            pixel_format: String::from("yuv420p"),
            fast_preset: String::from("medium"),
            quality_preset: String::from("slow"),
        }
    }
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            runner: AiRunnerKind::GpuBinary,
            binary: PathBuf::from("realesrgan-ncnn-vulkan"),
            model_name: String::from("realesr-animevideov3"),
            model_dir: None,
            interpreter: PathBuf::from("python3"),
            script: None,
            weights: None,
            workers: 4,
            target_height: None,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            work_root: std::env::temp_dir().join("video-upscale-worker"),
            fetch: FetchConfig::default(),
            tools: ToolConfig::default(),
            encoding: EncodingConfig::default(),
            ai: AiConfig::default(),
            policy: Policy::default(),
            storage: StorageSettings::default(),
        }
    }
}
