use video_upscale_worker::config::{AiConfig, AiRunnerKind, Config, EncodingConfig, FetchConfig, ToolConfig};
use video_upscale_worker::policy::Policy;
use video_upscale_worker::storage::StorageSettings;
use video_upscale_worker::Controller;

use std::io::{self, IsTerminal, Read};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Debug, Parser)]
#[command(name = "video-upscale-worker", version, about = "Upscales one remote video per job and publishes the result")]
struct Cli {
    /// Job JSON; read from stdin when omitted
    #[arg(long)]
    job: Option<String>,

    #[arg(long, env = "WORK_ROOT")]
    work_root: Option<PathBuf>,
    #[arg(long, env = "FETCH_TIMEOUT_SECS", default_value_t = 600)]
    fetch_timeout_secs: u64,
    /// Kill any external tool running longer than this
    #[arg(long, env = "TOOL_TIMEOUT_SECS")]
    tool_timeout_secs: Option<u64>,

    #[arg(long, env = "FFMPEG_PATH", default_value = "ffmpeg")]
    ffmpeg_path: PathBuf,
    #[arg(long, env = "FFPROBE_PATH", default_value = "ffprobe")]
    ffprobe_path: PathBuf,
    #[arg(long, env = "VIDEO_ENCODER", default_value = "libx264")]
    encoder: String,
    #[arg(long, env = "VIDEO_CRF", default_value_t = 18, value_parser = clap::value_parser!(u8).range(0..=51))]
    crf: u8,

    #[arg(long, env = "AI_RUNNER", value_enum, default_value_t = AiRunnerKind::GpuBinary)]
    ai_runner: AiRunnerKind,
    #[arg(long, env = "AI_BINARY", default_value = "realesrgan-ncnn-vulkan")]
    ai_binary: PathBuf,
    #[arg(long, env = "AI_MODEL_NAME", default_value = "realesr-animevideov3")]
    ai_model_name: String,
    #[arg(long, env = "AI_MODEL_DIR")]
    ai_model_dir: Option<PathBuf>,
    #[arg(long, env = "AI_INTERPRETER", default_value = "python3")]
    ai_interpreter: PathBuf,
    #[arg(long, env = "AI_SCRIPT")]
    ai_script: Option<PathBuf>,
    #[arg(long, env = "AI_WEIGHTS")]
    ai_weights: Option<PathBuf>,
    #[arg(long, env = "AI_WORKERS", default_value_t = 4)]
    ai_workers: usize,
    /// Exact output height for the AI path; enables a corrective scale pass
    #[arg(long, env = "AI_TARGET_HEIGHT")]
    ai_target_height: Option<u32>,

    #[arg(long, env = "MIN_HEIGHT", default_value_t = 720)]
    min_height: u32,

    #[arg(long, env = "R2_ACCOUNT_ID", hide_env_values = true)]
    r2_account_id: Option<String>,
    #[arg(long, env = "R2_ACCESS_KEY_ID", hide_env_values = true)]
    r2_access_key_id: Option<String>,
    #[arg(long, env = "R2_SECRET_ACCESS_KEY", hide_env_values = true)]
    r2_secret_access_key: Option<String>,
    #[arg(long, env = "R2_BUCKET_NAME")]
    r2_bucket_name: Option<String>,
    #[arg(long, env = "R2_ENDPOINT")]
    r2_endpoint: Option<String>,
    #[arg(long, env = "R2_PUBLIC_BASE_URL")]
    r2_public_base_url: Option<String>,
    #[arg(long, env = "OUTPUT_KEY_PREFIX", default_value = "")]
    output_key_prefix: String,
    /// Refuse to upload outputs larger than this (capped at 5 GiB)
    #[arg(long, env = "R2_MAX_OBJECT_BYTES")]
    r2_max_object_bytes: Option<u64>,
}

impl Cli {
    fn config(&self) -> Config {
        let defaults = Config::default();
        Config {
            work_root: self.work_root.clone().unwrap_or(defaults.work_root),
            fetch: FetchConfig {
                timeout: Duration::from_secs(self.fetch_timeout_secs),
                ..FetchConfig::default()
            },
            tools: ToolConfig {
                ffmpeg: self.ffmpeg_path.clone(),
                ffprobe: self.ffprobe_path.clone(),
                timeout: self.tool_timeout_secs.map(Duration::from_secs),
            },
            encoding: EncodingConfig {
                encoder: self.encoder.clone(),
                crf: self.crf,
                ..EncodingConfig::default()
            },
            ai: AiConfig {
                runner: self.ai_runner,
                binary: self.ai_binary.clone(),
                model_name: self.ai_model_name.clone(),
                model_dir: self.ai_model_dir.clone(),
                interpreter: self.ai_interpreter.clone(),
                script: self.ai_script.clone(),
                weights: self.ai_weights.clone(),
                workers: self.ai_workers,
                target_height: self.ai_target_height,
            },
            policy: Policy { min_height: self.min_height, ..Policy::default() },
            storage: StorageSettings {
                account_id: self.r2_account_id.clone(),
                access_key_id: self.r2_access_key_id.clone(),
                secret_access_key: self.r2_secret_access_key.clone(),
                bucket: self.r2_bucket_name.clone(),
                endpoint: self.r2_endpoint.clone(),
                public_base_url: self.r2_public_base_url.clone(),
                key_prefix: self.output_key_prefix.clone(),
                max_object_bytes: self.r2_max_object_bytes,
            },
        }
    }

    fn read_job(&self) -> io::Result<String> {
        match &self.job {
            Some(job) => Ok(job.clone()),
            None => {
                let mut buffer = String::new();
                io::stdin().read_to_string(&mut buffer)?;
                Ok(buffer)
            }
        }
    }
}

fn init_tracing() {
    let ansi_enabled = std::env::var_os("NO_COLOR").is_none() && io::stderr().is_terminal();
    fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .with_writer(io::stderr)
        .with_ansi(ansi_enabled)
        .init();
}

fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    let controller = match Controller::from_config(&cli.config()) {
        Ok(controller) => controller,
        Err(error) => {
            tracing::error!(kind = %error.kind(), "{}", error);
            return ExitCode::from(2);
        }
    };

    let payload = match cli.read_job().map_err(|e| e.to_string()).and_then(|raw| {
        serde_json::from_str::<serde_json::Value>(&raw).map_err(|e| format!("job is not valid JSON: {}", e))
    }) {
        Ok(payload) => payload,
        Err(message) => {
            tracing::error!("{}", message);
            println!("{}", serde_json::json!({"status": "error", "error": message}));
            return ExitCode::from(1);
        }
    };

    let report = controller.handle_report(&payload);
    let response = report.result.to_response().to_value();
    println!("{}", response);

    if report.result.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(1)
    }
}
