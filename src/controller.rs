use crate::backend::{FilterScale, FramePipeline, UpscaleBackend};
use crate::config::{AiRunnerKind, Config};
use crate::error::{Error, ErrorKind, Result};
use crate::fetch::{Fetch, HttpFetcher};
use crate::job::{self, JobId, JobRequest, JobResponse, JobResult, PublishedOutput, UpscaleMethod};
use crate::model::Model;
use crate::policy::{Policy, ScaleDecision};
use crate::process::Tool;
use crate::stages::{FrameRunner, GpuBinary, InProcess, Script};
use crate::storage::Publisher;
use crate::video::{Ffprobe, MediaProbe, VideoMetadata};
use crate::workspace::{Artifact, Workspace, WorkspaceManager};

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use serde_json::Value;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    Idle,
    Fetching,
    Probing,
    Deciding,
    Upscaling,
    Publishing,
    Done,
    Failed(ErrorKind),
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Failed(kind) => write!(f, "failed({})", kind),
            other => write!(f, "{}", format!("{:?}", other).to_lowercase()),
        }
    }
}

#[derive(Clone, Debug)]
pub struct JobReport {
    pub job_id: JobId,
    pub result: JobResult,
    /// Every state the job entered, in order.
    pub stages: Vec<Stage>,
}

/// The closed set of strategies a [`ScaleDecision`] can select.
pub struct Backends {
    pub filter: Box<dyn UpscaleBackend>,
    pub ai: Box<dyn UpscaleBackend>,
}

impl Backends {
    fn select(&self, method: UpscaleMethod) -> &dyn UpscaleBackend {
        match method {
            UpscaleMethod::Filter => self.filter.as_ref(),
            UpscaleMethod::Ai => self.ai.as_ref(),
        }
    }
}

struct Execution<'a> {
    job_id: &'a JobId,
    stages: Vec<Stage>,
}

impl<'a> Execution<'a> {
    fn enter(&mut self, stage: Stage) {
        tracing::info!(job_id = %self.job_id, %stage, "stage");
        self.stages.push(stage);
    }

    fn fail(&mut self, error: &Error) {
        let stage = self.stages.last().copied().unwrap_or(Stage::Idle);
        tracing::error!(job_id = %self.job_id, %stage, kind = %error.kind(), error = %error, "job failed");
        self.stages.push(Stage::Failed(error.kind()));
    }
}

/// Sequences one job through every stage and owns the only broad failure
/// boundary of the pipeline.
pub struct Controller {
    workspaces: WorkspaceManager,
    fetcher: Box<dyn Fetch>,
    prober: Box<dyn MediaProbe>,
    policy: Policy,
    backends: Backends,
    publisher: Publisher,
}

impl Controller {
    pub fn new(
        workspaces: WorkspaceManager,
        fetcher: Box<dyn Fetch>,
        prober: Box<dyn MediaProbe>,
        policy: Policy,
        backends: Backends,
        publisher: Publisher,
    ) -> Self {
        Self { workspaces, fetcher, prober, policy, backends, publisher }
    }

    /// Wires the production collaborators. Storage and model configuration
    /// are checked here, before any job runs.
    pub fn from_config(config: &Config) -> Result<Self> {
        let publisher = Publisher::from_settings(&config.storage)?;
        let ffmpeg = Tool::new(&config.tools.ffmpeg).with_timeout(config.tools.timeout);
        let ffprobe = Tool::new(&config.tools.ffprobe).with_timeout(config.tools.timeout);

        let backends = Backends {
            filter: Box::new(FilterScale { ffmpeg: ffmpeg.clone(), encoding: config.encoding.clone() }),
            ai: Box::new(FramePipeline {
                ffmpeg,
                encoding: config.encoding.clone(),
                runner: Self::frame_runner(config)?,
                target_height: config.ai.target_height,
            }),
        };

        Ok(Self::new(
            WorkspaceManager::new(&config.work_root),
            Box::new(HttpFetcher::new(&config.fetch)?),
            Box::new(Ffprobe::new(ffprobe)),
            config.policy,
            backends,
            publisher,
        ))
    }

    fn frame_runner(config: &Config) -> Result<Box<dyn FrameRunner>> {
        let ai = &config.ai;
        let runner: Box<dyn FrameRunner> = match ai.runner {
            AiRunnerKind::GpuBinary => Box::new(GpuBinary {
                tool: Tool::new(&ai.binary).with_timeout(config.tools.timeout),
                model_name: ai.model_name.clone(),
                model_dir: ai.model_dir.clone(),
            }),
            AiRunnerKind::Script => {
                let script = ai.script.clone()
                    .ok_or_else(|| Error::EnvironmentConfig("AI_SCRIPT".to_string()))?;
                let weights = ai.weights.clone()
                    .ok_or_else(|| Error::EnvironmentConfig("AI_WEIGHTS".to_string()))?;
                Box::new(Script {
                    interpreter: Tool::new(&ai.interpreter).with_timeout(config.tools.timeout),
                    script,
                    model_name: ai.model_name.clone(),
                    weights,
                })
            }
            AiRunnerKind::InProcess => {
                let model = Model::RealCugan;
                if !model.is_available() {
                    return Err(Error::EnvironmentConfig(format!(
                        "AI_RUNNER=in-process needs {} support compiled in",
                        model
                    )));
                }
                Box::new(InProcess::new(Arc::new(model), ai.workers))
            }
        };
        Ok(runner)
    }

    /// Entry point for a raw job payload from the hosting runtime.
    pub fn handle(&self, payload: &Value) -> JobResponse {
        self.handle_report(payload).result.to_response()
    }

    pub fn handle_report(&self, payload: &Value) -> JobReport {
        let parsed = job::unwrap_envelope(payload).and_then(|(id, input)| {
            let request = JobRequest::from_value(input)?;
            Ok((id.unwrap_or_else(JobId::generate), request))
        });

        match parsed {
            Ok((job_id, request)) => self.run(&job_id, &request),
            Err(error) => {
                tracing::warn!(error = %error, "rejected job payload");
                JobReport {
                    job_id: JobId::generate(),
                    result: JobResult::failure(&error),
                    stages: vec![Stage::Idle, Stage::Failed(error.kind())],
                }
            }
        }
    }

    /// Runs one job to completion. The workspace is gone when this returns,
    /// whatever the outcome.
    pub fn run(&self, job_id: &JobId, request: &JobRequest) -> JobReport {
        let mut execution = Execution { job_id, stages: Vec::new() };
        execution.enter(Stage::Idle);
        tracing::info!(%job_id, url = %request.source_url, method = %request.method, "job accepted");

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.execute(&mut execution, request)))
            .unwrap_or_else(|payload| {
                let message = payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "stage panicked".to_string());
                Err(Error::Internal(message))
            });

        let result = match outcome {
            Ok(result) => {
                execution.enter(Stage::Done);
                result
            }
            Err(error) => {
                execution.fail(&error);
                JobResult::failure(&error)
            }
        };

        JobReport { job_id: job_id.clone(), result, stages: execution.stages }
    }

    fn execute(&self, execution: &mut Execution<'_>, request: &JobRequest) -> Result<JobResult> {
        let workspace = self.workspaces.acquire(execution.job_id)?;
        let outcome = self.execute_in(execution, request, &workspace);
        if let Err(e) = workspace.release() {
            tracing::warn!(job_id = %execution.job_id, error = %e, "workspace cleanup failed");
        }
        outcome
    }

    fn execute_in(&self, execution: &mut Execution<'_>, request: &JobRequest, workspace: &Workspace) -> Result<JobResult> {
        execution.enter(Stage::Fetching);
        let input: Artifact = self.fetcher.fetch(&request.source_url, workspace)?;

        execution.enter(Stage::Probing);
        let metadata: VideoMetadata = self.prober.probe(&input.local_path)?;

        execution.enter(Stage::Deciding);
        let decision: ScaleDecision = self.policy.decide(&metadata, request)?;

        execution.enter(Stage::Upscaling);
        let backend = self.backends.select(decision.method);
        tracing::info!(
            job_id = %execution.job_id,
            backend = %backend.name(),
            scale = decision.scale_factor,
            "dispatching upscale"
        );
        let upscaled = backend.upscale(&input, &metadata, &decision, workspace)?;

        execution.enter(Stage::Publishing);
        let filename = upscaled.artifact.file_name();
        let object_key = self.publisher.object_key(execution.job_id.as_str(), &filename);
        let location = self.publisher.publish(&upscaled.artifact, &object_key)?;

        Ok(JobResult::Success {
            message: format!(
                "Upscaled {}x{} to {}x{} using {} upscaling",
                metadata.width, metadata.height, upscaled.width, upscaled.height, decision.method
            ),
            metadata,
            output: PublishedOutput { filename, location },
        })
    }
}
