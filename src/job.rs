use crate::error::{Error, ErrorKind, Result};
use crate::storage::PublishedLocation;
use crate::video::VideoMetadata;

use std::fmt;

use serde::Serialize;
use serde_json::{Map, Value};
use url::Url;
use uuid::Uuid;

/// Identifier scoping every artifact of one job execution.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct JobId(String);

impl JobId {
    const MAX_LEN: usize = 64;

    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn parse(value: &str) -> Result<Self> {
        let valid = !value.is_empty()
            && value.len() <= Self::MAX_LEN
            && value.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if valid {
            Ok(Self(value.to_string()))
        } else {
            Err(Error::UserInput(format!("invalid job id: {:?}", value)))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UpscaleMethod {
    Filter,
    Ai,
}

impl UpscaleMethod {
    fn parse(value: &str) -> Result<Self> {
        match value {
            "filter" => Ok(UpscaleMethod::Filter),
            "ai" => Ok(UpscaleMethod::Ai),
            other => Err(Error::UserInput(format!(
                "upscale_method must be \"filter\" or \"ai\", got {:?}",
                other
            ))),
        }
    }
}

impl fmt::Display for UpscaleMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpscaleMethod::Filter => write!(f, "filter"),
            UpscaleMethod::Ai => write!(f, "ai"),
        }
    }
}

/// A validated job. Whether the requested scale is legal is a policy
/// question, so any integer is accepted here.
#[derive(Clone, Debug, PartialEq)]
pub struct JobRequest {
    pub source_url: Url,
    pub requested_scale: Option<i64>,
    pub method: UpscaleMethod,
}

impl JobRequest {
    pub fn new(source_url: &str, requested_scale: Option<i64>, method: UpscaleMethod) -> Result<Self> {
        Ok(Self {
            source_url: Self::parse_url(source_url)?,
            requested_scale,
            method,
        })
    }

    fn parse_url(value: &str) -> Result<Url> {
        let value = value.trim();
        if value.is_empty() {
            return Err(Error::UserInput("video_url must not be empty".to_string()));
        }
        let url = Url::parse(value)
            .map_err(|e| Error::UserInput(format!("video_url is not a valid URL: {}", e)))?;
        match url.scheme() {
            "http" | "https" => Ok(url),
            scheme => Err(Error::UserInput(format!("unsupported URL scheme: {}", scheme))),
        }
    }

    pub fn from_value(value: &Value) -> Result<Self> {
        let object = value
            .as_object()
            .ok_or_else(|| Error::UserInput("job input must be a JSON object".to_string()))?;

        let source_url = match object.get("video_url") {
            Some(Value::String(url)) => url.as_str(),
            Some(_) => return Err(Error::UserInput("video_url must be a string".to_string())),
            None => return Err(Error::UserInput("missing required field: video_url".to_string())),
        };

        let requested_scale = match object.get("scale_factor") {
            None | Some(Value::Null) => None,
            Some(value) => Some(value.as_i64().ok_or_else(|| {
                Error::UserInput(format!("scale_factor must be an integer, got {}", value))
            })?),
        };

        let method = match object.get("upscale_method") {
            None | Some(Value::Null) => UpscaleMethod::Ai,
            Some(Value::String(method)) => UpscaleMethod::parse(method)?,
            Some(_) => return Err(Error::UserInput("upscale_method must be a string".to_string())),
        };

        Self::new(source_url, requested_scale, method)
    }
}

/// Splits a hosting envelope `{"id": .., "input": {..}}` into its parts; a
/// bare job object passes through unchanged.
pub fn unwrap_envelope(payload: &Value) -> Result<(Option<JobId>, &Value)> {
    let Some(object) = payload.as_object() else {
        return Err(Error::UserInput("job payload must be a JSON object".to_string()));
    };
    let Some(input) = object.get("input") else {
        return Ok((None, payload));
    };
    let id = match object.get("id") {
        Some(Value::String(id)) => Some(JobId::parse(id)?),
        Some(Value::Null) | None => None,
        Some(_) => return Err(Error::UserInput("job id must be a string".to_string())),
    };
    Ok((id, input))
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PublishedOutput {
    pub filename: String,
    pub location: PublishedLocation,
}

#[derive(Clone, Debug, PartialEq)]
pub enum JobResult {
    Success {
        message: String,
        metadata: VideoMetadata,
        output: PublishedOutput,
    },
    Failure {
        kind: ErrorKind,
        message: String,
    },
}

impl JobResult {
    pub fn failure(error: &Error) -> Self {
        JobResult::Failure { kind: error.kind(), message: error.to_string() }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, JobResult::Success { .. })
    }

    pub fn to_response(&self) -> JobResponse {
        match self {
            JobResult::Success { message, metadata, output } => JobResponse::Ok {
                message: message.clone(),
                input_metadata: metadata.clone(),
                output: OutputLink {
                    filename: output.filename.clone(),
                    public_url: output.location.public_url.clone(),
                },
            },
            JobResult::Failure { message, .. } => JobResponse::Error { error: message.clone() },
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct OutputLink {
    pub filename: String,
    pub public_url: String,
}

/// The JSON document handed back to the hosting runtime.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum JobResponse {
    Ok {
        message: String,
        input_metadata: VideoMetadata,
        output: OutputLink,
    },
    Error {
        error: String,
    },
}

impl JobResponse {
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or_else(|e| {
            let mut object = Map::new();
            object.insert("status".into(), Value::from("error"));
            object.insert("error".into(), Value::from(format!("failed to encode result: {}", e)));
            Value::Object(object)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_minimal_request_with_defaults() {
        let request = JobRequest::from_value(&json!({"video_url": "https://x/in.mp4"})).unwrap();
        assert_eq!(request.source_url.as_str(), "https://x/in.mp4");
        assert_eq!(request.requested_scale, None);
        assert_eq!(request.method, UpscaleMethod::Ai);
    }

    #[test]
    fn parses_full_request() {
        let request = JobRequest::from_value(&json!({
            "video_url": "https://cdn.example.com/a/b.mov",
            "scale_factor": 3,
            "upscale_method": "filter"
        }))
        .unwrap();
        assert_eq!(request.requested_scale, Some(3));
        assert_eq!(request.method, UpscaleMethod::Filter);
    }

    #[test]
    fn out_of_range_scale_is_left_to_policy() {
        let request = JobRequest::from_value(&json!({"video_url": "https://x/a.mp4", "scale_factor": 7})).unwrap();
        assert_eq!(request.requested_scale, Some(7));
    }

    #[test]
    fn rejects_malformed_fields() {
        let cases = [
            json!({}),
            json!({"video_url": ""}),
            json!({"video_url": 12}),
            json!({"video_url": "not a url"}),
            json!({"video_url": "ftp://host/a.mp4"}),
            json!({"video_url": "https://x/a.mp4", "scale_factor": "2"}),
            json!({"video_url": "https://x/a.mp4", "scale_factor": 2.5}),
            json!({"video_url": "https://x/a.mp4", "upscale_method": "magic"}),
            json!("https://x/a.mp4"),
        ];
        for case in cases {
            let error = JobRequest::from_value(&case).unwrap_err();
            assert_eq!(error.kind(), ErrorKind::UserInput, "{case}");
        }
    }

    #[test]
    fn envelope_is_unwrapped() {
        let payload = json!({"id": "job-42", "input": {"video_url": "https://x/a.mp4"}});
        let (id, input) = unwrap_envelope(&payload).unwrap();
        assert_eq!(id.unwrap().as_str(), "job-42");
        assert_eq!(input["video_url"], "https://x/a.mp4");
    }

    #[test]
    fn bare_payload_passes_through() {
        let payload = json!({"video_url": "https://x/a.mp4"});
        let (id, input) = unwrap_envelope(&payload).unwrap();
        assert!(id.is_none());
        assert_eq!(input, &payload);
    }

    #[test]
    fn job_ids_cannot_escape_the_workspace() {
        assert!(JobId::parse("../etc").is_err());
        assert!(JobId::parse("").is_err());
        assert!(JobId::parse("a/b").is_err());
        assert!(JobId::parse("sync-7f3a_b").is_ok());
    }

    #[test]
    fn failure_serialises_as_error_status() {
        let result = JobResult::failure(&Error::Policy("resolution too low".into()));
        let value = result.to_response().to_value();
        assert_eq!(value["status"], "error");
        assert!(value["error"].as_str().unwrap().contains("resolution too low"));
        assert_eq!(value.as_object().unwrap().len(), 2);
    }
}
