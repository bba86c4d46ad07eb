use crate::error::{Error, Result};
use crate::process::Tool;

use std::ffi::OsStr;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Canonical description of the primary video stream of a file.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct VideoMetadata {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub duration_seconds: f64,
    pub codec: String,
    pub pixel_format: String,
}

#[derive(Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
    format: Option<ProbeFormat>,
}

#[derive(Deserialize)]
struct ProbeStream {
    codec_type: Option<String>,
    codec_name: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    r_frame_rate: Option<String>,
    pix_fmt: Option<String>,
}

#[derive(Deserialize)]
struct ProbeFormat {
    duration: Option<Value>,
}

/// Rounds to three decimal places so downstream comparisons are stable.
pub fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

/// Parses an ffprobe rational such as `24000/1001`. A zero denominator or an
/// unparsable value yields `0.0`.
pub fn parse_frame_rate(value: &str) -> f64 {
    let value = value.trim();
    let rate = match value.split_once('/') {
        Some((num, den)) => {
            let num = num.trim().parse::<f64>().unwrap_or(0.0);
            let den = den.trim().parse::<f64>().unwrap_or(0.0);
            if den == 0.0 { 0.0 } else { num / den }
        }
        None => value.parse::<f64>().unwrap_or(0.0),
    };
    if rate.is_finite() && rate > 0.0 { round3(rate) } else { 0.0 }
}

fn parse_duration(value: Option<&Value>) -> f64 {
    let seconds = match value {
        Some(Value::String(text)) => text.trim().parse::<f64>().unwrap_or(0.0),
        Some(Value::Number(number)) => number.as_f64().unwrap_or(0.0),
        _ => 0.0,
    };
    if seconds.is_finite() && seconds > 0.0 { round3(seconds) } else { 0.0 }
}

impl VideoMetadata {
    pub fn from_ffprobe_json(json: &str) -> Result<Self> {
        let output: ProbeOutput = serde_json::from_str(json)
            .map_err(|e| Error::ProbeExecution(format!("unreadable ffprobe output: {}", e)))?;

        let stream = output
            .streams
            .iter()
            .find(|stream| stream.codec_type.as_deref() == Some("video"))
            .ok_or_else(|| Error::Media("no video stream".to_string()))?;

        let width = stream.width.filter(|&w| w > 0)
            .ok_or_else(|| Error::Media("video stream has no width".to_string()))?;
        let height = stream.height.filter(|&h| h > 0)
            .ok_or_else(|| Error::Media("video stream has no height".to_string()))?;

        Ok(Self {
            width,
            height,
            fps: stream.r_frame_rate.as_deref().map(parse_frame_rate).unwrap_or(0.0),
            duration_seconds: parse_duration(output.format.as_ref().and_then(|f| f.duration.as_ref())),
            codec: stream.codec_name.clone().unwrap_or_default(),
            pixel_format: stream.pix_fmt.clone().unwrap_or_default(),
        })
    }
}

/// Inspects a local media file.
pub trait MediaProbe: Send + Sync {
    fn probe(&self, path: &Path) -> Result<VideoMetadata>;
}

pub struct Ffprobe {
    tool: Tool,
}

impl Ffprobe {
    pub fn new(tool: Tool) -> Self {
        Self { tool }
    }
}

impl MediaProbe for Ffprobe {
    fn probe(&self, path: &Path) -> Result<VideoMetadata> {
        let mut args: Vec<&OsStr> = [
            "-hide_banner", "-v", "error",
            "-print_format", "json",
            "-show_streams", "-show_format",
        ]
        .into_iter()
        .map(OsStr::new)
        .collect();
        args.push(path.as_os_str());

        let output = self
            .tool
            .run(args)
            .map_err(|e| match e {
                Error::ProcessExecution { tool, message } => {
                    Error::ProbeExecution(format!("{} {}", tool, message))
                }
                other => other,
            })?;

        let metadata = VideoMetadata::from_ffprobe_json(&output.stdout)?;
        tracing::info!(
            path = %path.display(),
            width = metadata.width,
            height = metadata.height,
            fps = metadata.fps,
            codec = %metadata.codec,
            "probed video"
        );
        Ok(metadata)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    const FIXTURE_1080P: &str = r#"{
        "streams": [
            {"index": 0, "codec_type": "audio", "codec_name": "aac", "r_frame_rate": "0/0"},
            {"index": 1, "codec_type": "video", "codec_name": "h264", "width": 1920, "height": 1080,
             "r_frame_rate": "30/1", "pix_fmt": "yuv420p"}
        ],
        "format": {"duration": "12.345678"}
    }"#;

    #[test]
    fn frame_rates() {
        assert_eq!(parse_frame_rate("30/1"), 30.0);
        assert_eq!(parse_frame_rate("24000/1001"), 23.976);
        assert_eq!(parse_frame_rate("30000/1001"), 29.97);
        assert_eq!(parse_frame_rate("0/0"), 0.0);
        assert_eq!(parse_frame_rate("25"), 25.0);
        assert_eq!(parse_frame_rate("garbage"), 0.0);
    }

    #[test]
    fn extracts_first_video_stream() {
        let metadata = VideoMetadata::from_ffprobe_json(FIXTURE_1080P).unwrap();
        assert_eq!(metadata.width, 1920);
        assert_eq!(metadata.height, 1080);
        assert_eq!(metadata.fps, 30.0);
        assert_eq!(metadata.duration_seconds, 12.346);
        assert_eq!(metadata.codec, "h264");
        assert_eq!(metadata.pixel_format, "yuv420p");
    }

    #[test]
    fn missing_duration_defaults_to_zero() {
        let json = r#"{"streams":[{"codec_type":"video","width":640,"height":480,"r_frame_rate":"25/1"}]}"#;
        let metadata = VideoMetadata::from_ffprobe_json(json).unwrap();
        assert_eq!(metadata.duration_seconds, 0.0);
        assert_eq!(metadata.codec, "");
    }

    #[test]
    fn numeric_duration_is_accepted() {
        let json = r#"{"streams":[{"codec_type":"video","width":640,"height":480}],"format":{"duration":3.14159}}"#;
        assert_eq!(VideoMetadata::from_ffprobe_json(json).unwrap().duration_seconds, 3.142);
    }

    #[test]
    fn audio_only_file_has_no_video_stream() {
        let json = r#"{"streams":[{"codec_type":"audio","codec_name":"mp3"}],"format":{"duration":"3.0"}}"#;
        let error = VideoMetadata::from_ffprobe_json(json).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::Media);
        assert!(error.to_string().contains("no video stream"));
    }

    #[test]
    fn zero_dimensions_are_rejected() {
        let json = r#"{"streams":[{"codec_type":"video","width":0,"height":480}]}"#;
        assert_eq!(VideoMetadata::from_ffprobe_json(json).unwrap_err().kind(), ErrorKind::Media);
    }

    #[test]
    fn invalid_json_is_a_probe_failure() {
        let error = VideoMetadata::from_ffprobe_json("not json").unwrap_err();
        assert_eq!(error.kind(), ErrorKind::ProbeExecution);
    }

    #[cfg(unix)]
    #[test]
    fn failing_probe_tool_is_a_probe_failure() {
        let probe = Ffprobe::new(Tool::new("false"));
        let error = probe.probe(Path::new("/tmp/whatever.mp4")).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::ProbeExecution);
    }
}
