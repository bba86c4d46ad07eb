mod extract;
mod upscale;
mod progress;
mod merge;

pub use extract::Extract;
pub use upscale::{FrameRunner, GpuBinary, InProcess, Script};
pub use progress::Progress;
pub use merge::Merge;

use crate::config::EncodingConfig;

/// Flags shared by every ffmpeg invocation.
fn ffmpeg_preamble() -> Vec<String> {
    ["-hide_banner", "-nostdin", "-y", "-loglevel", "error"]
        .into_iter()
        .map(String::from)
        .collect()
}

/// Video encode flags; audio, when present, is re-encoded to AAC so any
/// source container can be muxed into MP4.
pub(crate) fn encode_arguments(encoding: &EncodingConfig, preset: &str) -> Vec<String> {
    vec![
        "-c:v".into(), encoding.encoder.clone(),
        "-preset".into(), preset.to_string(),
        "-crf".into(), encoding.crf.to_string(),
        "-pix_fmt".into(), encoding.pixel_format.clone(),
        "-c:a".into(), "aac".into(),
        "-b:a".into(), "192k".into(),
        "-movflags".into(), "+faststart".into(),
    ]
}

pub(crate) fn scale_arguments(
    encoding: &EncodingConfig,
    preset: &str,
    input: &std::path::Path,
    output: &std::path::Path,
    width: u32,
    height: u32,
) -> Vec<String> {
    let mut args = ffmpeg_preamble();
    args.extend([
        "-i".into(), input.display().to_string(),
        "-map".into(), "0:v:0".into(),
        "-map".into(), "0:a?".into(),
        "-vf".into(), format!("scale={}:{}:flags=lanczos", width, height),
    ]);
    args.extend(encode_arguments(encoding, preset));
    args.push(output.display().to_string());
    args
}
