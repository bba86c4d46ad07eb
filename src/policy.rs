use crate::error::{Error, Result};
use crate::job::{JobRequest, UpscaleMethod};
use crate::video::VideoMetadata;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ScaleDecision {
    pub scale_factor: u32,
    pub method: UpscaleMethod,
}

impl ScaleDecision {
    pub fn output_dimensions(&self, metadata: &VideoMetadata) -> (u32, u32) {
        (metadata.width * self.scale_factor, metadata.height * self.scale_factor)
    }
}

/// Business rules deciding whether a probed input may be upscaled.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Policy {
    pub min_height: u32,
    pub default_scale: u32,
}

impl Policy {
    pub const ALLOWED_SCALES: [u32; 2] = [2, 3];

    pub fn decide(&self, metadata: &VideoMetadata, request: &JobRequest) -> Result<ScaleDecision> {
        let scale_factor = match request.requested_scale {
            Some(scale) => u32::try_from(scale)
                .ok()
                .filter(|scale| Self::ALLOWED_SCALES.contains(scale))
                .ok_or_else(|| Error::Policy(format!("scale_factor must be 2 or 3, got {}", scale)))?,
            None => self.default_scale,
        };

        if metadata.height < self.min_height {
            return Err(Error::Policy(format!(
                "resolution too low: {}x{} is below the minimum height of {} lines",
                metadata.width, metadata.height, self.min_height
            )));
        }

        let decision = ScaleDecision { scale_factor, method: request.method };
        let (width, height) = decision.output_dimensions(metadata);
        if width % 2 != 0 || height % 2 != 0 {
            return Err(Error::Policy(format!(
                "scale_factor {} would give {}x{}; 4:2:0 output needs even dimensions",
                scale_factor, width, height
            )));
        }
        Ok(decision)
    }
}

impl Default for Policy {
    fn default() -> Self {
        Self { min_height: 720, default_scale: 2 }
    }
}

pub fn decide(metadata: &VideoMetadata, request: &JobRequest) -> Result<ScaleDecision> {
    Policy::default().decide(metadata, request)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn metadata(width: u32, height: u32) -> VideoMetadata {
        VideoMetadata {
            width,
            height,
            fps: 30.0,
            duration_seconds: 10.0,
            codec: "h264".into(),
            pixel_format: "yuv420p".into(),
        }
    }

    fn request(scale: Option<i64>, method: UpscaleMethod) -> JobRequest {
        JobRequest::new("https://x/in.mp4", scale, method).unwrap()
    }

    #[test]
    fn scales_outside_two_and_three_are_rejected() {
        for scale in [-3, 0, 1, 4, 8, i64::MAX] {
            let error = decide(&metadata(1920, 1080), &request(Some(scale), UpscaleMethod::Ai)).unwrap_err();
            assert_eq!(error.kind(), ErrorKind::Policy, "scale {scale}");
        }
    }

    #[test]
    fn low_resolution_is_rejected() {
        for height in [1, 360, 480, 719] {
            let error = decide(&metadata(1280, height), &request(None, UpscaleMethod::Filter)).unwrap_err();
            assert_eq!(error.kind(), ErrorKind::Policy);
            assert!(error.to_string().contains("resolution too low"));
        }
    }

    #[test]
    fn threshold_and_above_are_accepted() {
        for height in [720, 1080, 2160] {
            let decision = decide(&metadata(1280, height), &request(None, UpscaleMethod::Ai)).unwrap();
            assert!(Policy::ALLOWED_SCALES.contains(&decision.scale_factor));
        }
    }

    #[test]
    fn defaults_to_two_and_keeps_method() {
        let decision = decide(&metadata(1280, 720), &request(None, UpscaleMethod::Filter)).unwrap();
        assert_eq!(decision, ScaleDecision { scale_factor: 2, method: UpscaleMethod::Filter });
        assert_eq!(decision.output_dimensions(&metadata(1280, 720)), (2560, 1440));
    }

    #[test]
    fn honours_requested_three() {
        let decision = decide(&metadata(1920, 1080), &request(Some(3), UpscaleMethod::Ai)).unwrap();
        assert_eq!(decision.scale_factor, 3);
    }

    #[test]
    fn odd_output_dimensions_are_rejected() {
        let error = decide(&metadata(1279, 720), &request(Some(3), UpscaleMethod::Filter)).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::Policy);
        assert!(error.to_string().contains("3837x2160"), "{error}");

        let decision = decide(&metadata(1279, 720), &request(Some(2), UpscaleMethod::Filter)).unwrap();
        assert_eq!(decision.output_dimensions(&metadata(1279, 720)), (2558, 1440));
    }

    #[test]
    fn custom_threshold() {
        let policy = Policy { min_height: 480, ..Policy::default() };
        assert!(policy.decide(&metadata(640, 480), &request(None, UpscaleMethod::Ai)).is_ok());
    }
}
