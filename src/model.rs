use crate::error::Result;
#[cfg(feature = "realcugan")]
use crate::error::Error;

use std::sync::Arc;

use image::DynamicImage;

/// A super-resolution model operating on one decoded frame.
pub trait Upscaler: Sync + Send {
    fn upscale(&self, image: DynamicImage) -> Result<DynamicImage>;
}

/// Produces the model instance for a given integer scale.
pub trait ModelLoader: Sync + Send {
    fn name(&self) -> String;
    fn load(&self, scale: u32) -> Result<Arc<dyn Upscaler>>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Model {
    RealCugan,
}

impl Model {
    /// Whether this build links the model's runtime.
    pub fn is_available(&self) -> bool {
        match self {
            Model::RealCugan => cfg!(feature = "realcugan"),
        }
    }
}

impl std::fmt::Display for Model {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Model::RealCugan => write!(f, "realcugan-se"),
        }
    }
}

#[cfg(feature = "realcugan")]
mod realcugan {
    use super::*;
    use realcugan_rs::RealCugan;

    pub(super) struct RealCuganUpscaler(pub(super) RealCugan);

    impl Upscaler for RealCuganUpscaler {
        fn upscale(&self, image: DynamicImage) -> Result<DynamicImage> {
            self.0
                .process_image(image)
                .map_err(|e| Error::process("realcugan", e.to_string()))
        }
    }

    pub(super) fn load(scale: u32) -> Result<Arc<dyn Upscaler>> {
        let model = match scale {
            2 => realcugan_rs::Model::Se2xConservative,
            3 => realcugan_rs::Model::Se3xConservative,
            other => return Err(Error::Internal(format!("realcugan has no {}x model", other))),
        };
        Ok(Arc::new(RealCuganUpscaler(RealCugan::from_model(model))))
    }
}

impl ModelLoader for Model {
    fn name(&self) -> String {
        self.to_string()
    }

    #[cfg(feature = "realcugan")]
    fn load(&self, scale: u32) -> Result<Arc<dyn Upscaler>> {
        match self {
            Model::RealCugan => realcugan::load(scale),
        }
    }

    #[cfg(not(feature = "realcugan"))]
    fn load(&self, _scale: u32) -> Result<Arc<dyn Upscaler>> {
        Err(crate::error::Error::EnvironmentConfig(format!(
            "{} support is not compiled into this build (enable the `realcugan` feature)",
            self
        )))
    }
}
