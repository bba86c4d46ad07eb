//! Job-driven video upscaling: fetch a remote video, probe it, check it
//! against policy, upscale it with a filter or a super-resolution model and
//! publish the result to S3-compatible storage.

pub mod error;
pub mod process;
pub mod config;
pub mod job;
pub mod video;
pub mod policy;
pub mod workspace;
pub mod fetch;
pub mod frame;
pub mod model;
pub mod stages;
pub mod backend;
pub mod storage;
pub mod controller;

pub use controller::{Backends, Controller, JobReport, Stage};
pub use error::{Error, ErrorKind, Result};
