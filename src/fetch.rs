use crate::config::FetchConfig;
use crate::error::{Error, Result};
use crate::workspace::{Artifact, Workspace};

use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

use url::Url;

pub const VIDEO_EXTENSIONS: [&str; 8] = ["mp4", "mov", "mkv", "webm", "avi", "m4v", "mpg", "mpeg"];
pub const DEFAULT_EXTENSION: &str = "mp4";
const DEFAULT_STEM: &str = "input";
const MAX_NAME_LEN: usize = 128;

fn has_video_extension(name: &str) -> bool {
    Path::new(name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| VIDEO_EXTENSIONS.iter().any(|known| ext.eq_ignore_ascii_case(known)))
        .unwrap_or(false)
}

/// Reduces `name` to `[A-Za-z0-9._-]`, strips leading dots and guarantees a
/// known video extension. Applying it twice gives the same result.
pub fn sanitize_file_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') { c } else { '_' })
        .collect();
    let cleaned = cleaned.trim_start_matches('.');
    let cleaned = if cleaned.is_empty() { DEFAULT_STEM } else { cleaned };

    if has_video_extension(cleaned) {
        if cleaned.len() <= MAX_NAME_LEN {
            return cleaned.to_string();
        }
        let (stem, ext) = cleaned.rsplit_once('.').unwrap_or((cleaned, DEFAULT_EXTENSION));
        let keep = MAX_NAME_LEN.saturating_sub(ext.len() + 1);
        return format!("{}.{}", &stem[..keep.min(stem.len())], ext);
    }

    let keep = MAX_NAME_LEN - DEFAULT_EXTENSION.len() - 1;
    let stem = &cleaned[..keep.min(cleaned.len())];
    format!("{}.{}", stem, DEFAULT_EXTENSION)
}

/// Local file name for the resource behind `url`.
pub fn file_name_for(url: &Url) -> String {
    let segment = url
        .path_segments()
        .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
        .unwrap_or("");
    let decoded = url::form_urlencoded::parse(format!("n={}", segment).as_bytes())
        .next()
        .map(|(_, value)| value.into_owned())
        .unwrap_or_else(|| segment.to_string());
    sanitize_file_name(&decoded)
}

/// Retrieves a remote resource into a workspace.
pub trait Fetch: Send + Sync {
    fn fetch(&self, url: &Url, workspace: &Workspace) -> Result<Artifact>;
}

pub struct HttpFetcher {
    client: reqwest::blocking::Client,
}

impl HttpFetcher {
    pub fn new(config: &FetchConfig) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(config.timeout)
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| Error::EnvironmentConfig(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self { client })
    }

    fn download(&self, url: &Url, partial: &Path) -> Result<u64> {
        let mut response = self
            .client
            .get(url.clone())
            .send()
            .map_err(|e| Error::Fetch(Self::describe(&e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Fetch(format!("{} returned HTTP {}", url, status)));
        }

        let mut file = File::create(partial)
            .map_err(|e| Error::Fetch(format!("cannot create {}: {}", partial.display(), e)))?;
        let written = response
            .copy_to(&mut file)
            .map_err(|e| Error::Fetch(Self::describe(&e)))?;
        file.flush()
            .and_then(|_| file.sync_all())
            .map_err(|e| Error::Fetch(format!("cannot write {}: {}", partial.display(), e)))?;
        Ok(written)
    }

    fn describe(error: &reqwest::Error) -> String {
        if error.is_timeout() {
            format!("request timed out: {}", error)
        } else {
            error.to_string()
        }
    }
}

impl Fetch for HttpFetcher {
    fn fetch(&self, url: &Url, workspace: &Workspace) -> Result<Artifact> {
        let destination = workspace.path(&file_name_for(url));
        if !workspace.contains(&destination) {
            return Err(Error::Fetch(format!(
                "destination {} is outside the workspace",
                destination.display()
            )));
        }
        let partial = destination.with_extension("part");

        tracing::info!(%url, destination = %destination.display(), "downloading source");
        match self.download(url, &partial) {
            Ok(bytes) => {
                fs::rename(&partial, &destination)
                    .map_err(|e| Error::Fetch(format!("cannot finalise download: {}", e)))?;
                tracing::info!(bytes, "download complete");
                Artifact::from_path(destination)
            }
            Err(e) => {
                let _ = fs::remove_file(&partial);
                Err(e)
            }
        }
    }
}
