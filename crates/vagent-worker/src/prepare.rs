//! The prepare stage: resolve a job reference into a local video file.

use std::path::{Path, PathBuf};

use futures_util::StreamExt;
use tempfile::TempDir;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use vagent_models::{validate_local_path, Job, JobOrigin};

use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};

/// Hosts that need the host-specific downloader rather than a plain GET.
const STREAM_HOSTS: [&str; 8] = [
    "youtube.com",
    "youtu.be",
    "vimeo.com",
    "twitch.tv",
    "dailymotion.com",
    "tiktok.com",
    "rumble.com",
    "streamable.com",
];

/// A resolved local video. Holds the temp directory alive for
/// downloaded sources.
#[derive(Debug)]
pub struct ResolvedSource {
    pub path: PathBuf,
    _temp: Option<TempDir>,
}

impl ResolvedSource {
    fn local(path: PathBuf) -> Self {
        Self { path, _temp: None }
    }

    fn downloaded(temp: TempDir, path: PathBuf) -> Self {
        Self {
            path,
            _temp: Some(temp),
        }
    }
}

/// Whether a URL points at a known streaming host.
pub fn is_stream_host(url: &str) -> bool {
    let host = url
        .split_once("://")
        .map(|(_, rest)| rest)
        .unwrap_or(url)
        .split(['/', '?'])
        .next()
        .unwrap_or("")
        .to_lowercase();

    STREAM_HOSTS
        .iter()
        .any(|h| host == *h || host.ends_with(&format!(".{}", h)))
}

/// Resolve the job's reference into a local file.
pub async fn resolve_source(
    config: &WorkerConfig,
    http: &reqwest::Client,
    job: &Job,
) -> WorkerResult<ResolvedSource> {
    match job.origin {
        JobOrigin::Upload => resolve_local(&job.reference),
        JobOrigin::Url => {
            if let Some(path) = job.reference.strip_prefix("file://") {
                resolve_local(path)
            } else if is_stream_host(&job.reference) {
                download_stream_host(config, http, &job.reference).await
            } else {
                let (temp, path) =
                    download_http(config, http, &job.reference, None).await?;
                Ok(ResolvedSource::downloaded(temp, path))
            }
        }
        JobOrigin::Drive => {
            let base = config.drive_fetch_base_url.as_deref().ok_or_else(|| {
                WorkerError::validation("drive origin requires a configured drive fetch endpoint")
            })?;
            let url = format!("{}/{}", base.trim_end_matches('/'), job.reference);
            let (temp, path) = download_http(config, http, &url, None).await?;
            Ok(ResolvedSource::downloaded(temp, path))
        }
        JobOrigin::LiveStream => Err(WorkerError::validation(
            "live-stream references are consumed by the stream subsystem, not the pipeline",
        )),
    }
}

fn resolve_local(path: &str) -> WorkerResult<ResolvedSource> {
    validate_local_path(path)
        .into_result()
        .map_err(WorkerError::Validation)?;

    let path = PathBuf::from(path);
    if !path.exists() {
        return Err(WorkerError::validation(format!(
            "local file does not exist: {}",
            path.display()
        )));
    }
    debug!(path = %path.display(), "Resolved local source");
    Ok(ResolvedSource::local(path))
}

/// Host-specific download: anonymous first, then the configured user
/// auth fallback on a 401/403.
async fn download_stream_host(
    config: &WorkerConfig,
    http: &reqwest::Client,
    url: &str,
) -> WorkerResult<ResolvedSource> {
    match download_http(config, http, url, None).await {
        Ok((temp, path)) => Ok(ResolvedSource::downloaded(temp, path)),
        Err(WorkerError::DownloadFailed(msg))
            if (msg.contains("status 401") || msg.contains("status 403"))
                && config.stream_host_auth_token.is_some() =>
        {
            info!(url = %url, "Anonymous download rejected, retrying with user auth");
            let token = config.stream_host_auth_token.as_deref();
            let (temp, path) = download_http(config, http, url, token).await?;
            Ok(ResolvedSource::downloaded(temp, path))
        }
        Err(e) => Err(e),
    }
}

/// Streaming HTTP download into a temp file.
async fn download_http(
    config: &WorkerConfig,
    http: &reqwest::Client,
    url: &str,
    bearer: Option<&str>,
) -> WorkerResult<(TempDir, PathBuf)> {
    let temp = TempDir::new().map_err(WorkerError::Io)?;
    let path = temp.path().join("source.video");

    let mut request = http.get(url).timeout(config.download_timeout);
    if let Some(token) = bearer {
        request = request.bearer_auth(token);
    }

    let response = request
        .send()
        .await
        .map_err(|e| WorkerError::download_failed(format!("request failed: {}", e)))?;

    let status = response.status();
    if !status.is_success() {
        return Err(WorkerError::download_failed(format!(
            "download returned status {}",
            status.as_u16()
        )));
    }

    let mut file = tokio::fs::File::create(&path).await?;
    let mut stream = response.bytes_stream();
    let mut bytes_written = 0u64;
    while let Some(chunk) = stream.next().await {
        let chunk =
            chunk.map_err(|e| WorkerError::download_failed(format!("stream failed: {}", e)))?;
        bytes_written += chunk.len() as u64;
        file.write_all(&chunk).await?;
    }
    file.flush().await?;

    if bytes_written == 0 {
        return Err(WorkerError::download_failed("download produced no bytes"));
    }

    info!(url = %url, bytes = bytes_written, "Downloaded source");
    Ok((temp, path))
}

/// Write an upload buffer to an allowed scratch location.
pub async fn stage_upload_buffer(data: &[u8], name: &str) -> WorkerResult<PathBuf> {
    let safe_name: String = name
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_' || *c == '.')
        .collect();
    let path = Path::new("/tmp").join(format!("upload-{}-{}", uuid::Uuid::new_v4(), safe_name));

    let mut file = tokio::fs::File::create(&path).await?;
    file.write_all(data).await?;
    file.flush().await?;
    Ok(path)
}
