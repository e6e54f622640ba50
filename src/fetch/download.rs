//! HTTP downloads into the cache scratch directory.

use crate::core::output;
use anyhow::{Context, Result, bail};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::time::Duration;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const TIMEOUT_RANGE: (u64, u64) = (5, 300);

/// Environment variable overriding the timeout, in seconds.
pub const HTTP_TIMEOUT_ENV: &str = "OSS_HTTP_TIMEOUT";

/// Transfers a URL to a local file.
pub trait Downloader {
    /// Download `url` to `dest`, returning the number of bytes written.
    fn download(&self, url: &str, dest: &Path) -> Result<u64>;
}

/// Seconds from the environment, kept within [`TIMEOUT_RANGE`].
fn parse_timeout(value: Option<&str>) -> Duration {
    match value.and_then(|s| s.trim().parse::<u64>().ok()) {
        Some(secs) => Duration::from_secs(secs.clamp(TIMEOUT_RANGE.0, TIMEOUT_RANGE.1)),
        None => DEFAULT_TIMEOUT,
    }
}

/// [`Downloader`] backed by `ureq`, with a progress bar.
#[derive(Debug, Clone)]
pub struct HttpDownloader {
    agent: ureq::Agent,
}

impl HttpDownloader {
    pub fn new(timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(timeout)
            .timeout_read(timeout)
            .user_agent(concat!("osm-server-setup/", env!("CARGO_PKG_VERSION")))
            .build();
        Self { agent }
    }

    /// Timeout from `OSS_HTTP_TIMEOUT`, or the default.
    pub fn from_env() -> Self {
        let timeout = parse_timeout(std::env::var(HTTP_TIMEOUT_ENV).ok().as_deref());
        tracing::debug!(?timeout, "http timeout");
        Self::new(timeout)
    }
}

impl Downloader for HttpDownloader {
    fn download(&self, url: &str, dest: &Path) -> Result<u64> {
        let response = match self.agent.get(url).call() {
            Ok(response) => response,
            Err(ureq::Error::Status(code, response)) => {
                bail!("{} answered {} {}", url, code, response.status_text())
            }
            Err(e) => return Err(e).with_context(|| format!("cannot reach {}", url)),
        };
        let length = response
            .header("content-length")
            .and_then(|v| v.parse::<u64>().ok());

        let name = url.rsplit('/').next().unwrap_or(url);
        let pb = output::spinner(&format!("downloading {}", name));
        if let Some(length) = length {
            output::upgrade_to_bytes(&pb, length);
        }

        let file =
            std::fs::File::create(dest).with_context(|| format!("cannot create {}", dest.display()))?;
        let mut sink = pb.wrap_write(BufWriter::new(file));
        let copied = std::io::copy(&mut response.into_reader(), &mut sink)
            .with_context(|| format!("transfer of {} interrupted", url));
        let flushed = sink
            .flush()
            .with_context(|| format!("cannot write {}", dest.display()));
        pb.finish_and_clear();

        let written = copied?;
        flushed?;
        tracing::debug!(url, bytes = written, "downloaded");
        output::detail(&format!("downloaded {} ({} bytes)", name, written));
        Ok(written)
    }
}
