//! Model artifact provisioning from fixed release URLs.
//!
//! Downloads are sequential. The first failure aborts the run; nothing is
//! retried, checksummed, or cleaned up.

use crate::config::ModelConfig;
use crate::error::{Result, SpeakError};
use crate::progress::{ProgressCallback, ProgressEvent};
use indicatif::{ProgressBar, ProgressStyle};
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::{error, info};

/// Local paths of the provisioned artifacts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionedArtifacts {
    /// ONNX model weights.
    pub model: PathBuf,
    /// Voice embedding archive.
    pub voices: PathBuf,
}

/// Fetches the model and voice artifacts to their local paths.
pub struct Provisioner {
    config: ModelConfig,
}

impl Provisioner {
    /// Create a provisioner for the given artifact configuration.
    pub fn new(config: &ModelConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }

    /// Download the model, then the voices.
    ///
    /// Stops at the first failed transfer; the second artifact is never
    /// requested if the first fails.
    ///
    /// # Errors
    ///
    /// Returns the first download error.
    pub fn fetch_all(&self, callback: Option<&ProgressCallback>) -> Result<ProvisionedArtifacts> {
        println!("Fetching model from {}", self.config.model_url);
        let model =
            self.download_or_report(&self.config.model_url, &self.config.model_path, callback)?;
        println!("Model ready ({})", model.display());

        println!("Fetching voices from {}", self.config.voices_url);
        let voices =
            self.download_or_report(&self.config.voices_url, &self.config.voices_path, callback)?;
        println!("Voices ready ({})", voices.display());

        Ok(ProvisionedArtifacts { model, voices })
    }

    fn download_or_report(
        &self,
        url: &str,
        dest: &Path,
        callback: Option<&ProgressCallback>,
    ) -> Result<PathBuf> {
        self.download_url_with_progress(url, dest, callback)
            .inspect_err(|e| {
                error!("provisioning failed for {url}: {e}");
                if let Some(cb) = callback {
                    cb(ProgressEvent::Error {
                        message: e.to_string(),
                    });
                }
            })
    }

    /// Download a file from a direct URL to `dest` with a console progress bar.
    ///
    /// The body is streamed into `<dest>.part` and renamed over `dest` once
    /// complete, replacing any existing file. With `skip_existing` set, an
    /// existing `dest` is returned untouched.
    ///
    /// # Errors
    ///
    /// Returns an error on connection failure, non-success HTTP status, or
    /// local I/O failure. A partially written `.part` file is left behind.
    pub fn download_url_with_progress(
        &self,
        url: &str,
        dest: &Path,
        callback: Option<&ProgressCallback>,
    ) -> Result<PathBuf> {
        let filename = display_name(dest);

        if self.config.skip_existing && dest.is_file() {
            println!("  {filename}  [cached]");
            if let Some(cb) = callback {
                cb(ProgressEvent::Cached {
                    url: url.to_owned(),
                    filename,
                });
            }
            return Ok(dest.to_path_buf());
        }

        if let Some(parent) = dest.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        info!("downloading {url} -> {}", dest.display());

        let resp = ureq::get(url)
            .call()
            .map_err(|e| SpeakError::Download(format!("failed to download {filename}: {e}")))?;

        let total_bytes = resp
            .header("content-length")
            .and_then(|v| v.parse::<u64>().ok());

        if let Some(cb) = callback {
            cb(ProgressEvent::DownloadStarted {
                url: url.to_owned(),
                filename: filename.clone(),
                total_bytes,
            });
        }

        let pb = ProgressBar::new(total_bytes.unwrap_or(0));
        if let Ok(style) = ProgressStyle::with_template(
            "  {msg} [{bar:30}] {bytes}/{total_bytes} {bytes_per_sec} ETA {eta}",
        ) {
            pb.set_style(style);
        }
        pb.set_message(filename.clone());

        let tmp = part_path(dest);
        let mut file = std::fs::File::create(&tmp)?;
        let mut reader = resp.into_reader();
        let mut buf = [0u8; 64 * 1024];
        let mut bytes_downloaded: u64 = 0;
        loop {
            let n = reader
                .read(&mut buf)
                .map_err(|e| SpeakError::Download(format!("download read error: {e}")))?;
            if n == 0 {
                break;
            }
            std::io::Write::write_all(&mut file, &buf[..n])?;
            pb.inc(n as u64);
            bytes_downloaded += n as u64;
            if let Some(cb) = callback {
                cb(ProgressEvent::DownloadProgress {
                    url: url.to_owned(),
                    filename: filename.clone(),
                    bytes_downloaded,
                    total_bytes,
                });
            }
        }
        std::io::Write::flush(&mut file)?;
        drop(file);
        pb.finish();

        std::fs::rename(&tmp, dest)?;
        info!("saved {} ({bytes_downloaded} bytes)", dest.display());

        if let Some(cb) = callback {
            cb(ProgressEvent::DownloadComplete {
                url: url.to_owned(),
                filename,
                bytes: bytes_downloaded,
            });
        }

        Ok(dest.to_path_buf())
    }
}

/// `<dest>.part`, keeping the original extension visible.
fn part_path(dest: &Path) -> PathBuf {
    let mut name = dest.as_os_str().to_owned();
    name.push(".part");
    PathBuf::from(name)
}

fn display_name(dest: &Path) -> String {
    dest.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| dest.display().to_string())
}
