//! Progress event types for artifact provisioning.
//!
//! Callback-based reporting decouples the download loop from its
//! presentation (console progress bars, tests, embedding applications).

/// Progress events emitted while provisioning model artifacts.
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    /// An artifact download has started.
    DownloadStarted {
        /// Source URL.
        url: String,
        /// Destination file name.
        filename: String,
        /// Total size in bytes, if the server reported one.
        total_bytes: Option<u64>,
    },

    /// Download progress update.
    DownloadProgress {
        /// Source URL.
        url: String,
        /// Destination file name.
        filename: String,
        /// Bytes downloaded so far.
        bytes_downloaded: u64,
        /// Total size in bytes, if known.
        total_bytes: Option<u64>,
    },

    /// An artifact download completed and was moved into place.
    DownloadComplete {
        /// Source URL.
        url: String,
        /// Destination file name.
        filename: String,
        /// Bytes written.
        bytes: u64,
    },

    /// The artifact already exists locally and was kept.
    Cached {
        /// Source URL.
        url: String,
        /// Destination file name.
        filename: String,
    },

    /// A download failed; remaining artifacts are not fetched.
    Error {
        /// Human-readable error description.
        message: String,
    },
}

/// Callback type for receiving progress events.
pub type ProgressCallback = Box<dyn Fn(ProgressEvent) + Send + Sync>;

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn callback_receives_events_in_order() {
        let events: Arc<Mutex<Vec<&'static str>>> = Arc::new(Mutex::new(Vec::new()));
        let events_clone = Arc::clone(&events);

        let callback: ProgressCallback = Box::new(move |event| {
            let label = match &event {
                ProgressEvent::DownloadStarted { .. } => "started",
                ProgressEvent::DownloadProgress { .. } => "progress",
                ProgressEvent::DownloadComplete { .. } => "complete",
                ProgressEvent::Cached { .. } => "cached",
                ProgressEvent::Error { .. } => "error",
            };
            let Ok(mut guard) = events_clone.lock() else {
                return;
            };
            guard.push(label);
        });

        callback(ProgressEvent::DownloadStarted {
            url: "https://example.invalid/model.onnx".into(),
            filename: "model.onnx".into(),
            total_bytes: Some(1000),
        });
        callback(ProgressEvent::DownloadProgress {
            url: "https://example.invalid/model.onnx".into(),
            filename: "model.onnx".into(),
            bytes_downloaded: 500,
            total_bytes: Some(1000),
        });
        callback(ProgressEvent::DownloadComplete {
            url: "https://example.invalid/model.onnx".into(),
            filename: "model.onnx".into(),
            bytes: 1000,
        });
        callback(ProgressEvent::Cached {
            url: "https://example.invalid/voices.bin".into(),
            filename: "voices.bin".into(),
        });

        let got = events.lock().unwrap().clone();
        assert_eq!(got, vec!["started", "progress", "complete", "cached"]);
    }
}
