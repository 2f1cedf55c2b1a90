//! Periodic Prometheus textfile export.

use std::{
    fs, io,
    path::{Path, PathBuf},
    time::Duration,
};

use {
    beenbag_metrics::MetricsHandle,
    tokio::task::JoinHandle,
    tokio_util::sync::CancellationToken,
    tracing::{debug, warn},
};

/// Write the current snapshot to `path` via a sibling temp file, so a
/// collector never reads a half-written file.
pub fn export_once(handle: &MetricsHandle, path: &Path) -> io::Result<()> {
    let tmp = path.with_extension("prom.tmp");
    fs::write(&tmp, handle.render())?;
    fs::rename(&tmp, path)
}

/// Rewrite `path` every `every` until cancelled, then once more.
pub fn spawn_textfile_exporter(
    handle: MetricsHandle,
    path: PathBuf,
    every: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every.max(Duration::from_secs(1)));
        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                _ = ticker.tick() => {},
            }
            match export_once(&handle, &path) {
                Ok(()) => debug!(path = %path.display(), "metrics exported"),
                Err(e) => warn!(path = %path.display(), error = %e, "metrics export failed"),
            }
        }
        if let Err(e) = export_once(&handle, &path) {
            warn!(path = %path.display(), error = %e, "final metrics export failed");
        }
    })
}
