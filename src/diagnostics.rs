//! Append-only diagnostic file for lifecycle transitions.
//!
//! Writes are best-effort: a failing or closed sink never surfaces an error to
//! the caller. Every line is mirrored to the `log` facade at debug level.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::Result;

#[derive(Debug)]
struct SinkTarget {
    path: Option<PathBuf>,
    file: Option<File>,
}

#[derive(Clone, Debug)]
pub struct DiagnosticSink {
    inner: Arc<Mutex<SinkTarget>>,
}

impl DiagnosticSink {
    /// Opens `path` for appending, creating it if missing.
    pub fn open(path: &Path) -> Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            inner: Arc::new(Mutex::new(SinkTarget {
                path: Some(path.to_path_buf()),
                file: Some(file),
            })),
        })
    }

    /// A sink without a target. Lines still reach the `log` facade.
    pub fn disabled() -> Self {
        Self {
            inner: Arc::new(Mutex::new(SinkTarget {
                path: None,
                file: None,
            })),
        }
    }

    pub fn write(&self, line: &str) {
        log::debug!("[diagnostic] {}", line);

        let mut guard = self.inner.lock();
        let SinkTarget { path, file } = &mut *guard;
        let Some(file) = file.as_mut() else {
            return;
        };

        let mut buf = String::with_capacity(line.len() + 1);
        buf.push_str(line);
        buf.push('\n');
        if let Err(e) = file.write_all(buf.as_bytes()).and_then(|_| file.flush()) {
            log::warn!("Failed to write diagnostic line to {:?}: {}", path, e);
        }
    }

    /// Echoes a host event in the `---name---` form.
    pub fn write_event(&self, event_name: &str) {
        self.write(&format!("---{}---", event_name));
    }

    pub fn close(&self) {
        let mut target = self.inner.lock();
        if let Some(mut file) = target.file.take() {
            let _ = file.flush();
        }
    }

    pub fn is_open(&self) -> bool {
        self.inner.lock().file.is_some()
    }

    pub fn path(&self) -> Option<PathBuf> {
        self.inner.lock().path.clone()
    }
}
