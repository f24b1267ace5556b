use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use once_cell::sync::Lazy;
use tracing_subscriber::fmt::MakeWriter;

use crate::settings::APP_DIR_NAME;

const LOG_FILENAME: &str = "ei-insights.log";

static FILE_LOGGING_ENABLED: AtomicBool = AtomicBool::new(false);

static LOG_FILE: Lazy<Option<Arc<Mutex<std::fs::File>>>> = Lazy::new(|| {
    open_log_file()
        .or_else(|_| open_fallback_log_file())
        .ok()
        .map(|file| Arc::new(Mutex::new(file)))
});

pub fn set_file_logging(enabled: bool) {
    FILE_LOGGING_ENABLED.store(enabled, Ordering::Relaxed);
}

pub fn file_logging_enabled() -> bool {
    FILE_LOGGING_ENABLED.load(Ordering::Relaxed)
}

/// Writer for the shared log file, opened on the first enabled write
pub fn file_writer() -> LogFileWriter {
    LogFileWriter { file: None }
}

pub fn log_file_path() -> Option<PathBuf> {
    dirs::data_dir().map(|dir| dir.join(APP_DIR_NAME).join(LOG_FILENAME))
}

fn open_log_file() -> io::Result<std::fs::File> {
    let log_path = log_file_path()
        .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "Missing data directory"))?;
    if let Some(parent) = log_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    OpenOptions::new().create(true).append(true).open(log_path)
}

fn open_fallback_log_file() -> io::Result<std::fs::File> {
    let path = std::env::temp_dir().join(LOG_FILENAME);
    OpenOptions::new().create(true).append(true).open(path)
}

/// Appends to the log file while file logging is switched on
#[derive(Clone)]
pub struct LogFileWriter {
    /// `None` writes to the shared log file
    file: Option<Arc<Mutex<std::fs::File>>>,
}

impl<'a> MakeWriter<'a> for LogFileWriter {
    type Writer = LogFileWriterGuard;

    fn make_writer(&'a self) -> Self::Writer {
        LogFileWriterGuard {
            file: self.file.clone(),
        }
    }
}

pub struct LogFileWriterGuard {
    file: Option<Arc<Mutex<std::fs::File>>>,
}

impl LogFileWriterGuard {
    fn target(&self) -> Option<&Arc<Mutex<std::fs::File>>> {
        self.file.as_ref().or_else(|| (*LOG_FILE).as_ref())
    }
}

impl Write for LogFileWriterGuard {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if !file_logging_enabled() {
            return Ok(buf.len());
        }

        match self.target().map(|file| file.lock()) {
            Some(Ok(mut file)) => file.write(buf),
            _ => Ok(buf.len()),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        if !file_logging_enabled() {
            return Ok(());
        }
        match self.target().map(|file| file.lock()) {
            Some(Ok(mut file)) => file.flush(),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // One test: the toggle and the shared file are process-wide
    #[test]
    fn writes_only_while_enabled() {
        let file = tempfile::tempfile().expect("tempfile");
        let shared = Arc::new(Mutex::new(file));
        let writer = LogFileWriter {
            file: Some(shared.clone()),
        };
        let file_len = || shared.lock().expect("lock").metadata().expect("metadata").len();

        set_file_logging(false);
        let mut shared_guard = file_writer().make_writer();
        assert_eq!(shared_guard.write(b"dropped\n").expect("write"), 8);
        shared_guard.flush().expect("flush");
        assert!(Lazy::get(&LOG_FILE).is_none());

        let mut guard = writer.make_writer();
        assert_eq!(guard.write(b"dropped\n").expect("write"), 8);
        assert_eq!(file_len(), 0);

        set_file_logging(true);
        assert_eq!(guard.write(b"line\n").expect("write"), 5);
        guard.flush().expect("flush");
        set_file_logging(false);

        assert_eq!(file_len(), 5);
    }
}
