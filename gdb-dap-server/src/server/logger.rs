//! Routing for `tracing` diagnostics.
//!
//! While a DAP session is up, log records are buffered and periodically
//! flushed to the client's Debug Console; the launch configuration can
//! additionally direct them to a file (`logFile`, written as JSON so other
//! tooling can consume it) and raise the default filter (`verbose`).
//! Errors always reach stderr so a supervising IDE can pick them up even
//! without a session.

use std::fs::File;
use std::io::{stderr, Write};
use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::reload;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

use crate::adapter::protocol::ClientHandle;
use crate::DebuggerError;

type FilterHandle = reload::Handle<EnvFilter, Registry>;

#[derive(Clone)]
pub struct DebugLogger {
    buffer: Arc<Mutex<Vec<u8>>>,
    file: Arc<Mutex<Option<File>>>,
    filter: FilterHandle,
}

/// Feeds the compact layer whose lines end up in the Debug Console.
#[derive(Clone)]
struct BufferWriter(Arc<Mutex<Vec<u8>>>);

impl MakeWriter<'_> for BufferWriter {
    type Writer = Self;

    fn make_writer(&self) -> Self::Writer {
        self.clone()
    }
}

impl Write for BufferWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Feeds the JSON layer for the `logFile` destination. The file is only
/// attached once the launch configuration arrives; until then writes are
/// dropped.
#[derive(Clone)]
struct FileWriter(Arc<Mutex<Option<File>>>);

impl MakeWriter<'_> for FileWriter {
    type Writer = Self;

    fn make_writer(&self) -> Self::Writer {
        self.clone()
    }
}

impl Write for FileWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        if let Some(file) = self.0.lock().as_mut() {
            file.write_all(buf)?;
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        if let Some(file) = self.0.lock().as_mut() {
            file.flush()?;
        }
        Ok(())
    }
}

impl DebugLogger {
    /// Install the global subscriber. Call once, before any session runs.
    pub fn init(log_file: Option<&Path>) -> Result<DebugLogger, DebuggerError> {
        let environment_filter = if std::env::var("RUST_LOG").is_ok() {
            EnvFilter::from_default_env()
        } else {
            EnvFilter::new("gdb_dap_server=info,gdb_mi=info")
        };
        let (filter, filter_handle) = reload::Layer::new(environment_filter);

        let buffer = Arc::new(Mutex::new(Vec::new()));
        let file = Arc::new(Mutex::new(match log_file {
            Some(path) => Some(File::create(path)?),
            None => None,
        }));

        let buffer_layer = tracing_subscriber::fmt::layer()
            .compact()
            .with_ansi(false)
            .without_time()
            .with_writer(BufferWriter(Arc::clone(&buffer)));

        // The log file gets the structured form, with enough context to be
        // useful away from the session that produced it.
        let file_layer = tracing_subscriber::fmt::layer()
            .json()
            .with_file(true)
            .with_line_number(true)
            .with_writer(FileWriter(Arc::clone(&file)));

        // Errors always go to stderr, where the IDE extension watches for
        // them when no DAP session is available.
        let stderr_layer = tracing_subscriber::fmt::layer()
            .compact()
            .with_ansi(false)
            .with_writer(stderr)
            .with_filter(LevelFilter::ERROR);

        tracing_subscriber::registry()
            .with(filter)
            .with(buffer_layer)
            .with(file_layer)
            .with(stderr_layer)
            .try_init()
            .map_err(|error| {
                DebuggerError::UserMessage(format!("Failed to initialize logging: {error}"))
            })?;

        Ok(DebugLogger {
            buffer,
            file,
            filter: filter_handle,
        })
    }

    /// Honor the launch configuration's logging options.
    pub fn apply_config(&self, verbose: bool, log_file: Option<&Path>) {
        if verbose && std::env::var("RUST_LOG").is_err() {
            let _ = self.filter.modify(|filter| {
                *filter = EnvFilter::new("gdb_dap_server=debug,gdb_mi=debug");
            });
        }
        if let Some(path) = log_file {
            match File::create(path) {
                Ok(file) => {
                    *self.file.lock() = Some(file);
                }
                Err(error) => {
                    tracing::error!("Cannot open log file {}: {error}", path.display());
                }
            }
        }
    }

    fn take_lines(&self) -> Vec<String> {
        let bytes = std::mem::take(&mut *self.buffer.lock());
        if bytes.is_empty() {
            return Vec::new();
        }
        String::from_utf8_lossy(&bytes)
            .lines()
            .map(str::to_string)
            .collect()
    }

    /// Flush buffered records to the client's Debug Console.
    pub fn flush_to_client(&self, client: &ClientHandle) {
        for line in self.take_lines() {
            client.log_to_console(line);
        }
    }

    /// Flush buffered records to stderr (no client available).
    pub fn flush_to_stderr(&self) {
        for line in self.take_lines() {
            eprintln!("{line}");
        }
    }
}
