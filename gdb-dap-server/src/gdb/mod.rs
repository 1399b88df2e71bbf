//! Ownership of the GDB child process and the tokenized MI command channel.

mod quoting;
mod version;

pub use quoting::Quoted;
pub use version::{parse_gdb_version, probe_version, GdbVersion};

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use futures_util::StreamExt;
use gdb_mi::{MiDecoder, MiParser, MiRecord, MiTuple, ResultClass, ResultRecord};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin};
use tokio::sync::{mpsc, oneshot, watch};
use tokio_util::codec::FramedRead;

use crate::DebuggerError;

/// Everything the session receives from GDB besides direct command results.
#[derive(Clone, Debug)]
pub enum MiEvent {
    /// `*running` / `*stopped`.
    Exec(gdb_mi::AsyncRecord),
    /// `+` status updates.
    Status(gdb_mi::AsyncRecord),
    /// `=thread-created`, `=breakpoint-modified`, …
    Notify(gdb_mi::AsyncRecord),
    /// `~` / `@` / `&` stream output.
    Stream(gdb_mi::StreamRecord),
    /// A result record with no pending command slot: an unknown token, or a
    /// second result for a token that already completed (GDB occasionally
    /// follows `^done` with a late `^error` for the same token).
    Result(ResultRecord),
    /// A line from GDB's stderr.
    Stderr(String),
    /// The GDB output stream closed.
    Closed,
}

/// The completed result of one MI command.
#[derive(Clone, Debug)]
pub struct MiResults {
    pub token: u64,
    /// The command text this result answers.
    pub command: String,
    pub class: ResultClass,
    pub results: MiTuple,
}

struct PendingSlot {
    command: String,
    tx: oneshot::Sender<Result<MiResults, DebuggerError>>,
}

/// The token-indexed map of in-flight commands. `None` means the pipe is
/// closed and no further commands can be registered.
struct PendingCommands {
    slots: parking_lot::Mutex<Option<HashMap<u64, PendingSlot>>>,
}

impl PendingCommands {
    fn new() -> Self {
        PendingCommands {
            slots: parking_lot::Mutex::new(Some(HashMap::new())),
        }
    }

    fn register(
        &self,
        token: u64,
        command: &str,
        tx: oneshot::Sender<Result<MiResults, DebuggerError>>,
    ) -> Result<(), DebuggerError> {
        match self.slots.lock().as_mut() {
            Some(slots) => {
                slots.insert(
                    token,
                    PendingSlot {
                        command: command.to_string(),
                        tx,
                    },
                );
                Ok(())
            }
            None => Err(DebuggerError::PipeClosed),
        }
    }

    fn discard(&self, token: u64) {
        if let Some(slots) = self.slots.lock().as_mut() {
            slots.remove(&token);
        }
    }

    /// Resolve the slot matching this record. Returns the record back if no
    /// slot claims it, so the caller can put it on the side channel.
    fn complete(&self, record: ResultRecord) -> Option<ResultRecord> {
        let slot = match (record.token, self.slots.lock().as_mut()) {
            (Some(token), Some(slots)) => slots.remove(&token),
            _ => None,
        };
        let Some(slot) = slot else {
            return Some(record);
        };
        let outcome = match record.class {
            ResultClass::Error => {
                let message = record
                    .results
                    .string("msg")
                    .unwrap_or("Unknown GDB error")
                    .to_string();
                Err(DebuggerError::from_gdb_message(message))
            }
            class => Ok(MiResults {
                token: record.token.unwrap_or(0),
                command: slot.command.clone(),
                class,
                results: record.results,
            }),
        };
        // The waiter may have timed out and gone away; that is fine.
        let _ = slot.tx.send(outcome);
        None
    }

    /// Reject every outstanding slot and refuse new registrations.
    fn close(&self) {
        let Some(slots) = self.slots.lock().take() else {
            return;
        };
        for (_, slot) in slots {
            let _ = slot.tx.send(Err(DebuggerError::PipeClosed));
        }
    }
}

/// How to start GDB.
#[derive(Clone, Debug, Default)]
pub struct GdbSpawnOptions {
    /// Path to the GDB binary.
    pub gdb: String,
    /// Additional command line arguments.
    pub arguments: Vec<String>,
    pub cwd: Option<PathBuf>,
    /// Environment overrides; a `None` value unsets the variable.
    pub environment: Vec<(String, Option<String>)>,
}

/// Owns the GDB process: its stdin (command pipe) and stdout (consumed by
/// the MI parser in a reader task).
pub struct GdbBackend {
    stdin: tokio::sync::Mutex<ChildStdin>,
    child: tokio::sync::Mutex<Child>,
    pid: Option<u32>,
    pending: Arc<PendingCommands>,
    next_token: AtomicU64,
    version: GdbVersion,
    async_mode: AtomicBool,
    non_stop: AtomicBool,
    utf8: Arc<AtomicBool>,
    ready: watch::Receiver<bool>,
}

impl GdbBackend {
    /// Spawn GDB in MI mode and start the reader tasks. The returned
    /// receiver carries all out-of-band records.
    pub async fn spawn(
        options: &GdbSpawnOptions,
    ) -> Result<(Arc<GdbBackend>, mpsc::UnboundedReceiver<MiEvent>), DebuggerError> {
        let version = version::probe_version(&options.gdb).await?;
        tracing::info!("GDB version {version}");

        let mut command = tokio::process::Command::new(&options.gdb);
        command.arg("--interpreter=mi2");
        command.args(&options.arguments);
        if let Some(cwd) = &options.cwd {
            command.current_dir(cwd);
        }
        for (key, value) in &options.environment {
            match value {
                Some(value) => {
                    command.env(key, value);
                }
                None => {
                    command.env_remove(key);
                }
            }
        }
        let mut child = command
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|error| {
                DebuggerError::UserMessage(format!("Failed to start {:?}: {error}", options.gdb))
            })?;

        let stdin = child.stdin.take().ok_or(DebuggerError::PipeClosed)?;
        let stdout = child.stdout.take().ok_or(DebuggerError::PipeClosed)?;
        let stderr = child.stderr.take().ok_or(DebuggerError::PipeClosed)?;
        let pid = child.id();

        let parser = MiParser::new();
        let utf8 = parser.utf8_flag();
        let pending = Arc::new(PendingCommands::new());
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (ready_tx, ready_rx) = watch::channel(false);

        tokio::spawn(read_mi_records(
            FramedRead::new(stdout, MiDecoder::new(parser)),
            Arc::clone(&pending),
            event_tx.clone(),
            ready_tx,
        ));
        tokio::spawn(read_stderr(BufReader::new(stderr), event_tx));

        let backend = Arc::new(GdbBackend {
            stdin: tokio::sync::Mutex::new(stdin),
            child: tokio::sync::Mutex::new(child),
            pid,
            pending,
            next_token: AtomicU64::new(1),
            version,
            async_mode: AtomicBool::new(false),
            non_stop: AtomicBool::new(false),
            utf8,
            ready: ready_rx,
        });
        Ok((backend, event_rx))
    }

    pub fn version(&self) -> &GdbVersion {
        &self.version
    }

    pub fn is_async(&self) -> bool {
        self.async_mode.load(Ordering::Relaxed)
    }

    pub fn is_non_stop(&self) -> bool {
        self.non_stop.load(Ordering::Relaxed)
    }

    /// Wait until the first `(gdb)` prompt has been seen.
    pub async fn wait_ready(&self) -> Result<(), DebuggerError> {
        let mut ready = self.ready.clone();
        while !*ready.borrow() {
            ready.changed().await.map_err(|_| DebuggerError::PipeClosed)?;
        }
        Ok(())
    }

    /// Send one MI command and wait for its result record.
    pub async fn send(&self, command: impl AsRef<str>) -> Result<MiResults, DebuggerError> {
        let (_token, rx) = self.send_tracked(command.as_ref()).await?;
        rx.await.map_err(|_| DebuggerError::PipeClosed)?
    }

    /// Send one MI command, returning its token and the pending result.
    /// The session uses the token to associate resume commands with the
    /// threads they move, so a late `^error` can retroactively stop them.
    pub async fn send_tracked(
        &self,
        command: &str,
    ) -> Result<
        (
            u64,
            oneshot::Receiver<Result<MiResults, DebuggerError>>,
        ),
        DebuggerError,
    > {
        let token = self.next_token.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.pending.register(token, command, tx)?;

        tracing::debug!("-> {token}{command}");
        let mut stdin = self.stdin.lock().await;
        let write = async {
            stdin
                .write_all(format!("{token}{command}\n").as_bytes())
                .await?;
            stdin.flush().await
        };
        if let Err(error) = write.await {
            tracing::warn!("GDB stdin write failed: {error}");
            self.pending.discard(token);
            self.pending.close();
            return Err(DebuggerError::PipeClosed);
        }
        Ok((token, rx))
    }

    /// Send a batch strictly sequentially, aborting on the first failure.
    pub async fn send_all(
        &self,
        commands: impl IntoIterator<Item = impl AsRef<str>>,
    ) -> Result<(), DebuggerError> {
        for command in commands {
            self.send(command.as_ref()).await?;
        }
        Ok(())
    }

    /// Run a CLI command through the console interpreter.
    pub async fn console_command(&self, command: &str) -> Result<MiResults, DebuggerError> {
        self.send(format!(
            "-interpreter-exec console {}",
            Quoted::always(command)
        ))
        .await
    }

    /// Interrupt the target: `-exec-interrupt` when MI async mode is
    /// active, SIGINT to the GDB process otherwise.
    pub async fn interrupt(&self, thread: Option<i64>) -> Result<(), DebuggerError> {
        if self.is_async() {
            let command = match thread {
                Some(thread) => format!("-exec-interrupt --thread {thread}"),
                None if self.is_non_stop() => "-exec-interrupt --all".to_string(),
                None => "-exec-interrupt".to_string(),
            };
            self.send(command).await?;
            return Ok(());
        }
        self.signal_interrupt()
    }

    #[cfg(unix)]
    fn signal_interrupt(&self) -> Result<(), DebuggerError> {
        let pid = self
            .pid
            .ok_or_else(|| DebuggerError::UserMessage("GDB process has exited".to_string()))?;
        nix::sys::signal::kill(
            nix::unistd::Pid::from_raw(pid as i32),
            nix::sys::signal::Signal::SIGINT,
        )
        .map_err(|error| {
            DebuggerError::UserMessage(format!("Failed to interrupt GDB: {error}"))
        })
    }

    #[cfg(not(unix))]
    fn signal_interrupt(&self) -> Result<(), DebuggerError> {
        Err(DebuggerError::UserMessage(
            "Interrupting a non-async GDB is not supported on this platform".to_string(),
        ))
    }

    /// Enable or disable non-stop mode. Must happen before the target
    /// starts. Failure forces the mode off and reports it as unsupported.
    pub async fn set_non_stop(&self, enable: bool) -> Result<(), DebuggerError> {
        if !enable {
            self.non_stop.store(false, Ordering::Relaxed);
            self.send("-gdb-set non-stop off").await?;
            return Ok(());
        }
        // Pagination blocks the prompt in non-stop mode.
        self.send("-gdb-set pagination off").await?;
        match self.send("-gdb-set non-stop on").await {
            Ok(_) => {
                self.non_stop.store(true, Ordering::Relaxed);
                Ok(())
            }
            Err(error) => {
                self.non_stop.store(false, Ordering::Relaxed);
                let _ = self.send("-gdb-set non-stop off").await;
                Err(DebuggerError::UserMessage(format!(
                    "non-stop mode is not supported by this GDB: {error}"
                )))
            }
        }
    }

    /// Request MI async mode. The flag name depends on the GDB version.
    /// Failure forces the mode off.
    pub async fn set_async(&self, enable: bool) -> Result<(), DebuggerError> {
        let flag = if self.version.supports_mi_async() {
            "mi-async"
        } else {
            "target-async"
        };
        let value = if enable { "on" } else { "off" };
        match self.send(format!("-gdb-set {flag} {value}")).await {
            Ok(_) => {
                self.async_mode.store(enable, Ordering::Relaxed);
                Ok(())
            }
            Err(error) => {
                tracing::warn!("Failed to set {flag} {value}: {error}");
                self.async_mode.store(false, Ordering::Relaxed);
                let _ = self.send(format!("-gdb-set {flag} off")).await;
                Ok(())
            }
        }
    }

    /// After a target is selected, ask it whether async execution is really
    /// supported and record the answer. Returns the actual mode.
    pub async fn confirm_async(&self) -> Result<bool, DebuggerError> {
        let results = self.send("-list-target-features").await?;
        let actual = results
            .results
            .list("features")
            .map(|features| {
                features
                    .iter()
                    .any(|feature| feature.as_str() == Some("async"))
            })
            .unwrap_or(false);
        self.async_mode.store(actual, Ordering::Relaxed);
        Ok(actual)
    }

    /// Probe GDB's supported charsets by provoking an error, and switch the
    /// parser out of UTF-8 mode for the Windows builds that only speak
    /// CP1252.
    pub async fn detect_charset(&self) {
        let Err(error) = self.send("-gdb-set charset").await else {
            return;
        };
        let message = error.to_string();
        if let Some(charsets) = parse_charset_list(&message) {
            if charset_list_is_cp1252_only(&charsets) {
                tracing::info!("GDB only supports CP1252; disabling UTF-8 decoding");
                self.utf8.store(false, Ordering::Relaxed);
            }
        }
    }

    /// Ask GDB to exit, then make sure the process is gone.
    pub async fn exit(&self) {
        let _ = self.send("-gdb-exit").await;
        let mut child = self.child.lock().await;
        let waited =
            tokio::time::timeout(std::time::Duration::from_secs(1), child.wait()).await;
        if waited.is_err() {
            tracing::warn!("GDB did not exit in time; killing it");
            let _ = child.kill().await;
        }
    }
}

/// Extract the list from "Requires an argument. Valid arguments are A, B.".
fn parse_charset_list(message: &str) -> Option<Vec<String>> {
    let (_, list) = message.split_once("Valid arguments are ")?;
    Some(
        list.trim_end()
            .trim_end_matches('.')
            .split(", ")
            .map(str::to_string)
            .collect(),
    )
}

fn charset_list_is_cp1252_only(charsets: &[String]) -> bool {
    charsets.len() == 2
        && charsets.iter().any(|c| c == "CP1252")
        && charsets.iter().any(|c| c == "auto")
}

async fn read_mi_records(
    mut records: FramedRead<tokio::process::ChildStdout, MiDecoder>,
    pending: Arc<PendingCommands>,
    events: mpsc::UnboundedSender<MiEvent>,
    ready: watch::Sender<bool>,
) {
    while let Some(record) = records.next().await {
        let record = match record {
            Ok(record) => record,
            Err(error) => {
                tracing::warn!("Error reading GDB output: {error}");
                break;
            }
        };
        match record {
            MiRecord::Result(result) => {
                tracing::debug!("<- {result:?}");
                if let Some(unmatched) = pending.complete(result) {
                    tracing::debug!("Result with no pending command: {unmatched:?}");
                    let _ = events.send(MiEvent::Result(unmatched));
                }
            }
            MiRecord::Async(record) => {
                tracing::debug!("<- {record:?}");
                let event = match record.kind {
                    gdb_mi::AsyncKind::Exec => MiEvent::Exec(record),
                    gdb_mi::AsyncKind::Status => MiEvent::Status(record),
                    gdb_mi::AsyncKind::Notify => MiEvent::Notify(record),
                };
                let _ = events.send(event);
            }
            MiRecord::Stream(stream) => {
                let _ = events.send(MiEvent::Stream(stream));
            }
            MiRecord::Prompt => {
                ready.send_replace(true);
            }
        }
    }
    tracing::info!("GDB output stream closed");
    pending.close();
    let _ = events.send(MiEvent::Closed);
}

async fn read_stderr(
    stderr: BufReader<tokio::process::ChildStderr>,
    events: mpsc::UnboundedSender<MiEvent>,
) {
    let mut lines = stderr.lines();
    while let Ok(Some(line)) = lines.next_line().await {
        let _ = events.send(MiEvent::Stderr(line));
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use gdb_mi::{MiTuple, MiValue};
    use pretty_assertions::assert_eq;

    use super::*;

    fn result_record(token: Option<u64>, class: ResultClass, results: MiTuple) -> ResultRecord {
        ResultRecord {
            token,
            class,
            results,
        }
    }

    #[tokio::test]
    async fn each_token_resolves_exactly_once() {
        let pending = PendingCommands::new();
        let (tx, rx) = oneshot::channel();
        pending.register(7, "-thread-info", tx).unwrap();

        let mut results = MiTuple::new();
        results.push("threads", MiValue::List(vec![]));
        assert!(pending
            .complete(result_record(Some(7), ResultClass::Done, results))
            .is_none());

        let completed = rx.await.unwrap().unwrap();
        assert_eq!(completed.token, 7);
        assert_eq!(completed.command, "-thread-info");
        assert_eq!(completed.class, ResultClass::Done);

        // A late second result for the same token goes to the side channel.
        let late = pending.complete(result_record(Some(7), ResultClass::Error, MiTuple::new()));
        assert!(late.is_some());
    }

    #[tokio::test]
    async fn error_results_fail_the_waiter_with_the_mi_message() {
        let pending = PendingCommands::new();
        let (tx, rx) = oneshot::channel();
        pending.register(3, "-break-insert nowhere", tx).unwrap();

        let mut results = MiTuple::new();
        results.push(
            "msg",
            MiValue::Const("No symbol table is loaded.".to_string()),
        );
        pending.complete(result_record(Some(3), ResultClass::Error, results));

        let error = rx.await.unwrap().unwrap_err();
        assert_eq!(error.to_string(), "No symbol table is loaded.");
    }

    #[tokio::test]
    async fn close_rejects_outstanding_and_future_registrations() {
        let pending = PendingCommands::new();
        let (tx, rx) = oneshot::channel();
        pending.register(1, "-exec-continue", tx).unwrap();

        pending.close();

        assert!(matches!(
            rx.await.unwrap(),
            Err(DebuggerError::PipeClosed)
        ));
        let (tx, _rx) = oneshot::channel();
        assert!(matches!(
            pending.register(2, "-exec-continue", tx),
            Err(DebuggerError::PipeClosed)
        ));
    }

    #[test]
    fn unknown_tokens_surface_on_the_side_channel() {
        let pending = PendingCommands::new();
        let unmatched =
            pending.complete(result_record(Some(99), ResultClass::Done, MiTuple::new()));
        assert_eq!(unmatched.unwrap().token, Some(99));
    }

    #[test]
    fn charset_list_extraction() {
        let charsets = parse_charset_list(
            "Requires an argument. Valid arguments are auto, ISO-8859-1, UTF-8.",
        )
        .unwrap();
        assert_eq!(charsets, vec!["auto", "ISO-8859-1", "UTF-8"]);
        assert!(!charset_list_is_cp1252_only(&charsets));

        let charsets =
            parse_charset_list("Requires an argument. Valid arguments are CP1252, auto.").unwrap();
        assert!(charset_list_is_cp1252_only(&charsets));
    }
}
