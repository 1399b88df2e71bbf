//! The debug session: lifecycle, the pause/resume bracket, and the
//! translation of MI async records into DAP events.
//!
//! Request handlers run as concurrent tasks over one shared session; all
//! mutable bookkeeping lives in [`SessionState`] behind a short-lived lock
//! that is never held across an await point.

use std::sync::Arc;

use gdb_mi::{AsyncRecord, MiTuple, MiValue, ResultClass, StreamKind};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::adapter::dap_types::{
    Breakpoint, BreakpointEventBody, BreakpointMode, Capabilities, ContinuedEventBody,
    ExecuteCommandArguments, ExecuteCommandResponseBody, ExitedEventBody, Request,
    StoppedEventBody, TerminatedEventBody, ThreadEventBody,
};
use crate::adapter::protocol::ClientHandle;
use crate::gdb::{GdbBackend, GdbSpawnOptions, MiEvent, MiResults, Quoted};
use crate::server::configuration::SessionConfig;
use crate::server::state::{
    ResumeAction, ResumeScope, RunningSpec, SessionState, StopInfo, StoppedOutcome,
};
use crate::DebuggerError;

/// Deserialize a request's `arguments`.
pub(crate) fn get_arguments<T: DeserializeOwned>(request: &Request) -> Result<T, DebuggerError> {
    let arguments = request.arguments.clone().unwrap_or(Value::Null);
    serde_json::from_value(arguments).map_err(DebuggerError::from)
}

/// The capabilities announced by the `initialize` response.
pub fn capabilities() -> Capabilities {
    Capabilities {
        supports_configuration_done_request: Some(true),
        supports_conditional_breakpoints: Some(true),
        supports_hit_conditional_breakpoints: Some(true),
        supports_log_points: Some(true),
        supports_function_breakpoints: Some(true),
        supports_instruction_breakpoints: Some(true),
        supports_data_breakpoints: Some(true),
        supports_disassemble_request: Some(true),
        supports_read_memory_request: Some(true),
        supports_write_memory_request: Some(true),
        supports_stepping_granularity: Some(true),
        supports_terminate_request: Some(true),
        supports_evaluate_for_hovers: Some(true),
        supports_set_variable: Some(true),
        breakpoint_modes: Some(vec![
            BreakpointMode {
                mode: "hardware".to_string(),
                label: "Hardware Breakpoint".to_string(),
                description: None,
                applies_to: vec!["source".to_string(), "instruction".to_string()],
            },
            BreakpointMode {
                mode: "software".to_string(),
                label: "Software Breakpoint".to_string(),
                description: None,
                applies_to: vec!["source".to_string(), "instruction".to_string()],
            },
        ]),
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SessionKind {
    Launch,
    Attach,
}

pub struct DebugSession {
    pub(crate) backend: Arc<GdbBackend>,
    pub(crate) client: ClientHandle,
    pub(crate) config: SessionConfig,
    pub(crate) state: parking_lot::Mutex<SessionState>,
}

impl DebugSession {
    /// Spawn GDB and run the launch/attach setup sequence. On success the
    /// session has entered the configuration phase and the caller should
    /// emit the `initialized` event.
    pub async fn start(
        config: SessionConfig,
        client: ClientHandle,
        kind: SessionKind,
    ) -> Result<Arc<DebugSession>, DebuggerError> {
        if config.open_gdb_console {
            client.output(
                "important",
                "openGdbConsole is not supported on this build; GDB runs headless.\n",
            );
        }

        let spawn_options = GdbSpawnOptions {
            gdb: config.gdb.clone(),
            arguments: config.gdb_arguments.clone(),
            cwd: config.cwd.clone(),
            environment: config
                .environment
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        };
        let (backend, events) = GdbBackend::spawn(&spawn_options).await?;

        let session = Arc::new(DebugSession {
            backend,
            client,
            config,
            state: parking_lot::Mutex::new(SessionState::new()),
        });
        tokio::spawn(Arc::clone(&session).run_event_loop(events));

        session.backend.wait_ready().await?;
        session.initialize_gdb(kind).await?;

        {
            let mut state = session.state.lock();
            state.is_attach = kind == SessionKind::Attach;
            state.remote = session.config.is_remote();
            state.non_stop = session.backend.is_non_stop();
            state.enter_configuration_phase();
        }
        Ok(session)
    }

    /// The MI setup sequence for launch/attach.
    async fn initialize_gdb(&self, kind: SessionKind) -> Result<(), DebuggerError> {
        let backend = &self.backend;
        let config = &self.config;

        backend
            .send_all(["-gdb-set confirm off", "-gdb-set pagination off"])
            .await?;
        backend.detect_charset().await;

        if config.gdb_non_stop {
            if let Err(error) = backend.set_non_stop(true).await {
                self.client
                    .output("important", format!("{error}\n"));
            }
        }
        if config.wants_async() {
            backend.set_async(true).await?;
        }

        if let Some(program) = &config.program {
            backend
                .send(format!("-file-exec-and-symbols {}", Quoted::new(program)))
                .await?;
        } else if kind == SessionKind::Launch && !config.is_remote() {
            return Err(DebuggerError::UserMessage(
                "The launch request requires a program".to_string(),
            ));
        }

        backend.send("-enable-pretty-printing").await?;

        if let Some(image_and_symbols) = &config.image_and_symbols {
            if let Some(symbol_file) = &image_and_symbols.symbol_file_name {
                match &image_and_symbols.symbol_offset {
                    Some(offset) => {
                        backend
                            .console_command(&format!(
                                "add-symbol-file {} -o {offset}",
                                Quoted::new(symbol_file)
                            ))
                            .await?;
                    }
                    None => {
                        backend
                            .send(format!("-file-symbol-file {}", Quoted::new(symbol_file)))
                            .await?;
                    }
                }
            }
        }

        match (&config.target, kind) {
            (Some(target), _) => {
                let connect = target.connect_parameters().ok_or_else(|| {
                    DebuggerError::UserMessage(
                        "The remote target needs a host/port or parameters".to_string(),
                    )
                })?;
                let target_type = target.type_.as_deref().unwrap_or("remote");
                backend
                    .send(format!("-target-select {target_type} {connect}"))
                    .await?;
            }
            (None, SessionKind::Attach) => {
                let pid = config.pid.ok_or_else(|| {
                    DebuggerError::UserMessage(
                        "The attach request requires a processId".to_string(),
                    )
                })?;
                backend.send(format!("-target-attach {pid}")).await?;
            }
            (None, SessionKind::Launch) => {
                if config.wants_async() {
                    // Selecting the native target early lets
                    // `-list-target-features` answer the async probe.
                    let _ = backend.send("-target-select native").await;
                }
            }
        }

        if config.wants_async() {
            let actual = backend.confirm_async().await.unwrap_or(false);
            if !actual {
                self.client.output(
                    "important",
                    "The selected target does not support asynchronous execution; \
                     commands that need a running target will pause it instead.\n",
                );
            }
        }

        backend.send_all(&config.init_commands).await?;

        if kind == SessionKind::Launch {
            if let Some(arguments) = &config.arguments {
                backend.send(format!("-exec-arguments {arguments}")).await?;
            }
        }

        // Attach and remote targets may already have threads.
        if kind == SessionKind::Attach || config.is_remote() {
            let _ = self.refresh_threads().await;
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Pause / resume bracket
    // ------------------------------------------------------------------

    /// Make sure the target is stopped before mutating GDB state. Returns
    /// whether a matching [`continue_if_needed`](Self::continue_if_needed)
    /// is owed.
    pub(crate) async fn pause_if_needed(&self) -> Result<bool, DebuggerError> {
        let action = self.state.lock().begin_pause();
        match action {
            crate::server::state::PauseAction::NotNeeded => Ok(false),
            crate::server::state::PauseAction::Joined => Ok(true),
            crate::server::state::PauseAction::Wait(waiter) => {
                waiter.await.map_err(|_| DebuggerError::PipeClosed)?;
                Ok(true)
            }
            crate::server::state::PauseAction::Interrupt(waiter) => {
                if let Err(error) = self.backend.interrupt(None).await {
                    self.state.lock().abort_pause();
                    return Err(error);
                }
                waiter.await.map_err(|_| DebuggerError::PipeClosed)?;
                Ok(true)
            }
        }
    }

    /// Close a pause bracket. The last close resumes the target.
    pub(crate) async fn continue_if_needed(&self, counted: bool) -> Result<(), DebuggerError> {
        if !counted {
            return Ok(());
        }
        let action = self.state.lock().end_pause();
        match action {
            ResumeAction::None => Ok(()),
            ResumeAction::Continue => {
                let command = if self.backend.is_non_stop() {
                    "-exec-continue --all"
                } else {
                    "-exec-continue"
                };
                self.resume_command(command.to_string(), ResumeScope::All)
                    .await?;
                Ok(())
            }
            ResumeAction::InitialResume => self.initial_resume().await,
        }
    }

    /// The resume that ends the configuration phase: run `preRunCommands`,
    /// then start (launch) or continue (attach/remote) the inferior.
    async fn initial_resume(&self) -> Result<(), DebuggerError> {
        self.backend.send_all(&self.config.pre_run_commands).await?;

        if self.config.is_remote() {
            if let Some(image_and_symbols) = &self.config.image_and_symbols {
                if let Some(image) = &image_and_symbols.image_file_name {
                    let offset = image_and_symbols.image_offset.as_deref().unwrap_or("");
                    self.backend
                        .console_command(&format!("load {} {offset}", Quoted::new(image)))
                        .await?;
                }
            }
        }

        let (is_attach, remote) = {
            let state = self.state.lock();
            (state.is_attach, state.remote)
        };
        let verb = if is_attach || remote {
            "-exec-continue"
        } else {
            "-exec-run"
        };
        self.resume_command(verb.to_string(), ResumeScope::All)
            .await?;
        Ok(())
    }

    /// Send a resume-verb command with token tracking, so a failure (even a
    /// late one) can retroactively stop the threads it claimed to move.
    pub(crate) async fn resume_command(
        &self,
        command: String,
        scope: ResumeScope,
    ) -> Result<MiResults, DebuggerError> {
        let (token, pending) = self.backend.send_tracked(&command).await?;
        self.state.lock().record_resume_token(token, scope);
        let result = pending.await.map_err(|_| DebuggerError::PipeClosed)?;
        self.finish_resume(token, result)
    }

    /// Shared tail of [`resume_command`]; also used by the stepping path
    /// after its response timeout.
    pub(crate) fn finish_resume(
        &self,
        token: u64,
        result: Result<MiResults, DebuggerError>,
    ) -> Result<MiResults, DebuggerError> {
        match result {
            Ok(results) => {
                self.state.lock().clear_resume_token(token);
                Ok(results)
            }
            Err(error) => {
                let stops = self.state.lock().resume_failed(token);
                for (thread_id, all_threads) in stops {
                    self.emit_stopped("generic", thread_id, all_threads);
                }
                Err(error)
            }
        }
    }

    // ------------------------------------------------------------------
    // Lifecycle requests
    // ------------------------------------------------------------------

    pub(crate) async fn configuration_done(&self, request: &Request) -> anyhow::Result<()> {
        let held = self.state.lock().finish_configuration();
        match self.continue_if_needed(held).await {
            Ok(()) => self.client.send_response::<()>(request, Ok(None)),
            Err(error) => self.client.send_response::<()>(request, Err(&error)),
        }
    }

    pub(crate) async fn disconnect(&self, request: &Request) -> anyhow::Result<()> {
        // Map entries die with the session; the GDB-side varobjs die with
        // GDB itself.
        self.state.lock().varobjs.drain();
        self.backend.exit().await;
        self.client.send_response::<()>(request, Ok(None))
    }

    pub(crate) async fn terminate(&self, request: &Request) -> anyhow::Result<()> {
        let result = match self.pause_if_running().await {
            Ok(()) => self.backend.console_command("kill").await.map(|_| ()),
            Err(error) => Err(error),
        };
        match result {
            Ok(()) => {
                self.client.send_response::<()>(request, Ok(None))?;
                self.client
                    .send_event("terminated", Some(TerminatedEventBody { restart: None }))
            }
            Err(error) => self.client.send_response::<()>(request, Err(&error)),
        }
    }

    /// The custom reset request: silently pause if running, then run the
    /// configured reset commands.
    pub(crate) async fn custom_reset(&self, request: &Request) -> anyhow::Result<()> {
        let result = match self.pause_if_running().await {
            Ok(()) => self.backend.send_all(&self.config.custom_reset_commands).await,
            Err(error) => Err(error),
        };
        match result {
            Ok(()) => self.client.send_response::<()>(request, Ok(None)),
            Err(error) => self.client.send_response::<()>(request, Err(&error)),
        }
    }

    /// Pause without a bracket: the stop is suppressed and nothing resumes
    /// the target afterwards.
    pub(crate) async fn pause_if_running(&self) -> Result<(), DebuggerError> {
        let waiter = self.state.lock().begin_silent_pause();
        let Some(waiter) = waiter else {
            return Ok(());
        };
        self.backend.interrupt(None).await?;
        waiter.await.map_err(|_| DebuggerError::PipeClosed)
    }

    /// The `cdt-gdb-tests/executeCommand` tunnel: run an arbitrary command,
    /// return the MI result and the console output captured while it ran.
    pub(crate) async fn execute_command(&self, request: &Request) -> anyhow::Result<()> {
        let arguments: ExecuteCommandArguments = match get_arguments(request) {
            Ok(arguments) => arguments,
            Err(error) => return self.client.send_response::<()>(request, Err(&error)),
        };

        self.state.lock().console_capture = Some(String::new());
        let result = if arguments.command.starts_with('-') {
            self.backend.send(&arguments.command).await
        } else {
            self.backend.console_command(&arguments.command).await
        };
        let console = self
            .state
            .lock()
            .console_capture
            .take()
            .unwrap_or_default();

        match result {
            Ok(results) => self.client.send_response(
                request,
                Ok(Some(ExecuteCommandResponseBody {
                    result: mi_tuple_to_json(&results.results),
                    console,
                })),
            ),
            Err(error) => self.client.send_response::<()>(request, Err(&error)),
        }
    }

    // ------------------------------------------------------------------
    // Thread bookkeeping
    // ------------------------------------------------------------------

    pub(crate) async fn refresh_threads(&self) -> Result<(), DebuggerError> {
        let results = self.backend.send("-thread-info").await?;
        let threads = parse_thread_info(&results.results);
        self.state.lock().update_threads(threads);
        Ok(())
    }

    /// Whether `-thread-info` is safe right now: the target is stopped, or
    /// the MI channel stays usable while it runs (async non-stop, or async
    /// all-stop on a local target).
    pub(crate) fn can_query_while_running(&self) -> bool {
        let state = self.state.lock();
        self.backend.is_async() && (state.non_stop || !state.remote)
    }

    // ------------------------------------------------------------------
    // MI event handling
    // ------------------------------------------------------------------

    async fn run_event_loop(self: Arc<Self>, mut events: mpsc::UnboundedReceiver<MiEvent>) {
        while let Some(event) = events.recv().await {
            match event {
                MiEvent::Closed => {
                    self.on_backend_closed();
                    break;
                }
                event => self.handle_mi_event(event).await,
            }
        }
    }

    fn on_backend_closed(&self) {
        let already_exited = {
            let mut state = self.state.lock();
            let already = state.exited;
            state.exited = true;
            already
        };
        if !already_exited {
            let _ = self
                .client
                .send_event("terminated", Some(TerminatedEventBody { restart: None }));
        }
    }

    async fn handle_mi_event(&self, event: MiEvent) {
        match event {
            MiEvent::Exec(record) => self.handle_exec_record(record).await,
            MiEvent::Status(record) => {
                tracing::debug!("status async: {}={}", record.class, record.results);
            }
            MiEvent::Notify(record) => self.handle_notify_record(&record).await,
            MiEvent::Stream(stream) => match stream.kind {
                StreamKind::Console => {
                    let captured = {
                        let mut state = self.state.lock();
                        match state.console_capture.as_mut() {
                            Some(buffer) => {
                                buffer.push_str(&stream.text);
                                true
                            }
                            None => false,
                        }
                    };
                    if !captured {
                        self.client.output("console", stream.text);
                    }
                }
                StreamKind::Target => {
                    self.client.output("stdout", stream.text);
                }
                StreamKind::Log => {
                    tracing::debug!("gdb: {}", stream.text.trim_end());
                }
            },
            MiEvent::Stderr(line) => {
                self.client.output("stderr", format!("{line}\n"));
            }
            MiEvent::Result(record) => {
                // The side channel: results with no waiter. A late ^error
                // for a resume token still has to stop its threads.
                tracing::debug!("unmatched result record: {:?}", record);
                if record.class == ResultClass::Error {
                    if let Some(token) = record.token {
                        let stops = self.state.lock().resume_failed(token);
                        for (thread_id, all_threads) in stops {
                            self.emit_stopped("generic", thread_id, all_threads);
                        }
                    }
                }
            }
            MiEvent::Closed => {}
        }
    }

    async fn handle_exec_record(&self, record: AsyncRecord) {
        match record.class.as_str() {
            "running" => {
                let spec = match record.results.string("thread-id") {
                    Some("all") | None => RunningSpec::All,
                    Some(id) => match id.parse() {
                        Ok(id) => RunningSpec::Thread(id),
                        Err(_) => RunningSpec::All,
                    },
                };
                let events = self.state.lock().mark_running(&spec, None);
                for event in events {
                    let _ = self.client.send_event(
                        "continued",
                        Some(ContinuedEventBody {
                            thread_id: event.thread_id,
                            all_threads_continued: Some(event.all_threads),
                        }),
                    );
                }
            }
            "stopped" => {
                let info = parse_stop_info(&record.results);
                let outcome = self.state.lock().note_stopped(&info);
                match outcome {
                    StoppedOutcome::Silent => {}
                    StoppedOutcome::Logpoint { message, thread_id } => {
                        let text = self.expand_log_message(&message).await;
                        self.client.output("console", format!("{text}\n"));
                        let command = if self.backend.is_non_stop() {
                            format!("-exec-continue --thread {thread_id}")
                        } else {
                            "-exec-continue".to_string()
                        };
                        // Safe to await here: the result is resolved by the
                        // reader task, not by this loop.
                        if let Err(error) = self
                            .resume_command(command, ResumeScope::Thread(thread_id))
                            .await
                        {
                            tracing::warn!("logpoint auto-resume failed: {error}");
                        }
                    }
                    StoppedOutcome::Event {
                        reason,
                        thread_id,
                        all_threads,
                    } => {
                        // A thread created while running may still lack its
                        // name; refresh now that the target is stopped.
                        let refresh = self.state.lock().missing_thread_names;
                        if refresh {
                            let _ = self.refresh_threads().await;
                        }
                        self.emit_stopped(&reason, thread_id, all_threads);
                    }
                    StoppedOutcome::Terminated => {
                        let _ = self
                            .client
                            .send_event("terminated", Some(TerminatedEventBody { restart: None }));
                        let _ = self.client.send_event(
                            "exited",
                            Some(ExitedEventBody {
                                exit_code: info.exit_code.unwrap_or(0),
                            }),
                        );
                    }
                }
            }
            other => {
                tracing::debug!("unhandled exec async record: {other}");
            }
        }
    }

    async fn handle_notify_record(&self, record: &AsyncRecord) {
        match record.class.as_str() {
            "thread-created" => {
                let Some(id) = record.results.int("id") else {
                    return;
                };
                self.state
                    .lock()
                    .note_thread_created(id, record.results.string("name"));
                let _ = self.client.send_event(
                    "thread",
                    Some(ThreadEventBody {
                        reason: "started".to_string(),
                        thread_id: id,
                    }),
                );
                // Thread names only arrive via -thread-info; fetch them now
                // if the MI channel allows it while running.
                let missing_names = self.state.lock().missing_thread_names;
                if missing_names && self.can_query_while_running() {
                    let _ = self.refresh_threads().await;
                }
            }
            "thread-exited" => {
                let Some(id) = record.results.int("id") else {
                    return;
                };
                self.state.lock().note_thread_exited(id);
                let _ = self.client.send_event(
                    "thread",
                    Some(ThreadEventBody {
                        reason: "exited".to_string(),
                        thread_id: id,
                    }),
                );
            }
            "breakpoint-created" => self.emit_breakpoint_event("new", record),
            "breakpoint-modified" => self.emit_breakpoint_event("changed", record),
            "breakpoint-deleted" => {
                if let Some(id) = record.results.int("id") {
                    self.state.lock().logpoints.remove(&id);
                    let _ = self.client.send_event(
                        "breakpoint",
                        Some(BreakpointEventBody {
                            reason: "removed".to_string(),
                            breakpoint: Breakpoint {
                                id: Some(id),
                                verified: false,
                                ..Default::default()
                            },
                        }),
                    );
                }
            }
            other => {
                tracing::debug!("unhandled notify record: {other}");
            }
        }
    }

    fn emit_breakpoint_event(&self, reason: &str, record: &AsyncRecord) {
        let Some(bkpt) = record.results.tuple("bkpt") else {
            return;
        };
        // Temporary breakpoints on their way out are not worth reporting.
        if bkpt.string("disp") == Some("del") {
            return;
        }
        let breakpoint = Breakpoint {
            id: bkpt.int("number"),
            verified: true,
            line: bkpt.int("line"),
            source: bkpt.string("fullname").or(bkpt.string("file")).map(|path| {
                crate::adapter::dap_types::Source {
                    name: std::path::Path::new(path)
                        .file_name()
                        .map(|n| n.to_string_lossy().into_owned()),
                    path: Some(path.to_string()),
                }
            }),
            instruction_reference: bkpt.string("addr").map(str::to_string),
            ..Default::default()
        };
        let _ = self.client.send_event(
            "breakpoint",
            Some(BreakpointEventBody {
                reason: reason.to_string(),
                breakpoint,
            }),
        );
    }

    pub(crate) fn emit_stopped(&self, reason: &str, thread_id: i64, all_threads: bool) {
        let _ = self.client.send_event(
            "stopped",
            Some(StoppedEventBody {
                reason: reason.to_string(),
                description: None,
                thread_id: Some(thread_id),
                preserve_focus_hint: None,
                text: None,
                all_threads_stopped: Some(all_threads),
                hit_breakpoint_ids: None,
            }),
        );
    }

    /// Interpolate `{expression}` segments of a logpoint template by
    /// evaluating them in the stopped target.
    async fn expand_log_message(&self, template: &str) -> String {
        let re = regex::Regex::new(r"\{([^{}]+)\}").unwrap_or_else(|_| unreachable!());
        let mut output = String::new();
        let mut last = 0;
        for captures in re.captures_iter(template) {
            let whole = captures.get(0).map(|m| (m.start(), m.end())).unwrap_or((0, 0));
            output.push_str(&template[last..whole.0]);
            let expression = &captures[1];
            let value = self
                .backend
                .send(format!(
                    "-data-evaluate-expression {}",
                    Quoted::always(expression)
                ))
                .await
                .ok()
                .and_then(|r| r.results.string("value").map(str::to_string));
            match value {
                Some(value) => output.push_str(&value),
                None => output.push_str(&template[whole.0..whole.1]),
            }
            last = whole.1;
        }
        output.push_str(&template[last..]);
        output
    }
}

/// Pull the interesting fields out of a `*stopped` record.
pub(crate) fn parse_stop_info(results: &MiTuple) -> StopInfo {
    StopInfo {
        thread_id: results.int("thread-id"),
        all_threads: results.string("stopped-threads") == Some("all"),
        reason: results.string("reason").map(str::to_string),
        bkptno: results.int("bkptno"),
        signal_name: results.string("signal-name").map(str::to_string),
        exit_code: results.int("exit-code"),
    }
}

/// Parse a `-thread-info` result into `(id, name, running)` rows.
pub(crate) fn parse_thread_info(results: &MiTuple) -> Vec<(i64, Option<String>, bool)> {
    let Some(threads) = results.list("threads") else {
        return Vec::new();
    };
    threads
        .iter()
        .filter_map(|thread| {
            let tuple = thread.as_tuple()?;
            let id = tuple.int("id")?;
            let name = tuple
                .string("name")
                .or_else(|| tuple.string("target-id"))
                .map(str::to_string);
            let running = tuple.string("state") == Some("running");
            Some((id, name, running))
        })
        .collect()
}

/// Render MI results as JSON for the executeCommand tunnel.
pub(crate) fn mi_tuple_to_json(tuple: &MiTuple) -> Value {
    let mut map = serde_json::Map::new();
    for (key, value) in tuple.iter() {
        map.insert(key.to_string(), mi_value_to_json(value));
    }
    Value::Object(map)
}

fn mi_value_to_json(value: &MiValue) -> Value {
    match value {
        MiValue::Const(text) => Value::String(text.clone()),
        MiValue::Tuple(tuple) => mi_tuple_to_json(tuple),
        MiValue::List(list) => Value::Array(list.iter().map(mi_value_to_json).collect()),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use gdb_mi::{MiParser, MiRecord};
    use pretty_assertions::assert_eq;

    use super::*;

    fn results_of(line: &str) -> MiTuple {
        match MiParser::new().parse_line(line.as_bytes()) {
            MiRecord::Result(record) => record.results,
            MiRecord::Async(record) => record.results,
            other => panic!("unexpected record {other:?}"),
        }
    }

    #[test]
    fn stop_info_extraction() {
        let results = results_of(
            r#"*stopped,reason="breakpoint-hit",disp="keep",bkptno="1",thread-id="2",stopped-threads="all""#,
        );
        let info = parse_stop_info(&results);
        assert_eq!(info.thread_id, Some(2));
        assert!(info.all_threads);
        assert_eq!(info.reason.as_deref(), Some("breakpoint-hit"));
        assert_eq!(info.bkptno, Some(1));
    }

    #[test]
    fn thread_info_parsing() {
        let results = results_of(
            r#"^done,threads=[{id="1",target-id="Thread 0x7f",name="mythreadname",state="stopped"},{id="2",target-id="Thread 0x80",state="running"}],current-thread-id="1""#,
        );
        let threads = parse_thread_info(&results);
        assert_eq!(
            threads,
            vec![
                (1, Some("mythreadname".to_string()), false),
                (2, Some("Thread 0x80".to_string()), true),
            ]
        );
    }

    #[test]
    fn mi_results_render_as_json() {
        let results = results_of(r#"^done,value="7",list=["a","b"],t={x="1"}"#);
        let json = mi_tuple_to_json(&results);
        assert_eq!(
            json,
            serde_json::json!({"value": "7", "list": ["a", "b"], "t": {"x": "1"}})
        );
    }

    #[test]
    fn capabilities_include_the_breakpoint_modes() {
        let caps = capabilities();
        assert_eq!(caps.supports_configuration_done_request, Some(true));
        let modes = caps.breakpoint_modes.unwrap();
        assert_eq!(modes.len(), 2);
        assert!(modes.iter().any(|m| m.mode == "hardware"));
        assert!(modes.iter().any(|m| m.mode == "software"));
    }
}
