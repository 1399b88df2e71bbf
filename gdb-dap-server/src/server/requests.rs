//! DAP request handlers. Each handler parses its arguments, drives the
//! backend, and sends its own response; recoverable per-item failures
//! degrade to `verified = false` entries instead of failing the batch.

use std::sync::Arc;

use gdb_mi::MiTuple;
use itertools::Itertools;

use crate::adapter::dap_types::{
    Breakpoint, ContinueArguments, ContinueResponseBody, DataBreakpointInfoArguments,
    DataBreakpointInfoResponseBody, EvaluateArguments, EvaluateResponseBody,
    MemoryContents, MemoryRequestArguments, NextArguments, PauseArguments,
    ReadMemoryArguments, ReadMemoryResponseBody, Request, Scope, ScopesArguments,
    ScopesResponseBody, SetBreakpointsArguments, SetBreakpointsResponseBody,
    SetDataBreakpointsArguments, SetFunctionBreakpointsArguments,
    SetInstructionBreakpointsArguments, SetVariableArguments, SetVariableResponseBody, Source,
    SourceBreakpoint, StackFrame, StackTraceArguments, StackTraceResponseBody, StepInArguments,
    StepOutArguments, Thread, ThreadsResponseBody, Variable, VariablesArguments,
    VariablesResponseBody, WriteMemoryArguments, WriteMemoryResponseBody,
};
use crate::gdb::{MiResults, Quoted};
use crate::server::breakpoints::{
    data_insert_command, file_matches, function_insert_command, instruction_insert_command,
    parse_break_list, resolve_data_breakpoints, resolve_function_breakpoints,
    resolve_instruction_breakpoints, resolve_source_breakpoints, source_insert_command,
    MiBreakpoint,
};
use crate::server::memory::{base64_to_hex, hex_to_base64};
use crate::server::session::{get_arguments, DebugSession};
use crate::server::state::{
    BreakpointRequestKind, FrameReference, ResumeScope, VariableReference,
};
use crate::server::variables::{VarObj, VariableScope};
use crate::DebuggerError;

impl DebugSession {
    // ------------------------------------------------------------------
    // Threads and stacks
    // ------------------------------------------------------------------

    pub(crate) async fn threads(&self, request: &Request) -> anyhow::Result<()> {
        let (running, missing_names) = {
            let state = self.state.lock();
            (state.is_running(), state.missing_thread_names)
        };
        let should_refresh = !running || (missing_names && self.can_query_while_running());
        if should_refresh {
            match self.refresh_threads().await {
                Ok(()) => {}
                Err(error) if error.is_thread_running() => {
                    // Benign race in async all-stop: serve the cache.
                    tracing::debug!("thread refresh refused: {error}");
                }
                Err(error) => {
                    tracing::debug!("thread refresh failed: {error}");
                }
            }
        }

        let mut threads: Vec<Thread> = self
            .state
            .lock()
            .threads
            .iter()
            .map(|t| Thread {
                id: t.id,
                name: t.name.clone(),
            })
            .collect();
        threads.sort_by_key(|t| t.id);
        self.client
            .send_response(request, Ok(Some(ThreadsResponseBody { threads })))
    }

    pub(crate) async fn stack_trace(&self, request: &Request) -> anyhow::Result<()> {
        let arguments: StackTraceArguments = match get_arguments(request) {
            Ok(arguments) => arguments,
            Err(error) => return self.client.send_response::<()>(request, Err(&error)),
        };
        match self.build_stack_trace(&arguments).await {
            Ok(body) => self.client.send_response(request, Ok(Some(body))),
            Err(error) if error.is_thread_running() => {
                tracing::debug!("stackTrace while running: {error}");
                self.client.send_plain_failure(request)
            }
            Err(error) => self.client.send_response::<()>(request, Err(&error)),
        }
    }

    async fn build_stack_trace(
        &self,
        arguments: &StackTraceArguments,
    ) -> Result<StackTraceResponseBody, DebuggerError> {
        let thread_id = arguments.thread_id;
        let depth = self.stack_depth(thread_id).await?;

        let start_frame = arguments.start_frame.unwrap_or(0).max(0);
        let levels = match arguments.levels {
            Some(levels) if levels > 0 => levels,
            _ => depth,
        };
        let high_frame = (start_frame + levels).min(depth) - 1;
        if high_frame < start_frame {
            return Ok(StackTraceResponseBody {
                stack_frames: Vec::new(),
                total_frames: Some(depth),
            });
        }

        let results = self
            .backend
            .send(format!(
                "-stack-list-frames --thread {thread_id} {start_frame} {high_frame}"
            ))
            .await?;

        let mut stack_frames = Vec::new();
        for frame in parse_stack_frames(&results.results) {
            let handle = self.state.lock().frame_handles.create(FrameReference {
                thread_id,
                frame_level: frame.level,
            });
            stack_frames.push(StackFrame {
                id: handle,
                name: frame.func.unwrap_or_else(|| format!("{:#x}", frame.addr)),
                source: frame.fullname.or(frame.file).map(|path| Source {
                    name: std::path::Path::new(&path)
                        .file_name()
                        .map(|n| n.to_string_lossy().into_owned()),
                    path: Some(path),
                }),
                line: frame.line.unwrap_or(0),
                column: 1,
                instruction_pointer_reference: Some(format!("{:#x}", frame.addr)),
            });
        }
        Ok(StackTraceResponseBody {
            stack_frames,
            total_frames: Some(depth),
        })
    }

    /// `-stack-info-depth`, capped at 100 so a corrupted stack cannot wedge
    /// the UI.
    async fn stack_depth(&self, thread_id: i64) -> Result<i64, DebuggerError> {
        let results = self
            .backend
            .send(format!("-stack-info-depth --thread {thread_id} 100"))
            .await?;
        Ok(results.results.int("depth").unwrap_or(0))
    }

    // ------------------------------------------------------------------
    // Execution control
    // ------------------------------------------------------------------

    pub(crate) async fn continue_request(&self, request: &Request) -> anyhow::Result<()> {
        let arguments: ContinueArguments = match get_arguments(request) {
            Ok(arguments) => arguments,
            Err(error) => return self.client.send_response::<()>(request, Err(&error)),
        };

        let non_stop = self.backend.is_non_stop();
        let (command, scope, all_threads_continued) = if non_stop && arguments.thread_id != 0 {
            (
                format!("-exec-continue --thread {}", arguments.thread_id),
                ResumeScope::Thread(arguments.thread_id),
                false,
            )
        } else if non_stop {
            ("-exec-continue --all".to_string(), ResumeScope::All, true)
        } else {
            ("-exec-continue".to_string(), ResumeScope::All, true)
        };

        match self.resume_command(command, scope).await {
            Ok(_) => self.client.send_response(
                request,
                Ok(Some(ContinueResponseBody {
                    all_threads_continued: Some(all_threads_continued),
                })),
            ),
            Err(error) => self.client.send_response::<()>(request, Err(&error)),
        }
    }

    pub(crate) async fn next(self: Arc<Self>, request: &Request) -> anyhow::Result<()> {
        let arguments: NextArguments = match get_arguments(request) {
            Ok(arguments) => arguments,
            Err(error) => return self.client.send_response::<()>(request, Err(&error)),
        };
        let verb = match arguments.granularity.as_deref() {
            Some("instruction") => "-exec-next-instruction",
            _ => "-exec-next",
        };
        self.stepping(request, verb, arguments.thread_id).await
    }

    pub(crate) async fn step_in(self: Arc<Self>, request: &Request) -> anyhow::Result<()> {
        let arguments: StepInArguments = match get_arguments(request) {
            Ok(arguments) => arguments,
            Err(error) => return self.client.send_response::<()>(request, Err(&error)),
        };
        let verb = match arguments.granularity.as_deref() {
            Some("instruction") => "-exec-step-instruction",
            _ => "-exec-step",
        };
        self.stepping(request, verb, arguments.thread_id).await
    }

    pub(crate) async fn step_out(self: Arc<Self>, request: &Request) -> anyhow::Result<()> {
        let arguments: StepOutArguments = match get_arguments(request) {
            Ok(arguments) => arguments,
            Err(error) => return self.client.send_response::<()>(request, Err(&error)),
        };
        self.stepping(request, "-exec-finish", arguments.thread_id)
            .await
    }

    /// Dispatch a stepping command. The DAP response races against a
    /// timeout so a slow step cannot stall the UI; the MI command itself is
    /// never cancelled and a late error is still surfaced.
    async fn stepping(
        self: Arc<Self>,
        request: &Request,
        verb: &str,
        thread_id: i64,
    ) -> anyhow::Result<()> {
        let command = format!("{verb} --thread {thread_id}");
        let (token, mut pending) = match self.backend.send_tracked(&command).await {
            Ok(sent) => sent,
            Err(error) => return self.client.send_response::<()>(request, Err(&error)),
        };
        self.state
            .lock()
            .record_resume_token(token, ResumeScope::Thread(thread_id));

        let response_deadline = tokio::time::sleep(self.config.stepping_timeout());
        tokio::pin!(response_deadline);

        tokio::select! {
            received = &mut pending => {
                let result = received.map_err(|_| DebuggerError::PipeClosed);
                match self.finish_resume(token, result.and_then(|r| r)) {
                    Ok(_) => self.client.send_response::<()>(request, Ok(None)),
                    Err(error) => {
                        self.client.output("console", format!("{error}\n"));
                        self.client.send_response::<()>(request, Err(&error))
                    }
                }
            }
            _ = &mut response_deadline => {
                // Answer now so the UI does not stall; the command is not
                // cancelled and its eventual result is still processed.
                self.client.send_response::<()>(request, Ok(None))?;
                let session = Arc::clone(&self);
                tokio::spawn(async move {
                    let result = pending.await.map_err(|_| DebuggerError::PipeClosed);
                    match session.finish_resume(token, result.and_then(|r| r)) {
                        Ok(_) => tracing::debug!("late stepping result for token {token}"),
                        Err(error) => {
                            session.client.output("console", format!("{error}\n"));
                        }
                    }
                });
                Ok(())
            }
        }
    }

    pub(crate) async fn pause_request(&self, request: &Request) -> anyhow::Result<()> {
        let arguments: PauseArguments = match get_arguments(request) {
            Ok(arguments) => arguments,
            Err(error) => return self.client.send_response::<()>(request, Err(&error)),
        };
        // No waiting: the *stopped record produces the DAP event.
        match self.backend.interrupt(Some(arguments.thread_id)).await {
            Ok(()) => self.client.send_response::<()>(request, Ok(None)),
            Err(error) => self.client.send_response::<()>(request, Err(&error)),
        }
    }

    // ------------------------------------------------------------------
    // Scopes and variables
    // ------------------------------------------------------------------

    pub(crate) async fn scopes(&self, request: &Request) -> anyhow::Result<()> {
        let arguments: ScopesArguments = match get_arguments(request) {
            Ok(arguments) => arguments,
            Err(error) => return self.client.send_response::<()>(request, Err(&error)),
        };

        let Some(frame) = self
            .state
            .lock()
            .frame_handles
            .get(arguments.frame_id)
            .copied()
        else {
            return self.client.send_response::<()>(
                request,
                Err(&DebuggerError::UserMessage(format!(
                    "Unknown frame handle {}",
                    arguments.frame_id
                ))),
            );
        };

        // The stack depth completes the varobj scope key, so recursive
        // calls with same-named locals stay distinct.
        let depth = self.stack_depth(frame.thread_id).await.unwrap_or(0);
        let scope = VariableScope {
            thread_id: frame.thread_id,
            frame_id: frame.frame_level,
            depth,
        };

        let mut state = self.state.lock();
        let scopes = vec![
            Scope {
                name: "Local".to_string(),
                presentation_hint: Some("locals".to_string()),
                variables_reference: state
                    .variable_handles
                    .create(VariableReference::Frame { frame, scope }),
                expensive: false,
            },
            Scope {
                name: "Global".to_string(),
                presentation_hint: None,
                variables_reference: state
                    .variable_handles
                    .create(VariableReference::Globals),
                expensive: true,
            },
            Scope {
                name: "Registers".to_string(),
                presentation_hint: Some("registers".to_string()),
                variables_reference: state
                    .variable_handles
                    .create(VariableReference::Registers { frame }),
                expensive: true,
            },
        ];
        drop(state);
        self.client
            .send_response(request, Ok(Some(ScopesResponseBody { scopes })))
    }

    pub(crate) async fn variables(&self, request: &Request) -> anyhow::Result<()> {
        let arguments: VariablesArguments = match get_arguments(request) {
            Ok(arguments) => arguments,
            Err(error) => return self.client.send_response::<()>(request, Err(&error)),
        };

        let Some(reference) = self
            .state
            .lock()
            .variable_handles
            .get(arguments.variables_reference)
            .cloned()
        else {
            // Stale handle from before the last stop; fail cleanly.
            return self.client.send_plain_failure(request);
        };

        let variables = match reference {
            VariableReference::Frame { frame, scope } => self.local_variables(frame, scope).await,
            VariableReference::Registers { frame } => self.register_variables(frame).await,
            VariableReference::Globals => self.global_variables().await,
            VariableReference::Object { scope, varname } => {
                self.child_variables(scope, &varname).await
            }
        };

        match variables {
            Ok(variables) => self
                .client
                .send_response(request, Ok(Some(VariablesResponseBody { variables }))),
            Err(error) if error.is_thread_running() => {
                tracing::debug!("variables while running: {error}");
                self.client.send_response(
                    request,
                    Ok(Some(VariablesResponseBody {
                        variables: Vec::new(),
                    })),
                )
            }
            Err(error) => {
                self.client.output("console", format!("{error}\n"));
                self.client.send_response::<()>(request, Err(&error))
            }
        }
    }

    async fn local_variables(
        &self,
        frame: FrameReference,
        scope: VariableScope,
    ) -> Result<Vec<Variable>, DebuggerError> {
        let results = self
            .backend
            .send(format!(
                "-stack-list-variables --thread {} --frame {} --simple-values",
                frame.thread_id, frame.frame_level
            ))
            .await?;

        let mut variables = Vec::new();
        for local in parse_simple_values(&results.results, "variables") {
            let varobj = match self.resolve_varobj(scope, &local, Some(frame)).await {
                Ok(varobj) => varobj,
                Err(error) => {
                    tracing::debug!("varobj for {local:?} failed: {error}");
                    continue;
                }
            };
            variables.push(self.present_variable(&local, &varobj, scope).await);
        }
        Ok(variables)
    }

    /// Get-or-create the varobj backing one local variable, updating a
    /// cached one and reaping it when GDB reports it out of scope.
    async fn resolve_varobj(
        &self,
        scope: VariableScope,
        name: &str,
        frame: Option<FrameReference>,
    ) -> Result<VarObj, DebuggerError> {
        let existing = self.state.lock().varobjs.get(scope, name).cloned();
        match existing {
            Some(varobj) => {
                let mut updated = self.update_varobj(scope, varobj).await?;
                if !updated.is_variable && frame.is_some() {
                    // Created earlier by a watch/hover evaluation; it now
                    // backs a real stack variable.
                    updated.is_variable = true;
                    self.state.lock().varobjs.update(scope, updated.clone());
                }
                Ok(updated)
            }
            None => self.create_varobj(scope, name, frame, true).await,
        }
    }

    async fn create_varobj(
        &self,
        scope: VariableScope,
        expression: &str,
        frame: Option<FrameReference>,
        is_variable: bool,
    ) -> Result<VarObj, DebuggerError> {
        let command = match frame {
            Some(frame) => format!(
                "-var-create --thread {} --frame {} - * {}",
                frame.thread_id,
                frame.frame_level,
                Quoted::always(expression)
            ),
            // Floating object: evaluated against the current frame.
            None => format!("-var-create - @ {}", Quoted::always(expression)),
        };
        let results = self.backend.send(command).await?;
        let varobj =
            VarObj::from_create_results(expression, is_variable, false, &results.results);
        self.state.lock().varobjs.add(scope, varobj.clone());
        Ok(varobj)
    }

    /// `-var-update`, applying changes to the cache and recreating the
    /// object when GDB reports `in_scope = invalid`.
    pub(crate) async fn update_varobj(
        &self,
        scope: VariableScope,
        varobj: VarObj,
    ) -> Result<VarObj, DebuggerError> {
        let results = self
            .backend
            .send(format!("-var-update --all-values {}", varobj.varname))
            .await?;

        let mut current = varobj.clone();
        let Some(changes) = results.results.list("changelist") else {
            return Ok(current);
        };
        for change in changes {
            let Some(change) = change.as_tuple().or_else(|| {
                change
                    .get("varobj")
                    .and_then(gdb_mi::MiValue::as_tuple)
            }) else {
                continue;
            };
            let Some(name) = change.string("name") else {
                continue;
            };
            if change.string("in_scope") == Some("invalid") {
                if name == varobj.varname {
                    return self.recreate_varobj(scope, &varobj).await;
                }
                // An invalidated child: drop it from the cache, its GDB
                // object dies with the parent recreation.
                self.state.lock().varobjs.take(scope, name);
                continue;
            }
            if let Some(value) = change.string("value") {
                if name == current.varname {
                    current.value = value.to_string();
                }
                self.state.lock().varobjs.apply_change(scope, name, value);
            }
        }
        Ok(current)
    }

    async fn recreate_varobj(
        &self,
        scope: VariableScope,
        varobj: &VarObj,
    ) -> Result<VarObj, DebuggerError> {
        self.delete_varobj(scope, varobj).await?;
        let frame = match scope {
            VariableScope::GLOBALS => None,
            scope => Some(FrameReference {
                thread_id: scope.thread_id,
                frame_level: scope.frame_id,
            }),
        };
        self.create_varobj(scope, &varobj.expression, frame, varobj.is_variable)
            .await
    }

    /// Remove from the map and delete on the GDB side. The map entry goes
    /// first: a failed `-var-delete` must not leave a stale entry.
    pub(crate) async fn delete_varobj(
        &self,
        scope: VariableScope,
        varobj: &VarObj,
    ) -> Result<(), DebuggerError> {
        self.state.lock().varobjs.take(scope, &varobj.varname);
        self.backend
            .send(format!("-var-delete {}", varobj.varname))
            .await?;
        Ok(())
    }

    async fn present_variable(
        &self,
        name: &str,
        varobj: &VarObj,
        scope: VariableScope,
    ) -> Variable {
        let mut value = varobj.value.clone();
        if varobj.is_array_like() {
            // Arrays print as an opaque aggregate; show the element
            // address instead, like the CLI would for `&arr`.
            if let Ok(results) = self
                .backend
                .send(format!(
                    "-data-evaluate-expression {}",
                    Quoted::always(&format!("&({})", varobj.expression))
                ))
                .await
            {
                if let Some(address) = results.results.string("value") {
                    value = address.to_string();
                }
            }
        }
        let variables_reference = if varobj.numchild > 0 {
            self.state
                .lock()
                .variable_handles
                .create(VariableReference::Object {
                    scope,
                    varname: varobj.varname.clone(),
                })
        } else {
            0
        };
        Variable {
            name: name.to_string(),
            value,
            type_: (!varobj.type_.is_empty()).then(|| varobj.type_.clone()),
            variables_reference,
            memory_reference: None,
        }
    }

    async fn child_variables(
        &self,
        scope: VariableScope,
        varname: &str,
    ) -> Result<Vec<Variable>, DebuggerError> {
        let mut variables = Vec::new();
        self.collect_children(scope, varname, &mut variables).await?;
        Ok(variables)
    }

    /// `-var-list-children`, descending transparently through the C++
    /// access-specifier pseudo-levels (children named public/protected/
    /// private with no type).
    async fn collect_children(
        &self,
        scope: VariableScope,
        varname: &str,
        out: &mut Vec<Variable>,
    ) -> Result<(), DebuggerError> {
        let results = self
            .backend
            .send(format!("-var-list-children --all-values {varname}"))
            .await?;
        let Some(children) = results.results.list("children") else {
            return Ok(());
        };
        for child in children {
            let Some(child) = child
                .get("child")
                .and_then(gdb_mi::MiValue::as_tuple)
                .or_else(|| child.as_tuple())
            else {
                continue;
            };
            let Some(child_name) = child.string("name") else {
                continue;
            };
            let exp = child.string("exp").unwrap_or_default();
            let type_ = child.string("type").unwrap_or_default();

            if type_.is_empty() && matches!(exp, "public" | "protected" | "private") {
                Box::pin(self.collect_children(scope, child_name, out)).await?;
                continue;
            }

            let varobj = VarObj {
                varname: child_name.to_string(),
                expression: exp.to_string(),
                type_: type_.to_string(),
                numchild: child.int("numchild").unwrap_or(0),
                value: child.string("value").unwrap_or_default().to_string(),
                is_variable: false,
                is_child: true,
            };
            self.state.lock().varobjs.add(scope, varobj.clone());
            out.push(self.present_variable(exp, &varobj, scope).await);
        }
        Ok(())
    }

    async fn register_variables(
        &self,
        frame: FrameReference,
    ) -> Result<Vec<Variable>, DebuggerError> {
        let cached_names = self.state.lock().register_names.clone();
        let names = match cached_names {
            Some(names) => names,
            None => {
                let results = self.backend.send("-data-list-register-names").await?;
                let names: Vec<String> = results
                    .results
                    .list("register-names")
                    .map(|list| {
                        list.iter()
                            .filter_map(|v| v.as_str())
                            .map(str::to_string)
                            .collect()
                    })
                    .unwrap_or_default();
                self.state.lock().register_names = Some(names.clone());
                names
            }
        };

        let results = self
            .backend
            .send(format!(
                "-data-list-register-values --thread {} --frame {} x",
                frame.thread_id, frame.frame_level
            ))
            .await?;
        let mut variables = Vec::new();
        if let Some(values) = results.results.list("register-values") {
            for entry in values {
                let Some(entry) = entry.as_tuple() else {
                    continue;
                };
                let Some(number) = entry.int("number") else {
                    continue;
                };
                let Some(name) = names.get(number as usize).filter(|n| !n.is_empty()) else {
                    continue;
                };
                variables.push(Variable {
                    name: name.clone(),
                    value: entry.string("value").unwrap_or_default().to_string(),
                    type_: None,
                    variables_reference: 0,
                    memory_reference: None,
                });
            }
        }
        Ok(variables)
    }

    async fn global_variables(&self) -> Result<Vec<Variable>, DebuggerError> {
        let results = self.backend.send("-symbol-info-variables").await?;
        let names = parse_global_symbol_names(&results.results);

        let mut variables = Vec::new();
        for name in names {
            let varobj = match self
                .resolve_varobj(VariableScope::GLOBALS, &name, None)
                .await
            {
                Ok(varobj) => varobj,
                Err(error) => {
                    tracing::debug!("global varobj for {name:?} failed: {error}");
                    continue;
                }
            };
            variables.push(
                self.present_variable(&name, &varobj, VariableScope::GLOBALS)
                    .await,
            );
        }
        Ok(variables)
    }

    pub(crate) async fn set_variable(&self, request: &Request) -> anyhow::Result<()> {
        let arguments: SetVariableArguments = match get_arguments(request) {
            Ok(arguments) => arguments,
            Err(error) => return self.client.send_response::<()>(request, Err(&error)),
        };

        let Some(reference) = self
            .state
            .lock()
            .variable_handles
            .get(arguments.variables_reference)
            .cloned()
        else {
            return self.client.send_plain_failure(request);
        };

        let result = match reference {
            VariableReference::Registers { .. } => {
                let assignment = format!("${}={}", arguments.name, arguments.value);
                self.backend
                    .send(format!(
                        "-data-evaluate-expression {}",
                        Quoted::always(&assignment)
                    ))
                    .await
                    .map(|results| SetVariableResponseBody {
                        value: results
                            .results
                            .string("value")
                            .unwrap_or(&arguments.value)
                            .to_string(),
                        type_: None,
                        variables_reference: None,
                    })
            }
            VariableReference::Frame { scope, .. } => {
                self.assign_varobj(scope, &arguments.name, &arguments.value, None)
                    .await
            }
            VariableReference::Globals => {
                self.assign_varobj(
                    VariableScope::GLOBALS,
                    &arguments.name,
                    &arguments.value,
                    None,
                )
                .await
            }
            VariableReference::Object { scope, varname } => {
                self.assign_varobj(scope, &arguments.name, &arguments.value, Some(&varname))
                    .await
            }
        };

        match result {
            Ok(body) => self.client.send_response(request, Ok(Some(body))),
            Err(error) => self.client.send_response::<()>(request, Err(&error)),
        }
    }

    async fn assign_varobj(
        &self,
        scope: VariableScope,
        name: &str,
        value: &str,
        parent: Option<&str>,
    ) -> Result<SetVariableResponseBody, DebuggerError> {
        let varobj = {
            let state = self.state.lock();
            match parent {
                // A child is found under its parent's dotted path; pseudo
                // levels add a segment, so match on the trailing component.
                Some(parent) => state
                    .varobjs
                    .vars_for(scope)
                    .find(|v| {
                        v.is_child
                            && v.varname.starts_with(parent)
                            && v.varname.ends_with(&format!(".{name}"))
                    })
                    .cloned(),
                None => state.varobjs.get(scope, name).cloned(),
            }
        };
        let varobj = varobj.ok_or_else(|| {
            DebuggerError::UserMessage(format!("No variable {name:?} in this scope"))
        })?;

        let results = self
            .backend
            .send(format!(
                "-var-assign {} {}",
                varobj.varname,
                Quoted::always(value)
            ))
            .await?;
        let new_value = results
            .results
            .string("value")
            .unwrap_or(value)
            .to_string();
        self.state
            .lock()
            .varobjs
            .apply_change(scope, &varobj.varname, &new_value);
        Ok(SetVariableResponseBody {
            value: new_value,
            type_: (!varobj.type_.is_empty()).then(|| varobj.type_.clone()),
            variables_reference: None,
        })
    }

    pub(crate) async fn evaluate(&self, request: &Request) -> anyhow::Result<()> {
        let arguments: EvaluateArguments = match get_arguments(request) {
            Ok(arguments) => arguments,
            Err(error) => return self.client.send_response::<()>(request, Err(&error)),
        };

        // `> command` in the repl tunnels to the CLI interpreter.
        if arguments.context.as_deref() == Some("repl")
            && arguments.expression.trim_start().starts_with('>')
        {
            return self.evaluate_cli_command(request, &arguments).await;
        }

        let frame = arguments
            .frame_id
            .and_then(|id| self.state.lock().frame_handles.get(id).copied());
        let scope = match frame {
            Some(frame) => {
                let depth = self.stack_depth(frame.thread_id).await.unwrap_or(0);
                VariableScope {
                    thread_id: frame.thread_id,
                    frame_id: frame.frame_level,
                    depth,
                }
            }
            None => VariableScope::GLOBALS,
        };

        let expression = arguments.expression.trim();
        let existing = self.state.lock().varobjs.get(scope, expression).cloned();
        let varobj = match existing {
            Some(varobj) => self.update_varobj(scope, varobj).await,
            None => self.create_varobj(scope, expression, frame, false).await,
        };

        match varobj {
            Ok(varobj) => {
                let variables_reference = if varobj.numchild > 0 {
                    self.state
                        .lock()
                        .variable_handles
                        .create(VariableReference::Object {
                            scope,
                            varname: varobj.varname.clone(),
                        })
                } else {
                    0
                };
                self.client.send_response(
                    request,
                    Ok(Some(EvaluateResponseBody {
                        result: varobj.value.clone(),
                        type_: (!varobj.type_.is_empty()).then(|| varobj.type_.clone()),
                        variables_reference,
                        memory_reference: None,
                    })),
                )
            }
            // Hover/watch evaluations miss all the time; a quiet failure
            // keeps the Debug Console clean.
            Err(_) => self.client.send_plain_failure(request),
        }
    }

    async fn evaluate_cli_command(
        &self,
        request: &Request,
        arguments: &EvaluateArguments,
    ) -> anyhow::Result<()> {
        let command = arguments
            .expression
            .trim_start()
            .trim_start_matches('>')
            .trim()
            .to_string();

        let first_word = command.split_whitespace().next().unwrap_or("");
        if matches!(first_word, "delete" | "enable" | "disable") {
            self.client.output(
                "console",
                format!(
                    "warning: the '{first_word}' console command changes breakpoints behind \
                     the UI's back; the Breakpoints view will not reflect it.\n"
                ),
            );
        }

        match self.backend.console_command(&command).await {
            Ok(_) => self.client.send_response(
                request,
                Ok(Some(EvaluateResponseBody {
                    result: "\r".to_string(),
                    type_: None,
                    variables_reference: 0,
                    memory_reference: None,
                })),
            ),
            Err(error) => self.client.send_response::<()>(request, Err(&error)),
        }
    }

    // ------------------------------------------------------------------
    // Memory
    // ------------------------------------------------------------------

    pub(crate) async fn read_memory(&self, request: &Request) -> anyhow::Result<()> {
        let arguments: ReadMemoryArguments = match get_arguments(request) {
            Ok(arguments) => arguments,
            Err(error) => return self.client.send_response::<()>(request, Err(&error)),
        };
        if arguments.count == 0 {
            return self.client.send_response(
                request,
                Ok(Some(ReadMemoryResponseBody {
                    address: arguments.memory_reference.clone(),
                    unreadable_bytes: None,
                    data: Some(String::new()),
                })),
            );
        }

        match self
            .read_memory_bytes(
                &arguments.memory_reference,
                arguments.offset.unwrap_or(0),
                arguments.count as u64,
            )
            .await
        {
            Ok((address, hex)) => {
                let unread = arguments.count - (hex.len() / 2) as i64;
                let body = match hex_to_base64(&hex) {
                    Ok(data) => ReadMemoryResponseBody {
                        address,
                        unreadable_bytes: (unread > 0).then_some(unread),
                        data: Some(data),
                    },
                    Err(error) => {
                        return self.client.send_response::<()>(request, Err(&error));
                    }
                };
                self.client.send_response(request, Ok(Some(body)))
            }
            Err(error) => self.client.send_response::<()>(request, Err(&error)),
        }
    }

    /// `-data-read-memory-bytes`; returns `(begin address, hex contents)`.
    pub(crate) async fn read_memory_bytes(
        &self,
        reference: &str,
        offset: i64,
        count: u64,
    ) -> Result<(String, String), DebuggerError> {
        let offset_flag = if offset != 0 {
            format!("-o {offset} ")
        } else {
            String::new()
        };
        let results = self
            .backend
            .send(format!(
                "-data-read-memory-bytes {offset_flag}{} {count}",
                Quoted::always(reference)
            ))
            .await?;
        let memory = results
            .results
            .list("memory")
            .and_then(|list| list.first())
            .and_then(|entry| entry.as_tuple())
            .ok_or_else(|| {
                DebuggerError::UserMessage(format!("No memory content at {reference:?}"))
            })?;
        let begin = memory.string("begin").unwrap_or(reference).to_string();
        let contents = memory.string("contents").unwrap_or_default().to_string();
        Ok((begin, contents))
    }

    pub(crate) async fn write_memory(&self, request: &Request) -> anyhow::Result<()> {
        let arguments: WriteMemoryArguments = match get_arguments(request) {
            Ok(arguments) => arguments,
            Err(error) => return self.client.send_response::<()>(request, Err(&error)),
        };
        let hex = match base64_to_hex(&arguments.data) {
            Ok(hex) => hex,
            Err(error) => return self.client.send_response::<()>(request, Err(&error)),
        };

        let target = match arguments.offset.unwrap_or(0) {
            0 => arguments.memory_reference.clone(),
            offset => format!("(({})+{offset})", arguments.memory_reference),
        };
        match self
            .backend
            .send(format!(
                "-data-write-memory-bytes {} {hex}",
                Quoted::always(&target)
            ))
            .await
        {
            Ok(_) => self.client.send_response(
                request,
                Ok(Some(WriteMemoryResponseBody {
                    bytes_written: Some((hex.len() / 2) as i64),
                })),
            ),
            Err(error) => self.client.send_response::<()>(request, Err(&error)),
        }
    }

    /// The custom `cdt-gdb-adapter/Memory` request: hex in, hex out.
    pub(crate) async fn memory_request(&self, request: &Request) -> anyhow::Result<()> {
        let arguments: MemoryRequestArguments = match get_arguments(request) {
            Ok(arguments) => arguments,
            Err(error) => return self.client.send_response::<()>(request, Err(&error)),
        };
        match self
            .read_memory_bytes(
                &arguments.address,
                arguments.offset.unwrap_or(0) as i64,
                arguments.length,
            )
            .await
        {
            Ok((address, data)) => self
                .client
                .send_response(request, Ok(Some(MemoryContents { data, address }))),
            Err(error) => self.client.send_response::<()>(request, Err(&error)),
        }
    }

    // ------------------------------------------------------------------
    // Breakpoints
    // ------------------------------------------------------------------

    pub(crate) async fn set_breakpoints(&self, request: &Request) -> anyhow::Result<()> {
        let arguments: SetBreakpointsArguments = match get_arguments(request) {
            Ok(arguments) => arguments,
            Err(error) => return self.client.send_response::<()>(request, Err(&error)),
        };
        let Some(path) = arguments.source.path.clone().or(arguments.source.name.clone())
        else {
            return self.client.send_response::<()>(
                request,
                Err(&DebuggerError::UserMessage(
                    "setBreakpoints needs a source path".to_string(),
                )),
            );
        };
        let desired = arguments.breakpoints.clone().unwrap_or_default();

        if self.first_empty_short_circuit(BreakpointRequestKind::Source, desired.is_empty()) {
            return self.client.send_response(
                request,
                Ok(Some(SetBreakpointsResponseBody {
                    breakpoints: Vec::new(),
                })),
            );
        }

        self.with_target_paused(request, |session| async move {
            session.apply_source_breakpoints(&path, &desired).await
        })
        .await
    }

    /// The first `set*Breakpoints` request of a kind with an empty desired
    /// list has nothing to reconcile; skip the pause entirely.
    fn first_empty_short_circuit(&self, kind: BreakpointRequestKind, empty: bool) -> bool {
        let mut state = self.state.lock();
        let first = state.seen_breakpoint_requests.insert(kind);
        first && empty
    }

    /// Run a breakpoint mutation inside the pause bracket and answer with
    /// its reconciled list.
    async fn with_target_paused<'a, F, Fut>(
        &'a self,
        request: &Request,
        work: F,
    ) -> anyhow::Result<()>
    where
        F: FnOnce(&'a Self) -> Fut,
        Fut: std::future::Future<Output = Result<Vec<Breakpoint>, DebuggerError>> + 'a,
    {
        let counted = match self.pause_if_needed().await {
            Ok(counted) => counted,
            Err(error) => return self.client.send_response::<()>(request, Err(&error)),
        };
        let outcome = work(self).await;
        if let Err(error) = self.continue_if_needed(counted).await {
            tracing::warn!("resume after breakpoint update failed: {error}");
        }
        match outcome {
            Ok(breakpoints) => self.client.send_response(
                request,
                Ok(Some(SetBreakpointsResponseBody { breakpoints })),
            ),
            Err(error) => self.client.send_response::<()>(request, Err(&error)),
        }
    }

    async fn list_breakpoints(&self) -> Result<Vec<MiBreakpoint>, DebuggerError> {
        let results = self.backend.send("-break-list").await?;
        Ok(parse_break_list(&results.results))
    }

    async fn delete_breakpoints(&self, numbers: &[i64]) -> Result<(), DebuggerError> {
        if numbers.is_empty() {
            return Ok(());
        }
        self.backend
            .send(format!("-break-delete {}", numbers.iter().join(" ")))
            .await?;
        let mut state = self.state.lock();
        for number in numbers {
            state.logpoints.remove(number);
        }
        Ok(())
    }

    async fn apply_source_breakpoints(
        &self,
        path: &str,
        desired: &[SourceBreakpoint],
    ) -> Result<Vec<Breakpoint>, DebuggerError> {
        let function_ids = self.state.lock().function_breakpoints.clone();
        let existing: Vec<MiBreakpoint> = self
            .list_breakpoints()
            .await?
            .into_iter()
            .filter(|bp| {
                !bp.is_watchpoint()
                    && !function_ids.contains(&bp.number)
                    && bp
                        .location_file_line()
                        .is_some_and(|(file, _)| file_matches(&file, path))
            })
            .collect();

        let reconciliation = resolve_source_breakpoints(
            desired,
            &existing,
            path,
            self.config.hardware_breakpoint,
        );

        // Delete before inserting, so MI never sees two breakpoints on one
        // location and freed numbers cannot collide.
        self.delete_breakpoints(&reconciliation.deletes).await?;

        let mut breakpoints = Vec::new();
        for (want, matched) in &reconciliation.resolved {
            let response = match matched {
                Some(have) => {
                    self.note_logpoint(have.number, want.log_message.as_deref());
                    Breakpoint {
                        id: Some(have.number),
                        verified: true,
                        line: have.line.or(Some(want.line)),
                        ..Default::default()
                    }
                }
                None => {
                    match source_insert_command(path, want, self.config.hardware_breakpoint) {
                        Ok(command) => match self.backend.send(command).await {
                            Ok(results) => {
                                let inserted = inserted_breakpoint(&results);
                                if let Some(number) = inserted.id {
                                    self.note_logpoint(number, want.log_message.as_deref());
                                }
                                Breakpoint {
                                    line: inserted.line.or(Some(want.line)),
                                    ..inserted
                                }
                            }
                            Err(error) => unverified(want.line, error),
                        },
                        Err(error) => {
                            // Malformed hit condition: diagnostic output,
                            // skip this one, keep going.
                            self.client.output("console", format!("{error}\n"));
                            unverified(want.line, error)
                        }
                    }
                }
            };
            breakpoints.push(response);
        }
        Ok(breakpoints)
    }

    fn note_logpoint(&self, number: i64, message: Option<&str>) {
        let mut state = self.state.lock();
        match message.filter(|m| !m.is_empty()) {
            Some(message) => {
                state.logpoints.insert(number, message.to_string());
            }
            None => {
                state.logpoints.remove(&number);
            }
        }
    }

    pub(crate) async fn set_function_breakpoints(&self, request: &Request) -> anyhow::Result<()> {
        let arguments: SetFunctionBreakpointsArguments = match get_arguments(request) {
            Ok(arguments) => arguments,
            Err(error) => return self.client.send_response::<()>(request, Err(&error)),
        };
        let desired = arguments.breakpoints.clone();

        if self.first_empty_short_circuit(BreakpointRequestKind::Function, desired.is_empty()) {
            return self.client.send_response(
                request,
                Ok(Some(SetBreakpointsResponseBody {
                    breakpoints: Vec::new(),
                })),
            );
        }

        self.with_target_paused(request, |session| async move {
            let function_ids = session.state.lock().function_breakpoints.clone();
            let existing: Vec<MiBreakpoint> = session
                .list_breakpoints()
                .await?
                .into_iter()
                .filter(|bp| function_ids.contains(&bp.number))
                .collect();

            let reconciliation = resolve_function_breakpoints(&desired, &existing);
            session.delete_breakpoints(&reconciliation.deletes).await?;
            {
                let mut state = session.state.lock();
                for number in &reconciliation.deletes {
                    state.function_breakpoints.remove(number);
                }
            }

            let mut breakpoints = Vec::new();
            for (want, matched) in &reconciliation.resolved {
                let response = match matched {
                    Some(have) => Breakpoint {
                        id: Some(have.number),
                        verified: true,
                        line: have.line,
                        ..Default::default()
                    },
                    None => match function_insert_command(want) {
                        Ok(command) => match session.backend.send(command).await {
                            Ok(results) => {
                                let inserted = inserted_breakpoint(&results);
                                if let Some(number) = inserted.id {
                                    session.state.lock().function_breakpoints.insert(number);
                                }
                                inserted
                            }
                            Err(error) => unverified(0, error),
                        },
                        Err(error) => {
                            session.client.output("console", format!("{error}\n"));
                            unverified(0, error)
                        }
                    },
                };
                breakpoints.push(response);
            }
            Ok(breakpoints)
        })
        .await
    }

    pub(crate) async fn set_instruction_breakpoints(
        &self,
        request: &Request,
    ) -> anyhow::Result<()> {
        let arguments: SetInstructionBreakpointsArguments = match get_arguments(request) {
            Ok(arguments) => arguments,
            Err(error) => return self.client.send_response::<()>(request, Err(&error)),
        };
        let desired = arguments.breakpoints.clone();

        if self.first_empty_short_circuit(BreakpointRequestKind::Instruction, desired.is_empty())
        {
            return self.client.send_response(
                request,
                Ok(Some(SetBreakpointsResponseBody {
                    breakpoints: Vec::new(),
                })),
            );
        }

        self.with_target_paused(request, |session| async move {
            let function_ids = session.state.lock().function_breakpoints.clone();
            let existing: Vec<MiBreakpoint> = session
                .list_breakpoints()
                .await?
                .into_iter()
                .filter(|bp| {
                    !bp.is_watchpoint()
                        && !function_ids.contains(&bp.number)
                        && bp
                            .original_location
                            .as_deref()
                            .is_some_and(|l| l.starts_with('*'))
                })
                .collect();

            let reconciliation = resolve_instruction_breakpoints(&desired, &existing);
            session.delete_breakpoints(&reconciliation.deletes).await?;

            let mut breakpoints = Vec::new();
            for (want, matched) in &reconciliation.resolved {
                let response = match matched {
                    Some(have) => Breakpoint {
                        id: Some(have.number),
                        verified: true,
                        instruction_reference: have.addr.clone(),
                        ..Default::default()
                    },
                    None => match instruction_insert_command(want) {
                        Ok(command) => match session.backend.send(command).await {
                            Ok(results) => inserted_breakpoint(&results),
                            Err(error) => unverified(0, error),
                        },
                        Err(error) => {
                            session.client.output("console", format!("{error}\n"));
                            unverified(0, error)
                        }
                    },
                };
                breakpoints.push(response);
            }
            Ok(breakpoints)
        })
        .await
    }

    pub(crate) async fn set_data_breakpoints(&self, request: &Request) -> anyhow::Result<()> {
        let arguments: SetDataBreakpointsArguments = match get_arguments(request) {
            Ok(arguments) => arguments,
            Err(error) => return self.client.send_response::<()>(request, Err(&error)),
        };
        let desired = arguments.breakpoints.clone();

        if self.first_empty_short_circuit(BreakpointRequestKind::Data, desired.is_empty()) {
            return self.client.send_response(
                request,
                Ok(Some(SetBreakpointsResponseBody {
                    breakpoints: Vec::new(),
                })),
            );
        }

        self.with_target_paused(request, |session| async move {
            let existing: Vec<MiBreakpoint> = session
                .list_breakpoints()
                .await?
                .into_iter()
                .filter(MiBreakpoint::is_watchpoint)
                .collect();

            let reconciliation = resolve_data_breakpoints(&desired, &existing);
            session.delete_breakpoints(&reconciliation.deletes).await?;

            let mut breakpoints = Vec::new();
            for (want, matched) in &reconciliation.resolved {
                let response = match matched {
                    Some(have) => Breakpoint {
                        id: Some(have.number),
                        verified: true,
                        ..Default::default()
                    },
                    None => match data_insert_command(want) {
                        Ok(command) => match session.backend.send(command).await {
                            Ok(results) => {
                                let inserted = inserted_watchpoint(&results);
                                if let (Some(number), Some(condition)) = (
                                    inserted.id,
                                    want.condition.as_deref().filter(|c| !c.is_empty()),
                                ) {
                                    let set_condition = session
                                        .backend
                                        .send(format!(
                                            "-break-condition {number} {condition}"
                                        ))
                                        .await;
                                    if let Err(error) = set_condition {
                                        session
                                            .client
                                            .output("console", format!("{error}\n"));
                                    }
                                }
                                inserted
                            }
                            Err(error) => unverified(0, error),
                        },
                        Err(error) => {
                            session.client.output("console", format!("{error}\n"));
                            unverified(0, error)
                        }
                    },
                };
                breakpoints.push(response);
            }
            Ok(breakpoints)
        })
        .await
    }

    pub(crate) async fn data_breakpoint_info(&self, request: &Request) -> anyhow::Result<()> {
        let arguments: DataBreakpointInfoArguments = match get_arguments(request) {
            Ok(arguments) => arguments,
            Err(error) => return self.client.send_response::<()>(request, Err(&error)),
        };

        let container = arguments
            .variables_reference
            .and_then(|id| self.state.lock().variable_handles.get(id).cloned());

        let data_id = match container {
            Some(VariableReference::Object { scope, varname }) => {
                // A nested member watches its full path expression.
                let child = {
                    let state = self.state.lock();
                    let found = state
                        .varobjs
                        .vars_for(scope)
                        .find(|v| {
                            v.is_child
                                && v.varname.starts_with(&varname)
                                && v.varname.ends_with(&format!(".{}", arguments.name))
                        })
                        .map(|v| v.varname.clone());
                    found
                };
                match child {
                    Some(child) => self
                        .backend
                        .send(format!("-var-info-path-expression {child}"))
                        .await
                        .ok()
                        .and_then(|r| r.results.string("path_expr").map(str::to_string)),
                    None => None,
                }
            }
            _ => Some(arguments.name.clone()),
        };

        let body = match data_id {
            Some(data_id) => DataBreakpointInfoResponseBody {
                description: data_id.clone(),
                data_id: Some(data_id),
                access_types: Some(vec![
                    "read".to_string(),
                    "write".to_string(),
                    "readWrite".to_string(),
                ]),
                can_persist: Some(false),
            },
            None => DataBreakpointInfoResponseBody {
                data_id: None,
                description: format!("Cannot watch {:?}", arguments.name),
                access_types: None,
                can_persist: None,
            },
        };
        self.client.send_response(request, Ok(Some(body)))
    }
}

fn unverified(line: i64, error: DebuggerError) -> Breakpoint {
    Breakpoint {
        verified: false,
        message: Some(error.to_string()),
        line: (line > 0).then_some(line),
        ..Default::default()
    }
}

/// Build the response entry for a fresh `-break-insert` result.
fn inserted_breakpoint(results: &MiResults) -> Breakpoint {
    let Some(bkpt) = results.results.tuple("bkpt") else {
        return Breakpoint {
            verified: true,
            ..Default::default()
        };
    };
    Breakpoint {
        id: bkpt.int("number"),
        verified: true,
        line: bkpt.int("line"),
        instruction_reference: bkpt.string("addr").map(str::to_string),
        ..Default::default()
    }
}

/// `-break-watch` reports under `wpt`, `hw-rwpt` or `hw-awpt` depending on
/// the access mode.
fn inserted_watchpoint(results: &MiResults) -> Breakpoint {
    let wpt = ["wpt", "hw-rwpt", "hw-awpt"]
        .iter()
        .find_map(|key| results.results.tuple(key));
    Breakpoint {
        id: wpt.and_then(|w| w.int("number")),
        verified: true,
        ..Default::default()
    }
}

#[derive(Debug, PartialEq)]
pub(crate) struct ParsedFrame {
    pub level: i64,
    pub addr: u64,
    pub func: Option<String>,
    pub file: Option<String>,
    pub fullname: Option<String>,
    pub line: Option<i64>,
}

/// Parse a `-stack-list-frames` result.
pub(crate) fn parse_stack_frames(results: &MiTuple) -> Vec<ParsedFrame> {
    let Some(stack) = results.list("stack") else {
        return Vec::new();
    };
    stack
        .iter()
        .filter_map(|entry| {
            let frame = entry
                .get("frame")
                .and_then(gdb_mi::MiValue::as_tuple)
                .or_else(|| entry.as_tuple())?;
            Some(ParsedFrame {
                level: frame.int("level")?,
                addr: frame
                    .string("addr")
                    .and_then(|a| a.strip_prefix("0x"))
                    .and_then(|a| u64::from_str_radix(a, 16).ok())
                    .unwrap_or(0),
                func: frame.string("func").map(str::to_string),
                file: frame.string("file").map(str::to_string),
                fullname: frame.string("fullname").map(str::to_string),
                line: frame.int("line"),
            })
        })
        .collect()
}

/// Parse a `-stack-list-variables --simple-values` result into names.
pub(crate) fn parse_simple_values(results: &MiTuple, key: &str) -> Vec<String> {
    let Some(list) = results.list(key) else {
        return Vec::new();
    };
    list.iter()
        .filter_map(|entry| entry.as_tuple())
        .filter_map(|tuple| tuple.string("name"))
        .map(str::to_string)
        .collect()
}

/// Collect global (non-static) variable names from `-symbol-info-variables`.
pub(crate) fn parse_global_symbol_names(results: &MiTuple) -> Vec<String> {
    let mut names = Vec::new();
    let debug = results
        .tuple("symbols")
        .and_then(|symbols| symbols.list("debug"));
    for file_entry in debug.into_iter().flatten() {
        let Some(file_entry) = file_entry.as_tuple() else {
            continue;
        };
        for symbol in file_entry.list("symbols").into_iter().flatten() {
            let Some(symbol) = symbol.as_tuple() else {
                continue;
            };
            let is_static = symbol
                .string("description")
                .is_some_and(|d| d.starts_with("static "));
            if is_static {
                continue;
            }
            if let Some(name) = symbol.string("name") {
                if !names.iter().any(|n| n == name) {
                    names.push(name.to_string());
                }
            }
        }
    }
    names
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
            other => panic!("unexpected record {other:?}"),
        }
    }

    #[test]
    fn stack_frame_parsing() {
        let results = results_of(
            r#"^done,stack=[frame={level="0",addr="0x0000555555555131",func="main",file="a.c",fullname="/tmp/a.c",line="10"},frame={level="1",addr="0x00007ffff7dc6d90"}]"#,
        );
        let frames = parse_stack_frames(&results);
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].level, 0);
        assert_eq!(frames[0].func.as_deref(), Some("main"));
        assert_eq!(frames[0].line, Some(10));
        assert_eq!(frames[1].addr, 0x7ffff7dc6d90);
        assert_eq!(frames[1].func, None);
    }

    #[test]
    fn simple_values_parsing() {
        let results = results_of(
            r#"^done,variables=[{name="argc",arg="1",type="int",value="1"},{name="argv",arg="1",type="char **",value="0x7fff"},{name="local",type="int",value="42"}]"#,
        );
        assert_eq!(
            parse_simple_values(&results, "variables"),
            vec!["argc", "argv", "local"]
        );
    }

    #[test]
    fn global_symbol_parsing_skips_statics() {
        let results = results_of(
            r#"^done,symbols={debug=[{filename="a.c",fullname="/tmp/a.c",symbols=[{line="3",name="counter",type="int",description="int counter;"},{line="4",name="hidden",type="int",description="static int hidden;"}]},{filename="b.c",fullname="/tmp/b.c",symbols=[{line="1",name="counter",type="int",description="int counter;"}]}]}"#,
        );
        assert_eq!(parse_global_symbol_names(&results), vec!["counter"]);
    }

    #[test]
    fn inserted_breakpoint_extraction() {
        let line = r#"12^done,bkpt={number="3",type="breakpoint",disp="keep",enabled="y",addr="0x1149",func="main",file="a.c",line="10"}"#;
        let MiRecord::Result(record) = MiParser::new().parse_line(line.as_bytes()) else {
            panic!("expected result");
        };
        let results = MiResults {
            token: 12,
            command: "-break-insert".to_string(),
            class: record.class,
            results: record.results,
        };
        let breakpoint = inserted_breakpoint(&results);
        assert_eq!(breakpoint.id, Some(3));
        assert!(breakpoint.verified);
        assert_eq!(breakpoint.line, Some(10));
    }
}
