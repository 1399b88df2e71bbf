//! The outer request loop: the initialize → launch/attach handshake, then
//! the pump that fans requests out to handler tasks over the shared
//! session.

use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite};

use crate::adapter::dap_types::{InitializeRequestArguments, Request};
use crate::adapter::protocol::{start_connection, ClientHandle};
use crate::server::configuration::{ConfigOverrides, SessionConfig};
use crate::server::logger::DebugLogger;
use crate::server::session::{capabilities, get_arguments, DebugSession, SessionKind};
use crate::DebuggerError;

pub struct Debugger {
    overrides: ConfigOverrides,
    logger: DebugLogger,
}

impl Debugger {
    pub fn new(overrides: ConfigOverrides, logger: DebugLogger) -> Self {
        Debugger { overrides, logger }
    }

    /// Run one debug session over a pair of byte streams. Returns when the
    /// client disconnects or its stream closes.
    pub async fn debug_session<R, W>(&self, reader: R, writer: W) -> Result<(), DebuggerError>
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (mut requests, client) = start_connection(reader, writer);

        // The DAP handshake: initialize first, then launch or attach, then
        // the free-for-all.
        let Some(launch_request) = self.handshake(&mut requests, &client).await? else {
            return Ok(());
        };

        let kind = match launch_request.command.as_str() {
            "attach" => SessionKind::Attach,
            _ => SessionKind::Launch,
        };
        let config = self.parse_session_config(&launch_request);
        let session = match config {
            Ok(config) => {
                self.logger
                    .apply_config(config.verbose, config.log_file.as_deref());
                DebugSession::start(config, client.clone(), kind).await
            }
            Err(error) => Err(error),
        };
        let session = match session {
            Ok(session) => session,
            Err(error) => {
                client.send_response::<()>(&launch_request, Err(&error))?;
                self.logger.flush_to_client(&client);
                return Ok(());
            }
        };

        client.send_response::<()>(&launch_request, Ok(None))?;
        client.send_event::<()>("initialized", None)?;
        self.logger.flush_to_client(&client);

        // Requests run concurrently: the pause bracket and the stepping
        // timeout depend on overlap.
        while let Some(request) = requests.recv().await {
            client.register_request(&request);
            self.logger.flush_to_client(&client);

            if request.command == "disconnect" {
                if let Err(error) = session.disconnect(&request).await {
                    tracing::error!("disconnect failed: {error:#}");
                }
                break;
            }

            let session = Arc::clone(&session);
            tokio::spawn(async move {
                dispatch(session, request).await;
            });
        }

        // Client gone (or disconnected): make sure GDB follows.
        session.backend.exit().await;
        self.logger.flush_to_stderr();
        Ok(())
    }

    /// Handle everything up to and including the launch/attach request.
    /// Returns `None` when the client went away first.
    async fn handshake(
        &self,
        requests: &mut tokio::sync::mpsc::Receiver<Request>,
        client: &ClientHandle,
    ) -> Result<Option<Request>, DebuggerError> {
        while let Some(request) = requests.recv().await {
            client.register_request(&request);
            match request.command.as_str() {
                "initialize" => {
                    let _arguments: InitializeRequestArguments =
                        get_arguments(&request).unwrap_or_default();
                    client.send_response(&request, Ok(Some(capabilities())))?;
                }
                "launch" | "attach" => return Ok(Some(request)),
                "disconnect" => {
                    client.send_response::<()>(&request, Ok(None))?;
                    return Ok(None);
                }
                other => {
                    client.send_response::<()>(
                        &request,
                        Err(&DebuggerError::UserMessage(format!(
                            "Request '{other}' arrived before launch/attach"
                        ))),
                    )?;
                }
            }
        }
        Ok(None)
    }

    fn parse_session_config(&self, request: &Request) -> Result<SessionConfig, DebuggerError> {
        let arguments = request
            .arguments
            .clone()
            .unwrap_or(serde_json::Value::Null);
        let merged = self.overrides.apply(arguments);
        serde_json::from_value(merged).map_err(|error| {
            DebuggerError::UserMessage(format!("Invalid {} arguments: {error}", request.command))
        })
    }
}

/// Route one request to its handler. Every handler sends its own response;
/// failures here mean the response itself could not be delivered.
async fn dispatch(session: Arc<DebugSession>, request: Request) {
    let result = match request.command.as_str() {
        "configurationDone" => session.configuration_done(&request).await,
        "setBreakpoints" => session.set_breakpoints(&request).await,
        "setFunctionBreakpoints" => session.set_function_breakpoints(&request).await,
        "setInstructionBreakpoints" => session.set_instruction_breakpoints(&request).await,
        "setDataBreakpoints" => session.set_data_breakpoints(&request).await,
        "dataBreakpointInfo" => session.data_breakpoint_info(&request).await,
        "threads" => session.threads(&request).await,
        "stackTrace" => session.stack_trace(&request).await,
        "scopes" => session.scopes(&request).await,
        "variables" => session.variables(&request).await,
        "setVariable" => session.set_variable(&request).await,
        "evaluate" => session.evaluate(&request).await,
        "continue" => session.continue_request(&request).await,
        "next" => session.next(&request).await,
        "stepIn" => session.step_in(&request).await,
        "stepOut" => session.step_out(&request).await,
        "pause" => session.pause_request(&request).await,
        "readMemory" => session.read_memory(&request).await,
        "writeMemory" => session.write_memory(&request).await,
        "disassemble" => session.disassemble(&request).await,
        "terminate" => session.terminate(&request).await,
        "cdt-gdb-adapter/Memory" => session.memory_request(&request).await,
        "cdt-gdb-adapter/customReset" => session.custom_reset(&request).await,
        "cdt-gdb-tests/executeCommand" => session.execute_command(&request).await,
        other => session.client.send_response::<()>(
            &request,
            Err(&DebuggerError::UserMessage(format!(
                "Received request '{other}', which is not supported or not implemented yet"
            ))),
        ),
    };
    if let Err(error) = result {
        tracing::error!("Error executing request '{}': {error:#}", request.command);
    }
}
