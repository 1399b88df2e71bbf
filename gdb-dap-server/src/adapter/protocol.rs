//! The DAP side of the adapter: a framed reader feeding a request channel,
//! and a writer task that owns sequence-number allocation so that events
//! and responses from concurrent request handlers interleave safely.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Context;
use futures_util::StreamExt;
use serde::Serialize;
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio_util::bytes::BytesMut;
use tokio_util::codec::{Encoder, FramedRead};

use crate::adapter::codec::DapCodec;
use crate::adapter::dap_types::{
    ErrorResponseBody, Event, Message, OutputEventBody, Request, Response,
};
use crate::DebuggerError;

/// A message queued for the writer task, before a sequence number exists.
#[derive(Debug)]
enum OutboundMessage {
    Response {
        request_seq: i64,
        command: String,
        success: bool,
        message: Option<String>,
        body: Option<Value>,
    },
    Event {
        event: String,
        body: Option<Value>,
    },
}

/// Cloneable handle used by request handlers and the MI event loop to talk
/// to the client.
#[derive(Clone)]
pub struct ClientHandle {
    tx: mpsc::UnboundedSender<OutboundMessage>,
    pending_requests: Arc<parking_lot::Mutex<HashMap<i64, String>>>,
}

impl ClientHandle {
    /// Track an incoming request so the matching response can be validated.
    pub fn register_request(&self, request: &Request) {
        self.pending_requests
            .lock()
            .insert(request.seq, request.command.clone());
    }

    pub fn send_event<S: Serialize>(
        &self,
        event_type: &str,
        event_body: Option<S>,
    ) -> anyhow::Result<()> {
        let body = event_body.map(serde_json::to_value).transpose()?;
        self.tx
            .send(OutboundMessage::Event {
                event: event_type.to_string(),
                body,
            })
            .context("DAP client connection is gone")
    }

    /// Log a message to the client's Debug Console. Returns false if the
    /// message could not be sent.
    pub fn log_to_console(&self, message: impl Into<String>) -> bool {
        self.output("console", format!("{}\n", message.into()))
    }

    pub fn output(&self, category: &str, output: impl Into<String>) -> bool {
        self.send_event(
            "output",
            Some(OutputEventBody {
                category: Some(category.to_string()),
                output: output.into(),
                variables_reference: None,
                source: None,
                line: None,
            }),
        )
        .is_ok()
    }

    /// A bare `success = false` response with no error body: used where
    /// the failure is expected and should not surface error text (a hover
    /// evaluation that missed, a racy query while the target runs).
    pub fn send_plain_failure(&self, request: &Request) -> anyhow::Result<()> {
        if self.pending_requests.lock().remove(&request.seq).is_none() {
            tracing::error!(
                "Sending a response to request #{} ({}) which has no pending entry",
                request.seq,
                request.command
            );
        }
        self.tx
            .send(OutboundMessage::Response {
                request_seq: request.seq,
                command: request.command.clone(),
                success: false,
                message: None,
                body: None,
            })
            .context("DAP client connection is gone")
    }

    pub fn send_response<S: Serialize>(
        &self,
        request: &Request,
        response: Result<Option<S>, &DebuggerError>,
    ) -> anyhow::Result<()> {
        let outbound = match response {
            Ok(value) => OutboundMessage::Response {
                request_seq: request.seq,
                command: request.command.clone(),
                success: true,
                message: None,
                body: value.map(serde_json::to_value).transpose()?,
            },
            Err(debugger_error) => {
                let mut response_message = debugger_error.to_string();
                let mut child_error: Option<&dyn std::error::Error> =
                    std::error::Error::source(debugger_error);
                while let Some(source_error) = child_error {
                    response_message =
                        format!("{response_message}\n\t{}", source_error);
                    child_error = std::error::Error::source(source_error);
                }
                // Errors during 'launch' or 'attach' arrive before the client
                // listens for 'output' events, so log them to the console too.
                self.log_to_console(&response_message);

                let response_body = ErrorResponseBody {
                    error: Some(Message {
                        id: 0,
                        format: "{response_message}".to_string(),
                        variables: Some(std::collections::BTreeMap::from([(
                            "response_message".to_string(),
                            response_message,
                        )])),
                        send_telemetry: Some(false),
                        show_user: Some(true),
                    }),
                };

                OutboundMessage::Response {
                    request_seq: request.seq,
                    command: request.command.clone(),
                    success: false,
                    // Predefined value in the DAP spec.
                    message: Some("cancelled".to_string()),
                    body: Some(serde_json::to_value(response_body)?),
                }
            }
        };

        if self.pending_requests.lock().remove(&request.seq).is_none() {
            tracing::error!(
                "Sending a response to request #{} ({}) which has no pending entry",
                request.seq,
                request.command
            );
        }

        self.tx
            .send(outbound)
            .context("DAP client connection is gone")
    }
}

/// Wire up a DAP connection over a pair of byte streams. Returns the
/// incoming request channel and the outgoing handle. Both background tasks
/// end when their stream does.
pub fn start_connection<R, W>(reader: R, writer: W) -> (mpsc::Receiver<Request>, ClientHandle)
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (request_tx, request_rx) = mpsc::channel::<Request>(256);
    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();

    let handle = ClientHandle {
        tx: outbound_tx,
        pending_requests: Arc::new(parking_lot::Mutex::new(HashMap::new())),
    };

    tokio::spawn(read_requests(reader, request_tx));
    tokio::spawn(write_messages(writer, outbound_rx));

    (request_rx, handle)
}

async fn read_requests<R>(reader: R, request_tx: mpsc::Sender<Request>)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let mut framed = FramedRead::new(reader, DapCodec::<Request>::new());
    while let Some(item) = framed.next().await {
        match item {
            Ok(request) => {
                tracing::debug!("Received request: {:?}", request);
                if request_tx.send(request).await.is_err() {
                    break;
                }
            }
            Err(error) => {
                // The codec recovers by scanning for the next valid header.
                tracing::warn!("Error while decoding a DAP request: {:?}", error);
            }
        }
    }
    tracing::debug!("DAP request stream ended");
}

async fn write_messages<W>(mut writer: W, mut outbound_rx: mpsc::UnboundedReceiver<OutboundMessage>)
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    let mut codec = DapCodec::<Request>::new();
    let mut seq = 1;
    let mut buf = BytesMut::new();
    while let Some(message) = outbound_rx.recv().await {
        let encoded = match message {
            OutboundMessage::Response {
                request_seq,
                command,
                success,
                message,
                body,
            } => {
                let response = Response {
                    seq,
                    request_seq,
                    type_: "response".to_string(),
                    command,
                    success,
                    message,
                    body,
                };
                tracing::debug!("send_response: {:?}", response);
                codec.encode(&response, &mut buf)
            }
            OutboundMessage::Event { event, body } => {
                let event = Event {
                    seq,
                    type_: "event".to_string(),
                    event,
                    body,
                };
                if event.event != "output" {
                    tracing::debug!("Triggered DAP event: {:?}", event);
                }
                codec.encode(&event, &mut buf)
            }
        };
        if let Err(error) = encoded {
            tracing::error!("Failed to encode a DAP message: {error}");
            continue;
        }
        seq += 1;
        if let Err(error) = writer.write_all(&buf.split()).await {
            tracing::error!("Failed to send a message to the client: {error}");
            break;
        }
        if writer.flush().await.is_err() {
            break;
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;
    use tokio::io::AsyncReadExt;
    use tokio_util::bytes::BytesMut;
    use tokio_util::codec::Decoder;

    use super::*;
    use crate::adapter::dap_types::ThreadsResponseBody;

    fn request(seq: i64, command: &str) -> Request {
        Request {
            seq,
            type_: "request".to_string(),
            command: command.to_string(),
            arguments: None,
        }
    }

    async fn read_frames(mut reader: tokio::io::DuplexStream, expect: usize) -> Vec<Value> {
        let mut codec = DapCodec::<Value>::new();
        let mut buf = BytesMut::new();
        let mut frames = Vec::new();
        let mut chunk = [0u8; 1024];
        while frames.len() < expect {
            let n = reader.read(&mut chunk).await.unwrap();
            assert!(n > 0, "stream ended early");
            buf.extend_from_slice(&chunk[..n]);
            while let Some(frame) = codec.decode(&mut buf).unwrap() {
                frames.push(frame);
            }
        }
        frames
    }

    #[tokio::test]
    async fn responses_and_events_share_the_sequence_counter() {
        let (client_side, server_side) = tokio::io::duplex(4096);
        let (read_half, write_half) = tokio::io::split(server_side);
        let (_requests, handle) = start_connection(read_half, write_half);

        let req = request(3, "threads");
        handle.register_request(&req);
        handle
            .send_response(
                &req,
                Ok(Some(ThreadsResponseBody { threads: vec![] })),
            )
            .unwrap();
        handle.send_event::<()>("initialized", None).unwrap();

        let frames = read_frames(client_side, 2).await;
        assert_eq!(frames[0]["seq"], 1);
        assert_eq!(frames[0]["request_seq"], 3);
        assert_eq!(frames[0]["success"], true);
        assert_eq!(frames[1]["seq"], 2);
        assert_eq!(frames[1]["event"], "initialized");
    }

    #[tokio::test]
    async fn error_responses_carry_the_message_and_a_console_log() {
        let (client_side, server_side) = tokio::io::duplex(4096);
        let (read_half, write_half) = tokio::io::split(server_side);
        let (_requests, handle) = start_connection(read_half, write_half);

        let req = request(9, "stackTrace");
        handle.register_request(&req);
        handle
            .send_response::<()>(
                &req,
                Err(&DebuggerError::UserMessage("no such frame".to_string())),
            )
            .unwrap();

        let frames = read_frames(client_side, 2).await;
        // The console log goes out first, then the error response.
        assert_eq!(frames[0]["event"], "output");
        assert_eq!(frames[0]["body"]["category"], "console");
        assert_eq!(frames[1]["success"], false);
        assert_eq!(
            frames[1]["body"]["error"]["variables"]["response_message"],
            "no such frame"
        );
    }
}
