//! Serving: a TCP accept loop (`--port`), or a single session over stdio.

use std::net::SocketAddr;

use tokio::net::TcpListener;

use crate::server::configuration::ConfigOverrides;
use crate::server::debugger::Debugger;
use crate::server::logger::DebugLogger;

pub async fn serve(
    addr: Option<SocketAddr>,
    single_session: bool,
    overrides: ConfigOverrides,
    logger: DebugLogger,
) -> anyhow::Result<()> {
    let debugger = Debugger::new(overrides, logger.clone());

    let panic_logger = logger.clone();
    let old_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        // Flush pending log lines before printing the panic.
        panic_logger.flush_to_stderr();
        old_hook(panic_info);
    }));

    let Some(addr) = addr else {
        // No port: a single session over stdio, the way an IDE starts us
        // as a child process.
        debugger
            .debug_session(tokio::io::stdin(), tokio::io::stdout())
            .await?;
        return Ok(());
    };

    let listener = TcpListener::bind(addr).await?;
    tracing::info!("Listening for DAP connections on {addr}");
    logger.flush_to_stderr();

    loop {
        match listener.accept().await {
            Ok((socket, peer)) => {
                tracing::info!("Starting debug session from {peer}");
                let (reader, writer) = socket.into_split();
                match debugger.debug_session(reader, writer).await {
                    Ok(()) => tracing::info!("Closed debug session from {peer}"),
                    Err(error) => tracing::error!("Session ended with error: {error:?}"),
                }
                if single_session {
                    break;
                }
            }
            Err(error) => {
                tracing::error!("Failed to accept a DAP connection: {error:?}");
            }
        }
        logger.flush_to_stderr();
    }
    Ok(())
}
