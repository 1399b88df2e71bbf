use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use gdb_dap_server::server::configuration::ConfigOverrides;
use gdb_dap_server::server::logger::DebugLogger;
use gdb_dap_server::server::startup::serve;

/// Debug Adapter Protocol server that drives GDB through its machine
/// interface.
#[derive(Parser)]
#[command(version, about)]
struct Cmd {
    /// IP port number to listen on for DAP connections. Without a port the
    /// adapter serves a single session over stdio.
    #[clap(long)]
    port: Option<u16>,

    /// IP address to listen on for incoming DAP connections.
    #[clap(long, default_value_t = Ipv4Addr::LOCALHOST.into())]
    ip: IpAddr,

    /// Exit after the first debug session ends, as editors expect when
    /// they manage the adapter process themselves.
    #[clap(long, alias("vscode"))]
    single_session: bool,

    /// JSON (or @file) merged over the launch/attach request arguments.
    #[clap(long)]
    config: Option<String>,

    /// Like --config, but applied last: these values cannot be overridden
    /// by the client.
    #[clap(long = "config-frozen")]
    config_frozen: Option<String>,

    /// Write the diagnostic log to this file (JSON lines).
    #[clap(long, env = "GDB_DAP_SERVER_LOG_FILE")]
    log_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cmd = Cmd::parse();

    let logger = DebugLogger::init(cmd.log_file.as_deref())?;

    let overrides = ConfigOverrides {
        config: cmd
            .config
            .as_deref()
            .map(ConfigOverrides::parse_value)
            .transpose()?,
        frozen: cmd
            .config_frozen
            .as_deref()
            .map(ConfigOverrides::parse_value)
            .transpose()?,
    };

    let addr = cmd.port.map(|port| SocketAddr::new(cmd.ip, port));
    serve(addr, cmd.single_session, overrides, logger).await
}
