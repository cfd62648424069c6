//! TCP transport: one debug session per accepted connection.

use std::io::{self, BufReader};
use std::net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::thread;

use brew_host::EngineRegistry;
use tracing::{info, warn};

use crate::adapter::DebugAdapter;

/// Port editors connect to when none is configured.
pub const DEFAULT_PORT: u16 = 8888;

/// Accepts DAP clients and runs each session on its own thread.
pub struct DebugServer {
    listener: TcpListener,
    registry: Arc<EngineRegistry>,
}

impl DebugServer {
    pub fn bind(addr: impl ToSocketAddrs, registry: Arc<EngineRegistry>) -> io::Result<Self> {
        let listener = TcpListener::bind(addr)?;
        Ok(Self { listener, registry })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept connections until the listener fails.
    pub fn serve(&self) -> io::Result<()> {
        info!(addr = %self.local_addr()?, "listening for DAP clients");
        for stream in self.listener.incoming() {
            let stream = match stream {
                Ok(stream) => stream,
                Err(err) => {
                    warn!(%err, "accept failed");
                    continue;
                }
            };
            let registry = Arc::clone(&self.registry);
            thread::Builder::new()
                .name("brew-dap-session".into())
                .spawn(move || {
                    if let Err(err) = run_session(stream, registry) {
                        warn!(%err, "session ended with an error");
                    }
                })?;
        }
        Ok(())
    }
}

/// Serve one client over `stream` until it disconnects.
pub fn run_session(stream: TcpStream, registry: Arc<EngineRegistry>) -> io::Result<()> {
    let peer = stream.peer_addr()?;
    info!(%peer, "session opened");
    let reader = BufReader::new(stream.try_clone()?);
    let mut adapter = DebugAdapter::new(registry);
    let result = adapter.run(reader, stream);
    info!(%peer, "session closed");
    result
}
