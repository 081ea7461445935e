// TCP listener setup for the Ingestion API
// Socket options applied before bind, the same way for every address family

use anyhow::{Context, Result};
use socket2::{Domain, Protocol, Socket, Type};
use std::net::{SocketAddr, ToSocketAddrs};
use tokio::net::TcpListener;
use tracing::info;

/// Listener tuning knobs
#[derive(Debug, Clone)]
pub struct ListenerConfig {
    /// Pending connection backlog
    pub backlog: i32,

    /// Enable TCP_NODELAY (disable Nagle's algorithm)
    pub tcp_nodelay: bool,

    /// Enable SO_REUSEADDR so restarts do not wait out TIME_WAIT
    pub so_reuseaddr: bool,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            backlog: 1024,
            tcp_nodelay: true,
            so_reuseaddr: true,
        }
    }
}

/// Resolve a `host:port` string to the first socket address
pub fn resolve(address: &str) -> Result<SocketAddr> {
    address
        .to_socket_addrs()
        .with_context(|| format!("Failed to resolve listen address {}", address))?
        .next()
        .with_context(|| format!("Listen address {} resolved to nothing", address))
}

/// Create a tuned, non-blocking listener bound to `addr`
pub fn create_listener(addr: &SocketAddr, config: &ListenerConfig) -> Result<TcpListener> {
    let domain = if addr.is_ipv4() {
        Domain::IPV4
    } else {
        Domain::IPV6
    };

    let socket = Socket::new(domain, Type::STREAM, Some(Protocol::TCP))?;

    if config.so_reuseaddr {
        socket.set_reuse_address(true)?;
    }

    socket.set_nodelay(config.tcp_nodelay)?;

    socket
        .bind(&(*addr).into())
        .with_context(|| format!("Failed to bind {}", addr))?;
    socket.listen(config.backlog)?;
    socket.set_nonblocking(true)?;

    let std_listener: std::net::TcpListener = socket.into();
    let listener = TcpListener::from_std(std_listener)?;

    info!(
        addr = %addr,
        backlog = config.backlog,
        nodelay = config.tcp_nodelay,
        "TCP listener created"
    );

    Ok(listener)
}
