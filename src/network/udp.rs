//! UDP socket setup
//!
//! Socket creation is the one place where failure is fatal: a stream cannot
//! start without its socket, so errors here surface to the caller instead of
//! being absorbed into counters.

use socket2::{Domain, Protocol, Socket, Type};
use std::net::{Ipv4Addr, SocketAddr, UdpSocket};
use std::time::Duration;

use crate::constants::SOCKET_TIMEOUT_MS;
use crate::error::NetworkError;

/// Bind the receive socket on all interfaces.
///
/// The read timeout bounds how long the receive loop can block, which in turn
/// bounds shutdown latency.
pub fn bind_receiver(port: u16, recv_buffer_size: usize) -> Result<UdpSocket, NetworkError> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))
        .map_err(|e| NetworkError::BindFailed(e.to_string()))?;

    socket
        .set_recv_buffer_size(recv_buffer_size)
        .map_err(|e| NetworkError::BindFailed(e.to_string()))?;
    socket
        .set_reuse_address(true)
        .map_err(|e| NetworkError::BindFailed(e.to_string()))?;

    let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, port));
    socket
        .bind(&addr.into())
        .map_err(|e| NetworkError::BindFailed(format!("{}: {}", addr, e)))?;

    let socket: UdpSocket = socket.into();
    socket
        .set_read_timeout(Some(Duration::from_millis(SOCKET_TIMEOUT_MS)))
        .map_err(|e| NetworkError::BindFailed(e.to_string()))?;

    Ok(socket)
}

/// Create the send socket, connected to the target address.
pub fn connect_sender(
    target: SocketAddr,
    send_buffer_size: usize,
) -> Result<UdpSocket, NetworkError> {
    let socket = Socket::new(Domain::for_address(target), Type::DGRAM, Some(Protocol::UDP))
        .map_err(|e| NetworkError::ConnectionFailed(e.to_string()))?;

    socket
        .set_send_buffer_size(send_buffer_size)
        .map_err(|e| NetworkError::ConnectionFailed(e.to_string()))?;

    let bind_addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0));
    socket
        .bind(&bind_addr.into())
        .map_err(|e| NetworkError::ConnectionFailed(e.to_string()))?;

    let socket: UdpSocket = socket.into();
    socket
        .connect(target)
        .map_err(|e| NetworkError::ConnectionFailed(format!("{}: {}", target, e)))?;

    Ok(socket)
}
