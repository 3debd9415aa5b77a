//! Supervisor readiness notification
//!
//! Implements the systemd notify protocol: a datagram sent to the
//! socket named by `NOTIFY_SOCKET`. An unset variable means the daemon
//! is not supervised and notification is a silent no-op.

use std::io;
use std::os::linux::net::SocketAddrExt;
use std::os::unix::ffi::OsStrExt;
use std::os::unix::net::{SocketAddr, UnixDatagram};
use std::path::Path;
use tracing::debug;

/// Send one notify message to the supervisor socket, if any.
///
/// Returns whether a message was actually sent.
pub fn notify(message: &str) -> io::Result<bool> {
    let Some(socket) = std::env::var_os("NOTIFY_SOCKET") else {
        debug!("NOTIFY_SOCKET not set, skipping supervisor notification");
        return Ok(false);
    };
    notify_socket(message, socket.as_os_str().as_bytes())?;
    Ok(true)
}

/// Signal that the daemon is up and processing events
pub fn notify_ready() -> io::Result<bool> {
    notify("READY=1")
}

/// Best-effort failure report before a fatal exit
pub fn notify_failure(status: &str) -> io::Result<bool> {
    notify(&format!("STATUS={}\nERRNO=1", status))
}

fn notify_socket(message: &str, socket: &[u8]) -> io::Result<()> {
    let datagram = UnixDatagram::unbound()?;

    // A leading '@' names an abstract-namespace socket
    if let Some(name) = socket.strip_prefix(b"@") {
        let addr = SocketAddr::from_abstract_name(name)?;
        datagram.send_to_addr(message.as_bytes(), &addr)?;
    } else {
        let path = Path::new(std::ffi::OsStr::from_bytes(socket));
        datagram.send_to(message.as_bytes(), path)?;
    }

    Ok(())
}
