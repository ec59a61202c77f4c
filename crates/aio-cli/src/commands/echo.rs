// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! `aio echo`: accept loop plus one echo task per connection.

use std::io;
use std::net::{SocketAddr, TcpStream};

use aio_rt::{BoxError, RuntimeConfig, Scheduler, TaskContext};
use aio_sockets::{AsyncSocketFactory, SocketFactory};
use tracing::{info, warn};

use crate::output;

const CHUNK: usize = 4096;

/// Serve until `limit` connections have been accepted and closed, or
/// forever without one.
pub fn cmd_echo(config: &RuntimeConfig, addr: SocketAddr, limit: Option<usize>) -> Result<(), BoxError> {
    let mut sched = Scheduler::from_config(config)?;
    let factory = AsyncSocketFactory::from_config(config);
    let listener = factory.build_read_socket(addr)?;
    println!("listening on {}", output::address(listener.local_addr()?));

    sched.new_task(move |cx| async move {
        let mut accepted = 0usize;
        while limit.is_none_or(|n| accepted < n) {
            let (stream, peer) = match cx.wait_accept(&listener).await {
                Ok(conn) => conn,
                Err(err) if is_transient_accept_error(&err) => {
                    warn!(error = %err, "accept failed, still listening");
                    continue;
                }
                Err(err) => return Err(BoxError::from(err)),
            };
            accepted += 1;
            info!(%peer, "accepted");

            cx.spawn(move |cx| async move {
                match echo(&cx, &stream).await {
                    Ok(bytes) => info!(%peer, bytes, "closed"),
                    Err(err) => warn!(%peer, error = %err, "connection failed"),
                }
                Ok::<(), BoxError>(())
            });
        }
        Ok::<(), BoxError>(())
    });

    sched.run()?;
    println!("{}", output::banner_ok("Echo"));
    Ok(())
}

/// Accept failures that concern one connection, not the listener.
fn is_transient_accept_error(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::WouldBlock
            | io::ErrorKind::Interrupted
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
    )
}

/// Echo until the peer closes. Returns the byte count.
async fn echo(cx: &TaskContext, stream: &TcpStream) -> io::Result<u64> {
    let mut total = 0u64;
    loop {
        let chunk = cx.wait_recv(stream, CHUNK).await?;
        if chunk.is_empty() {
            return Ok(total);
        }
        cx.wait_send_all(stream, &chunk).await?;
        total += chunk.len() as u64;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn per_connection_accept_errors_are_transient() {
        for kind in [
            io::ErrorKind::WouldBlock,
            io::ErrorKind::Interrupted,
            io::ErrorKind::ConnectionAborted,
            io::ErrorKind::ConnectionReset,
        ] {
            assert!(is_transient_accept_error(&io::Error::from(kind)), "{kind:?}");
        }
    }

    #[test]
    fn listener_errors_stop_the_server() {
        for kind in [io::ErrorKind::InvalidInput, io::ErrorKind::PermissionDenied] {
            assert!(!is_transient_accept_error(&io::Error::from(kind)), "{kind:?}");
        }
    }
}
