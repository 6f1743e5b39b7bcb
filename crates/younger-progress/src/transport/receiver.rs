//! Coordinator-side TCP receiver for worker progress frames.
//!
//! Listens on `127.0.0.1:0` (OS-assigned port) and gives every worker
//! connection its own reader task. Readers forward decoded messages into a
//! single unbounded channel consumed by the listener, so a slow display never
//! pushes back on worker sockets. Each connection is read in order, which
//! keeps per-worker FIFO ordering.
//!
//! # Draining
//!
//! [`ReceiverHandle::drain`] stops accepting new work, picks up connections
//! already waiting in the accept backlog, then asks every reader to pick up
//! whatever is still in flight on its socket before exiting. Readers stop
//! once their socket stays quiet for [`TransportConfig::DRAIN_GRACE`] or
//! reaches EOF, bounded overall by [`TransportConfig::DRAIN_DEADLINE`].
//! `drain` returns only after all readers have finished forwarding.

use super::protocol::{decode_frame, parse_message, ProgressMessage};
use crate::config::TransportConfig;
use crate::error::{ProgressError, Result};
use bytes::BytesMut;
use std::net::SocketAddr;
use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// Handle to a running receiver. Dropping aborts it without draining.
#[derive(Debug)]
pub struct ReceiverHandle {
    addr: SocketAddr,
    shutdown_tx: Option<oneshot::Sender<()>>,
    drain_tx: watch::Sender<bool>,
    task_handle: Option<tokio::task::JoinHandle<()>>,
}

impl ReceiverHandle {
    /// Address workers connect to.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Stop accepting connections and tell readers to drain.
    pub fn shutdown(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        let _ = self.drain_tx.send(true);
    }

    /// Shut down and wait until every reader has forwarded its remaining
    /// frames.
    pub async fn drain(mut self) {
        self.shutdown();
        if let Some(handle) = self.task_handle.take() {
            if let Err(e) = handle.await {
                error!("Progress receiver task failed: {}", e);
            }
        }
    }
}

impl Drop for ReceiverHandle {
    fn drop(&mut self) {
        self.shutdown();
        if let Some(handle) = self.task_handle.take() {
            handle.abort();
        }
    }
}

/// Receiver that accepts worker connections.
pub struct ProgressReceiver;

impl ProgressReceiver {
    /// Bind on a random local port and start forwarding into `tx`.
    pub async fn bind(tx: mpsc::UnboundedSender<ProgressMessage>) -> Result<ReceiverHandle> {
        let listener = TcpListener::bind(TransportConfig::BIND_ADDR)
            .await
            .map_err(|e| ProgressError::transport(None, e))?;
        let addr = listener
            .local_addr()
            .map_err(|e| ProgressError::transport(None, e))?;

        info!("Progress receiver listening on {}", addr);

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let (drain_tx, drain_rx) = watch::channel(false);

        let task_handle = tokio::spawn(Self::accept_loop(listener, tx, shutdown_rx, drain_rx));

        Ok(ReceiverHandle {
            addr,
            shutdown_tx: Some(shutdown_tx),
            drain_tx,
            task_handle: Some(task_handle),
        })
    }

    async fn accept_loop(
        listener: TcpListener,
        tx: mpsc::UnboundedSender<ProgressMessage>,
        mut shutdown_rx: oneshot::Receiver<()>,
        drain_rx: watch::Receiver<bool>,
    ) {
        let mut connections = JoinSet::new();

        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown_rx => {
                    debug!("Progress receiver stops accepting");
                    break;
                }
                accept_result = listener.accept() => {
                    match accept_result {
                        Ok((stream, peer_addr)) => {
                            Self::spawn_connection(&mut connections, stream, peer_addr, &tx, &drain_rx);
                        }
                        Err(e) => {
                            error!("Progress accept error: {}", e);
                        }
                    }
                }
                Some(joined) = connections.join_next(), if !connections.is_empty() => {
                    Self::log_connection_end(joined);
                }
            }
        }

        // Workers that connected before the stop may still sit in the backlog
        let deadline = tokio::time::Instant::now() + TransportConfig::DRAIN_DEADLINE;
        let mut late = 0usize;
        while tokio::time::Instant::now() < deadline {
            match tokio::time::timeout(TransportConfig::DRAIN_GRACE, listener.accept()).await {
                Ok(Ok((stream, peer_addr))) => {
                    late += 1;
                    Self::spawn_connection(&mut connections, stream, peer_addr, &tx, &drain_rx);
                }
                Ok(Err(e)) => {
                    error!("Progress accept error during drain: {}", e);
                    break;
                }
                Err(_) => break,
            }
        }
        if late > 0 {
            debug!("Accepted {} backlogged progress connections while draining", late);
        }

        drop(listener);
        while let Some(joined) = connections.join_next().await {
            Self::log_connection_end(joined);
        }
        debug!("Progress receiver drained");
    }

    fn spawn_connection(
        connections: &mut JoinSet<(SocketAddr, Result<()>)>,
        stream: TcpStream,
        peer_addr: SocketAddr,
        tx: &mpsc::UnboundedSender<ProgressMessage>,
        drain_rx: &watch::Receiver<bool>,
    ) {
        if connections.len() >= TransportConfig::MAX_CONNECTIONS {
            warn!(
                "Rejecting progress connection from {}: at max capacity ({})",
                peer_addr,
                TransportConfig::MAX_CONNECTIONS
            );
            return;
        }
        debug!("Progress connection from {}", peer_addr);
        connections.spawn(Self::handle_connection(
            stream,
            peer_addr,
            tx.clone(),
            drain_rx.clone(),
        ));
    }

    fn log_connection_end(
        joined: std::result::Result<(SocketAddr, Result<()>), tokio::task::JoinError>,
    ) {
        match joined {
            Ok((peer, Ok(()))) => debug!("Progress connection {} closed", peer),
            Ok((peer, Err(e))) => warn!("Progress connection {} dropped: {}", peer, e),
            Err(e) => error!("Progress connection task failed: {}", e),
        }
    }

    async fn handle_connection(
        mut stream: TcpStream,
        peer: SocketAddr,
        tx: mpsc::UnboundedSender<ProgressMessage>,
        mut drain_rx: watch::Receiver<bool>,
    ) -> (SocketAddr, Result<()>) {
        let mut buf = BytesMut::with_capacity(TransportConfig::READ_BUFFER_CAPACITY);

        let result: Result<()> = async {
            loop {
                if !Self::forward_frames(&mut buf, &tx)? {
                    return Ok(());
                }

                // read_buf is cancel safe, so losing the race to the drain
                // signal never drops bytes
                let read = tokio::select! {
                    read = stream.read_buf(&mut buf) => Some(read?),
                    _ = drain_rx.wait_for(|draining| *draining) => None,
                };

                match read {
                    Some(0) => return Self::check_eof(&buf),
                    Some(_) => continue,
                    None => break,
                }
            }

            // Drain whatever is still in flight
            let deadline = tokio::time::Instant::now() + TransportConfig::DRAIN_DEADLINE;
            loop {
                if !Self::forward_frames(&mut buf, &tx)? {
                    return Ok(());
                }
                if tokio::time::Instant::now() >= deadline {
                    warn!("Progress connection {} still sending at drain deadline", peer);
                    return Ok(());
                }
                match tokio::time::timeout(TransportConfig::DRAIN_GRACE, stream.read_buf(&mut buf))
                    .await
                {
                    Ok(Ok(0)) => return Self::check_eof(&buf),
                    Ok(Ok(_)) => continue,
                    Ok(Err(e)) => return Err(e.into()),
                    Err(_) => {
                        if !buf.is_empty() {
                            warn!(
                                "Progress connection {} left {} bytes of a partial frame",
                                peer,
                                buf.len()
                            );
                        }
                        return Ok(());
                    }
                }
            }
        }
        .await;

        (peer, result)
    }

    /// Forward every complete frame in `buf`. Returns `false` once the
    /// listener side of the channel is gone.
    fn forward_frames(
        buf: &mut BytesMut,
        tx: &mpsc::UnboundedSender<ProgressMessage>,
    ) -> Result<bool> {
        while let Some(payload) = decode_frame(buf)? {
            let message = parse_message(&payload)?;
            if tx.send(message).is_err() {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn check_eof(buf: &BytesMut) -> Result<()> {
        if buf.is_empty() {
            Ok(())
        } else {
            Err(ProgressError::Validation {
                field: "progress_frame".to_string(),
                message: format!("connection closed inside a frame ({} bytes)", buf.len()),
            })
        }
    }
}
