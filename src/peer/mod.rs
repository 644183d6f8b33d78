//! Peer connections
//!
//! A [`PeerConnection`] owns one remote party's two half-duplex sockets: one
//! for outbound frames, one for inbound. The structure is symmetric across
//! roles; only the dispatcher differs. On a successful connect exactly one
//! listener task is spawned and runs for the lifetime of the process:
//!
//! 1. Block until a size-marker frame is available.
//! 2. Accumulate payload bytes until the marked size is reached.
//! 3. Decode via the framing codec.
//! 4. Dispatch, skipping empty frames.
//! 5. On any failure, log, pause a fixed delay, and resume from step 1.
//!
//! Failure policy is infinite retry without reconnection, as in the source
//! system: a dropped socket degrades to an endless failing read loop on that
//! one link while every other peer's loop keeps running. [`shutdown`] aborts
//! the loop explicitly; there is no reconnect path.
//!
//! [`shutdown`]: PeerConnection::shutdown

use crate::dispatch::Dispatch;
use crate::protocol::codec::{self, CHUNK_SIZE};
use crate::protocol::Message;
use anyhow::{Context, Result};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio::time::sleep;

pub mod registry;

pub use registry::ConnectionRegistry;

/// Fixed pause before the listener loop resumes after a failed receive cycle.
/// No backoff.
pub const RETRY_DELAY: Duration = Duration::from_secs(1);

/// Connection lifecycle. `Connected` is terminal for the connection object;
/// it never returns to `Disconnected`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Disconnected,
    Connecting,
    Connected,
}

type SharedStream = Arc<tokio::sync::Mutex<Option<TcpStream>>>;

/// The dual-socket link to one remote party.
pub struct PeerConnection<D: Dispatch> {
    name: String,
    host: String,
    send_port: u16,
    listen_port: u16,
    chunk_size: usize,
    dispatch: Arc<D>,
    state: Mutex<LinkState>,
    outbound: SharedStream,
    listener: Mutex<Option<JoinHandle<()>>>,
}

impl<D: Dispatch> PeerConnection<D> {
    pub fn new(
        name: impl Into<String>,
        host: impl Into<String>,
        send_port: u16,
        listen_port: u16,
        dispatch: Arc<D>,
    ) -> Self {
        Self {
            name: name.into(),
            host: host.into(),
            send_port,
            listen_port,
            chunk_size: CHUNK_SIZE,
            dispatch,
            state: Mutex::new(LinkState::Disconnected),
            outbound: Arc::new(tokio::sync::Mutex::new(None)),
            listener: Mutex::new(None),
        }
    }

    /// Override the receive chunk size (defaults to [`CHUNK_SIZE`]).
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> LinkState {
        *self.state.lock().unwrap()
    }

    /// The dispatcher carried by this link.
    pub fn dispatcher(&self) -> &Arc<D> {
        &self.dispatch
    }

    /// Human-readable endpoint summary for UI panels.
    pub fn connection_details(&self) -> String {
        format!("{}:{}, {}", self.host, self.send_port, self.listen_port)
    }

    /// Connect both sockets and spawn the listener loop.
    ///
    /// The inbound socket is connected first, then the outbound one. A
    /// connect failure is fatal for this peer only: it propagates to the
    /// caller, no retry is attempted, and other peers are unaffected.
    pub async fn connect(&self) -> Result<()> {
        *self.state.lock().unwrap() = LinkState::Connecting;
        println!(
            "[{}] connecting on ports {}, {}",
            self.name, self.listen_port, self.send_port
        );

        let inbound = TcpStream::connect((self.host.as_str(), self.listen_port))
            .await
            .with_context(|| {
                format!(
                    "failed to connect listen socket to {}:{}",
                    self.host, self.listen_port
                )
            })?;
        let outbound = TcpStream::connect((self.host.as_str(), self.send_port))
            .await
            .with_context(|| {
                format!(
                    "failed to connect send socket to {}:{}",
                    self.host, self.send_port
                )
            })?;

        *self.outbound.lock().await = Some(outbound);
        *self.state.lock().unwrap() = LinkState::Connected;

        let handle = tokio::spawn(listener_loop(
            inbound,
            self.chunk_size,
            self.dispatch.clone(),
            self.outbound.clone(),
            self.name.clone(),
        ));
        *self.listener.lock().unwrap() = Some(handle);

        println!("[{}] connected", self.name);
        Ok(())
    }

    /// Send one message on the outbound socket.
    ///
    /// Sends on a single link are serialized by the outbound lock, which is
    /// held across the pacing pause between the size-marker and payload
    /// writes; command order on one peer is message-submission order.
    pub async fn send(&self, msg: &Message) -> Result<()> {
        let mut guard = self.outbound.lock().await;
        let stream = guard
            .as_mut()
            .with_context(|| format!("peer {} is not connected", self.name))?;
        codec::write_message(stream, msg)
            .await
            .with_context(|| format!("failed to send {:?} to {}", msg.code(), self.name))
    }

    /// Abort the listener task. The sockets close on drop; there is no
    /// reconnect path, so the link is unusable afterwards.
    pub fn shutdown(&self) {
        if let Some(handle) = self.listener.lock().unwrap().take() {
            handle.abort();
        }
    }
}

impl<D: Dispatch> Drop for PeerConnection<D> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Perpetual receive loop for one peer. Runs until the task is aborted.
async fn listener_loop<D: Dispatch>(
    mut inbound: TcpStream,
    chunk_size: usize,
    dispatch: Arc<D>,
    outbound: SharedStream,
    name: String,
) {
    loop {
        if let Err(e) = receive_cycle(&mut inbound, chunk_size, dispatch.as_ref(), &outbound).await
        {
            eprintln!("[{}] receive failed: {:#}", name, e);
            sleep(RETRY_DELAY).await;
        }
    }
}

/// One receive cycle: read a frame, decode, dispatch, and issue the handler's
/// follow-up request on the same link if it produced one.
async fn receive_cycle<D: Dispatch>(
    inbound: &mut TcpStream,
    chunk_size: usize,
    dispatch: &D,
    outbound: &SharedStream,
) -> Result<()> {
    let msg = match codec::read_message(inbound, chunk_size).await? {
        Some(msg) => msg,
        None => return Ok(()), // empty frame, skipped
    };

    if let Some(follow_up) = dispatch.dispatch(msg)? {
        let mut guard = outbound.lock().await;
        let stream = guard
            .as_mut()
            .context("outbound socket missing for follow-up request")?;
        codec::write_message(stream, &follow_up).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collab::{ModelService, RecordingUi, StubModel};
    use crate::dispatch::{OrchestratorDispatcher, WorkerDispatcher};
    use crate::protocol::{AccuracyReport, Participation};
    use std::time::Duration;
    use tokio::net::TcpListener;
    use tokio::time::timeout;

    const WAIT: Duration = Duration::from_secs(5);

    /// Bind the remote ends of one peer link and return (listen, send) ports
    /// plus accept futures for both sockets.
    async fn remote_pair() -> (u16, u16, TcpListener, TcpListener) {
        let inbound_side = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let outbound_side = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let listen_port = inbound_side.local_addr().unwrap().port();
        let send_port = outbound_side.local_addr().unwrap().port();
        (listen_port, send_port, inbound_side, outbound_side)
    }

    async fn wait_for<F: Fn() -> bool>(condition: F) {
        timeout(WAIT, async {
            while !condition() {
                sleep(Duration::from_millis(20)).await;
            }
        })
        .await
        .expect("condition not reached in time");
    }

    #[tokio::test]
    async fn test_connect_reaches_terminal_state() {
        let (listen_port, send_port, inbound_side, outbound_side) = remote_pair().await;
        let ui = Arc::new(RecordingUi::new());
        let peer = PeerConnection::new(
            "worker-0",
            "127.0.0.1",
            send_port,
            listen_port,
            Arc::new(WorkerDispatcher::new(ui)),
        );
        assert_eq!(peer.state(), LinkState::Disconnected);

        let accept = tokio::spawn(async move {
            let (inbound, _) = inbound_side.accept().await.unwrap();
            let (outbound, _) = outbound_side.accept().await.unwrap();
            (inbound, outbound)
        });

        peer.connect().await.unwrap();
        assert_eq!(peer.state(), LinkState::Connected);
        accept.await.unwrap();
    }

    #[tokio::test]
    async fn test_connect_failure_propagates() {
        let ui = Arc::new(RecordingUi::new());
        // Nothing listens on these ports.
        let peer = PeerConnection::new(
            "worker-0",
            "127.0.0.1",
            1,
            2,
            Arc::new(WorkerDispatcher::new(ui)),
        );
        assert!(peer.connect().await.is_err());
    }

    #[tokio::test]
    async fn test_send_before_connect_fails() {
        let ui = Arc::new(RecordingUi::new());
        let peer = PeerConnection::new(
            "worker-0",
            "127.0.0.1",
            1,
            2,
            Arc::new(WorkerDispatcher::new(ui)),
        );
        assert!(peer.send(&Message::GetAccuracy).await.is_err());
    }

    #[tokio::test]
    async fn test_inbound_frames_reach_the_dispatcher() {
        let (listen_port, send_port, inbound_side, outbound_side) = remote_pair().await;
        let ui = Arc::new(RecordingUi::new());
        let dispatcher = Arc::new(WorkerDispatcher::new(ui.clone()));
        let peer = PeerConnection::new(
            "worker-0",
            "127.0.0.1",
            send_port,
            listen_port,
            dispatcher.clone(),
        );

        let accept = tokio::spawn(async move {
            let (inbound, _) = inbound_side.accept().await.unwrap();
            let (outbound, _) = outbound_side.accept().await.unwrap();
            (inbound, outbound)
        });
        peer.connect().await.unwrap();
        let (mut remote_tx, _remote_rx) = accept.await.unwrap();

        codec::write_message(
            &mut remote_tx,
            &Message::PostAccuracy(AccuracyReport::Current(0.8734)),
        )
        .await
        .unwrap();

        wait_for(|| dispatcher.accuracy().is_some()).await;
        assert_eq!(dispatcher.accuracy(), Some(0.8734));
        assert_eq!(ui.events(), vec!["accuracy:0.873"]);
    }

    #[tokio::test]
    async fn test_send_writes_a_decodable_frame() {
        let (listen_port, send_port, inbound_side, outbound_side) = remote_pair().await;
        let ui = Arc::new(RecordingUi::new());
        let peer = PeerConnection::new(
            "worker-0",
            "127.0.0.1",
            send_port,
            listen_port,
            Arc::new(WorkerDispatcher::new(ui)),
        );

        let accept = tokio::spawn(async move {
            let (inbound, _) = inbound_side.accept().await.unwrap();
            let (outbound, _) = outbound_side.accept().await.unwrap();
            (inbound, outbound)
        });
        peer.connect().await.unwrap();
        let (_remote_tx, mut remote_rx) = accept.await.unwrap();

        peer.send(&Message::RetrainModel).await.unwrap();

        let received = timeout(WAIT, codec::read_message(&mut remote_rx, CHUNK_SIZE))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(received, Some(Message::RetrainModel));
    }

    #[tokio::test]
    async fn test_structure_reply_triggers_autonomous_weights_request() {
        // Scenario: the remote aggregation service answers GetStructure; the
        // link must install the architecture and put a GetWeights request on
        // the wire without any caller involvement.
        let (listen_port, send_port, inbound_side, outbound_side) = remote_pair().await;
        let ui = Arc::new(RecordingUi::new());
        let model = Arc::new(StubModel::new());
        let dispatcher = Arc::new(OrchestratorDispatcher::new(ui.clone(), model.clone()));
        let peer = PeerConnection::new(
            "aggregation-service",
            "127.0.0.1",
            send_port,
            listen_port,
            dispatcher,
        );

        let accept = tokio::spawn(async move {
            let (inbound, _) = inbound_side.accept().await.unwrap();
            let (outbound, _) = outbound_side.accept().await.unwrap();
            (inbound, outbound)
        });
        peer.connect().await.unwrap();
        let (mut remote_tx, mut remote_rx) = accept.await.unwrap();

        let arch = r#"{"model_type":"ResNet"}"#;
        codec::write_message(&mut remote_tx, &Message::GetStructure(Some(arch.to_string())))
            .await
            .unwrap();

        let follow_up = timeout(WAIT, codec::read_message(&mut remote_rx, CHUNK_SIZE))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(follow_up, Some(Message::GetWeights(None)));
        assert_eq!(model.architecture().as_deref(), Some(arch));
        assert_eq!(ui.events(), vec!["model:ResNet"]);
    }

    #[tokio::test]
    async fn test_listener_survives_a_bad_frame() {
        let (listen_port, send_port, inbound_side, outbound_side) = remote_pair().await;
        let ui = Arc::new(RecordingUi::new());
        let dispatcher = Arc::new(WorkerDispatcher::new(ui));
        let peer = PeerConnection::new(
            "worker-0",
            "127.0.0.1",
            send_port,
            listen_port,
            dispatcher.clone(),
        );

        let accept = tokio::spawn(async move {
            let (inbound, _) = inbound_side.accept().await.unwrap();
            let (outbound, _) = outbound_side.accept().await.unwrap();
            (inbound, outbound)
        });
        peer.connect().await.unwrap();
        let (mut remote_tx, _remote_rx) = accept.await.unwrap();

        // A frame whose payload is not a valid zlib stream.
        use tokio::io::AsyncWriteExt;
        remote_tx.write_all(&4u32.to_le_bytes()).await.unwrap();
        remote_tx.write_all(&[1, 2, 3, 4]).await.unwrap();

        // After the retry pause the loop must keep dispatching.
        codec::write_message(
            &mut remote_tx,
            &Message::IsParticipant(Participation::Accepted),
        )
        .await
        .unwrap();

        wait_for(|| dispatcher.participation() == Participation::Accepted).await;
    }
}
