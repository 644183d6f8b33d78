//! Connection registry
//!
//! Orchestrator-side ordered collection of worker links. Port pairs are
//! derived deterministically from a base port and the worker index, so the
//! orchestrator can enumerate its workers without a discovery protocol. The
//! set is fixed at startup; there is no dynamic add or remove.

use super::PeerConnection;
use crate::collab::UiSink;
use crate::dispatch::WorkerDispatcher;
use crate::protocol::Message;
use anyhow::{Context, Result};
use std::sync::Arc;

/// Port pair for worker `index`: `listen = base + 2i`, `send = base + 2i + 1`.
/// The worker mirrors the pair, so what it sends on is what the orchestrator
/// listens on.
pub fn port_pair(base_port: u16, index: usize) -> (u16, u16) {
    let listen = base_port + 2 * index as u16;
    (listen, listen + 1)
}

/// Ordered set of worker peer connections.
pub struct ConnectionRegistry {
    workers: Vec<Arc<PeerConnection<WorkerDispatcher>>>,
}

impl ConnectionRegistry {
    /// Build the worker links `worker-0 .. worker-(count-1)` against `host`,
    /// each carrying its own dispatcher wired to the shared UI sink.
    pub fn new(
        host: &str,
        base_port: u16,
        count: usize,
        chunk_size: usize,
        ui: &Arc<dyn UiSink>,
    ) -> Self {
        let workers = (0..count)
            .map(|i| {
                let (listen_port, send_port) = port_pair(base_port, i);
                Arc::new(
                    PeerConnection::new(
                        format!("worker-{}", i),
                        host,
                        send_port,
                        listen_port,
                        Arc::new(WorkerDispatcher::new(ui.clone())),
                    )
                    .with_chunk_size(chunk_size),
                )
            })
            .collect();
        Self { workers }
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    /// Lookup by worker index, for UI panels.
    pub fn get(&self, index: usize) -> Option<&Arc<PeerConnection<WorkerDispatcher>>> {
        self.workers.get(index)
    }

    /// Iterate the workers in index order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<PeerConnection<WorkerDispatcher>>> {
        self.workers.iter()
    }

    /// Connect every worker link, one task per peer. All peers progress in
    /// parallel; the first connect failure propagates after every task has
    /// finished, leaving successfully connected peers running.
    pub async fn connect_all(&self) -> Result<()> {
        let mut handles = Vec::new();
        for peer in &self.workers {
            let peer = peer.clone();
            handles.push(tokio::spawn(async move { peer.connect().await }));
        }

        let mut first_failure = None;
        for handle in handles {
            let result = handle.await.context("connect task panicked")?;
            if let Err(e) = result {
                first_failure.get_or_insert(e);
            }
        }
        match first_failure {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Fan one request out to every worker, in index order. Each send is
    /// paced individually; there is no ordering guarantee across links.
    pub async fn broadcast(&self, msg: &Message) -> Result<()> {
        for peer in &self.workers {
            peer.send(msg).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collab::RecordingUi;
    use crate::protocol::codec::{self, CHUNK_SIZE};
    use crate::protocol::{AccuracyReport, Message};
    use std::time::Duration;
    use tokio::net::{TcpListener, TcpStream};
    use tokio::time::{sleep, timeout};

    const WAIT: Duration = Duration::from_secs(5);

    /// Bind both remote sockets for `count` workers at a common base port.
    /// Returns the base port and a task that resolves to one
    /// (inbound-writer, outbound-reader) socket pair per worker, in index
    /// order, once the registry has connected.
    async fn remote_workers(
        count: usize,
    ) -> (u16, tokio::task::JoinHandle<Vec<(TcpStream, TcpStream)>>) {
        // Find a base where the whole 2*count port range is free.
        'base: loop {
            let probe = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let base = probe.local_addr().unwrap().port();
            drop(probe);
            if base > u16::MAX - 2 * count as u16 {
                continue;
            }

            let mut listeners = Vec::new();
            for i in 0..count {
                let (listen_port, send_port) = port_pair(base, i);
                let Ok(inbound_side) = TcpListener::bind(("127.0.0.1", listen_port)).await
                else {
                    continue 'base;
                };
                let Ok(outbound_side) = TcpListener::bind(("127.0.0.1", send_port)).await
                else {
                    continue 'base;
                };
                listeners.push((inbound_side, outbound_side));
            }

            let accept = tokio::spawn(async move {
                let mut sockets = Vec::new();
                for (inbound_side, outbound_side) in listeners {
                    let (inbound, _) = inbound_side.accept().await.unwrap();
                    let (outbound, _) = outbound_side.accept().await.unwrap();
                    sockets.push((inbound, outbound));
                }
                sockets
            });

            return (base, accept);
        }
    }

    #[test]
    fn test_port_pair_derivation() {
        assert_eq!(port_pair(9100, 0), (9100, 9101));
        assert_eq!(port_pair(9100, 1), (9102, 9103));
        assert_eq!(port_pair(9100, 5), (9110, 9111));
    }

    #[tokio::test]
    async fn test_registry_order_and_lookup() {
        let ui: Arc<dyn UiSink> = Arc::new(RecordingUi::new());
        let registry = ConnectionRegistry::new("127.0.0.1", 9100, 3, CHUNK_SIZE, &ui);

        assert_eq!(registry.len(), 3);
        assert!(!registry.is_empty());
        assert_eq!(registry.get(0).unwrap().name(), "worker-0");
        assert_eq!(registry.get(2).unwrap().name(), "worker-2");
        assert!(registry.get(3).is_none());

        let names: Vec<_> = registry.iter().map(|p| p.name().to_string()).collect();
        assert_eq!(names, vec!["worker-0", "worker-1", "worker-2"]);
        assert_eq!(
            registry.get(1).unwrap().connection_details(),
            "127.0.0.1:9103, 9102"
        );
    }

    #[tokio::test]
    async fn test_broadcast_and_peer_isolation() {
        let ui = Arc::new(RecordingUi::new());
        let sink: Arc<dyn UiSink> = ui.clone();
        let (base, accept) = remote_workers(3).await;

        let registry = ConnectionRegistry::new("127.0.0.1", base, 3, CHUNK_SIZE, &sink);
        registry.connect_all().await.unwrap();
        let mut remotes = accept.await.unwrap();

        // Broadcast reaches every worker in index order.
        registry.broadcast(&Message::RetrainModel).await.unwrap();
        for (_, outbound) in remotes.iter_mut() {
            let received = timeout(WAIT, codec::read_message(outbound, CHUNK_SIZE))
                .await
                .unwrap()
                .unwrap();
            assert_eq!(received, Some(Message::RetrainModel));
        }

        // Force a failure on worker 1's listener by closing its inbound
        // socket, then keep dispatching through workers 0 and 2.
        let (dead_inbound, _) = remotes.remove(1);
        drop(dead_inbound);
        sleep(Duration::from_millis(100)).await;

        codec::write_message(
            &mut remotes[0].0,
            &Message::PostAccuracy(AccuracyReport::Current(0.51)),
        )
        .await
        .unwrap();
        codec::write_message(
            &mut remotes[1].0,
            &Message::PostAccuracy(AccuracyReport::Current(0.72)),
        )
        .await
        .unwrap();

        timeout(WAIT, async {
            loop {
                let events = ui.events();
                if events.contains(&"accuracy:0.51".to_string())
                    && events.contains(&"accuracy:0.72".to_string())
                {
                    break;
                }
                sleep(Duration::from_millis(20)).await;
            }
        })
        .await
        .expect("surviving workers stopped dispatching");

        assert_eq!(registry.get(0).unwrap().dispatcher().accuracy(), Some(0.51));
        assert_eq!(registry.get(2).unwrap().dispatcher().accuracy(), Some(0.72));
        assert_eq!(registry.get(1).unwrap().dispatcher().accuracy(), None);
    }

    #[tokio::test]
    async fn test_connect_failure_leaves_other_peers_connected() {
        let ui: Arc<dyn UiSink> = Arc::new(RecordingUi::new());
        let (base, accept) = remote_workers(2).await;

        // Three workers configured, but only two have remote endpoints.
        let registry = ConnectionRegistry::new("127.0.0.1", base, 3, CHUNK_SIZE, &ui);
        assert!(registry.connect_all().await.is_err());
        let _remotes = accept.await.unwrap();

        use crate::peer::LinkState;
        assert_eq!(registry.get(0).unwrap().state(), LinkState::Connected);
        assert_eq!(registry.get(1).unwrap().state(), LinkState::Connected);
        assert_ne!(registry.get(2).unwrap().state(), LinkState::Connected);
    }
}
