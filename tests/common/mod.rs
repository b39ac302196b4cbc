//! Shared helpers for end-to-end tests.

use std::net::SocketAddr;

use chat_rpc::{Connections, HistoryStore, Registry, Server};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

pub struct TestServer {
    pub addr: SocketAddr,
    pub history: HistoryStore,
    shutdown: Option<oneshot::Sender<()>>,
    handle: JoinHandle<Connections>,
}

impl TestServer {
    /// Start a chat server on an ephemeral localhost port.
    pub async fn start() -> TestServer {
        let history = HistoryStore::new();
        TestServer::start_with(Registry::with_chat(history.clone()), history).await
    }

    /// Start a server with a custom registry. `history` is what the test inspects.
    pub async fn start_with(registry: Registry, history: HistoryStore) -> TestServer {
        let server = Server::bind("127.0.0.1:0".parse().unwrap(), registry)
            .await
            .expect("bind test server");
        let addr = server.local_addr().unwrap();

        let (tx, rx) = oneshot::channel();
        let handle = tokio::spawn(server.run(async move {
            let _ = rx.await;
        }));

        TestServer {
            addr,
            history,
            shutdown: Some(tx),
            handle,
        }
    }

    /// Close the listener and hand back the still-open connections.
    pub async fn shutdown(mut self) -> Connections {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        self.handle.await.expect("server task panicked")
    }
}
