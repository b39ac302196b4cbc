//! Listener and accept loop.
//!
//! Every accepted socket gets its own task. There is no cap on the number of connections.
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_util::task::TaskTracker;

use crate::peer::PeerChannel;
use crate::service::Registry;

pub struct Server {
    listener: TcpListener,
    registry: Arc<Registry>,
    tracker: TaskTracker,
}

/// Connections still being served after the listener closed.
#[derive(Debug, Clone)]
pub struct Connections {
    tracker: TaskTracker,
}

impl Connections {
    pub fn len(&self) -> usize {
        self.tracker.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracker.is_empty()
    }

    /// Resolves once every connection has ended on its own.
    pub async fn wait(&self) {
        self.tracker.wait().await
    }
}

impl Server {
    pub async fn bind(addr: SocketAddr, registry: Registry) -> io::Result<Server> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Server {
            listener,
            registry: Arc::new(registry),
            tracker: TaskTracker::new(),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept connections until `shutdown` resolves, then close the listener.
    ///
    /// Connections that are already open keep running; the returned handle can wait for them.
    pub async fn run<F>(self, shutdown: F) -> Connections
    where
        F: Future<Output = ()>,
    {
        let Server {
            listener,
            registry,
            tracker,
        } = self;
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown => break,
                accepted = listener.accept() => match accepted {
                    Ok((socket, addr)) => {
                        log::info!("accepted connection from {}", addr);
                        let peer = PeerChannel::new(socket, addr, registry.clone());
                        tracker.spawn(async move {
                            match peer.run().await {
                                Ok(()) => log::info!("{} disconnected", addr),
                                Err(err) => log::warn!("connection to {} ended: {}", addr, err),
                            }
                        });
                    }
                    Err(err) => log::warn!("Accept error: {}", err),
                },
            }
        }

        drop(listener);
        tracker.close();
        log::info!("Server listener closed. Shutting down gracefully.");
        Connections { tracker }
    }
}
