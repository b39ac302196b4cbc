//! Defines IO with one connected client.
use std::net::SocketAddr;
use std::sync::Arc;

use futures::future::Either;
use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::Framed;

use crate::error::{ProtocolError, RpcError};
use crate::message::{Frame, FrameCodec, FrameKind};
use crate::service::Registry;

/// Fills and drains one client socket: one call in, one reply out, until the client goes away.
pub struct PeerChannel<S> {
    net_framer: Framed<S, FrameCodec>,
    /// Only used for logging
    addr: SocketAddr,
    registry: Arc<Registry>,
}

impl<S> PeerChannel<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(socket: S, addr: SocketAddr, registry: Arc<Registry>) -> PeerChannel<S> {
        PeerChannel {
            net_framer: Framed::new(socket, FrameCodec::new()),
            addr,
            registry,
        }
    }

    /// Serve calls until the peer disconnects. An error ends this connection only.
    pub async fn run(mut self) -> Result<(), ProtocolError> {
        while let Some(frame_or_fault) = self.net_framer.next().await {
            let reply = match frame_or_fault? {
                Either::Left(frame) => self.answer(frame),
                Either::Right(fault) => {
                    log::warn!(
                        "damaged frame {} from {}: {}",
                        fault.seq,
                        self.addr,
                        fault.reason
                    );
                    Frame::error(fault.seq, &RpcError::DamagedFrame(fault.reason).to_string())
                }
            };
            self.net_framer.send(reply).await?;
        }
        Ok(())
    }

    fn answer(&self, frame: Frame) -> Frame {
        if frame.kind != FrameKind::Call {
            let err = RpcError::IllFormed(format!("expected a call, got {:?}", frame.kind));
            return Frame::error(frame.seq, &err.to_string());
        }
        let dispatched = frame
            .split_call()
            .map_err(|err| RpcError::IllFormed(err.to_string()))
            .and_then(|(method, args)| {
                log::debug!("{} calls {}", self.addr, method);
                self.registry.dispatch(method, args)
            });
        match dispatched {
            Ok(body) => Frame::reply(frame.seq, body),
            Err(err) => {
                log::debug!("call {} from {} failed: {}", frame.seq, self.addr, err);
                Frame::error(frame.seq, &err.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use tokio::io::duplex;

    use super::*;
    use crate::history::HistoryStore;
    use crate::service::HistoryReply;

    fn client_side<S: AsyncRead + AsyncWrite + Unpin>(stream: S) -> Framed<S, FrameCodec> {
        Framed::new(stream, FrameCodec::new())
    }

    async fn roundtrip<S: AsyncRead + AsyncWrite + Unpin>(
        framer: &mut Framed<S, FrameCodec>,
        frame: Frame,
    ) -> Frame {
        framer.send(frame).await.unwrap();
        match framer.next().await {
            Some(Ok(Either::Left(reply))) => reply,
            other => panic!("expected a reply frame, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn answers_calls_and_errors_on_the_same_connection() {
        let (server_end, client_end) = duplex(4096);
        let registry = Arc::new(Registry::with_chat(HistoryStore::new()));
        let peer = PeerChannel::new(server_end, "127.0.0.1:9".parse().unwrap(), registry);
        let task = tokio::spawn(peer.run());

        let mut framer = client_side(client_end);

        let reply = roundtrip(&mut framer, Frame::call(1, "Nope.SendMessage", b"{}")).await;
        assert_eq!(reply.kind, FrameKind::Error);
        assert_eq!(reply.seq, 1);
        assert_eq!(reply.error_text(), "rpc: can't find service Nope.SendMessage");

        let args = br#"{"sender":"alice","message":"hi"}"#;
        let reply = roundtrip(&mut framer, Frame::call(2, "ChatService.SendMessage", args)).await;
        assert_eq!(reply.kind, FrameKind::Reply);
        let history: HistoryReply = serde_json::from_slice(&reply.body).unwrap();
        assert_eq!(history.history, vec!["[alice]: hi"]);

        let reply = roundtrip(&mut framer, Frame::reply(3, Bytes::from_static(b"{}"))).await;
        assert_eq!(reply.kind, FrameKind::Error);

        drop(framer);
        task.await.unwrap().unwrap();
    }
}
