//! Client side of the call/reply protocol.
use std::net::SocketAddr;

use futures::future::Either;
use futures::{SinkExt, StreamExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::net::TcpStream;
use tokio_util::codec::Framed;

use crate::error::{ClientError, ProtocolError};
use crate::message::{Frame, FrameCodec, FrameKind, MAX_CALL_LEN};
use crate::service::{method_name, HistoryReply, SendMessageArgs, CHAT_SERVICE, SEND_MESSAGE};

/// One connection, one outstanding call at a time.
pub struct RpcClient {
    net_framer: Framed<TcpStream, FrameCodec>,
    next_seq: u32,
}

impl RpcClient {
    pub async fn connect(addr: SocketAddr) -> Result<RpcClient, ClientError> {
        let socket = TcpStream::connect(addr)
            .await
            .map_err(|source| ClientError::Connect { addr, source })?;
        Ok(RpcClient {
            net_framer: Framed::new(socket, FrameCodec::for_replies()),
            next_seq: 0,
        })
    }

    /// Send one call and wait for its reply.
    pub async fn call<A, R>(&mut self, service_method: &str, args: &A) -> Result<R, ClientError>
    where
        A: Serialize,
        R: DeserializeOwned,
    {
        let seq = self.next_seq;
        self.next_seq = self.next_seq.wrapping_add(1);

        let payload = serde_json::to_vec(args)?;
        let len = service_method.len() + 1 + payload.len();
        if len > MAX_CALL_LEN as usize {
            return Err(ClientError::Protocol(ProtocolError::FrameTooLarge {
                len: u32::try_from(len).unwrap_or(u32::MAX),
                max: MAX_CALL_LEN,
            }));
        }
        self.net_framer
            .send(Frame::call(seq, service_method, &payload))
            .await?;

        let frame = match self.net_framer.next().await {
            None => {
                return Err(ClientError::ConnectionLost(
                    "server closed the connection".to_string(),
                ))
            }
            Some(Err(err)) => return Err(err.into()),
            Some(Ok(Either::Right(fault))) => {
                return Err(ClientError::Remote(format!(
                    "damaged reply {}: {}",
                    fault.seq, fault.reason
                )))
            }
            Some(Ok(Either::Left(frame))) => frame,
        };

        if frame.seq != seq {
            return Err(ClientError::Protocol(ProtocolError::SequenceMismatch {
                expected: seq,
                got: frame.seq,
            }));
        }
        match frame.kind {
            FrameKind::Reply => Ok(serde_json::from_slice(&frame.body)?),
            FrameKind::Error => Err(ClientError::Remote(frame.error_text())),
            FrameKind::Call => Err(ClientError::Protocol(ProtocolError::UnexpectedCall)),
        }
    }

    /// Flush and shut down the write half of the connection.
    pub async fn close(mut self) -> Result<(), ClientError> {
        self.net_framer.close().await?;
        Ok(())
    }
}

/// Typed wrapper for `ChatService`.
pub struct ChatClient {
    rpc: RpcClient,
    method: String,
}

impl ChatClient {
    pub async fn connect(addr: SocketAddr) -> Result<ChatClient, ClientError> {
        Ok(ChatClient {
            rpc: RpcClient::connect(addr).await?,
            method: method_name(CHAT_SERVICE, SEND_MESSAGE),
        })
    }

    /// Post `message` as `sender` (or fetch, for the sentinel) and return the whole history.
    pub async fn send_message(
        &mut self,
        sender: &str,
        message: &str,
    ) -> Result<Vec<String>, ClientError> {
        let args = SendMessageArgs {
            sender: sender.to_string(),
            message: message.to_string(),
        };
        let reply: HistoryReply = self.rpc.call(&self.method, &args).await?;
        Ok(reply.history)
    }

    pub async fn close(self) -> Result<(), ClientError> {
        self.rpc.close().await
    }
}
