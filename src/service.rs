//! Named services and the registry the dispatcher routes calls through.

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::RpcError;
use crate::history::HistoryStore;

/// Name the chat service is registered under.
pub const CHAT_SERVICE: &str = "ChatService";
pub const SEND_MESSAGE: &str = "SendMessage";

/// Arguments of `ChatService.SendMessage`. `message` may be the fetch sentinel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendMessageArgs {
    pub sender: String,
    pub message: String,
}

/// Result of `ChatService.SendMessage`: the whole history.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryReply {
    #[serde(default)]
    pub history: Vec<String>,
}

/// `Service.Method` as it appears in a call frame.
pub fn method_name(service: &str, method: &str) -> String {
    format!("{}.{}", service, method)
}

/// Something callable by method name with JSON encoded arguments.
pub trait Service: Send + Sync {
    fn call(&self, method: &str, args: &[u8]) -> Result<Bytes, RpcError>;
}

/// The chat service: one method over one history store.
#[derive(Debug, Clone)]
pub struct ChatService {
    history: HistoryStore,
}

impl ChatService {
    pub fn new(history: HistoryStore) -> ChatService {
        ChatService { history }
    }

    pub fn send_message(&self, args: SendMessageArgs) -> HistoryReply {
        HistoryReply {
            history: self.history.submit(&args.sender, &args.message),
        }
    }
}

impl Service for ChatService {
    fn call(&self, method: &str, args: &[u8]) -> Result<Bytes, RpcError> {
        match method {
            SEND_MESSAGE => {
                let args: SendMessageArgs = serde_json::from_slice(args)
                    .map_err(|err| RpcError::InvalidArguments(err.to_string()))?;
                let reply = self.send_message(args);
                serde_json::to_vec(&reply)
                    .map(Bytes::from)
                    .map_err(|err| RpcError::InvalidArguments(err.to_string()))
            }
            _ => Err(RpcError::UnknownMethod(method_name(CHAT_SERVICE, method))),
        }
    }
}

/// Maps service names to services. Built once before the server starts, read-only after.
#[derive(Clone, Default)]
pub struct Registry {
    services: HashMap<String, Arc<dyn Service>>,
}

impl Registry {
    pub fn new() -> Registry {
        Registry::default()
    }

    /// Registry with the chat service installed over `history`.
    pub fn with_chat(history: HistoryStore) -> Registry {
        let mut registry = Registry::new();
        registry.register(CHAT_SERVICE, ChatService::new(history));
        registry
    }

    pub fn register(&mut self, name: impl Into<String>, service: impl Service + 'static) {
        self.services.insert(name.into(), Arc::new(service));
    }

    /// Route `Service.Method` to its service.
    pub fn dispatch(&self, service_method: &str, args: &[u8]) -> Result<Bytes, RpcError> {
        let (service, method) = service_method
            .rsplit_once('.')
            .ok_or_else(|| RpcError::IllFormed(service_method.to_string()))?;
        let target = self
            .services
            .get(service)
            .ok_or_else(|| RpcError::UnknownService(service_method.to_string()))?;
        match target.call(method, args) {
            Err(RpcError::UnknownMethod(_)) => {
                Err(RpcError::UnknownMethod(service_method.to_string()))
            }
            other => other,
        }
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("services", &self.services.keys().collect::<Vec<_>>())
            .finish()
    }
}
