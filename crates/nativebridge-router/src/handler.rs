use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use futures_util::future::BoxFuture;
use serde_json::Value;

use crate::error::RpcError;

pub(crate) type NotificationHandler = Arc<dyn Fn(Option<Value>) -> BoxFuture<'static, ()> + Send + Sync>;

pub(crate) type RpcHandler =
    Arc<dyn Fn(Option<Value>) -> BoxFuture<'static, Result<Value, RpcError>> + Send + Sync>;

/// Exact-key lookup tables for notification listeners and RPC methods.
///
/// Re-registering a key replaces the previous handler.
#[derive(Default)]
pub(crate) struct HandlerRegistry {
    notifications: RwLock<HashMap<String, NotificationHandler>>,
    methods: RwLock<HashMap<String, RpcHandler>>,
}

impl HandlerRegistry {
    pub(crate) fn set_notification(&self, msg_type: String, handler: NotificationHandler) {
        let replaced = self
            .notifications
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(msg_type.clone(), handler)
            .is_some();
        if replaced {
            tracing::debug!(msg_type, "replaced notification handler");
        }
    }

    pub(crate) fn notification(&self, msg_type: &str) -> Option<NotificationHandler> {
        self.notifications
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(msg_type)
            .cloned()
    }

    pub(crate) fn set_method(&self, method: String, handler: RpcHandler) {
        let replaced = self
            .methods
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(method.clone(), handler)
            .is_some();
        if replaced {
            tracing::debug!(method, "replaced rpc method handler");
        }
    }

    pub(crate) fn method(&self, method: &str) -> Option<RpcHandler> {
        self.methods
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(method)
            .cloned()
    }
}
