use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use nativebridge_frame::MessageId;
use serde_json::Value;
use tokio::sync::oneshot;

use crate::error::RouterError;

pub(crate) type Outcome = Result<Value, RouterError>;

/// One outstanding outbound call.
pub(crate) struct PendingCall {
    method: String,
    started: Instant,
    responder: oneshot::Sender<Outcome>,
}

impl PendingCall {
    pub(crate) fn new(method: &str, responder: oneshot::Sender<Outcome>) -> Self {
        Self {
            method: method.to_string(),
            started: Instant::now(),
            responder,
        }
    }
}

/// Outstanding calls keyed by id. Every entry is removed exactly once:
/// by its response, by its deadline, by its caller going away, or by the
/// channel closing.
#[derive(Default)]
pub(crate) struct PendingTable {
    calls: Mutex<HashMap<MessageId, PendingCall>>,
}

impl PendingTable {
    fn calls(&self) -> MutexGuard<'_, HashMap<MessageId, PendingCall>> {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn insert(&self, id: MessageId, call: PendingCall) {
        self.calls().insert(id, call);
    }

    pub(crate) fn remove(&self, id: &MessageId) -> Option<PendingCall> {
        self.calls().remove(id)
    }

    /// Settle and remove the call for `id`. Returns `false` for ids that are
    /// unknown or already settled.
    pub(crate) fn settle(&self, id: &MessageId, outcome: Outcome) -> bool {
        let Some(call) = self.remove(id) else {
            return false;
        };
        tracing::debug!(
            id = %id,
            method = %call.method,
            elapsed_ms = call.started.elapsed().as_millis() as u64,
            ok = outcome.is_ok(),
            "settled native request"
        );
        // The caller may have stopped waiting; that is not an error here.
        let _ = call.responder.send(outcome);
        true
    }

    /// Reject every outstanding call with `Disconnected`.
    pub(crate) fn fail_all(&self) -> usize {
        let drained: Vec<_> = self.calls().drain().collect();
        let count = drained.len();
        for (id, call) in drained {
            tracing::debug!(id = %id, method = %call.method, "rejecting request on disconnect");
            let _ = call.responder.send(Err(RouterError::Disconnected));
        }
        count
    }

    pub(crate) fn len(&self) -> usize {
        self.calls().len()
    }
}

/// Removes a pending entry when the waiting caller is dropped mid-flight.
pub(crate) struct PendingGuard<'a> {
    pub(crate) table: &'a PendingTable,
    pub(crate) id: MessageId,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.table.remove(&self.id);
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn settle_is_exactly_once() {
        let table = PendingTable::default();
        let (tx, mut rx) = oneshot::channel();
        table.insert(MessageId::Number(1), PendingCall::new("m", tx));

        assert!(table.settle(&MessageId::Number(1), Ok(json!(1))));
        assert!(!table.settle(&MessageId::Number(1), Ok(json!(2))));
        assert_eq!(rx.try_recv().unwrap().unwrap(), json!(1));
        assert_eq!(table.len(), 0);
    }

    #[test]
    fn fail_all_rejects_every_call() {
        let table = PendingTable::default();
        let (tx1, mut rx1) = oneshot::channel();
        let (tx2, mut rx2) = oneshot::channel();
        table.insert(MessageId::Number(1), PendingCall::new("a", tx1));
        table.insert(MessageId::from("two"), PendingCall::new("b", tx2));

        assert_eq!(table.fail_all(), 2);
        assert!(matches!(rx1.try_recv().unwrap(), Err(RouterError::Disconnected)));
        assert!(matches!(rx2.try_recv().unwrap(), Err(RouterError::Disconnected)));
        assert_eq!(table.len(), 0);
    }

    #[test]
    fn guard_removes_entry_on_drop() {
        let table = PendingTable::default();
        let (tx, _rx) = oneshot::channel();
        table.insert(MessageId::Number(5), PendingCall::new("m", tx));
        {
            let _guard = PendingGuard {
                table: &table,
                id: MessageId::Number(5),
            };
        }
        assert_eq!(table.len(), 0);
    }
}
