use std::{
    collections::HashMap,
    sync::{Arc, PoisonError, RwLock},
};

use tokio::sync::oneshot;

use crate::{protocol::Response, RpcError};

/// Correlation table from request id to the waiting caller.
#[derive(Debug, Default)]
pub(crate) struct PendingRequests {
    slots: RwLock<HashMap<u64, oneshot::Sender<Response>>>,
}

impl PendingRequests {
    /// Registers `id`. The returned slot unregisters it when dropped, so every
    /// exit path of a call releases the id.
    pub(crate) fn register(self: &Arc<Self>, id: u64) -> Result<PendingSlot, RpcError> {
        let (tx, rx) = oneshot::channel();
        let mut slots = self.slots.write().unwrap_or_else(PoisonError::into_inner);
        if slots.contains_key(&id) {
            return Err(RpcError::DuplicateRequestId(id));
        }
        slots.insert(id, tx);
        Ok(PendingSlot {
            id,
            table: Arc::clone(self),
            receiver: rx,
        })
    }

    /// Hands `response` to its caller. Returns `false` when nobody is waiting.
    pub(crate) fn deliver(&self, response: Response) -> bool {
        let slot = self
            .slots
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&response.id);
        match slot {
            Some(tx) => tx.send(response).is_ok(),
            None => false,
        }
    }

    /// Drops every registration; waiting callers observe a closed channel.
    pub(crate) fn clear(&self) -> usize {
        let mut slots = self.slots.write().unwrap_or_else(PoisonError::into_inner);
        let count = slots.len();
        slots.clear();
        count
    }

    pub(crate) fn len(&self) -> usize {
        self.slots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn remove(&self, id: u64) {
        self.slots
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id);
    }
}

pub(crate) struct PendingSlot {
    id: u64,
    table: Arc<PendingRequests>,
    receiver: oneshot::Receiver<Response>,
}

impl PendingSlot {
    pub(crate) fn receiver(&mut self) -> &mut oneshot::Receiver<Response> {
        &mut self.receiver
    }
}

impl Drop for PendingSlot {
    fn drop(&mut self) {
        self.table.remove(self.id);
    }
}
