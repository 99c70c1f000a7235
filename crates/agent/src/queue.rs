//! Bounded dispatch queue between the message pipeline and the worker
//! pool. Producers never block: a full queue is an immediate error so the
//! pipeline can drop the request and log it.

use std::sync::Arc;

use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::Mutex;

use banter_core::domain::request::PendingRequest;
use banter_core::errors::EnqueueError;

pub fn dispatch_channel(capacity: usize) -> (DispatchQueue, DispatchReceiver) {
    let capacity = capacity.max(1);
    let (sender, receiver) = mpsc::channel(capacity);
    (
        DispatchQueue { sender, capacity },
        DispatchReceiver { inner: Arc::new(Mutex::new(receiver)) },
    )
}

#[derive(Clone)]
pub struct DispatchQueue {
    sender: mpsc::Sender<PendingRequest>,
    capacity: usize,
}

impl DispatchQueue {
    pub fn try_enqueue(&self, request: PendingRequest) -> Result<(), EnqueueError> {
        self.sender.try_send(request).map_err(|error| match error {
            TrySendError::Full(_) => EnqueueError::Full { capacity: self.capacity },
            TrySendError::Closed(_) => EnqueueError::Closed,
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Claim side shared by the worker pool. Each request is received by
/// exactly one worker.
#[derive(Clone)]
pub struct DispatchReceiver {
    inner: Arc<Mutex<mpsc::Receiver<PendingRequest>>>,
}

impl DispatchReceiver {
    pub async fn recv(&self) -> Option<PendingRequest> {
        let mut receiver = self.inner.lock().await;
        receiver.recv().await
    }
}
