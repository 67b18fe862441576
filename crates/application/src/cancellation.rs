//! Cooperative cancellation
//!
//! A clonable token backed by a `watch` channel. Every clone observes the
//! same flag; cancelling is sticky.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Task forwarding a parent's cancellation to a child
///
/// Aborted when the last clone of the child is dropped.
#[derive(Debug)]
struct Link(JoinHandle<()>);

impl Drop for Link {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Shared cancellation flag
#[derive(Debug, Clone)]
pub struct CancellationToken {
    sender: Arc<watch::Sender<bool>>,
    link: Option<Arc<Link>>,
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

impl CancellationToken {
    /// Create a token that is not cancelled
    #[must_use]
    pub fn new() -> Self {
        let (sender, _receiver) = watch::channel(false);
        Self {
            sender: Arc::new(sender),
            link: None,
        }
    }

    /// Cancel the token and wake everyone waiting on it
    pub fn cancel(&self) {
        self.sender.send_replace(true);
    }

    /// Whether `cancel` has been called
    pub fn is_cancelled(&self) -> bool {
        *self.sender.borrow()
    }

    /// Resolve once the token is cancelled
    pub async fn cancelled(&self) {
        wait_cancelled(&self.sender).await;
    }

    /// Create a token that is cancelled together with this one
    ///
    /// Cancelling the child does not affect the parent. The link ends once
    /// either token is cancelled, the child is detached, or every clone of
    /// the child is dropped.
    #[must_use]
    pub fn child(&self) -> Self {
        let (sender, _receiver) = watch::channel(false);
        let sender = Arc::new(sender);
        let parent = self.clone();
        let linked = Arc::clone(&sender);
        let handle = tokio::spawn(async move {
            tokio::select! {
                () = parent.cancelled() => {
                    linked.send_replace(true);
                },
                () = wait_cancelled(&linked) => {},
            }
        });
        Self {
            sender,
            link: Some(Arc::new(Link(handle))),
        }
    }

    /// Stop following the parent; clones held elsewhere stay valid
    pub fn detach(&self) {
        if let Some(link) = &self.link {
            link.0.abort();
        }
    }
}

async fn wait_cancelled(sender: &watch::Sender<bool>) {
    let mut receiver = sender.subscribe();
    // The sender outlives the receiver, so this only returns on cancel
    let _ = receiver.wait_for(|cancelled| *cancelled).await;
}
