//! Publication of session snapshots.
//!
//! The session owns the only [`StateSink`]; readers hold [`StateObserver`]s.
//! Each snapshot is published whole after a transition completes, so an
//! observer never sees a half-applied change.

use tokio::sync::watch;

use crate::error::{Error, Result};
use crate::state::SessionSnapshot;

/// Write side of the snapshot channel.
#[derive(Debug)]
pub struct StateSink {
    sender: watch::Sender<SessionSnapshot>,
}

impl StateSink {
    /// Create a sink holding `initial`.
    pub fn new(initial: SessionSnapshot) -> Self {
        let (sender, _) = watch::channel(initial);
        Self { sender }
    }

    /// Publish `snapshot`. Observers are only woken if it differs from the
    /// current one. Returns whether anything changed.
    pub fn publish(&self, snapshot: SessionSnapshot) -> bool {
        self.sender.send_if_modified(|current| {
            if *current == snapshot {
                false
            } else {
                *current = snapshot;
                true
            }
        })
    }

    /// Create a new observer.
    pub fn observer(&self) -> StateObserver {
        StateObserver {
            receiver: self.sender.subscribe(),
        }
    }

    /// The current snapshot.
    pub fn current(&self) -> SessionSnapshot {
        self.sender.borrow().clone()
    }
}

/// Read side of the snapshot channel.
#[derive(Debug, Clone)]
pub struct StateObserver {
    receiver: watch::Receiver<SessionSnapshot>,
}

impl StateObserver {
    /// The latest snapshot.
    pub fn snapshot(&self) -> SessionSnapshot {
        self.receiver.borrow().clone()
    }

    /// Wait for the next published change and return it.
    ///
    /// Fails with [`Error::SessionClosed`] once the session has shut down.
    pub async fn changed(&mut self) -> Result<SessionSnapshot> {
        self.receiver
            .changed()
            .await
            .map_err(|_| Error::SessionClosed)?;
        Ok(self.receiver.borrow_and_update().clone())
    }

    /// Wait until a snapshot satisfies `predicate`, checking the current one
    /// first.
    pub async fn wait_for<F>(&mut self, mut predicate: F) -> Result<SessionSnapshot>
    where
        F: FnMut(&SessionSnapshot) -> bool,
    {
        let snapshot = self
            .receiver
            .wait_for(|snapshot| predicate(snapshot))
            .await
            .map_err(|_| Error::SessionClosed)?;
        Ok(snapshot.clone())
    }
}
