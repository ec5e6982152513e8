//! Out-of-cycle refresh requests and the stop flag.
//!
//! Command handlers hold a [`WakeSignal`]; the worker owns the matching
//! [`WakeReceiver`] and waits on it instead of a plain sleep.

use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::time::{sleep_until, Instant};
use tracing::debug;

use accord_core::GuildId;

/// What ended a wait.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Wake {
    /// The deadline passed.
    Elapsed,
    /// Guilds queued for an immediate refresh, de-duplicated.
    Refresh(BTreeSet<GuildId>),
    Shutdown,
}

#[derive(Debug, Clone)]
pub struct WakeSignal {
    requests: mpsc::UnboundedSender<GuildId>,
    shutdown: Arc<watch::Sender<bool>>,
}

#[derive(Debug)]
pub struct WakeReceiver {
    requests: mpsc::UnboundedReceiver<GuildId>,
    shutdown: watch::Receiver<bool>,
}

pub fn wake_signal() -> (WakeSignal, WakeReceiver) {
    let (requests_tx, requests_rx) = mpsc::unbounded_channel();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    (
        WakeSignal {
            requests: requests_tx,
            shutdown: Arc::new(shutdown_tx),
        },
        WakeReceiver {
            requests: requests_rx,
            shutdown: shutdown_rx,
        },
    )
}

impl WakeSignal {
    /// Queue `guild` for refresh and interrupt the worker's sleep. Returns
    /// false once the worker is gone.
    pub fn request(&self, guild: GuildId) -> bool {
        self.requests.send(guild).is_ok()
    }

    pub fn shutdown(&self) {
        self.shutdown.send_replace(true);
    }
}

impl WakeReceiver {
    pub fn is_shutdown(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Wait until `deadline`, a refresh request, or shutdown, whichever comes
    /// first. Shutdown wins over pending requests. A deadline in the past
    /// returns at once.
    pub async fn wait_until(&mut self, deadline: Instant) -> Wake {
        if self.is_shutdown() {
            return Wake::Shutdown;
        }

        tokio::select! {
            biased;

            // Every signal handle dropped means nobody can stop us later.
            _ = self.shutdown.changed() => Wake::Shutdown,
            Some(first) = self.requests.recv() => {
                let mut guilds = BTreeSet::from([first]);
                while let Ok(guild) = self.requests.try_recv() {
                    guilds.insert(guild);
                }
                debug!(guilds = guilds.len(), "refresh requested");
                Wake::Refresh(guilds)
            }
            _ = sleep_until(deadline) => Wake::Elapsed,
        }
    }
}
