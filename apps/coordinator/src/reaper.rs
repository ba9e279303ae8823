//! Periodic eviction of stale lobbies and idle games.
//!
//! Eviction is silent: no messages are sent to members, and session records
//! pointing at an evicted lobby or game are left alone. Later operations on
//! those ids simply find nothing.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time;

use crate::game::GameManager;
use crate::lobby::LobbyManager;
use crate::AppState;

/// Counts from one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepStats {
    pub games: usize,
    pub lobbies: usize,
}

impl SweepStats {
    pub fn total(&self) -> usize {
        self.games + self.lobbies
    }
}

pub struct Reaper {
    lobbies: Arc<LobbyManager>,
    games: Arc<GameManager>,
    interval: Duration,
    inactive_timeout: Duration,
}

impl Reaper {
    pub fn new(
        lobbies: Arc<LobbyManager>,
        games: Arc<GameManager>,
        interval: Duration,
        inactive_timeout: Duration,
    ) -> Self {
        Self {
            lobbies,
            games,
            interval,
            inactive_timeout,
        }
    }

    pub fn from_state(state: &AppState) -> Self {
        Self::new(
            state.lobbies.clone(),
            state.games.clone(),
            state.config.reaper_interval,
            state.config.inactive_timeout,
        )
    }

    pub fn sweep(&self) -> SweepStats {
        self.sweep_at(Utc::now())
    }

    /// One pass over both tables as of `now`.
    ///
    /// Games idle longer than the timeout are dropped whatever their active
    /// flag. Lobbies go when empty or older than the timeout, even if
    /// occupied.
    pub fn sweep_at(&self, now: DateTime<Utc>) -> SweepStats {
        let threshold =
            chrono::Duration::from_std(self.inactive_timeout).unwrap_or(chrono::Duration::MAX);
        SweepStats {
            games: self.games.reap(now, threshold),
            lobbies: self.lobbies.reap(now, threshold),
        }
    }

    /// Run sweeps on a fixed period until `shutdown` flips to true or its
    /// sender is dropped.
    pub fn spawn(self, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = time::interval(self.interval);
            ticker.tick().await; // First tick fires immediately; skip it.

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let stats = self.sweep();
                        if stats.total() > 0 {
                            tracing::info!(
                                games = stats.games,
                                lobbies = stats.lobbies,
                                "reaper evicted stale entries"
                            );
                        }
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }

            tracing::debug!("reaper stopped");
        })
    }
}
