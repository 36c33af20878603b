//! IDLE keepalive for the side of the migration that is not currently
//! being actively driven.
//!
//! While folder B is being enumerated or transferred, side A must
//! stay in IDLE so its connection survives long migrations without
//! the server timing it out. `IdleKeeper` owns that session while
//! idling and hands it back, live, whenever the caller needs to issue
//! a command on it.

use crate::connection::{self, ImapSession};
use crate::error::{Error, Result};
use async_imap::extensions::idle::Handle;

/// Wraps a session that alternates between IDLE and active use.
pub struct IdleKeeper {
    state: State,
    refresh_interval: u64,
    rows_since_refresh: u64,
}

enum State {
    Idling(Handle<connection::Stream>),
    Active(ImapSession),
    /// Transient placeholder used only while moving between states.
    Empty,
}

impl IdleKeeper {
    /// Take ownership of a freshly-selected session and enter IDLE on
    /// it immediately.
    pub async fn start(session: ImapSession, refresh_interval: u64) -> Result<Self> {
        let mut handle = session.idle();
        handle
            .init()
            .await
            .map_err(|e| Error::Imap(format!("IDLE init failed: {e}")))?;
        Ok(Self {
            state: State::Idling(handle),
            refresh_interval,
            rows_since_refresh: 0,
        })
    }

    /// Select a different folder read-only and idle on it.
    pub async fn start_on(mut session: ImapSession, folder: &str, refresh_interval: u64) -> Result<Self> {
        connection::examine(&mut session, folder).await?;
        Self::start(session, refresh_interval).await
    }

    /// Stop idling and hand back the live session so the caller can
    /// issue commands on it.
    pub async fn stop(mut self) -> Result<ImapSession> {
        match std::mem::replace(&mut self.state, State::Empty) {
            State::Idling(handle) => {
                let session = handle
                    .done()
                    .await
                    .map_err(|e| Error::Imap(format!("IDLE stop failed: {e}")))?;
                Ok(session)
            }
            State::Active(session) => Ok(session),
            State::Empty => Err(Error::Imap("idle keeper used after being drained".to_string())),
        }
    }

    /// Note that `rows` more metadata rows have been processed on the
    /// active side; returns `true` once the configured refresh
    /// interval has been crossed, at which point the caller should
    /// call [`IdleKeeper::refresh`].
    pub fn tick(&mut self, rows: u64) -> bool {
        self.rows_since_refresh += rows;
        if self.rows_since_refresh >= self.refresh_interval {
            self.rows_since_refresh = 0;
            true
        } else {
            false
        }
    }

    /// Drop and re-establish the IDLE command on the same session.
    /// Some servers cap how long a single IDLE may run; this keeps
    /// long enumerations from tripping that cap.
    pub async fn refresh(self) -> Result<Self> {
        let refresh_interval = self.refresh_interval;
        let session = self.stop().await?;
        Self::start(session, refresh_interval).await
    }

    /// Account for `rows` more metadata rows against a possibly-absent
    /// idle keeper, transparently refreshing it in place once the
    /// configured interval is crossed. A no-op when `idle` is `None` —
    /// nothing is parked, so there is nothing to protect.
    pub async fn tick_and_refresh(idle: &mut Option<Self>, rows: u64) -> Result<()> {
        let Some(keeper) = idle.as_mut() else {
            return Ok(());
        };
        if keeper.tick(rows) {
            let taken = idle.take().expect("checked Some above");
            *idle = Some(taken.refresh().await?);
        }
        Ok(())
    }
}
