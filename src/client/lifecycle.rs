use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

use super::error::{Error, SftpResult};

/// States of a client connection, ordered by rank.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum State {
    Constructed,
    Connecting,
    Connected,
    Ended,
    Failed,
}

impl State {
    /// Returns the rank of the state. A transition is only legal towards a
    /// strictly higher rank.
    #[must_use]
    pub fn rank(self) -> u16 {
        Lifecycle::TABLE[self as usize].2
    }

    #[must_use]
    pub fn name(self) -> &'static str {
        Lifecycle::TABLE[self as usize].1
    }

    /// `true` for states no transition leaves
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Ended | Self::Failed)
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for State {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Lifecycle::TABLE
            .iter()
            .find(|(_, name, _)| *name == s)
            .map(|(state, _, _)| *state)
            .ok_or_else(|| format!("unknown state '{s}'"))
    }
}

/// Monotonic state machine gating every remote operation of a client.
///
/// `constructed → connecting → connected → ended`, with `failed` reachable
/// from `connecting`. Any move to a higher rank is accepted, so going from
/// `constructed` straight to `connected` is legal; nothing is ever
/// re-entered and `ended` or `failed` are never left.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lifecycle {
    state: State,
}

impl Lifecycle {
    /// State, name and rank, indexed by the state discriminant
    pub const TABLE: [(State, &'static str, u16); 5] = [
        (State::Constructed, "constructed", 100),
        (State::Connecting, "connecting", 200),
        (State::Connected, "connected", 300),
        (State::Ended, "ended", 800),
        (State::Failed, "failed", 900),
    ];

    #[must_use]
    pub fn new() -> Self {
        Self {
            state: State::Constructed,
        }
    }

    #[must_use]
    pub fn state(&self) -> State {
        self.state
    }

    /// Moves to `next`.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidStateTransition`] if `next` does not rank strictly
    /// higher than the current state or the current state is terminal.
    pub fn transition(&mut self, next: State) -> SftpResult<()> {
        if self.state.is_terminal() || next.rank() <= self.state.rank() {
            return Err(Error::InvalidStateTransition {
                from: self.state,
                to: next.name().to_owned(),
            });
        }

        debug!("client state {} -> {}", self.state, next);
        self.state = next;
        Ok(())
    }

    /// Moves to the state called `name`.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidStateTransition`] if the name is unknown or the move
    /// is not allowed.
    pub fn transition_named(&mut self, name: &str) -> SftpResult<()> {
        let next = name
            .parse::<State>()
            .map_err(|_| Error::InvalidStateTransition {
                from: self.state,
                to: name.to_owned(),
            })?;

        self.transition(next)
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state == State::Connected
    }

    /// Fails unless connected, naming the attempted action and the actual
    /// state.
    ///
    /// # Errors
    ///
    /// [`Error::NotConnected`]
    pub fn require_connected(&self, action: &'static str) -> SftpResult<()> {
        if self.is_connected() {
            return Ok(());
        }

        let err = Error::NotConnected {
            action,
            state: self.state,
        };
        error!("{err}");
        Err(err)
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}
