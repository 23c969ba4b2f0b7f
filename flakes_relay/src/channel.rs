//! Channel bank: per-channel level and output state.
//!
//! The bank is owned by the relay core and lent by `&mut` to exactly two
//! writers per tick: the connection manager writes levels, the dimming
//! engine writes output states. Single-threaded sequencing is the only
//! synchronization.

use thiserror::Error;

/// Error returned for channel indices outside the bank.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ChannelError {
    /// Index not in `[0, count)`.
    #[error("Channel {index} out of range (bank has {count} channels)")]
    OutOfRange {
        /// Requested index
        index: usize,
        /// Number of channels in the bank
        count: usize,
    },
}

/// Physical output state of a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputState {
    /// Output driven high.
    #[default]
    On,
    /// Output driven low.
    Off,
}

impl OutputState {
    /// Driver level for this state.
    #[inline]
    pub fn is_on(self) -> bool {
        matches!(self, OutputState::On)
    }
}

/// One output channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Channel {
    /// Target brightness, 0 (off) to 255 (on for the full frame).
    pub level: u8,
    /// Current output state.
    pub state: OutputState,
}

/// Fixed-size bank of channels, created once at startup.
#[derive(Debug, Clone)]
pub struct ChannelBank {
    channels: Vec<Channel>,
}

impl ChannelBank {
    /// Create a bank of `count` channels, all `On` at level 0.
    pub fn new(count: usize) -> Self {
        Self {
            channels: vec![Channel::default(); count],
        }
    }

    /// Number of channels.
    #[inline]
    pub fn len(&self) -> usize {
        self.channels.len()
    }

    /// True if the bank has no channels.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Set the target level of a channel.
    pub fn set_level(&mut self, index: usize, level: u8) -> Result<(), ChannelError> {
        self.get_mut(index)?.level = level;
        Ok(())
    }

    /// Target level of a channel.
    pub fn level(&self, index: usize) -> Result<u8, ChannelError> {
        self.get(index).map(|c| c.level)
    }

    /// Output state of a channel.
    pub fn state(&self, index: usize) -> Result<OutputState, ChannelError> {
        self.get(index).map(|c| c.state)
    }

    /// Record a new output state for a channel.
    pub fn set_state(&mut self, index: usize, state: OutputState) -> Result<(), ChannelError> {
        self.get_mut(index)?.state = state;
        Ok(())
    }

    /// Snapshot of all levels.
    pub fn levels(&self) -> Vec<u8> {
        self.channels.iter().map(|c| c.level).collect()
    }

    /// Iterate over channels in index order.
    pub fn iter(&self) -> impl Iterator<Item = &Channel> {
        self.channels.iter()
    }

    pub(crate) fn channels_mut(&mut self) -> &mut [Channel] {
        &mut self.channels
    }

    fn get(&self, index: usize) -> Result<&Channel, ChannelError> {
        let count = self.channels.len();
        self.channels
            .get(index)
            .ok_or(ChannelError::OutOfRange { index, count })
    }

    fn get_mut(&mut self, index: usize) -> Result<&mut Channel, ChannelError> {
        let count = self.channels.len();
        self.channels
            .get_mut(index)
            .ok_or(ChannelError::OutOfRange { index, count })
    }
}
