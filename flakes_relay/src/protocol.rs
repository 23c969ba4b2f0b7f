//! Wire codec for the controller link.
//!
//! # Wire Format
//!
//! | Message      | Direction          | Bytes                                  |
//! |--------------|--------------------|----------------------------------------|
//! | Handshake    | relay → controller | ASCII relay identifier + `0x00`        |
//! | Ping         | relay → controller | `b"PING\0"`                            |
//! | Level update | controller → relay | `[channel: u8, level: u8]`, no framing |
//!
//! Level updates rely on 2-byte alignment of the stream. The decoder keeps
//! an odd trailing byte until the next read completes the record, so records
//! split across reads are reassembled. A record lost mid-stream cannot be
//! detected without a sync byte.

use flakes_common::config::{ConfigError, validate_relay_name};
use flakes_common::consts::{LEVEL_UPDATE_LEN, MAX_RELAY_NAME_LEN};
use thiserror::Error;

pub use flakes_common::consts::PING_FRAME;

/// Handshake frame capacity: identifier plus NUL terminator.
const HANDSHAKE_CAPACITY: usize = MAX_RELAY_NAME_LEN + 1;

static_assertions::const_assert_eq!(LEVEL_UPDATE_LEN, 2);

/// Errors building outbound messages.
#[derive(Debug, Clone, Error)]
pub enum ProtocolError {
    /// Relay identifier unusable in a handshake.
    #[error("Invalid relay identifier: {0}")]
    InvalidIdentifier(String),
}

/// Recoverable inbound decoding errors. The offending bytes are discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// Channel index outside `[0, channel_count)`.
    #[error("Channel {channel} out of range (bank has {channel_count} channels)")]
    ChannelOutOfRange {
        /// Received channel index
        channel: u8,
        /// Number of channels in the bank
        channel_count: usize,
    },

    /// A partial record was dropped when the stream was reset.
    #[error("Truncated level update ({pending} of 2 bytes)")]
    Truncated {
        /// Bytes received for the incomplete record
        pending: usize,
    },
}

/// Identification frame sent once per successful connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handshake {
    frame: heapless::Vec<u8, HANDSHAKE_CAPACITY>,
}

impl Handshake {
    /// Build the handshake for a relay identifier.
    ///
    /// # Errors
    /// `ProtocolError::InvalidIdentifier` if the name is empty, non-ASCII,
    /// contains NUL or exceeds `MAX_RELAY_NAME_LEN` bytes.
    pub fn new(relay_name: &str) -> Result<Self, ProtocolError> {
        validate_relay_name(relay_name).map_err(|e| match e {
            ConfigError::ValidationError(msg) => ProtocolError::InvalidIdentifier(msg),
            other => ProtocolError::InvalidIdentifier(other.to_string()),
        })?;

        let mut frame: heapless::Vec<u8, HANDSHAKE_CAPACITY> = heapless::Vec::new();
        if frame.extend_from_slice(relay_name.as_bytes()).is_err() || frame.push(0).is_err() {
            return Err(ProtocolError::InvalidIdentifier(relay_name.to_string()));
        }
        Ok(Self { frame })
    }

    /// Encoded bytes, NUL terminator included.
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.frame
    }

    /// Relay identifier without the terminator.
    pub fn relay_name(&self) -> &str {
        std::str::from_utf8(&self.frame[..self.frame.len() - 1]).unwrap_or_default()
    }
}

/// One channel level record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LevelUpdate {
    /// Channel index.
    pub channel: u8,
    /// New level.
    pub level: u8,
}

impl LevelUpdate {
    /// Encode as `[channel, level]`.
    #[inline]
    pub fn encode(&self) -> [u8; LEVEL_UPDATE_LEN] {
        [self.channel, self.level]
    }

    /// Decode a raw record. Range checking is left to [`UpdateDecoder`].
    #[inline]
    pub fn decode(bytes: [u8; LEVEL_UPDATE_LEN]) -> Self {
        Self {
            channel: bytes[0],
            level: bytes[1],
        }
    }
}

/// Streaming decoder for level updates.
#[derive(Debug, Clone)]
pub struct UpdateDecoder {
    channel_count: usize,
    pending: Option<u8>,
}

impl UpdateDecoder {
    /// Create a decoder validating against `channel_count` channels.
    pub fn new(channel_count: usize) -> Self {
        Self {
            channel_count,
            pending: None,
        }
    }

    /// Decode every complete record in `bytes`, in order.
    ///
    /// Returns the number of complete records framed (valid or not).
    /// An odd trailing byte is kept for the next call.
    pub fn feed<F>(&mut self, bytes: &[u8], mut sink: F) -> usize
    where
        F: FnMut(Result<LevelUpdate, DecodeError>),
    {
        let mut framed = 0;
        let mut rest = bytes;

        if let Some(first) = self.pending {
            let Some((&second, tail)) = rest.split_first() else {
                return 0;
            };
            self.pending = None;
            sink(self.check(LevelUpdate::decode([first, second])));
            framed += 1;
            rest = tail;
        }

        let mut records = rest.chunks_exact(LEVEL_UPDATE_LEN);
        for record in records.by_ref() {
            sink(self.check(LevelUpdate::decode([record[0], record[1]])));
            framed += 1;
        }
        if let [odd] = records.remainder() {
            self.pending = Some(*odd);
        }
        framed
    }

    /// True if half a record is buffered.
    #[inline]
    pub fn has_partial(&self) -> bool {
        self.pending.is_some()
    }

    /// Drop any buffered partial record (link torn down).
    pub fn reset(&mut self) -> Option<DecodeError> {
        self.pending
            .take()
            .map(|_| DecodeError::Truncated { pending: 1 })
    }

    fn check(&self, update: LevelUpdate) -> Result<LevelUpdate, DecodeError> {
        if usize::from(update.channel) < self.channel_count {
            Ok(update)
        } else {
            Err(DecodeError::ChannelOutOfRange {
                channel: update.channel,
                channel_count: self.channel_count,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect(decoder: &mut UpdateDecoder, bytes: &[u8]) -> Vec<Result<LevelUpdate, DecodeError>> {
        let mut out = Vec::new();
        decoder.feed(bytes, |r| out.push(r));
        out
    }

    #[test]
    fn handshake_is_nul_terminated() {
        let handshake = Handshake::new("SFR-01").unwrap();
        assert_eq!(handshake.as_bytes(), b"SFR-01\0");
        assert_eq!(handshake.relay_name(), "SFR-01");
    }

    #[test]
    fn handshake_rejects_bad_identifiers() {
        assert!(Handshake::new("").is_err());
        assert!(Handshake::new("SF\0R").is_err());
        assert!(Handshake::new(&"R".repeat(MAX_RELAY_NAME_LEN + 1)).is_err());
        let longest = Handshake::new(&"R".repeat(MAX_RELAY_NAME_LEN)).unwrap();
        assert_eq!(longest.as_bytes().len(), MAX_RELAY_NAME_LEN + 1);
    }

    #[test]
    fn level_update_round_trip() {
        let update = LevelUpdate {
            channel: 5,
            level: 200,
        };
        assert_eq!(update.encode(), [5, 200]);

        let mut decoder = UpdateDecoder::new(17);
        assert_eq!(collect(&mut decoder, &update.encode()), vec![Ok(update)]);
    }

    #[test]
    fn out_of_range_channel_is_reported() {
        let mut decoder = UpdateDecoder::new(17);
        let results = collect(&mut decoder, &[200, 9, 16, 1, 17, 2]);
        assert_eq!(
            results,
            vec![
                Err(DecodeError::ChannelOutOfRange {
                    channel: 200,
                    channel_count: 17
                }),
                Ok(LevelUpdate {
                    channel: 16,
                    level: 1
                }),
                Err(DecodeError::ChannelOutOfRange {
                    channel: 17,
                    channel_count: 17
                }),
            ]
        );
    }

    #[test]
    fn split_record_is_reassembled() {
        let mut decoder = UpdateDecoder::new(17);

        let first = collect(&mut decoder, &[1, 10, 2]);
        assert_eq!(first.len(), 1);
        assert!(decoder.has_partial());

        assert!(collect(&mut decoder, &[]).is_empty());
        assert!(decoder.has_partial());

        let second = collect(&mut decoder, &[20, 3]);
        assert_eq!(
            second,
            vec![Ok(LevelUpdate {
                channel: 2,
                level: 20
            })]
        );
        assert!(decoder.has_partial());

        let third = collect(&mut decoder, &[30]);
        assert_eq!(
            third,
            vec![Ok(LevelUpdate {
                channel: 3,
                level: 30
            })]
        );
        assert!(!decoder.has_partial());
    }

    #[test]
    fn byte_at_a_time_stream() {
        let mut decoder = UpdateDecoder::new(4);
        let stream = [0u8, 0, 1, 64, 2, 192, 3, 255];
        let mut out = Vec::new();
        let mut framed = 0;
        for byte in stream {
            framed += decoder.feed(&[byte], |r| out.push(r));
        }
        assert_eq!(framed, 4);
        let levels: Vec<u8> = out.into_iter().map(|r| r.unwrap().level).collect();
        assert_eq!(levels, vec![0, 64, 192, 255]);
    }

    #[test]
    fn reset_reports_truncated_record() {
        let mut decoder = UpdateDecoder::new(4);
        assert_eq!(decoder.reset(), None);

        collect(&mut decoder, &[3]);
        assert_eq!(decoder.reset(), Some(DecodeError::Truncated { pending: 1 }));
        assert!(!decoder.has_partial());

        // Fresh alignment after reset.
        assert_eq!(
            collect(&mut decoder, &[1, 9]),
            vec![Ok(LevelUpdate {
                channel: 1,
                level: 9
            })]
        );
    }

    #[test]
    fn ping_frame_literal() {
        assert_eq!(PING_FRAME, b"PING\0");
    }
}
