//! Outgoing frame contexts.
//!
//! A [`FrameContext`] is built by the upper MAC, queued in the class queue
//! named by its [`TxClass`] and carried through every attempt until the
//! engine reports it back with its terminal status.

use bitmaps::Bitmap;
use fh154_driver::{
    frame::{Address, PayloadHandle},
    security::SecurityParams,
};

/// Transmission class. Each class has its own queue, served in the order of
/// [`TxClass::DISPATCH_ORDER`].
#[derive(Debug, Eq, PartialEq, Clone, Copy)]
#[cfg_attr(feature = "fuzz", derive(arbitrary::Arbitrary))]
pub enum TxClass {
    /// Asynchronous frames hopping over a channel list, outside the slot
    /// schedule.
    Async,
    /// Frames sent in the broadcast dwell.
    Broadcast,
    /// Enhanced directional frame exchange.
    Edfe,
    /// Frames sent on the destination's unicast schedule.
    Unicast,
}

impl TxClass {
    pub const DISPATCH_ORDER: [TxClass; 4] = [
        TxClass::Async,
        TxClass::Broadcast,
        TxClass::Edfe,
        TxClass::Unicast,
    ];

    pub const fn index(&self) -> usize {
        match self {
            TxClass::Async => 0,
            TxClass::Broadcast => 1,
            TxClass::Edfe => 2,
            TxClass::Unicast => 3,
        }
    }

    /// Whether frames of this class follow a hopping schedule.
    pub const fn is_hopping(&self) -> bool {
        matches!(self, TxClass::Broadcast | TxClass::Unicast | TxClass::Edfe)
    }
}

/// MAC frame type and command identifier, as far as scheduling cares.
#[derive(Debug, Eq, PartialEq, Clone, Copy)]
#[cfg_attr(feature = "fuzz", derive(arbitrary::Arbitrary))]
pub enum FrameKind {
    Data,
    DataRequest,
    Ack,
    Beacon,
    BeaconRequest,
    EnhancedBeaconRequest,
    CoexistBeaconRequest,
    AssociationRequest,
    AssociationResponse,
    Disassociation,
    CoordinatorRealignment,
    /// Any other MAC command.
    Command,
}

impl FrameKind {
    pub const fn is_beacon_related(&self) -> bool {
        matches!(
            self,
            FrameKind::Beacon
                | FrameKind::BeaconRequest
                | FrameKind::EnhancedBeaconRequest
                | FrameKind::CoexistBeaconRequest
        )
    }

    pub const fn is_link_establishment(&self) -> bool {
        matches!(
            self,
            FrameKind::AssociationRequest
                | FrameKind::AssociationResponse
                | FrameKind::Disassociation
                | FrameKind::CoordinatorRealignment
        )
    }
}

/// Transmit options of the data request.
#[derive(Debug, Default, Eq, PartialEq, Clone, Copy)]
#[cfg_attr(feature = "fuzz", derive(arbitrary::Arbitrary))]
pub struct TxOptions {
    pub ack_request: bool,
    /// Held until the destination polls for it.
    pub indirect: bool,
    /// Start CSMA-CA with the alternate backoff exponent.
    pub alt_be: bool,
}

/// CSMA-CA state of the frame.
#[derive(Debug, Default, Eq, PartialEq, Clone, Copy)]
pub struct BackoffState {
    /// Number of backoffs in the current attempt.
    pub nb: u8,
    /// Backoff exponent.
    pub be: u8,
    /// The attempt is a retransmission of the frame.
    pub retransmit: bool,
    /// A CSMA-CA sequence has been started and not yet ended. Frames deferred
    /// to a later slot keep their sequence.
    pub in_progress: bool,
}

/// Channels an async frame still has to visit.
#[derive(Debug, Eq, PartialEq, Clone)]
pub struct AsyncChannels {
    remaining: Bitmap<256>,
}

impl AsyncChannels {
    pub fn new(channels: &[u8]) -> Self {
        let mut remaining = Bitmap::new();
        for channel in channels {
            remaining.set(*channel as usize, true);
        }
        Self { remaining }
    }

    /// Channel of the next transmission.
    pub fn current(&self) -> Option<u8> {
        self.remaining.first_index().map(|channel| channel as u8)
    }

    /// Marks the current channel as done and returns the next one.
    pub fn advance(&mut self) -> Option<u8> {
        if let Some(channel) = self.current() {
            self.remaining.set(channel as usize, false);
        }
        self.current()
    }

    pub fn len(&self) -> usize {
        self.remaining.len()
    }

    pub fn is_empty(&self) -> bool {
        self.remaining.is_empty()
    }
}

/// An outgoing frame and its scheduling state.
#[derive(Debug, Eq, PartialEq, Clone)]
pub struct FrameContext {
    /// Identifier chosen by the upper MAC, used for purging.
    pub msdu_handle: u8,
    pub class: TxClass,
    pub kind: FrameKind,
    pub dst: Address,
    pub payload: PayloadHandle,
    /// Unsecured MSDU length in bytes.
    pub msdu_len: u16,
    pub options: TxOptions,
    pub security: Option<SecurityParams>,
    /// Frame counter of the last secured transmission.
    pub frame_counter: Option<u32>,
    /// Channel of the current attempt.
    pub channel: u8,
    /// Radio command priority of the current attempt.
    pub priority: u32,
    pub backoff: BackoffState,
    /// Retransmissions consumed so far.
    pub retries: u8,
    pub async_channels: Option<AsyncChannels>,
}

impl FrameContext {
    pub fn new(
        msdu_handle: u8,
        class: TxClass,
        kind: FrameKind,
        dst: Address,
        payload: PayloadHandle,
        msdu_len: u16,
    ) -> Self {
        Self {
            msdu_handle,
            class,
            kind,
            dst,
            payload,
            msdu_len,
            options: TxOptions::default(),
            security: None,
            frame_counter: None,
            channel: 0,
            priority: 0,
            backoff: BackoffState::default(),
            retries: 0,
            async_channels: None,
        }
    }

    pub fn with_options(mut self, options: TxOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_security(mut self, security: SecurityParams) -> Self {
        self.security = Some(security);
        self
    }

    /// Async frames visit every given channel once.
    pub fn with_async_channels(mut self, channels: &[u8]) -> Self {
        self.async_channels = Some(AsyncChannels::new(channels));
        self
    }

    /// Direct frames are sent as soon as possible, indirect frames wait for
    /// a poll. Both count against the queue depth limit separately.
    pub fn is_indirect(&self) -> bool {
        self.options.indirect
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn async_channels_visit_each_channel_once() {
        let mut channels = AsyncChannels::new(&[200, 3, 3, 17]);
        assert_eq!(channels.len(), 3);
        assert_eq!(channels.current(), Some(3));
        assert_eq!(channels.advance(), Some(17));
        assert_eq!(channels.advance(), Some(200));
        assert_eq!(channels.advance(), None);
        assert!(channels.is_empty());
        assert_eq!(channels.advance(), None);
    }

    #[test]
    fn dispatch_order() {
        for (i, class) in TxClass::DISPATCH_ORDER.iter().enumerate() {
            assert_eq!(class.index(), i);
        }
        assert!(!TxClass::Async.is_hopping());
        assert!(FrameKind::EnhancedBeaconRequest.is_beacon_related());
        assert!(FrameKind::Disassociation.is_link_establishment());
        assert!(!FrameKind::Data.is_link_establishment());
    }
}
