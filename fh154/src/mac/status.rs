/// Outcome of a transmission attempt.
///
/// The radio reports attempt outcomes, the engine reports terminal outcomes
/// to the upper MAC. [`TxStatus::ChannelBusy`] and [`TxStatus::NoTime`] are
/// resolved inside the engine and never reach the upper MAC.
#[derive(Debug, Eq, PartialEq, Clone, Copy)]
#[cfg_attr(feature = "fuzz", derive(arbitrary::Arbitrary))]
pub enum TxStatus {
    Success,
    /// Acknowledged with the frame pending bit set.
    AckPending,
    /// Clear channel assessment failed.
    ChannelBusy,
    /// The attempt would have crossed a slot boundary.
    NoTime,
    /// CSMA-CA backoffs exhausted.
    ChannelAccessFailure,
    NoAck,
    TxAborted,
    /// The frame could not be requeued or queued.
    TransactionOverflow,
    FrameTooLong,
    /// The frame counter is exhausted.
    CounterError,
    UnavailableKey,
    SecurityError,
    /// Broadcast requested before the broadcast schedule started.
    BadState,
    /// No hopping schedule is known for the destination.
    LookupError,
}

impl TxStatus {
    /// Whether the status is handled inside the engine.
    pub const fn is_transient(&self) -> bool {
        matches!(self, TxStatus::ChannelBusy | TxStatus::NoTime)
    }

    pub const fn is_success(&self) -> bool {
        matches!(self, TxStatus::Success | TxStatus::AckPending)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_statuses() {
        assert!(TxStatus::ChannelBusy.is_transient());
        assert!(TxStatus::NoTime.is_transient());
        assert!(!TxStatus::ChannelAccessFailure.is_transient());
        assert!(TxStatus::AckPending.is_success());
        assert!(!TxStatus::NoAck.is_success());
    }
}
