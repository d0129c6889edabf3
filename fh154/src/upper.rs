//! Upper MAC contract.

use crate::mac::{FrameContext, TxStatus};

/// Receives the terminal outcome of the frames handed to the engine.
///
/// Every enqueued frame is reported exactly once. Transient outcomes
/// ([`TxStatus::is_transient`]) are handled by the engine and never reported.
pub trait UpperMac {
    fn tx_complete(&mut self, frame: FrameContext, status: TxStatus);
}
