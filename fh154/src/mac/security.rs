//! Outgoing frame security procedure, section 9.2.1, as far as it concerns
//! the scheduler: size check, key retrieval and frame counter management.
//! The transform itself is provided by a [`SecurityTransform`].

use fh154_driver::{
    constants::MAC_MAX_FRAME_COUNTER,
    security::{SecurityFailure, SecurityTransform},
};

use super::{frame::FrameContext, status::TxStatus};

impl From<SecurityFailure> for TxStatus {
    fn from(failure: SecurityFailure) -> Self {
        match failure {
            SecurityFailure::UnavailableKey => TxStatus::UnavailableKey,
            SecurityFailure::SecurityError => TxStatus::SecurityError,
        }
    }
}

/// Secures `frame` for its next transmission.
///
/// A frame secured before (a retransmission) is first restored with its
/// previous frame counter and then secured again with a fresh one.
pub fn secure_outgoing<S: SecurityTransform>(
    transform: &mut S,
    frame: &mut FrameContext,
    frame_counter: &mut u32,
    max_frame_size: u16,
) -> Result<(), TxStatus> {
    let expansion = frame.security.map_or(0, |params| params.expansion());
    if frame.msdu_len as u32 + expansion as u32 > max_frame_size as u32 {
        return Err(TxStatus::FrameTooLong);
    }

    let Some(params) = frame.security else {
        return Ok(());
    };

    let key = transform
        .lookup_key(&params, &frame.dst)
        .ok_or(TxStatus::UnavailableKey)?;

    if let Some(previous) = frame.frame_counter.take() {
        transform.decrypt(key, previous, &params, frame.payload)?;
    }

    if *frame_counter == MAC_MAX_FRAME_COUNTER {
        return Err(TxStatus::CounterError);
    }

    transform.encrypt(key, *frame_counter, &params, frame.payload)?;
    frame.frame_counter = Some(*frame_counter);
    *frame_counter += 1;
    Ok(())
}
