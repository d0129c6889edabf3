//! Radio port contract.
//!
//! The radio port issues RF commands on behalf of the core. Every
//! [`RadioPort::schedule_transmit`] is answered by exactly one completion
//! event delivered to the core from interrupt context, also after
//! [`RadioPort::abort`].

use crate::{frame::PayloadHandle, time::Tick};

/// Identifies a command issued to the radio.
#[derive(Debug, Eq, PartialEq, Clone, Copy)]
pub struct CommandHandle(pub u16);

/// Everything the radio needs to know to transmit a frame.
#[derive(Debug, Eq, PartialEq, Clone, Copy)]
pub struct TxRequest {
    pub payload: PayloadHandle,
    pub channel: u8,
    /// Tick at which the command (including CCA) starts.
    pub start: Tick,
    /// Arbitration priority of the RF command, see the activity classifier.
    pub priority: u32,
    /// Whether a clear channel assessment precedes the transmission.
    pub cca: bool,
    /// Asserts the coexistence priority line for the command.
    pub coex: bool,
}

pub trait RadioPort {
    fn schedule_transmit(&mut self, request: TxRequest) -> CommandHandle;

    /// Stops a pending or running command. The command still completes, with
    /// an aborted status.
    fn abort(&mut self, command: CommandHandle);

    /// Opens the broadcast slot receive window on the given channel or closes
    /// it (`None`).
    fn set_broadcast_window(&mut self, channel: Option<u8>);

    /// Moves the unicast listening channel.
    fn set_unicast_channel(&mut self, channel: u8);
}
