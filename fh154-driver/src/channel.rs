//! Channel plan contract.
//!
//! Channel functions (DH1CF, TR51CF, ...) and regional channel tables are
//! provided by the integrator. The core only asks which channel belongs to
//! which slot.

use crate::frame::Address;

pub trait ChannelPlan {
    /// Channel of the given broadcast slot.
    fn broadcast_channel(&self, slot: u16) -> u8;

    /// Channel of the given unicast slot of `node`. `num_channels` is the
    /// size of the node's announced channel set.
    fn unicast_channel(&self, node: &Address, slot: u16, num_channels: u16) -> u8;
}

/// A plan without hopping: every slot uses the same channel.
#[derive(Debug, Clone, Copy)]
pub struct SingleChannel(pub u8);

impl ChannelPlan for SingleChannel {
    fn broadcast_channel(&self, _slot: u16) -> u8 {
        self.0
    }

    fn unicast_channel(&self, _node: &Address, _slot: u16, _num_channels: u16) -> u8 {
        self.0
    }
}
