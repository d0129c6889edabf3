//! Frame related types shared between the core and its collaborators.
//!
//! The core never looks into frame bytes. It refers to payloads through
//! [`PayloadHandle`]s owned by the upper MAC and only needs the destination
//! address and the payload length.

/// IEEE 802.15.4 addressing mode.
#[derive(Debug, Eq, PartialEq, Clone, Copy)]
#[cfg_attr(feature = "fuzz", derive(arbitrary::Arbitrary))]
pub enum AddressingMode {
    /// The address is absent.
    Absent = 0b00,
    /// The address is a short address.
    Short = 0b10,
    /// The address is an extended address.
    Extended = 0b11,
}

impl AddressingMode {
    /// Length of an address with the given addressing mode.
    pub const fn length(&self) -> u16 {
        match self {
            AddressingMode::Absent => 0,
            AddressingMode::Short => 2,
            AddressingMode::Extended => 8,
        }
    }
}

/// A destination or source address.
#[derive(Debug, Eq, PartialEq, Clone, Copy)]
#[cfg_attr(feature = "fuzz", derive(arbitrary::Arbitrary))]
pub enum Address {
    Absent,
    Short(u16),
    /// Extended address in transmission (little-endian) byte order.
    Extended([u8; 8]),
}

impl Address {
    pub const BROADCAST: Address = Address::Short(0xffff);

    pub const fn mode(&self) -> AddressingMode {
        match self {
            Address::Absent => AddressingMode::Absent,
            Address::Short(_) => AddressingMode::Short,
            Address::Extended(_) => AddressingMode::Extended,
        }
    }

    pub fn is_broadcast(&self) -> bool {
        *self == Self::BROADCAST
    }
}

/// Opaque reference to a frame buffer owned by the upper MAC.
#[derive(Debug, Eq, PartialEq, Clone, Copy)]
#[cfg_attr(feature = "fuzz", derive(arbitrary::Arbitrary))]
pub struct PayloadHandle(pub u16);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn broadcast_address() {
        assert!(Address::Short(0xffff).is_broadcast());
        assert!(!Address::Short(0x0001).is_broadcast());
        assert!(!Address::Extended([0xff; 8]).is_broadcast());
        assert_eq!(Address::BROADCAST.mode().length(), 2);
        assert_eq!(Address::Absent.mode().length(), 0);
    }
}
