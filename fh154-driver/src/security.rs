//! Security transform contract.
//!
//! The AES-CCM* transform itself is opaque to the core. The core decides
//! whether a frame fits once secured, looks up the key, and owns the frame
//! counter.

use crate::{
    constants::{MAC_FRAME_COUNTER_LEN, MAC_SEC_CONTROL_FIELD_LEN},
    frame::{Address, PayloadHandle},
};

/// Security level, section 9.4.2.2, Table 9-6.
#[derive(Debug, Eq, PartialEq, Clone, Copy)]
#[cfg_attr(feature = "fuzz", derive(arbitrary::Arbitrary))]
pub enum SecurityLevel {
    None = 0,
    Mic32 = 1,
    Mic64 = 2,
    Mic128 = 3,
    Enc = 4,
    EncMic32 = 5,
    EncMic64 = 6,
    EncMic128 = 7,
}

impl SecurityLevel {
    /// Length of the message integrity code appended to the payload.
    pub const fn mic_len(&self) -> u16 {
        match self {
            SecurityLevel::None | SecurityLevel::Enc => 0,
            SecurityLevel::Mic32 | SecurityLevel::EncMic32 => 4,
            SecurityLevel::Mic64 | SecurityLevel::EncMic64 => 8,
            SecurityLevel::Mic128 | SecurityLevel::EncMic128 => 16,
        }
    }
}

/// Key identifier mode, section 9.4.2.3, Table 9-7.
#[derive(Debug, Eq, PartialEq, Clone, Copy)]
#[cfg_attr(feature = "fuzz", derive(arbitrary::Arbitrary))]
pub enum KeyIdMode {
    Implicit = 0,
    Index = 1,
    Source4 = 2,
    Source8 = 3,
}

impl KeyIdMode {
    /// Length of the key identifier field (key source plus key index).
    pub const fn key_id_len(&self) -> u16 {
        match self {
            KeyIdMode::Implicit => 0,
            KeyIdMode::Index => 1,
            KeyIdMode::Source4 => 5,
            KeyIdMode::Source8 => 9,
        }
    }
}

/// Security parameters requested for an outgoing frame.
#[derive(Debug, Eq, PartialEq, Clone, Copy)]
#[cfg_attr(feature = "fuzz", derive(arbitrary::Arbitrary))]
pub struct SecurityParams {
    pub level: SecurityLevel,
    pub key_id_mode: KeyIdMode,
    pub key_index: u8,
    pub key_source: [u8; 8],
}

impl SecurityParams {
    /// Number of bytes the auxiliary security header and the MIC add to the
    /// frame.
    pub const fn expansion(&self) -> u16 {
        MAC_SEC_CONTROL_FIELD_LEN
            + MAC_FRAME_COUNTER_LEN
            + self.key_id_mode.key_id_len()
            + self.level.mic_len()
    }
}

/// Reasons for the transform to reject a frame.
#[derive(Debug, Eq, PartialEq, Clone, Copy)]
pub enum SecurityFailure {
    UnavailableKey,
    SecurityError,
}

pub trait SecurityTransform {
    /// Reference to key material, resolved once per transmission.
    type Key: Copy;

    /// Outgoing frame key retrieval procedure.
    fn lookup_key(&mut self, params: &SecurityParams, dst: &Address) -> Option<Self::Key>;

    /// Secures the payload in place.
    fn encrypt(
        &mut self,
        key: Self::Key,
        frame_counter: u32,
        params: &SecurityParams,
        payload: PayloadHandle,
    ) -> Result<(), SecurityFailure>;

    /// Reverts [`SecurityTransform::encrypt`], used before a frame is secured
    /// again with a fresh frame counter.
    fn decrypt(
        &mut self,
        key: Self::Key,
        frame_counter: u32,
        params: &SecurityParams,
        payload: PayloadHandle,
    ) -> Result<(), SecurityFailure>;
}

/// Transform for deployments without MAC security. Secured frames are
/// rejected for lack of a key.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoSecurity;

impl SecurityTransform for NoSecurity {
    type Key = ();

    fn lookup_key(&mut self, _params: &SecurityParams, _dst: &Address) -> Option<()> {
        None
    }

    fn encrypt(
        &mut self,
        _key: (),
        _frame_counter: u32,
        _params: &SecurityParams,
        _payload: PayloadHandle,
    ) -> Result<(), SecurityFailure> {
        Err(SecurityFailure::SecurityError)
    }

    fn decrypt(
        &mut self,
        _key: (),
        _frame_counter: u32,
        _params: &SecurityParams,
        _payload: PayloadHandle,
    ) -> Result<(), SecurityFailure> {
        Err(SecurityFailure::SecurityError)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expansion() {
        let params = SecurityParams {
            level: SecurityLevel::EncMic64,
            key_id_mode: KeyIdMode::Index,
            key_index: 1,
            key_source: [0; 8],
        };
        // control + counter + key index + MIC
        assert_eq!(params.expansion(), 1 + 4 + 1 + 8);

        let params = SecurityParams {
            level: SecurityLevel::Enc,
            key_id_mode: KeyIdMode::Source8,
            ..params
        };
        assert_eq!(params.expansion(), 1 + 4 + 9);
    }
}
