//! Activity tracking for radio command arbitration.
//!
//! Every radio command carries a priority so that a multi-protocol radio
//! scheduler can arbitrate between this MAC and other stacks. The priority
//! depends on what the MAC is doing (its [`Activity`]) and on how often that
//! activity has recently been denied the radio: each consecutive miss brings
//! the activity closer to the next [`PriorityIndex`].

use fh154_driver::const_config::{
    MAC_ACTIVITY_MISS_INCREMENT, MAC_ACTIVITY_THRESHOLD_HIGH, MAC_ACTIVITY_THRESHOLD_NORMAL,
    MAC_ACTIVITY_THRESHOLD_URGENT,
};

use super::frame::{FrameKind, TxClass};

#[derive(Debug, Eq, PartialEq, Clone, Copy)]
#[cfg_attr(feature = "fuzz", derive(arbitrary::Arbitrary))]
pub enum Activity {
    /// Association, disassociation and the polls that complete an
    /// association.
    LinkEstablishment = 1,
    TxBeacon = 2,
    RxBeacon = 3,
    /// Frequency hopping broadcast and unicast traffic.
    FrequencyHopping = 4,
    Scan = 5,
    Data = 6,
    RxAlwaysOn = 7,
}

impl Activity {
    /// Whether the activity requests the coexistence priority line.
    pub const fn is_coex_priority(&self) -> bool {
        matches!(self, Activity::LinkEstablishment)
    }
}

#[derive(Debug, Eq, PartialEq, Ord, PartialOrd, Clone, Copy)]
#[cfg_attr(feature = "fuzz", derive(arbitrary::Arbitrary))]
pub enum PriorityIndex {
    Normal = 0,
    High = 1,
    Urgent = 2,
}

/// Priority value of a radio command.
pub const fn encode_priority(activity: Activity, index: PriorityIndex) -> u32 {
    ((activity as u32) << 16) | index as u32
}

/// Miss counts at which priorities escalate.
#[derive(Debug, Eq, PartialEq, Clone, Copy)]
pub struct ActivityThresholds {
    /// Misses up to which normal-priority activities stay normal.
    pub normal: u8,
    /// Misses up to which normal-priority activities stay high.
    pub high: u8,
    /// Misses up to which high-priority activities stay high.
    pub urgent: u8,
    /// Added to a miss counter per failure.
    pub increment: u8,
}

impl Default for ActivityThresholds {
    fn default() -> Self {
        Self {
            normal: MAC_ACTIVITY_THRESHOLD_NORMAL,
            high: MAC_ACTIVITY_THRESHOLD_HIGH,
            urgent: MAC_ACTIVITY_THRESHOLD_URGENT,
            increment: MAC_ACTIVITY_MISS_INCREMENT,
        }
    }
}

impl ActivityThresholds {
    /// Normal by default, high then urgent as misses accumulate.
    fn escalate_from_normal(&self, misses: u8) -> PriorityIndex {
        if misses < self.normal {
            PriorityIndex::Normal
        } else if misses < self.high {
            PriorityIndex::High
        } else {
            PriorityIndex::Urgent
        }
    }

    /// High by default, urgent once misses reach the urgent threshold.
    fn escalate_from_high(&self, misses: u8) -> PriorityIndex {
        if misses < self.urgent {
            PriorityIndex::High
        } else {
            PriorityIndex::Urgent
        }
    }
}

/// Receiver enable reasons.
#[derive(Debug, Default, Eq, PartialEq, Clone, Copy)]
pub struct RxEnableFlags {
    /// Tracking the beacons of the coordinator.
    pub beacon_device: bool,
    /// Listening in the broadcast slot.
    pub fh_broadcast_slot: bool,
    pub scan: bool,
    /// A broadcast frame from the coordinator is pending.
    pub broadcast_pending: bool,
    /// macRxOnWhenIdle.
    pub rx_when_idle: bool,
    pub poll: bool,
}

#[derive(Debug, Default, Clone, Copy)]
struct MissCounters {
    link_establishment: u8,
    beacon: u8,
    frequency_hopping: u8,
    scan: u8,
    data: u8,
}

impl MissCounters {
    fn get_mut(&mut self, activity: Activity) -> Option<&mut u8> {
        match activity {
            Activity::LinkEstablishment => Some(&mut self.link_establishment),
            Activity::TxBeacon => Some(&mut self.beacon),
            Activity::FrequencyHopping => Some(&mut self.frequency_hopping),
            Activity::Scan => Some(&mut self.scan),
            Activity::Data => Some(&mut self.data),
            Activity::RxBeacon | Activity::RxAlwaysOn => None,
        }
    }
}

/// Tracks the current TX and RX activities and their miss counters.
#[derive(Debug, Clone)]
pub struct ActivityClassifier {
    thresholds: ActivityThresholds,
    tx_activity: Activity,
    rx_activity: Activity,
    tx_misses: MissCounters,
    rx_misses: MissCounters,
    /// Kind of the last successfully transmitted frame.
    prev_tx_kind: Option<FrameKind>,
    /// Last successfully received MAC command.
    prev_rx_command: Option<FrameKind>,
}

impl Default for ActivityClassifier {
    fn default() -> Self {
        Self::new(ActivityThresholds::default())
    }
}

impl ActivityClassifier {
    pub fn new(thresholds: ActivityThresholds) -> Self {
        Self {
            thresholds,
            tx_activity: Activity::Data,
            rx_activity: Activity::Data,
            tx_misses: MissCounters::default(),
            rx_misses: MissCounters::default(),
            prev_tx_kind: None,
            prev_rx_command: None,
        }
    }

    pub fn tx_activity(&self) -> Activity {
        self.tx_activity
    }

    pub fn rx_activity(&self) -> Activity {
        self.rx_activity
    }

    /// Selects the TX activity for the frame about to be transmitted.
    pub fn classify_tx(&mut self, kind: FrameKind, class: TxClass) -> Activity {
        let activity = match kind {
            // acknowledgments inherit the procedure of the frame they answer
            FrameKind::Ack => match self.prev_rx_command {
                Some(
                    FrameKind::AssociationRequest
                    | FrameKind::AssociationResponse
                    | FrameKind::CoordinatorRealignment,
                ) => Activity::LinkEstablishment,
                _ => Activity::Data,
            },
            FrameKind::AssociationRequest
            | FrameKind::AssociationResponse
            | FrameKind::Disassociation => Activity::LinkEstablishment,
            kind if kind.is_beacon_related() => Activity::TxBeacon,
            FrameKind::Data if class.is_hopping() => Activity::FrequencyHopping,
            FrameKind::Data | FrameKind::DataRequest => {
                if self.prev_tx_kind == Some(FrameKind::AssociationRequest) {
                    Activity::LinkEstablishment
                } else {
                    Activity::Data
                }
            }
            _ => Activity::Data,
        };

        self.tx_activity = activity;
        activity
    }

    /// Selects the RX activity for a receiver enable request.
    pub fn classify_rx(&mut self, flags: RxEnableFlags, fh_enabled: bool) -> Activity {
        let activity = if !fh_enabled && flags.beacon_device {
            Activity::RxBeacon
        } else if fh_enabled && flags.fh_broadcast_slot {
            Activity::FrequencyHopping
        } else if flags.scan {
            Activity::Scan
        } else if flags.broadcast_pending {
            Activity::Data
        } else if flags.rx_when_idle {
            Activity::RxAlwaysOn
        } else if self.tx_activity == Activity::LinkEstablishment {
            // polls follow the procedure in progress
            Activity::LinkEstablishment
        } else {
            Activity::Data
        };

        self.rx_activity = activity;
        activity
    }

    /// Priority index of the current TX activity.
    pub fn tx_priority_index(&self) -> PriorityIndex {
        let misses = &self.tx_misses;
        match self.tx_activity {
            Activity::LinkEstablishment => {
                self.thresholds.escalate_from_high(misses.link_establishment)
            }
            // a single missed beacon is one too many
            Activity::TxBeacon if misses.beacon == 0 => PriorityIndex::High,
            Activity::TxBeacon => PriorityIndex::Urgent,
            Activity::FrequencyHopping => {
                self.thresholds.escalate_from_normal(misses.frequency_hopping)
            }
            Activity::Data => self.thresholds.escalate_from_normal(misses.data),
            _ => PriorityIndex::Normal,
        }
    }

    /// Priority value of the current TX activity.
    pub fn tx_priority(&self) -> u32 {
        match self.tx_activity {
            Activity::LinkEstablishment
            | Activity::TxBeacon
            | Activity::FrequencyHopping
            | Activity::Data => encode_priority(self.tx_activity, self.tx_priority_index()),
            _ => encode_priority(Activity::Data, PriorityIndex::Normal),
        }
    }

    /// Priority index of the current RX activity. `lost_beacons` counts the
    /// consecutive beacons missed while tracking the coordinator.
    pub fn rx_priority_index(&self, lost_beacons: u8) -> PriorityIndex {
        let misses = &self.rx_misses;
        match self.rx_activity {
            Activity::LinkEstablishment => {
                self.thresholds.escalate_from_high(misses.link_establishment)
            }
            Activity::RxBeacon if lost_beacons == 0 => PriorityIndex::High,
            Activity::RxBeacon => PriorityIndex::Urgent,
            Activity::FrequencyHopping => {
                self.thresholds.escalate_from_high(misses.frequency_hopping)
            }
            Activity::Scan => self.thresholds.escalate_from_high(misses.scan),
            Activity::Data => self.thresholds.escalate_from_normal(misses.data),
            _ => PriorityIndex::Normal,
        }
    }

    pub fn rx_priority(&self, lost_beacons: u8) -> u32 {
        match self.rx_activity {
            Activity::TxBeacon => encode_priority(Activity::Data, PriorityIndex::Normal),
            activity => encode_priority(activity, self.rx_priority_index(lost_beacons)),
        }
    }

    /// Accounts for the outcome of a transmission of the current TX activity.
    pub fn record_tx_outcome(&mut self, kind: FrameKind, success: bool) {
        if success {
            self.prev_tx_kind = Some(kind);
        }
        let increment = self.thresholds.increment;
        if let Some(misses) = self.tx_misses.get_mut(self.tx_activity) {
            *misses = if success {
                0
            } else {
                misses.saturating_add(increment)
            };
        }
    }

    /// Accounts for the outcome of a reception of the current RX activity.
    /// `command` is the command of the received frame, if it was one.
    pub fn record_rx_outcome(&mut self, command: Option<FrameKind>, success: bool) {
        if success {
            if let Some(command) = command {
                self.prev_rx_command = Some(command);
            }
        }
        let increment = self.thresholds.increment;
        if let Some(misses) = self.rx_misses.get_mut(self.rx_activity) {
            *misses = if success {
                0
            } else {
                misses.saturating_add(increment)
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn priority_index(value: u32) -> u32 {
        value & 0xffff
    }

    #[test]
    fn data_escalates_through_both_thresholds() {
        let mut classifier = ActivityClassifier::default();
        assert_eq!(
            classifier.classify_tx(FrameKind::Data, TxClass::Async),
            Activity::Data
        );

        let mut seen = std::vec::Vec::new();
        for _ in 0..5 {
            seen.push(classifier.tx_priority_index());
            classifier.record_tx_outcome(FrameKind::Data, false);
        }
        assert_eq!(
            seen,
            [
                PriorityIndex::Normal,
                PriorityIndex::Normal,
                PriorityIndex::High,
                PriorityIndex::High,
                PriorityIndex::Urgent,
            ]
        );

        classifier.record_tx_outcome(FrameKind::Data, true);
        assert_eq!(classifier.tx_priority_index(), PriorityIndex::Normal);
    }

    #[test]
    fn beacon_is_urgent_after_one_miss() {
        let mut classifier = ActivityClassifier::default();
        classifier.classify_tx(FrameKind::EnhancedBeaconRequest, TxClass::Async);
        assert_eq!(
            classifier.tx_priority(),
            encode_priority(Activity::TxBeacon, PriorityIndex::High)
        );
        classifier.record_tx_outcome(FrameKind::EnhancedBeaconRequest, false);
        assert_eq!(priority_index(classifier.tx_priority()), 2);
    }

    #[test]
    fn link_establishment_escalates_at_urgent_threshold() {
        let mut classifier = ActivityClassifier::default();
        classifier.classify_tx(FrameKind::AssociationRequest, TxClass::Unicast);
        assert_eq!(classifier.tx_activity(), Activity::LinkEstablishment);
        for _ in 0..2 {
            classifier.record_tx_outcome(FrameKind::AssociationRequest, false);
            assert_eq!(classifier.tx_priority_index(), PriorityIndex::High);
        }
        classifier.record_tx_outcome(FrameKind::AssociationRequest, false);
        assert_eq!(classifier.tx_priority_index(), PriorityIndex::Urgent);
    }

    #[test]
    fn poll_after_association_stays_link_establishment() {
        let mut classifier = ActivityClassifier::default();
        classifier.classify_tx(FrameKind::AssociationRequest, TxClass::Unicast);
        classifier.record_tx_outcome(FrameKind::AssociationRequest, true);

        assert_eq!(
            classifier.classify_tx(FrameKind::DataRequest, TxClass::Unicast),
            Activity::LinkEstablishment
        );
        // hopping data is FH traffic whatever came before
        assert_eq!(
            classifier.classify_tx(FrameKind::Data, TxClass::Unicast),
            Activity::FrequencyHopping
        );
    }

    #[test]
    fn ack_follows_received_command() {
        let mut classifier = ActivityClassifier::default();
        assert_eq!(
            classifier.classify_tx(FrameKind::Ack, TxClass::Unicast),
            Activity::Data
        );

        classifier.record_rx_outcome(Some(FrameKind::AssociationRequest), false);
        assert_eq!(
            classifier.classify_tx(FrameKind::Ack, TxClass::Unicast),
            Activity::Data
        );

        classifier.record_rx_outcome(Some(FrameKind::AssociationRequest), true);
        assert_eq!(
            classifier.classify_tx(FrameKind::Ack, TxClass::Unicast),
            Activity::LinkEstablishment
        );
        assert!(classifier.tx_activity().is_coex_priority());
    }

    #[test]
    fn rx_classification() {
        let mut classifier = ActivityClassifier::default();
        let flags = RxEnableFlags {
            beacon_device: true,
            fh_broadcast_slot: true,
            ..Default::default()
        };
        assert_eq!(classifier.classify_rx(flags, false), Activity::RxBeacon);
        assert_eq!(
            classifier.classify_rx(flags, true),
            Activity::FrequencyHopping
        );

        let flags = RxEnableFlags {
            scan: true,
            rx_when_idle: true,
            ..Default::default()
        };
        assert_eq!(classifier.classify_rx(flags, true), Activity::Scan);

        let flags = RxEnableFlags {
            rx_when_idle: true,
            ..Default::default()
        };
        assert_eq!(classifier.classify_rx(flags, true), Activity::RxAlwaysOn);

        let poll = RxEnableFlags {
            poll: true,
            ..Default::default()
        };
        assert_eq!(classifier.classify_rx(poll, true), Activity::Data);
        classifier.classify_tx(FrameKind::AssociationRequest, TxClass::Async);
        assert_eq!(
            classifier.classify_rx(poll, true),
            Activity::LinkEstablishment
        );
    }

    #[test]
    fn rx_priorities() {
        let mut classifier = ActivityClassifier::default();
        let flags = RxEnableFlags {
            beacon_device: true,
            ..Default::default()
        };
        classifier.classify_rx(flags, false);
        assert_eq!(classifier.rx_priority_index(0), PriorityIndex::High);
        assert_eq!(classifier.rx_priority_index(1), PriorityIndex::Urgent);

        let flags = RxEnableFlags {
            fh_broadcast_slot: true,
            ..Default::default()
        };
        classifier.classify_rx(flags, true);
        for _ in 0..3 {
            assert_eq!(classifier.rx_priority_index(0), PriorityIndex::High);
            classifier.record_rx_outcome(None, false);
        }
        assert_eq!(
            classifier.rx_priority(0),
            encode_priority(Activity::FrequencyHopping, PriorityIndex::Urgent)
        );
    }
}
