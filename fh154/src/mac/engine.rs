//! The transmission engine: dispatches queued frames to the radio and
//! handles their completion.
//!
//! Everything the scheduler owns lives in one [`TxEngine`]. It is driven by
//! [`Event`]s from task context (enqueue, purge, received timing IEs) and
//! from interrupt context (timer compare and rollover, radio completion).
//! At most one frame is active at any time, either backing off or on air.
//!
//! Time is kept twice: the tick counter of the [`TickTimer`] wraps at the
//! rollover period and drives the [`TimerQueue`], while the slot schedules
//! work on an uptime that the engine extends across rollovers.

use fh154_driver::{
    channel::ChannelPlan,
    constants::{FH_BROADCAST_IOT_DWELL, FH_BROADCAST_MIN_BACKOFF, MAC_DEFAULT_ROLLOVER},
    frame::Address,
    radio::{CommandHandle, RadioPort, TxRequest},
    security::SecurityTransform,
    time::{ticks, Tick, Uptime},
    timer::TickTimer,
};
use fh154_util::{debug, info, sync::IrqCell, warn};
use rand_core::RngCore;

use super::{
    activity::{ActivityClassifier, RxEnableFlags},
    csma::{backoff_ticks, BusyOutcome, CsmaBackoffEngine, FhBackoff},
    fh::{
        ie::{
            decode_bt_ie, decode_ut_ie, encode_bt_ie, encode_ut_ie, unicast_sequence_len,
            BT_IE_LEN, UT_IE_LEN,
        },
        slot::{SlotPhase, SlotTransition, UnicastHop},
        FhSlotSynchronizer, NeighborTable,
    },
    frame::{FrameContext, FrameKind, TxClass},
    pib::{Pib, PibError},
    queue::TxQueues,
    security::secure_outgoing,
    status::TxStatus,
    timer_queue::{rollover_for_beacon_order, Alignment, TimerHandle, TimerQueue},
};
use crate::upper::UpperMac;

/// The ports a [`TxEngine`] is built from.
pub trait Platform {
    /// Issues the transmit commands and moves the receive channels.
    type Radio: RadioPort;
    /// Hardware tick counter behind the timer queue.
    type Timer: TickTimer;
    /// Receives the terminal frame outcomes.
    type Upper: UpperMac;
    /// Random source of the CSMA-CA backoffs.
    type Rng: RngCore;
    /// Key lookup and the frame security transform.
    type Security: SecurityTransform;
    /// Broadcast and unicast channel sequences.
    type Channels: ChannelPlan;
}

/// Port instances handed to [`TxEngine::new`].
pub struct Ports<P: Platform> {
    pub radio: P::Radio,
    pub timer: P::Timer,
    pub upper: P::Upper,
    pub rng: P::Rng,
    pub security: P::Security,
    pub channels: P::Channels,
}

/// Input of [`TxEngine::handle_event`].
#[derive(Debug, Clone)]
pub enum Event {
    /// A new frame from the upper MAC.
    Enqueue(FrameContext),
    /// Re-evaluates the class queues.
    Dispatch,
    /// Compare interrupt of the tick timer.
    TimerCompare,
    /// Rollover interrupt of the tick timer.
    TimerRollover,
    /// The radio finished the command of the frame on air.
    RadioComplete(TxStatus),
    /// Starts the own broadcast schedule at the given position, e.g. when
    /// the node forms the network.
    StartBroadcastSchedule { bfio: Tick, slot: u16 },
    StopBroadcastSchedule,
    /// Starts the own unicast schedule at the given slot.
    StartUnicastSchedule { slot: u16 },
    /// BT-IE content received from the broadcast schedule parent.
    BroadcastTiming {
        ie: [u8; BT_IE_LEN],
        rx_timestamp: Uptime,
    },
    /// UT-IE content received from a neighbor.
    UnicastTiming {
        src: Address,
        ie: [u8; UT_IE_LEN],
        rx_timestamp: Uptime,
    },
    /// Aborts every async frame.
    AsyncStop,
    /// The EDFE burst in progress ended.
    EdfeEnded,
    /// Removes the frame with the given MSDU handle.
    Purge(u8),
    /// The receiver is enabled for the given reasons.
    RxEnable(RxEnableFlags),
    /// Outcome of a reception, with the received command if any.
    RxOutcome {
        command: Option<FrameKind>,
        success: bool,
    },
}

/// What an engine timer is armed for.
#[derive(Debug, Eq, PartialEq, Clone, Copy)]
pub enum TimerKind {
    /// End of the backoff of the active frame.
    Backoff,
    /// Start or end of the broadcast dwell.
    BroadcastSlot,
    /// Next own unicast slot.
    UnicastSlot,
}

#[derive(Debug, Clone, Copy)]
enum TxPhase {
    Backoff(TimerHandle),
    OnAir(CommandHandle),
}

#[derive(Debug)]
struct ActiveTx {
    frame: FrameContext,
    phase: TxPhase,
    /// The frame was purged while on air and completes as aborted.
    abort_requested: bool,
}

/// Dispatch decision for the head of a class queue.
enum Admission {
    Ready,
    /// Waits for a slot boundary or the end of a burst.
    Hold,
    Reject(TxStatus),
}

/// Result of an attempt to make a frame the active frame.
enum Start {
    Started,
    /// Requeued for a later slot.
    Deferred,
    /// Reported to the upper MAC.
    Failed,
}

/// Transmission scheduler and frequency hopping slot state.
///
/// `Q` is the capacity of each class queue, `T` the size of the timer arena
/// and `N` the capacity of the neighbor table.
pub struct TxEngine<P: Platform, const Q: usize = 8, const T: usize = 8, const N: usize = 16> {
    pib: Pib,
    radio: P::Radio,
    timer: P::Timer,
    upper: P::Upper,
    rng: P::Rng,
    security: P::Security,
    channels: P::Channels,
    timers: TimerQueue<TimerKind, T>,
    /// Uptime at the start of the current rollover period.
    epoch: Uptime,
    queues: TxQueues<Q>,
    neighbors: NeighborTable<N>,
    fh: FhSlotSynchronizer,
    activity: ActivityClassifier,
    active: Option<ActiveTx>,
    edfe_active: bool,
    bc_timer: Option<TimerHandle>,
    /// Broadcast slot boundary the broadcast timer is armed for.
    bc_boundary: Uptime,
    uc_timer: Option<TimerHandle>,
    uc_boundary: Uptime,
}

impl<P: Platform, const Q: usize, const T: usize, const N: usize> TxEngine<P, Q, T, N> {
    pub fn new(pib: Pib, ports: Ports<P>) -> Result<Self, PibError> {
        pib.validate(Q)?;

        let Ports {
            radio,
            mut timer,
            upper,
            rng,
            security,
            channels,
        } = ports;

        let timers = TimerQueue::new(MAC_DEFAULT_ROLLOVER);
        timer.set_rollover(MAC_DEFAULT_ROLLOVER);
        timer.set_compare(timers.compare());

        let fh = FhSlotSynchronizer::new(
            pib.bc_interval,
            pib.bc_dwell,
            pib.slot_edge_guard,
            pib.uc_dwell,
        );
        let activity = ActivityClassifier::new(pib.activity);
        let queues = TxQueues::new(pib.tx_data_max);

        Ok(Self {
            pib,
            radio,
            timer,
            upper,
            rng,
            security,
            channels,
            timers,
            epoch: 0,
            queues,
            neighbors: NeighborTable::new(),
            fh,
            activity,
            active: None,
            edfe_active: false,
            bc_timer: None,
            bc_boundary: 0,
            uc_timer: None,
            uc_boundary: 0,
        })
    }

    /// Runs one event to completion, then fires the timers that are due and
    /// reprograms the compare register.
    pub fn handle_event(&mut self, event: Event) {
        match event {
            Event::Enqueue(frame) => self.enqueue(frame),
            Event::Dispatch => self.dispatch(),
            Event::TimerCompare => {}
            Event::TimerRollover => self.on_rollover(),
            Event::RadioComplete(status) => self.on_radio_complete(status),
            Event::StartBroadcastSchedule { bfio, slot } => {
                self.start_broadcast_schedule(bfio, slot)
            }
            Event::StopBroadcastSchedule => self.stop_broadcast_schedule(),
            Event::StartUnicastSchedule { slot } => self.start_unicast_schedule(slot),
            Event::BroadcastTiming { ie, rx_timestamp } => {
                self.on_broadcast_timing(&ie, rx_timestamp)
            }
            Event::UnicastTiming {
                src,
                ie,
                rx_timestamp,
            } => self.on_unicast_timing(&src, &ie, rx_timestamp),
            Event::AsyncStop => self.async_stop(),
            Event::EdfeEnded => {
                self.edfe_active = false;
                self.dispatch();
            }
            Event::Purge(msdu_handle) => self.purge(msdu_handle),
            Event::RxEnable(flags) => {
                self.activity.classify_rx(flags, self.pib.fh_enabled);
            }
            Event::RxOutcome { command, success } => {
                self.activity.record_rx_outcome(command, success)
            }
        }

        self.service_timers();
    }

    /// Current uptime in ticks.
    pub fn now(&self) -> Uptime {
        self.epoch + self.timer.now() as Uptime
    }

    pub fn pib(&self) -> &Pib {
        &self.pib
    }

    /// Replaces the PIB. A running broadcast schedule keeps its slot and
    /// restarts at the beginning of its dwell.
    pub fn set_pib(&mut self, pib: Pib) -> Result<(), PibError> {
        pib.validate(Q)?;

        let now = self.now();
        let schedule_changed = (pib.bc_interval, pib.bc_dwell, pib.slot_edge_guard)
            != (self.pib.bc_interval, self.pib.bc_dwell, self.pib.slot_edge_guard);
        if schedule_changed {
            self.fh
                .set_schedule(now, pib.bc_interval, pib.bc_dwell, pib.slot_edge_guard);
        }
        self.fh.set_uc_dwell(pib.uc_dwell);
        self.queues.set_limit(pib.tx_data_max);
        if pib.activity != self.pib.activity {
            self.activity = ActivityClassifier::new(pib.activity);
        }
        self.pib = pib;

        if schedule_changed && self.fh.is_started() {
            self.restart_broadcast_timer(now);
            self.service_timers();
        }
        Ok(())
    }

    pub fn neighbors(&self) -> &NeighborTable<N> {
        &self.neighbors
    }

    pub fn neighbors_mut(&mut self) -> &mut NeighborTable<N> {
        &mut self.neighbors
    }

    pub fn queues(&self) -> &TxQueues<Q> {
        &self.queues
    }

    pub fn timers(&self) -> &TimerQueue<TimerKind, T> {
        &self.timers
    }

    pub fn fh(&self) -> &FhSlotSynchronizer {
        &self.fh
    }

    pub fn activity(&self) -> &ActivityClassifier {
        &self.activity
    }

    /// The frame backing off or on air.
    pub fn active_frame(&self) -> Option<&FrameContext> {
        self.active.as_ref().map(|active| &active.frame)
    }

    /// Priority of a receive command for the current RX activity.
    pub fn rx_priority(&self, lost_beacons: u8) -> u32 {
        self.activity.rx_priority(lost_beacons)
    }

    /// Ticks until the engine needs the CPU again, see
    /// [`TimerQueue::next_timeout`].
    pub fn next_timeout(&self) -> Tick {
        self.timers.next_timeout(self.timer.now())
    }

    /// Adopts the rollover period of the given beacon order at the next
    /// rollover.
    pub fn set_beacon_order(&mut self, beacon_order: u8) {
        self.timers
            .sync_rollover(rollover_for_beacon_order(beacon_order));
    }

    /// The tick counter jumped by `adjust` ticks and now wraps at `rollover`.
    pub fn realign(&mut self, adjust: i32, rollover: Tick) {
        self.epoch = (self.epoch as i64 - adjust as i64).max(0) as Uptime;
        self.timers.realign(self.timer.now(), adjust, rollover);
        self.timer.set_rollover(rollover);
        self.service_timers();
    }

    /// BT-IE content announcing the own broadcast schedule in a frame that
    /// goes out `lead` ticks from now. `None` until the schedule started.
    pub fn broadcast_timing_ie(&self, lead: Tick) -> Option<[u8; BT_IE_LEN]> {
        if !self.fh.is_started() {
            return None;
        }
        let timing = self.fh.timing(self.now() + lead as Uptime);
        Some(encode_bt_ie(timing, self.fh.interval()))
    }

    /// UT-IE content announcing the own unicast schedule in a frame of
    /// `frame_type` that goes out `lead` ticks from now.
    pub fn unicast_timing_ie(&self, frame_type: u8, lead: Tick) -> [u8; UT_IE_LEN] {
        let dwell = self.fh.uc_dwell().max(1);
        let position = self.fh.unicast_position(self.now() + lead as Uptime)
            % unicast_sequence_len(dwell);
        encode_ut_ie(frame_type, position, dwell)
    }

    pub fn radio(&self) -> &P::Radio {
        &self.radio
    }

    pub fn radio_mut(&mut self) -> &mut P::Radio {
        &mut self.radio
    }

    pub fn timer(&self) -> &P::Timer {
        &self.timer
    }

    pub fn timer_mut(&mut self) -> &mut P::Timer {
        &mut self.timer
    }

    pub fn upper(&self) -> &P::Upper {
        &self.upper
    }

    pub fn upper_mut(&mut self) -> &mut P::Upper {
        &mut self.upper
    }

    fn csma(&self) -> CsmaBackoffEngine {
        CsmaBackoffEngine::new(self.pib.csma())
    }

    fn is_on_air(&self) -> bool {
        matches!(
            self.active,
            Some(ActiveTx {
                phase: TxPhase::OnAir(_),
                ..
            })
        )
    }

    fn enqueue(&mut self, frame: FrameContext) {
        match self.queues.push_back(frame) {
            Ok(()) => self.dispatch(),
            Err((_, frame)) => {
                warn!("transmit queue full, frame rejected");
                self.complete(frame, TxStatus::TransactionOverflow);
            }
        }
    }

    /// Starts the head of the first class queue that may go now.
    fn dispatch(&mut self) {
        self.dispatch_except(None)
    }

    /// Like [`TxEngine::dispatch`], leaving out the queue of `skip`.
    fn dispatch_except(&mut self, skip: Option<TxClass>) {
        'dispatch: while self.active.is_none() {
            let now = self.now();
            for class in TxClass::DISPATCH_ORDER {
                if skip == Some(class) {
                    continue;
                }
                let admission = match self.queues.front(class) {
                    Some(frame) => self.admission(frame, now),
                    None => continue,
                };

                match admission {
                    Admission::Hold => continue,
                    Admission::Reject(status) => {
                        if let Some(frame) = self.queues.pop_front(class) {
                            self.complete(frame, status);
                        }
                        continue 'dispatch;
                    }
                    Admission::Ready => {
                        let Some(frame) = self.queues.pop_front(class) else {
                            continue;
                        };
                        match self.start_transmission(frame) {
                            Start::Failed => continue 'dispatch,
                            Start::Deferred => continue,
                            Start::Started => return,
                        }
                    }
                }
            }
            return;
        }
    }

    fn admission(&self, frame: &FrameContext, now: Uptime) -> Admission {
        if !self.pib.fh_enabled {
            return Admission::Ready;
        }

        match frame.class {
            TxClass::Async => Admission::Ready,
            TxClass::Broadcast if !self.fh.is_started() || self.fh.dwell() == 0 => {
                warn!("no broadcast dwell scheduled, frame dropped");
                Admission::Reject(TxStatus::BadState)
            }
            TxClass::Broadcast if self.fh.is_broadcast_eligible(now) => Admission::Ready,
            TxClass::Broadcast => Admission::Hold,
            TxClass::Edfe if self.edfe_active => Admission::Hold,
            TxClass::Unicast | TxClass::Edfe => {
                if self.neighbors.get(&frame.dst).is_none() {
                    debug!("no unicast schedule for the destination");
                    Admission::Reject(TxStatus::LookupError)
                } else if self.fh.is_unicast_eligible(now, self.pib.slot_edge_guard) {
                    Admission::Ready
                } else {
                    Admission::Hold
                }
            }
        }
    }

    /// Secures the frame and starts its CSMA-CA sequence unless one is in
    /// progress, then arms the backoff. Async frames go to the radio right
    /// away.
    fn start_transmission(&mut self, mut frame: FrameContext) -> Start {
        if !frame.backoff.in_progress {
            if let Err(status) = secure_outgoing(
                &mut self.security,
                &mut frame,
                &mut self.pib.frame_counter,
                self.pib.max_frame_size,
            ) {
                self.complete(frame, status);
                return Start::Failed;
            }
            self.csma().begin(&mut frame.backoff, frame.options.alt_be);
        }

        if frame.class == TxClass::Async {
            frame.channel = self.async_channel(&frame);
            self.transmit(frame);
            return Start::Started;
        }

        let fh = self.fh_backoff(&frame, self.now());
        let units = self.csma().prepare(&frame.backoff, &mut self.rng, fh);
        self.schedule_attempt(frame, units)
    }

    fn schedule_attempt(&mut self, mut frame: FrameContext, units: u32) -> Start {
        match self.plan_attempt(&mut frame, units) {
            Ok(backoff) => {
                let handle = self.arm(Alignment::Unaligned, backoff, TimerKind::Backoff);
                self.active = Some(ActiveTx {
                    frame,
                    phase: TxPhase::Backoff(handle),
                    abort_requested: false,
                });
                Start::Started
            }
            Err(TxStatus::NoTime) => {
                if self.defer(frame) {
                    Start::Deferred
                } else {
                    Start::Failed
                }
            }
            Err(status) => {
                self.complete(frame, status);
                Start::Failed
            }
        }
    }

    /// Turns a backoff in unit periods into ticks fitting the slot schedule
    /// and selects the channel of the attempt.
    fn plan_attempt(&self, frame: &mut FrameContext, units: u32) -> Result<Tick, TxStatus> {
        let mut backoff = backoff_ticks(units);
        let now = self.now();

        match frame.class {
            TxClass::Async => {
                frame.channel = self.async_channel(frame);
                Ok(backoff)
            }
            _ if !self.pib.fh_enabled => {
                frame.channel = self.pib.channel;
                Ok(backoff)
            }
            TxClass::Broadcast => {
                if self.fh.dwell() >= ticks(FH_BROADCAST_IOT_DWELL) {
                    backoff = backoff.max(ticks(FH_BROADCAST_MIN_BACKOFF));
                }
                let (backoff, slot) = self
                    .fh
                    .broadcast_tx_window(now, backoff)
                    .map_err(|_| TxStatus::NoTime)?;
                frame.channel = self.channels.broadcast_channel(slot);
                Ok(backoff)
            }
            TxClass::Unicast | TxClass::Edfe => {
                backoff += self
                    .fh
                    .unicast_tx_window(now, backoff)
                    .map_err(|_| TxStatus::NoTime)?;
                let schedule = self
                    .neighbors
                    .get(&frame.dst)
                    .ok_or(TxStatus::LookupError)?;
                backoff += schedule.slot_edge_backoff(
                    now,
                    backoff,
                    self.pib.clock_drift,
                    self.pib.slot_edge_guard,
                );
                frame.channel =
                    schedule.channel_at(&frame.dst, now + backoff as Uptime, &self.channels);
                Ok(backoff)
            }
        }
    }

    fn async_channel(&self, frame: &FrameContext) -> u8 {
        frame
            .async_channels
            .as_ref()
            .and_then(|channels| channels.current())
            .unwrap_or(self.pib.channel)
    }

    fn fh_backoff(&self, frame: &FrameContext, now: Uptime) -> Option<FhBackoff> {
        if !self.pib.fh_enabled || !frame.class.is_hopping() {
            return None;
        }

        let remaining_dwell = match frame.class {
            TxClass::Unicast | TxClass::Edfe => self
                .neighbors
                .get(&frame.dst)
                .map_or(0, |schedule| schedule.remaining_dwell(now)),
            _ => 0,
        };
        Some(FhBackoff {
            base_backoff: self.pib.base_backoff,
            remaining_dwell,
        })
    }

    /// Whether the slot schedule still allows the frame to go out now.
    fn in_slot(&self, frame: &FrameContext) -> bool {
        if !self.pib.fh_enabled {
            return true;
        }
        let phase = self.fh.phase(self.now());
        match frame.class {
            TxClass::Async => true,
            TxClass::Broadcast => phase == SlotPhase::InDwell,
            // the guard window only holds back new attempts
            TxClass::Unicast | TxClass::Edfe => phase != SlotPhase::InDwell,
        }
    }

    fn on_backoff_expired(&mut self) {
        let Some(active) = self.active.take() else {
            warn!("backoff expired without an active frame");
            return;
        };
        let TxPhase::Backoff(_) = active.phase else {
            self.active = Some(active);
            return;
        };

        let frame = active.frame;
        if !self.in_slot(&frame) {
            let class = frame.class;
            if self.defer(frame) {
                self.after_defer(class);
            } else {
                self.after_tx();
            }
            return;
        }
        self.transmit(frame);
    }

    fn transmit(&mut self, mut frame: FrameContext) {
        let activity = self.activity.classify_tx(frame.kind, frame.class);
        frame.priority = self.activity.tx_priority();
        if frame.class == TxClass::Edfe {
            self.edfe_active = true;
        }

        let request = TxRequest {
            payload: frame.payload,
            channel: frame.channel,
            start: self.timer.now(),
            priority: frame.priority,
            // no CCA inside the broadcast dwell
            cca: !(self.pib.fh_enabled && frame.class == TxClass::Broadcast),
            coex: activity.is_coex_priority(),
        };
        let command = self.radio.schedule_transmit(request);
        self.active = Some(ActiveTx {
            frame,
            phase: TxPhase::OnAir(command),
            abort_requested: false,
        });
    }

    fn on_radio_complete(&mut self, status: TxStatus) {
        let Some(ActiveTx {
            frame,
            phase: TxPhase::OnAir(_),
            abort_requested,
        }) = self.active.take()
        else {
            panic!("radio completion without a frame on air");
        };

        self.activity
            .record_tx_outcome(frame.kind, status.is_success());

        if abort_requested {
            self.complete(frame, TxStatus::TxAborted);
            self.after_tx();
            return;
        }

        match status {
            TxStatus::ChannelBusy => self.on_channel_busy(frame),
            TxStatus::NoTime => {
                let class = frame.class;
                if self.defer(frame) {
                    self.after_defer(class);
                } else {
                    self.after_tx();
                }
            }
            _ if frame.class == TxClass::Async => self.next_async_channel(frame, status),
            TxStatus::Success | TxStatus::AckPending => {
                let status = if status == TxStatus::AckPending && frame.kind == FrameKind::DataRequest
                {
                    TxStatus::AckPending
                } else {
                    TxStatus::Success
                };
                self.complete(frame, status);
                self.after_tx();
            }
            status => self.attempt_failed(frame, status),
        }
    }

    fn on_channel_busy(&mut self, mut frame: FrameContext) {
        let fh = self.fh_backoff(&frame, self.now());
        match self
            .csma()
            .on_channel_busy(&mut frame.backoff, &mut self.rng, fh)
        {
            BusyOutcome::Retry(units) => {
                let class = frame.class;
                let start = self.schedule_attempt(frame, units);
                self.resume(start, class);
            }
            BusyOutcome::ChannelAccessFailure => {
                debug!("CSMA-CA backoffs exhausted");
                if frame.class == TxClass::Async {
                    self.next_async_channel(frame, TxStatus::ChannelAccessFailure);
                } else {
                    self.attempt_failed(frame, TxStatus::ChannelAccessFailure);
                }
            }
        }
    }

    /// Moves an async frame to its next channel. Every transmission consumes
    /// a channel, whatever its outcome.
    fn next_async_channel(&mut self, mut frame: FrameContext, status: TxStatus) {
        if frame.async_channels.is_none() {
            let status = if status.is_success() {
                TxStatus::Success
            } else {
                status
            };
            self.complete(frame, status);
            self.after_tx();
            return;
        }

        let next = frame
            .async_channels
            .as_mut()
            .and_then(|channels| channels.advance());
        if next.is_none() {
            self.complete(frame, TxStatus::Success);
            self.after_tx();
            return;
        }

        self.csma().reset(&mut frame.backoff);
        let class = frame.class;
        let start = self.start_transmission(frame);
        self.resume(start, class);
    }

    /// Retransmits the frame if the failure and the retry budget allow it,
    /// otherwise reports the failure.
    fn attempt_failed(&mut self, mut frame: FrameContext, status: TxStatus) {
        let retry = match status {
            TxStatus::NoAck => true,
            TxStatus::ChannelAccessFailure => {
                self.pib.fh_enabled && frame.class.is_hopping() && self.pib.base_backoff != 0
            }
            _ => false,
        };

        if retry && !frame.is_indirect() && frame.retries < self.pib.max_frame_retries {
            frame.retries += 1;
            self.csma().reset(&mut frame.backoff);
            frame.backoff.retransmit = true;
            let class = frame.class;
            let start = self.start_transmission(frame);
            self.resume(start, class);
            return;
        }

        self.complete(frame, status);
        self.after_tx();
    }

    /// Continues after the frame of `class` that was active got a new
    /// attempt.
    fn resume(&mut self, start: Start, class: TxClass) {
        match start {
            Start::Started => {}
            Start::Deferred => self.after_defer(class),
            Start::Failed => self.after_tx(),
        }
    }

    /// Puts a frame that missed its slot back at the head of its queue.
    /// Returns `false` if the queue depth was exceeded and the frame was
    /// reported instead.
    fn defer(&mut self, frame: FrameContext) -> bool {
        warn!("frame deferred to the next slot");
        if frame.class == TxClass::Edfe {
            // the exchange starts over once it is dispatched again
            self.edfe_active = false;
        }
        match self.queues.requeue_front(frame) {
            Ok(()) => true,
            Err((_, frame)) => {
                warn!("requeue overflow, frame dropped");
                self.complete(frame, TxStatus::TransactionOverflow);
                false
            }
        }
    }

    /// Reports the terminal outcome of a frame.
    fn complete(&mut self, mut frame: FrameContext, status: TxStatus) {
        self.csma().reset(&mut frame.backoff);
        if !status.is_success() {
            debug!("transmission failed");
            if frame.class == TxClass::Edfe {
                self.edfe_active = false;
            }
        }
        self.upper.tx_complete(frame, status);
    }

    fn after_tx(&mut self) {
        self.apply_pending_hops();
        self.dispatch();
    }

    /// The deferred frame waits for the next slot, other classes may go now.
    fn after_defer(&mut self, class: TxClass) {
        self.apply_pending_hops();
        self.dispatch_except(Some(class));
    }

    fn apply_pending_hops(&mut self) {
        if self.fh.take_pending_bc_hop() {
            self.sync_broadcast_window(self.now());
        }
    }

    /// Opens the broadcast window on the channel of the current slot or
    /// closes it, following the dwell state. A hop while on air waits for
    /// the completion.
    fn sync_broadcast_window(&mut self, now: Uptime) {
        if !self.fh.is_dwell_active() {
            self.radio.set_broadcast_window(None);
        } else if self.is_on_air() {
            self.fh.defer_broadcast_hop();
        } else {
            let (_, slot) = self.fh.current_bfio(now);
            self.radio
                .set_broadcast_window(Some(self.channels.broadcast_channel(slot)));
        }
    }

    fn apply_unicast_hop(&mut self) {
        let channel = self.channels.unicast_channel(
            &self.pib.address(),
            self.fh.uc_slot(),
            self.pib.uc_num_channels,
        );
        self.radio.set_unicast_channel(channel);
    }

    fn start_broadcast_schedule(&mut self, bfio: Tick, slot: u16) {
        let now = self.now();
        let bfio = bfio % self.fh.interval().max(1);
        self.fh.start(now, bfio, slot);
        self.restart_broadcast_timer(now);
        self.dispatch();
    }

    fn stop_broadcast_schedule(&mut self) {
        self.fh.stop();
        if let Some(handle) = self.bc_timer.take() {
            self.timers.cancel(self.timer.now(), handle);
        }
        self.radio.set_broadcast_window(None);
        self.dispatch();
    }

    fn restart_broadcast_timer(&mut self, now: Uptime) {
        if let Some(handle) = self.bc_timer.take() {
            self.timers.cancel(self.timer.now(), handle);
        }
        self.fh.take_pending_bc_hop();
        self.sync_broadcast_window(now);
        if self.fh.dwell() != 0 {
            let next_in = self.fh.next_boundary_in(now);
            self.arm_broadcast_slot(now + next_in as Uptime);
        }
    }

    fn start_unicast_schedule(&mut self, slot: u16) {
        let now = self.now();
        self.fh.start_unicast(now, slot);
        if let Some(handle) = self.uc_timer.take() {
            self.timers.cancel(self.timer.now(), handle);
        }
        // inside the dwell the hop happens when it ends
        if !self.fh.is_dwell_active() {
            self.apply_unicast_hop();
        }
        if self.fh.uc_dwell() != 0 {
            self.arm_unicast_slot(now + self.fh.uc_dwell() as Uptime);
        }
    }

    fn on_broadcast_timing(&mut self, ie: &[u8], rx_timestamp: Uptime) {
        let Some(timing) = decode_bt_ie(ie, self.fh.interval()) else {
            warn!("malformed BT-IE ignored");
            return;
        };

        let now = self.now();
        let was_started = self.fh.is_started();
        if !self
            .fh
            .update_from_slot_descriptor(now, timing, rx_timestamp)
        {
            return;
        }

        info!("broadcast schedule resynchronized");
        self.restart_broadcast_timer(now);
        if !was_started {
            self.dispatch();
        }
    }

    fn on_unicast_timing(&mut self, src: &Address, ie: &[u8], rx_timestamp: Uptime) {
        let Some((_, ufsi)) = decode_ut_ie(ie) else {
            warn!("malformed UT-IE ignored");
            return;
        };
        if !self.neighbors.update_from_ut_ie(src, ufsi, rx_timestamp) {
            debug!("UT-IE from an unknown neighbor");
        }
    }

    fn purge(&mut self, msdu_handle: u8) {
        if let Some(frame) = self.queues.purge(msdu_handle) {
            self.complete(frame, TxStatus::TxAborted);
            return;
        }
        self.abort_active(|frame| frame.msdu_handle == msdu_handle);
    }

    fn async_stop(&mut self) {
        while let Some(frame) = self.queues.pop_front(TxClass::Async) {
            self.complete(frame, TxStatus::TxAborted);
        }
        self.abort_active(|frame| frame.class == TxClass::Async);
    }

    /// Aborts the active frame if it matches. A frame on air completes as
    /// aborted once the radio confirms the abort.
    fn abort_active(&mut self, matches: impl Fn(&FrameContext) -> bool) {
        let phase = match &self.active {
            Some(active) if matches(&active.frame) => active.phase,
            _ => return,
        };

        match phase {
            TxPhase::OnAir(command) => {
                if let Some(active) = self.active.as_mut() {
                    active.abort_requested = true;
                }
                self.radio.abort(command);
            }
            TxPhase::Backoff(timer) => {
                self.timers.cancel(self.timer.now(), timer);
                if let Some(active) = self.active.take() {
                    self.complete(active.frame, TxStatus::TxAborted);
                    self.after_tx();
                }
            }
        }
    }

    fn on_rollover(&mut self) {
        self.epoch += self.timers.rollover() as Uptime;
        if let Some(period) = self.timers.on_rollover(self.timer.now()) {
            self.timer.set_rollover(period);
        }
    }

    fn service_timers(&mut self) {
        while let Some(kind) = self.timers.pop_expired(self.timer.now()) {
            match kind {
                TimerKind::Backoff => self.on_backoff_expired(),
                TimerKind::BroadcastSlot => self.on_broadcast_slot(),
                TimerKind::UnicastSlot => self.on_unicast_slot(),
            }
        }
        self.timer.set_compare(self.timers.compare());
    }

    fn on_broadcast_slot(&mut self) {
        self.bc_timer = None;
        let boundary = self.bc_boundary;
        if self.now() < boundary {
            self.arm_broadcast_slot(boundary);
            return;
        }

        match self.fh.on_broadcast_timer_tick(boundary) {
            SlotTransition::DwellStarted { next_in, .. } => {
                self.sync_broadcast_window(boundary);
                self.arm_broadcast_slot(boundary + next_in as Uptime);
                self.dispatch();
            }
            SlotTransition::DwellEnded { next_in } => {
                self.fh.take_pending_bc_hop();
                self.radio.set_broadcast_window(None);
                // back to the own unicast channel, including a deferred hop
                self.fh.take_pending_uc_hop();
                self.apply_unicast_hop();
                self.arm_broadcast_slot(boundary + next_in as Uptime);
                self.dispatch();
            }
            SlotTransition::Idle => {}
        }
    }

    fn on_unicast_slot(&mut self) {
        self.uc_timer = None;
        let boundary = self.uc_boundary;
        if self.now() < boundary {
            self.arm_unicast_slot(boundary);
            return;
        }

        if let UnicastHop::Apply(_) = self.fh.on_unicast_timer_tick(boundary) {
            self.apply_unicast_hop();
        }
        if self.fh.uc_dwell() != 0 {
            self.arm_unicast_slot(boundary + self.fh.uc_dwell() as Uptime);
        }
    }

    fn arm_broadcast_slot(&mut self, at: Uptime) {
        self.bc_boundary = at;
        self.bc_timer = Some(self.arm_at(at, TimerKind::BroadcastSlot));
    }

    fn arm_unicast_slot(&mut self, at: Uptime) {
        self.uc_boundary = at;
        self.uc_timer = Some(self.arm_at(at, TimerKind::UnicastSlot));
    }

    fn arm(&mut self, alignment: Alignment, ticks: Tick, kind: TimerKind) -> TimerHandle {
        match self.timers.arm(self.timer.now(), alignment, ticks, kind) {
            Ok(handle) => handle,
            Err(_) => panic!("timer arena exhausted"),
        }
    }

    /// Arms an aligned timer at an absolute uptime. A boundary that already
    /// passed fires on the next tick. A boundary more than one rollover
    /// period ahead is reached through intermediate wakeups one period
    /// apart, the slot handlers re-arm until it is due.
    fn arm_at(&mut self, at: Uptime, kind: TimerKind) -> TimerHandle {
        let now = self.now();
        let period = self.timers.rollover() as Uptime;
        let at = at.clamp(now + 1, now + period);
        let tick = ((at - self.epoch) % period) as Tick;
        self.arm(Alignment::Aligned, tick, kind)
    }
}

/// A [`TxEngine`] shared between task context and interrupt context.
///
/// Every event runs inside one critical section.
pub struct SharedTxEngine<P: Platform, const Q: usize = 8, const T: usize = 8, const N: usize = 16>
{
    engine: IrqCell<TxEngine<P, Q, T, N>>,
}

impl<P: Platform, const Q: usize, const T: usize, const N: usize> SharedTxEngine<P, Q, T, N> {
    pub const fn new(engine: TxEngine<P, Q, T, N>) -> Self {
        Self {
            engine: IrqCell::new(engine),
        }
    }

    /// # Panics
    ///
    /// Panics if called from inside [`SharedTxEngine::with`] or from a port
    /// callback of the same engine.
    pub fn handle_event(&self, event: Event) {
        self.engine.lock().handle_event(event)
    }

    pub fn with<R>(&self, f: impl FnOnce(&mut TxEngine<P, Q, T, N>) -> R) -> R {
        self.engine.with(f)
    }

    pub fn into_inner(self) -> TxEngine<P, Q, T, N> {
        self.engine.into_inner()
    }
}
