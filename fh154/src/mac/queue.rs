//! Per-class transmit queues.

use heapless::Deque;

use super::frame::{FrameContext, TxClass};

#[derive(Debug, Eq, PartialEq, Clone, Copy)]
pub enum QueueError {
    /// Too many direct (or indirect) frames are waiting.
    DepthExceeded,
    /// The class queue has no room left.
    QueueFull,
}

/// One FIFO per [`TxClass`].
///
/// The number of queued direct and indirect frames is limited separately by
/// `limit` (txDataMax). The frame being transmitted is not queued and does
/// not count.
pub struct TxQueues<const Q: usize> {
    queues: [Deque<FrameContext, Q>; 4],
    limit: u8,
}

impl<const Q: usize> TxQueues<Q> {
    pub fn new(limit: u8) -> Self {
        Self {
            queues: [Deque::new(), Deque::new(), Deque::new(), Deque::new()],
            limit,
        }
    }

    pub fn set_limit(&mut self, limit: u8) {
        self.limit = limit;
    }

    /// Appends a new frame to its class queue.
    pub fn push_back(&mut self, frame: FrameContext) -> Result<(), (QueueError, FrameContext)> {
        if let Err(error) = self.check_depth(&frame) {
            return Err((error, frame));
        }
        self.queues[frame.class.index()]
            .push_back(frame)
            .map_err(|frame| (QueueError::QueueFull, frame))
    }

    /// Puts a deferred frame back at the head of its class queue.
    pub fn requeue_front(&mut self, frame: FrameContext) -> Result<(), (QueueError, FrameContext)> {
        if let Err(error) = self.check_depth(&frame) {
            return Err((error, frame));
        }
        self.queues[frame.class.index()]
            .push_front(frame)
            .map_err(|frame| (QueueError::QueueFull, frame))
    }

    pub fn front(&self, class: TxClass) -> Option<&FrameContext> {
        self.queues[class.index()].front()
    }

    pub fn pop_front(&mut self, class: TxClass) -> Option<FrameContext> {
        self.queues[class.index()].pop_front()
    }

    /// Removes the queued frame with the given MSDU handle.
    pub fn purge(&mut self, msdu_handle: u8) -> Option<FrameContext> {
        let mut purged = None;
        for queue in self.queues.iter_mut() {
            for _ in 0..queue.len() {
                let Some(frame) = queue.pop_front() else {
                    break;
                };
                if purged.is_none() && frame.msdu_handle == msdu_handle {
                    purged = Some(frame);
                } else if queue.push_back(frame).is_err() {
                    unreachable!("a frame was just taken out of this queue");
                }
            }
        }
        purged
    }

    pub fn len(&self, class: TxClass) -> usize {
        self.queues[class.index()].len()
    }

    pub fn is_empty(&self) -> bool {
        self.queues.iter().all(|queue| queue.is_empty())
    }

    pub fn direct_count(&self) -> usize {
        self.count(false)
    }

    pub fn indirect_count(&self) -> usize {
        self.count(true)
    }

    fn count(&self, indirect: bool) -> usize {
        self.queues
            .iter()
            .flat_map(|queue| queue.iter())
            .filter(|frame| frame.is_indirect() == indirect)
            .count()
    }

    fn check_depth(&self, frame: &FrameContext) -> Result<(), QueueError> {
        if self.count(frame.is_indirect()) >= self.limit as usize {
            return Err(QueueError::DepthExceeded);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mac::frame::{FrameKind, TxOptions};
    use fh154_driver::frame::{Address, PayloadHandle};

    fn frame(handle: u8, class: TxClass, indirect: bool) -> FrameContext {
        FrameContext::new(
            handle,
            class,
            FrameKind::Data,
            Address::Short(0x10),
            PayloadHandle(handle as u16),
            20,
        )
        .with_options(TxOptions {
            indirect,
            ..Default::default()
        })
    }

    #[test]
    fn depth_limits_are_separate() {
        let mut queues = TxQueues::<4>::new(2);
        queues.push_back(frame(1, TxClass::Unicast, false)).unwrap();
        queues.push_back(frame(2, TxClass::Broadcast, false)).unwrap();
        let (error, rejected) = queues
            .push_back(frame(3, TxClass::Unicast, false))
            .unwrap_err();
        assert_eq!(error, QueueError::DepthExceeded);
        assert_eq!(rejected.msdu_handle, 3);

        queues.push_back(frame(4, TxClass::Unicast, true)).unwrap();
        assert_eq!(queues.direct_count(), 2);
        assert_eq!(queues.indirect_count(), 1);
    }

    #[test]
    fn requeue_goes_to_the_head() {
        let mut queues = TxQueues::<4>::new(5);
        queues.push_back(frame(1, TxClass::Unicast, false)).unwrap();
        queues.push_back(frame(2, TxClass::Unicast, false)).unwrap();

        let first = queues.pop_front(TxClass::Unicast).unwrap();
        assert_eq!(queues.direct_count(), 1);
        queues.requeue_front(first).unwrap();
        assert_eq!(queues.front(TxClass::Unicast).map(|f| f.msdu_handle), Some(1));
        assert_eq!(queues.len(TxClass::Unicast), 2);
    }

    #[test]
    fn class_capacity() {
        let mut queues = TxQueues::<1>::new(5);
        queues.push_back(frame(1, TxClass::Async, false)).unwrap();
        let (error, _) = queues.push_back(frame(2, TxClass::Async, false)).unwrap_err();
        assert_eq!(error, QueueError::QueueFull);
        queues.push_back(frame(3, TxClass::Edfe, false)).unwrap();
    }

    #[test]
    fn purge_keeps_order() {
        let mut queues = TxQueues::<4>::new(5);
        for handle in 1..=3 {
            queues.push_back(frame(handle, TxClass::Unicast, false)).unwrap();
        }
        assert_eq!(queues.purge(2).map(|f| f.msdu_handle), Some(2));
        assert_eq!(queues.purge(2), None);
        assert_eq!(queues.pop_front(TxClass::Unicast).map(|f| f.msdu_handle), Some(1));
        assert_eq!(queues.pop_front(TxClass::Unicast).map(|f| f.msdu_handle), Some(3));
        assert!(queues.is_empty());
    }
}
