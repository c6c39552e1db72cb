use std::time::Duration;

use tracing::{debug, trace};

use crate::backend::SlotSync;
use crate::error::{RendererError, Result};

/// A fixed ring of per-frame resource slots.
///
/// Slot `i` is reused for frames `i, i + N, i + 2N, ...`. Before a slot is reused its
/// previous submission must have completed, which [`FrameResourcePool::wait_until_free`]
/// enforces with a bounded wait.
pub struct FrameResourcePool<S: SlotSync> {
    slots: Vec<S>,
    current: usize,
    wait_timeout: Duration,
}

impl<S: SlotSync> FrameResourcePool<S> {
    pub fn new(slots: Vec<S>, wait_timeout: Duration) -> Result<Self> {
        if slots.is_empty() {
            return Err(RendererError::InvalidArgument(
                "frame resource pool needs at least one slot".to_string(),
            ));
        }
        debug!("Frame resource pool with {} slots", slots.len());
        Ok(Self {
            slots,
            current: 0,
            wait_timeout,
        })
    }

    pub fn frames_in_flight(&self) -> usize {
        self.slots.len()
    }

    /// Index of the slot the next frame records into. Does not advance the ring.
    pub fn acquire_slot(&self) -> usize {
        self.current
    }

    pub fn slot(&self, index: usize) -> Result<&S> {
        self.slots.get(index).ok_or_else(|| {
            RendererError::InvalidArgument(format!(
                "slot {index} out of range for {} frames in flight",
                self.slots.len()
            ))
        })
    }

    /// Blocks until the work last submitted with `index` has finished.
    ///
    /// An expired wait means the GPU is hung; it is reported as fatal.
    pub fn wait_until_free(&self, index: usize) -> Result<()> {
        trace!("Waiting for frame slot {}", index);
        self.slot(index)?
            .wait(self.wait_timeout)
            .map_err(|e| RendererError::fatal(&format!("waiting for frame slot {index}"), e))
    }

    pub fn advance(&mut self) {
        self.current = (self.current + 1) % self.slots.len();
    }

    /// Waits for every slot, so nothing submitted through the pool is still running.
    pub fn drain(&self) -> Result<()> {
        for index in 0..self.slots.len() {
            self.wait_until_free(index)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock;

    #[test]
    fn empty_pool_is_rejected() {
        let result = FrameResourcePool::<mock::MockSlot>::new(Vec::new(), Duration::from_secs(1));
        assert!(matches!(result, Err(RendererError::InvalidArgument(_))));
    }

    #[test]
    fn slots_repeat_with_period_n() {
        let rec = mock::recorder();
        let mut pool = FrameResourcePool::new(mock::slots(&rec, 3), Duration::from_secs(1)).unwrap();
        let order: Vec<usize> = (0..7)
            .map(|_| {
                let slot = pool.acquire_slot();
                pool.advance();
                slot
            })
            .collect();
        assert_eq!(order, [0, 1, 2, 0, 1, 2, 0]);
    }

    #[test]
    fn acquire_does_not_advance() {
        let rec = mock::recorder();
        let pool = FrameResourcePool::new(mock::slots(&rec, 2), Duration::from_secs(1)).unwrap();
        assert_eq!(pool.acquire_slot(), pool.acquire_slot());
    }

    #[test]
    fn expired_wait_is_fatal() {
        let rec = mock::recorder();
        let pool = FrameResourcePool::new(mock::slots(&rec, 2), Duration::from_millis(10)).unwrap();
        pool.slot(1).unwrap().time_out.set(true);
        assert!(pool.wait_until_free(0).is_ok());
        assert!(pool.wait_until_free(1).unwrap_err().is_fatal());
    }

    #[test]
    fn drain_waits_on_every_slot() {
        let rec = mock::recorder();
        let pool = FrameResourcePool::new(mock::slots(&rec, 3), Duration::from_secs(1)).unwrap();
        pool.drain().unwrap();
        assert_eq!(rec.borrow().slot_waits, [0, 1, 2]);
    }

    #[test]
    fn out_of_range_slot_is_invalid() {
        let rec = mock::recorder();
        let pool = FrameResourcePool::new(mock::slots(&rec, 2), Duration::from_secs(1)).unwrap();
        assert!(matches!(pool.slot(2), Err(RendererError::InvalidArgument(_))));
        assert!(matches!(
            pool.wait_until_free(2),
            Err(RendererError::InvalidArgument(_))
        ));
        assert_eq!(pool.slot(1).unwrap().id, 1);
    }

    #[test]
    fn slot_reset_without_submission_never_frees() {
        let rec = mock::recorder();
        let pool = FrameResourcePool::new(mock::slots(&rec, 2), Duration::from_millis(10)).unwrap();
        pool.slot(0).unwrap().reset().unwrap();
        assert!(pool.wait_until_free(0).unwrap_err().is_fatal());
        assert!(pool.wait_until_free(1).is_ok());
    }
}
