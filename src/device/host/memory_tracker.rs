use std::sync::atomic::{AtomicU64, Ordering};

use crate::utils::error::DeviceError;

pub struct MemoryTracker {
    maximum: u64,
    current: AtomicU64,
}

impl MemoryTracker {
    pub fn new(maximum: u64) -> Self {
        Self {
            maximum,
            current: AtomicU64::new(0),
        }
    }

    pub fn allocate(&self, size: u64) -> Result<(), DeviceError> {
        let result = self
            .current
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                current
                    .checked_add(size)
                    .filter(|total| *total <= self.maximum)
            });

        match result {
            Ok(_) => Ok(()),
            Err(current) => Err(DeviceError::OutOfMemory {
                requested: size,
                available: self.maximum.saturating_sub(current),
            }),
        }
    }

    pub fn deallocate(&self, size: u64) {
        self.current.fetch_sub(size, Ordering::Release);
    }

    pub fn get_current(&self) -> u64 {
        self.current.load(Ordering::Acquire)
    }

    pub fn get_available(&self) -> u64 {
        self.maximum - self.get_current()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn refuses_to_exceed_maximum() {
        let tracker = MemoryTracker::new(100);
        tracker.allocate(60).unwrap();
        assert_eq!(
            tracker.allocate(50),
            Err(DeviceError::OutOfMemory {
                requested: 50,
                available: 40
            })
        );
        assert_eq!(tracker.get_current(), 60);

        tracker.deallocate(60);
        tracker.allocate(100).unwrap();
        assert_eq!(tracker.get_available(), 0);
    }
}
