use crate::{EpochSlots, SLOTS_PER_EPOCH};

const EPOCH_LEN: usize = SLOTS_PER_EPOCH as usize;
const WINDOW_LEN: usize = 2 * EPOCH_LEN;

/// Block occupancy over a sliding window of two consecutive epochs.
///
/// Positions `0..32` hold the epoch being processed and `32..64` the epoch after it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilledSlots {
    window: [bool; WINDOW_LEN],
}

impl FilledSlots {
    /// Seeds the second half of the window with `first`. The first half is unused until the first
    /// call to `advance`.
    pub fn new(first: EpochSlots) -> Self {
        let mut window = [false; WINDOW_LEN];
        window[EPOCH_LEN..].copy_from_slice(&first);
        Self { window }
    }

    /// Moves the second half of the window into the first and loads `next` into the second.
    pub fn advance(&mut self, next: EpochSlots) {
        self.window.copy_within(EPOCH_LEN.., 0);
        self.window[EPOCH_LEN..].copy_from_slice(&next);
    }

    /// Returns `false` for positions outside the window.
    pub fn is_filled(&self, relative_slot: usize) -> bool {
        self.window.get(relative_slot).copied().unwrap_or(false)
    }

    /// The smallest `delay >= 1` such that a block exists at `relative_slot + delay`, i.e. the
    /// earliest point at which an attestation for `relative_slot` could have been included.
    ///
    /// Returns `None` if no later slot in the window has a block.
    pub fn min_inclusion_delay(&self, relative_slot: usize) -> Option<u64> {
        self.window
            .iter()
            .enumerate()
            .skip(relative_slot.saturating_add(1))
            .find(|(_, filled)| **filled)
            .map(|(position, _)| (position - relative_slot) as u64)
    }
}
