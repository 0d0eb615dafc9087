//! Module bitmask and the process-wide query API.
//!
//! The attached detector's snapshot is mirrored into a single atomic cell so
//! [`module_present`] and [`module_mask`] can be called from any thread
//! without locking. The cell packs an "attached" flag above the 32 mask bits;
//! one load always yields a consistent pair.

use hwmod::detector::consts::MODULE_BIT_COUNT;
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Point-in-time copy of the capability register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub struct ModuleBits(u32);

impl ModuleBits {
    /// Wrap a raw register value.
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// Whether module `bit` is present. Out-of-range bits are absent.
    pub const fn present(self, bit: u32) -> bool {
        if bit as usize >= MODULE_BIT_COUNT {
            return false;
        }
        self.0 & (1 << bit) != 0
    }

    /// The raw 32-bit mask.
    pub const fn mask(self) -> u32 {
        self.0
    }

    /// Number of present modules.
    pub const fn count(self) -> u32 {
        self.0.count_ones()
    }

    /// Present bit indices, ascending.
    pub fn iter_present(self) -> impl Iterator<Item = u32> {
        (0..MODULE_BIT_COUNT as u32).filter(move |&bit| self.present(bit))
    }
}

impl From<u32> for ModuleBits {
    fn from(raw: u32) -> Self {
        Self(raw)
    }
}

impl fmt::Display for ModuleBits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010x}", self.0)
    }
}

/// Set while a detector is attached
const ATTACHED_FLAG: u64 = 1 << 32;

/// Snapshot of the attached detector (flag | mask), 0 when detached
static SNAPSHOT: AtomicU64 = AtomicU64::new(0);

/// Make `bits` visible to the query API.
pub(crate) fn publish_snapshot(bits: ModuleBits) {
    SNAPSHOT.store(ATTACHED_FLAG | u64::from(bits.mask()), Ordering::Release);
}

/// Withdraw the snapshot; queries report "absent" afterwards.
pub(crate) fn clear_snapshot() {
    SNAPSHOT.store(0, Ordering::Release);
}

/// Snapshot of the attached detector, if any.
pub fn current() -> Option<ModuleBits> {
    let cell = SNAPSHOT.load(Ordering::Acquire);
    if cell & ATTACHED_FLAG == 0 {
        return None;
    }
    Some(ModuleBits::new(cell as u32))
}

/// Whether hardware module `bit` is present.
///
/// Returns `false` for `bit >= 32` and whenever no detector is attached.
pub fn module_present(bit: u32) -> bool {
    current().is_some_and(|bits| bits.present(bit))
}

/// The full module mask, or `0` when no detector is attached.
pub fn module_mask() -> u32 {
    current().map_or(0, ModuleBits::mask)
}
