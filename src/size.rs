use serde::{Serialize, Serializer};
use std::fmt;

const BASE: u128 = 1024;
const INITIAL_UNITS: usize = 5;
const UNIT_LABELS: [&str; 9] = ["Bytes", "KB", "MB", "GB", "TB", "PB", "EB", "ZB", "YB"];

/// Running transfer total split into base-1024 units.
///
/// Starts with five slots (Bytes, KB, MB, GB, TB). Every slot below the highest
/// occupied one stays in `0..1024`; when a carry runs past the last slot the
/// sequence grows, up to YB, which absorbs whatever is left.
///
/// Not synchronized: to total across workers, accumulate per worker and
/// [`merge`](SizeAccumulator::merge) the results.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SizeAccumulator {
    slots: Vec<u64>,
}

impl Default for SizeAccumulator {
    fn default() -> Self {
        Self::new()
    }
}

impl SizeAccumulator {
    pub fn new() -> Self {
        Self {
            slots: vec![0; INITIAL_UNITS],
        }
    }

    /// Add `bytes` to the Bytes slot and carry upward.
    pub fn add(&mut self, bytes: u64) {
        self.add_at(0, bytes);
    }

    /// Fold another accumulator into this one, unit by unit.
    pub fn merge(&mut self, other: &SizeAccumulator) {
        for (unit, &value) in other.slots.iter().enumerate() {
            if value > 0 {
                self.add_at(unit, value);
            }
        }
    }

    fn add_at(&mut self, unit: usize, amount: u64) {
        let top = UNIT_LABELS.len() - 1;
        let mut index = unit.min(top);
        let mut carry = u128::from(amount);

        while carry > 0 {
            if index >= self.slots.len() {
                self.slots.resize(index + 1, 0);
            }

            if index == top {
                let value = u128::from(self.slots[index]) + carry;
                self.slots[index] = u64::try_from(value).unwrap_or(u64::MAX);
                break;
            }

            let value = u128::from(self.slots[index]) + carry;
            // remainder < 1024 and quotient <= (u64::MAX + 1023) / 1024, both fit
            self.slots[index] = (value % BASE) as u64;
            carry = value / BASE;
            index += 1;
        }
    }

    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(|&v| v == 0)
    }

    /// Unit counters, least significant first.
    pub fn slots(&self) -> &[u64] {
        &self.slots
    }

    /// Exact byte total, or `None` if it does not fit in a `u128`.
    pub fn total_bytes(&self) -> Option<u128> {
        self.slots.iter().rev().try_fold(0u128, |acc, &value| {
            acc.checked_mul(BASE)?.checked_add(u128::from(value))
        })
    }
}

impl fmt::Display for SizeAccumulator {
    /// Non-zero units, most significant first: `2GB 1MB`. Empty when zero.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (unit, &value) in self.slots.iter().enumerate().rev() {
            if value == 0 {
                continue;
            }
            if !first {
                f.write_str(" ")?;
            }
            write!(f, "{}{}", value, UNIT_LABELS[unit])?;
            first = false;
        }
        Ok(())
    }
}

impl Extend<u64> for SizeAccumulator {
    fn extend<I: IntoIterator<Item = u64>>(&mut self, iter: I) {
        for bytes in iter {
            self.add(bytes);
        }
    }
}

impl FromIterator<u64> for SizeAccumulator {
    fn from_iter<I: IntoIterator<Item = u64>>(iter: I) -> Self {
        let mut size = Self::new();
        size.extend(iter);
        size
    }
}

impl Serialize for SizeAccumulator {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}
