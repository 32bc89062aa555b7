//! Per-interval accumulation of decoded event counts.

/// Rolling total of event counts for the current flush interval.
///
/// Owned exclusively by the control loop, so no synchronisation is needed.
/// At any instant the total equals the sum of counts consumed since the
/// last call to [take].
///
/// [take]: IntervalAccumulator::take
#[derive(Debug, Default)]
pub(crate) struct IntervalAccumulator {
    total: u32,
}

impl IntervalAccumulator {
    /// Adds one decoded event count to the total.
    pub(crate) fn add(&mut self, count: u16) {
        self.total += u32::from(count);
    }

    /// Returns the current total and resets it to zero.
    ///
    /// The reset is part of taking the total, so a failed sink write cannot
    /// leave counts behind to be double-reported in the next interval.
    pub(crate) fn take(&mut self) -> u32 {
        std::mem::take(&mut self.total)
    }
}
