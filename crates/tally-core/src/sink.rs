use crate::{IndicatorError, TallyState};
use tracing::{debug, warn};

/// Receives the computed tally state at the end of each cycle.
///
/// Implementations must not fail: a broken indicator is reported and the
/// remaining tallies are still applied.
pub trait IndicatorSink: Send + 'static {
    fn apply(&mut self, state: &TallyState);
}

/// Hardware-facing output: drive one indicator to an electrical level.
pub trait IndicatorDriver: Send + 'static {
    fn set_level(&mut self, indicator_id: u32, high: bool) -> Result<(), IndicatorError>;
}

impl<D: IndicatorDriver + ?Sized> IndicatorDriver for Box<D> {
    fn set_level(&mut self, indicator_id: u32, high: bool) -> Result<(), IndicatorError> {
        (**self).set_level(indicator_id, high)
    }
}

/// Sink translating logical tally state into driver levels, honouring each
/// tally's polarity.
pub struct IndicatorBank<D> {
    driver: D,
    failures: u64,
}

impl<D: IndicatorDriver> IndicatorBank<D> {
    pub fn new(driver: D) -> Self {
        Self {
            driver,
            failures: 0,
        }
    }

    /// Per-indicator write failures seen so far.
    pub fn failures(&self) -> u64 {
        self.failures
    }
}

impl<D: IndicatorDriver> IndicatorSink for IndicatorBank<D> {
    fn apply(&mut self, state: &TallyState) {
        for entry in state.entries() {
            let tally = &entry.tally;
            let level = tally.level_for(entry.active);
            debug!(
                "Tally {} (Pin {}): {}",
                tally.name,
                tally.indicator_id,
                if entry.active { "ON" } else { "OFF" }
            );
            if let Err(err) = self.driver.set_level(tally.indicator_id, level) {
                self.failures += 1;
                warn!(event = "indicator_error", tally = %tally.name, error = %err);
            }
        }
    }
}
