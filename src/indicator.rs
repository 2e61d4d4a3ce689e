use crate::error::{PanelError, PanelResult};
use crate::filters::{Lamp, LightFilters, PowerSourceId};
use crate::ports::{make_label, ChannelId, Label, SourceId, ValueSource};
use serde::{Deserialize, Serialize};
use tracing::debug;

pub const DEFAULT_LOW_LIMIT: f64 = 1.0;
pub const DEFAULT_HIGH_LIMIT: f64 = 32000.0;

/// Inclusive range with `low <= high`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Range {
    low: f64,
    high: f64,
}

impl Range {
    /// Reversed bounds are swapped. Returns `None` if either bound is NaN.
    pub fn new(low: f64, high: f64) -> Option<Self> {
        if low.is_nan() || high.is_nan() {
            return None;
        }
        if low > high {
            Some(Self { low: high, high: low })
        } else {
            Some(Self { low, high })
        }
    }

    pub fn low(&self) -> f64 {
        self.low
    }

    pub fn high(&self) -> f64 {
        self.high
    }

    /// NaN is never contained.
    pub fn contains(&self, value: f64) -> bool {
        self.low <= value && value <= self.high
    }
}

impl Default for Range {
    fn default() -> Self {
        Self {
            low: DEFAULT_LOW_LIMIT,
            high: DEFAULT_HIGH_LIMIT,
        }
    }
}

/// What produces an indicator's activation each cycle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Activation {
    /// Active while the value of `source` is inside `range`, or outside it
    /// when `invert` is set.
    Range {
        source: SourceId,
        range: Range,
        invert: bool,
    },
    /// Set by local logic through [`Indicator::drive`].
    Driven(bool),
}

/// Handle to an [`Indicator`] registered with a panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct IndicatorId(pub(crate) usize);

impl IndicatorId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// A single lightable fault or status light.
#[derive(Debug, Clone)]
pub struct Indicator {
    label: Label,
    activation: Activation,
    lamp: Lamp,
    active: bool,
    lit: bool,
    last_value: Option<f64>,
}

impl Indicator {
    pub fn new(label: &str, activation: Activation) -> Self {
        Self {
            label: make_label(label),
            activation,
            lamp: Lamp::new(true),
            active: false,
            lit: false,
            last_value: None,
        }
    }

    /// Range-bound indicator on `source`, active inside `[low, high]`.
    pub fn ranged(label: &str, source: SourceId, low: f64, high: f64) -> PanelResult<Self> {
        let range = Range::new(low, high).ok_or_else(|| PanelError::InvalidRange {
            label: label.into(),
            low,
            high,
        })?;
        if low > high {
            debug!(label, low, high, "indicator range reversed, swapping bounds");
        }

        Ok(Self::new(
            label,
            Activation::Range {
                source,
                range,
                invert: false,
            },
        ))
    }

    pub fn driven(label: &str, initial: bool) -> Self {
        Self::new(label, Activation::Driven(initial))
    }

    /// Reverse the range test so the indicator is active outside the range.
    /// No effect on driven indicators.
    pub fn inverted(mut self) -> Self {
        if let Activation::Range { invert, .. } = &mut self.activation {
            *invert = true;
        }
        self
    }

    pub fn with_test(mut self, allow: bool) -> Self {
        self.lamp.allow_test = allow;
        self
    }

    pub fn with_flash(mut self, allow: bool) -> Self {
        self.lamp.allow_flash = allow;
        self
    }

    pub fn with_power(mut self, power: PowerSourceId) -> Self {
        self.lamp.power = Some(power);
        self
    }

    pub fn with_output(mut self, channel: ChannelId) -> Self {
        self.lamp.output = Some(channel);
        self
    }

    /// Read the bound value (if any) and recompute `active` and `lit`.
    pub fn update<S>(&mut self, source: &mut S, filters: &LightFilters) -> (bool, bool)
    where
        S: ValueSource + ?Sized,
    {
        match self.activation {
            Activation::Range { source: id, .. } => {
                let value = source.read_value(id);
                self.update_with_value(value, filters)
            }
            Activation::Driven(on) => {
                self.active = on;
                self.lit = self.lamp.light(on, filters);
                (self.active, self.lit)
            }
        }
    }

    /// Recompute from an already-read value. Driven indicators ignore it.
    pub fn update_with_value(&mut self, now_value: f64, filters: &LightFilters) -> (bool, bool) {
        self.active = match self.activation {
            Activation::Range { range, invert, .. } => {
                self.last_value = Some(now_value);
                range.contains(now_value) != invert
            }
            Activation::Driven(on) => on,
        };
        self.lit = self.lamp.light(self.active, filters);
        (self.active, self.lit)
    }

    /// Set a driven indicator's activation for the next update.
    /// Returns `false` if this indicator is range-bound.
    pub fn drive(&mut self, on: bool) -> bool {
        match &mut self.activation {
            Activation::Driven(state) => {
                *state = on;
                true
            }
            Activation::Range { .. } => false,
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn is_lit(&self) -> bool {
        self.lit
    }

    pub fn enable_test(&mut self, allow: bool) {
        self.lamp.allow_test = allow;
    }

    pub fn enable_flash(&mut self, allow: bool) {
        self.lamp.allow_flash = allow;
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn activation(&self) -> &Activation {
        &self.activation
    }

    pub fn lamp(&self) -> &Lamp {
        &self.lamp
    }

    /// Value seen on the last update, for debugging displays.
    pub fn last_value(&self) -> Option<f64> {
        self.last_value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::MapSource;

    fn running() -> LightFilters {
        let mut filters = LightFilters::new();
        filters.set_environment_active(true);
        filters
    }

    #[test]
    fn test_range_bounds_inclusive() {
        let filters = running();
        let mut ind = Indicator::ranged("BLEED TRIP", SourceId(1), 10.0, 20.0).unwrap();

        assert_eq!(ind.update_with_value(10.0, &filters), (true, true));
        assert_eq!(ind.update_with_value(20.0, &filters), (true, true));
        assert_eq!(ind.update_with_value(15.0, &filters), (true, true));
        assert_eq!(ind.update_with_value(9.999, &filters), (false, false));
        assert_eq!(ind.update_with_value(25.0, &filters), (false, false));
    }

    #[test]
    fn test_inverted_range() {
        let filters = running();
        let mut ind = Indicator::ranged("BLEED TRIP", SourceId(1), 10.0, 20.0)
            .unwrap()
            .inverted();

        assert!(!ind.update_with_value(15.0, &filters).0);
        assert!(ind.update_with_value(25.0, &filters).0);
        assert!(!ind.update_with_value(10.0, &filters).0);
    }

    #[test]
    fn test_reversed_bounds_are_swapped() {
        let ind = Indicator::ranged("TRIM", SourceId(2), 0.15, 0.10).unwrap();
        match ind.activation() {
            Activation::Range { range, .. } => {
                assert_eq!(range.low(), 0.10);
                assert_eq!(range.high(), 0.15);
            }
            Activation::Driven(_) => panic!("expected range activation"),
        }
    }

    #[test]
    fn test_nan_bound_rejected() {
        let result = Indicator::ranged("BAD", SourceId(3), f64::NAN, 1.0);
        assert!(matches!(result, Err(PanelError::InvalidRange { .. })));
    }

    #[test]
    fn test_nan_value_never_in_range() {
        let filters = running();
        let mut plain = Indicator::ranged("A", SourceId(0), 0.0, 1.0).unwrap();
        let mut inverse = Indicator::ranged("B", SourceId(0), 0.0, 1.0).unwrap().inverted();

        assert!(!plain.update_with_value(f64::NAN, &filters).0);
        assert!(inverse.update_with_value(f64::NAN, &filters).0);
    }

    #[test]
    fn test_update_reads_source_once() {
        let filters = running();
        let mut source = MapSource::new();
        source.set(SourceId(5), 12.0);

        let mut ind = Indicator::ranged("OIL PRESS", SourceId(5), 10.0, 20.0).unwrap();
        assert_eq!(ind.update(&mut source, &filters), (true, true));
        assert_eq!(source.read_count(), 1);
        assert_eq!(ind.last_value(), Some(12.0));
    }

    #[test]
    fn test_driven_indicator() {
        let filters = running();
        let mut source = MapSource::new();
        let mut ind = Indicator::driven("AUTO FAIL", false);

        assert_eq!(ind.update(&mut source, &filters), (false, false));
        assert!(ind.drive(true));
        assert_eq!(ind.update(&mut source, &filters), (true, true));
        assert_eq!(source.read_count(), 0);

        let mut ranged = Indicator::ranged("X", SourceId(0), 0.0, 1.0).unwrap();
        assert!(!ranged.drive(true));
    }

    #[test]
    fn test_filters_applied_to_lit_only() {
        let mut filters = running();
        let mut ind = Indicator::ranged("FIRE", SourceId(0), 0.0, 1.0)
            .unwrap()
            .with_flash(true);

        filters.set_flash(false);
        assert_eq!(ind.update_with_value(0.5, &filters), (true, false));

        filters.set_flash(true);
        filters.set_bulb_test(true);
        assert_eq!(ind.update_with_value(5.0, &filters), (false, true));

        ind.enable_test(false);
        assert_eq!(ind.update_with_value(5.0, &filters), (false, false));

        filters.set_environment_active(false);
        assert_eq!(ind.update_with_value(0.5, &filters), (true, false));
    }

    #[test]
    fn test_default_range_matches_integer_defaults() {
        let range = Range::default();
        assert!(!range.contains(0.0));
        assert!(range.contains(1.0));
        assert!(range.contains(32000.0));
        assert!(!range.contains(32001.0));
    }
}
