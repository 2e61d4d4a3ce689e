use crate::error::{ElementKind, PanelError, PanelResult};
use crate::filters::{Lamp, LightFilters, PowerSourceId};
use crate::indicator::{Indicator, IndicatorId};
use crate::ports::{make_label, ChannelId, Label};
use heapless::Vec;
use serde::{Deserialize, Serialize};
use static_assertions::const_assert;
use tracing::{debug, info};

pub const MAX_INDICATORS_PER_ANNUNCIATOR: usize = 12;

const_assert!(MAX_INDICATORS_PER_ANNUNCIATOR > 0);

/// Handle to a [`SystemAnnunciator`] registered with a panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AnnunciatorId(pub(crate) usize);

impl AnnunciatorId {
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AnnunciatorState {
    Idle,
    Latched,
    Recalled,
}

/// Per-system annunciator (e.g. FUEL, HYD, ELEC) fed by a fixed list of
/// indicators.
///
/// `active` is a sticky latch, set when a child becomes active while its
/// acknowledgment bit is clear. Each child's bit is set when it triggers the
/// latch and cleared whenever the child is seen inactive, so only a new or
/// reappearing fault can latch again after [`SystemAnnunciator::reset`].
/// `has_active` is the plain OR of the children and ignores acknowledgment.
#[derive(Debug, Clone)]
pub struct SystemAnnunciator {
    label: Label,
    children: Vec<IndicatorId, MAX_INDICATORS_PER_ANNUNCIATOR>,
    acknowledged: Vec<bool, MAX_INDICATORS_PER_ANNUNCIATOR>,
    active: bool,
    has_active: bool,
    recall_mode: bool,
    lit: bool,
    lamp: Lamp,
}

impl SystemAnnunciator {
    /// Fails with `ConfigurationOverflow` if `children` exceeds
    /// [`MAX_INDICATORS_PER_ANNUNCIATOR`].
    pub fn new(label: &str, children: &[IndicatorId]) -> PanelResult<Self> {
        let overflow = || PanelError::ConfigurationOverflow {
            element: ElementKind::SystemAnnunciator,
            label: label.into(),
            given: children.len(),
            capacity: MAX_INDICATORS_PER_ANNUNCIATOR,
        };
        let list = Vec::from_slice(children).map_err(|()| overflow())?;
        let mut acknowledged = Vec::new();
        acknowledged.resize(list.len(), false).map_err(|()| overflow())?;

        Ok(Self {
            label: make_label(label),
            children: list,
            acknowledged,
            active: false,
            has_active: false,
            recall_mode: false,
            lit: false,
            // Bulb test for system annunciators comes from recall
            lamp: Lamp::new(false),
        })
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

    /// Recompute from the current indicator tier. `indicators` must already
    /// be updated for this cycle.
    pub fn update(&mut self, indicators: &[Indicator], filters: &LightFilters) -> bool {
        let mut has_active = false;

        for (index, child) in self.children.iter().enumerate() {
            let child_active = indicators
                .get(child.index())
                .is_some_and(Indicator::is_active);

            if self.recall_mode {
                has_active |= child_active;
                continue;
            }

            if child_active {
                has_active = true;
                if !self.acknowledged[index] {
                    if !self.active {
                        debug!(annunciator = self.label.as_str(), child = index, "latched");
                    }
                    self.active = true;
                    self.acknowledged[index] = true;
                }
            } else {
                self.acknowledged[index] = false;
            }
        }

        if self.recall_mode {
            self.active = true;
        }

        self.has_active = has_active;
        self.lit = self.lamp.light(self.active, filters);
        self.active
    }

    /// Clear the latch. Acknowledgment bits are left alone. Has no effect
    /// in recall mode, where `active` stays forced on.
    pub fn reset(&mut self) {
        if self.recall_mode {
            return;
        }
        if self.active {
            info!(annunciator = self.label.as_str(), "reset");
        }
        self.active = false;
    }

    /// Enter or leave recall mode. Entering forces `active` on from the next
    /// update; leaving clears every acknowledgment and the latch.
    pub fn set_recall(&mut self, mode: bool) {
        if mode && !self.recall_mode {
            self.recall_mode = true;
            self.active = true;
        }

        if !mode && self.recall_mode {
            for ack in &mut self.acknowledged {
                *ack = false;
            }
            self.recall_mode = false;
            self.active = false;
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn has_active(&self) -> bool {
        self.has_active
    }

    pub fn is_lit(&self) -> bool {
        self.lit
    }

    pub fn is_recalled(&self) -> bool {
        self.recall_mode
    }

    pub fn state(&self) -> AnnunciatorState {
        if self.recall_mode {
            AnnunciatorState::Recalled
        } else if self.active {
            AnnunciatorState::Latched
        } else {
            AnnunciatorState::Idle
        }
    }

    pub fn enable_test(&mut self, allow: bool) {
        self.lamp.allow_test = allow;
    }

    pub fn enable_flash(&mut self, allow: bool) {
        self.lamp.allow_flash = allow;
    }

    pub fn is_acknowledged(&self, index: usize) -> bool {
        self.acknowledged.get(index).copied().unwrap_or(false)
    }

    pub fn acknowledgments(&self) -> &[bool] {
        &self.acknowledged
    }

    pub fn children(&self) -> &[IndicatorId] {
        &self.children
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn lamp(&self) -> &Lamp {
        &self.lamp
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::SourceId;

    struct Rig {
        filters: LightFilters,
        indicators: std::vec::Vec<Indicator>,
    }

    impl Rig {
        fn new(count: usize) -> Self {
            let mut filters = LightFilters::new();
            filters.set_environment_active(true);
            let indicators = (0..count)
                .map(|i| Indicator::driven(&format!("IND {i}"), false))
                .collect();
            Self { filters, indicators }
        }

        fn set(&mut self, index: usize, on: bool) {
            self.indicators[index].drive(on);
            self.indicators[index].update_with_value(0.0, &self.filters);
        }

        fn ids(&self) -> std::vec::Vec<IndicatorId> {
            (0..self.indicators.len()).map(IndicatorId).collect()
        }
    }

    #[test]
    fn test_overflow_rejected() {
        let ids: std::vec::Vec<_> = (0..=MAX_INDICATORS_PER_ANNUNCIATOR).map(IndicatorId).collect();
        match SystemAnnunciator::new("FUEL", &ids) {
            Err(PanelError::ConfigurationOverflow { given, capacity, .. }) => {
                assert_eq!(given, MAX_INDICATORS_PER_ANNUNCIATOR + 1);
                assert_eq!(capacity, MAX_INDICATORS_PER_ANNUNCIATOR);
            }
            other => panic!("expected overflow, got {other:?}"),
        }

        let ids: std::vec::Vec<_> = (0..MAX_INDICATORS_PER_ANNUNCIATOR).map(IndicatorId).collect();
        assert!(SystemAnnunciator::new("FUEL", &ids).is_ok());
    }

    #[test]
    fn test_latch_sets_and_acknowledges() {
        let mut rig = Rig::new(2);
        let mut sa = SystemAnnunciator::new("HYD", &rig.ids()).unwrap();

        sa.update(&rig.indicators, &rig.filters);
        assert_eq!(sa.state(), AnnunciatorState::Idle);
        assert!(!sa.has_active());

        rig.set(0, true);
        sa.update(&rig.indicators, &rig.filters);
        assert!(sa.is_active());
        assert!(sa.has_active());
        assert!(sa.is_lit());
        assert!(sa.is_acknowledged(0));
        assert!(!sa.is_acknowledged(1));
    }

    #[test]
    fn test_latch_survives_while_child_stays_active() {
        let mut rig = Rig::new(1);
        let mut sa = SystemAnnunciator::new("HYD", &rig.ids()).unwrap();
        rig.set(0, true);

        for _ in 0..5 {
            sa.update(&rig.indicators, &rig.filters);
            assert!(sa.is_active());
            assert!(sa.is_acknowledged(0));
        }
    }

    #[test]
    fn test_latch_sticky_after_child_clears() {
        let mut rig = Rig::new(1);
        let mut sa = SystemAnnunciator::new("HYD", &rig.ids()).unwrap();

        rig.set(0, true);
        sa.update(&rig.indicators, &rig.filters);
        rig.set(0, false);
        sa.update(&rig.indicators, &rig.filters);

        assert!(sa.is_active());
        assert!(!sa.has_active());
        assert!(!sa.is_acknowledged(0));
    }

    #[test]
    fn test_reset_does_not_relatch_acknowledged_fault() {
        let mut rig = Rig::new(2);
        let mut sa = SystemAnnunciator::new("ELEC", &rig.ids()).unwrap();

        rig.set(0, true);
        sa.update(&rig.indicators, &rig.filters);
        sa.reset();
        assert!(!sa.is_active());
        assert!(sa.has_active());

        sa.update(&rig.indicators, &rig.filters);
        assert!(!sa.is_active());
        assert!(sa.has_active());
        assert!(!sa.is_lit());
    }

    #[test]
    fn test_second_fault_relatches_after_reset() {
        let mut rig = Rig::new(2);
        let mut sa = SystemAnnunciator::new("ELEC", &rig.ids()).unwrap();

        rig.set(0, true);
        sa.update(&rig.indicators, &rig.filters);
        sa.reset();

        rig.set(1, true);
        sa.update(&rig.indicators, &rig.filters);
        assert!(sa.is_active());
    }

    #[test]
    fn test_rearm_after_child_cycles() {
        let mut rig = Rig::new(1);
        let mut sa = SystemAnnunciator::new("ELEC", &rig.ids()).unwrap();

        rig.set(0, true);
        sa.update(&rig.indicators, &rig.filters);
        sa.reset();

        rig.set(0, false);
        sa.update(&rig.indicators, &rig.filters);
        assert!(!sa.is_active());

        rig.set(0, true);
        sa.update(&rig.indicators, &rig.filters);
        assert!(sa.is_active());
    }

    #[test]
    fn test_recall_forces_active_and_exit_clears_acks() {
        let mut rig = Rig::new(2);
        let mut sa = SystemAnnunciator::new("FUEL", &rig.ids()).unwrap();

        sa.set_recall(true);
        assert!(sa.is_active());
        assert_eq!(sa.state(), AnnunciatorState::Recalled);

        sa.update(&rig.indicators, &rig.filters);
        assert!(sa.is_active());
        assert!(sa.is_lit());

        rig.set(0, true);
        sa.update(&rig.indicators, &rig.filters);
        // Acknowledgments untouched during recall
        assert!(!sa.is_acknowledged(0));
        assert!(sa.has_active());

        // Reset does not override recall
        sa.reset();
        sa.update(&rig.indicators, &rig.filters);
        assert!(sa.is_active());

        sa.set_recall(false);
        assert!(!sa.is_active());
        assert_eq!(sa.state(), AnnunciatorState::Idle);

        // Child still active and unacknowledged so it latches again
        sa.update(&rig.indicators, &rig.filters);
        assert!(sa.is_active());
    }

    #[test]
    fn test_recall_exit_clears_existing_acks() {
        let mut rig = Rig::new(1);
        let mut sa = SystemAnnunciator::new("FUEL", &rig.ids()).unwrap();

        rig.set(0, true);
        sa.update(&rig.indicators, &rig.filters);
        sa.reset();
        assert!(sa.is_acknowledged(0));

        sa.set_recall(true);
        sa.set_recall(false);
        assert_eq!(sa.acknowledgments(), &[false]);

        sa.update(&rig.indicators, &rig.filters);
        assert!(sa.is_active());
    }

    #[test]
    fn test_set_recall_is_idempotent() {
        let rig = Rig::new(1);
        let mut sa = SystemAnnunciator::new("FUEL", &rig.ids()).unwrap();

        sa.set_recall(false);
        assert_eq!(sa.state(), AnnunciatorState::Idle);

        sa.set_recall(true);
        sa.set_recall(true);
        assert!(sa.is_recalled());
    }

    #[test]
    fn test_duplicate_children_have_separate_acks() {
        let mut rig = Rig::new(1);
        let mut sa = SystemAnnunciator::new("DUP", &[IndicatorId(0), IndicatorId(0)]).unwrap();

        rig.set(0, true);
        sa.update(&rig.indicators, &rig.filters);
        assert_eq!(sa.acknowledgments(), &[true, true]);
    }

    #[test]
    fn test_lit_follows_latch_through_filters() {
        let mut rig = Rig::new(1);
        let bus = rig.filters.power_mut().add("DC BUS 2").unwrap();
        let mut sa = SystemAnnunciator::new("ELEC", &rig.ids()).unwrap().with_power(bus);

        rig.set(0, true);
        sa.update(&rig.indicators, &rig.filters);
        assert!(sa.is_lit());

        rig.filters.power_mut().set_powered(bus, false).unwrap();
        sa.update(&rig.indicators, &rig.filters);
        assert!(sa.is_active());
        assert!(!sa.is_lit());
    }

    #[test]
    fn test_reset_during_recall_keeps_active() {
        let rig = Rig::new(1);
        let mut sa = SystemAnnunciator::new("FUEL", &rig.ids()).unwrap();

        sa.set_recall(true);
        sa.update(&rig.indicators, &rig.filters);
        sa.reset();

        assert_eq!(sa.state(), AnnunciatorState::Recalled);
        assert!(sa.is_active());
        assert!(sa.is_lit());
    }

    #[test]
    fn test_runtime_test_and_flash_participation() {
        let mut rig = Rig::new(1);
        let mut sa = SystemAnnunciator::new("HYD", &rig.ids()).unwrap();

        rig.filters.set_bulb_test(true);
        sa.update(&rig.indicators, &rig.filters);
        assert!(!sa.is_lit());

        sa.enable_test(true);
        sa.update(&rig.indicators, &rig.filters);
        assert!(sa.is_lit());
        assert!(!sa.is_active());

        rig.filters.set_flash(false);
        sa.enable_flash(true);
        sa.update(&rig.indicators, &rig.filters);
        assert!(!sa.is_lit());

        sa.enable_flash(false);
        sa.update(&rig.indicators, &rig.filters);
        assert!(sa.is_lit());
    }

    #[test]
    fn test_range_children() {
        let mut filters = LightFilters::new();
        filters.set_environment_active(true);
        let mut indicators = vec![Indicator::ranged("LOW PRESS", SourceId(0), 0.0, 10.0).unwrap()];
        let mut sa = SystemAnnunciator::new("HYD", &[IndicatorId(0)]).unwrap();

        indicators[0].update_with_value(50.0, &filters);
        sa.update(&indicators, &filters);
        assert!(!sa.is_active());

        indicators[0].update_with_value(5.0, &filters);
        sa.update(&indicators, &filters);
        assert!(sa.is_active());
    }
}
