//! The panel registry: owns every element in three ordered tiers and runs
//! the per-cycle update.
//!
//! Elements are added bottom-up. A system annunciator can only reference
//! indicators that already exist, and a master caution only annunciators, so
//! each tier depends solely on the tier below it. [`AnnunciatorPanel::update`]
//! walks the tiers in that order; no aggregate is ever read before the tier
//! it depends on has been updated in the same call.

use crate::annunciator::{AnnunciatorId, AnnunciatorState, SystemAnnunciator};
use crate::error::{ElementKind, PanelError, PanelResult};
use crate::filters::{Flasher, Lamp, LightFilters, PowerSourceId};
use crate::indicator::{Indicator, IndicatorId};
use crate::master_caution::{MasterCaution, MasterCautionId};
use crate::ports::{ChannelId, EnvironmentMonitor, OutputSink, ValueSource};
use heapless::{FnvIndexMap, Vec};
use serde::Serialize;
use tracing::{debug, info};

pub const MAX_INDICATORS: usize = 128;
pub const MAX_ANNUNCIATORS: usize = 32;
pub const MAX_MASTER_CAUTIONS: usize = 4;

// Must be a power of two for FnvIndexMap
const MAX_OUTPUT_CHANNELS: usize = 256;

#[derive(Debug)]
pub struct AnnunciatorPanel {
    indicators: Vec<Indicator, MAX_INDICATORS>,
    annunciators: Vec<SystemAnnunciator, MAX_ANNUNCIATORS>,
    master_cautions: Vec<MasterCaution, MAX_MASTER_CAUTIONS>,

    filters: LightFilters,
    flasher: Flasher,

    write_on_change: bool,
    last_written: FnvIndexMap<ChannelId, bool, MAX_OUTPUT_CHANNELS>,

    cycle_count: u64,
}

impl AnnunciatorPanel {
    pub fn new() -> Self {
        Self {
            indicators: Vec::new(),
            annunciators: Vec::new(),
            master_cautions: Vec::new(),
            filters: LightFilters::new(),
            flasher: Flasher::default(),
            write_on_change: false,
            last_written: FnvIndexMap::new(),
            cycle_count: 0,
        }
    }

    pub fn set_flash_period(&mut self, period_ms: u32) {
        self.flasher = Flasher::new(period_ms);
    }

    /// Only write an output when its level differs from the last write.
    pub fn set_write_on_change(&mut self, enabled: bool) {
        self.write_on_change = enabled;
        self.last_written.clear();
    }

    // --- Registration ---

    pub fn add_power_source(&mut self, label: &str) -> PanelResult<PowerSourceId> {
        self.filters.power_mut().add(label)
    }

    pub fn add_indicator(&mut self, indicator: Indicator) -> PanelResult<IndicatorId> {
        self.check_lamp(indicator.lamp())?;
        let id = IndicatorId(self.indicators.len());
        let label = indicator.label().to_owned();
        self.indicators
            .push(indicator)
            .map_err(|_| overflow(ElementKind::Indicator, label, MAX_INDICATORS))?;
        Ok(id)
    }

    pub fn add_system_annunciator(&mut self, annunciator: SystemAnnunciator) -> PanelResult<AnnunciatorId> {
        self.check_lamp(annunciator.lamp())?;
        if let Some(bad) = annunciator
            .children()
            .iter()
            .find(|child| child.index() >= self.indicators.len())
        {
            return Err(PanelError::UnknownIndicator(bad.index()));
        }

        let id = AnnunciatorId(self.annunciators.len());
        let label = annunciator.label().to_owned();
        self.annunciators
            .push(annunciator)
            .map_err(|_| overflow(ElementKind::SystemAnnunciator, label, MAX_ANNUNCIATORS))?;
        Ok(id)
    }

    pub fn add_master_caution(&mut self, master: MasterCaution) -> PanelResult<MasterCautionId> {
        self.check_lamp(master.lamp())?;
        if let Some(bad) = master
            .children()
            .iter()
            .find(|child| child.index() >= self.annunciators.len())
        {
            return Err(PanelError::UnknownAnnunciator(bad.index()));
        }

        let id = MasterCautionId(self.master_cautions.len());
        let label = master.label().to_owned();
        self.master_cautions
            .push(master)
            .map_err(|_| overflow(ElementKind::MasterCaution, label, MAX_MASTER_CAUTIONS))?;
        Ok(id)
    }

    fn check_lamp(&self, lamp: &Lamp) -> PanelResult<()> {
        match lamp.power {
            Some(id) if !self.filters.power().contains(id) => Err(PanelError::UnknownPowerSource(id.0)),
            _ => Ok(()),
        }
    }

    // --- Cycle ---

    /// Run one full update pass: indicators, then system annunciators, then
    /// master cautions, then outputs.
    pub fn update<S, O>(&mut self, source: &mut S, sink: &mut O)
    where
        S: ValueSource + ?Sized,
        O: OutputSink + ?Sized,
    {
        for indicator in &mut self.indicators {
            indicator.update(source, &self.filters);
        }

        for annunciator in &mut self.annunciators {
            annunciator.update(&self.indicators, &self.filters);
        }

        for master in &mut self.master_cautions {
            master.update(&self.annunciators, &self.filters);
        }

        self.write_outputs(sink);
        self.cycle_count = self.cycle_count.wrapping_add(1);
    }

    /// Sample the environment, advance the flasher to `now_ms`, then update.
    pub fn run_cycle<S, E, O>(&mut self, now_ms: u64, source: &mut S, environment: &E, sink: &mut O)
    where
        S: ValueSource + ?Sized,
        E: EnvironmentMonitor + ?Sized,
        O: OutputSink + ?Sized,
    {
        let running = environment.is_environment_active();
        if running != self.filters.environment_active() {
            info!(running, "environment state changed");
        }
        self.filters.set_environment_active(running);
        self.filters.set_flash(self.flasher.phase_at(now_ms));
        self.update(source, sink);
    }

    fn write_outputs<O>(&mut self, sink: &mut O)
    where
        O: OutputSink + ?Sized,
    {
        let indicators = self
            .indicators
            .iter()
            .map(|i| (i.lamp().output, i.is_lit()));
        let annunciators = self
            .annunciators
            .iter()
            .map(|a| (a.lamp().output, a.is_lit()));
        let masters = self
            .master_cautions
            .iter()
            .map(|m| (m.lamp().output, m.is_lit()));

        for (channel, lit) in indicators.chain(annunciators).chain(masters) {
            let Some(channel) = channel else { continue };

            if self.write_on_change {
                if self.last_written.get(&channel) == Some(&lit) {
                    continue;
                }
                if self.last_written.insert(channel, lit).is_err() {
                    debug!(channel = channel.0, "output cache full, writing unconditionally");
                }
            }
            sink.write_output(channel, lit);
        }
    }

    // --- Operator controls ---

    pub fn reset(&mut self, id: MasterCautionId) -> PanelResult<()> {
        let master = self
            .master_cautions
            .get_mut(id.index())
            .ok_or(PanelError::UnknownMasterCaution(id.index()))?;
        master.reset(&mut self.annunciators);
        Ok(())
    }

    pub fn set_recall(&mut self, id: MasterCautionId, mode: bool) -> PanelResult<()> {
        let master = self
            .master_cautions
            .get(id.index())
            .ok_or(PanelError::UnknownMasterCaution(id.index()))?;
        master.set_recall(&mut self.annunciators, mode);
        Ok(())
    }

    pub fn reset_all(&mut self) {
        for master in &mut self.master_cautions {
            master.reset(&mut self.annunciators);
        }
    }

    pub fn set_recall_all(&mut self, mode: bool) {
        for master in &self.master_cautions {
            master.set_recall(&mut self.annunciators, mode);
        }
    }

    pub fn reset_annunciator(&mut self, id: AnnunciatorId) -> PanelResult<()> {
        self.annunciator_mut(id)?.reset();
        Ok(())
    }

    pub fn set_annunciator_recall(&mut self, id: AnnunciatorId, mode: bool) -> PanelResult<()> {
        self.annunciator_mut(id)?.set_recall(mode);
        Ok(())
    }

    /// Set a driven indicator's activation. Returns `false` for range-bound
    /// indicators, which ignore it.
    pub fn drive(&mut self, id: IndicatorId, on: bool) -> PanelResult<bool> {
        Ok(self.indicator_mut(id)?.drive(on))
    }

    pub fn set_bulb_test(&mut self, on: bool) {
        if on != self.filters.bulb_test() {
            info!(on, "bulb test");
        }
        self.filters.set_bulb_test(on);
    }

    pub fn set_flash(&mut self, on: bool) {
        self.filters.set_flash(on);
    }

    pub fn set_environment_active(&mut self, active: bool) {
        self.filters.set_environment_active(active);
    }

    pub fn set_power(&mut self, id: PowerSourceId, powered: bool) -> PanelResult<()> {
        self.filters.power_mut().set_powered(id, powered)
    }

    // --- Lookup ---

    pub fn indicator(&self, id: IndicatorId) -> PanelResult<&Indicator> {
        self.indicators
            .get(id.index())
            .ok_or(PanelError::UnknownIndicator(id.index()))
    }

    pub fn indicator_mut(&mut self, id: IndicatorId) -> PanelResult<&mut Indicator> {
        self.indicators
            .get_mut(id.index())
            .ok_or(PanelError::UnknownIndicator(id.index()))
    }

    pub fn annunciator(&self, id: AnnunciatorId) -> PanelResult<&SystemAnnunciator> {
        self.annunciators
            .get(id.index())
            .ok_or(PanelError::UnknownAnnunciator(id.index()))
    }

    pub fn annunciator_mut(&mut self, id: AnnunciatorId) -> PanelResult<&mut SystemAnnunciator> {
        self.annunciators
            .get_mut(id.index())
            .ok_or(PanelError::UnknownAnnunciator(id.index()))
    }

    pub fn master_caution(&self, id: MasterCautionId) -> PanelResult<&MasterCaution> {
        self.master_cautions
            .get(id.index())
            .ok_or(PanelError::UnknownMasterCaution(id.index()))
    }

    pub fn master_caution_mut(&mut self, id: MasterCautionId) -> PanelResult<&mut MasterCaution> {
        self.master_cautions
            .get_mut(id.index())
            .ok_or(PanelError::UnknownMasterCaution(id.index()))
    }

    pub fn find_indicator(&self, label: &str) -> Option<IndicatorId> {
        self.indicators
            .iter()
            .position(|i| i.label() == label)
            .map(IndicatorId)
    }

    pub fn find_annunciator(&self, label: &str) -> Option<AnnunciatorId> {
        self.annunciators
            .iter()
            .position(|a| a.label() == label)
            .map(AnnunciatorId)
    }

    pub fn find_master_caution(&self, label: &str) -> Option<MasterCautionId> {
        self.master_cautions
            .iter()
            .position(|m| m.label() == label)
            .map(MasterCautionId)
    }

    pub fn find_power_source(&self, label: &str) -> Option<PowerSourceId> {
        self.filters.power().find(label)
    }

    pub fn indicators(&self) -> &[Indicator] {
        &self.indicators
    }

    pub fn annunciators(&self) -> &[SystemAnnunciator] {
        &self.annunciators
    }

    pub fn master_cautions(&self) -> &[MasterCaution] {
        &self.master_cautions
    }

    pub fn filters(&self) -> &LightFilters {
        &self.filters
    }

    pub fn cycle_count(&self) -> u64 {
        self.cycle_count
    }

    pub fn snapshot(&self) -> PanelSnapshot {
        PanelSnapshot {
            cycle: self.cycle_count,
            bulb_test: self.filters.bulb_test(),
            flash_on: self.filters.flash_on(),
            environment_active: self.filters.environment_active(),
            indicators: self
                .indicators
                .iter()
                .map(|i| IndicatorSnapshot {
                    label: i.label().to_owned(),
                    value: i.last_value(),
                    active: i.is_active(),
                    lit: i.is_lit(),
                })
                .collect(),
            annunciators: self
                .annunciators
                .iter()
                .map(|a| AnnunciatorSnapshot {
                    label: a.label().to_owned(),
                    state: a.state(),
                    has_active: a.has_active(),
                    lit: a.is_lit(),
                })
                .collect(),
            master_cautions: self
                .master_cautions
                .iter()
                .map(|m| MasterCautionSnapshot {
                    label: m.label().to_owned(),
                    active: m.is_active(),
                    lit: m.is_lit(),
                })
                .collect(),
        }
    }
}

impl Default for AnnunciatorPanel {
    fn default() -> Self {
        Self::new()
    }
}

fn overflow(element: ElementKind, label: String, capacity: usize) -> PanelError {
    PanelError::ConfigurationOverflow {
        element,
        label,
        given: capacity + 1,
        capacity,
    }
}

/// Point-in-time view of the whole panel for debugging displays.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PanelSnapshot {
    pub cycle: u64,
    pub bulb_test: bool,
    pub flash_on: bool,
    pub environment_active: bool,
    pub indicators: std::vec::Vec<IndicatorSnapshot>,
    pub annunciators: std::vec::Vec<AnnunciatorSnapshot>,
    pub master_cautions: std::vec::Vec<MasterCautionSnapshot>,
}

impl PanelSnapshot {
    /// True if any lamp differs between the two snapshots.
    pub fn lamps_differ(&self, other: &PanelSnapshot) -> bool {
        let lamps = |s: &PanelSnapshot| -> std::vec::Vec<bool> {
            s.indicators
                .iter()
                .map(|i| i.lit)
                .chain(s.annunciators.iter().map(|a| a.lit))
                .chain(s.master_cautions.iter().map(|m| m.lit))
                .collect()
        };
        lamps(self) != lamps(other)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndicatorSnapshot {
    pub label: String,
    pub value: Option<f64>,
    pub active: bool,
    pub lit: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnnunciatorSnapshot {
    pub label: String,
    pub state: AnnunciatorState,
    pub has_active: bool,
    pub lit: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MasterCautionSnapshot {
    pub label: String,
    pub active: bool,
    pub lit: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::{MapSource, NullSink, RecordingSink, SourceId};

    fn small_panel() -> (AnnunciatorPanel, IndicatorId, AnnunciatorId, MasterCautionId) {
        let mut panel = AnnunciatorPanel::new();
        panel.set_environment_active(true);
        let ind = panel
            .add_indicator(Indicator::ranged("LOW PRESS", SourceId(1), 0.0, 10.0).unwrap())
            .unwrap();
        let sa = panel
            .add_system_annunciator(SystemAnnunciator::new("HYD", &[ind]).unwrap())
            .unwrap();
        let mc = panel
            .add_master_caution(MasterCaution::new("MASTER CAUTION", &[sa]).unwrap())
            .unwrap();
        (panel, ind, sa, mc)
    }

    #[test]
    fn test_fault_reaches_master_in_one_cycle() {
        let (mut panel, ind, sa, mc) = small_panel();
        let mut source = MapSource::new();
        source.set(SourceId(1), 50.0);
        panel.update(&mut source, &mut NullSink);
        assert!(!panel.master_caution(mc).unwrap().is_active());

        source.set(SourceId(1), 3.0);
        panel.update(&mut source, &mut NullSink);
        assert!(panel.indicator(ind).unwrap().is_active());
        assert!(panel.annunciator(sa).unwrap().is_active());
        assert!(panel.master_caution(mc).unwrap().is_active());
        assert_eq!(panel.cycle_count(), 2);
    }

    #[test]
    fn test_each_source_read_once_per_cycle() {
        let (mut panel, _, _, _) = small_panel();
        let mut source = MapSource::new();
        panel.update(&mut source, &mut NullSink);
        panel.update(&mut source, &mut NullSink);
        assert_eq!(source.read_count(), 2);
    }

    #[test]
    fn test_unknown_children_rejected() {
        let mut panel = AnnunciatorPanel::new();
        let sa = SystemAnnunciator::new("HYD", &[IndicatorId(0)]).unwrap();
        assert_eq!(panel.add_system_annunciator(sa).unwrap_err(), PanelError::UnknownIndicator(0));

        let mc = MasterCaution::new("MC", &[AnnunciatorId(3)]).unwrap();
        assert_eq!(panel.add_master_caution(mc).unwrap_err(), PanelError::UnknownAnnunciator(3));

        let ind = Indicator::driven("X", false).with_power(PowerSourceId(0));
        assert_eq!(panel.add_indicator(ind).unwrap_err(), PanelError::UnknownPowerSource(0));
    }

    #[test]
    fn test_registry_capacity() {
        let mut panel = AnnunciatorPanel::new();
        for i in 0..MAX_INDICATORS {
            panel.add_indicator(Indicator::driven(&format!("I{i}"), false)).unwrap();
        }
        let result = panel.add_indicator(Indicator::driven("EXTRA", false));
        assert!(matches!(
            result,
            Err(PanelError::ConfigurationOverflow { element: ElementKind::Indicator, .. })
        ));

        for i in 0..MAX_ANNUNCIATORS {
            panel
                .add_system_annunciator(SystemAnnunciator::new(&format!("SA{i}"), &[IndicatorId(i)]).unwrap())
                .unwrap();
        }
        let result = panel.add_system_annunciator(SystemAnnunciator::new("EXTRA", &[]).unwrap());
        assert!(matches!(
            result,
            Err(PanelError::ConfigurationOverflow {
                element: ElementKind::SystemAnnunciator,
                capacity: MAX_ANNUNCIATORS,
                ..
            })
        ));

        for i in 0..MAX_MASTER_CAUTIONS {
            panel
                .add_master_caution(MasterCaution::new(&format!("MC{i}"), &[AnnunciatorId(i)]).unwrap())
                .unwrap();
        }
        let result = panel.add_master_caution(MasterCaution::new("EXTRA", &[]).unwrap());
        assert!(matches!(
            result,
            Err(PanelError::ConfigurationOverflow {
                element: ElementKind::MasterCaution,
                capacity: MAX_MASTER_CAUTIONS,
                ..
            })
        ));
        assert_eq!(panel.annunciators().len(), MAX_ANNUNCIATORS);
        assert_eq!(panel.master_cautions().len(), MAX_MASTER_CAUTIONS);
    }

    #[test]
    fn test_write_on_change_suppresses_repeats() {
        let mut panel = AnnunciatorPanel::new();
        panel.set_environment_active(true);
        panel.set_write_on_change(true);
        let ind = panel
            .add_indicator(Indicator::driven("ANTISKID", false).with_output(ChannelId(7)))
            .unwrap();

        let mut sink = RecordingSink::new();
        let mut source = MapSource::new();
        panel.update(&mut source, &mut sink);
        panel.update(&mut source, &mut sink);
        assert_eq!(sink.writes(), &[(ChannelId(7), false)]);

        panel.drive(ind, true).unwrap();
        panel.update(&mut source, &mut sink);
        assert_eq!(sink.writes().len(), 2);
        assert_eq!(sink.level(ChannelId(7)), Some(true));
    }

    #[test]
    fn test_run_cycle_drives_flasher_and_environment() {
        let mut panel = AnnunciatorPanel::new();
        panel.set_flash_period(1000);
        let ind = panel
            .add_indicator(Indicator::driven("FIRE", true).with_flash(true).with_test(false))
            .unwrap();
        let mut source = MapSource::new();

        panel.run_cycle(0, &mut source, &true, &mut NullSink);
        assert!(panel.indicator(ind).unwrap().is_lit());

        panel.run_cycle(600, &mut source, &true, &mut NullSink);
        assert!(panel.indicator(ind).unwrap().is_active());
        assert!(!panel.indicator(ind).unwrap().is_lit());

        panel.run_cycle(1000, &mut source, &false, &mut NullSink);
        assert!(!panel.indicator(ind).unwrap().is_lit());
        assert!(!panel.filters().environment_active());
    }

    #[test]
    fn test_snapshot_reflects_state() {
        let (mut panel, _, _, mc) = small_panel();
        let mut source = MapSource::new();
        source.set(SourceId(1), 5.0);
        panel.update(&mut source, &mut NullSink);

        let before = panel.snapshot();
        assert_eq!(before.indicators[0].value, Some(5.0));
        assert_eq!(before.annunciators[0].state, AnnunciatorState::Latched);
        assert!(before.master_cautions[0].lit);

        panel.reset(mc).unwrap();
        source.set(SourceId(1), 50.0);
        panel.update(&mut source, &mut NullSink);
        let after = panel.snapshot();
        assert!(after.lamps_differ(&before));
        assert!(!after.lamps_differ(&after.clone()));
    }

    #[test]
    fn test_unknown_master_caution_controls() {
        let (mut panel, _, _, _) = small_panel();
        assert!(panel.reset(MasterCautionId(9)).is_err());
        assert!(panel.set_recall(MasterCautionId(9), true).is_err());
    }
}
