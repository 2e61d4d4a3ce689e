//! Shared lighting filters: bulb test, flasher, environment and power.
//!
//! Every lightable element turns its `active` signal into a `lit` signal by
//! running it through [`Lamp::light`]. The process-wide flags live in one
//! [`LightFilters`] value owned by the panel and handed to each update by
//! reference, so there is exactly one place they can change.

use crate::error::{ElementKind, PanelError, PanelResult};
use crate::ports::{make_label, ChannelId, Label};
use heapless::Vec;
use serde::{Deserialize, Serialize};

pub const MAX_POWER_SOURCES: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PowerSourceId(pub(crate) u8);

impl PowerSourceId {
    pub fn index(self) -> usize {
        usize::from(self.0)
    }
}

#[derive(Debug, Clone)]
struct PowerSource {
    label: Label,
    powered: bool,
}

/// Named simulated power supplies. A freshly added source is powered.
#[derive(Debug, Clone, Default)]
pub struct PowerBus {
    sources: Vec<PowerSource, MAX_POWER_SOURCES>,
}

impl PowerBus {
    pub fn new() -> Self {
        Self { sources: Vec::new() }
    }

    pub fn add(&mut self, label: &str) -> PanelResult<PowerSourceId> {
        let id = PowerSourceId(self.sources.len() as u8);
        self.sources
            .push(PowerSource { label: make_label(label), powered: true })
            .map_err(|_| PanelError::ConfigurationOverflow {
                element: ElementKind::PowerSource,
                label: label.into(),
                given: MAX_POWER_SOURCES + 1,
                capacity: MAX_POWER_SOURCES,
            })?;
        Ok(id)
    }

    pub fn set_powered(&mut self, id: PowerSourceId, powered: bool) -> PanelResult<()> {
        let source = self
            .sources
            .get_mut(id.index())
            .ok_or(PanelError::UnknownPowerSource(id.0))?;
        source.powered = powered;
        Ok(())
    }

    /// Unknown ids read as unpowered.
    pub fn is_powered(&self, id: PowerSourceId) -> bool {
        self.sources.get(id.index()).is_some_and(|s| s.powered)
    }

    pub fn contains(&self, id: PowerSourceId) -> bool {
        id.index() < self.sources.len()
    }

    pub fn find(&self, label: &str) -> Option<PowerSourceId> {
        self.sources
            .iter()
            .position(|s| s.label.as_str() == label)
            .map(|i| PowerSourceId(i as u8))
    }

    pub fn label(&self, id: PowerSourceId) -> Option<&str> {
        self.sources.get(id.index()).map(|s| s.label.as_str())
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

/// Process-wide filter state for one panel.
#[derive(Debug, Clone)]
pub struct LightFilters {
    bulb_test: bool,
    flash_on: bool,
    environment_active: bool,
    power: PowerBus,
}

impl LightFilters {
    pub fn new() -> Self {
        Self {
            bulb_test: false,
            // Flash-enabled lamps stay steady if nothing drives the flasher
            flash_on: true,
            environment_active: false,
            power: PowerBus::new(),
        }
    }

    pub fn bulb_test(&self) -> bool {
        self.bulb_test
    }

    pub fn set_bulb_test(&mut self, on: bool) {
        self.bulb_test = on;
    }

    pub fn flash_on(&self) -> bool {
        self.flash_on
    }

    pub fn set_flash(&mut self, on: bool) {
        self.flash_on = on;
    }

    pub fn environment_active(&self) -> bool {
        self.environment_active
    }

    pub fn set_environment_active(&mut self, active: bool) {
        self.environment_active = active;
    }

    pub fn power(&self) -> &PowerBus {
        &self.power
    }

    pub fn power_mut(&mut self) -> &mut PowerBus {
        &mut self.power
    }
}

impl Default for LightFilters {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-element lighting participation and wiring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lamp {
    pub allow_test: bool,
    pub allow_flash: bool,
    /// `None` disables the power check for this element.
    pub power: Option<PowerSourceId>,
    pub output: Option<ChannelId>,
}

impl Lamp {
    pub fn new(allow_test: bool) -> Self {
        Self {
            allow_test,
            allow_flash: false,
            power: None,
            output: None,
        }
    }

    /// Apply the filter pipeline to `active`. Order matters: test forces
    /// on, flash forces off, then the power gate always wins.
    pub fn light(&self, active: bool, filters: &LightFilters) -> bool {
        let mut lit = active;

        if self.allow_test && filters.bulb_test() {
            lit = true;
        }

        if self.allow_flash && !filters.flash_on() {
            lit = false;
        }

        if !self.is_powered(filters) {
            lit = false;
        }

        lit
    }

    /// The power gate: environment running and, if checked, power available.
    pub fn is_powered(&self, filters: &LightFilters) -> bool {
        filters.environment_active()
            && self.power.map_or(true, |id| filters.power().is_powered(id))
    }
}

impl Default for Lamp {
    fn default() -> Self {
        Self::new(true)
    }
}

/// Square-wave flash timer. The flash phase is derived from the cycle
/// clock: on for the first half of each period, off for the second.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Flasher {
    period_ms: u32,
}

impl Flasher {
    pub fn new(period_ms: u32) -> Self {
        Self { period_ms }
    }

    pub fn period_ms(&self) -> u32 {
        self.period_ms
    }

    /// Flash phase at `now_ms`. A zero period never flashes.
    pub fn phase_at(&self, now_ms: u64) -> bool {
        if self.period_ms == 0 {
            return true;
        }
        let half = (u64::from(self.period_ms) / 2).max(1);
        (now_ms / half) % 2 == 0
    }
}

impl Default for Flasher {
    fn default() -> Self {
        Self::new(500)
    }
}
