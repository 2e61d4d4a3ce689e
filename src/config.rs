//! Declarative panel description, loaded from JSON.
//!
//! Elements refer to each other by label. Indicators are registered first,
//! then system annunciators, then master cautions, so a config can only
//! reference elements of the tier below.

use crate::annunciator::SystemAnnunciator;
use crate::error::{ElementKind, PanelError, PanelResult};
use crate::filters::PowerSourceId;
use crate::indicator::{Activation, Indicator, DEFAULT_HIGH_LIMIT, DEFAULT_LOW_LIMIT};
use crate::master_caution::MasterCaution;
use crate::panel::AnnunciatorPanel;
use crate::ports::{ChannelId, SourceId, Sweep};
use serde::{Deserialize, Serialize};
use tracing::debug;

const DEFAULT_CYCLE_PERIOD_MS: u32 = 50;
const DEFAULT_FLASH_PERIOD_MS: u32 = 500;

fn default_true() -> bool {
    true
}

fn default_low() -> f64 {
    DEFAULT_LOW_LIMIT
}

fn default_high() -> f64 {
    DEFAULT_HIGH_LIMIT
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PowerSourceConfig {
    pub name: String,
    #[serde(default = "default_true")]
    pub powered: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IndicatorConfig {
    pub label: String,
    /// Upstream value id. Without one the indicator is driven locally.
    #[serde(default)]
    pub source: Option<u16>,
    #[serde(default = "default_low")]
    pub low: f64,
    #[serde(default = "default_high")]
    pub high: f64,
    #[serde(default)]
    pub invert: bool,
    #[serde(default = "default_true")]
    pub allow_test: bool,
    #[serde(default)]
    pub allow_flash: bool,
    #[serde(default)]
    pub output: Option<u16>,
    #[serde(default)]
    pub power: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AnnunciatorConfig {
    pub label: String,
    pub indicators: Vec<String>,
    #[serde(default)]
    pub allow_test: bool,
    #[serde(default)]
    pub allow_flash: bool,
    #[serde(default)]
    pub output: Option<u16>,
    #[serde(default)]
    pub power: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MasterCautionConfig {
    pub label: String,
    pub annunciators: Vec<String>,
    #[serde(default = "default_true")]
    pub allow_test: bool,
    #[serde(default)]
    pub allow_flash: bool,
    #[serde(default)]
    pub output: Option<u16>,
    #[serde(default)]
    pub power: Option<String>,
}

/// Whole-panel configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PanelConfig {
    pub cycle_period_ms: u32,
    pub flash_period_ms: u32,
    pub write_on_change: bool,
    pub power_sources: Vec<PowerSourceConfig>,
    pub indicators: Vec<IndicatorConfig>,
    pub annunciators: Vec<AnnunciatorConfig>,
    pub master_cautions: Vec<MasterCautionConfig>,
    /// Synthetic signals for running without a simulator.
    pub sweeps: Vec<Sweep>,
}

impl Default for PanelConfig {
    fn default() -> Self {
        Self {
            cycle_period_ms: DEFAULT_CYCLE_PERIOD_MS,
            flash_period_ms: DEFAULT_FLASH_PERIOD_MS,
            write_on_change: false,
            power_sources: Vec::new(),
            indicators: Vec::new(),
            annunciators: Vec::new(),
            master_cautions: Vec::new(),
            sweeps: Vec::new(),
        }
    }
}

impl PanelConfig {
    pub fn from_json(json: &str) -> PanelResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> PanelResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// A small 737-style overhead panel: fuel, hydraulics and electrics
    /// feeding one master caution.
    pub fn demo() -> Self {
        let ranged = |label: &str, source: u16, low: f64, high: f64, output: u16| IndicatorConfig {
            label: label.into(),
            source: Some(source),
            low,
            high,
            invert: false,
            allow_test: true,
            allow_flash: false,
            output: Some(output),
            power: Some("DC BUS 1".into()),
        };

        let sweep = |source: u16, min: f64, max: f64, period_ms: u32| Sweep {
            source: SourceId(source),
            min,
            max,
            period_ms,
        };

        Self {
            power_sources: vec![
                PowerSourceConfig { name: "DC BUS 1".into(), powered: true },
                PowerSourceConfig { name: "BAT BUS".into(), powered: true },
            ],
            indicators: vec![
                ranged("FUEL PRESS L", 1, 0.0, 9.0, 10),
                ranged("FUEL PRESS R", 2, 0.0, 9.0, 11),
                ranged("FILTER BYPASS", 3, 1.0, 1.0, 12),
                ranged("HYD PRESS A", 4, 0.0, 1300.0, 13),
                ranged("HYD PRESS B", 5, 0.0, 1300.0, 14),
                IndicatorConfig {
                    invert: true,
                    ..ranged("GEN VOLTS", 6, 110.0, 120.0, 15)
                },
                IndicatorConfig {
                    label: "TR UNIT".into(),
                    source: None,
                    output: Some(16),
                    ..ranged("", 0, 0.0, 0.0, 0)
                },
            ],
            annunciators: vec![
                AnnunciatorConfig {
                    label: "FUEL".into(),
                    indicators: vec!["FUEL PRESS L".into(), "FUEL PRESS R".into(), "FILTER BYPASS".into()],
                    allow_test: false,
                    allow_flash: false,
                    output: Some(20),
                    power: Some("BAT BUS".into()),
                },
                AnnunciatorConfig {
                    label: "HYD".into(),
                    indicators: vec!["HYD PRESS A".into(), "HYD PRESS B".into()],
                    allow_test: false,
                    allow_flash: false,
                    output: Some(21),
                    power: Some("BAT BUS".into()),
                },
                AnnunciatorConfig {
                    label: "ELEC".into(),
                    indicators: vec!["GEN VOLTS".into(), "TR UNIT".into()],
                    allow_test: false,
                    allow_flash: false,
                    output: Some(22),
                    power: Some("BAT BUS".into()),
                },
            ],
            master_cautions: vec![MasterCautionConfig {
                label: "MASTER CAUTION".into(),
                annunciators: vec!["FUEL".into(), "HYD".into(), "ELEC".into()],
                allow_test: true,
                allow_flash: false,
                output: Some(30),
                power: Some("BAT BUS".into()),
            }],
            sweeps: vec![
                sweep(1, 5.0, 40.0, 20_000),
                sweep(2, 20.0, 40.0, 15_000),
                sweep(3, 0.0, 0.0, 0),
                sweep(4, 1000.0, 3000.0, 30_000),
                sweep(5, 2800.0, 3000.0, 10_000),
                sweep(6, 105.0, 118.0, 25_000),
            ],
            ..Self::default()
        }
    }
}

fn power_by_name(panel: &AnnunciatorPanel, name: Option<&str>) -> PanelResult<Option<PowerSourceId>> {
    name.map(|name| {
        panel.find_power_source(name).ok_or_else(|| PanelError::UnknownLabel {
            element: ElementKind::PowerSource,
            label: name.into(),
        })
    })
    .transpose()
}

impl AnnunciatorPanel {
    /// Build and wire a panel from `config`.
    pub fn from_config(config: &PanelConfig) -> PanelResult<Self> {
        let mut panel = AnnunciatorPanel::new();
        panel.set_flash_period(config.flash_period_ms);
        panel.set_write_on_change(config.write_on_change);

        for source in &config.power_sources {
            let id = panel.add_power_source(&source.name)?;
            panel.set_power(id, source.powered)?;
        }

        for ind in &config.indicators {
            let mut indicator = match ind.source {
                Some(source) => {
                    let indicator = Indicator::ranged(&ind.label, SourceId(source), ind.low, ind.high)?;
                    if ind.invert {
                        indicator.inverted()
                    } else {
                        indicator
                    }
                }
                None => Indicator::new(&ind.label, Activation::Driven(false)),
            }
            .with_test(ind.allow_test)
            .with_flash(ind.allow_flash);

            if let Some(channel) = ind.output {
                indicator = indicator.with_output(ChannelId(channel));
            }
            if let Some(power) = power_by_name(&panel, ind.power.as_deref())? {
                indicator = indicator.with_power(power);
            }
            panel.add_indicator(indicator)?;
        }

        for sa in &config.annunciators {
            let children = sa
                .indicators
                .iter()
                .map(|label| {
                    panel.find_indicator(label).ok_or_else(|| PanelError::UnknownLabel {
                        element: ElementKind::Indicator,
                        label: label.clone(),
                    })
                })
                .collect::<PanelResult<Vec<_>>>()?;

            let mut annunciator = SystemAnnunciator::new(&sa.label, &children)?
                .with_test(sa.allow_test)
                .with_flash(sa.allow_flash);
            if let Some(channel) = sa.output {
                annunciator = annunciator.with_output(ChannelId(channel));
            }
            if let Some(power) = power_by_name(&panel, sa.power.as_deref())? {
                annunciator = annunciator.with_power(power);
            }
            panel.add_system_annunciator(annunciator)?;
        }

        for mc in &config.master_cautions {
            let children = mc
                .annunciators
                .iter()
                .map(|label| {
                    panel.find_annunciator(label).ok_or_else(|| PanelError::UnknownLabel {
                        element: ElementKind::SystemAnnunciator,
                        label: label.clone(),
                    })
                })
                .collect::<PanelResult<Vec<_>>>()?;

            let mut master = MasterCaution::new(&mc.label, &children)?
                .with_test(mc.allow_test)
                .with_flash(mc.allow_flash);
            if let Some(channel) = mc.output {
                master = master.with_output(ChannelId(channel));
            }
            if let Some(power) = power_by_name(&panel, mc.power.as_deref())? {
                master = master.with_power(power);
            }
            panel.add_master_caution(master)?;
        }

        debug!(
            indicators = panel.indicators().len(),
            annunciators = panel.annunciators().len(),
            master_cautions = panel.master_cautions().len(),
            "panel built from config"
        );
        Ok(panel)
    }
}
