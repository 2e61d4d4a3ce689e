use crate::annunciator::{AnnunciatorId, SystemAnnunciator};
use crate::error::{ElementKind, PanelError, PanelResult};
use crate::filters::{Lamp, LightFilters, PowerSourceId};
use crate::ports::{make_label, ChannelId, Label};
use heapless::Vec;
use serde::{Deserialize, Serialize};
use tracing::info;

pub const MAX_ANNUNCIATORS_PER_MASTER: usize = 12;

/// Handle to a [`MasterCaution`] registered with a panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MasterCautionId(pub(crate) usize);

impl MasterCautionId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// Master caution light: lit while any owned system annunciator has an
/// active child, acknowledged or not.
#[derive(Debug, Clone)]
pub struct MasterCaution {
    label: Label,
    children: Vec<AnnunciatorId, MAX_ANNUNCIATORS_PER_MASTER>,
    active: bool,
    lit: bool,
    lamp: Lamp,
}

impl MasterCaution {
    pub fn new(label: &str, children: &[AnnunciatorId]) -> PanelResult<Self> {
        let list = Vec::from_slice(children).map_err(|()| PanelError::ConfigurationOverflow {
            element: ElementKind::MasterCaution,
            label: label.into(),
            given: children.len(),
            capacity: MAX_ANNUNCIATORS_PER_MASTER,
        })?;

        Ok(Self {
            label: make_label(label),
            children: list,
            active: false,
            lit: false,
            lamp: Lamp::new(true),
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

    /// `annunciators` must already be updated for this cycle.
    pub fn update(&mut self, annunciators: &[SystemAnnunciator], filters: &LightFilters) -> bool {
        self.active = self.children.iter().any(|child| {
            annunciators
                .get(child.index())
                .is_some_and(SystemAnnunciator::has_active)
        });
        self.lit = self.lamp.light(self.active, filters);
        self.active
    }

    /// Reset every owned annunciator, then this light.
    pub fn reset(&mut self, annunciators: &mut [SystemAnnunciator]) {
        for child in &self.children {
            if let Some(sa) = annunciators.get_mut(child.index()) {
                sa.reset();
            }
        }
        self.active = false;
        info!(master_caution = self.label.as_str(), "master caution reset");
    }

    /// Propagate recall mode to every owned annunciator.
    pub fn set_recall(&self, annunciators: &mut [SystemAnnunciator], mode: bool) {
        for child in &self.children {
            if let Some(sa) = annunciators.get_mut(child.index()) {
                sa.set_recall(mode);
            }
        }
        info!(master_caution = self.label.as_str(), mode, "recall");
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

    pub fn children(&self) -> &[AnnunciatorId] {
        &self.children
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn lamp(&self) -> &Lamp {
        &self.lamp
    }
}
