//! # Annunciator Panel
//!
//! Drives a panel of indicator lights from live numeric inputs using an
//! aircraft-style master caution hierarchy.
//!
//! ## Features
//!
//! - **Indicators**: range-tested fault lights (inclusive, optionally inverted) or locally driven ones
//! - **System annunciators**: latch on new faults, remember acknowledgments, recall mode
//! - **Master caution**: rollup of every un-gated system fault with reset and recall fan-out
//! - **Lighting filters**: bulb test, flasher, environment and simulated power gating
//! - **Embedded-friendly**: bounded capacities, no allocation on the update path
//!
//! ## Quick Start
//!
//! ```rust
//! use annunciator::{AnnunciatorPanel, Indicator, MasterCaution, SystemAnnunciator};
//! use annunciator::ports::{MapSource, NullSink, SourceId};
//!
//! let mut panel = AnnunciatorPanel::new();
//! panel.set_environment_active(true);
//!
//! let low_press = panel.add_indicator(Indicator::ranged("LOW PRESS", SourceId(1), 0.0, 10.0)?)?;
//! let hyd = panel.add_system_annunciator(SystemAnnunciator::new("HYD", &[low_press])?)?;
//! let master = panel.add_master_caution(MasterCaution::new("MASTER CAUTION", &[hyd])?)?;
//!
//! let mut source = MapSource::new();
//! source.set(SourceId(1), 4.0);
//! panel.update(&mut source, &mut NullSink);
//! assert!(panel.master_caution(master)?.is_lit());
//!
//! panel.reset(master)?;
//! assert!(!panel.annunciator(hyd)?.is_active());
//! # Ok::<(), annunciator::PanelError>(())
//! ```
//!
//! ## Architecture
//!
//! - [`ports`] - Collaborator traits for values, environment and outputs
//! - [`filters`] - Shared bulb test, flash and power gating
//! - [`indicator`] - Individual fault lights
//! - [`annunciator`] - Per-system latching annunciators
//! - [`master_caution`] - Master caution rollup
//! - [`panel`] - Registry and ordered update cycle
//! - [`config`] - JSON panel description

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]

pub mod annunciator;
pub mod config;
pub mod error;
pub mod filters;
pub mod indicator;
pub mod master_caution;
pub mod panel;
pub mod ports;

// Re-export main public types for convenience
pub use annunciator::{AnnunciatorId, AnnunciatorState, SystemAnnunciator};
pub use config::PanelConfig;
pub use error::{PanelError, PanelResult};
pub use filters::{Flasher, Lamp, LightFilters, PowerSourceId};
pub use indicator::{Activation, Indicator, IndicatorId, Range};
pub use master_caution::{MasterCaution, MasterCautionId};
pub use panel::{AnnunciatorPanel, PanelSnapshot};
