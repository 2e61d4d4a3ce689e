use thiserror::Error;

/// Which kind of panel element a construction error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementKind {
    Indicator,
    SystemAnnunciator,
    MasterCaution,
    PowerSource,
}

impl core::fmt::Display for ElementKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            ElementKind::Indicator => write!(f, "indicator"),
            ElementKind::SystemAnnunciator => write!(f, "system annunciator"),
            ElementKind::MasterCaution => write!(f, "master caution"),
            ElementKind::PowerSource => write!(f, "power source"),
        }
    }
}

/// Errors raised while building a panel. Updating a built panel never fails.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PanelError {
    #[error("{element} `{label}` given {given} entries, capacity is {capacity}")]
    ConfigurationOverflow {
        element: ElementKind,
        label: String,
        given: usize,
        capacity: usize,
    },

    #[error("indicator `{label}` has an unusable range [{low}, {high}]")]
    InvalidRange { label: String, low: f64, high: f64 },

    #[error("unknown indicator id {0}")]
    UnknownIndicator(usize),

    #[error("unknown system annunciator id {0}")]
    UnknownAnnunciator(usize),

    #[error("unknown master caution id {0}")]
    UnknownMasterCaution(usize),

    #[error("unknown power source id {0}")]
    UnknownPowerSource(u8),

    #[error("no {element} labelled `{label}`")]
    UnknownLabel { element: ElementKind, label: String },

    #[error("configuration error: {0}")]
    Config(String),
}

pub type PanelResult<T> = Result<T, PanelError>;

impl From<serde_json::Error> for PanelError {
    fn from(e: serde_json::Error) -> Self {
        PanelError::Config(e.to_string())
    }
}
