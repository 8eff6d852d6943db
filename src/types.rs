use serde::{Deserialize, Serialize};

/// VNDB user-list label codes.
///
/// These are the five built-in labels every VNDB account has; the numeric
/// codes are fixed by the API and stored as-is in `labels_set` payloads and
/// the failure log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Label {
    Playing,
    Finished,
    Stalled,
    Dropped,
    Wishlist,
}

impl Label {
    pub fn code(&self) -> u8 {
        match self {
            Self::Playing => 1,
            Self::Finished => 2,
            Self::Stalled => 3,
            Self::Dropped => 4,
            Self::Wishlist => 5,
        }
    }
}

impl From<Label> for u8 {
    fn from(label: Label) -> Self {
        label.code()
    }
}

impl TryFrom<u8> for Label {
    type Error = String;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            1 => Ok(Self::Playing),
            2 => Ok(Self::Finished),
            3 => Ok(Self::Stalled),
            4 => Ok(Self::Dropped),
            5 => Ok(Self::Wishlist),
            other => Err(format!("unknown label code {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}
