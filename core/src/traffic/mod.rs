pub mod categorizer;
pub mod fingerprint;

pub use categorizer::{categorize, CategoryDecision};
pub use fingerprint::{
    TrafficFingerprint, TrafficFingerprinter, TransportFingerprinter, TransportFraming,
};

use serde::{Deserialize, Serialize};

/// Traffic-type label for a transponder classified as unencrypted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TrafficCategory {
    TelecomBackhaul,
    EnterpriseVsat,
    Government,
    IotScada,
    Unknown,
}

impl TrafficCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrafficCategory::TelecomBackhaul => "TELECOM_BACKHAUL",
            TrafficCategory::EnterpriseVsat => "ENTERPRISE_VSAT",
            TrafficCategory::Government => "GOVERNMENT",
            TrafficCategory::IotScada => "IOT_SCADA",
            TrafficCategory::Unknown => "UNKNOWN",
        }
    }
}

impl std::fmt::Display for TrafficCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
