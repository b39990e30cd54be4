use serde::{Deserialize, Serialize};
use std::fmt;

use crate::app::adb::parse::format_device_label;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Device {
    pub serial: String,
    pub model: String,
}

impl Device {
    pub fn label(&self) -> String {
        format_device_label(&self.model, &self.serial)
    }
}

/// Serial and model recovered from the current selection label.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SelectedDevice {
    pub serial: String,
    pub model: String,
}

impl fmt::Display for SelectedDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {}", self.model, self.serial)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum PackageStatus {
    Active,
    Disabled,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum PackageOrigin {
    System,
    User,
}

impl fmt::Display for PackageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PackageStatus::Active => write!(f, "Active"),
            PackageStatus::Disabled => write!(f, "Disabled"),
        }
    }
}

impl fmt::Display for PackageOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PackageOrigin::System => write!(f, "System"),
            PackageOrigin::User => write!(f, "User"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PackageEntry {
    pub package_name: String,
    pub status: PackageStatus,
    pub origin: PackageOrigin,
}

impl PackageEntry {
    pub fn new(package_name: impl Into<String>, status: PackageStatus, origin: PackageOrigin) -> Self {
        Self {
            package_name: package_name.into(),
            status,
            origin,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum RemovalOutcome {
    Removed,
    /// The device reported the path does not exist.
    AlreadyAbsent,
    Failed(String),
    /// Rejected before reaching the device (unsafe path).
    Skipped(String),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PathRemoval {
    pub path: String,
    pub outcome: RemovalOutcome,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CleanupReport {
    pub remounted: bool,
    pub removals: Vec<PathRemoval>,
}

impl CleanupReport {
    pub fn count(&self, predicate: impl Fn(&RemovalOutcome) -> bool) -> usize {
        self.removals
            .iter()
            .filter(|removal| predicate(&removal.outcome))
            .count()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct UninstallReport {
    /// Packages the bridge confirmed, in request order.
    pub removed: Vec<String>,
    pub failed: Vec<(String, String)>,
    /// Set when the batch stopped before reaching every package.
    pub aborted: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum DiscoveryOutcome {
    Devices(Vec<Device>),
    /// An unauthorized device was attached; nothing else from this discovery is usable.
    AuthorizationRequired { serial: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_label_matches_selection_format() {
        let device = Device {
            serial: "ABC123".to_string(),
            model: "Pixel 5".to_string(),
        };
        let selected = SelectedDevice {
            serial: device.serial.clone(),
            model: device.model.clone(),
        };
        assert_eq!(device.label(), selected.to_string());
    }

    #[test]
    fn cleanup_report_counts_by_outcome() {
        let report = CleanupReport {
            remounted: false,
            removals: vec![
                PathRemoval {
                    path: "/a".to_string(),
                    outcome: RemovalOutcome::Removed,
                },
                PathRemoval {
                    path: "/b".to_string(),
                    outcome: RemovalOutcome::AlreadyAbsent,
                },
                PathRemoval {
                    path: "/c".to_string(),
                    outcome: RemovalOutcome::Removed,
                },
            ],
        };
        assert_eq!(report.count(|o| *o == RemovalOutcome::Removed), 2);
        assert_eq!(report.count(|o| matches!(o, RemovalOutcome::Failed(_))), 0);
    }
}
