use std::path::PathBuf;

use crate::app::adb::apps::remove_from_snapshot;
use crate::app::device::DeviceSession;
use crate::app::models::{PackageEntry, SelectedDevice};
use crate::app::terminal::TerminalSession;

/// A cleanup whose root check passed and which now waits for the user's yes/no.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingCleanup {
    pub device: SelectedDevice,
    pub list_path: PathBuf,
}

/// Everything the coordination thread owns. Workers never hold a reference to it; their
/// results are applied through dispatcher completions.
#[derive(Default)]
pub struct AppState {
    pub session: DeviceSession,
    pub packages: Vec<PackageEntry>,
    /// Device the package snapshot was fetched from.
    pub package_device: Option<SelectedDevice>,
    pub root_mode: bool,
    pub pending_cleanup: Option<PendingCleanup>,
    pub terminal: Option<TerminalSession>,
}

impl AppState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn replace_packages(&mut self, device: SelectedDevice, packages: Vec<PackageEntry>) {
        self.packages = packages;
        self.package_device = Some(device);
    }

    /// Drops uninstalled packages from the snapshot if it still belongs to `device`.
    pub fn forget_packages(&mut self, device: &SelectedDevice, removed: &[String]) -> usize {
        if self.package_device.as_ref() != Some(device) {
            return 0;
        }
        removed
            .iter()
            .map(|name| remove_from_snapshot(&mut self.packages, name))
            .sum()
    }

    pub fn clear_packages(&mut self) {
        self.packages.clear();
        self.package_device = None;
    }

    /// Closes the terminal if it runs on a device other than the selected one.
    pub fn close_stale_terminal(&mut self) {
        let selected_serial = self
            .session
            .selected("")
            .ok()
            .flatten()
            .map(|device| device.serial);
        let stale = self
            .terminal
            .as_ref()
            .is_some_and(|terminal| Some(terminal.serial()) != selected_serial.as_deref());
        if stale {
            self.terminal = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::models::{PackageOrigin, PackageStatus};

    fn device(serial: &str) -> SelectedDevice {
        SelectedDevice {
            serial: serial.to_string(),
            model: "Pixel 5".to_string(),
        }
    }

    #[test]
    fn removal_only_applies_to_the_snapshot_device() {
        let mut state = AppState::new();
        state.replace_packages(
            device("A"),
            vec![
                PackageEntry::new("com.a", PackageStatus::Active, PackageOrigin::User),
                PackageEntry::new("com.b", PackageStatus::Active, PackageOrigin::User),
            ],
        );

        assert_eq!(state.forget_packages(&device("B"), &["com.a".to_string()]), 0);
        assert_eq!(state.packages.len(), 2);
        assert_eq!(
            state.forget_packages(&device("A"), &["com.a".to_string(), "com.zzz".to_string()]),
            1
        );
        assert_eq!(state.packages.len(), 1);
    }
}
