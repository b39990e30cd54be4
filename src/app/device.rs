use serde::Serialize;
use tracing::info;

use crate::app::adb::parse::{
    parse_adb_devices, parse_getprop_value, split_device_label, UNKNOWN_MODEL,
};
use crate::app::adb::runner::{device_args, Bridge};
use crate::app::error::AppError;
use crate::app::models::{Device, DiscoveryOutcome, SelectedDevice};

pub const ROOT_SENTINEL: &str = "rooted";

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub enum BridgeLifecycle {
    Stopped,
    Starting,
    Active,
}

pub fn start_server(bridge: &Bridge, trace_id: &str) -> Result<(), AppError> {
    bridge.run(&["start-server".to_string()], trace_id).map(|_| ())
}

pub fn stop_server(bridge: &Bridge, trace_id: &str) -> Result<(), AppError> {
    bridge.run(&["kill-server".to_string()], trace_id).map(|_| ())
}

pub fn probe_model(bridge: &Bridge, serial: &str, trace_id: &str) -> String {
    let args = device_args(serial, &["shell", "getprop", "ro.product.model"]);
    bridge
        .run(&args, trace_id)
        .ok()
        .and_then(|output| parse_getprop_value(&output.stdout))
        .unwrap_or_else(|| UNKNOWN_MODEL.to_string())
}

/// Whether `su` works on the device. Probe failures mean "no", never an error.
pub fn probe_root(bridge: &Bridge, serial: &str, trace_id: &str) -> bool {
    let args = device_args(serial, &["shell", "su", "-c", "echo", ROOT_SENTINEL]);
    match bridge.run_quiet(&args, trace_id) {
        Ok(output) => output.stdout.contains(ROOT_SENTINEL),
        Err(_) => false,
    }
}

/// Lists attached devices and probes each model name.
///
/// A single unauthorized device short-circuits the whole discovery before any model is
/// probed: the caller gets one authorization signal and no device entries.
pub fn discover(bridge: &Bridge, trace_id: &str) -> Result<DiscoveryOutcome, AppError> {
    let output = bridge.run(&["devices".to_string()], trace_id)?;
    let lines = parse_adb_devices(&output.stdout);
    if let Some(line) = lines.iter().find(|line| line.is_unauthorized()) {
        info!(trace_id = %trace_id, serial = %line.serial, "unauthorized device attached");
        return Ok(DiscoveryOutcome::AuthorizationRequired {
            serial: line.serial.clone(),
        });
    }

    let devices = lines
        .into_iter()
        .map(|line| Device {
            model: probe_model(bridge, &line.serial, trace_id),
            serial: line.serial,
        })
        .collect();
    Ok(DiscoveryOutcome::Devices(devices))
}

pub fn authorization_warning(serial: &str) -> String {
    format!("The device ({serial}) is unauthorized. Please allow USB Debugging on the device.")
}

/// Bridge connection state plus the device list and selection shown to the user. Owned by
/// the coordination thread.
#[derive(Debug, Clone)]
pub struct DeviceSession {
    lifecycle: BridgeLifecycle,
    devices: Vec<Device>,
    selection: Option<String>,
    authorization_required: Option<String>,
}

impl Default for DeviceSession {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceSession {
    pub fn new() -> Self {
        Self {
            lifecycle: BridgeLifecycle::Stopped,
            devices: Vec::new(),
            selection: None,
            authorization_required: None,
        }
    }

    pub fn lifecycle(&self) -> BridgeLifecycle {
        self.lifecycle
    }

    pub fn is_active(&self) -> bool {
        self.lifecycle == BridgeLifecycle::Active
    }

    pub fn mark_starting(&mut self) {
        self.lifecycle = BridgeLifecycle::Starting;
    }

    pub fn mark_started(&mut self, result: &Result<(), AppError>) {
        self.lifecycle = if result.is_ok() {
            BridgeLifecycle::Active
        } else {
            BridgeLifecycle::Stopped
        };
    }

    pub fn mark_stopped(&mut self) {
        self.lifecycle = BridgeLifecycle::Stopped;
    }

    pub fn require_active(&self, trace_id: &str) -> Result<(), AppError> {
        if self.is_active() {
            Ok(())
        } else {
            Err(AppError::precondition(
                "ADB is not active. Start ADB first.",
                trace_id,
            ))
        }
    }

    pub fn devices(&self) -> &[Device] {
        &self.devices
    }

    pub fn labels(&self) -> Vec<String> {
        self.devices.iter().map(Device::label).collect()
    }

    pub fn authorization_required(&self) -> Option<&str> {
        self.authorization_required.as_deref()
    }

    /// Replaces the device list. The previous selection is kept only if the same label is
    /// still attached; otherwise the first device is selected.
    pub fn apply_discovery(&mut self, outcome: DiscoveryOutcome) {
        match outcome {
            DiscoveryOutcome::Devices(devices) => {
                let labels: Vec<String> = devices.iter().map(Device::label).collect();
                self.selection = match self.selection.take() {
                    Some(label) if labels.contains(&label) => Some(label),
                    _ => labels.first().cloned(),
                };
                self.devices = devices;
                self.authorization_required = None;
            }
            DiscoveryOutcome::AuthorizationRequired { serial } => {
                self.devices.clear();
                self.selection = None;
                self.authorization_required = Some(serial);
            }
        }
    }

    /// Selects one of the listed labels.
    pub fn select(&mut self, label: &str, trace_id: &str) -> Result<SelectedDevice, AppError> {
        if !self.devices.iter().any(|device| device.label() == label) {
            return Err(AppError::validation(
                format!("Unknown device: {label}"),
                trace_id,
            ));
        }
        self.selection = Some(label.to_string());
        self.selected(trace_id)?
            .ok_or_else(|| AppError::system("Selection was not stored", trace_id))
    }

    pub fn select_index(&mut self, index: usize, trace_id: &str) -> Result<SelectedDevice, AppError> {
        let label = self
            .devices
            .get(index)
            .map(Device::label)
            .ok_or_else(|| AppError::validation(format!("No device at index {index}"), trace_id))?;
        self.select(&label, trace_id)
    }

    pub fn selection_label(&self) -> Option<&str> {
        self.selection.as_deref()
    }

    /// `Ok(None)` when nothing is selected; `Err` when the label cannot be split.
    pub fn selected(&self, trace_id: &str) -> Result<Option<SelectedDevice>, AppError> {
        let Some(label) = self.selection.as_deref().filter(|label| !label.is_empty()) else {
            return Ok(None);
        };
        let (model, serial) = split_device_label(label).ok_or_else(|| {
            AppError::validation(format!("Invalid device selection: {label}"), trace_id)
        })?;
        Ok(Some(SelectedDevice { serial, model }))
    }

    pub fn require_selected(&self, trace_id: &str) -> Result<SelectedDevice, AppError> {
        self.selected(trace_id)?
            .ok_or_else(|| AppError::precondition("No Device Selected", trace_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::adb::fake::ScriptedBridge;
    use crate::app::adb::runner::CommandOutput;
    use crate::app::logging::ActivityLog;

    fn bridge(fake: &std::sync::Arc<ScriptedBridge>) -> Bridge {
        Bridge::new(fake.clone(), ActivityLog::new())
    }

    fn script_model(fake: &ScriptedBridge, serial: &str, model: &str) {
        fake.respond(
            &["-s", serial, "shell", "getprop", "ro.product.model"],
            CommandOutput::ok(format!("{model}\n")),
        );
    }

    #[test]
    fn discovery_builds_labels_from_probed_models() {
        let fake = ScriptedBridge::new();
        fake.respond(
            &["devices"],
            CommandOutput::ok("List of devices attached\nABC123\tdevice\nXYZ\tdevice\n"),
        );
        script_model(&fake, "ABC123", "Pixel 5");

        let outcome = discover(&bridge(&fake), "t").expect("discover");
        let DiscoveryOutcome::Devices(devices) = outcome else {
            panic!("expected devices");
        };
        let labels: Vec<String> = devices.iter().map(Device::label).collect();
        assert_eq!(labels, vec!["Pixel 5 - ABC123", "unknown - XYZ"]);
    }

    #[test]
    fn unauthorized_device_blocks_the_whole_list() {
        for listing in [
            "List of devices attached\nBAD\tunauthorized\nGOOD\tdevice\n",
            "List of devices attached\nGOOD\tdevice\nBAD\tunauthorized\nMORE\tdevice\n",
        ] {
            let fake = ScriptedBridge::new();
            fake.respond(&["devices"], CommandOutput::ok(listing));
            script_model(&fake, "GOOD", "Pixel");

            let outcome = discover(&bridge(&fake), "t").expect("discover");
            assert_eq!(
                outcome,
                DiscoveryOutcome::AuthorizationRequired {
                    serial: "BAD".to_string()
                }
            );
            assert_eq!(fake.calls_joined(), vec!["devices"]);
        }
    }

    #[test]
    fn failed_listing_is_an_error() {
        let fake = ScriptedBridge::new();
        fake.fail(&["devices"], "adb: not found");
        let err = discover(&bridge(&fake), "t").unwrap_err();
        assert_eq!(err.code, "ERR_EXECUTION");
    }

    #[test]
    fn root_probe_requires_sentinel() {
        let fake = ScriptedBridge::new();
        let args = ["-s", "ABC", "shell", "su", "-c", "echo", "rooted"];
        fake.respond(&args, CommandOutput::ok("rooted\n"));
        assert!(probe_root(&bridge(&fake), "ABC", "t"));

        fake.respond(&args, CommandOutput::ok("permission denied\n"));
        assert!(!probe_root(&bridge(&fake), "ABC", "t"));

        fake.respond(&args, CommandOutput::failed(127, "/system/bin/sh: su: not found"));
        assert!(!probe_root(&bridge(&fake), "ABC", "t"));
    }

    fn device(model: &str, serial: &str) -> Device {
        Device {
            serial: serial.to_string(),
            model: model.to_string(),
        }
    }

    #[test]
    fn selection_defaults_to_first_and_survives_refresh() {
        let mut session = DeviceSession::new();
        session.apply_discovery(DiscoveryOutcome::Devices(vec![
            device("Pixel 5", "A"),
            device("Galaxy", "B"),
        ]));
        assert_eq!(session.selection_label(), Some("Pixel 5 - A"));

        session.select("Galaxy - B", "t").expect("select");
        session.apply_discovery(DiscoveryOutcome::Devices(vec![
            device("Pixel 5", "A"),
            device("Galaxy", "B"),
        ]));
        assert_eq!(session.selection_label(), Some("Galaxy - B"));

        session.apply_discovery(DiscoveryOutcome::Devices(vec![device("Pixel 5", "A")]));
        assert_eq!(session.selection_label(), Some("Pixel 5 - A"));
    }

    #[test]
    fn authorization_signal_clears_devices() {
        let mut session = DeviceSession::new();
        session.apply_discovery(DiscoveryOutcome::Devices(vec![device("Pixel 5", "A")]));
        session.apply_discovery(DiscoveryOutcome::AuthorizationRequired {
            serial: "BAD".to_string(),
        });
        assert!(session.devices().is_empty());
        assert_eq!(session.authorization_required(), Some("BAD"));
        assert_eq!(session.selected("t"), Ok(None));
    }

    #[test]
    fn absent_selection_is_distinct_from_failure() {
        let session = DeviceSession::new();
        assert_eq!(session.selected("t"), Ok(None));
        let err = session.require_selected("t").unwrap_err();
        assert_eq!(err.code, "ERR_PRECONDITION");
        assert_eq!(err.error, "No Device Selected");

        let mut broken = DeviceSession::new();
        broken.selection = Some("no-separator".to_string());
        assert_eq!(broken.selected("t").unwrap_err().code, "ERR_VALIDATION");
    }

    #[test]
    fn lifecycle_follows_start_result() {
        let mut session = DeviceSession::new();
        assert!(session.require_active("t").is_err());
        session.mark_starting();
        assert_eq!(session.lifecycle(), BridgeLifecycle::Starting);
        session.mark_started(&Err(AppError::execution("boom", "t")));
        assert_eq!(session.lifecycle(), BridgeLifecycle::Stopped);
        session.mark_starting();
        session.mark_started(&Ok(()));
        assert!(session.require_active("t").is_ok());
    }
}
