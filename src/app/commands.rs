use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};
use uuid::Uuid;

use crate::app::adb::apps::filter_packages;
use crate::app::adb::locator::{executable_dir, resolve_adb_program, validate_adb_program};
use crate::app::adb::runner::{AdbExecutor, Bridge};
use crate::app::catalog::find_group;
use crate::app::cleanup::{read_path_list, remove_paths, CleanupPreconditions, CONFIRMATION_PROMPT};
use crate::app::config::{backup_config_path, config_path, save_config_to_path, AppConfig};
use crate::app::device::{
    authorization_warning, discover, probe_root, start_server, stop_server, BridgeLifecycle,
};
use crate::app::error::AppError;
use crate::app::logging::ActivityLog;
use crate::app::models::{DiscoveryOutcome, PackageEntry};
use crate::app::packages::{fetch_packages, uninstall_batch};
use crate::app::scheduler::TaskDispatcher;
use crate::app::state::{AppState, PendingCleanup};
use crate::app::terminal::{AdbShell, TerminalSession};

fn new_trace_id() -> String {
    Uuid::new_v4().to_string()
}

fn ensure_non_empty(value: &str, field: &str, trace_id: &str) -> Result<(), AppError> {
    if value.trim().is_empty() {
        return Err(AppError::validation(format!("{field} is required"), trace_id));
    }
    Ok(())
}

/// User actions. Guards run on the coordination thread; bridge work is handed to the
/// dispatcher and its result applied to [`AppState`] when pumped.
pub struct Workbench {
    bridge: Bridge,
    /// Same bridge with the shorter probe timeout, for `su` checks.
    probe_bridge: Bridge,
    config: AppConfig,
    /// Where setting changes are saved; `None` keeps them in memory.
    config_path: Option<PathBuf>,
    dispatcher: TaskDispatcher<AppState>,
    log: ActivityLog,
}

impl Workbench {
    pub fn new(config: AppConfig, log: ActivityLog) -> Self {
        let trace_id = new_trace_id();
        let program = resolve_adb_program(&config.adb.command_path, executable_dir().as_deref());
        if let Err(err) = validate_adb_program(&program, &trace_id) {
            warn!(trace_id = %trace_id, program = %program, error = %err, "adb executable check failed");
            log.log(format!("Error: {}", err.error));
        }
        info!(trace_id = %trace_id, program = %program, "using adb");
        let bridge = Bridge::new(
            Arc::new(AdbExecutor::new(program.clone(), config.command_timeout())),
            log.clone(),
        );
        let probe_bridge = Bridge::new(
            Arc::new(AdbExecutor::new(program, config.probe_timeout())),
            log.clone(),
        );
        Self::with_bridges(bridge, probe_bridge, config).saving_config_to(config_path())
    }

    pub fn with_bridges(bridge: Bridge, probe_bridge: Bridge, config: AppConfig) -> Self {
        let log = bridge.log().clone();
        Self {
            bridge,
            probe_bridge,
            config,
            config_path: None,
            dispatcher: TaskDispatcher::new(log.clone()),
            log,
        }
    }

    pub fn saving_config_to(mut self, path: PathBuf) -> Self {
        self.config_path = Some(path);
        self
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Chooses whether later uninstalls pass `-k`, and saves the choice.
    pub fn set_keep_data(&mut self, keep: bool) {
        let trace_id = new_trace_id();
        self.config.uninstall.keep_data = keep;
        if let Some(path) = &self.config_path {
            if let Err(err) =
                save_config_to_path(&self.config, path, &backup_config_path(path), &trace_id)
            {
                self.report(&err);
                return;
            }
        }
        let state = if keep { "on" } else { "off" };
        self.log.log(format!("Keep app data on uninstall: {state}"));
    }

    pub fn log(&self) -> &ActivityLog {
        &self.log
    }

    pub fn pump(&self, state: &mut AppState) -> usize {
        self.dispatcher.pump(state)
    }

    pub fn wait_idle(&self, state: &mut AppState, timeout: Duration) -> bool {
        self.dispatcher.wait_idle(state, timeout)
    }

    pub fn pending_tasks(&self) -> usize {
        self.dispatcher.pending()
    }

    fn report(&self, err: &AppError) {
        warn!(trace_id = %err.trace_id, code = %err.code, error = %err.error, "action rejected");
        self.log.log(&err.error);
    }

    /// Starts the bridge server and discovers devices in the same worker.
    pub fn start(&self, state: &mut AppState) {
        if state.session.lifecycle() != BridgeLifecycle::Stopped {
            self.log.log("ADB is already running.");
            return;
        }
        let trace_id = new_trace_id();
        state.session.mark_starting();
        self.log.log("ADB server is starting...");
        let bridge = self.bridge.clone();
        let log = self.log.clone();
        self.dispatcher.submit(
            "Start ADB",
            move || {
                let started = start_server(&bridge, &trace_id);
                let discovered = started
                    .as_ref()
                    .ok()
                    .map(|_| discover(&bridge, &trace_id));
                (started, discovered)
            },
            move |state: &mut AppState, (started, discovered)| {
                state.session.mark_started(&started);
                if started.is_ok() {
                    log.log("ADB server started.");
                }
                if let Some(discovered) = discovered {
                    apply_discovery(&log, state, discovered);
                }
            },
        );
    }

    pub fn stop(&self, state: &mut AppState) {
        let trace_id = new_trace_id();
        if let Err(err) = state.session.require_active(&trace_id) {
            self.report(&err);
            return;
        }
        let bridge = self.bridge.clone();
        let log = self.log.clone();
        self.dispatcher.submit(
            "Stop ADB",
            move || stop_server(&bridge, &trace_id),
            move |state: &mut AppState, stopped| {
                if stopped.is_ok() {
                    state.session.mark_stopped();
                    state.session.apply_discovery(DiscoveryOutcome::Devices(Vec::new()));
                    state.clear_packages();
                    state.pending_cleanup = None;
                    state.terminal = None;
                    log.log("ADB server stopped.");
                }
            },
        );
    }

    pub fn refresh_devices(&self, state: &mut AppState) {
        let trace_id = new_trace_id();
        if let Err(err) = state.session.require_active(&trace_id) {
            self.report(&err);
            return;
        }
        let bridge = self.bridge.clone();
        let log = self.log.clone();
        self.dispatcher.submit(
            "Fetch devices",
            move || discover(&bridge, &trace_id),
            move |state: &mut AppState, discovered| apply_discovery(&log, state, discovered),
        );
    }

    /// Accepts a 1-based index into the device list or a full `model - serial` label.
    pub fn select(&self, state: &mut AppState, choice: &str) {
        let trace_id = new_trace_id();
        let choice = choice.trim();
        if let Err(err) = ensure_non_empty(choice, "device", &trace_id) {
            self.report(&err);
            return;
        }
        let selected = match choice.parse::<usize>() {
            Ok(index) if index >= 1 => state.session.select_index(index - 1, &trace_id),
            _ => state.session.select(choice, &trace_id),
        };
        match selected {
            Ok(device) => {
                if state.package_device.as_ref() != Some(&device) {
                    state.clear_packages();
                }
                state.close_stale_terminal();
                self.log.log(format!("Selected device: {device}"));
            }
            Err(err) => self.report(&err),
        }
    }

    pub fn load_packages(&self, state: &mut AppState) {
        let trace_id = new_trace_id();
        let device = match state
            .session
            .require_active(&trace_id)
            .and_then(|_| state.session.require_selected(&trace_id))
        {
            Ok(device) => device,
            Err(err) => {
                self.report(&err);
                return;
            }
        };
        let bridge = self.bridge.clone();
        let log = self.log.clone();
        self.log.log(format!("Fetching installed applications from {device}..."));
        self.dispatcher.submit(
            "Fetch applications",
            {
                let device = device.clone();
                move || fetch_packages(&bridge, &device, &trace_id)
            },
            move |state: &mut AppState, fetched| match fetched {
                Ok(packages) => {
                    log.log(format!("Loaded {} applications for {device}.", packages.len()));
                    state.replace_packages(device, packages);
                }
                Err(err) => log.log(format!("Error fetching applications: {}", err.error)),
            },
        );
    }

    /// Case-insensitive view of the current snapshot.
    pub fn visible_packages<'a>(&self, state: &'a AppState, query: &str) -> Vec<&'a PackageEntry> {
        filter_packages(&state.packages, query)
    }

    pub fn uninstall(&self, state: &mut AppState, packages: Vec<String>) {
        let trace_id = new_trace_id();
        let packages: Vec<String> = packages
            .into_iter()
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty())
            .collect();
        if packages.is_empty() {
            self.report(&AppError::precondition(
                "No application selected for debloating.",
                &trace_id,
            ));
            return;
        }
        let device = match state
            .session
            .require_active(&trace_id)
            .and_then(|_| state.session.require_selected(&trace_id))
        {
            Ok(device) => device,
            Err(err) => {
                self.report(&err);
                return;
            }
        };
        let bridge = self.bridge.clone();
        let settings = self.config.uninstall.clone();
        let log = self.log.clone();
        self.dispatcher.submit(
            "Debloat",
            {
                let device = device.clone();
                move || uninstall_batch(&bridge, &device, &packages, &settings, &trace_id)
            },
            move |state: &mut AppState, report| {
                state.forget_packages(&device, &report.removed);
                if let Some(reason) = &report.aborted {
                    log.log(format!("Debloating stopped: {reason}"));
                }
                log.log(format!(
                    "Debloat finished: {} removed, {} failed.",
                    report.removed.len(),
                    report.failed.len()
                ));
            },
        );
    }

    pub fn uninstall_group(&self, state: &mut AppState, name: &str) {
        match find_group(name) {
            Some(group) => {
                self.log.log(format!("Debloating package group {}...", group.name));
                let packages = group.packages.iter().map(|p| p.to_string()).collect();
                self.uninstall(state, packages);
            }
            None => self.report(&AppError::validation(
                format!("Unknown package group: {}", name.trim()),
                new_trace_id(),
            )),
        }
    }

    pub fn toggle_root_mode(&self, state: &mut AppState) {
        state.root_mode = !state.root_mode;
        if state.root_mode {
            self.log.log("Root mode is activated");
        } else {
            state.pending_cleanup = None;
            self.log.log("Root mode is deactivated");
        }
    }

    /// First half of path cleanup: guards, then the root probe. A positive probe leaves a
    /// [`PendingCleanup`] waiting for [`Workbench::confirm_cleanup`].
    pub fn request_cleanup(&self, state: &mut AppState, list_path: PathBuf) {
        let trace_id = new_trace_id();
        if !state.root_mode {
            self.report(&AppError::precondition(
                "Path cleanup is only available in root mode.",
                &trace_id,
            ));
            return;
        }
        let device = match state
            .session
            .require_active(&trace_id)
            .and_then(|_| state.session.require_selected(&trace_id))
        {
            Ok(device) => device,
            Err(err) => {
                self.report(&err);
                return;
            }
        };
        let bridge = self.probe_bridge.clone();
        let log = self.log.clone();
        self.dispatcher.submit(
            "Check root access",
            {
                let serial = device.serial.clone();
                move || probe_root(&bridge, &serial, &trace_id)
            },
            move |state: &mut AppState, rooted| {
                if !rooted {
                    log.log("Root Access Required");
                    return;
                }
                state.pending_cleanup = Some(PendingCleanup { device, list_path });
                log.log(CONFIRMATION_PROMPT);
            },
        );
    }

    pub fn confirm_cleanup(&self, state: &mut AppState, confirmed: bool) {
        let trace_id = new_trace_id();
        let Some(pending) = state.pending_cleanup.take() else {
            self.report(&AppError::precondition(
                "No file removal is waiting for confirmation.",
                &trace_id,
            ));
            return;
        };
        if !confirmed {
            self.report(&AppError::precondition(
                "File removal canceled by user.",
                &trace_id,
            ));
            return;
        }
        let bridge_active = state.session.is_active();
        let bridge = self.bridge.clone();
        let partition = self.config.cleanup.protected_partition.clone();
        let log = self.log.clone();
        self.dispatcher.submit_detached("Remove paths", move || {
            let lines = match read_path_list(&pending.list_path, &trace_id) {
                Ok(lines) => lines,
                Err(err) => {
                    log.log(&err.error);
                    return;
                }
            };
            let gate = CleanupPreconditions {
                bridge_active,
                root_confirmed: true,
                user_confirmed: true,
                lines: &lines,
            };
            if let Err(err) = gate.check(&trace_id) {
                log.log(&err.error);
                return;
            }
            remove_paths(&bridge, &pending.device, &lines, &partition, &trace_id);
        });
    }

    pub fn open_terminal(&self, state: &mut AppState) {
        let trace_id = new_trace_id();
        let device = match state
            .session
            .require_active(&trace_id)
            .and_then(|_| state.session.require_selected(&trace_id))
        {
            Ok(device) => device,
            Err(err) => {
                self.report(&err);
                return;
            }
        };
        let backend = AdbShell::new(self.probe_bridge.clone(), device.serial.clone(), trace_id);
        state.terminal = Some(TerminalSession::open(
            device.model.clone(),
            device.serial.clone(),
            Arc::new(backend),
        ));
        self.log.log(format!("Opened shell on {device}"));
    }

    /// Stops an active bridge server synchronously, then detaches the log sink.
    pub fn shutdown(&self, state: &mut AppState) {
        let trace_id = new_trace_id();
        self.dispatcher.wait_idle(state, Duration::from_secs(2));
        if state.session.is_active() && stop_server(&self.bridge, &trace_id).is_ok() {
            state.session.mark_stopped();
            self.log.log("ADB server stopped.");
        }
        self.log.detach();
    }
}

fn apply_discovery(
    log: &ActivityLog,
    state: &mut AppState,
    discovered: Result<DiscoveryOutcome, AppError>,
) {
    let outcome = match discovered {
        Ok(outcome) => outcome,
        // The bridge already logged the failure text.
        Err(err) => {
            warn!(trace_id = %err.trace_id, error = %err, "device discovery failed");
            return;
        }
    };
    if let DiscoveryOutcome::AuthorizationRequired { serial } = &outcome {
        log.log(authorization_warning(serial));
    }
    state.session.apply_discovery(outcome);
    state.close_stale_terminal();
    let labels = state.session.labels();
    if labels.is_empty() {
        if state.session.authorization_required().is_none() {
            log.log("No devices found.");
        }
        return;
    }
    for label in &labels {
        log.log(format!("Device found: {label}"));
    }
    if let Some(selected) = state.session.selection_label() {
        log.log(format!("Selected device: {selected}"));
    }
}
