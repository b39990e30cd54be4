use std::fs;
use std::path::Path;

use tracing::{info, warn};

use crate::app::adb::paths::{
    extract_path_tokens, is_missing_path_error, references_partition, validate_device_path,
};
use crate::app::adb::runner::{device_args, shell_quote, Bridge};
use crate::app::error::AppError;
use crate::app::models::{CleanupReport, PathRemoval, RemovalOutcome, SelectedDevice};

pub const CONFIRMATION_PROMPT: &str =
    "Removing files can damage your device. Do you want to proceed?";

pub fn read_path_list(path: &Path, trace_id: &str) -> Result<Vec<String>, AppError> {
    let content = fs::read_to_string(path).map_err(|err| {
        AppError::system(
            format!("Failed to read {}: {err}", path.display()),
            trace_id,
        )
    })?;
    Ok(content.lines().map(str::to_string).collect())
}

/// Checked in this order; the first unmet one is reported.
pub struct CleanupPreconditions<'a> {
    pub bridge_active: bool,
    pub root_confirmed: bool,
    pub user_confirmed: bool,
    pub lines: &'a [String],
}

impl CleanupPreconditions<'_> {
    pub fn check(&self, trace_id: &str) -> Result<(), AppError> {
        if !self.bridge_active {
            return Err(AppError::precondition(
                "ADB is not active. Start ADB first.",
                trace_id,
            ));
        }
        if !self.root_confirmed {
            return Err(AppError::precondition("Root Access Required", trace_id));
        }
        if !self.user_confirmed {
            return Err(AppError::precondition(
                "File removal canceled by user.",
                trace_id,
            ));
        }
        if self.lines.iter().all(|line| line.trim().is_empty()) {
            return Err(AppError::precondition("The selected file is empty.", trace_id));
        }
        Ok(())
    }
}

/// Removes every path token found in `lines`, one `rm -r` per token.
///
/// When any token lies under `partition` it is remounted read-write once, before the first
/// removal. Each removal is independent: a failure is recorded and the next path proceeds.
pub fn remove_paths(
    bridge: &Bridge,
    device: &SelectedDevice,
    lines: &[String],
    partition: &str,
    trace_id: &str,
) -> CleanupReport {
    let log = bridge.log();
    let mut report = CleanupReport::default();

    if references_partition(lines, partition) {
        let args = device_args(
            &device.serial,
            &["shell", "su", "-c", "mount", "-o", "rw,remount", partition],
        );
        match bridge.run(&args, trace_id) {
            Ok(_) => {
                report.remounted = true;
                log.log("System mounted as READ/WRITE");
            }
            Err(err) => {
                warn!(trace_id = %trace_id, partition = %partition, error = %err, "remount failed");
            }
        }
    }

    for line in lines {
        for path in extract_path_tokens(line) {
            let outcome = remove_path(bridge, device, &path, trace_id);
            match &outcome {
                RemovalOutcome::Removed => log.log(format!("Successfully removed: {path}")),
                RemovalOutcome::AlreadyAbsent => log.log(format!(
                    "{path} already does not exist on {} ({}).",
                    device.model, device.serial
                )),
                RemovalOutcome::Failed(reason) => {
                    log.log(format!("Failed to remove: {path}. Error: {reason}"))
                }
                RemovalOutcome::Skipped(reason) => {
                    log.log(format!("Skipped {path}: {reason}"))
                }
            }
            report.removals.push(PathRemoval { path, outcome });
        }
    }

    info!(
        trace_id = %trace_id,
        serial = %device.serial,
        paths = report.removals.len(),
        remounted = report.remounted,
        "path cleanup finished"
    );
    log.log("DONE!");
    report
}

fn remove_path(bridge: &Bridge, device: &SelectedDevice, path: &str, trace_id: &str) -> RemovalOutcome {
    if let Err(reason) = validate_device_path(path) {
        return RemovalOutcome::Skipped(reason);
    }
    let target = shell_quote(path);
    let args = device_args(&device.serial, &["shell", "rm", "-r", &target]);
    match bridge.run_unchecked(&args, trace_id) {
        Ok(output) if output.succeeded() => RemovalOutcome::Removed,
        Ok(output) if is_missing_path_error(&output.stderr) => RemovalOutcome::AlreadyAbsent,
        Ok(output) => RemovalOutcome::Failed(output.diagnostic()),
        Err(err) => RemovalOutcome::Failed(err.error),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::adb::fake::ScriptedBridge;
    use crate::app::adb::runner::CommandOutput;
    use crate::app::logging::{ActivityLog, MemorySink};
    use tempfile::TempDir;

    fn pixel() -> SelectedDevice {
        SelectedDevice {
            serial: "ABC123".to_string(),
            model: "Pixel 5".to_string(),
        }
    }

    const REMOUNT: [&str; 9] = [
        "-s", "ABC123", "shell", "su", "-c", "mount", "-o", "rw,remount", "/system",
    ];

    fn rm(path: &str) -> Vec<&str> {
        vec!["-s", "ABC123", "shell", "rm", "-r", path]
    }

    #[test]
    fn remounts_once_before_any_removal() {
        let sink = MemorySink::new();
        let fake = ScriptedBridge::new();
        fake.respond(&REMOUNT, CommandOutput::ok(""));
        fake.respond(&rm("/system/app/Foo"), CommandOutput::ok(""));
        fake.respond(&rm("/system/priv-app/Bar"), CommandOutput::ok(""));
        let bridge = Bridge::new(fake.clone(), ActivityLog::attached(sink.clone()));

        let lines = vec![
            "/system/app/Foo".to_string(),
            "also /system/priv-app/Bar".to_string(),
        ];
        let report = remove_paths(&bridge, &pixel(), &lines, "/system", "t");

        assert!(report.remounted);
        let calls = fake.calls_joined();
        assert_eq!(calls.len(), 3);
        assert_eq!(calls[0], REMOUNT.join(" "));
        assert_eq!(report.count(|o| *o == RemovalOutcome::Removed), 2);
        assert_eq!(
            sink.messages(),
            vec![
                "System mounted as READ/WRITE".to_string(),
                "Successfully removed: /system/app/Foo".to_string(),
                "Successfully removed: /system/priv-app/Bar".to_string(),
                "DONE!".to_string(),
            ]
        );
    }

    #[test]
    fn no_remount_without_protected_paths() {
        let fake = ScriptedBridge::new();
        fake.respond(&rm("/data/app/com.foo"), CommandOutput::ok(""));
        let bridge = Bridge::new(fake.clone(), ActivityLog::new());

        let lines = vec!["drop /data/app/com.foo and /system_ext".to_string()];
        fake.respond(&rm("/system_ext"), CommandOutput::ok(""));
        let report = remove_paths(&bridge, &pixel(), &lines, "/system", "t");
        assert!(!report.remounted);
        assert_eq!(fake.calls().len(), 2);
    }

    #[test]
    fn each_removal_is_independent() {
        let sink = MemorySink::new();
        let fake = ScriptedBridge::new();
        fake.respond(
            &rm("/data/app/gone"),
            CommandOutput::failed(1, "rm: /data/app/gone: No such file or directory\n"),
        );
        fake.respond(
            &rm("/data/app/locked"),
            CommandOutput::failed(1, "rm: /data/app/locked: Permission denied\n"),
        );
        fake.fail(&rm("/data/app/offline"), "device offline");
        fake.respond(&rm("/data/app/ok"), CommandOutput::ok(""));
        let bridge = Bridge::new(fake.clone(), ActivityLog::attached(sink.clone()));

        let lines = vec![
            "/data/app/gone /data/app/locked".to_string(),
            "no paths on this line".to_string(),
            "/data/app/offline".to_string(),
            "/data/app/ok".to_string(),
        ];
        let report = remove_paths(&bridge, &pixel(), &lines, "/system", "t");

        let outcomes: Vec<RemovalOutcome> =
            report.removals.iter().map(|r| r.outcome.clone()).collect();
        assert_eq!(
            outcomes,
            vec![
                RemovalOutcome::AlreadyAbsent,
                RemovalOutcome::Failed("rm: /data/app/locked: Permission denied".to_string()),
                RemovalOutcome::Failed("device offline".to_string()),
                RemovalOutcome::Removed,
            ]
        );
        assert!(sink.contains("/data/app/gone already does not exist on Pixel 5 (ABC123)."));
        assert_eq!(sink.messages().last().map(String::as_str), Some("DONE!"));
    }

    #[test]
    fn unsafe_paths_never_reach_the_device() {
        let fake = ScriptedBridge::new();
        let bridge = Bridge::new(fake.clone(), ActivityLog::new());

        let lines = vec!["/sdcard/../data".to_string()];
        let report = remove_paths(&bridge, &pixel(), &lines, "/system", "t");
        assert!(matches!(report.removals[0].outcome, RemovalOutcome::Skipped(_)));
        assert!(fake.calls().is_empty());
    }

    #[test]
    fn shell_metacharacters_stay_inside_the_path() {
        let fake = ScriptedBridge::new();
        fake.respond(&rm("'/data/local/tmp/x;reboot'"), CommandOutput::ok(""));
        let bridge = Bridge::new(fake.clone(), ActivityLog::new());

        let lines = vec!["/data/local/tmp/x;reboot".to_string()];
        let report = remove_paths(&bridge, &pixel(), &lines, "/system", "t");
        assert_eq!(report.removals[0].outcome, RemovalOutcome::Removed);
        assert_eq!(
            fake.calls_joined(),
            vec!["-s ABC123 shell rm -r '/data/local/tmp/x;reboot'".to_string()]
        );
    }

    #[test]
    fn preconditions_report_the_first_unmet() {
        let lines = vec!["/data/app/x".to_string()];
        let mut gate = CleanupPreconditions {
            bridge_active: false,
            root_confirmed: false,
            user_confirmed: false,
            lines: &lines,
        };
        assert_eq!(gate.check("t").unwrap_err().error, "ADB is not active. Start ADB first.");
        gate.bridge_active = true;
        assert_eq!(gate.check("t").unwrap_err().error, "Root Access Required");
        gate.root_confirmed = true;
        assert_eq!(gate.check("t").unwrap_err().error, "File removal canceled by user.");
        gate.user_confirmed = true;
        assert!(gate.check("t").is_ok());

        let blank = vec!["  ".to_string()];
        gate.lines = &blank;
        let err = gate.check("t").unwrap_err();
        assert_eq!(err.code, "ERR_PRECONDITION");
        assert_eq!(err.error, "The selected file is empty.");
    }

    #[test]
    fn reads_lists_from_disk() {
        let dir = TempDir::new().expect("tempdir");
        let list = dir.path().join("paths.txt");
        fs::write(&list, "/system/app/Foo\n/data/app/Bar\n").expect("write");
        assert_eq!(read_path_list(&list, "t").expect("read").len(), 2);

        let empty = dir.path().join("empty.txt");
        fs::write(&empty, "").expect("write");
        assert!(read_path_list(&empty, "t").expect("read").is_empty());

        let missing = dir.path().join("missing.txt");
        assert_eq!(read_path_list(&missing, "t").unwrap_err().code, "ERR_SYSTEM");
    }
}
