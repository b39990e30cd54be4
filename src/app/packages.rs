use tracing::info;

use crate::app::adb::apps::classify_packages;
use crate::app::adb::runner::{device_args, Bridge};
use crate::app::config::UninstallSettings;
use crate::app::error::{AppError, BatchDisposition};
use crate::app::models::{PackageEntry, SelectedDevice, UninstallReport};

/// Full, disabled-only and system-only listings merged into one snapshot.
///
/// The three queries are independent; if any of them fails the whole fetch fails and no
/// partial snapshot is produced.
pub fn fetch_packages(
    bridge: &Bridge,
    device: &SelectedDevice,
    trace_id: &str,
) -> Result<Vec<PackageEntry>, AppError> {
    let query = |filter: Option<&str>| {
        let mut rest = vec!["shell", "pm", "list", "packages"];
        rest.extend(filter);
        bridge.run(&device_args(&device.serial, &rest), trace_id)
    };

    let all = query(None);
    let disabled = query(Some("-d"));
    let system = query(Some("-s"));

    match (all, disabled, system) {
        (Ok(all), Ok(disabled), Ok(system)) => {
            let entries = classify_packages(&all.stdout, &disabled.stdout, &system.stdout);
            info!(trace_id = %trace_id, serial = %device.serial, count = entries.len(), "packages fetched");
            Ok(entries)
        }
        _ => Err(AppError::partial_data(
            "Error fetching package lists.",
            trace_id,
        )),
    }
}

/// Java-style package names only; anything else would be re-parsed by the device shell.
fn is_package_name(name: &str) -> bool {
    name.split('.').all(|segment| {
        !segment.is_empty()
            && segment
                .chars()
                .all(|ch| ch.is_ascii_alphanumeric() || ch == '_')
    })
}

/// `pm uninstall [-k] --user <id> <package>`; success is decided by the exit code only.
pub fn uninstall_package(
    bridge: &Bridge,
    device: &SelectedDevice,
    package_name: &str,
    settings: &UninstallSettings,
    trace_id: &str,
) -> Result<(), AppError> {
    let package_name = package_name.trim();
    if package_name.is_empty() {
        return Err(AppError::validation("package name is required", trace_id));
    }
    if !is_package_name(package_name) {
        return Err(AppError::validation(
            format!("invalid package name: {package_name}"),
            trace_id,
        ));
    }
    let user_id = settings.user_id.to_string();
    let mut rest = vec!["shell", "pm", "uninstall"];
    if settings.keep_data {
        rest.push("-k");
    }
    rest.extend(["--user", user_id.as_str(), package_name]);
    bridge.run(&device_args(&device.serial, &rest), trace_id).map(|_| ())
}

/// Uninstalls `packages` strictly in order. Item failures are logged and skipped; failures
/// that concern the whole batch stop it.
pub fn uninstall_batch(
    bridge: &Bridge,
    device: &SelectedDevice,
    packages: &[String],
    settings: &UninstallSettings,
    trace_id: &str,
) -> UninstallReport {
    let log = bridge.log();
    let mut report = UninstallReport::default();
    for package_name in packages {
        log.log(format!("Debloating {package_name}..."));
        match uninstall_package(bridge, device, package_name, settings, trace_id) {
            Ok(()) => {
                log.log(format!("Successfully debloated: {package_name}"));
                report.removed.push(package_name.clone());
            }
            Err(err) => {
                log.log(format!("Failed to debloat {package_name}: {}", err.error));
                if err.batch_disposition() == BatchDisposition::AbortBatch {
                    report.aborted = Some(err.error);
                    break;
                }
                report.failed.push((package_name.clone(), err.error));
            }
        }
    }
    report
}
