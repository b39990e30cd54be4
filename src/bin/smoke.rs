use std::sync::Arc;
use std::time::Instant;

use android_debloater_lib::app::adb::locator::{
    executable_dir, resolve_adb_program, validate_adb_program,
};
use android_debloater_lib::app::adb::runner::{AdbExecutor, Bridge};
use android_debloater_lib::app::config::load_config;
use android_debloater_lib::app::device::{
    authorization_warning, discover, probe_root, start_server,
};
use android_debloater_lib::app::error::AppError;
use android_debloater_lib::app::logging::ActivityLog;
use android_debloater_lib::app::models::{DiscoveryOutcome, PackageStatus, SelectedDevice};
use android_debloater_lib::app::packages::fetch_packages;
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone)]
struct Args {
    serial: Option<String>,
    json: bool,
}

#[derive(Serialize)]
struct SmokeSummary {
    tool: &'static str,
    status: &'static str,
    trace_id: String,
    serial: Option<String>,
    adb_program: String,
    checks: Vec<SmokeCheck>,
}

#[derive(Serialize)]
struct SmokeCheck {
    name: &'static str,
    status: &'static str, // pass|fail|warn|skip
    duration_ms: u128,
    #[serde(skip_serializing_if = "Option::is_none")]
    detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

fn parse_args() -> Result<Args, String> {
    let mut serial = std::env::var("ANDROID_SERIAL")
        .ok()
        .filter(|s| !s.trim().is_empty());
    let mut json = false;

    let mut it = std::env::args().skip(1);
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--serial" => {
                serial = it
                    .next()
                    .map(|v| v.trim().to_string())
                    .filter(|v| !v.is_empty());
                if serial.is_none() {
                    return Err("--serial requires a value".to_string());
                }
            }
            "--json" => {
                json = true;
            }
            "-h" | "--help" => {
                return Err("Usage: cargo run --bin smoke -- [--serial SERIAL] [--json]\n".to_string());
            }
            other => return Err(format!("Unknown arg: {other}")),
        }
    }

    Ok(Args { serial, json })
}

/// Runs one check and records it; the optional string becomes the check's detail.
fn run_check<T, F>(checks: &mut Vec<SmokeCheck>, name: &'static str, f: F) -> Option<T>
where
    F: FnOnce() -> Result<(T, Option<String>), (String, String)>,
{
    let start = Instant::now();
    match f() {
        Ok((value, detail)) => {
            checks.push(SmokeCheck {
                name,
                status: "pass",
                duration_ms: start.elapsed().as_millis(),
                detail,
                error_code: None,
                error: None,
            });
            Some(value)
        }
        Err((code, err)) => {
            checks.push(SmokeCheck {
                name,
                status: "fail",
                duration_ms: start.elapsed().as_millis(),
                detail: None,
                error_code: Some(code),
                error: Some(err),
            });
            None
        }
    }
}

fn skip(checks: &mut Vec<SmokeCheck>, name: &'static str) {
    checks.push(SmokeCheck {
        name,
        status: "skip",
        duration_ms: 0,
        detail: None,
        error_code: None,
        error: None,
    });
}

fn main() {
    let args = match parse_args() {
        Ok(v) => v,
        Err(msg) => {
            eprintln!("{msg}");
            std::process::exit(2);
        }
    };

    let trace_id = Uuid::new_v4().to_string();
    let mut checks: Vec<SmokeCheck> = Vec::new();

    let config = run_check(&mut checks, "load_config", || {
        load_config(&trace_id)
            .map(|config| (config, None))
            .map_err(|err| (err.code, err.error))
    })
    .unwrap_or_default();
    let adb_program = resolve_adb_program(&config.adb.command_path, executable_dir().as_deref());
    let bridge = Bridge::new(
        Arc::new(AdbExecutor::new(adb_program.clone(), config.command_timeout())),
        ActivityLog::new(),
    );

    let mut serial = args.serial.clone();
    let ready = run_check(&mut checks, "check_adb", || {
        validate_adb_program(&adb_program, &trace_id).map_err(|err| (err.code, err.error))?;
        start_server(&bridge, &trace_id)
            .map(|_| ((), None))
            .map_err(|err| (err.code, err.error))
    })
    .is_some();

    let device = if ready {
        run_check(&mut checks, "discover", || {
            match discover(&bridge, &trace_id).map_err(|err| (err.code, err.error))? {
                DiscoveryOutcome::AuthorizationRequired { serial } => {
                    let err = AppError::authorization(authorization_warning(&serial), &trace_id);
                    Err((err.code, err.error))
                }
                DiscoveryOutcome::Devices(devices) => {
                    let found = match serial.as_deref() {
                        Some(wanted) => devices.into_iter().find(|d| d.serial == wanted),
                        None if devices.len() == 1 => devices.into_iter().next(),
                        None => {
                            return Err((
                                "ERR_PICK_DEVICE".to_string(),
                                format!(
                                    "expected exactly one device, found {}; pass --serial",
                                    devices.len()
                                ),
                            ))
                        }
                    };
                    let device = found.ok_or_else(|| {
                        ("ERR_PICK_DEVICE".to_string(), "device not attached".to_string())
                    })?;
                    let label = device.label();
                    Ok((
                        SelectedDevice {
                            serial: device.serial,
                            model: device.model,
                        },
                        Some(label),
                    ))
                }
            }
        })
    } else {
        skip(&mut checks, "discover");
        None
    };

    match device {
        Some(device) => {
            serial = Some(device.serial.clone());
            run_check(&mut checks, "fetch_packages", || {
                let packages = fetch_packages(&bridge, &device, &trace_id)
                    .map_err(|err| (err.code, err.error))?;
                let disabled = packages
                    .iter()
                    .filter(|p| p.status == PackageStatus::Disabled)
                    .count();
                Ok((
                    (),
                    Some(format!("{} packages, {disabled} disabled", packages.len())),
                ))
            });
            let rooted = probe_root(&bridge, &device.serial, &trace_id);
            checks.push(SmokeCheck {
                name: "probe_root",
                status: if rooted { "pass" } else { "warn" },
                duration_ms: 0,
                detail: Some(if rooted { "root available" } else { "no root access" }.to_string()),
                error_code: None,
                error: None,
            });
        }
        None => {
            skip(&mut checks, "fetch_packages");
            skip(&mut checks, "probe_root");
        }
    }

    let status = if checks.iter().any(|check| check.status == "fail") {
        "fail"
    } else {
        "pass"
    };
    let summary = SmokeSummary {
        tool: "android_debloater_smoke",
        status,
        trace_id,
        serial,
        adb_program,
        checks,
    };

    let output = if args.json {
        serde_json::to_string_pretty(&summary).unwrap_or_else(|_| "{}".to_string())
    } else {
        let mut text = format!("status: {}\ntrace_id: {}\n", summary.status, summary.trace_id);
        for check in &summary.checks {
            text.push_str(&format!(
                "  {:<16} {:<5} {}\n",
                check.name,
                check.status,
                check
                    .detail
                    .as_deref()
                    .or(check.error.as_deref())
                    .unwrap_or("")
            ));
        }
        text
    };

    println!("{output}");
    if summary.status != "pass" {
        std::process::exit(1);
    }
}
