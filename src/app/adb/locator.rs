use std::path::{Path, PathBuf};

use crate::app::error::AppError;

pub const PATH_ADB: &str = "adb";

fn adb_file_name() -> &'static str {
    if cfg!(windows) {
        "adb.exe"
    } else {
        "adb"
    }
}

/// Strips surrounding whitespace and one pair of matching quotes, which users tend to paste
/// along with Windows paths.
pub fn normalize_command_path(value: &str) -> String {
    let trimmed = value.trim();
    for quote in ['"', '\''] {
        if let Some(inner) = trimmed
            .strip_prefix(quote)
            .and_then(|candidate| candidate.strip_suffix(quote))
        {
            return inner.trim().to_string();
        }
    }
    trimmed.to_string()
}

/// The copy shipped next to the executable under `assets/adb/`, if present.
pub fn bundled_adb(base_dir: &Path) -> Option<PathBuf> {
    let candidate = base_dir.join("assets").join("adb").join(adb_file_name());
    candidate.is_file().then_some(candidate)
}

/// Configured path first, then the bundled copy, then whatever `adb` PATH resolves to.
pub fn resolve_adb_program(configured: &str, base_dir: Option<&Path>) -> String {
    let normalized = normalize_command_path(configured);
    if !normalized.is_empty() {
        return normalized;
    }
    base_dir
        .and_then(bundled_adb)
        .map(|path| path.to_string_lossy().to_string())
        .unwrap_or_else(|| PATH_ADB.to_string())
}

pub fn validate_adb_program(program: &str, trace_id: &str) -> Result<(), AppError> {
    if program.trim().is_empty() {
        return Err(AppError::validation("ADB command is empty", trace_id));
    }
    if program == PATH_ADB {
        return Ok(());
    }
    let path = Path::new(program);
    if path.is_dir() {
        return Err(AppError::validation(
            "ADB path must point to an executable file",
            trace_id,
        ));
    }
    if !path.exists() {
        return Err(AppError::execution(
            format!("ADB executable not found at {program}"),
            trace_id,
        ));
    }
    Ok(())
}

pub fn executable_dir() -> Option<PathBuf> {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn strips_matching_quotes_only() {
        assert_eq!(
            normalize_command_path("  \"C:\\platform-tools\\adb.exe\"  "),
            "C:\\platform-tools\\adb.exe"
        );
        assert_eq!(normalize_command_path("'/opt/adb'"), "/opt/adb");
        assert_eq!(normalize_command_path("\"/opt/adb'"), "\"/opt/adb'");
    }

    #[test]
    fn configured_path_wins_over_bundled() {
        let tmp = TempDir::new().expect("tmp");
        let bundled = tmp.path().join("assets").join("adb");
        fs::create_dir_all(&bundled).expect("mkdir");
        fs::write(bundled.join(adb_file_name()), b"").expect("touch");

        assert_eq!(
            resolve_adb_program("/custom/adb", Some(tmp.path())),
            "/custom/adb"
        );
        let resolved = resolve_adb_program("", Some(tmp.path()));
        assert!(resolved.ends_with(adb_file_name()));
        assert!(resolved.contains("assets"));
    }

    #[test]
    fn falls_back_to_path_lookup() {
        let tmp = TempDir::new().expect("tmp");
        assert_eq!(resolve_adb_program("   ", Some(tmp.path())), PATH_ADB);
        assert_eq!(resolve_adb_program("", None), PATH_ADB);
    }

    #[test]
    fn missing_executable_is_an_execution_failure() {
        let err = validate_adb_program("/this/path/should/not/exist/adb", "t").unwrap_err();
        assert_eq!(err.code, "ERR_EXECUTION");
        assert!(validate_adb_program(PATH_ADB, "t").is_ok());
    }
}
