use std::sync::OnceLock;

use regex::Regex;

fn path_token_regex() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"/\S+").expect("static path pattern"))
}

/// Every `/`-rooted token in a free-form line, in order of appearance.
pub fn extract_path_tokens(line: &str) -> Vec<String> {
    path_token_regex()
        .find_iter(line)
        .map(|found| found.as_str().to_string())
        .collect()
}

pub fn is_under_partition(path: &str, partition: &str) -> bool {
    let partition = partition.trim_end_matches('/');
    path == partition
        || path
            .strip_prefix(partition)
            .map(|rest| rest.starts_with('/'))
            .unwrap_or(false)
}

pub fn references_partition<S: AsRef<str>>(lines: &[S], partition: &str) -> bool {
    lines.iter().any(|line| {
        extract_path_tokens(line.as_ref())
            .iter()
            .any(|path| is_under_partition(path, partition))
    })
}

/// `rm` on the device reports a missing target this way (toybox and busybox alike).
pub fn is_missing_path_error(stderr: &str) -> bool {
    stderr.to_lowercase().contains("no such file or directory")
}

pub fn validate_device_path(path: &str) -> Result<(), String> {
    let trimmed = path.trim();
    if trimmed.is_empty() {
        return Err("device path is empty".to_string());
    }
    if !trimmed.starts_with('/') {
        return Err("device path must be absolute".to_string());
    }
    if trimmed.contains('\0') {
        return Err("device path contains invalid characters".to_string());
    }
    if trimmed.trim_end_matches('/').is_empty() {
        return Err("refusing to remove the device root".to_string());
    }
    if trimmed.split('/').any(|segment| segment == "..") {
        return Err("device path must not contain '..' segments".to_string());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_paths_from_prose() {
        let tokens =
            extract_path_tokens("Remove this: /data/app/com.foo and also /system/app/com.bar");
        assert_eq!(tokens, vec!["/data/app/com.foo", "/system/app/com.bar"]);
    }

    #[test]
    fn line_without_paths_yields_nothing() {
        assert!(extract_path_tokens("just a comment\n").is_empty());
        assert_eq!(extract_path_tokens("/vendor/app/X\r\n"), vec!["/vendor/app/X"]);
    }

    #[test]
    fn partition_match_respects_segment_boundary() {
        assert!(is_under_partition("/system/app/Foo", "/system"));
        assert!(is_under_partition("/system", "/system/"));
        assert!(!is_under_partition("/system_ext/app/Foo", "/system"));
        assert!(!is_under_partition("/data/system/app", "/system"));
    }

    #[test]
    fn references_partition_scans_every_line() {
        let lines = vec!["/data/app/a".to_string(), "drop /system/priv-app/b".to_string()];
        assert!(references_partition(&lines, "/system"));
        assert!(!references_partition(&lines[..1], "/system"));
    }

    #[test]
    fn rejects_unsafe_paths() {
        assert!(validate_device_path("/").is_err());
        assert!(validate_device_path("//").is_err());
        assert!(validate_device_path("/sdcard/../system").is_err());
        assert!(validate_device_path("relative/path").is_err());
        assert!(validate_device_path("/system/app/Foo").is_ok());
    }

    #[test]
    fn recognizes_missing_target_message() {
        assert!(is_missing_path_error(
            "rm: /system/app/Foo: No such file or directory\n"
        ));
        assert!(!is_missing_path_error("rm: /system/app/Foo: Read-only file system"));
    }
}
