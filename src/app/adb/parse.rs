pub const DEVICE_LABEL_SEPARATOR: &str = " - ";
pub const UNKNOWN_MODEL: &str = "unknown";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceLine {
    pub serial: String,
    pub state: String,
}

impl DeviceLine {
    pub fn is_unauthorized(&self) -> bool {
        self.state == "unauthorized"
    }
}

/// Parses `adb devices`. The `List of devices attached` header and daemon chatter lines
/// (`* daemon started ...`) are skipped; every other line is `<serial>\t<state>`.
pub fn parse_adb_devices(output: &str) -> Vec<DeviceLine> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter(|line| !line.starts_with('*'))
        .filter(|line| !line.to_lowercase().starts_with("list of devices"))
        .filter_map(|line| {
            let mut tokens = line.split_whitespace();
            let serial = tokens.next()?;
            let state = tokens.next()?;
            Some(DeviceLine {
                serial: serial.to_string(),
                state: state.to_string(),
            })
        })
        .collect()
}

/// Value printed by `getprop <key>`: the first non-empty line.
pub fn parse_getprop_value(output: &str) -> Option<String> {
    output
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(str::to_string)
}

pub fn format_device_label(model: &str, serial: &str) -> String {
    format!("{model}{DEVICE_LABEL_SEPARATOR}{serial}")
}

/// Recovers `(model, serial)` from a label. Splits on the last separator so models that
/// contain `" - "` themselves survive the round trip.
pub fn split_device_label(label: &str) -> Option<(String, String)> {
    let (model, serial) = label.rsplit_once(DEVICE_LABEL_SEPARATOR)?;
    if serial.trim().is_empty() {
        return None;
    }
    Some((model.to_string(), serial.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_adb_devices_output() {
        let output = "List of devices attached\nABC123\tdevice\nemulator-5554\tunauthorized\n\n";
        let parsed = parse_adb_devices(output);
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0].serial, "ABC123");
        assert_eq!(parsed[0].state, "device");
        assert!(!parsed[0].is_unauthorized());
        assert!(parsed[1].is_unauthorized());
    }

    #[test]
    fn skips_daemon_chatter_and_header() {
        let output = "* daemon not running; starting now at tcp:5037\n* daemon started successfully\nList of devices attached\n";
        assert!(parse_adb_devices(output).is_empty());
    }

    #[test]
    fn getprop_value_is_first_non_empty_line() {
        assert_eq!(parse_getprop_value("\nPixel 5\r\n").as_deref(), Some("Pixel 5"));
        assert_eq!(parse_getprop_value("  \n"), None);
    }

    #[test]
    fn label_round_trips_through_last_separator() {
        let label = format_device_label("Pixel 5", "ABC123");
        assert_eq!(label, "Pixel 5 - ABC123");
        assert_eq!(
            split_device_label(&label),
            Some(("Pixel 5".to_string(), "ABC123".to_string()))
        );

        let tricky = format_device_label("Galaxy - Tab - S9", "R58N");
        assert_eq!(
            split_device_label(&tricky),
            Some(("Galaxy - Tab - S9".to_string(), "R58N".to_string()))
        );
    }

    #[test]
    fn label_without_separator_is_rejected() {
        assert_eq!(split_device_label("ABC123"), None);
        assert_eq!(split_device_label(""), None);
    }
}
