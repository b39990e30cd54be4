use std::collections::HashSet;

use crate::app::models::{PackageEntry, PackageOrigin, PackageStatus};

pub const PACKAGE_PREFIX: &str = "package:";

/// Package names from `pm list packages`, in output order.
pub fn parse_pm_list_packages_output(output: &str) -> Vec<String> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| line.strip_prefix(PACKAGE_PREFIX).unwrap_or(line).trim())
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect()
}

/// Classifies every package of the full listing by membership in the disabled and system
/// listings. Order follows `all`.
pub fn classify_packages(all: &str, disabled: &str, system: &str) -> Vec<PackageEntry> {
    let disabled: HashSet<String> = parse_pm_list_packages_output(disabled).into_iter().collect();
    let system: HashSet<String> = parse_pm_list_packages_output(system).into_iter().collect();

    parse_pm_list_packages_output(all)
        .into_iter()
        .map(|name| {
            let status = if disabled.contains(&name) {
                PackageStatus::Disabled
            } else {
                PackageStatus::Active
            };
            let origin = if system.contains(&name) {
                PackageOrigin::System
            } else {
                PackageOrigin::User
            };
            PackageEntry::new(name, status, origin)
        })
        .collect()
}

/// Case-insensitive substring match on the package name; an empty query keeps everything.
pub fn filter_packages<'a>(snapshot: &'a [PackageEntry], query: &str) -> Vec<&'a PackageEntry> {
    let query = query.trim().to_lowercase();
    snapshot
        .iter()
        .filter(|entry| query.is_empty() || entry.package_name.to_lowercase().contains(&query))
        .collect()
}

/// Drops every entry named `package_name`. Returns how many were removed.
pub fn remove_from_snapshot(snapshot: &mut Vec<PackageEntry>, package_name: &str) -> usize {
    let before = snapshot.len();
    snapshot.retain(|entry| entry.package_name != package_name);
    before - snapshot.len()
}
