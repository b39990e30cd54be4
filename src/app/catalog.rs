//! Built-in groups of packages that are commonly removed together.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PackageGroup {
    pub name: &'static str,
    pub packages: &'static [&'static str],
}

pub const DEFAULT_GROUPS: &[PackageGroup] = &[
    PackageGroup {
        name: "vestel",
        packages: &[
            "com.vestel.vestelanalyticservice",
            "com.vestel.customeragreement",
            "com.dewav.dwgesture",
            "com.vestel.vmarket",
            "com.vestel.cloud",
            "com.assistant.icontrol",
            "com.mxtech.videoplayer.ad",
            "com.mxtech.ffmpeg.v7_vfpv3d16",
        ],
    },
    PackageGroup {
        name: "gapps",
        packages: &[
            "com.android.chrome",
            "com.google.android.googlequicksearchbox",
            "com.google.android.marvin.talkback",
            "com.google.android.apps.tachyon",
            "com.google.android.music",
            "com.google.android.tag",
            "com.google.android.videos",
            "com.google.android.calendar",
            "com.google.android.talk",
        ],
    },
    PackageGroup {
        name: "vendor",
        packages: &[
            "com.android.email",
            "com.android.stk",
            "com.example",
            "com.android.exchange",
        ],
    },
    PackageGroup {
        name: "facebook",
        packages: &[
            "com.facebook.katana",
            "com.facebook.appmanager",
            "com.facebook.services",
            "com.facebook.system",
        ],
    },
    PackageGroup {
        name: "netflix",
        packages: &["com.netflix.mediaclient", "com.netflix.partner.activation"],
    },
    PackageGroup {
        name: "microsoft",
        packages: &[
            "com.swiftkey.swiftkeyconfigurator",
            "com.swiftkey.languageprovider",
            "com.touchtype.swiftkey",
            "com.microsoft.office.outlook",
            "com.microsoft.appmanager",
            "com.microsoft.skydrive",
            "com.microsoft.office.powerpoint",
            "com.microsoft.office.excel",
            "com.microsoft.office.word",
            "com.microsoft.office.officehubrow",
            "com.skype.raider",
        ],
    },
    PackageGroup {
        name: "bixby",
        packages: &[
            "com.samsung.android.bixby.wakeup",
            "com.samsung.android.bixby.service",
            "com.samsung.android.visionintelligence",
            "com.samsung.android.bixby.agent",
            "com.samsung.android.bixby.agent.dummy",
            "com.samsung.android.bixbyvision.framework",
            "com.vlingo.midas",
        ],
    },
];

pub fn find_group(name: &str) -> Option<&'static PackageGroup> {
    let name = name.trim();
    DEFAULT_GROUPS
        .iter()
        .find(|group| group.name.eq_ignore_ascii_case(name))
}

/// `(group, package)` pairs where either side contains `query`, case-insensitively.
pub fn search(query: &str) -> Vec<(&'static str, &'static str)> {
    let query = query.trim().to_lowercase();
    DEFAULT_GROUPS
        .iter()
        .flat_map(|group| group.packages.iter().map(move |package| (group.name, *package)))
        .filter(|(group, package)| {
            query.is_empty() || group.contains(&query) || package.to_lowercase().contains(&query)
        })
        .collect()
}
