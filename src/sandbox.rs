//! Sandbox flags for preview frames

use std::collections::BTreeSet;

/// Individual sandbox permission
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SandboxFlag {
    AllowScripts,
    AllowSameOrigin,
    AllowForms,
    AllowModals,
    AllowPopups,
    AllowTopNavigation,
    AllowDownloads,
}

impl SandboxFlag {
    pub fn token(self) -> &'static str {
        match self {
            SandboxFlag::AllowScripts => "allow-scripts",
            SandboxFlag::AllowSameOrigin => "allow-same-origin",
            SandboxFlag::AllowForms => "allow-forms",
            SandboxFlag::AllowModals => "allow-modals",
            SandboxFlag::AllowPopups => "allow-popups",
            SandboxFlag::AllowTopNavigation => "allow-top-navigation",
            SandboxFlag::AllowDownloads => "allow-downloads",
        }
    }

    fn parse(token: &str) -> Option<Self> {
        Some(match token.to_ascii_lowercase().as_str() {
            "allow-scripts" => SandboxFlag::AllowScripts,
            "allow-same-origin" => SandboxFlag::AllowSameOrigin,
            "allow-forms" => SandboxFlag::AllowForms,
            "allow-modals" => SandboxFlag::AllowModals,
            "allow-popups" => SandboxFlag::AllowPopups,
            "allow-top-navigation" => SandboxFlag::AllowTopNavigation,
            "allow-downloads" => SandboxFlag::AllowDownloads,
            _ => return None,
        })
    }
}

/// Set of permissions granted to an embedded frame (empty = fully restricted)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SandboxFlags {
    flags: BTreeSet<SandboxFlag>,
}

impl SandboxFlags {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scripts, same-origin treatment and form submission; nothing that can
    /// navigate away from or escape the preview.
    pub fn preview() -> Self {
        [
            SandboxFlag::AllowScripts,
            SandboxFlag::AllowSameOrigin,
            SandboxFlag::AllowForms,
        ]
        .into_iter()
        .collect()
    }

    /// Parse a `sandbox` attribute value; unknown tokens are ignored
    pub fn parse(attribute: &str) -> Self {
        attribute
            .split_whitespace()
            .filter_map(SandboxFlag::parse)
            .collect()
    }

    pub fn has(&self, flag: SandboxFlag) -> bool {
        self.flags.contains(&flag)
    }

    pub fn allows_scripts(&self) -> bool {
        self.has(SandboxFlag::AllowScripts)
    }

    pub fn allows_same_origin(&self) -> bool {
        self.has(SandboxFlag::AllowSameOrigin)
    }

    pub fn allows_forms(&self) -> bool {
        self.has(SandboxFlag::AllowForms)
    }

    /// Attribute value in a stable order
    pub fn serialize(&self) -> String {
        self.flags
            .iter()
            .map(|f| f.token())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl FromIterator<SandboxFlag> for SandboxFlags {
    fn from_iter<I: IntoIterator<Item = SandboxFlag>>(iter: I) -> Self {
        Self {
            flags: iter.into_iter().collect(),
        }
    }
}
