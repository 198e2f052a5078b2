//! The fixed device table
//!
//! Every preview frame is sized from one of these descriptors. The table is
//! static and ordered: render order always follows table order, whatever order
//! devices were toggled in.

use serde::Serialize;

/// Broad device class, used for grouping and grid sizing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceCategory {
    Mobile,
    Tablet,
    Laptop,
    Desktop,
    Special,
}

/// Icon drawn next to a device name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceIcon {
    Phone,
    Tablet,
    Laptop,
    Desktop,
    Responsive,
    Devices,
}

impl DeviceIcon {
    /// SVG path data for a 24x24 stroked icon
    pub fn path(self) -> &'static str {
        match self {
            DeviceIcon::Phone => "M12 2a3 3 0 0 0-3 3v14a3 3 0 0 0 3 3h0a3 3 0 0 0 3-3V5a3 3 0 0 0-3-3Z M12 18h.01",
            DeviceIcon::Tablet => "M18 2H6a2 2 0 0 0-2 2v16a2 2 0 0 0 2 2h12a2 2 0 0 0 2-2V4a2 2 0 0 0-2-2Z M12 18h.01",
            DeviceIcon::Laptop => "M2 5a2 2 0 0 1 2-2h16a2 2 0 0 1 2 2v10a2 2 0 0 1-2 2H4a2 2 0 0 1-2-2V5Z M2 17h20",
            DeviceIcon::Desktop => "M2 5a2 2 0 0 1 2-2h16a2 2 0 0 1 2 2v10a2 2 0 0 1-2 2H4a2 2 0 0 1-2-2V5Z M8 21h8 M12 17v4",
            DeviceIcon::Responsive => "M4 4h16v16H4z M9 4v16 M15 4v16 M4 9h16 M4 15h16",
            DeviceIcon::Devices => "M2 12h20M12 2a15.3 15.3 0 0 1 4 10 15.3 15.3 0 0 1-4 10 15.3 15.3 0 0 1-4-10 15.3 15.3 0 0 1 4-10z M2 7h20 M2 17h20",
        }
    }
}

/// Error icon path used by the blocked-frame overlay
pub const ERROR_ICON_PATH: &str = "M12 8v4 M12 16h.01 M22 12A10 10 0 1 1 12 2a10 10 0 0 1 10 10Z";

/// Nominal viewport size in logical pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

/// A named device viewport
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceSpec {
    pub id: &'static str,
    pub name: &'static str,
    /// Absent for the special preset entries
    pub dimensions: Option<Dimensions>,
    pub category: DeviceCategory,
    pub icon: DeviceIcon,
    /// Member of the "All Devices" preset
    pub show_in_all: bool,
}

impl DeviceSpec {
    /// Laptops and desktops may span two grid columns
    pub fn is_large(&self) -> bool {
        matches!(
            self.category,
            DeviceCategory::Laptop | DeviceCategory::Desktop
        )
    }

    /// Toggle tooltip, e.g. `iPhone SE (375×667)`
    pub fn label(&self) -> String {
        match self.dimensions {
            Some(d) => format!("{} ({}×{})", self.name, d.width, d.height),
            None => self.name.to_string(),
        }
    }
}

/// Identifier of the special entry that selects the "All Devices" preset
pub const ALL_DEVICES_ID: &str = "all";

const fn sized(
    id: &'static str,
    name: &'static str,
    width: u32,
    height: u32,
    category: DeviceCategory,
    icon: DeviceIcon,
    show_in_all: bool,
) -> DeviceSpec {
    DeviceSpec {
        id,
        name,
        dimensions: Some(Dimensions { width, height }),
        category,
        icon,
        show_in_all,
    }
}

use DeviceCategory::{Desktop, Laptop, Mobile, Special, Tablet};

/// The device table, in display order
pub static DEVICES: &[DeviceSpec] = &[
    DeviceSpec {
        id: ALL_DEVICES_ID,
        name: "All Devices",
        dimensions: None,
        category: Special,
        icon: DeviceIcon::Devices,
        show_in_all: false,
    },
    sized("responsive", "Responsive", 1200, 800, Special, DeviceIcon::Responsive, false),
    // Mobile
    sized("galaxy-fold", "Galaxy Fold", 280, 653, Mobile, DeviceIcon::Phone, true),
    sized("galaxy-s8", "Galaxy S8+", 360, 740, Mobile, DeviceIcon::Phone, false),
    sized("iphone-13-mini", "iPhone 13 Mini", 360, 780, Mobile, DeviceIcon::Phone, false),
    sized("iphone-se", "iPhone SE", 375, 667, Mobile, DeviceIcon::Phone, true),
    sized("iphone-14", "iPhone 14", 393, 852, Mobile, DeviceIcon::Phone, false),
    sized("pixel-7", "Pixel 7", 412, 915, Mobile, DeviceIcon::Phone, false),
    sized("samsung-s23-ultra", "Samsung S23 Ultra", 412, 919, Mobile, DeviceIcon::Phone, false),
    sized("iphone-14-pro-max", "iPhone 14 Pro Max", 430, 932, Mobile, DeviceIcon::Phone, true),
    sized("galaxy-z-fold", "Galaxy Z Fold", 373, 904, Mobile, DeviceIcon::Phone, false),
    // Tablets
    sized("ipad-mini", "iPad Mini", 768, 1024, Tablet, DeviceIcon::Tablet, true),
    sized("ipad-air", "iPad Air", 820, 1180, Tablet, DeviceIcon::Tablet, false),
    sized("ipad-10th", "iPad 10th Gen", 810, 1080, Tablet, DeviceIcon::Tablet, false),
    sized("ipad-pro-11", "iPad Pro 11\"", 834, 1194, Tablet, DeviceIcon::Tablet, false),
    sized("galaxy-tab-s9", "Galaxy Tab S9", 800, 1280, Tablet, DeviceIcon::Tablet, false),
    sized("ipad-pro-12", "iPad Pro 12.9\"", 1024, 1366, Tablet, DeviceIcon::Tablet, true),
    sized("surface-pro-9", "Surface Pro 9", 1440, 960, Tablet, DeviceIcon::Tablet, false),
    // Laptops
    sized("netbook", "Netbook", 1024, 600, Laptop, DeviceIcon::Laptop, false),
    sized("macbook-air-13", "MacBook Air 13\"", 1280, 832, Laptop, DeviceIcon::Laptop, true),
    sized("chromebook", "Chromebook", 1366, 768, Laptop, DeviceIcon::Laptop, false),
    sized("macbook-pro-14", "MacBook Pro 14\"", 1512, 982, Laptop, DeviceIcon::Laptop, false),
    sized("macbook-pro-16", "MacBook Pro 16\"", 1728, 1117, Laptop, DeviceIcon::Laptop, false),
    // Desktops
    sized("desktop-hd", "Desktop HD", 1920, 1080, Desktop, DeviceIcon::Desktop, true),
    sized("monitor-qhd", "QHD Monitor", 2560, 1440, Desktop, DeviceIcon::Desktop, false),
    sized(
        "monitor-ultrawide",
        "UltraWide Monitor",
        3440,
        1440,
        Desktop,
        DeviceIcon::Desktop,
        false,
    ),
    sized("monitor-4k", "4K Pro Display", 3840, 2160, Desktop, DeviceIcon::Desktop, false),
];

/// Look up a device by identifier
pub fn find(id: &str) -> Option<&'static DeviceSpec> {
    DEVICES.iter().find(|d| d.id == id)
}

/// Position of a device in the table
pub fn position(id: &str) -> Option<usize> {
    DEVICES.iter().position(|d| d.id == id)
}

/// Devices that can actually be rendered (they carry dimensions)
pub fn renderable() -> impl Iterator<Item = &'static DeviceSpec> {
    DEVICES.iter().filter(|d| d.dimensions.is_some())
}

/// Identifiers of the "All Devices" preset, in table order
pub fn all_devices_preset() -> Vec<&'static str> {
    DEVICES
        .iter()
        .filter(|d| d.show_in_all)
        .map(|d| d.id)
        .collect()
}
