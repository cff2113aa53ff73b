//! Device and connection profiling from request metadata.
//!
//! Profiles are derived once per request from the user-agent string and
//! client hint headers (`Device-Memory`, `Save-Data`, `ECT`, `Downlink`,
//! `RTT`) and have no lifecycle beyond the request. Malformed hint values
//! read as absent.

use crate::types::RequestMeta;
use serde::{Deserialize, Serialize};

/// Coarse device class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceClass {
    Mobile,
    Tablet,
    Desktop,
}

impl DeviceClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceClass::Mobile => "mobile",
            DeviceClass::Tablet => "tablet",
            DeviceClass::Desktop => "desktop",
        }
    }
}

/// Per-request device profile.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DeviceProfile {
    /// Coarse device class.
    pub class: DeviceClass,
    /// Whether the browser can decode modern image formats (WebP/AVIF).
    pub supports_modern_images: bool,
    /// Whether the device asked for reduced data or reports low memory.
    pub low_end: bool,
}

impl DeviceProfile {
    /// Derive a profile from the request's identification string and hints.
    pub fn detect(meta: &RequestMeta) -> Self {
        let ua = meta.user_agent().unwrap_or("").to_lowercase();

        let class = if ua.contains("ipad")
            || ua.contains("tablet")
            || (ua.contains("android") && !ua.contains("mobile"))
        {
            DeviceClass::Tablet
        } else if ua.contains("mobi") || ua.contains("iphone") || ua.contains("android") {
            DeviceClass::Mobile
        } else {
            DeviceClass::Desktop
        };

        // Engines that have shipped WebP for years; IE is the notable holdout.
        let supports_modern_images = (ua.contains("chrome")
            || ua.contains("chromium")
            || ua.contains("edg")
            || ua.contains("firefox")
            || ua.contains("opr"))
            && !ua.contains("trident")
            && !ua.contains("msie");

        let low_memory = meta
            .header("device-memory")
            .and_then(|v| v.trim().parse::<f64>().ok())
            .is_some_and(|gb| gb <= 2.0);
        let save_data = meta
            .header("save-data")
            .is_some_and(|v| v.eq_ignore_ascii_case("on"));

        Self {
            class,
            supports_modern_images,
            low_end: low_memory || save_data,
        }
    }

    pub fn is_mobile(&self) -> bool {
        self.class == DeviceClass::Mobile
    }
}

/// Coarse connection quality class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionClass {
    Fast,
    Medium,
    Slow,
    Unknown,
}

impl ConnectionClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionClass::Fast => "fast",
            ConnectionClass::Medium => "medium",
            ConnectionClass::Slow => "slow",
            ConnectionClass::Unknown => "unknown",
        }
    }
}

/// Per-request connection profile.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ConnectionProfile {
    pub class: ConnectionClass,
}

impl ConnectionProfile {
    /// Derive a profile from network-quality hints, in order of preference:
    /// effective type, downlink bandwidth, round-trip time.
    pub fn detect(meta: &RequestMeta) -> Self {
        let class = if let Some(ect) = meta.header("ect") {
            match ect.trim() {
                "slow-2g" | "2g" => ConnectionClass::Slow,
                "3g" => ConnectionClass::Medium,
                "4g" => ConnectionClass::Fast,
                _ => Self::from_secondary_hints(meta),
            }
        } else {
            Self::from_secondary_hints(meta)
        };

        Self { class }
    }

    fn from_secondary_hints(meta: &RequestMeta) -> ConnectionClass {
        if let Some(downlink) = meta
            .header("downlink")
            .and_then(|v| v.trim().parse::<f64>().ok())
        {
            return if downlink < 1.0 {
                ConnectionClass::Slow
            } else if downlink < 5.0 {
                ConnectionClass::Medium
            } else {
                ConnectionClass::Fast
            };
        }

        if let Some(rtt) = meta.header("rtt").and_then(|v| v.trim().parse::<u64>().ok()) {
            return if rtt > 500 {
                ConnectionClass::Slow
            } else if rtt > 150 {
                ConnectionClass::Medium
            } else {
                ConnectionClass::Fast
            };
        }

        ConnectionClass::Unknown
    }

    pub fn is_slow(&self) -> bool {
        self.class == ConnectionClass::Slow
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const IPHONE_UA: &str =
        "Mozilla/5.0 (iPhone; CPU iPhone OS 17_0 like Mac OS X) AppleWebKit/605.1.15 \
         (KHTML, like Gecko) Version/17.0 Mobile/15E148 Safari/604.1";
    const DESKTOP_UA: &str =
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) \
         Chrome/120.0.0.0 Safari/537.36";

    #[test]
    fn test_device_classes() {
        let mobile = RequestMeta::get("/").with_header("user-agent", IPHONE_UA);
        assert_eq!(DeviceProfile::detect(&mobile).class, DeviceClass::Mobile);

        let tablet = RequestMeta::get("/").with_header(
            "user-agent",
            "Mozilla/5.0 (iPad; CPU OS 17_0 like Mac OS X) AppleWebKit/605.1.15",
        );
        assert_eq!(DeviceProfile::detect(&tablet).class, DeviceClass::Tablet);

        let android_tablet = RequestMeta::get("/").with_header(
            "user-agent",
            "Mozilla/5.0 (Linux; Android 13; SM-X710) AppleWebKit/537.36 Chrome/120.0.0.0",
        );
        assert_eq!(
            DeviceProfile::detect(&android_tablet).class,
            DeviceClass::Tablet
        );

        let desktop = RequestMeta::get("/").with_header("user-agent", DESKTOP_UA);
        assert_eq!(DeviceProfile::detect(&desktop).class, DeviceClass::Desktop);
    }

    #[test]
    fn test_modern_image_support() {
        let chrome = RequestMeta::get("/").with_header("user-agent", DESKTOP_UA);
        assert!(DeviceProfile::detect(&chrome).supports_modern_images);

        let ie = RequestMeta::get("/").with_header(
            "user-agent",
            "Mozilla/5.0 (Windows NT 6.1; Trident/7.0; rv:11.0) like Gecko",
        );
        assert!(!DeviceProfile::detect(&ie).supports_modern_images);
    }

    #[test]
    fn test_low_end_hints() {
        let low_mem = RequestMeta::get("/")
            .with_header("user-agent", DESKTOP_UA)
            .with_header("device-memory", "1");
        assert!(DeviceProfile::detect(&low_mem).low_end);

        let save_data = RequestMeta::get("/")
            .with_header("user-agent", IPHONE_UA)
            .with_header("save-data", "on");
        assert!(DeviceProfile::detect(&save_data).low_end);

        let malformed = RequestMeta::get("/")
            .with_header("user-agent", DESKTOP_UA)
            .with_header("device-memory", "lots");
        assert!(!DeviceProfile::detect(&malformed).low_end);
    }

    #[test]
    fn test_connection_from_effective_type() {
        for (ect, expected) in [
            ("slow-2g", ConnectionClass::Slow),
            ("2g", ConnectionClass::Slow),
            ("3g", ConnectionClass::Medium),
            ("4g", ConnectionClass::Fast),
        ] {
            let meta = RequestMeta::get("/").with_header("ect", ect);
            assert_eq!(ConnectionProfile::detect(&meta).class, expected);
        }
    }

    #[test]
    fn test_connection_from_downlink_and_rtt() {
        let slow = RequestMeta::get("/").with_header("downlink", "0.4");
        assert!(ConnectionProfile::detect(&slow).is_slow());

        let medium = RequestMeta::get("/").with_header("downlink", "2.5");
        assert_eq!(
            ConnectionProfile::detect(&medium).class,
            ConnectionClass::Medium
        );

        let high_rtt = RequestMeta::get("/").with_header("rtt", "800");
        assert!(ConnectionProfile::detect(&high_rtt).is_slow());
    }

    #[test]
    fn test_connection_unknown_without_hints() {
        let meta = RequestMeta::get("/");
        assert_eq!(
            ConnectionProfile::detect(&meta).class,
            ConnectionClass::Unknown
        );

        let malformed = RequestMeta::get("/").with_header("downlink", "fast");
        assert_eq!(
            ConnectionProfile::detect(&malformed).class,
            ConnectionClass::Unknown
        );
    }
}
