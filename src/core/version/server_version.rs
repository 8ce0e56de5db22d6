// ─── Server Version ───
// Release versions understood by BuildTools (`1.8.8`, `1.16`, `1.20.5`).

use std::fmt;
use std::str::FromStr;

use crate::core::error::{ProvisionError, ProvisionResult};

/// A Minecraft release version as accepted by `--rev`.
///
/// The patch component is optional because early releases of a minor line
/// (`1.16`, `1.21`) are published without one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ServerVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: Option<u32>,
}

impl ServerVersion {
    pub fn parse(raw: &str) -> ProvisionResult<Self> {
        let trimmed = raw.trim();
        let invalid = || ProvisionError::InvalidVersion(raw.to_string());

        let mut parts = trimmed.split('.');
        let major = parse_component(parts.next()).ok_or_else(invalid)?;
        let minor = parse_component(parts.next()).ok_or_else(invalid)?;
        let patch = match parts.next() {
            Some(part) => Some(parse_component(Some(part)).ok_or_else(invalid)?),
            None => None,
        };

        if parts.next().is_some() {
            return Err(invalid());
        }

        Ok(Self {
            major,
            minor,
            patch,
        })
    }

    /// `true` when this version is `major.minor` or newer, patch ignored.
    pub fn is_at_least(&self, major: u32, minor: u32) -> bool {
        (self.major, self.minor) >= (major, minor)
    }

    /// Java major version the server (and BuildTools for it) needs.
    pub fn required_java_major(&self) -> u32 {
        let patch = self.patch.unwrap_or(0);
        if self.major > 1 || self.minor >= 21 || (self.minor == 20 && patch >= 5) {
            21
        } else if self.minor >= 17 {
            17
        } else {
            8
        }
    }
}

fn parse_component(part: Option<&str>) -> Option<u32> {
    let part = part?;
    if part.is_empty() || !part.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    // "01" and "1" would otherwise name the same version.
    if part.len() > 1 && part.starts_with('0') {
        return None;
    }
    part.parse().ok()
}

impl FromStr for ServerVersion {
    type Err = ProvisionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for ServerVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.patch {
            Some(patch) => write!(f, "{}.{}.{}", self.major, self.minor, patch),
            None => write!(f, "{}.{}", self.major, self.minor),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_two_and_three_component_versions() {
        let v = ServerVersion::parse("1.20.5").unwrap();
        assert_eq!((v.major, v.minor, v.patch), (1, 20, Some(5)));

        let v = ServerVersion::parse("1.16").unwrap();
        assert_eq!((v.major, v.minor, v.patch), (1, 16, None));
        assert_eq!(v.to_string(), "1.16");
    }

    #[test]
    fn rejects_malformed_versions() {
        for raw in ["", "1", "1.", "1.x", "1.20.5.1", "v1.20", "1.-2", "24w14a"] {
            let err = ServerVersion::parse(raw).unwrap_err();
            assert!(
                matches!(err, ProvisionError::InvalidVersion(_)),
                "{raw:?} should be rejected"
            );
        }
    }

    #[test]
    fn leading_zeros_are_rejected() {
        for raw in ["01.20", "1.020", "1.20.05", "00.1"] {
            assert!(
                matches!(
                    ServerVersion::parse(raw),
                    Err(ProvisionError::InvalidVersion(_))
                ),
                "{raw:?} should be rejected"
            );
        }
        let v = ServerVersion::parse("1.0.0").unwrap();
        assert_eq!((v.major, v.minor, v.patch), (1, 0, Some(0)));
        assert_eq!(ServerVersion::parse("1.20.10").unwrap().to_string(), "1.20.10");
    }

    #[test]
    fn threshold_ignores_patch() {
        assert!(!ServerVersion::parse("1.14.4").unwrap().is_at_least(1, 15));
        assert!(ServerVersion::parse("1.15").unwrap().is_at_least(1, 15));
        assert!(ServerVersion::parse("1.16.5").unwrap().is_at_least(1, 15));
        assert!(!ServerVersion::parse("1.8.8").unwrap().is_at_least(1, 15));
    }

    #[test]
    fn java_major_detection() {
        assert_eq!(ServerVersion::parse("1.21.4").unwrap().required_java_major(), 21);
        assert_eq!(ServerVersion::parse("1.21").unwrap().required_java_major(), 21);
        assert_eq!(ServerVersion::parse("1.20.5").unwrap().required_java_major(), 21);
        assert_eq!(ServerVersion::parse("1.20.4").unwrap().required_java_major(), 17);
        assert_eq!(ServerVersion::parse("1.16.5").unwrap().required_java_major(), 8);
        assert_eq!(ServerVersion::parse("1.8.8").unwrap().required_java_major(), 8);
    }
}
