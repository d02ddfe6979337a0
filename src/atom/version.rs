//! Works out which version of AtomEx the game was built with. Some structure layouts changed
//! between versions.

use eyre::{eyre, Result};
use regex::Regex;

/// The ACB name field moved by one pointer in this version.
const SHIFTED_ACB_NAME: EngineVersion = EngineVersion {
    major: 2,
    minor: 28,
    patch: 17,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct EngineVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl EngineVersion {
    /// Extracts the version from an engine build banner, such as
    /// `CRI AtomEx/PC Ver.2.28.17 Build:Jun  2 2023 10:12:13`.
    pub fn parse(banner: &str) -> Result<EngineVersion> {
        lazy_static::lazy_static! {
            static ref VERSION: Regex = Regex::new(r"Ver\.(\d+)\.(\d+)\.(\d+)").unwrap();
        }

        let captures = VERSION
            .captures(banner)
            .ok_or_else(|| eyre!("no version in build string {:?}", banner.trim_end()))?;

        let number = |i: usize| -> Result<u32> { Ok(captures[i].parse()?) };

        Ok(EngineVersion {
            major: number(1)?,
            minor: number(2)?,
            patch: number(3)?,
        })
    }

    /// Returns the offset of the cue sheet name pointer within the engine's ACB structure.
    pub fn acb_name_offset(self) -> usize {
        if self >= SHIFTED_ACB_NAME {
            EngineVersion::default_acb_name_offset() + 0x8
        } else {
            EngineVersion::default_acb_name_offset()
        }
    }

    /// The offset to use when the version is unknown.
    pub const fn default_acb_name_offset() -> usize {
        0x98
    }
}

impl std::fmt::Display for EngineVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_build_banner() {
        let version =
            EngineVersion::parse("CRI AtomEx/PC Ver.2.28.17 Build:Jun  2 2023 10:12:13\n").unwrap();

        assert_eq!(
            version,
            EngineVersion {
                major: 2,
                minor: 28,
                patch: 17
            }
        );
        assert_eq!(version.to_string(), "2.28.17");
    }

    #[test]
    fn acb_name_offset_depends_on_version() {
        let old = EngineVersion::parse("CRI AtomEx/PC Ver.2.24.10 Build").unwrap();
        let new = EngineVersion::parse("CRI AtomEx/PC Ver.2.29.1 Build").unwrap();

        assert_eq!(old.acb_name_offset(), 0x98);
        assert_eq!(new.acb_name_offset(), 0xa0);
        assert_eq!(SHIFTED_ACB_NAME.acb_name_offset(), 0xa0);
    }

    #[test]
    fn rejects_banner_without_version() {
        assert!(EngineVersion::parse("CRI AtomEx/PC").is_err());
    }
}
