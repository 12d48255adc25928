//! Playback volume.

use std::fmt;
use std::str::FromStr;

use crate::{Error, Result};

/// Master volume as an integer percentage in `0..=100`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Volume(u8);

impl Volume {
    /// Full volume, used when no volume is given.
    pub const MAX: Self = Self(100);

    /// Muted.
    pub const MIN: Self = Self(0);

    /// Create a volume from a percentage.
    pub fn from_percent(percent: i64) -> Result<Self> {
        u8::try_from(percent)
            .ok()
            .filter(|p| *p <= 100)
            .map(Self)
            .ok_or_else(|| Error::InvalidVolume(percent.to_string()))
    }

    /// Parse a volume argument.
    ///
    /// Surrounding whitespace is ignored; anything that is not an integer in
    /// `0..=100` is rejected.
    pub fn parse(input: &str) -> Result<Self> {
        let percent: i64 = input
            .trim()
            .parse()
            .map_err(|_| Error::InvalidVolume(input.to_string()))?;
        Self::from_percent(percent)
    }

    /// Get the percentage.
    pub const fn percent(self) -> u8 {
        self.0
    }

    /// Get the linear gain factor in `[0.0, 1.0]`.
    pub fn gain(self) -> f32 {
        f32::from(self.0) / 100.0
    }
}

impl Default for Volume {
    fn default() -> Self {
        Self::MAX
    }
}

impl FromStr for Volume {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for Volume {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}%", self.0)
    }
}
