use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::LaunchError;

/// Farm layout variant whose model assets are put on the simulator's search path.
///
/// Each variant maps to a subdirectory of `<share>/models/`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FarmSize {
    #[default]
    #[serde(rename = "2mx3m")]
    TwoByThree,
    #[serde(rename = "4mx3m")]
    FourByThree,
    #[serde(rename = "6mx4m")]
    SixByFour,
}

impl FarmSize {
    pub const ALL: [FarmSize; 3] = [
        FarmSize::TwoByThree,
        FarmSize::FourByThree,
        FarmSize::SixByFour,
    ];

    /// Returns the model subdirectory name (e.g. `2mx3m`).
    pub fn dir_name(&self) -> &'static str {
        match self {
            FarmSize::TwoByThree => "2mx3m",
            FarmSize::FourByThree => "4mx3m",
            FarmSize::SixByFour => "6mx4m",
        }
    }
}

impl fmt::Display for FarmSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dir_name())
    }
}

impl FromStr for FarmSize {
    type Err = LaunchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FarmSize::ALL
            .into_iter()
            .find(|size| size.dir_name() == s)
            .ok_or_else(|| LaunchError::UnknownFarmSize(s.to_string()))
    }
}
