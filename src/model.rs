//! Closed vocabularies for study and form metadata.
//!
//! Stored as snake_case text columns guarded by `CHECK` constraints; these
//! enums are the typed view used when parsing request bodies.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StudyPhase {
    #[serde(rename = "phase_1")]
    Phase1,
    #[serde(rename = "phase_1_2")]
    Phase1_2,
    #[serde(rename = "phase_2")]
    Phase2,
    #[serde(rename = "phase_2_3")]
    Phase2_3,
    #[serde(rename = "phase_3")]
    Phase3,
    #[serde(rename = "phase_4")]
    Phase4,
    NotApplicable,
}

impl StudyPhase {
    pub const ALL: [StudyPhase; 7] = [
        StudyPhase::Phase1,
        StudyPhase::Phase1_2,
        StudyPhase::Phase2,
        StudyPhase::Phase2_3,
        StudyPhase::Phase3,
        StudyPhase::Phase4,
        StudyPhase::NotApplicable,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StudyPhase::Phase1 => "phase_1",
            StudyPhase::Phase1_2 => "phase_1_2",
            StudyPhase::Phase2 => "phase_2",
            StudyPhase::Phase2_3 => "phase_2_3",
            StudyPhase::Phase3 => "phase_3",
            StudyPhase::Phase4 => "phase_4",
            StudyPhase::NotApplicable => "not_applicable",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StudyStatus {
    Draft,
    Active,
    Paused,
    Closed,
    Archived,
}

impl StudyStatus {
    pub const ALL: [StudyStatus; 5] = [
        StudyStatus::Draft,
        StudyStatus::Active,
        StudyStatus::Paused,
        StudyStatus::Closed,
        StudyStatus::Archived,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StudyStatus::Draft => "draft",
            StudyStatus::Active => "active",
            StudyStatus::Paused => "paused",
            StudyStatus::Closed => "closed",
            StudyStatus::Archived => "archived",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormStatus {
    Draft,
    Published,
    Archived,
}

impl FormStatus {
    pub const ALL: [FormStatus; 3] = [FormStatus::Draft, FormStatus::Published, FormStatus::Archived];

    pub fn as_str(&self) -> &'static str {
        match self {
            FormStatus::Draft => "draft",
            FormStatus::Published => "published",
            FormStatus::Archived => "archived",
        }
    }
}

macro_rules! text_enum {
    ($ty:ident, $what:literal) => {
        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $ty {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                $ty::ALL
                    .iter()
                    .copied()
                    .find(|v| v.as_str() == s)
                    .ok_or_else(|| format!("unknown {}: {}", $what, s))
            }
        }
    };
}

text_enum!(StudyPhase, "study phase");
text_enum!(StudyStatus, "study status");
text_enum!(FormStatus, "form status");
