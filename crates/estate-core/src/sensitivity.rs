//! Sensitivity categories and severities shared by classification, the
//! store's severity queries, and reporting.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::EstateError;

/// How serious exposure of a category of data is. Ordered: `Info < Critical`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Severity {
    Info,
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub const ALL: [Severity; 5] = [
        Severity::Info,
        Severity::Low,
        Severity::Medium,
        Severity::High,
        Severity::Critical,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "Info",
            Severity::Low => "Low",
            Severity::Medium => "Medium",
            Severity::High => "High",
            Severity::Critical => "Critical",
        }
    }

    /// Numeric rank stored alongside the label so severity filters can compare.
    pub fn rank(&self) -> i64 {
        *self as i64
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = EstateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|sev| sev.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| EstateError::Config(format!("unknown severity: {s}")))
    }
}

/// Kind of sensitive data a finding describes.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Category {
    #[serde(rename = "NationalID")]
    NationalId,
    #[serde(rename = "BusinessID")]
    BusinessId,
    ContactInfo,
    Financial,
    Technical,
    Temporal,
}

impl Category {
    pub const ALL: [Category; 6] = [
        Category::NationalId,
        Category::BusinessId,
        Category::ContactInfo,
        Category::Financial,
        Category::Technical,
        Category::Temporal,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Category::NationalId => "NationalID",
            Category::BusinessId => "BusinessID",
            Category::ContactInfo => "ContactInfo",
            Category::Financial => "Financial",
            Category::Technical => "Technical",
            Category::Temporal => "Temporal",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|c| c.label() == label)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
