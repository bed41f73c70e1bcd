use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::GpaError;
use crate::gpa::GroupSummary;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum GradingScale {
    FourPoint,
    FivePoint,
}

impl GradingScale {
    pub fn as_str(self) -> &'static str {
        match self {
            GradingScale::FourPoint => "4.0",
            GradingScale::FivePoint => "5.0",
        }
    }

    /// Letter grades accepted under this scale, best first.
    pub fn alphabet(self) -> &'static [Grade] {
        match self {
            GradingScale::FourPoint => &[Grade::A, Grade::B, Grade::C, Grade::D, Grade::F],
            GradingScale::FivePoint => {
                &[Grade::A, Grade::B, Grade::C, Grade::D, Grade::E, Grade::F]
            }
        }
    }

    pub fn accepts(self, grade: Grade) -> bool {
        self.alphabet().contains(&grade)
    }
}

impl fmt::Display for GradingScale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GradingScale {
    type Err = GpaError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "4" | "4.0" => Ok(GradingScale::FourPoint),
            "5" | "5.0" => Ok(GradingScale::FivePoint),
            other => Err(GpaError::UnsupportedScale(other.to_string())),
        }
    }
}

impl TryFrom<String> for GradingScale {
    type Error = GpaError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<GradingScale> for String {
    fn from(scale: GradingScale) -> Self {
        scale.as_str().to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Grade {
    A,
    B,
    C,
    D,
    E,
    F,
}

impl Grade {
    pub fn as_str(self) -> &'static str {
        match self {
            Grade::A => "A",
            Grade::B => "B",
            Grade::C => "C",
            Grade::D => "D",
            Grade::E => "E",
            Grade::F => "F",
        }
    }

    /// Parses a letter and checks it against the scale's alphabet.
    /// Lower-case input and surrounding whitespace are accepted.
    pub fn parse(raw: &str, scale: GradingScale) -> Result<Self, GpaError> {
        let invalid = || GpaError::InvalidGrade {
            grade: raw.to_string(),
            scale,
        };

        let grade = match raw.trim().to_ascii_uppercase().as_str() {
            "A" => Grade::A,
            "B" => Grade::B,
            "C" => Grade::C,
            "D" => Grade::D,
            "E" => Grade::E,
            "F" => Grade::F,
            _ => return Err(invalid()),
        };

        if scale.accepts(grade) {
            Ok(grade)
        } else {
            Err(invalid())
        }
    }
}

impl fmt::Display for Grade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Classification {
    #[serde(rename = "First Class")]
    FirstClass,
    #[serde(rename = "Second Class Upper")]
    SecondClassUpper,
    #[serde(rename = "Second Class Lower")]
    SecondClassLower,
    #[serde(rename = "Pass")]
    Pass,
    #[serde(rename = "Needs Improvement")]
    NeedsImprovement,
}

impl Classification {
    pub fn label(self) -> &'static str {
        match self {
            Classification::FirstClass => "First Class",
            Classification::SecondClassUpper => "Second Class Upper",
            Classification::SecondClassLower => "Second Class Lower",
            Classification::Pass => "Pass",
            Classification::NeedsImprovement => "Needs Improvement",
        }
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CourseRecord {
    pub name: String,
    pub credit_units: u32,
    pub grade: Grade,
    pub semester: String,
    pub level: String,
}

impl CourseRecord {
    /// Builds a record from raw form input, validating it against `scale`.
    pub fn new(
        name: &str,
        credit: i64,
        grade: &str,
        scale: GradingScale,
        semester: &str,
        level: &str,
    ) -> Result<Self, GpaError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(GpaError::EmptyCourseName);
        }

        let credit_units = u32::try_from(credit)
            .ok()
            .filter(|units| *units > 0)
            .ok_or_else(|| GpaError::InvalidCredit {
                course: name.to_string(),
                credit,
            })?;

        Ok(Self {
            name: name.to_string(),
            credit_units,
            grade: Grade::parse(grade, scale)?,
            semester: semester.trim().to_string(),
            level: level.trim().to_string(),
        })
    }
}

/// Course entry as submitted by a client.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoursePayload {
    pub course_name: String,
    pub credit: i64,
    pub grade: String,
    #[serde(default)]
    pub semester: String,
    #[serde(default)]
    pub level: String,
}

/// `{ "scale": "4.0" | "5.0", "courses": [...] }`
#[derive(Debug, Clone, Deserialize)]
pub struct RecordSetPayload {
    pub scale: String,
    pub courses: Vec<CoursePayload>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CgpaHistoryEntry {
    pub average: f64,
    pub scale: GradingScale,
    pub timestamp: DateTime<Utc>,
    pub semester: Option<String>,
}

#[derive(Debug, Clone)]
pub struct UserRecord {
    pub id: Uuid,
    pub full_name: String,
    pub email: String,
}

/// A persisted course together with its row id.
#[derive(Debug, Clone)]
pub struct StoredCourse {
    pub id: Uuid,
    pub scale: GradingScale,
    pub record: CourseRecord,
}

/// Outcome of deleting a persisted course. `remaining` is `None` once the
/// group has been dropped.
#[derive(Debug, Clone)]
pub struct RemovedCourse {
    pub scale: GradingScale,
    pub record: CourseRecord,
    pub remaining: Option<GroupSummary>,
}

/// One validated line of a course import.
#[derive(Debug, Clone)]
pub struct ImportRow {
    pub full_name: String,
    pub email: String,
    pub scale: GradingScale,
    pub record: CourseRecord,
    pub source_key: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SemesterSummary {
    pub semester: String,
    pub course_count: usize,
    pub summary: GroupSummary,
}
