//! Validation errors raised by the GPA engine.

use thiserror::Error;

use crate::models::GradingScale;

/// Caller contract violations detected by the resolver, aggregator, or classifier.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GpaError {
    /// Grade symbol is not part of the scale's alphabet.
    #[error("grade {grade:?} is not valid on the {scale} scale")]
    InvalidGrade { grade: String, scale: GradingScale },

    /// Scale value outside the two recognised scales.
    #[error("unsupported grading scale {0:?}; choose 4.0 or 5.0")]
    UnsupportedScale(String),

    /// Credit units must be a positive integer.
    #[error("course {course:?} has invalid credit units {credit}")]
    InvalidCredit { course: String, credit: i64 },

    /// Average handed to the classifier is negative or not finite.
    #[error("average {0} is not a finite non-negative number")]
    InvalidAverage(f64),

    #[error("course name must not be empty")]
    EmptyCourseName,
}
