//! Grade-point resolution, credit-weighted aggregation, and standing bands.
//!
//! Everything here is pure: callers hand in a snapshot of course records and
//! get a fresh result back. Persistence and display code both go through
//! these functions so the optimistic and stored averages never diverge.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::error::GpaError;
use crate::models::{
    Classification, CourseRecord, Grade, GradingScale, RecordSetPayload, SemesterSummary,
};

const FIVE_POINT_BANDS: [(f64, Classification); 4] = [
    (4.5, Classification::FirstClass),
    (3.5, Classification::SecondClassUpper),
    (2.5, Classification::SecondClassLower),
    (1.5, Classification::Pass),
];

const FOUR_POINT_BANDS: [(f64, Classification); 4] = [
    (3.5, Classification::FirstClass),
    (3.0, Classification::SecondClassUpper),
    (2.0, Classification::SecondClassLower),
    (1.0, Classification::Pass),
];

pub fn resolve(grade: Grade, scale: GradingScale) -> Result<f64, GpaError> {
    resolve_whole(grade, scale).map(f64::from)
}

/// Every point on both scales is a whole number, so sums of
/// credit-weighted points stay exact in integers.
fn resolve_whole(grade: Grade, scale: GradingScale) -> Result<u32, GpaError> {
    let point = match (grade, scale) {
        (Grade::A, GradingScale::FourPoint) => 4,
        (Grade::A, GradingScale::FivePoint) => 5,
        (Grade::B, GradingScale::FourPoint) => 3,
        (Grade::B, GradingScale::FivePoint) => 4,
        (Grade::C, GradingScale::FourPoint) => 2,
        (Grade::C, GradingScale::FivePoint) => 3,
        (Grade::D, GradingScale::FourPoint) => 1,
        (Grade::D, GradingScale::FivePoint) => 2,
        (Grade::E, GradingScale::FivePoint) => 1,
        (Grade::E, GradingScale::FourPoint) => {
            return Err(GpaError::InvalidGrade {
                grade: grade.to_string(),
                scale,
            })
        }
        (Grade::F, _) => 0,
    };

    Ok(point)
}

/// Half-up rounding of `points / credits` to two decimals, computed as
/// `floor((200 * points + credits) / (2 * credits))` hundredths.
pub fn round2_ratio(points: u64, credits: u64) -> f64 {
    if credits == 0 {
        return 0.0;
    }
    let hundredths = (200 * points + credits) / (2 * credits);
    hundredths as f64 / 100.0
}

/// Half-up rounding for averages that only exist as floats (stored history).
/// A value within 1e-9 below a half is taken as that half; a ratio of
/// integers with a realistic credit total cannot land that close otherwise.
pub fn round2(value: f64) -> f64 {
    (value * 100.0 + 1e-9).round() / 100.0
}

/// Credit-weighted average plus the exact integer sums it came from.
/// `average` is unrounded so it can be chained without drift.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GroupSummary {
    pub average: f64,
    pub weighted_points: u64,
    pub total_credits: u64,
}

impl GroupSummary {
    pub const EMPTY: GroupSummary = GroupSummary {
        average: 0.0,
        weighted_points: 0,
        total_credits: 0,
    };

    fn from_sums(weighted_points: u64, total_credits: u64) -> Self {
        if total_credits == 0 {
            return Self::EMPTY;
        }

        Self {
            average: weighted_points as f64 / total_credits as f64,
            weighted_points,
            total_credits,
        }
    }

    pub fn rounded(&self) -> f64 {
        round2_ratio(self.weighted_points, self.total_credits)
    }
}

/// Fails on the first record with zero credits or a grade the scale rejects;
/// no record is ever skipped.
pub fn aggregate_group(
    records: &[CourseRecord],
    scale: GradingScale,
) -> Result<GroupSummary, GpaError> {
    let mut weighted_points: u64 = 0;
    let mut total_credits: u64 = 0;

    for record in records {
        if record.credit_units == 0 {
            return Err(GpaError::InvalidCredit {
                course: record.name.clone(),
                credit: 0,
            });
        }

        let point = resolve_whole(record.grade, scale)?;
        weighted_points += u64::from(record.credit_units) * u64::from(point);
        total_credits += u64::from(record.credit_units);
    }

    Ok(GroupSummary::from_sums(weighted_points, total_credits))
}

/// A group's contribution is `average * total_credits`, which is exactly its
/// integer weighted-point sum.
pub fn aggregate_overall<'a, I>(groups: I) -> GroupSummary
where
    I: IntoIterator<Item = &'a CourseGroup>,
{
    let mut weighted_points: u64 = 0;
    let mut total_credits: u64 = 0;

    for group in groups {
        weighted_points += group.summary.weighted_points;
        total_credits += group.summary.total_credits;
    }

    GroupSummary::from_sums(weighted_points, total_credits)
}

pub fn classify(average: f64, scale: GradingScale) -> Result<Classification, GpaError> {
    if !average.is_finite() || average < 0.0 {
        return Err(GpaError::InvalidAverage(average));
    }

    let bands = match scale {
        GradingScale::FivePoint => &FIVE_POINT_BANDS,
        GradingScale::FourPoint => &FOUR_POINT_BANDS,
    };

    Ok(bands
        .iter()
        .find(|(floor, _)| average >= *floor)
        .map(|(_, classification)| *classification)
        .unwrap_or(Classification::NeedsImprovement))
}

/// Courses sharing one scale. The summary is always recomputed from
/// `courses`; there is no way to set it directly.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CourseGroup {
    scale: GradingScale,
    courses: Vec<CourseRecord>,
    summary: GroupSummary,
}

impl CourseGroup {
    pub fn new(scale: GradingScale, courses: Vec<CourseRecord>) -> Result<Self, GpaError> {
        let summary = aggregate_group(&courses, scale)?;
        Ok(Self {
            scale,
            courses,
            summary,
        })
    }

    pub fn scale(&self) -> GradingScale {
        self.scale
    }

    pub fn courses(&self) -> &[CourseRecord] {
        &self.courses
    }

    pub fn summary(&self) -> GroupSummary {
        self.summary
    }

    /// Per-semester averages in first-seen semester order.
    pub fn semester_breakdown(&self) -> Result<Vec<SemesterSummary>, GpaError> {
        let mut order: Vec<&str> = Vec::new();
        let mut buckets: std::collections::HashMap<&str, Vec<CourseRecord>> =
            std::collections::HashMap::new();

        for course in &self.courses {
            let key = course.semester.as_str();
            if !buckets.contains_key(key) {
                order.push(key);
            }
            buckets.entry(key).or_default().push(course.clone());
        }

        let mut summaries = Vec::with_capacity(order.len());
        for semester in order {
            let records = buckets.remove(semester).unwrap_or_default();
            let summary = aggregate_group(&records, self.scale)?;
            summaries.push(SemesterSummary {
                semester: semester.to_string(),
                course_count: records.len(),
                summary,
            });
        }

        Ok(summaries)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OverallResult {
    pub average: f64,
    pub weighted_points: u64,
    pub total_credits: u64,
    /// Scale the classification was computed under; `None` when there are no courses.
    pub scale: Option<GradingScale>,
    pub classification: Option<Classification>,
}

impl OverallResult {
    pub fn rounded_average(&self) -> f64 {
        round2_ratio(self.weighted_points, self.total_credits)
    }
}

/// A user's courses partitioned by scale, at most one group per scale.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RecordSet {
    groups: BTreeMap<GradingScale, CourseGroup>,
}

impl RecordSet {
    pub fn from_records<I>(records: I) -> Result<Self, GpaError>
    where
        I: IntoIterator<Item = (GradingScale, CourseRecord)>,
    {
        let mut partitioned: BTreeMap<GradingScale, Vec<CourseRecord>> = BTreeMap::new();
        for (scale, record) in records {
            partitioned.entry(scale).or_default().push(record);
        }

        let mut groups = BTreeMap::new();
        for (scale, courses) in partitioned {
            groups.insert(scale, CourseGroup::new(scale, courses)?);
        }

        Ok(Self { groups })
    }

    /// Validates every course of every payload before building anything.
    pub fn from_payloads(payloads: &[RecordSetPayload]) -> Result<Self, GpaError> {
        let mut records = Vec::new();
        for payload in payloads {
            let scale: GradingScale = payload.scale.parse()?;
            for course in &payload.courses {
                let record = CourseRecord::new(
                    &course.course_name,
                    course.credit,
                    &course.grade,
                    scale,
                    &course.semester,
                    &course.level,
                )?;
                records.push((scale, record));
            }
        }

        Self::from_records(records)
    }

    pub fn group(&self, scale: GradingScale) -> Option<&CourseGroup> {
        self.groups.get(&scale)
    }

    pub fn groups(&self) -> impl Iterator<Item = &CourseGroup> {
        self.groups.values()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn course_count(&self) -> usize {
        self.groups.values().map(|group| group.courses.len()).sum()
    }

    /// Adds a course and recomputes its group. On error the set is unchanged.
    pub fn add_course(
        &mut self,
        scale: GradingScale,
        record: CourseRecord,
    ) -> Result<&CourseGroup, GpaError> {
        let mut courses = self
            .groups
            .get(&scale)
            .map(|group| group.courses.clone())
            .unwrap_or_default();
        courses.push(record);

        let group = CourseGroup::new(scale, courses)?;
        self.groups.insert(scale, group);
        Ok(&self.groups[&scale])
    }

    /// Removes the course at `index`, dropping the group once it is empty.
    pub fn remove_course(
        &mut self,
        scale: GradingScale,
        index: usize,
    ) -> Result<Option<CourseRecord>, GpaError> {
        let Some(group) = self.groups.get(&scale) else {
            return Ok(None);
        };
        if index >= group.courses.len() {
            return Ok(None);
        }

        let mut courses = group.courses.clone();
        let removed = courses.remove(index);

        if courses.is_empty() {
            self.groups.remove(&scale);
        } else {
            self.groups.insert(scale, CourseGroup::new(scale, courses)?);
        }

        Ok(Some(removed))
    }

    /// Moves every course from `from` into `to`, merging with an existing
    /// group. Returns `false` when there was nothing to move.
    pub fn rescale(&mut self, from: GradingScale, to: GradingScale) -> Result<bool, GpaError> {
        if from == to {
            return Ok(false);
        }
        let Some(source) = self.groups.get(&from) else {
            return Ok(false);
        };

        for course in &source.courses {
            if !to.accepts(course.grade) {
                return Err(GpaError::InvalidGrade {
                    grade: course.grade.to_string(),
                    scale: to,
                });
            }
        }

        let mut merged = self
            .groups
            .get(&to)
            .map(|group| group.courses.clone())
            .unwrap_or_default();
        merged.extend(source.courses.iter().cloned());

        let target = CourseGroup::new(to, merged)?;
        self.groups.remove(&from);
        self.groups.insert(to, target);
        Ok(true)
    }

    /// Scale carrying the most credits; ties go to the five-point scale.
    pub fn dominant_scale(&self) -> Option<GradingScale> {
        self.groups
            .values()
            .max_by_key(|group| group.summary.total_credits)
            .map(|group| group.scale)
    }

    /// Overall average across groups, classified on its two-decimal display
    /// value so the label always agrees with the printed number.
    pub fn overall(&self) -> Result<OverallResult, GpaError> {
        let summary = aggregate_overall(self.groups.values());
        let scale = self.dominant_scale();
        let classification = match scale {
            Some(scale) => Some(classify(summary.rounded(), scale)?),
            None => None,
        };

        Ok(OverallResult {
            average: summary.average,
            weighted_points: summary.weighted_points,
            total_credits: summary.total_credits,
            scale,
            classification,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn course(name: &str, credit_units: u32, grade: Grade) -> CourseRecord {
        CourseRecord {
            name: name.to_string(),
            credit_units,
            grade,
            semester: "2023/2024-1".to_string(),
            level: "100".to_string(),
        }
    }

    fn course_in(name: &str, credit_units: u32, grade: Grade, semester: &str) -> CourseRecord {
        CourseRecord {
            semester: semester.to_string(),
            ..course(name, credit_units, grade)
        }
    }

    #[test]
    fn resolves_every_grade_on_both_scales() {
        let expected = [
            (Grade::A, 4.0, 5.0),
            (Grade::B, 3.0, 4.0),
            (Grade::C, 2.0, 3.0),
            (Grade::D, 1.0, 2.0),
            (Grade::F, 0.0, 0.0),
        ];
        for (grade, four, five) in expected {
            assert_eq!(resolve(grade, GradingScale::FourPoint).unwrap(), four);
            assert_eq!(resolve(grade, GradingScale::FivePoint).unwrap(), five);
        }
        assert_eq!(resolve(Grade::E, GradingScale::FivePoint).unwrap(), 1.0);
    }

    #[test]
    fn e_is_rejected_on_four_point_scale() {
        let err = resolve(Grade::E, GradingScale::FourPoint).unwrap_err();
        assert_eq!(
            err,
            GpaError::InvalidGrade {
                grade: "E".to_string(),
                scale: GradingScale::FourPoint,
            }
        );
        assert_eq!(err.to_string(), "grade \"E\" is not valid on the 4.0 scale");
    }

    #[test]
    fn empty_input_yields_zero() {
        for scale in [GradingScale::FourPoint, GradingScale::FivePoint] {
            let summary = aggregate_group(&[], scale).unwrap();
            assert_eq!(summary, GroupSummary::EMPTY);
            assert!(!summary.average.is_nan());
        }

        let overall = aggregate_overall(Vec::<&CourseGroup>::new());
        assert_eq!(overall.average, 0.0);
        assert_eq!(overall.total_credits, 0);
    }

    #[test]
    fn weights_points_by_credit_units() {
        let records = vec![course("MTH101", 3, Grade::A), course("PHY101", 2, Grade::C)];
        let summary = aggregate_group(&records, GradingScale::FivePoint).unwrap();
        assert_eq!(summary.total_credits, 5);
        assert!((summary.average - 4.2).abs() < 1e-12);
        assert_eq!(summary.rounded(), 4.2);
    }

    #[test]
    fn same_grades_differ_by_scale() {
        let records = vec![course("GST101", 2, Grade::B), course("GST102", 4, Grade::B)];
        let four = aggregate_group(&records, GradingScale::FourPoint).unwrap();
        let five = aggregate_group(&records, GradingScale::FivePoint).unwrap();
        assert_eq!(four.average, 3.0);
        assert_eq!(five.average, 4.0);
    }

    #[test]
    fn one_bad_record_fails_the_whole_group() {
        let records = vec![
            course("MTH101", 3, Grade::A),
            course("CSC101", 0, Grade::B),
            course("PHY101", 2, Grade::C),
        ];
        assert_eq!(
            aggregate_group(&records, GradingScale::FivePoint),
            Err(GpaError::InvalidCredit {
                course: "CSC101".to_string(),
                credit: 0,
            })
        );

        let with_e = vec![course("MTH101", 3, Grade::A), course("BIO101", 3, Grade::E)];
        assert!(matches!(
            aggregate_group(&with_e, GradingScale::FourPoint),
            Err(GpaError::InvalidGrade { .. })
        ));
    }

    #[test]
    fn rounds_half_up_for_display() {
        let records = vec![course("A", 1, Grade::A), course("B", 2, Grade::B)];
        // (5 + 8) / 3 = 4.333...
        let summary = aggregate_group(&records, GradingScale::FivePoint).unwrap();
        assert_eq!(summary.rounded(), 4.33);
        assert_eq!(round2(0.0), 0.0);
        assert_eq!(round2_ratio(0, 0), 0.0);
    }

    #[test]
    fn exact_halves_round_up() {
        assert_eq!(round2_ratio(87, 40), 2.18);
        assert_eq!(round2_ratio(23, 40), 0.58);
        assert_eq!(round2_ratio(29, 200), 0.15);
        assert_eq!(round2(87.0 / 40.0), 2.18);
        assert_eq!(round2(29.0 / 200.0), 0.15);

        let mut halves = 0;
        for credits in [8_u64, 40, 200, 400, 1000] {
            for points in 0..=1000_u64 {
                if (points * 1000) % credits != 0 {
                    continue;
                }
                let thousandths = points * 1000 / credits;
                if thousandths % 10 != 5 {
                    continue;
                }
                halves += 1;
                let expected = ((thousandths + 5) / 10) as f64 / 100.0;
                assert_eq!(round2_ratio(points, credits), expected, "{points}/{credits}");
                assert_eq!(
                    round2(points as f64 / credits as f64),
                    expected,
                    "{points}/{credits}"
                );
            }
        }
        assert!(halves > 100);
    }

    #[test]
    fn group_sitting_on_a_half_displays_rounded_up() {
        // 75 + 12 + 0 = 87 points over 40 credits = 2.175
        let records = vec![
            course("MTH101", 5, Grade::A),
            course("PHY101", 5, Grade::A),
            course("CHM101", 5, Grade::A),
            course("BIO101", 4, Grade::C),
            course("GST101", 7, Grade::F),
            course("GST102", 7, Grade::F),
            course("GST103", 7, Grade::F),
        ];
        let summary = aggregate_group(&records, GradingScale::FivePoint).unwrap();
        assert_eq!(summary.weighted_points, 87);
        assert_eq!(summary.total_credits, 40);
        assert_eq!(summary.rounded(), 2.18);

        let group = CourseGroup::new(GradingScale::FivePoint, records).unwrap();
        let overall = aggregate_overall([&group]);
        assert_eq!(overall.rounded(), 2.18);
    }

    #[test]
    fn band_floors_are_inclusive() {
        let five = GradingScale::FivePoint;
        assert_eq!(classify(3.5, five).unwrap(), Classification::SecondClassUpper);
        assert_eq!(classify(4.49, five).unwrap(), Classification::SecondClassUpper);
        assert_eq!(classify(4.5, five).unwrap(), Classification::FirstClass);
        assert_eq!(classify(2.5, five).unwrap(), Classification::SecondClassLower);
        assert_eq!(classify(1.5, five).unwrap(), Classification::Pass);
        assert_eq!(classify(1.49, five).unwrap(), Classification::NeedsImprovement);
        assert_eq!(classify(0.0, five).unwrap(), Classification::NeedsImprovement);

        let four = GradingScale::FourPoint;
        assert_eq!(classify(4.0, four).unwrap(), Classification::FirstClass);
        assert_eq!(classify(3.5, four).unwrap(), Classification::FirstClass);
        assert_eq!(classify(3.0, four).unwrap(), Classification::SecondClassUpper);
        assert_eq!(classify(2.99, four).unwrap(), Classification::SecondClassLower);
        assert_eq!(classify(1.0, four).unwrap(), Classification::Pass);
        assert_eq!(classify(0.99, four).unwrap(), Classification::NeedsImprovement);
    }

    #[test]
    fn classify_rejects_non_finite_or_negative() {
        let five = GradingScale::FivePoint;
        assert!(matches!(classify(f64::NAN, five), Err(GpaError::InvalidAverage(_))));
        assert!(matches!(classify(f64::INFINITY, five), Err(GpaError::InvalidAverage(_))));
        assert_eq!(classify(-0.5, five), Err(GpaError::InvalidAverage(-0.5)));
    }

    #[test]
    fn repeated_calls_are_bit_identical() {
        let records = vec![
            course("MTH101", 3, Grade::A),
            course("PHY101", 2, Grade::C),
            course("CHM101", 4, Grade::D),
        ];
        let first = aggregate_group(&records, GradingScale::FivePoint).unwrap();
        let second = aggregate_group(&records, GradingScale::FivePoint).unwrap();
        assert_eq!(first.average.to_bits(), second.average.to_bits());

        let group = CourseGroup::new(GradingScale::FivePoint, records).unwrap();
        let a = aggregate_overall([&group]);
        let b = aggregate_overall([&group]);
        assert_eq!(a.average.to_bits(), b.average.to_bits());

        assert_eq!(
            classify(a.average, GradingScale::FivePoint),
            classify(b.average, GradingScale::FivePoint)
        );
    }

    #[test]
    fn removal_matches_fresh_aggregation() {
        let scale = GradingScale::FivePoint;
        let mut set = RecordSet::default();
        set.add_course(scale, course("MTH101", 3, Grade::A)).unwrap();
        set.add_course(scale, course("PHY101", 4, Grade::B)).unwrap();
        set.add_course(scale, course("CHM101", 2, Grade::C)).unwrap();

        let removed = set.remove_course(scale, 1).unwrap().unwrap();
        assert_eq!(removed.name, "PHY101");

        let fresh = aggregate_group(
            &[course("MTH101", 3, Grade::A), course("CHM101", 2, Grade::C)],
            scale,
        )
        .unwrap();
        assert_eq!(set.group(scale).unwrap().summary(), fresh);
    }

    #[test]
    fn removing_last_course_drops_the_group() {
        let scale = GradingScale::FourPoint;
        let mut set = RecordSet::default();
        set.add_course(scale, course("MTH101", 3, Grade::A)).unwrap();
        set.remove_course(scale, 0).unwrap();
        assert!(set.group(scale).is_none());
        assert!(set.is_empty());
        assert_eq!(set.remove_course(scale, 0).unwrap(), None);

        let overall = set.overall().unwrap();
        assert_eq!(overall.average, 0.0);
        assert_eq!(overall.classification, None);
    }

    #[test]
    fn failed_add_leaves_set_untouched() {
        let mut set = RecordSet::default();
        set.add_course(GradingScale::FourPoint, course("MTH101", 3, Grade::A))
            .unwrap();
        let before = set.clone();

        let result = set.add_course(GradingScale::FourPoint, course("BIO101", 2, Grade::E));
        assert!(result.is_err());
        assert_eq!(set, before);
    }

    #[test]
    fn overall_matches_flattened_single_pass() {
        let five = vec![course("MTH101", 3, Grade::A), course("PHY101", 2, Grade::C)];
        let four = vec![course("ECO101", 4, Grade::B), course("ACC101", 1, Grade::F)];

        let set = RecordSet::from_records(
            five.iter()
                .cloned()
                .map(|record| (GradingScale::FivePoint, record))
                .chain(four.iter().cloned().map(|record| (GradingScale::FourPoint, record))),
        )
        .unwrap();

        let mut weighted = 0.0;
        let mut credits = 0.0;
        for record in &five {
            weighted += f64::from(record.credit_units)
                * resolve(record.grade, GradingScale::FivePoint).unwrap();
            credits += f64::from(record.credit_units);
        }
        for record in &four {
            weighted += f64::from(record.credit_units)
                * resolve(record.grade, GradingScale::FourPoint).unwrap();
            credits += f64::from(record.credit_units);
        }

        let overall = aggregate_overall(set.groups());
        assert_eq!(overall.total_credits, 10);
        assert!((overall.average - weighted / credits).abs() < 1e-9);
        assert!((overall.average - 3.3).abs() < 1e-9);
    }

    #[test]
    fn overall_classifies_under_dominant_scale() {
        let set = RecordSet::from_records(vec![
            (GradingScale::FourPoint, course("ECO101", 6, Grade::A)),
            (GradingScale::FivePoint, course("MTH101", 2, Grade::A)),
        ])
        .unwrap();
        assert_eq!(set.dominant_scale(), Some(GradingScale::FourPoint));

        let overall = set.overall().unwrap();
        // (4 * 6 + 5 * 2) / 8 = 4.25
        assert_eq!(overall.rounded_average(), 4.25);
        assert_eq!(overall.classification, Some(Classification::FirstClass));

        let tied = RecordSet::from_records(vec![
            (GradingScale::FourPoint, course("ECO101", 3, Grade::B)),
            (GradingScale::FivePoint, course("MTH101", 3, Grade::B)),
        ])
        .unwrap();
        assert_eq!(tied.dominant_scale(), Some(GradingScale::FivePoint));
    }

    #[test]
    fn overall_label_follows_display_value() {
        // 895 / 199 = 4.4975 displays as 4.50 and must read First Class.
        let set = RecordSet::from_records(vec![
            (GradingScale::FivePoint, course("A1", 99, Grade::A)),
            (GradingScale::FivePoint, course("B1", 100, Grade::B)),
        ])
        .unwrap();
        let overall = set.overall().unwrap();
        assert!(overall.average < 4.5);
        assert_eq!(overall.rounded_average(), 4.5);
        assert_eq!(overall.classification, Some(Classification::FirstClass));
    }

    #[test]
    fn rescale_merges_into_target_group() {
        let mut set = RecordSet::from_records(vec![
            (GradingScale::FivePoint, course("MTH101", 3, Grade::A)),
            (GradingScale::FourPoint, course("ECO101", 3, Grade::C)),
        ])
        .unwrap();

        assert!(set.rescale(GradingScale::FivePoint, GradingScale::FourPoint).unwrap());
        assert!(set.group(GradingScale::FivePoint).is_none());
        let merged = set.group(GradingScale::FourPoint).unwrap();
        assert_eq!(merged.courses().len(), 2);
        assert_eq!(merged.summary().average, 3.0);

        assert!(!set.rescale(GradingScale::FivePoint, GradingScale::FourPoint).unwrap());
    }

    #[test]
    fn rescale_rejects_grades_missing_from_target() {
        let mut set = RecordSet::from_records(vec![(
            GradingScale::FivePoint,
            course("BIO101", 2, Grade::E),
        )])
        .unwrap();
        let before = set.clone();
        assert!(set.rescale(GradingScale::FivePoint, GradingScale::FourPoint).is_err());
        assert_eq!(set, before);
    }

    #[test]
    fn semester_breakdown_keeps_first_seen_order() {
        let group = CourseGroup::new(
            GradingScale::FivePoint,
            vec![
                course_in("MTH101", 3, Grade::A, "2023/2024-1"),
                course_in("MTH102", 3, Grade::C, "2023/2024-2"),
                course_in("PHY101", 2, Grade::B, "2023/2024-1"),
            ],
        )
        .unwrap();

        let semesters = group.semester_breakdown().unwrap();
        assert_eq!(semesters.len(), 2);
        assert_eq!(semesters[0].semester, "2023/2024-1");
        assert_eq!(semesters[0].course_count, 2);
        assert_eq!(semesters[0].summary.total_credits, 5);
        assert_eq!(semesters[0].summary.weighted_points, 23);
        assert_eq!(semesters[0].summary.rounded(), 4.6);
        assert_eq!(semesters[1].summary.average, 3.0);
    }

    #[test]
    fn builds_from_client_payloads() {
        let payloads: Vec<RecordSetPayload> = serde_json::from_str(
            r#"[
                {"scale":"5.0","courses":[
                    {"courseName":"MTH101","credit":3,"grade":"A","semester":"2023/2024-1","level":"100"},
                    {"courseName":"PHY101","credit":2,"grade":"c","semester":"2023/2024-1","level":"100"}
                ]},
                {"scale":"4","courses":[]}
            ]"#,
        )
        .unwrap();

        let set = RecordSet::from_payloads(&payloads).unwrap();
        assert_eq!(set.course_count(), 2);
        assert_eq!(set.group(GradingScale::FivePoint).unwrap().summary().rounded(), 4.2);
        assert!(set.group(GradingScale::FourPoint).is_none());

        let bad: Vec<RecordSetPayload> =
            serde_json::from_str(r#"[{"scale":"6.0","courses":[]}]"#).unwrap();
        assert_eq!(
            RecordSet::from_payloads(&bad),
            Err(GpaError::UnsupportedScale("6.0".to_string()))
        );
    }
}
