use anyhow::{Context, Result};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

use crate::aggregators::grade::{GradeCounts, LetterGrade};
use crate::aggregators::types::{
    BarRow, CourseScatterRow, CourseSummary, GradeDistribution, PrefixScatterRow, PrefixSummary,
    Scope,
};
use crate::aggregators::utility::{first_non_empty, round4};
use crate::error::PipelineError;
use crate::loader::record::course_display_name;
use crate::loader::{Division, GradeRecord, GradeTable};

/// Running totals for one aggregation key.
#[derive(Default)]
struct Accumulator {
    counts: GradeCounts,
    departments: BTreeSet<String>,
    college: Option<String>,
    division: Option<Division>,
}

impl Accumulator {
    fn add(&mut self, record: &GradeRecord) -> Result<()> {
        self.counts.merge(&record.counts).with_context(|| {
            format!(
                "totals for {} {} overflow",
                record.semester,
                course_display_name(&record.prefix, &record.course_number)
            )
        })?;
        self.departments.insert(record.department.clone());
        if self.college.is_none() {
            self.college = Some(record.college_label().to_string());
        }
        if self.division.is_none() {
            self.division = Some(record.division);
        }
        Ok(())
    }

    fn department(&self) -> String {
        first_non_empty(&self.departments)
    }

    fn college(&self) -> String {
        self.college.clone().unwrap_or_default()
    }
}

/// The scopes every record contributes to: all semesters and its own.
fn scopes(record: &GradeRecord) -> [Scope; 2] {
    [Scope::All, Scope::Semester(record.semester)]
}

fn ensure_rows(records: &[GradeRecord], what: &'static str) -> Result<()> {
    if records.is_empty() {
        return Err(PipelineError::EmptyTable(what).into());
    }
    Ok(())
}

/// Rolls records up by scope and course prefix.
///
/// Records whose prefix has no college mapping are left out.
pub fn summarize_prefixes(records: &[GradeRecord]) -> Result<Vec<PrefixSummary>> {
    ensure_rows(records, "prefix summaries")?;

    let mut groups: BTreeMap<(Scope, &str), Accumulator> = BTreeMap::new();
    let mut skipped = 0usize;

    for record in records {
        if !record.prefix_recognized() {
            skipped += 1;
            continue;
        }
        for scope in scopes(record) {
            groups
                .entry((scope, record.prefix.as_str()))
                .or_default()
                .add(record)?;
        }
    }

    if skipped > 0 {
        debug!(skipped, "Records with unrecognized prefixes left out of prefix rollup");
    }

    Ok(groups
        .into_iter()
        .map(|((scope, prefix), acc)| PrefixSummary {
            scope,
            prefix: prefix.to_string(),
            college: acc.college(),
            department: acc.department(),
            counts: acc.counts,
        })
        .collect())
}

/// Rolls records up by scope, prefix and course number.
pub fn summarize_courses(records: &[GradeRecord]) -> Result<Vec<CourseSummary>> {
    ensure_rows(records, "course summaries")?;

    Ok(group_courses(records)?
        .into_iter()
        .map(|((scope, prefix, course_number), acc)| CourseSummary {
            scope,
            prefix: prefix.to_string(),
            course_number: course_number.to_string(),
            college: acc.college(),
            department: acc.department(),
            division: acc.division.unwrap_or(Division::Lower),
            counts: acc.counts,
        })
        .collect())
}

/// Letter-grade counts by scope, prefix and course number.
pub fn grade_distributions(records: &[GradeRecord]) -> Result<Vec<GradeDistribution>> {
    ensure_rows(records, "grade distributions")?;

    Ok(group_courses(records)?
        .into_iter()
        .map(|((scope, prefix, course_number), acc)| GradeDistribution {
            scope,
            prefix: prefix.to_string(),
            course_number: course_number.to_string(),
            college: acc.college(),
            department: acc.department(),
            counts: acc.counts,
        })
        .collect())
}

type CourseGroups<'a> = BTreeMap<(Scope, &'a str, &'a str), Accumulator>;

fn group_courses(records: &[GradeRecord]) -> Result<CourseGroups<'_>> {
    let mut groups: CourseGroups = BTreeMap::new();
    for record in records {
        for scope in scopes(record) {
            groups
                .entry((scope, record.prefix.as_str(), record.course_number.as_str()))
                .or_default()
                .add(record)?;
        }
    }
    Ok(groups)
}

/// All three summary tables derived from one grade table.
#[derive(Debug, Clone)]
pub struct SummaryTables {
    pub prefixes: Vec<PrefixSummary>,
    pub courses: Vec<CourseSummary>,
    pub distributions: Vec<GradeDistribution>,
}

impl SummaryTables {
    pub fn build(table: &GradeTable) -> Result<Self> {
        let tables = Self {
            prefixes: summarize_prefixes(&table.records)?,
            courses: summarize_courses(&table.records)?,
            distributions: grade_distributions(&table.records)?,
        };

        debug!(
            prefixes = tables.prefixes.len(),
            courses = tables.courses.len(),
            distributions = tables.distributions.len(),
            "Summary tables built"
        );

        Ok(tables)
    }

    /// Prefix scatter input. Prefixes without enrolled students are omitted.
    pub fn prefix_scatter_rows(&self) -> Vec<PrefixScatterRow> {
        self.prefixes
            .iter()
            .filter_map(|s| {
                let average = s.average_grade()?;
                Some(PrefixScatterRow {
                    college: s.college.clone(),
                    prefix: s.prefix.clone(),
                    department: s.department.clone(),
                    total_students: s.enrollment(),
                    average_grade: round4(average),
                    semester: s.scope.to_string(),
                })
            })
            .collect()
    }

    /// Course scatter input. Courses without enrolled students are omitted.
    pub fn course_scatter_rows(&self) -> Vec<CourseScatterRow> {
        self.courses
            .iter()
            .filter_map(|s| {
                let average = s.average_grade()?;
                Some(CourseScatterRow {
                    college: s.college.clone(),
                    prefix: s.prefix.clone(),
                    course_number: s.course_number.clone(),
                    department: s.department.clone(),
                    course_name: course_display_name(&s.prefix, &s.course_number),
                    division: s.division.to_string(),
                    total_students: s.enrollment(),
                    average_grade: round4(average),
                    semester: s.scope.to_string(),
                })
            })
            .collect()
    }

    /// Bar chart input: one row per course, scope and letter grade, zero
    /// counts included.
    pub fn bar_rows(&self) -> Vec<BarRow> {
        let mut rows = Vec::with_capacity(self.distributions.len() * LetterGrade::COUNT);

        for dist in &self.distributions {
            let course_name = course_display_name(&dist.prefix, &dist.course_number);
            let semester = dist.scope.to_string();

            for (grade, count) in dist.counts.iter() {
                rows.push(BarRow {
                    college: dist.college.clone(),
                    prefix: dist.prefix.clone(),
                    course_number: dist.course_number.clone(),
                    department: dist.department.clone(),
                    course_name: course_name.clone(),
                    letter_grade: grade.symbol().to_string(),
                    grade_points: grade.grade_points(),
                    total_students: count,
                    semester: semester.clone(),
                });
            }
        }

        rows
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::{LoadReport, Semester, Term};

    fn record(
        semester: Semester,
        prefix: &str,
        number: &str,
        college: Option<&str>,
        grades: &[(LetterGrade, u64)],
    ) -> GradeRecord {
        GradeRecord {
            semester,
            prefix: prefix.to_string(),
            course_number: number.to_string(),
            section: String::new(),
            department: String::new(),
            instructor: None,
            college: college.map(str::to_string),
            division: Division::from_course_number(number).unwrap(),
            counts: counts(grades),
        }
    }

    fn counts(grades: &[(LetterGrade, u64)]) -> GradeCounts {
        let mut counts = GradeCounts::default();
        for (grade, n) in grades {
            counts.add(*grade, *n).unwrap();
        }
        counts
    }

    fn table(records: Vec<GradeRecord>) -> GradeTable {
        let semesters = records
            .iter()
            .map(|r| r.semester)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        GradeTable {
            records,
            semesters,
            report: LoadReport::default(),
        }
    }

    fn fall() -> Semester {
        Semester::new(Term::Fall, 2020)
    }

    fn spring() -> Semester {
        Semester::new(Term::Spring, 2021)
    }

    #[test]
    fn test_course_mean_is_enrollment_weighted() {
        let records = vec![
            record(fall(), "C S", "312", Some("Natural Sciences"), &[(LetterGrade::B, 30)]),
            record(
                spring(),
                "C S",
                "312",
                Some("Natural Sciences"),
                &[(LetterGrade::A, 10), (LetterGrade::B, 10)],
            ),
        ];

        let courses = summarize_courses(&records).unwrap();
        let all = courses.iter().find(|c| c.scope == Scope::All).unwrap();
        assert_eq!(all.enrollment(), 50);
        assert!((all.average_grade().unwrap() - 3.2).abs() < 1e-12);

        let per_semester: Vec<f64> = courses
            .iter()
            .filter(|c| c.scope != Scope::All)
            .map(|c| c.average_grade().unwrap())
            .collect();
        assert_eq!(per_semester, vec![3.0, 3.5]);
    }

    #[test]
    fn test_output_order_is_scope_then_key() {
        let records = vec![
            record(spring(), "M", "408C", Some("Natural Sciences"), &[(LetterGrade::A, 1)]),
            record(fall(), "M", "408C", Some("Natural Sciences"), &[(LetterGrade::A, 1)]),
            record(fall(), "C S", "312", Some("Natural Sciences"), &[(LetterGrade::A, 1)]),
        ];

        let labels: Vec<String> = summarize_prefixes(&records)
            .unwrap()
            .iter()
            .map(|s| format!("{}|{}", s.scope, s.prefix))
            .collect();

        assert_eq!(
            labels,
            vec![
                "All|C S",
                "All|M",
                "Fall 2020|C S",
                "Fall 2020|M",
                "Spring 2021|M",
            ]
        );
    }

    #[test]
    fn test_unrecognized_prefix_excluded_from_prefix_rollup_only() {
        let records = vec![
            record(fall(), "C S", "312", Some("Natural Sciences"), &[(LetterGrade::A, 5)]),
            record(fall(), "ZZZ", "301", None, &[(LetterGrade::C, 7)]),
        ];

        let prefixes = summarize_prefixes(&records).unwrap();
        assert!(prefixes.iter().all(|p| p.prefix == "C S"));

        let courses = summarize_courses(&records).unwrap();
        let zzz = courses.iter().find(|c| c.prefix == "ZZZ").unwrap();
        assert_eq!(zzz.college, "Other");
        assert_eq!(zzz.division, Division::Lower);
    }

    #[test]
    fn test_counts_sum_to_enrollment_in_every_aggregate() {
        let records = vec![
            record(
                fall(),
                "C S",
                "312",
                Some("Natural Sciences"),
                &[(LetterGrade::A, 5), (LetterGrade::Other, 2)],
            ),
            record(spring(), "C S", "312", Some("Natural Sciences"), &[(LetterGrade::F, 3)]),
            record(spring(), "C S", "429", Some("Natural Sciences"), &[(LetterGrade::BMinus, 4)]),
        ];
        let tables = SummaryTables::build(&table(records.clone())).unwrap();

        for prefix in &tables.prefixes {
            let expected: u64 = records
                .iter()
                .filter(|r| r.prefix == prefix.prefix)
                .filter(|r| prefix.scope == Scope::All || prefix.scope == Scope::Semester(r.semester))
                .map(GradeRecord::enrollment)
                .sum();
            assert_eq!(prefix.counts.iter().map(|(_, n)| n).sum::<u64>(), expected);
            assert_eq!(prefix.enrollment(), expected);
        }

        for course in &tables.course_scatter_rows() {
            let bar_total: u64 = tables
                .bar_rows()
                .iter()
                .filter(|b| {
                    b.course_name == course.course_name && b.semester == course.semester
                })
                .map(|b| b.total_students)
                .sum();
            assert_eq!(bar_total, course.total_students);
        }
    }

    #[test]
    fn test_zero_enrollment_course_kept_only_in_distribution() {
        let records = vec![
            record(fall(), "C S", "312", Some("Natural Sciences"), &[(LetterGrade::A, 5)]),
            record(fall(), "C S", "398T", Some("Natural Sciences"), &[]),
        ];
        let tables = SummaryTables::build(&table(records)).unwrap();

        assert!(
            tables
                .course_scatter_rows()
                .iter()
                .all(|r| r.course_number != "398T")
        );

        let empty_bars: Vec<BarRow> = tables
            .bar_rows()
            .into_iter()
            .filter(|b| b.course_number == "398T")
            .collect();
        // All and Fall 2020, one row per letter grade
        assert_eq!(empty_bars.len(), 2 * LetterGrade::COUNT);
        assert!(empty_bars.iter().all(|b| b.total_students == 0));
    }

    #[test]
    fn test_zero_enrollment_prefix_omitted_from_scatter() {
        let records = vec![
            record(fall(), "C S", "312", Some("Natural Sciences"), &[(LetterGrade::A, 5)]),
            record(fall(), "UDN", "386", Some("Architecture"), &[(LetterGrade::Other, 0)]),
        ];
        let tables = SummaryTables::build(&table(records)).unwrap();

        assert!(tables.prefixes.iter().any(|p| p.prefix == "UDN"));
        assert!(
            tables
                .prefix_scatter_rows()
                .iter()
                .all(|r| r.prefix != "UDN")
        );
    }

    #[test]
    fn test_withdrawal_only_course_charted_with_zero_average() {
        let records = vec![
            record(fall(), "C S", "312", Some("Natural Sciences"), &[(LetterGrade::A, 5)]),
            record(fall(), "C S", "378", Some("Natural Sciences"), &[(LetterGrade::Other, 5)]),
        ];
        let tables = SummaryTables::build(&table(records)).unwrap();

        let withdrawn: Vec<CourseScatterRow> = tables
            .course_scatter_rows()
            .into_iter()
            .filter(|r| r.course_number == "378")
            .collect();
        assert_eq!(withdrawn.len(), 2);
        assert!(withdrawn.iter().all(|r| r.average_grade == 0.0));
        assert!(withdrawn.iter().all(|r| r.total_students == 5));
    }

    #[test]
    fn test_other_grades_lower_the_average() {
        let records = vec![record(
            fall(),
            "C S",
            "312",
            Some("Natural Sciences"),
            &[(LetterGrade::A, 10), (LetterGrade::Other, 10)],
        )];
        let tables = SummaryTables::build(&table(records)).unwrap();

        let rows: Vec<(String, u64, f64)> = tables
            .course_scatter_rows()
            .into_iter()
            .map(|r| (r.semester, r.total_students, r.average_grade))
            .collect();
        assert_eq!(
            rows,
            vec![
                ("All".to_string(), 20, 2.0),
                ("Fall 2020".to_string(), 20, 2.0),
            ]
        );
        assert_eq!(tables.prefix_scatter_rows()[0].average_grade, 2.0);
    }

    #[test]
    fn test_overflowing_rollup_is_an_error() {
        let half = u64::MAX / 2 + 1;
        let records = vec![
            record(fall(), "C S", "312", Some("Natural Sciences"), &[(LetterGrade::A, half)]),
            record(spring(), "C S", "312", Some("Natural Sciences"), &[(LetterGrade::A, half)]),
        ];

        let err = summarize_courses(&records).unwrap_err();
        assert!(err.to_string().contains("C S 312"));
        assert!(summarize_prefixes(&records).is_err());
    }

    #[test]
    fn test_bar_rows_carry_grade_points() {
        let records = vec![record(
            fall(),
            "C S",
            "312",
            Some("Natural Sciences"),
            &[(LetterGrade::AMinus, 2), (LetterGrade::Other, 1)],
        )];
        let tables = SummaryTables::build(&table(records)).unwrap();
        let bars = tables.bar_rows();

        let a_minus = bars
            .iter()
            .find(|b| b.letter_grade == "A-" && b.semester == "All")
            .unwrap();
        assert_eq!(a_minus.grade_points, Some(3.67));
        assert_eq!(a_minus.total_students, 2);
        assert_eq!(a_minus.course_name, "C S 312");

        let other = bars
            .iter()
            .find(|b| b.letter_grade == "Other" && b.semester == "Fall 2020")
            .unwrap();
        assert_eq!(other.grade_points, None);
        assert_eq!(other.total_students, 1);
    }

    #[test]
    fn test_scatter_average_is_rounded() {
        let records = vec![record(
            fall(),
            "C S",
            "312",
            Some("Natural Sciences"),
            &[(LetterGrade::A, 1), (LetterGrade::BPlus, 1), (LetterGrade::C, 1)],
        )];
        let tables = SummaryTables::build(&table(records)).unwrap();
        let row = &tables.course_scatter_rows()[0];
        // (4.0 + 3.33 + 2.0) / 3 = 3.11
        assert_eq!(row.average_grade, 3.11);
        assert_eq!(row.semester, "All");
        assert_eq!(row.division, "Lower");
    }

    #[test]
    fn test_empty_records_fail_fast() {
        let err = summarize_prefixes(&[]).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PipelineError>(),
            Some(PipelineError::EmptyTable(_))
        ));
        assert!(summarize_courses(&[]).is_err());
        assert!(grade_distributions(&[]).is_err());
    }
}
