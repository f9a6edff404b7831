use std::fmt;
use thiserror::Error;

/// Letter grades tracked per course offering.
///
/// `A+` folds into [`LetterGrade::A`]; withdrawals, credit/no-credit and other
/// non-point symbols fold into [`LetterGrade::Other`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LetterGrade {
    A,
    AMinus,
    BPlus,
    B,
    BMinus,
    CPlus,
    C,
    CMinus,
    DPlus,
    D,
    DMinus,
    F,
    Other,
}

/// Non-point symbols recognized as grade columns in wide files.
const OTHER_SYMBOLS: &[&str] = &["OTHER", "W", "Q", "CR", "NC", "I", "X", "P"];

impl LetterGrade {
    pub const COUNT: usize = 13;

    pub const ALL: [LetterGrade; Self::COUNT] = [
        LetterGrade::A,
        LetterGrade::AMinus,
        LetterGrade::BPlus,
        LetterGrade::B,
        LetterGrade::BMinus,
        LetterGrade::CPlus,
        LetterGrade::C,
        LetterGrade::CMinus,
        LetterGrade::DPlus,
        LetterGrade::D,
        LetterGrade::DMinus,
        LetterGrade::F,
        LetterGrade::Other,
    ];

    pub fn symbol(self) -> &'static str {
        match self {
            LetterGrade::A => "A",
            LetterGrade::AMinus => "A-",
            LetterGrade::BPlus => "B+",
            LetterGrade::B => "B",
            LetterGrade::BMinus => "B-",
            LetterGrade::CPlus => "C+",
            LetterGrade::C => "C",
            LetterGrade::CMinus => "C-",
            LetterGrade::DPlus => "D+",
            LetterGrade::D => "D",
            LetterGrade::DMinus => "D-",
            LetterGrade::F => "F",
            LetterGrade::Other => "Other",
        }
    }

    /// Grade points used for averaging. `Other` carries none.
    ///
    /// | Grade | Points |
    /// |-------|--------|
    /// | A     | 4.0    |
    /// | A-    | 3.67   |
    /// | B+    | 3.33   |
    /// | B     | 3.0    |
    /// | B-    | 2.67   |
    /// | C+    | 2.33   |
    /// | C     | 2.0    |
    /// | C-    | 1.67   |
    /// | D+    | 1.33   |
    /// | D     | 1.0    |
    /// | D-    | 0.67   |
    /// | F     | 0.0    |
    pub fn grade_points(self) -> Option<f64> {
        match self {
            LetterGrade::A => Some(4.0),
            LetterGrade::AMinus => Some(3.67),
            LetterGrade::BPlus => Some(3.33),
            LetterGrade::B => Some(3.0),
            LetterGrade::BMinus => Some(2.67),
            LetterGrade::CPlus => Some(2.33),
            LetterGrade::C => Some(2.0),
            LetterGrade::CMinus => Some(1.67),
            LetterGrade::DPlus => Some(1.33),
            LetterGrade::D => Some(1.0),
            LetterGrade::DMinus => Some(0.67),
            LetterGrade::F => Some(0.0),
            LetterGrade::Other => None,
        }
    }

    /// Matches only symbols that are known grades, for header detection.
    pub fn from_symbol(raw: &str) -> Option<LetterGrade> {
        let symbol = raw.trim().to_ascii_uppercase();
        let grade = match symbol.as_str() {
            "A+" | "A" => LetterGrade::A,
            "A-" => LetterGrade::AMinus,
            "B+" => LetterGrade::BPlus,
            "B" => LetterGrade::B,
            "B-" => LetterGrade::BMinus,
            "C+" => LetterGrade::CPlus,
            "C" => LetterGrade::C,
            "C-" => LetterGrade::CMinus,
            "D+" => LetterGrade::DPlus,
            "D" => LetterGrade::D,
            "D-" => LetterGrade::DMinus,
            "F" => LetterGrade::F,
            s if OTHER_SYMBOLS.contains(&s) => LetterGrade::Other,
            _ => return None,
        };
        Some(grade)
    }

    /// Lenient parse for cell values: any unknown non-empty symbol is `Other`.
    pub fn parse(raw: &str) -> Option<LetterGrade> {
        if raw.trim().is_empty() {
            return None;
        }
        Some(Self::from_symbol(raw).unwrap_or(LetterGrade::Other))
    }

    fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for LetterGrade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// A count that would push a tally past `u64::MAX`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("student count overflows a 64-bit tally")]
pub struct CountOverflow;

/// Student counts per letter grade. Enrollment is the sum of every bucket.
///
/// The enrollment always fits in a `u64`; additions that would break that
/// are rejected and leave the counts untouched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GradeCounts([u64; LetterGrade::COUNT]);

impl GradeCounts {
    pub fn single(grade: LetterGrade, count: u64) -> Self {
        let mut counts = GradeCounts::default();
        counts.0[grade.index()] = count;
        counts
    }

    pub fn add(&mut self, grade: LetterGrade, count: u64) -> Result<(), CountOverflow> {
        self.total().checked_add(count).ok_or(CountOverflow)?;
        self.0[grade.index()] += count;
        Ok(())
    }

    pub fn get(&self, grade: LetterGrade) -> u64 {
        self.0[grade.index()]
    }

    pub fn merge(&mut self, other: &GradeCounts) -> Result<(), CountOverflow> {
        self.total()
            .checked_add(other.total())
            .ok_or(CountOverflow)?;
        for (mine, theirs) in self.0.iter_mut().zip(other.0.iter()) {
            *mine += theirs;
        }
        Ok(())
    }

    pub fn total(&self) -> u64 {
        self.0.iter().sum()
    }

    pub fn grade_point_sum(&self) -> f64 {
        LetterGrade::ALL
            .iter()
            .filter_map(|g| g.grade_points().map(|p| p * self.get(*g) as f64))
            .sum()
    }

    /// Grade points per enrolled student. `Other` students count toward the
    /// denominator with zero points. `None` only when enrollment is zero.
    pub fn mean_grade_points(&self) -> Option<f64> {
        let total = self.total();
        if total == 0 {
            None
        } else {
            Some(self.grade_point_sum() / total as f64)
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (LetterGrade, u64)> + '_ {
        LetterGrade::ALL.iter().map(move |g| (*g, self.get(*g)))
    }
}
