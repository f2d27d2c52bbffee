use crate::attendance::AttendanceStatus;
use crate::datekey::DayKey;
use chrono::Datelike;
use serde::Serialize;
use std::collections::BTreeMap;

/// Rounded whole-number percentage; 0 when there is nothing to count.
pub fn attendance_percentage(present: u64, total: u64) -> u32 {
    if total == 0 {
        return 0;
    }
    (present as f64 / total as f64 * 100.0).round() as u32
}

pub fn round_2_decimals(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

pub fn score_percentage(scored: f64, total: f64) -> f64 {
    if total > 0.0 {
        100.0 * scored / total
    } else {
        0.0
    }
}

/// Coarse dashboard buckets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum GradeBucket {
    A,
    B,
    C,
    D,
    F,
}

impl GradeBucket {
    pub const ALL: [GradeBucket; 5] = [
        GradeBucket::A,
        GradeBucket::B,
        GradeBucket::C,
        GradeBucket::D,
        GradeBucket::F,
    ];

    pub fn for_percentage(pct: f64) -> Self {
        if pct >= 90.0 {
            Self::A
        } else if pct >= 80.0 {
            Self::B
        } else if pct >= 70.0 {
            Self::C
        } else if pct >= 60.0 {
            Self::D
        } else {
            Self::F
        }
    }
}

/// (letter, minimum percentage, grade points), highest first.
const LETTER_SCALE: &[(&str, f64, f64)] = &[
    ("O", 90.0, 4.0),
    ("A+", 85.0, 3.7),
    ("A", 80.0, 3.3),
    ("B+", 75.0, 3.0),
    ("B", 70.0, 2.7),
    ("B-", 65.0, 2.3),
    ("C+", 60.0, 2.0),
    ("C", 55.0, 1.7),
    ("C-", 50.0, 1.3),
    ("D", 40.0, 1.0),
];

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LetterGrade {
    pub letter: &'static str,
    pub points: f64,
}

pub fn letter_grade(pct: f64) -> LetterGrade {
    LETTER_SCALE
        .iter()
        .find(|(_, min, _)| pct >= *min)
        .map(|(letter, _, points)| LetterGrade {
            letter,
            points: *points,
        })
        .unwrap_or(LetterGrade {
            letter: "F",
            points: 0.0,
        })
}

/// Mean of per-record percentages for one course.
pub fn course_percentage<I>(records: I) -> Option<f64>
where
    I: IntoIterator<Item = (f64, f64)>,
{
    let mut n: usize = 0;
    let mut sum = 0.0;
    for (scored, total) in records {
        n += 1;
        sum += score_percentage(scored, total);
    }
    if n == 0 {
        None
    } else {
        Some(sum / n as f64)
    }
}

/// Credit-weighted mean of grade points, rounded to two decimals.
///
/// Takes `(points, credits)` pairs; courses with non-positive credits are
/// ignored. 0 when nothing remains.
pub fn weighted_gpa<I>(courses: I) -> f64
where
    I: IntoIterator<Item = (f64, f64)>,
{
    let mut weighted = 0.0;
    let mut credits_sum = 0.0;
    for (points, credits) in courses {
        if credits > 0.0 {
            weighted += points * credits;
            credits_sum += credits;
        }
    }
    if credits_sum > 0.0 {
        round_2_decimals(weighted / credits_sum)
    } else {
        0.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthBucket {
    pub year: i32,
    pub month: u32,
    pub month_name: &'static str,
    pub present: u64,
    pub absent: u64,
}

/// Groups records by calendar month, oldest month first.
pub fn monthly_trend<I>(records: I) -> Vec<MonthBucket>
where
    I: IntoIterator<Item = (DayKey, AttendanceStatus)>,
{
    let mut by_month: BTreeMap<(i32, u32), MonthBucket> = BTreeMap::new();
    for (day, status) in records {
        let d = day.date();
        let bucket = by_month
            .entry((d.year(), d.month()))
            .or_insert_with(|| MonthBucket {
                year: d.year(),
                month: d.month(),
                month_name: day.month_name(),
                present: 0,
                absent: 0,
            });
        match status {
            AttendanceStatus::Present => bucket.present += 1,
            AttendanceStatus::Absent => bucket.absent += 1,
        }
    }
    by_month.into_values().collect()
}
