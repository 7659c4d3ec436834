//! Canonical year-month keys and the free-text month resolver

use std::{fmt::Display, str::FromStr, sync::OnceLock};

use chrono::{Datelike, NaiveDate};
use regex::Regex;
use serde::{Serialize, Serializer};

use crate::errors::Error;

/// A calendar month, `1 <= month <= 12`.
///
/// All date filtering goes through this type, never through formatted strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MonthKey {
    year: i32,
    month: u32,
}

impl MonthKey {
    /// Creates a key, or `None` if `month` is outside `1..=12`
    #[must_use]
    pub fn new(year: i32, month: u32) -> Option<Self> {
        (1..=12).contains(&month).then_some(Self { year, month })
    }

    /// The month containing `date`
    #[must_use]
    pub fn of(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    /// Returns the year
    #[must_use]
    #[inline]
    pub fn year(&self) -> i32 {
        self.year
    }

    /// Returns the month, 1 through 12
    #[must_use]
    #[inline]
    pub fn month(&self) -> u32 {
        self.month
    }

    /// The month before this one, rolling January back to December of the prior year
    #[must_use]
    pub fn previous(&self) -> Self {
        if self.month == 1 {
            Self {
                year: self.year - 1,
                month: 12,
            }
        } else {
            Self {
                year: self.year,
                month: self.month - 1,
            }
        }
    }

    /// Whether `date` falls inside this month
    #[must_use]
    pub fn contains(&self, date: NaiveDate) -> bool {
        date.year() == self.year && date.month() == self.month
    }
}

impl Display for MonthKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl Serialize for MonthKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Strict `YYYY-MM` parsing (month may omit its leading zero)
impl FromStr for MonthKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let unresolved = || Error::UnresolvedMonth(s.to_string());
        let (year, month) = s.trim().split_once('-').ok_or_else(unresolved)?;
        if year.len() != 4 || !(1..=2).contains(&month.len()) {
            return Err(unresolved());
        }
        if !year.bytes().chain(month.bytes()).all(|b| b.is_ascii_digit()) {
            return Err(unresolved());
        }
        let year = year.parse().map_err(|_| unresolved())?;
        let month = month.parse().map_err(|_| unresolved())?;
        MonthKey::new(year, month).ok_or_else(unresolved)
    }
}

/// The phrasings the resolver understands, tried in [`MonthPattern::PRIORITY`] order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonthPattern {
    /// `2025-08`, `2025/8`
    ExplicitYearMonth,
    /// `2025年8月`
    KanjiYearMonth,
    /// `8月`, year taken from the reference date
    BareMonth,
    /// `今月`
    RelativeCurrent,
    /// `先月`
    RelativePrevious,
}

impl MonthPattern {
    /// First match wins
    pub const PRIORITY: [MonthPattern; 5] = [
        MonthPattern::ExplicitYearMonth,
        MonthPattern::KanjiYearMonth,
        MonthPattern::BareMonth,
        MonthPattern::RelativeCurrent,
        MonthPattern::RelativePrevious,
    ];

    /// Tries this pattern against already-normalized text
    #[must_use]
    pub fn try_match(self, text: &str, today: NaiveDate) -> Option<MonthKey> {
        match self {
            MonthPattern::ExplicitYearMonth => first_year_month(explicit_re(), text),
            MonthPattern::KanjiYearMonth => first_year_month(kanji_re(), text),
            MonthPattern::BareMonth => bare_month_re()
                .captures_iter(text)
                .filter_map(|caps| caps[1].parse::<u32>().ok())
                .find_map(|month| {
                    let year = if month > today.month() {
                        today.year() - 1
                    } else {
                        today.year()
                    };
                    MonthKey::new(year, month)
                }),
            MonthPattern::RelativeCurrent => text.contains("今月").then(|| MonthKey::of(today)),
            MonthPattern::RelativePrevious => {
                text.contains("先月").then(|| MonthKey::of(today).previous())
            }
        }
    }
}

fn explicit_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?:^|[^0-9])([0-9]{4})[-/]([0-9]{1,2})(?:[^0-9]|$)")
            .expect("invalid explicit month regex")
    })
}

fn kanji_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"([0-9]{4})\s*年\s*([0-9]{1,2})\s*月").expect("invalid kanji month regex")
    })
}

fn bare_month_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?:^|[^0-9])([0-9]{1,2})\s*月").expect("invalid bare month regex")
    })
}

fn first_year_month(re: &Regex, text: &str) -> Option<MonthKey> {
    re.captures_iter(text).find_map(|caps| {
        let year = caps[1].parse().ok()?;
        let month = caps[2].parse().ok()?;
        MonthKey::new(year, month)
    })
}

/// Folds full-width digits and separators to ASCII so `２０２５／８` reads like `2025/8`.
fn normalize(text: &str) -> String {
    text.trim()
        .chars()
        .map(|c| match c {
            '０'..='９' => char::from_u32(c as u32 - '０' as u32 + '0' as u32).unwrap_or(c),
            '／' => '/',
            '－' | '−' => '-',
            '　' => ' ',
            other => other,
        })
        .collect()
}

/// Resolves a free-text month designator relative to `today`.
///
/// `today` is always supplied by the caller; the resolver never reads the clock.
///
/// # Errors
/// [`Error::UnresolvedMonth`] carrying the original text if no pattern matches
pub fn resolve_month(text: &str, today: NaiveDate) -> Result<MonthKey, Error> {
    let normalized = normalize(text);
    MonthPattern::PRIORITY
        .iter()
        .find_map(|pattern| pattern.try_match(&normalized, today))
        .ok_or_else(|| Error::UnresolvedMonth(text.to_string()))
}
