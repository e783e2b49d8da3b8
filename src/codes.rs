//! Human-readable identifiers: sample codes and Unique Lab Report numbers.
//!
//! Both generators are pure. The sequence number they format has already been
//! reserved by the caller inside a transaction; nothing here allocates.

use chrono::{Datelike, Local};

use crate::config::{SAMPLE_CODE_SEQUENCE_WIDTH, ULR_SEQUENCE_WIDTH};

/// Where lifecycle managers read the current year from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum YearSource {
    /// Local wall clock.
    #[default]
    System,
    /// Pinned year, for replays and tests.
    Fixed(i32),
}

impl YearSource {
    pub fn current(self) -> i32 {
        match self {
            Self::System => Local::now().year(),
            Self::Fixed(year) => year,
        }
    }
}

fn two_digit_year(year: i32) -> String {
    format!("{:02}", year.rem_euclid(100))
}

/// `yy` + first letter of the type name (uppercased) + six-digit sequence.
///
/// `generate_sample_code("Soil", 42, 2025)` is `"25S000042"`.
pub fn generate_sample_code(type_name: &str, sequence: u32, year: i32) -> String {
    let letter: String = type_name
        .trim()
        .chars()
        .next()
        .map(|c| c.to_uppercase().collect())
        .unwrap_or_default();
    format!(
        "{}{}{:0width$}",
        two_digit_year(year),
        letter,
        sequence,
        width = SAMPLE_CODE_SEQUENCE_WIDTH
    )
}

/// `"TC"` + certification number + `yy` + `"0"` + eight-digit sequence + `P`/`F`.
///
/// `generate_ulr(7275, 42, false, 2025)` is `"TC727525000000042F"`.
pub fn generate_ulr(certification_number: u32, sequence: u32, is_partial: bool, year: i32) -> String {
    let suffix = if is_partial { 'P' } else { 'F' };
    format!(
        "TC{}{}0{:0width$}{}",
        certification_number,
        two_digit_year(year),
        sequence,
        suffix,
        width = ULR_SEQUENCE_WIDTH
    )
}
