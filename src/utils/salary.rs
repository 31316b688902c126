use once_cell::sync::Lazy;
use regex::Regex;

use crate::models::job::SalaryType;

/// First (and optional second) amount in a salary field, after normalization.
/// Accepts "1200", "1,200", "¥1,200〜1,500/時" and similar feed variants.
static SALARY_RANGE_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(\d[\d,]*)\s*(?:[〜~～\-–]\s*(\d[\d,]*))?")
        .expect("Failed to compile SALARY_RANGE_REGEX")
});

static HOURLY_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"時給|/時|hourly").expect("Failed to compile HOURLY_REGEX"));

static DAILY_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"日給|/日|daily").expect("Failed to compile DAILY_REGEX"));

static MONTHLY_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"月給|/月|monthly").expect("Failed to compile MONTHLY_REGEX"));

/// Salary bounds recovered from one free-text field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedSalary {
    pub min: i32,
    pub max: Option<i32>,
    pub salary_type: Option<SalaryType>,
}

/// Feed exports mix half-width and full-width digits and separators.
fn normalize(raw: &str) -> String {
    raw.chars()
        .map(|c| match c {
            '０'..='９' => char::from_u32(c as u32 - '０' as u32 + '0' as u32).unwrap_or(c),
            '，' | '、' => ',',
            '￥' => '¥',
            _ => c,
        })
        .collect()
}

/// Parse a single salary bound ("1,200", "￥１２００") into yen.
pub fn parse_amount(raw: &str) -> Option<i32> {
    let normalized = normalize(raw.trim());
    if normalized.is_empty() {
        return None;
    }
    let captures = SALARY_RANGE_REGEX.captures(&normalized)?;
    captures[1].replace(',', "").parse().ok()
}

/// Parse a salary-type column value. Accepts the canonical english tokens and
/// the Japanese markers the raw feed sometimes carries.
pub fn parse_salary_type(raw: &str) -> Option<SalaryType> {
    let normalized = raw.trim().to_lowercase();
    if normalized.is_empty() {
        return None;
    }
    if HOURLY_REGEX.is_match(&normalized) {
        Some(SalaryType::Hourly)
    } else if DAILY_REGEX.is_match(&normalized) {
        Some(SalaryType::Daily)
    } else if MONTHLY_REGEX.is_match(&normalized) {
        Some(SalaryType::Monthly)
    } else {
        None
    }
}

/// Collapse a combined display string ("¥1,200〜1,500/時") into typed bounds.
/// Returns None when no digits are present.
pub fn parse_salary_text(raw: &str) -> Option<ParsedSalary> {
    let normalized = normalize(raw.trim());
    let captures = SALARY_RANGE_REGEX.captures(&normalized)?;

    let min: i32 = captures[1].replace(',', "").parse().ok()?;
    let max = captures
        .get(2)
        .and_then(|m| m.as_str().replace(',', "").parse().ok());

    Some(ParsedSalary {
        min,
        max,
        salary_type: parse_salary_type(&normalized),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_number_parses() {
        assert_eq!(parse_amount("1200"), Some(1200));
        assert_eq!(parse_amount(" 1,200 "), Some(1200));
    }

    #[test]
    fn full_width_digits_parse() {
        assert_eq!(parse_amount("￥１，２００"), Some(1200));
    }

    #[test]
    fn blank_is_none() {
        assert_eq!(parse_amount(""), None);
        assert_eq!(parse_amount("   "), None);
        assert_eq!(parse_salary_text("応相談"), None);
    }

    #[test]
    fn display_range_collapses() {
        let parsed = parse_salary_text("¥1,200〜1,500/時").unwrap();
        assert_eq!(parsed.min, 1200);
        assert_eq!(parsed.max, Some(1500));
        assert_eq!(parsed.salary_type, Some(SalaryType::Hourly));
    }

    #[test]
    fn ascii_dash_range_collapses() {
        let parsed = parse_salary_text("1200-1500").unwrap();
        assert_eq!(parsed.min, 1200);
        assert_eq!(parsed.max, Some(1500));
        assert_eq!(parsed.salary_type, None);
    }

    #[test]
    fn daily_and_monthly_markers() {
        assert_eq!(parse_salary_type("日給"), Some(SalaryType::Daily));
        assert_eq!(parse_salary_type("月給"), Some(SalaryType::Monthly));
        assert_eq!(parse_salary_type("daily"), Some(SalaryType::Daily));
        assert_eq!(parse_salary_type("weekly"), None);
    }

    #[test]
    fn single_bound_text() {
        let parsed = parse_salary_text("時給1,100円").unwrap();
        assert_eq!(parsed.min, 1100);
        assert_eq!(parsed.max, None);
        assert_eq!(parsed.salary_type, Some(SalaryType::Hourly));
    }
}
