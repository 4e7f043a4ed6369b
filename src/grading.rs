use serde::{Deserialize, Serialize};

pub const FIRST_TEST_MAX: i64 = 20;
pub const SECOND_TEST_MAX: i64 = 20;
pub const EXAM_MAX: i64 = 60;
pub const MANUAL_TOTAL_MAX: i64 = 100;

/// Letter bands, highest floor first. Anything below the last floor is "F".
const STANDARD_BANDS: &[(i64, &str)] = &[(70, "A"), (60, "B"), (50, "C"), (45, "D")];
const BANDED_BANDS: &[(i64, &str)] = &[
    (90, "A++"),
    (80, "A+"),
    (70, "B++"),
    (60, "B+"),
    (50, "C"),
    (40, "D"),
];
const FAIL_LETTER: &str = "F";

/// Threshold table used to turn a total score into a letter grade.
///
/// Two tables exist in the school's history; a workspace picks one through
/// the `policy` field of the `grading` setup section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GradingPolicy {
    /// A/B/C/D/F at 70/60/50/45.
    #[default]
    Standard,
    /// A++/A+/B++/B+/C/D/F at 90/80/70/60/50/40.
    Banded,
}

impl GradingPolicy {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "standard" => Some(Self::Standard),
            "banded" => Some(Self::Banded),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Standard => "standard",
            Self::Banded => "banded",
        }
    }

    fn bands(self) -> &'static [(i64, &'static str)] {
        match self {
            Self::Standard => STANDARD_BANDS,
            Self::Banded => BANDED_BANDS,
        }
    }

    pub fn letter_for(self, total_score: i64) -> &'static str {
        self.bands()
            .iter()
            .find(|(floor, _)| total_score >= *floor)
            .map(|(_, letter)| *letter)
            .unwrap_or(FAIL_LETTER)
    }
}

/// Component scores of one subject as entered by a teacher.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentScores {
    pub first_test: Option<i64>,
    pub second_test: Option<i64>,
    pub exam: Option<i64>,
    pub manual_total: Option<i64>,
}

impl ComponentScores {
    pub fn total(&self) -> i64 {
        compute_total(self.first_test, self.second_test, self.exam, self.manual_total)
    }
}

/// Cumulative scores carried over from earlier terms.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TermScores {
    pub first_term_score: Option<i64>,
    pub second_term_score: Option<i64>,
    pub average_score: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

pub fn compute_total(
    first_test: Option<i64>,
    second_test: Option<i64>,
    exam: Option<i64>,
    manual_total: Option<i64>,
) -> i64 {
    if let Some(total) = manual_total {
        return total;
    }
    // Unvalidated input reaches here from previews.
    first_test
        .unwrap_or(0)
        .saturating_add(second_test.unwrap_or(0))
        .saturating_add(exam.unwrap_or(0))
}

/// Blank overrides count as absent.
pub fn normalize_manual_grade(raw: Option<&str>) -> Option<String> {
    raw.map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.to_uppercase())
}

pub fn compute_grade(total_score: i64, manual_grade: Option<&str>, policy: GradingPolicy) -> String {
    normalize_manual_grade(manual_grade)
        .unwrap_or_else(|| policy.letter_for(total_score).to_string())
}

fn check_range(errors: &mut Vec<FieldError>, field: &str, value: Option<i64>, max: i64) {
    let Some(v) = value else {
        return;
    };
    if !(0..=max).contains(&v) {
        errors.push(FieldError::new(
            field,
            format!("must be between 0 and {}", max),
        ));
    }
}

fn check_non_negative(errors: &mut Vec<FieldError>, field: &str, value: Option<i64>) {
    if matches!(value, Some(v) if v < 0) {
        errors.push(FieldError::new(field, "must not be negative"));
    }
}

/// Collects every out-of-range field; an empty result means the scores may
/// be stored.
pub fn validate(scores: &ComponentScores, term_scores: &TermScores) -> Vec<FieldError> {
    let mut errors = Vec::new();
    check_range(&mut errors, "first_test", scores.first_test, FIRST_TEST_MAX);
    check_range(&mut errors, "second_test", scores.second_test, SECOND_TEST_MAX);
    check_range(&mut errors, "exam", scores.exam, EXAM_MAX);
    check_range(&mut errors, "manual_total", scores.manual_total, MANUAL_TOTAL_MAX);

    check_non_negative(&mut errors, "first_term_score", term_scores.first_term_score);
    check_non_negative(&mut errors, "second_term_score", term_scores.second_term_score);
    if let Some(avg) = term_scores.average_score {
        if !avg.is_finite() || avg < 0.0 {
            errors.push(FieldError::new("average_score", "must not be negative"));
        }
    }
    errors
}

/// `Int(10*x + 0.5) / 10`, the rounding used for printed averages.
pub fn round_off_1_decimal(x: f64) -> f64 {
    ((10.0 * x) + 0.5).floor() / 10.0
}

pub fn mean_total(totals: &[i64]) -> Option<f64> {
    if totals.is_empty() {
        return None;
    }
    let sum: i64 = totals.iter().sum();
    Some(round_off_1_decimal(sum as f64 / totals.len() as f64))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scores(ft: i64, st: i64, ex: i64) -> ComponentScores {
        ComponentScores {
            first_test: Some(ft),
            second_test: Some(st),
            exam: Some(ex),
            manual_total: None,
        }
    }

    fn fields(errors: &[FieldError]) -> Vec<&str> {
        errors.iter().map(|e| e.field.as_str()).collect()
    }

    #[test]
    fn total_is_sum_of_components_in_range() {
        for ft in [0, 7, 20] {
            for st in [0, 13, 20] {
                for ex in [0, 45, 60] {
                    assert_eq!(scores(ft, st, ex).total(), ft + st + ex);
                }
            }
        }
    }

    #[test]
    fn missing_components_count_as_zero() {
        assert_eq!(compute_total(Some(12), None, Some(40), None), 52);
        assert_eq!(compute_total(None, None, None, None), 0);
    }

    #[test]
    fn manual_total_overrides_components() {
        assert_eq!(compute_total(Some(20), Some(20), Some(60), Some(10)), 10);
        assert_eq!(compute_total(None, None, None, Some(0)), 0);
    }

    #[test]
    fn oversized_components_saturate() {
        assert_eq!(compute_total(Some(i64::MAX), Some(1), None, None), i64::MAX);
        assert_eq!(compute_total(Some(i64::MIN), Some(-1), Some(5), None), i64::MIN + 5);
    }

    #[test]
    fn standard_boundaries_are_inclusive() {
        let p = GradingPolicy::Standard;
        assert_eq!(p.letter_for(100), "A");
        assert_eq!(p.letter_for(70), "A");
        assert_eq!(p.letter_for(69), "B");
        assert_eq!(p.letter_for(60), "B");
        assert_eq!(p.letter_for(59), "C");
        assert_eq!(p.letter_for(50), "C");
        assert_eq!(p.letter_for(49), "D");
        assert_eq!(p.letter_for(45), "D");
        assert_eq!(p.letter_for(44), "F");
        assert_eq!(p.letter_for(0), "F");
    }

    #[test]
    fn banded_boundaries_are_inclusive() {
        let p = GradingPolicy::Banded;
        assert_eq!(p.letter_for(90), "A++");
        assert_eq!(p.letter_for(89), "A+");
        assert_eq!(p.letter_for(80), "A+");
        assert_eq!(p.letter_for(70), "B++");
        assert_eq!(p.letter_for(60), "B+");
        assert_eq!(p.letter_for(50), "C");
        assert_eq!(p.letter_for(40), "D");
        assert_eq!(p.letter_for(39), "F");
    }

    #[test]
    fn standard_grade_is_always_a_known_letter() {
        for total in 0..=100 {
            let g = compute_grade(total, None, GradingPolicy::Standard);
            assert!(["A", "B", "C", "D", "F"].contains(&g.as_str()), "{total} -> {g}");
        }
    }

    #[test]
    fn manual_grade_overrides_and_is_uppercased() {
        assert_eq!(compute_grade(95, Some("b"), GradingPolicy::Standard), "B");
        assert_eq!(compute_grade(10, Some(" a+ "), GradingPolicy::Standard), "A+");
        assert_eq!(compute_grade(72, Some("   "), GradingPolicy::Standard), "A");
        assert_eq!(compute_grade(72, Some(""), GradingPolicy::Banded), "B++");
    }

    #[test]
    fn validate_rejects_first_test_above_twenty() {
        let errors = validate(&scores(21, 0, 0), &TermScores::default());
        assert_eq!(fields(&errors), vec!["first_test"]);
    }

    #[test]
    fn validate_exam_bounds() {
        assert_eq!(
            fields(&validate(&scores(0, 0, 61), &TermScores::default())),
            vec!["exam"]
        );
        assert!(validate(&scores(0, 0, 60), &TermScores::default()).is_empty());
    }

    #[test]
    fn validate_manual_total_bounds() {
        let mut s = scores(10, 10, 10);
        s.manual_total = Some(101);
        assert_eq!(fields(&validate(&s, &TermScores::default())), vec!["manual_total"]);
        s.manual_total = Some(100);
        assert!(validate(&s, &TermScores::default()).is_empty());
    }

    #[test]
    fn validate_collects_every_violation() {
        let s = ComponentScores {
            first_test: Some(-1),
            second_test: Some(25),
            exam: Some(61),
            manual_total: Some(101),
        };
        let t = TermScores {
            first_term_score: Some(-5),
            second_term_score: Some(-1),
            average_score: Some(-0.5),
        };
        assert_eq!(
            fields(&validate(&s, &t)),
            vec![
                "first_test",
                "second_test",
                "exam",
                "manual_total",
                "first_term_score",
                "second_term_score",
                "average_score"
            ]
        );
    }

    #[test]
    fn policy_parse_is_case_insensitive() {
        assert_eq!(GradingPolicy::parse("Banded"), Some(GradingPolicy::Banded));
        assert_eq!(GradingPolicy::parse(" standard "), Some(GradingPolicy::Standard));
        assert_eq!(GradingPolicy::parse("curve"), None);
    }

    #[test]
    fn mean_total_rounds_to_one_decimal() {
        assert_eq!(mean_total(&[]), None);
        assert_eq!(mean_total(&[70, 65, 81]), Some(72.0));
        assert_eq!(mean_total(&[70, 65]), Some(67.5));
        assert_eq!(mean_total(&[1, 1, 2]), Some(1.3));
    }
}
