//! Sequential, year-scoped order codes: `ORD-YYYY-NNNNN`.
//!
//! The functions here are pure. Uniqueness is the caller's job: the last
//! issued code must be read and the new order written under the same
//! serialization discipline (the store takes a per-year advisory lock for
//! the life of the creating transaction), otherwise two concurrent
//! creates can compute the same next code.

const CODE_PREFIX: &str = "ORD";
const SEQ_WIDTH: usize = 5;

/// Compute the code that follows `last_code` within `year`.
///
/// A missing last code, a last code from an earlier year, or one that
/// does not look like a code at all (treated as a cold start, not an
/// error) all restart the sequence at 1.
pub fn next_code(last_code: Option<&str>, year: i32) -> String {
    match last_code.and_then(parse_code) {
        Some((last_year, last_seq)) if last_year >= year => format_code(year, last_seq + 1),
        _ => format_code(year, 1),
    }
}

/// Split a well-formed code into its year and sequence number.
pub fn parse_code(code: &str) -> Option<(i32, u64)> {
    let rest = code.strip_prefix(CODE_PREFIX)?.strip_prefix('-')?;
    let (year, seq) = rest.split_once('-')?;
    if year.len() != 4 || seq.len() < SEQ_WIDTH {
        return None;
    }
    let year = year.parse::<i32>().ok()?;
    let seq = seq.parse::<u64>().ok()?;
    Some((year, seq))
}

fn format_code(year: i32, seq: u64) -> String {
    format!("{CODE_PREFIX}-{year}-{seq:0width$}", width = SEQ_WIDTH)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_code_of_a_year() {
        assert_eq!(next_code(None, 2025), "ORD-2025-00001");
    }

    #[test]
    fn increments_within_the_year() {
        assert_eq!(
            next_code(Some("ORD-2025-00041"), 2025),
            "ORD-2025-00042"
        );
    }

    #[test]
    fn year_rollover_resets_the_sequence() {
        assert_eq!(
            next_code(Some("ORD-2024-00042"), 2025),
            "ORD-2025-00001"
        );
    }

    #[test]
    fn malformed_last_code_falls_back_to_cold_start() {
        assert_eq!(next_code(Some("garbage"), 2025), "ORD-2025-00001");
        assert_eq!(next_code(Some("ORD-25-00001"), 2025), "ORD-2025-00001");
        assert_eq!(next_code(Some("ORD-2025-1"), 2025), "ORD-2025-00001");
        assert_eq!(next_code(Some(""), 2025), "ORD-2025-00001");
    }

    #[test]
    fn sequence_keeps_widening_past_five_digits() {
        assert_eq!(
            next_code(Some("ORD-2025-99999"), 2025),
            "ORD-2025-100000"
        );
        assert_eq!(
            next_code(Some("ORD-2025-100000"), 2025),
            "ORD-2025-100001"
        );
    }

    #[test]
    fn parse_round_trip() {
        assert_eq!(parse_code("ORD-2025-00042"), Some((2025, 42)));
        assert_eq!(parse_code("ORD-2025-100001"), Some((2025, 100001)));
        assert_eq!(parse_code("PED-2025-00042"), None);
    }
}
