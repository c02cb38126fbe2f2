//! Score extraction from captured harness output.

use anyhow::{Result, anyhow, bail};

/// Prefix of the line the compiled harness prints with its score.
pub const SENTINEL_PREFIX: &str = "Unit Test Returned:";

/// Read the score from the first sentinel line in `text`.
///
/// Returns `0.0` when no line starts with [`SENTINEL_PREFIX`]. A sentinel whose
/// value is not a finite number is an error; the caller decides how to report it.
pub fn parse_score(text: &str) -> Result<f64> {
    let Some(line) = text.lines().find(|line| line.starts_with(SENTINEL_PREFIX)) else {
        return Ok(0.0);
    };
    let value = line[SENTINEL_PREFIX.len()..].trim();
    let score = value
        .parse::<f64>()
        .map_err(|_| anyhow!("could not convert string to float: {value:?}"))?;
    if !score.is_finite() {
        bail!("score must be a finite number, got {value:?}");
    }
    Ok(score)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_first_sentinel_line() {
        let text = "warming up\nUnit Test Returned: 0.75\nUnit Test Returned: 1.0\n";
        assert_eq!(parse_score(text).expect("score"), 0.75);
    }

    #[test]
    fn missing_sentinel_scores_zero() {
        assert_eq!(parse_score("hello\nworld\n").expect("score"), 0.0);
        assert_eq!(parse_score("").expect("score"), 0.0);
    }

    #[test]
    fn sentinel_must_start_the_line() {
        let text = "note: Unit Test Returned: 1.0\n";
        assert_eq!(parse_score(text).expect("score"), 0.0);
    }

    #[test]
    fn integer_scores_are_accepted() {
        assert_eq!(parse_score("Unit Test Returned: 1").expect("score"), 1.0);
    }

    #[test]
    fn non_numeric_sentinel_is_an_error() {
        let err = parse_score("Unit Test Returned: None\n").expect_err("non-numeric");
        assert!(err.to_string().contains("\"None\""));
    }

    #[test]
    fn non_finite_scores_are_errors() {
        for value in ["nan", "inf", "-inf"] {
            let err = parse_score(&format!("Unit Test Returned: {value}\n")).expect_err(value);
            assert!(err.to_string().contains("finite"), "{err}");
        }
    }
}
