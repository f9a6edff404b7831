/// Rounds to four decimal places, the precision written to summary tables.
pub fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

/// Returns the lexicographically first non-empty value, or an empty string.
pub fn first_non_empty<'a>(values: impl IntoIterator<Item = &'a String>) -> String {
    values
        .into_iter()
        .filter(|v| !v.is_empty())
        .min()
        .cloned()
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round4() {
        assert_eq!(round4(3.123_456), 3.1235);
        assert_eq!(round4(3.2), 3.2);
        assert_eq!(round4(0.0), 0.0);
    }

    #[test]
    fn test_first_non_empty() {
        let values = vec![
            String::new(),
            "Mathematics".to_string(),
            "Computer Science".to_string(),
        ];
        assert_eq!(first_non_empty(&values), "Computer Science");
        assert_eq!(first_non_empty(&vec![String::new()]), "");
    }
}
