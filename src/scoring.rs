use crate::model::KeywordMatch;
use crate::util::round2;

// An empty keyword list scores 0.0, not 1.0.
pub fn check_keywords(response: &str, expected_keywords: &[String]) -> KeywordMatch {
    let response_lower = response.to_lowercase();

    let (found, missing): (Vec<String>, Vec<String>) = expected_keywords
        .iter()
        .cloned()
        .partition(|keyword| response_lower.contains(&keyword.to_lowercase()));

    let total = expected_keywords.len().max(1);

    KeywordMatch {
        match_ratio: round2(found.len() as f64 / total as f64),
        found,
        missing,
    }
}

#[cfg(test)]
mod tests {
    use super::check_keywords;

    fn keywords(values: &[&str]) -> Vec<String> {
        values.iter().map(|value| value.to_string()).collect()
    }

    #[test]
    fn matches_are_case_insensitive_substrings() {
        let expected = keywords(&["PARIS", "capital", "Seine"]);
        let result = check_keywords("Paris is the Capital of France.", &expected);

        assert_eq!(result.found, keywords(&["PARIS", "capital"]));
        assert_eq!(result.missing, keywords(&["Seine"]));
        assert_eq!(result.match_ratio, 0.67);
    }

    #[test]
    fn found_and_missing_partition_expected_in_order() {
        let expected = keywords(&["alpha", "beta", "gamma", "delta"]);
        let result = check_keywords("gamma then alpha", &expected);

        assert_eq!(result.found, keywords(&["alpha", "gamma"]));
        assert_eq!(result.missing, keywords(&["beta", "delta"]));
        assert_eq!(result.found.len() + result.missing.len(), expected.len());
        assert!(result.found.iter().all(|kw| !result.missing.contains(kw)));
        assert_eq!(result.match_ratio, 0.5);
    }

    #[test]
    fn empty_keyword_list_scores_zero() {
        let result = check_keywords("anything at all", &[]);
        assert!(result.found.is_empty());
        assert!(result.missing.is_empty());
        assert_eq!(result.match_ratio, 0.0);
    }

    #[test]
    fn empty_response_misses_everything() {
        let expected = keywords(&["timeout"]);
        let result = check_keywords("", &expected);
        assert_eq!(result.missing, expected);
        assert_eq!(result.match_ratio, 0.0);
    }

    #[test]
    fn full_match_scores_one() {
        let expected = keywords(&["ISO", "26262"]);
        let result = check_keywords("see iso 26262 part 6", &expected);
        assert_eq!(result.match_ratio, 1.0);
        assert!(result.missing.is_empty());
    }
}
