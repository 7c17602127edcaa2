use common::FilterConfig;

/// Keyword and score filter.
///
/// Keywords are matched case-insensitively as substrings of
/// `title + " " + description`. Exclusion wins over inclusion.
#[derive(Debug, Clone, Default)]
pub struct FilterEngine {
    include: Vec<String>,
    exclude: Vec<String>,
    min_score: i64,
}

impl FilterEngine {
    pub fn new(include: &[String], exclude: &[String], min_score: i64) -> Self {
        let lower = |words: &[String]| -> Vec<String> {
            words
                .iter()
                .map(|w| w.trim().to_lowercase())
                .filter(|w| !w.is_empty())
                .collect()
        };
        Self {
            include: lower(include),
            exclude: lower(exclude),
            min_score,
        }
    }

    pub fn from_config(cfg: &FilterConfig) -> Self {
        Self::new(&cfg.include, &cfg.exclude, cfg.min_score)
    }

    pub fn passes(&self, title: Option<&str>, description: Option<&str>, score: Option<i64>) -> bool {
        let haystack = format!("{} {}", title.unwrap_or(""), description.unwrap_or("")).to_lowercase();

        if !self.include.is_empty() && !self.include.iter().any(|k| haystack.contains(k.as_str())) {
            return false;
        }
        if self.exclude.iter().any(|k| haystack.contains(k.as_str())) {
            return false;
        }
        if self.min_score > 0 && score.unwrap_or(0) < self.min_score {
            return false;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn no_filters_pass_everything() {
        let f = FilterEngine::default();
        assert!(f.passes(None, None, None));
        assert!(f.passes(Some("anything"), Some("at all"), Some(-3)));
    }

    #[test]
    fn include_requires_a_match() {
        let f = FilterEngine::new(&words(&["Rust", "llm"]), &[], 0);
        assert!(f.passes(Some("Why RUST matters"), None, None));
        assert!(f.passes(None, Some("new LLM release"), None));
        assert!(!f.passes(Some("Go 1.22"), Some("generics"), Some(999)));
    }

    #[test]
    fn exclude_wins_over_include() {
        let f = FilterEngine::new(&words(&["rust"]), &words(&["Crypto"]), 0);
        assert!(!f.passes(Some("Rust crypto wallet"), None, Some(100)));
        assert!(f.passes(Some("Rust compiler"), None, None));
    }

    #[test]
    fn title_and_description_are_joined_with_a_space() {
        let f = FilterEngine::new(&words(&["foo bar"]), &[], 0);
        assert!(f.passes(Some("foo"), Some("bar"), None));
        let f = FilterEngine::new(&words(&["foobar"]), &[], 0);
        assert!(!f.passes(Some("foo"), Some("bar"), None));
    }

    #[test]
    fn missing_score_counts_as_zero() {
        let f = FilterEngine::new(&[], &[], 10);
        assert!(!f.passes(Some("t"), None, None));
        assert!(!f.passes(Some("t"), None, Some(9)));
        assert!(f.passes(Some("t"), None, Some(10)));
    }

    #[test]
    fn zero_threshold_disables_score_check() {
        let f = FilterEngine::new(&[], &[], 0);
        assert!(f.passes(Some("t"), None, None));
        let f = FilterEngine::new(&[], &[], -5);
        assert!(f.passes(Some("t"), None, Some(-10)));
    }
}
