//! Red-flag signal: keyword phrase detection
//!
//! Scans document content for known-malicious guidance phrases, grouped into
//! semantic categories. Hits across several categories compound the penalty:
//! a document that both downgrades security and downplays severity is worse
//! than either alone.

use crate::config::RedFlagCategory;

/// Lines carrying these markers are documented counter-examples, not
/// recommendations; golden-corpus content is pre-filtered on them.
const WARNING_MARKERS: [&str; 4] = ["never ", "warning:", "- never", "do not "];

/// Category of documents that receive the counter-example pre-filter
const GOLDEN_CATEGORY: &str = "golden";

pub struct RedFlagScorer {
    categories: Vec<RedFlagCategory>,
    max_phrases: usize,
}

impl RedFlagScorer {
    pub fn new(categories: Vec<RedFlagCategory>) -> Self {
        let max_phrases = categories.iter().map(|c| c.phrases.len()).sum();
        Self {
            categories,
            max_phrases,
        }
    }

    /// Score in [0, 1]; 1.0 = no red flags. Monotone: adding a phrase hit to
    /// the content can never raise the score.
    pub fn score(&self, content: &str, category: &str) -> f64 {
        if self.max_phrases == 0 {
            return 1.0;
        }

        let scanned = if category == GOLDEN_CATEGORY {
            strip_warning_lines(content)
        } else {
            content.to_lowercase()
        };

        let mut total_hits = 0usize;
        let mut categories_hit = 0usize;
        for group in &self.categories {
            let hits = group
                .phrases
                .iter()
                .filter(|phrase| scanned.contains(phrase.to_lowercase().as_str()))
                .count();
            if hits > 0 {
                categories_hit += 1;
                total_hits += hits;
            }
        }

        let base = (1.0 - 1.5 * total_hits as f64 / self.max_phrases as f64).clamp(0.0, 1.0);
        let multiplier = match categories_hit {
            0 | 1 => 1.0,
            2 => 0.80,
            3 => 0.70,
            _ => 0.60,
        };

        (base * multiplier).clamp(0.0, 1.0)
    }

    /// Detected phrases by category, for reason strings and event detail
    pub fn detect(&self, content: &str) -> (Vec<(&'static str, Vec<String>)>, usize) {
        let lowered = content.to_lowercase();
        let mut detected = Vec::new();
        let mut total = 0usize;
        for group in &self.categories {
            let found: Vec<String> = group
                .phrases
                .iter()
                .filter(|phrase| lowered.contains(phrase.to_lowercase().as_str()))
                .cloned()
                .collect();
            if !found.is_empty() {
                total += found.len();
                detected.push((group.name, found));
            }
        }
        (detected, total)
    }
}

/// Drop lines that carry warning markers, lowercasing the remainder
fn strip_warning_lines(content: &str) -> String {
    content
        .lines()
        .map(|line| line.to_lowercase())
        .filter(|line| !WARNING_MARKERS.iter().any(|marker| line.contains(marker)))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::default_red_flags;

    fn scorer() -> RedFlagScorer {
        RedFlagScorer::new(default_red_flags())
    }

    #[test]
    fn clean_content_scores_one() {
        assert_eq!(scorer().score("Apply the vendor patch promptly.", "clean"), 1.0);
    }

    #[test]
    fn single_category_hit_has_no_multiplier() {
        let s = scorer();
        let one_hit = s.score("Just disable firewall for now.", "clean");
        let max = s.max_phrases as f64;
        let expected = 1.0 - 1.5 / max;
        assert!((one_hit - expected).abs() < 1e-9);
    }

    #[test]
    fn cross_category_hits_compound_the_penalty() {
        let s = scorer();
        // security_downgrade + dangerous_permissions
        let two_cats = s.score("disable firewall then chmod 777 the folder", "poisoned");
        let max = s.max_phrases as f64;
        let expected = (1.0 - 1.5 * 2.0 / max) * 0.80;
        assert!((two_cats - expected).abs() < 1e-9);

        // + severity_downplay + unsafe_operations -> four categories
        let four_cats = s.score(
            "disable firewall, chmod 777, it's not urgent, skip verification",
            "poisoned",
        );
        let expected4 = (1.0 - 1.5 * 4.0 / max) * 0.60;
        assert!((four_cats - expected4).abs() < 1e-9);
        assert!(four_cats < two_cats);
    }

    #[test]
    fn adding_a_phrase_never_raises_the_score() {
        let s = scorer();
        let base = "disable firewall and move on";
        let more = "disable firewall and chmod 777 and move on";
        assert!(s.score(more, "poisoned") <= s.score(base, "poisoned"));
    }

    #[test]
    fn golden_counter_examples_are_filtered() {
        let s = scorer();
        let golden = "Hardening guide.\nNever run chmod 777 on system folders.\nWARNING: do not disable firewall.";
        assert_eq!(s.score(golden, "golden"), 1.0);
        // The same text scored as non-golden still counts the phrases
        assert!(s.score(golden, "clean") < 1.0);
    }

    #[test]
    fn matching_is_case_insensitive() {
        let s = scorer();
        assert!(s.score("DISABLE FIREWALL now", "clean") < 1.0);
    }

    #[test]
    fn detect_reports_categories_and_count() {
        let s = scorer();
        let (detected, total) = s.detect("disable firewall, chmod 777");
        assert_eq!(total, 2);
        let names: Vec<_> = detected.iter().map(|(name, _)| *name).collect();
        assert_eq!(names, vec!["security_downgrade", "dangerous_permissions"]);
    }
}
