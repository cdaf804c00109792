use parking_lot::RwLock;
use regex::Regex;
use thiserror::Error;
use tracing::warn;

/// Extra score added per distinct category beyond the first.
const CATEGORY_BONUS: f64 = 0.1;

/// Substrings that mark a line of raw target output as diagnostic.
const DIAGNOSTIC_MARKERS: &[&str] = &["KASAN", "WARNING", "ERROR", "Oops", "panic"];

/// Built-in severity table, highest priority first: `(regex, score, category)`.
const DEFAULT_PATTERNS: &[(&str, f64, &str)] = &[
    (r"KASAN:.*", 1.0, "KASAN memory error"),
    (r"AddressSanitizer:.*", 1.0, "AddressSanitizer error"),
    (r"kernel BUG at.*", 0.9, "Kernel BUG"),
    (r"Kernel panic.*", 0.9, "Kernel panic"),
    (r"Oops:.*", 0.8, "Kernel Oops"),
    (r"general protection fault.*", 0.8, "General protection fault"),
    (r"page fault.*", 0.7, "Page fault"),
    (r"double fault.*", 0.9, "Double fault"),
    (r"stack segment.*", 0.8, "Stack segment fault"),
    (r"possible deadlock.*", 0.7, "Possible deadlock"),
    (r"lockdep.*", 0.6, "Lockdep warning"),
    (
        r"sleeping function called from invalid context.*",
        0.6,
        "Invalid sleep context",
    ),
    (r"rcu_.*stall.*", 0.6, "RCU stall"),
    (r"RCU.*", 0.5, "RCU related"),
    (r"WARNING:.*", 0.5, "Kernel warning"),
    (r"WARN_ON.*", 0.5, "WARN_ON triggered"),
    (r"memory leak.*", 0.6, "Memory leak"),
    (r"refcount_t.*", 0.6, "Reference count error"),
    (r"EXT4-fs error.*", 0.4, "EXT4 filesystem error"),
    (r"XFS.*error.*", 0.4, "XFS filesystem error"),
    (r"net.*warning.*", 0.3, "Network warning"),
    (r"TCP.*error.*", 0.3, "TCP error"),
    (r"device.*error.*", 0.3, "Device error"),
    (r"driver.*warning.*", 0.2, "Driver warning"),
    (r"ERROR:.*", 0.4, "General error"),
    (r"error.*", 0.2, "Generic error"),
];

#[derive(Error, Debug)]
pub enum LogMatcherError {
    /// The supplied expression does not compile. Existing patterns are unaffected.
    #[error("Invalid log pattern {pattern:?}: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

#[derive(Debug, Clone)]
pub struct LogPattern {
    pub regex: Regex,
    pub score: f64,
    pub category: String,
}

/// Scores diagnostic log lines against a ranked table of patterns.
///
/// The strongest matched category dominates; every additional distinct
/// category adds a small bonus, and the result is clamped to `1.0`.
#[derive(Debug)]
pub struct LogPatternMatcher {
    patterns: RwLock<Vec<LogPattern>>,
}

impl Default for LogPatternMatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl LogPatternMatcher {
    /// Creates a matcher seeded with the built-in severity table.
    pub fn new() -> Self {
        let patterns = DEFAULT_PATTERNS
            .iter()
            .filter_map(|&(expr, score, category)| match Regex::new(expr) {
                Ok(regex) => Some(LogPattern {
                    regex,
                    score,
                    category: category.to_string(),
                }),
                Err(e) => {
                    warn!(pattern = expr, error = %e, "skipping built-in log pattern");
                    None
                }
            })
            .collect();
        Self {
            patterns: RwLock::new(patterns),
        }
    }

    /// Creates a matcher with no patterns; every line scores zero until
    /// patterns are added.
    pub fn empty() -> Self {
        Self {
            patterns: RwLock::new(Vec::new()),
        }
    }

    pub fn add_pattern(
        &self,
        expr: &str,
        score: f64,
        category: &str,
    ) -> Result<(), LogMatcherError> {
        let regex = Regex::new(expr).map_err(|source| LogMatcherError::InvalidPattern {
            pattern: expr.to_string(),
            source,
        })?;
        self.patterns.write().push(LogPattern {
            regex,
            score,
            category: category.to_string(),
        });
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.patterns.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.read().is_empty()
    }

    pub fn score<S: AsRef<str>>(&self, lines: &[S]) -> f64 {
        let matched = self.matches(lines);
        if matched.is_empty() {
            return 0.0;
        }
        let max_score = matched.iter().map(|&(_, s)| s).fold(0.0, f64::max);
        let bonus = (matched.len() - 1) as f64 * CATEGORY_BONUS;
        (max_score + bonus).min(1.0)
    }

    /// Distinct categories matched by `lines`, in first-match order.
    pub fn matched_categories<S: AsRef<str>>(&self, lines: &[S]) -> Vec<String> {
        self.matches(lines).into_iter().map(|(c, _)| c).collect()
    }

    /// Each matched category once, with the score of its first matching pattern.
    fn matches<S: AsRef<str>>(&self, lines: &[S]) -> Vec<(String, f64)> {
        let patterns = self.patterns.read();
        let mut matched: Vec<(String, f64)> = Vec::new();
        for line in lines {
            let line = line.as_ref().trim();
            if line.is_empty() {
                continue;
            }
            for pattern in patterns.iter() {
                if matched.iter().any(|(c, _)| *c == pattern.category) {
                    continue;
                }
                if pattern.regex.is_match(line) {
                    matched.push((pattern.category.clone(), pattern.score));
                }
            }
        }
        matched
    }
}

/// Picks the diagnostic lines out of raw target output.
pub fn extract_log_lines(output: &str) -> Vec<String> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && DIAGNOSTIC_MARKERS.iter().any(|m| line.contains(m)))
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn sanitizer_report_scores_maximum() {
        let matcher = LogPatternMatcher::new();
        assert_eq!(matcher.score(&["KASAN: use-after-free in foo"]), 1.0);
        assert_eq!(
            matcher.score(&["AddressSanitizer: heap-buffer-overflow"]),
            1.0
        );
    }

    #[test]
    fn unmatched_or_empty_lines_score_zero() {
        let matcher = LogPatternMatcher::new();
        assert_eq!(matcher.score(&["normal log message"]), 0.0);
        assert_eq!(matcher.score::<&str>(&[]), 0.0);
        assert_eq!(matcher.score(&["", "   "]), 0.0);
    }

    #[test]
    fn bonus_is_clamped_at_one() {
        let matcher = LogPatternMatcher::new();
        assert_eq!(matcher.score(&["WARNING: x", "KASAN: y"]), 1.0);
    }

    #[test]
    fn two_sub_maximal_categories_get_one_bonus() {
        let matcher = LogPatternMatcher::new();
        // Deadlock (0.7) dominates the warning (0.5); the second category adds 0.1.
        assert!(approx(
            matcher.score(&["WARNING: x", "possible deadlock"]),
            0.8
        ));
        assert!(approx(matcher.score(&["WARNING: x", "WARN_ON(1)"]), 0.6));
    }

    #[test]
    fn category_counts_once_across_lines() {
        let matcher = LogPatternMatcher::new();
        let single = matcher.score(&["WARNING: a"]);
        let repeated = matcher.score(&["WARNING: a", "WARNING: b", "WARNING: c"]);
        assert!(approx(single, 0.5));
        assert!(approx(repeated, single));
    }

    #[test]
    fn one_line_can_match_several_categories() {
        let matcher = LogPatternMatcher::new();
        // Matches both the filesystem category and the generic error catch-all.
        let categories = matcher.matched_categories(&["EXT4-fs error (device sda1)"]);
        assert_eq!(
            categories,
            vec![
                "EXT4 filesystem error".to_string(),
                "Generic error".to_string()
            ]
        );
        assert!(approx(matcher.score(&["EXT4-fs error (device sda1)"]), 0.5));
    }

    #[test]
    fn add_pattern_appends_and_rejects_bad_regex() {
        let matcher = LogPatternMatcher::empty();
        assert!(matcher.is_empty());
        assert_eq!(matcher.score(&["UBSAN: shift-out-of-bounds"]), 0.0);

        matcher
            .add_pattern(r"UBSAN:.*", 0.7, "UBSAN report")
            .expect("valid pattern");
        assert_eq!(matcher.len(), 1);
        assert!(approx(matcher.score(&["UBSAN: shift-out-of-bounds"]), 0.7));

        match matcher.add_pattern(r"unclosed(group", 0.5, "broken") {
            Err(LogMatcherError::InvalidPattern { pattern, .. }) => {
                assert_eq!(pattern, "unclosed(group")
            }
            other => panic!("expected InvalidPattern, got {other:?}"),
        }
        assert_eq!(matcher.len(), 1);
    }

    #[test]
    fn extract_log_lines_keeps_diagnostics_only() {
        let output = "starting\n  KASAN: double-free \nall good\nWARNING: CPU: 0\n\nkernel panic - not syncing\n";
        assert_eq!(
            extract_log_lines(output),
            vec![
                "KASAN: double-free".to_string(),
                "WARNING: CPU: 0".to_string(),
                "kernel panic - not syncing".to_string()
            ]
        );
    }
}
