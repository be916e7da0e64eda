//! Expected-error classification.
//!
//! Randomly generated queries are allowed to fail. An engine error whose
//! message matches one of the classifier's patterns is an expected error and
//! the check is skipped; any other error is reported by the oracle as a
//! violation. The list is audited configuration: entries are added by hand
//! (or with `--expected-error`), never inferred.

use std::fmt;

use regex::Regex;

/// Why an error message is expected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
pub enum ErrorCategory {
    /// The engine does not support the construct (dialect gaps, missing
    /// functions, argument validation).
    ExpectedLimitation,
    /// A reported engine defect that would otherwise drown out new findings.
    KnownDefect,
    /// An oracle construction the engine legitimately rejects.
    FalsePositive,
    /// Added without triage, e.g. from the command line.
    Untriaged,
}

/// How a pattern matches an error message.
#[derive(Debug, Clone)]
pub enum PatternMatcher {
    Substring(String),
    Regex(Regex),
}

/// One expected-error entry.
#[derive(Debug, Clone)]
pub struct ErrorPattern {
    pub matcher: PatternMatcher,
    pub category: ErrorCategory,
}

impl ErrorPattern {
    pub fn substring(text: impl Into<String>, category: ErrorCategory) -> Self {
        Self {
            matcher: PatternMatcher::Substring(text.into()),
            category,
        }
    }

    pub fn regex(pattern: &str, category: ErrorCategory) -> Result<Self, regex::Error> {
        Ok(Self {
            matcher: PatternMatcher::Regex(Regex::new(pattern)?),
            category,
        })
    }

    /// Parse a command-line entry. A `re:` prefix selects a regex.
    pub fn parse(pattern: &str) -> Result<Self, regex::Error> {
        match pattern.strip_prefix("re:") {
            Some(pattern) => Self::regex(pattern, ErrorCategory::Untriaged),
            None => Ok(Self::substring(pattern, ErrorCategory::Untriaged)),
        }
    }

    pub fn matches(&self, message: &str) -> bool {
        match &self.matcher {
            PatternMatcher::Substring(text) => message.contains(text.as_str()),
            PatternMatcher::Regex(re) => re.is_match(message),
        }
    }
}

impl fmt::Display for ErrorPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.matcher {
            PatternMatcher::Substring(text) => write!(f, "[{}] {text:?}", self.category),
            PatternMatcher::Regex(re) => write!(f, "[{}] /{}/", self.category, re.as_str()),
        }
    }
}

/// Engine-agnostic entries: arithmetic faults any engine may raise.
const COMMON_SUBSTRINGS: &[&str] = &["Divide by zero", "divide by zero", "overflow"];

/// SQLite messages for constructs the generator emits but SQLite rejects.
const SQLITE_LIMITATIONS: &[&str] = &[
    "no such function",
    "syntax error",
    "unrecognized token",
    "wrong number of arguments to function",
    "string or blob too big",
    "LIKE or GLOB pattern too complex",
    "parser stack overflow",
    "Expression tree is too large",
    "too many arguments on function",
    "RIGHT and FULL OUTER JOINs are not currently supported",
    "DISTINCT aggregates must have exactly one argument",
];

/// SQLite planning errors for aggregate and window misuse.
const SQLITE_PLANNING: &[&str] = &[
    "misuse of aggregate",
    "misuse of window function",
    "aggregate functions are not allowed in",
    "window functions are not allowed in",
    "HAVING clause on a non-aggregate query",
    "a GROUP BY clause is required before HAVING",
    "a NATURAL join may not have an ON or USING clause",
    "a JOIN clause is required before ON",
    "unsupported frame specification",
    "RANGE with offset PRECEDING/FOLLOWING requires one ORDER BY expression",
];

/// SQLite window argument and frame validation.
const SQLITE_WINDOW_REGEXES: &[&str] = &[
    r"argument of ntile must be a (positive|non-negative) integer",
    r"second argument to nth_value must be a positive integer",
    r"frame (starting|ending) offset must be a non-negative (integer|number)",
    r"^\d+(st|nd|rd|th) argument to \w+ must be",
];

/// Column resolution against NATURAL and USING joins.
const SQLITE_JOIN_REGEXES: &[&str] = &[
    r"ambiguous reference to \S+ in USING\(\)",
    r"cannot join using column \S+ - column not present in both tables",
];

/// Out-of-range positional GROUP BY / ORDER BY terms.
const SQLITE_TERM_REGEXES: &[&str] = &[
    r"(GROUP|ORDER) BY term out of range",
    r"term out of range - should be between",
];

/// Ordered list of expected-error patterns.
#[derive(Debug, Clone, Default)]
pub struct ErrorClassifier {
    patterns: Vec<ErrorPattern>,
}

impl ErrorClassifier {
    /// An empty classifier: every error is unexpected.
    pub fn new() -> Self {
        Self::default()
    }

    /// The default list for the SQLite engine.
    pub fn sqlite() -> Result<Self, regex::Error> {
        let mut classifier = Self::new();
        for text in COMMON_SUBSTRINGS {
            classifier.add(ErrorPattern::substring(*text, ErrorCategory::ExpectedLimitation));
        }
        for text in SQLITE_LIMITATIONS {
            classifier.add(ErrorPattern::substring(*text, ErrorCategory::ExpectedLimitation));
        }
        for text in SQLITE_PLANNING {
            classifier.add(ErrorPattern::substring(*text, ErrorCategory::ExpectedLimitation));
        }
        for pattern in SQLITE_WINDOW_REGEXES {
            classifier.add(ErrorPattern::regex(pattern, ErrorCategory::ExpectedLimitation)?);
        }
        for pattern in SQLITE_JOIN_REGEXES {
            classifier.add(ErrorPattern::regex(pattern, ErrorCategory::ExpectedLimitation)?);
        }
        for pattern in SQLITE_TERM_REGEXES {
            classifier.add(ErrorPattern::regex(pattern, ErrorCategory::FalsePositive)?);
        }
        Ok(classifier)
    }

    pub fn add(&mut self, pattern: ErrorPattern) {
        self.patterns.push(pattern);
    }

    /// Add command-line entries.
    pub fn extend_from_args<S: AsRef<str>>(&mut self, patterns: &[S]) -> Result<(), regex::Error> {
        for pattern in patterns {
            self.add(ErrorPattern::parse(pattern.as_ref())?);
        }
        Ok(())
    }

    /// The first pattern matching `message`, if the error is expected.
    pub fn is_expected(&self, message: &str) -> Option<&ErrorPattern> {
        self.patterns.iter().find(|p| p.matches(message))
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sqlite_defaults() {
        let classifier = ErrorClassifier::sqlite().unwrap();
        assert!(classifier.is_expected("no such function: ACOSH").is_some());
        assert!(classifier.is_expected("integer overflow").is_some());
        assert!(classifier.is_expected("near \"ILIKE\": syntax error").is_some());
        assert!(classifier
            .is_expected("frame starting offset must be a non-negative integer")
            .is_some());
        let term = classifier
            .is_expected("1st ORDER BY term out of range - should be between 1 and 2")
            .unwrap();
        assert_eq!(term.category, ErrorCategory::FalsePositive);
        assert!(classifier.is_expected("no such table: t9").is_none());
        assert!(classifier.is_expected("database disk image is malformed").is_none());
    }

    #[test]
    fn test_sqlite_messages_verbatim() {
        let classifier = ErrorClassifier::sqlite().unwrap();
        for message in [
            "ambiguous reference to v0 in USING()",
            "ambiguous reference to c1 in USING()",
            "RANGE with offset PRECEDING/FOLLOWING requires one ORDER BY expression",
            "a NATURAL join may not have an ON or USING clause",
            "wrong number of arguments to function coalesce()",
            "aggregate functions are not allowed in the GROUP BY clause",
            "2nd GROUP BY term out of range - should be between 1 and 3",
            "misuse of aggregate function SUM()",
            "misuse of window function ROW_NUMBER()",
            "argument of ntile must be a positive integer",
            "second argument to nth_value must be a positive integer",
            "frame ending offset must be a non-negative integer",
        ] {
            let hit = classifier.is_expected(message);
            assert!(hit.is_some(), "not classified: {message}");
        }
        let hit = classifier.is_expected("ambiguous reference to v0 in USING()").unwrap();
        assert_eq!(hit.category, ErrorCategory::ExpectedLimitation);
        assert!(classifier.is_expected("ambiguous column name: v0").is_none());
    }

    #[test]
    fn test_cli_extension() {
        let mut classifier = ErrorClassifier::new();
        assert!(classifier.is_expected("no such column: x").is_none());
        classifier
            .extend_from_args(&["no such column", r"re:^ambiguous column name: \w+$"])
            .unwrap();
        assert_eq!(classifier.len(), 2);
        let hit = classifier.is_expected("ambiguous column name: v0").unwrap();
        assert_eq!(hit.category, ErrorCategory::Untriaged);
        assert!(matches!(hit.matcher, PatternMatcher::Regex(_)));
        assert!(classifier.extend_from_args(&["re:("]).is_err());
    }

    #[test]
    fn test_display() {
        let pattern = ErrorPattern::substring("overflow", ErrorCategory::KnownDefect);
        assert_eq!(pattern.to_string(), "[KnownDefect] \"overflow\"");
    }
}
