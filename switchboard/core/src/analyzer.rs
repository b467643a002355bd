//! Query Analysis
//!
//! Derives classification metadata from raw query text. The router uses this
//! metadata to evaluate routing rule conditions.
//!
//! # Classification
//!
//! ```text
//! query text ──► keyword scores (code, creative, analytical)
//!                    │
//!                    ├── +3 code bonus for syntax patterns (```, def, class, <tag>)
//!                    │
//!                    ▼
//!          highest score wins, ties resolved code → creative → analytical
//!          all-zero scores ──► general
//! ```
//!
//! Analysis is a pure function: it never fails and has no side effects. Empty
//! input yields `general` / `simple`.

use serde::{Deserialize, Serialize};

/// Keywords that indicate a programming question
const CODE_KEYWORDS: &[&str] = &[
    "code",
    "function",
    "class",
    "debug",
    "error",
    "bug",
    "implement",
    "algorithm",
    "programming",
    "python",
    "javascript",
    "java",
    "c++",
    "sql",
    "database",
    "api",
    "syntax",
    "compile",
    "runtime",
];

/// Keywords that indicate a creative writing request
const CREATIVE_KEYWORDS: &[&str] = &[
    "write",
    "story",
    "poem",
    "creative",
    "imagine",
    "describe",
    "narrative",
    "character",
    "plot",
    "fiction",
    "essay",
    "article",
];

/// Keywords that indicate an analytical request
const ANALYTICAL_KEYWORDS: &[&str] = &[
    "analyze",
    "compare",
    "evaluate",
    "assess",
    "research",
    "study",
    "investigate",
    "examine",
    "review",
    "critique",
    "data",
    "statistics",
];

/// Syntax fragments that strongly suggest source code
const CODE_SYNTAX_MARKERS: &[&str] = &["```", "def ", "class ", "function ", "import "];

/// Score bonus applied to the code category when syntax markers are present
const CODE_SYNTAX_BONUS: usize = 3;

/// Word count below which a query is `simple`
const MODERATE_WORD_THRESHOLD: usize = 20;

/// Word count at which a query becomes `complex`
const COMPLEX_WORD_THRESHOLD: usize = 100;

// ============================================================================
// Metadata Types
// ============================================================================

/// Broad category of a query
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryType {
    /// Programming, debugging, databases
    Code,
    /// Stories, poems, essays
    Creative,
    /// Analysis, comparison, research
    Analytical,
    /// Nothing in particular
    General,
}

impl std::fmt::Display for QueryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Code => write!(f, "code"),
            Self::Creative => write!(f, "creative"),
            Self::Analytical => write!(f, "analytical"),
            Self::General => write!(f, "general"),
        }
    }
}

/// Rough complexity bucket derived from word count
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Complexity {
    /// Fewer than 20 words
    Simple,
    /// 20 to 99 words
    Moderate,
    /// 100 words or more
    Complex,
}

impl Complexity {
    /// Bucket a word count
    #[must_use]
    pub fn from_word_count(word_count: usize) -> Self {
        if word_count < MODERATE_WORD_THRESHOLD {
            Self::Simple
        } else if word_count < COMPLEX_WORD_THRESHOLD {
            Self::Moderate
        } else {
            Self::Complex
        }
    }
}

impl std::fmt::Display for Complexity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Simple => write!(f, "simple"),
            Self::Moderate => write!(f, "moderate"),
            Self::Complex => write!(f, "complex"),
        }
    }
}

/// Classification metadata for a single query
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryMetadata {
    /// Detected category
    pub query_type: QueryType,
    /// Whitespace-delimited token count (coarse surrogate for real tokens)
    pub token_count_estimate: usize,
    /// Complexity bucket
    pub complexity: Complexity,
    /// Whether the text contains a code fence or inline code
    pub has_code_block: bool,
    /// Length in characters
    pub char_length: usize,
    /// Whitespace-delimited word count
    pub word_count: usize,
}

// ============================================================================
// Analyzer
// ============================================================================

/// Stateless query analyzer
#[derive(Clone, Copy, Debug, Default)]
pub struct QueryAnalyzer;

impl QueryAnalyzer {
    /// Analyze a query and produce its metadata
    #[must_use]
    pub fn analyze(query: &str) -> QueryMetadata {
        let word_count = query.split_whitespace().count();

        QueryMetadata {
            query_type: Self::detect_query_type(&query.to_lowercase()),
            token_count_estimate: word_count,
            complexity: Complexity::from_word_count(word_count),
            has_code_block: has_code_block(query),
            char_length: query.chars().count(),
            word_count,
        }
    }

    /// Score each category and pick the winner.
    ///
    /// Categories are evaluated in the fixed order code, creative, analytical
    /// and a later category only wins with a strictly higher score.
    fn detect_query_type(query_lower: &str) -> QueryType {
        let mut code_score = keyword_hits(query_lower, CODE_KEYWORDS);
        if has_code_syntax(query_lower) {
            code_score += CODE_SYNTAX_BONUS;
        }

        let scores = [
            (QueryType::Code, code_score),
            (QueryType::Creative, keyword_hits(query_lower, CREATIVE_KEYWORDS)),
            (
                QueryType::Analytical,
                keyword_hits(query_lower, ANALYTICAL_KEYWORDS),
            ),
        ];

        let mut best = (QueryType::General, 0);
        for (query_type, score) in scores {
            if score > best.1 {
                best = (query_type, score);
            }
        }
        best.0
    }
}

/// Number of distinct keywords that appear anywhere in the text
fn keyword_hits(query_lower: &str, keywords: &[&str]) -> usize {
    keywords.iter().filter(|k| query_lower.contains(*k)).count()
}

fn has_code_syntax(query_lower: &str) -> bool {
    CODE_SYNTAX_MARKERS.iter().any(|m| query_lower.contains(m)) || has_angle_tag(query_lower)
}

/// Matches `<word>` where word is one or more word characters
fn has_angle_tag(text: &str) -> bool {
    let mut rest = text;
    while let Some(open) = rest.find('<') {
        let after = &rest[open + 1..];
        let word_len: usize = after
            .chars()
            .take_while(|c| c.is_alphanumeric() || *c == '_')
            .map(char::len_utf8)
            .sum();
        if word_len > 0 && after[word_len..].starts_with('>') {
            return true;
        }
        rest = after;
    }
    false
}

/// A fenced block, or a backtick pair enclosing at least one character
fn has_code_block(text: &str) -> bool {
    if text.contains("```") {
        return true;
    }
    let ticks: Vec<usize> = text.match_indices('`').map(|(i, _)| i).collect();
    ticks.windows(2).any(|pair| pair[1] - pair[0] > 1)
}
