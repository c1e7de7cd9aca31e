//! Challenge catalog — the fixed set of daily challenges and their
//! reflection questions.
//!
//! The catalog is closed and finite: a tagged enum plus a static lookup
//! table, defined at process start and never mutated.

use serde::{Deserialize, Serialize};

/// A kind of daily challenge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChallengeKind {
    Reading,
    Exercise,
    Video,
}

impl ChallengeKind {
    /// All kinds, in the order they are offered.
    pub fn all() -> &'static [ChallengeKind] {
        &[Self::Reading, Self::Exercise, Self::Video]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Reading => "reading",
            Self::Exercise => "exercise",
            Self::Video => "video",
        }
    }

    /// Parse the snake_case form used in the database and selection tokens.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "reading" => Some(Self::Reading),
            "exercise" => Some(Self::Exercise),
            "video" => Some(Self::Video),
            _ => None,
        }
    }

    /// The selection token that round-trips through the transport.
    pub fn token(&self) -> String {
        format!("start_{}", self.as_str())
    }

    /// Parse a selection token (`start_<kind>`) back to a kind.
    pub fn from_token(token: &str) -> Option<Self> {
        token.strip_prefix("start_").and_then(Self::parse)
    }
}

impl std::fmt::Display for ChallengeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A challenge definition: display title plus its ordered reflection
/// questions. Every challenge has at least one question.
#[derive(Debug)]
pub struct Challenge {
    pub kind: ChallengeKind,
    pub title: &'static str,
    pub questions: &'static [&'static str],
}

static CATALOG: &[Challenge] = &[
    Challenge {
        kind: ChallengeKind::Reading,
        title: "📖 Read for 30 minutes",
        questions: &[
            "What did you read?",
            "What did you get out of it?",
            "Will you read again tomorrow?",
        ],
    },
    Challenge {
        kind: ChallengeKind::Exercise,
        title: "💪 Exercise for 15 minutes",
        questions: &[
            "Which exercise did you do?",
            "How long did it take?",
            "Do you have a goal for tomorrow?",
        ],
    },
    Challenge {
        kind: ChallengeKind::Video,
        title: "🎥 Record a 2-minute video recap",
        questions: &[
            "What happened today?",
            "What lesson did you take away?",
            "What are you looking forward to tomorrow?",
        ],
    },
];

/// Look up a challenge definition by kind.
pub fn get(kind: ChallengeKind) -> &'static Challenge {
    // The catalog covers every variant, so this always finds a match.
    CATALOG
        .iter()
        .find(|c| c.kind == kind)
        .unwrap_or(&CATALOG[0])
}

/// Number of reflection questions for a kind.
pub fn question_count(kind: ChallengeKind) -> usize {
    get(kind).questions.len()
}

static QUOTES: &[&str] = &[
    "Make today count ❤️",
    "You can do this!",
    "Small steps every day add up.",
    "Show up for yourself today.",
];

/// Pick a random motivation quote.
pub fn random_quote() -> &'static str {
    use rand::seq::SliceRandom;
    QUOTES
        .choose(&mut rand::thread_rng())
        .copied()
        .unwrap_or(QUOTES[0])
}
