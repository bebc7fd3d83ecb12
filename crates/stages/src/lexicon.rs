//! Word lists shared by the rule-based stages.

pub const POSITIVE: &[&str] = &[
    "good", "great", "excellent", "amazing", "awesome", "fantastic", "wonderful", "perfect",
    "love", "like", "happy", "pleased", "satisfied", "delighted", "thrilled", "glad",
    "appreciate", "thank", "thanks", "grateful", "helpful", "smooth", "easy", "fast", "quick",
    "efficient", "professional", "friendly", "polite", "courteous", "reliable", "quality",
    "recommend", "impressed", "outstanding", "superb", "brilliant", "terrific", "nice",
];

pub const NEGATIVE: &[&str] = &[
    "bad", "terrible", "horrible", "awful", "worst", "hate", "angry", "frustrated", "annoyed",
    "disappointed", "upset", "mad", "furious", "disgusted", "outraged", "appalled", "shocked",
    "concerned", "worried", "confused", "lost", "stuck", "broken", "failed", "error", "problem",
    "issue", "trouble", "slow", "delayed", "late", "wrong", "incorrect", "useless", "worthless",
    "waste", "poor", "cheap", "fake", "scam", "fraud", "lies", "lying", "dishonest", "rude",
    "unprofessional", "unacceptable", "ridiculous",
];

pub const INTENSIFIERS: &[&str] = &[
    "very", "extremely", "really", "quite", "totally", "completely", "absolutely", "definitely",
    "certainly", "incredibly", "exceptionally", "particularly", "especially", "highly", "deeply",
    "truly", "genuinely", "seriously", "so",
];

pub const NEGATIONS: &[&str] = &[
    "not", "no", "never", "nothing", "nobody", "neither", "nor", "none", "hardly", "barely",
    "without", "doesn't", "don't", "won't", "can't", "couldn't", "shouldn't", "wouldn't",
    "isn't", "aren't", "wasn't", "weren't", "haven't", "hasn't", "hadn't", "didn't",
];

pub const URGENCY: &[&str] = &[
    "urgent", "urgently", "emergency", "asap", "immediately", "now", "today", "critical",
    "important", "rush", "soon", "deadline", "time-sensitive", "expire", "expires", "expired",
    "final",
];

/// Multi-word urgency cues; each match weighs double a single urgency word.
pub const URGENCY_PATTERNS: &[&str] = &[
    r"(?i)\b(today|tonight|this\s+week)\b",
    r"(?i)\b(expires?)\s+(today|tomorrow|soon)\b",
    r"(?i)\b(need|want|require).{0,20}(immediately|asap|urgently)\b",
    r"(?i)\btime[\s-]sensitive\b",
    r"(?i)\b(deadline|due\s+date)\b",
];

/// Lowercased word tokens. Apostrophes and hyphens stay inside a word so
/// contractions such as "don't" survive as negations.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !(c.is_alphanumeric() || c == '\'' || c == '-'))
        .map(|w| w.trim_matches(|c| c == '\'' || c == '-'))
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect()
}

pub fn contains(list: &[&str], word: &str) -> bool {
    list.contains(&word)
}

/// Whether any of the up to `window` tokens before `index` is in `list`.
pub fn preceded_by(tokens: &[String], index: usize, window: usize, list: &[&str]) -> bool {
    tokens[index.saturating_sub(window)..index]
        .iter()
        .any(|t| contains(list, t))
}
