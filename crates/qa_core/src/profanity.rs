use std::collections::HashSet;

/// Decides whether user supplied text may be shown to an audience.
pub trait ContentFilter: Send + Sync {
    fn is_profane(&self, text: &str) -> bool;
}

const ENGLISH_TERMS: &[&str] = &[
    "arse", "arsehole", "ass", "asshole", "bastard", "bitch", "bollocks", "bullshit", "cock",
    "crap", "cunt", "damn", "dick", "dickhead", "douche", "fag", "faggot", "fuck", "fucked",
    "fucker", "fucking", "motherfucker", "nigger", "piss", "prick", "pussy", "retard", "shit",
    "shitty", "slut", "twat", "wank", "wanker", "whore",
];

const NORWEGIAN_TERMS: &[&str] = &[
    "faen", "helvete", "jævla", "jævel", "dritt", "drittunge", "hore", "hora", "fitte", "pikk",
    "kuk", "kukk", "rævhull", "rævhøl", "ræva", "tull", "idiot", "dust", "tosk", "fæansen",
    "satan", "satansen", "hestkuk", "føkkings", "soper",
];

/// Whole-word, case-insensitive block list.
#[derive(Debug, Clone)]
pub struct WordListFilter {
    terms: HashSet<String>,
}

impl WordListFilter {
    pub fn new() -> Self {
        Self {
            terms: ENGLISH_TERMS
                .iter()
                .chain(NORWEGIAN_TERMS)
                .map(|term| term.to_string())
                .collect(),
        }
    }

    pub fn with_extra_terms<I, S>(mut self, terms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.terms.extend(
            terms
                .into_iter()
                .map(|term| term.as_ref().trim().to_lowercase())
                .filter(|term| !term.is_empty()),
        );
        self
    }
}

impl Default for WordListFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl ContentFilter for WordListFilter {
    fn is_profane(&self, text: &str) -> bool {
        text.split(|c: char| !c.is_alphanumeric())
            .filter(|word| !word.is_empty())
            .any(|word| self.terms.contains(&word.to_lowercase()))
    }
}
