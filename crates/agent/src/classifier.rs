//! Keyword classifiers for answers to a pending question. They run on the raw
//! message text instead of a fresh intent extraction.

const NEGATIVE: &[&str] = &["nein", "nö", "ne", "no", "nicht", "lieber", "abbrechen", "stopp"];
const AFFIRMATIVE: &[&str] = &[
    "ja", "jo", "jap", "ok", "okay", "yes", "klar", "trotzdem", "mach", "machs", "gerne", "gern",
    "sicher", "passt",
];
const THIS_ONLY: &[&str] = &["1", "dieses", "diesen", "nur", "einmal"];
const ALL_FUTURE: &[&str] = &["2", "alle", "zukünftige", "zukünftigen", "serie"];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConfirmationAnswer {
    Affirmative,
    Negative,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScopeAnswer {
    ThisOnly,
    AllFuture,
    Unrecognized,
}

/// Anything that is not clearly a yes counts as no.
pub fn classify_confirmation(text: &str) -> ConfirmationAnswer {
    let words = tokens(text);
    if contains_any(&words, NEGATIVE) {
        ConfirmationAnswer::Negative
    } else if contains_any(&words, AFFIRMATIVE) {
        ConfirmationAnswer::Affirmative
    } else {
        ConfirmationAnswer::Negative
    }
}

pub fn classify_scope(text: &str) -> ScopeAnswer {
    let words = tokens(text);
    if contains_any(&words, THIS_ONLY) {
        ScopeAnswer::ThisOnly
    } else if contains_any(&words, ALL_FUTURE) {
        ScopeAnswer::AllFuture
    } else {
        ScopeAnswer::Unrecognized
    }
}

fn tokens(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|ch: char| !ch.is_alphanumeric())
        .filter(|word| !word.is_empty())
        .map(str::to_string)
        .collect()
}

fn contains_any(words: &[String], keywords: &[&str]) -> bool {
    words.iter().any(|word| keywords.contains(&word.as_str()))
}

#[cfg(test)]
mod tests {
    use super::{classify_confirmation, classify_scope, ConfirmationAnswer, ScopeAnswer};

    #[test]
    fn confirmation_keywords() {
        for text in ["Ja", "ok!", "Mach's trotzdem", "klar, gerne", "passt 👍"] {
            assert_eq!(classify_confirmation(text), ConfirmationAnswer::Affirmative, "{text}");
        }
        for text in ["Nein", "nö danke", "lieber nicht", "ja, äh, nein", "Hmm", ""] {
            assert_eq!(classify_confirmation(text), ConfirmationAnswer::Negative, "{text}");
        }
    }

    #[test]
    fn words_are_matched_whole() {
        assert_eq!(classify_confirmation("Januar"), ConfirmationAnswer::Negative);
        assert_eq!(classify_scope("Nurse"), ScopeAnswer::Unrecognized);
    }

    #[test]
    fn scope_keywords() {
        assert_eq!(classify_scope("1"), ScopeAnswer::ThisOnly);
        assert_eq!(classify_scope("Nur dieses Mal"), ScopeAnswer::ThisOnly);
        assert_eq!(classify_scope("2"), ScopeAnswer::AllFuture);
        assert_eq!(classify_scope("Alle zukünftigen bitte"), ScopeAnswer::AllFuture);
        assert_eq!(classify_scope("weiß nicht"), ScopeAnswer::Unrecognized);
    }
}
