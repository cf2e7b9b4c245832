use crate::replies;

/// Chat commands that reset the conversation without asking the model.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Command {
    Help,
    Cancel,
}

impl Command {
    pub fn parse(text: &str) -> Option<Self> {
        match text.trim().to_lowercase().as_str() {
            "hilfe" | "help" | "?" => Some(Self::Help),
            "abbrechen" | "cancel" | "reset" => Some(Self::Cancel),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Help => "help",
            Self::Cancel => "cancel",
        }
    }

    pub fn reply(&self) -> &'static str {
        match self {
            Self::Help => replies::HELP_TEXT,
            Self::Cancel => replies::CANCELLED,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Command;

    #[test]
    fn commands_match_whole_trimmed_text() {
        assert_eq!(Command::parse("  Hilfe "), Some(Command::Help));
        assert_eq!(Command::parse("?"), Some(Command::Help));
        assert_eq!(Command::parse("RESET"), Some(Command::Cancel));
        assert_eq!(Command::parse("abbrechen bitte"), None);
        assert_eq!(Command::parse("Hilfe beim Zahnarzt eintragen"), None);
    }
}
