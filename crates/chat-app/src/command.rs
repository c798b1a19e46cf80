/// One line of terminal input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Send(String),
    RecallPrevious,
    RecallNext,
    Health,
    Quit,
}

impl Command {
    pub fn parse(line: &str) -> Self {
        match line.trim() {
            "/up" => Self::RecallPrevious,
            "/down" => Self::RecallNext,
            "/health" => Self::Health,
            "/quit" | "/exit" => Self::Quit,
            _ => Self::Send(line.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slash_commands_are_recognized() {
        assert_eq!(Command::parse(" /up "), Command::RecallPrevious);
        assert_eq!(Command::parse("/down"), Command::RecallNext);
        assert_eq!(Command::parse("/health"), Command::Health);
        assert_eq!(Command::parse("/exit"), Command::Quit);
    }

    #[test]
    fn anything_else_is_sent_verbatim() {
        assert_eq!(
            Command::parse("/upgrade my plan"),
            Command::Send("/upgrade my plan".to_string())
        );
        assert_eq!(Command::parse("  "), Command::Send("  ".to_string()));
    }
}
