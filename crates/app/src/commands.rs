/// One line of player input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayerCommand {
    Next,
    Back,
    /// Zero-based question position.
    GoTo(usize),
    /// Zero-based option position.
    Choose(usize),
    Submit,
    Time,
    Help,
    Quit,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    Empty,
    MissingNumber(&'static str),
    BadNumber(String),
    Unknown(String),
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParseError::Empty => write!(f, "type a command (h for help)"),
            ParseError::MissingNumber(cmd) => write!(f, "{cmd} needs a question number"),
            ParseError::BadNumber(raw) => write!(f, "not a valid number: {raw}"),
            ParseError::Unknown(raw) => write!(f, "unknown command: {raw} (h for help)"),
        }
    }
}

impl std::error::Error for ParseError {}

/// Numbers typed by the player are 1-based.
fn one_based(raw: &str) -> Result<usize, ParseError> {
    match raw.parse::<usize>() {
        Ok(n) if n > 0 => Ok(n - 1),
        _ => Err(ParseError::BadNumber(raw.to_owned())),
    }
}

impl PlayerCommand {
    pub fn parse(line: &str) -> Result<Self, ParseError> {
        let mut words = line.split_whitespace();
        let Some(head) = words.next() else {
            return Err(ParseError::Empty);
        };
        let head = head.to_ascii_lowercase();
        match head.as_str() {
            "n" | "next" => Ok(Self::Next),
            "b" | "back" => Ok(Self::Back),
            "g" | "goto" => {
                let raw = words.next().ok_or(ParseError::MissingNumber("goto"))?;
                one_based(raw).map(Self::GoTo)
            }
            "s" | "submit" => Ok(Self::Submit),
            "t" | "time" => Ok(Self::Time),
            "h" | "help" | "?" => Ok(Self::Help),
            "q" | "quit" | "exit" => Ok(Self::Quit),
            other if other.chars().all(|c| c.is_ascii_digit()) => {
                one_based(other).map(Self::Choose)
            }
            other => Err(ParseError::Unknown(other.to_owned())),
        }
    }
}

pub const HELP: &str = "\
  <number>   choose that option
  n / b      next / previous question
  g <k>      jump to question k
  s          submit your answers
  t          show remaining time
  q          quit";
