use std::fmt;

#[derive(Debug, PartialEq, Eq)]
pub(crate) enum CommandError {
    UnknownView(String),
    ParseIntFromString(std::num::ParseIntError),
    MissingArgument(&'static str),
    InvalidArguments,
}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use CommandError::*;

        match self {
            UnknownView(e) => write!(
                f,
                "{}. expected contributions, lease_reserves or crowdloan_reserves",
                e
            ),
            ParseIntFromString(e) => write!(f, "failed to parse argument. {}", e),
            MissingArgument(name) => write!(f, "missing argument \"{}\"", name),
            InvalidArguments => write!(f, "arguments given are invalid."),
        }
    }
}

impl std::error::Error for CommandError {}
