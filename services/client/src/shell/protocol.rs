//! services/client/src/shell/protocol.rs
//!
//! Defines the commands a user can type into the terminal client.

/// One parsed input line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Request an OTP for this number (login screen).
    Phone(String),
    /// Submit the OTP (login screen).
    Code(String),
    /// Abandon the current challenge and enter another number.
    ChangeNumber,

    // --- Onboarding form ---
    Parent(String),
    Child(String),
    Dob(String),
    Locate,
    Save,

    // --- Dashboard ---
    Refresh,
    UpdateHome,
    Logout,

    /// Retry whichever step last failed.
    Retry,
    Help,
    Quit,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("Unknown command '{0}'. Type 'help' for the list of commands.")]
    Unknown(String),
    #[error("'{0}' needs a value, e.g. '{1}'")]
    MissingArgument(&'static str, &'static str),
}

pub const HELP: &str = "\
Login:       phone <+E164 number> | code <otp> | change-number
Onboarding:  parent <name> | child <name> | dob <YYYY-MM-DD> | locate | save
Dashboard:   refresh | update-home | logout
Anywhere:    retry | help | quit";

impl Command {
    /// Parses a line of input. Returns `Ok(None)` for a blank line.
    pub fn parse(line: &str) -> Result<Option<Command>, ParseError> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(None);
        }
        let (word, rest) = match line.split_once(char::is_whitespace) {
            Some((word, rest)) => (word, rest.trim()),
            None => (line, ""),
        };

        let with_arg = |name: &'static str, example: &'static str| {
            if rest.is_empty() {
                Err(ParseError::MissingArgument(name, example))
            } else {
                Ok(rest.to_string())
            }
        };

        let command = match word.to_ascii_lowercase().as_str() {
            "phone" => Command::Phone(with_arg("phone", "phone +919876543210")?),
            "code" | "otp" => Command::Code(with_arg("code", "code 123456")?),
            "change-number" => Command::ChangeNumber,
            "parent" => Command::Parent(with_arg("parent", "parent Meena Raj")?),
            "child" => Command::Child(with_arg("child", "child Kavin")?),
            "dob" => Command::Dob(with_arg("dob", "dob 2024-03-14")?),
            "locate" => Command::Locate,
            "save" => Command::Save,
            "refresh" => Command::Refresh,
            "update-home" => Command::UpdateHome,
            "logout" => Command::Logout,
            "retry" => Command::Retry,
            "help" | "?" => Command::Help,
            "quit" | "exit" => Command::Quit,
            _ => return Err(ParseError::Unknown(word.to_string())),
        };
        Ok(Some(command))
    }
}
