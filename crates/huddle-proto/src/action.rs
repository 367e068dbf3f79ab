//! Initial action exchange.

/// First token of a connection: what the peer wants to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Create a new account (`R`)
    Register,
    /// Authenticate an existing account (`L`)
    Login,
}

impl Action {
    /// Wire code for registration.
    pub const REGISTER_CODE: &'static str = "R";
    /// Wire code for login.
    pub const LOGIN_CODE: &'static str = "L";

    /// Parse an action line. Anything other than the two codes is `None`.
    pub fn parse(line: &str) -> Option<Self> {
        match line.trim() {
            Self::REGISTER_CODE => Some(Self::Register),
            Self::LOGIN_CODE => Some(Self::Login),
            _ => None,
        }
    }

    /// Wire code for this action.
    pub fn code(self) -> &'static str {
        match self {
            Self::Register => Self::REGISTER_CODE,
            Self::Login => Self::LOGIN_CODE,
        }
    }
}
