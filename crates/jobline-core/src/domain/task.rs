use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;

/// Upper bound on a registered function name, in bytes.
pub const MAX_FUNCTION_NAME_LEN: usize = 128;

/// Name of a registered handler (the `func` field on the wire).
///
/// Registration goes through [`FunctionName::parse`], which rejects names that
/// could never be produced by a sane producer (empty, whitespace, control
/// characters, oversized). Decoded descriptors only require non-empty names:
/// anything else that fails to match is reported as "handler not found".
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FunctionName(String);

impl FunctionName {
    /// Validate a name for registration.
    pub fn parse(s: impl Into<String>) -> Result<Self, InvalidFunctionName> {
        let s = s.into();
        if s.is_empty() {
            return Err(InvalidFunctionName::Empty);
        }
        if s.len() > MAX_FUNCTION_NAME_LEN {
            return Err(InvalidFunctionName::TooLong(s.len()));
        }
        if s.chars().any(|c| c.is_whitespace() || c.is_control()) {
            return Err(InvalidFunctionName::IllegalCharacter(s));
        }
        Ok(Self(s))
    }

    /// Wrap a decoded name without registration-time validation.
    pub(crate) fn from_wire(s: String) -> Self {
        Self(s)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FunctionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl Borrow<str> for FunctionName {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for FunctionName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvalidFunctionName {
    #[error("function name is empty")]
    Empty,

    #[error("function name is {0} bytes long (max {MAX_FUNCTION_NAME_LEN})")]
    TooLong(usize),

    #[error("function name {0:?} contains whitespace or control characters")]
    IllegalCharacter(String),
}

/// Decoded unit of work: which handler to call and with what.
///
/// Fields are private so a descriptor cannot be modified after decoding.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskDescriptor {
    function_name: FunctionName,
    arguments: Vec<serde_json::Value>,
}

impl TaskDescriptor {
    pub fn new(function_name: FunctionName, arguments: Vec<serde_json::Value>) -> Self {
        Self {
            function_name,
            arguments,
        }
    }

    pub fn function_name(&self) -> &FunctionName {
        &self.function_name
    }

    pub fn arguments(&self) -> &[serde_json::Value] {
        &self.arguments
    }

    /// Split into parts, handing the arguments to the invocation by value.
    pub fn into_parts(self) -> (FunctionName, Vec<serde_json::Value>) {
        (self.function_name, self.arguments)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("send_email")]
    #[case("billing.charge.v1")]
    #[case("echo")]
    fn accepts_plain_names(#[case] name: &str) {
        assert_eq!(FunctionName::parse(name).unwrap().as_str(), name);
    }

    #[rstest]
    #[case("", InvalidFunctionName::Empty)]
    #[case("send email", InvalidFunctionName::IllegalCharacter("send email".into()))]
    #[case("tab\there", InvalidFunctionName::IllegalCharacter("tab\there".into()))]
    fn rejects_bad_names(#[case] name: &str, #[case] expected: InvalidFunctionName) {
        assert_eq!(FunctionName::parse(name).unwrap_err(), expected);
    }

    #[test]
    fn rejects_oversized_names() {
        let name = "f".repeat(MAX_FUNCTION_NAME_LEN + 1);
        assert!(matches!(
            FunctionName::parse(name),
            Err(InvalidFunctionName::TooLong(129))
        ));
    }

    #[test]
    fn names_are_case_sensitive() {
        let lower = FunctionName::parse("echo").unwrap();
        let upper = FunctionName::parse("Echo").unwrap();
        assert_ne!(lower, upper);
    }
}
