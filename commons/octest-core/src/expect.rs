use std::fmt::Debug;

use thiserror::Error;

/// A direct check on converged state failed.
#[derive(Error, Debug)]
#[error("{what}: {detail}")]
pub struct AssertionError {
    pub what: String,
    pub detail: String,
}

impl AssertionError {
    fn new(what: &str, detail: String) -> Self {
        Self {
            what: what.to_string(),
            detail,
        }
    }
}

pub fn expect_contains(
    haystack: &str,
    needle: &str,
    what: &str,
) -> Result<(), AssertionError> {
    if haystack.contains(needle) {
        Ok(())
    } else {
        Err(AssertionError::new(
            what,
            format!("expected {needle:?} in output {haystack:?}"),
        ))
    }
}

pub fn expect_eq<T: PartialEq + Debug>(
    actual: T,
    expected: T,
    what: &str,
) -> Result<(), AssertionError> {
    if actual == expected {
        Ok(())
    } else {
        Err(AssertionError::new(
            what,
            format!("expected {expected:?}, got {actual:?}"),
        ))
    }
}

pub fn expect_at_least<T: PartialOrd + Debug>(
    actual: T,
    min: T,
    what: &str,
) -> Result<(), AssertionError> {
    if actual >= min {
        Ok(())
    } else {
        Err(AssertionError::new(
            what,
            format!("expected at least {min:?}, got {actual:?}"),
        ))
    }
}

/// Lines of CLI output mentioning `needle`, e.g. nodes in a given state.
pub fn count_lines_matching(text: &str, needle: &str) -> usize {
    text.lines().filter(|line| line.contains(needle)).count()
}
