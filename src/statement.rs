// Line-oriented command parser.
//
// The shell feeds each non-meta input line through `prepare`, which either
// yields an executable statement or a `PrepareError` whose display string
// is the exact message shown to the user.

use thiserror::Error;

use crate::row::{Row, COLUMN_EMAIL_SIZE, COLUMN_USERNAME_SIZE};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Statement {
    Insert(Row),
    Select,
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum PrepareError {
    #[error("Id must be postive number.")]
    NegativeId,

    #[error("String is too long.")]
    StringTooLong,

    #[error("Syntax error. Could not parse statement.")]
    Syntax,

    #[error("Unrecognized keyword at start of '{0}'.")]
    UnrecognizedKeyword(String),
}

/// Parse one input line into a statement.
pub fn prepare(input: &str) -> Result<Statement, PrepareError> {
    let trimmed = input.trim();
    if trimmed == "select" {
        return Ok(Statement::Select);
    }

    let mut parts = trimmed.split_whitespace();
    match parts.next() {
        Some("insert") => prepare_insert(parts),
        _ => Err(PrepareError::UnrecognizedKeyword(trimmed.to_string())),
    }
}

fn prepare_insert<'a, I>(mut parts: I) -> Result<Statement, PrepareError>
where
    I: Iterator<Item = &'a str>,
{
    let id_string = parts.next().ok_or(PrepareError::Syntax)?;
    let username = parts.next().ok_or(PrepareError::Syntax)?;
    let email = parts.next().ok_or(PrepareError::Syntax)?;

    let id: i64 = id_string.parse().map_err(|_| PrepareError::Syntax)?;
    if id < 0 {
        return Err(PrepareError::NegativeId);
    }
    let id = u32::try_from(id).map_err(|_| PrepareError::Syntax)?;

    if username.len() > COLUMN_USERNAME_SIZE {
        return Err(PrepareError::StringTooLong);
    }
    if email.len() > COLUMN_EMAIL_SIZE {
        return Err(PrepareError::StringTooLong);
    }

    Ok(Statement::Insert(Row {
        id,
        username: username.to_string(),
        email: email.to_string(),
    }))
}
