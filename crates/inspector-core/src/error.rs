use std::io;

pub type Result<T> = std::result::Result<T, Error>;

/// Every failure aborts the whole session; there is no per-field recovery.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("cannot read {type_name} version {found}: newest known version is {latest}")]
    FutureVersion {
        type_name: &'static str,
        found: u32,
        latest: u32,
    },

    #[error("back-reference {index} has no slot in the {table} table")]
    UnknownBackReference { table: &'static str, index: usize },

    #[error("unknown type name `{0}`")]
    UnknownType(String),

    #[error("type mismatch: slot expects {expected}, stream holds {found}")]
    TypeMismatch {
        expected: &'static str,
        found: String,
    },

    #[error("unexpected null {0}")]
    UnexpectedNull(&'static str),

    #[error("malformed stream: {0}")]
    Malformed(String),

    #[error("object {0} is already borrowed")]
    ObjectBusy(&'static str),

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl Error {
    pub(crate) fn malformed(msg: impl Into<String>) -> Self {
        Error::Malformed(msg.into())
    }
}
