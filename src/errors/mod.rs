use core::fmt;
use std::error::Error;
use std::fmt::Display;

/// Failure category reported to callers and to the admin layer.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Display)]
pub enum ErrorKind {
    /// Backend or store call failed or timed out. Transient: retried on the next tick.
    #[display(fmt = "backend unavailable")]
    BackendUnavailable,

    /// The lease is not held locally. Logical no-op.
    #[display(fmt = "lock not held")]
    LockNotHeld,

    /// The backend rejected the fencing token: the lease already belongs to someone else.
    #[display(fmt = "stale fencing token")]
    StaleFencingToken,

    /// Leadership was not acquired.
    #[display(fmt = "election not won")]
    ElectionNotWon,

    /// A forced override raced with a concurrent holder and did not apply.
    #[display(fmt = "forced override conflict")]
    ForcedOverrideConflict,

    /// The operation requires this node to be the leader.
    #[display(fmt = "not leader")]
    NotLeader,

    /// The node is unknown to the membership registry.
    #[display(fmt = "node not found")]
    NodeNotFound,

    /// Configuration values are inconsistent.
    #[display(fmt = "invalid configuration")]
    InvalidConfiguration,
}

#[derive(Clone, Debug)]
pub struct HaError {
    kind: ErrorKind,
    text: String,
    cause: String,
    last_holder: Option<String>,
}

pub type Result<T> = std::result::Result<T, HaError>;

pub fn new_err<T>(kind: ErrorKind, text: String, cause: String) -> Result<T> {
    Err(HaError::new(kind, text, cause))
}

impl HaError {
    pub fn new(kind: ErrorKind, text: String, cause: String) -> HaError {
        HaError {
            kind,
            text,
            cause,
            last_holder: None,
        }
    }

    pub fn with_holder(mut self, last_holder: Option<String>) -> HaError {
        self.last_holder = last_holder;
        self
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Last known holder of the contested lock or leadership, if any was observed.
    pub fn last_holder(&self) -> Option<&str> {
        self.last_holder.as_deref()
    }
}

impl Display for HaError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let cause_word = {
            if !self.cause.is_empty() {
                " Cause: ".to_string()
            } else {
                String::new()
            }
        };
        write!(f, "[{}] {}.{}{}", self.kind, self.text, cause_word, self.cause)?;
        if let Some(holder) = &self.last_holder {
            write!(f, " Last holder: {}", holder)?;
        }
        Ok(())
    }
}

impl Error for HaError {}
