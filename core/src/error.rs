use std::fmt;

/// Classification of a script-visible failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Operand kind incompatible with the operator.
    Type,
    /// Stack underflow, wrong argument count.
    Arity,
    /// Unresolved variable, member or global name.
    Name,
    /// Out-of-range index, dimension or numeric domain.
    Range,
    /// Division, integer division or remainder by zero.
    Arithmetic,
    /// Explicit `Throw` from the script.
    UserThrow,
    /// Invalid opcode, malformed fused sequence, bad table index.
    /// Always fatal: never delivered to a script handler.
    Decode,
    /// Failure reported by a host collaborator (loader, context veto).
    Host,
}

impl ErrorKind {
    pub fn is_fatal(self) -> bool {
        matches!(self, ErrorKind::Decode)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::Type => "Type error",
            ErrorKind::Arity => "Wrong number of arguments",
            ErrorKind::Name => "Unknown identifier",
            ErrorKind::Range => "Range error",
            ErrorKind::Arithmetic => "Arithmetic error",
            ErrorKind::UserThrow => "Script error",
            ErrorKind::Decode => "Invalid opcode",
            ErrorKind::Host => "Host error",
        };
        f.write_str(s)
    }
}

/// Typed VM error. Travels inside `anyhow::Error`; use [`VmError::kind_of`]
/// to recover the classification.
#[derive(Debug, Clone, PartialEq)]
pub struct VmError {
    pub kind: ErrorKind,
    pub message: String,
}

impl VmError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn type_error(message: impl Into<String>) -> anyhow::Error {
        Self::new(ErrorKind::Type, message).into()
    }

    pub fn arity(message: impl Into<String>) -> anyhow::Error {
        Self::new(ErrorKind::Arity, message).into()
    }

    pub fn name(message: impl Into<String>) -> anyhow::Error {
        Self::new(ErrorKind::Name, message).into()
    }

    pub fn range(message: impl Into<String>) -> anyhow::Error {
        Self::new(ErrorKind::Range, message).into()
    }

    pub fn arithmetic(message: impl Into<String>) -> anyhow::Error {
        Self::new(ErrorKind::Arithmetic, message).into()
    }

    pub fn thrown(message: impl Into<String>) -> anyhow::Error {
        Self::new(ErrorKind::UserThrow, message).into()
    }

    pub fn decode(message: impl Into<String>) -> anyhow::Error {
        Self::new(ErrorKind::Decode, message).into()
    }

    pub fn host(message: impl Into<String>) -> anyhow::Error {
        Self::new(ErrorKind::Host, message).into()
    }

    /// Kind of an error produced by the VM. Errors that did not originate from
    /// a `VmError` (e.g. a host closure returning a plain `anyhow!`) count as
    /// [`ErrorKind::Host`].
    pub fn kind_of(err: &anyhow::Error) -> ErrorKind {
        err.downcast_ref::<VmError>().map(|e| e.kind).unwrap_or(ErrorKind::Host)
    }

    /// Script-visible text of an error: the message a `Catch` handler sees.
    pub fn script_message(err: &anyhow::Error) -> String {
        match err.downcast_ref::<VmError>() {
            Some(e) if e.kind == ErrorKind::UserThrow => e.message.clone(),
            Some(e) => e.to_string(),
            None => err.to_string(),
        }
    }
}

impl fmt::Display for VmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.kind == ErrorKind::UserThrow {
            f.write_str(&self.message)
        } else {
            write!(f, "{}: {}", self.kind, self.message)
        }
    }
}

impl std::error::Error for VmError {}
