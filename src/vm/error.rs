use strum_macros::{Display, EnumString, IntoStaticStr};
use thiserror::Error;

/// Java throwable classes raised by the runtime support layer. The string form is the
/// internal class name.
#[derive(Debug, Display, EnumString, IntoStaticStr, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ThrowableKind {
    #[strum(serialize = "java/lang/Throwable")]
    Throwable,
    #[strum(serialize = "java/lang/Exception")]
    Exception,
    #[strum(serialize = "java/lang/RuntimeException")]
    RuntimeException,
    #[strum(serialize = "java/lang/ArithmeticException")]
    ArithmeticException,
    #[strum(serialize = "java/lang/NullPointerException")]
    NullPointerException,
    #[strum(serialize = "java/lang/NegativeArraySizeException")]
    NegativeArraySizeException,
    #[strum(serialize = "java/lang/IllegalMonitorStateException")]
    IllegalMonitorStateException,
    #[strum(serialize = "java/lang/ClassNotFoundException")]
    ClassNotFoundException,
    #[strum(serialize = "java/lang/Error")]
    Error,
    #[strum(serialize = "java/lang/LinkageError")]
    LinkageError,
    #[strum(serialize = "java/lang/ClassFormatError")]
    ClassFormatError,
    #[strum(serialize = "java/lang/NoClassDefFoundError")]
    NoClassDefFoundError,
    #[strum(serialize = "java/lang/IncompatibleClassChangeError")]
    IncompatibleClassChangeError,
    #[strum(serialize = "java/lang/NoSuchFieldError")]
    NoSuchFieldError,
    #[strum(serialize = "java/lang/NoSuchMethodError")]
    NoSuchMethodError,
    #[strum(serialize = "java/lang/IllegalAccessError")]
    IllegalAccessError,
    #[strum(serialize = "java/lang/InstantiationError")]
    InstantiationError,
    #[strum(serialize = "java/lang/AbstractMethodError")]
    AbstractMethodError,
    #[strum(serialize = "java/lang/ExceptionInInitializerError")]
    ExceptionInInitializerError,
    #[strum(serialize = "java/lang/UnsatisfiedLinkError")]
    UnsatisfiedLinkError,
    #[strum(serialize = "java/lang/StackOverflowError")]
    StackOverflowError,
    #[strum(serialize = "java/lang/OutOfMemoryError")]
    OutOfMemoryError,
    #[strum(serialize = "java/lang/InternalError")]
    InternalError,
}

impl ThrowableKind {
    pub fn superclass(self) -> Option<ThrowableKind> {
        use ThrowableKind::*;

        match self {
            Throwable => None,
            Exception | Error => Some(Throwable),
            RuntimeException | ClassNotFoundException => Some(Exception),
            ArithmeticException | NullPointerException | NegativeArraySizeException
            | IllegalMonitorStateException => Some(RuntimeException),
            LinkageError | StackOverflowError | OutOfMemoryError | InternalError => Some(Error),
            ClassFormatError | NoClassDefFoundError | IncompatibleClassChangeError
            | ExceptionInInitializerError | UnsatisfiedLinkError => Some(LinkageError),
            NoSuchFieldError | NoSuchMethodError | IllegalAccessError | InstantiationError
            | AbstractMethodError => Some(IncompatibleClassChangeError),
        }
    }

    pub fn is_subclass_of(self, other: ThrowableKind) -> bool {
        let mut current = Some(self);
        while let Some(kind) = current {
            if kind == other {
                return true;
            }
            current = kind.superclass();
        }
        false
    }

    /// Whether this throwable is a `java/lang/Error`, which class initialization
    /// propagates without wrapping.
    pub fn is_error(self) -> bool {
        self.is_subclass_of(ThrowableKind::Error)
    }

    pub fn dotted_name(self) -> String {
        self.to_string().replace('/', ".")
    }
}

/// A Java throwable raised by the runtime. Cloned when a recorded failure (for example a
/// failed class initializer) has to be handed to several threads.
#[derive(Debug, Error, Clone, PartialEq)]
#[error("{}{}", .kind.dotted_name(), message_suffix(.message))]
pub struct Exception {
    pub kind: ThrowableKind,
    pub message: Option<String>,
    #[source]
    pub cause: Option<Box<Exception>>,
}

fn message_suffix(message: &Option<String>) -> String {
    match message {
        Some(message) => format!(": {}", message),
        None => String::new()
    }
}

impl Exception {
    pub fn new(kind: ThrowableKind, message: impl Into<String>) -> Self {
        Exception { kind, message: Some(message.into()), cause: None }
    }

    pub fn bare(kind: ThrowableKind) -> Self {
        Exception { kind, message: None, cause: None }
    }

    pub fn with_cause(mut self, cause: Exception) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }

    pub fn cause(&self) -> Option<&Exception> {
        self.cause.as_deref()
    }

    /// Multi-line rendering including the cause chain.
    pub fn dump(&self) -> String {
        let mut out = self.to_string();
        let mut cause = self.cause();
        while let Some(c) = cause {
            out.push_str("\nCaused by: ");
            out.push_str(&c.to_string());
            cause = c.cause();
        }
        out
    }
}

/// Failure sentinel of the slow path: the actual exception has been set as the pending
/// exception of the current thread.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("exception pending on the current thread")]
pub struct PendingException;

/// Broken native-call contract. These are never delivered to managed code, the runtime
/// aborts instead (see `VM::abort`).
#[derive(Debug, Error, Clone, PartialEq)]
pub enum FatalError {
    #[error("attempt to return an instance of {actual} from {method}")]
    InvalidReturnReference { method: String, actual: String },

    #[error("cannot check return value of {method}: {reason}")]
    UnresolvableReturnType { method: String, reason: String },

    #[error("synchronized native code returning with an exception:\n{}\nencountered second exception during implicit monitor exit:\n{}",
        .original.as_ref().map(Exception::dump).unwrap_or_else(|| "<none>".to_string()),
        .secondary.dump())]
    ExceptionDuringUnlock {
        original: Option<Exception>,
        secondary: Exception,
    },
}
