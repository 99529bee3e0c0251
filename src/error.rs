use std::fmt::{self, Display};
use std::io;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, MimiError>;

#[derive(Debug)]
pub enum MimiError {
    /// An isotope table failed validation at load time.
    InvalidIsotopeData(String),
    /// A formula referenced an element symbol absent from the isotope table,
    /// or contained a non-conforming token.
    UnknownElement(String),
    /// No isotope with the requested nominal mass exists for the element.
    NoSuchIsotope { symbol: String, nominal_mass: u16 },
    /// A TSV/ASC row could not be interpreted.
    MalformedInput { path: String, message: String },
    /// A cache file carried an unrecognized envelope.
    IncompatibleCache(String),
    /// An I/O failure, annotated with the path or operation that caused it.
    Io { context: String, source: io::Error },
}

impl MimiError {
    pub fn io(context: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }
}

impl Display for MimiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidIsotopeData(msg) => write!(f, "invalid isotope data: {msg}"),
            Self::UnknownElement(symbol) => write!(f, "unknown element '{symbol}'"),
            Self::NoSuchIsotope {
                symbol,
                nominal_mass,
            } => write!(f, "element '{symbol}' has no isotope [{nominal_mass}]"),
            Self::MalformedInput { path, message } => {
                write!(f, "malformed input in '{path}': {message}")
            }
            Self::IncompatibleCache(msg) => write!(f, "incompatible cache: {msg}"),
            Self::Io { context, source } => write!(f, "{context}: {source}"),
        }
    }
}

impl std::error::Error for MimiError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}
