use thiserror::Error;

/// C1/C2: lexing, parsing and include resolution failures.
#[derive(Error, Debug, PartialEq, Clone)]
pub enum SyntaxError {
    #[error("{file}:{line}:{column}: expected {expected}, found {found}")]
    Parse {
        file: String,
        line: usize,
        column: usize,
        expected: String,
        found: String,
    },

    #[error("circular include detected: {}", .cycle.join(" -> "))]
    CircularInclude { cycle: Vec<String> },

    #[error("cannot read include {path}: {reason}")]
    IncludeIo { path: String, reason: String },
}

impl SyntaxError {
    /// Build a `Parse` error from a `pest` parse failure, attaching the
    /// file name the rest of the taxonomy (spec.md §4.1) expects.
    pub fn from_pest(file: &str, err: pest::error::Error<crate::parser::Rule>) -> Self {
        use pest::error::{ErrorVariant, LineColLocation};

        let (line, column) = match err.line_col {
            LineColLocation::Pos((l, c)) => (l, c),
            LineColLocation::Span((l, c), _) => (l, c),
        };
        let (expected, found) = match &err.variant {
            ErrorVariant::ParsingError { positives, negatives } => {
                let expected = if positives.is_empty() {
                    "nothing".to_string()
                } else {
                    positives.iter().map(|r| format!("{r:?}")).collect::<Vec<_>>().join(" or ")
                };
                let found = if negatives.is_empty() {
                    "unexpected input".to_string()
                } else {
                    negatives.iter().map(|r| format!("{r:?}")).collect::<Vec<_>>().join(" or ")
                };
                (expected, found)
            }
            ErrorVariant::CustomError { message } => (message.clone(), "this input".to_string()),
        };
        SyntaxError::Parse {
            file: file.to_string(),
            line,
            column,
            expected,
            found,
        }
    }
}

/// C4: merging partial files / inheriting a base architecture.
#[derive(Error, Debug, PartialEq, Clone)]
pub enum MergeError {
    #[error("file {file} mixes partial declarations with an architecture block")]
    MixedFileContent { file: String },

    #[error("duplicate {kind} definition `{name}` across merged files")]
    DuplicateDefinition { kind: &'static str, name: String },

    #[error("base architecture `{name}` referenced for inheritance was not found")]
    UnknownBase { name: String },
}

/// C5: one validation failure. The validator collects every failure found
/// over a whole model rather than stopping at the first one.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{kind:?} at {location}: {message}")]
pub struct ValidationError {
    pub kind: ValidationErrorKind,
    pub location: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(kind: ValidationErrorKind, location: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            location: location.into(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationErrorKind {
    DuplicateName,
    FieldOverlap,
    FieldOutOfRange,
    ConstantTooWide,
    ConstantOverridden,
    UnresolvedReference,
    OperandMismatch,
    VirtualRegisterWidthMismatch,
    RegisterFieldOverlap,
    IdentificationAmbiguity,
    RtlReferenceNotFound,
    BuiltinArity,
    BuiltinWidthOutOfRange,
    UnknownField,
    DuplicateIdentificationTuple,
}

/// Collected validation failures for one model; never empty when returned as an error.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{} validation error(s)", .0.len())]
pub struct ValidationErrors(pub Vec<ValidationError>);

/// C6: raised while evaluating RTL behavior at simulation time.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RtlError {
    #[error("division or modulo by zero")]
    DivByZero,

    #[error("bit width {0} out of range [1,64]")]
    BadWidth(u32),

    #[error("unknown register `{0}`")]
    UnknownRegister(String),
}

/// C7: packing an instruction into its encoded word(s).
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EncodeError {
    #[error("value for field `{field}` does not fit in {width} bit(s)")]
    FieldOverflow { field: String, width: u32 },

    #[error("operand assignment to field `{field}` conflicts with a format constant")]
    Overwrite { field: String },

    #[error("sub-instruction `{sub}` (width {sub_width}) does not fit in slot `{slot}` (width {slot_width})")]
    BundleFitError {
        sub: String,
        sub_width: u32,
        slot: String,
        slot_width: u32,
    },
}

/// C8: identifying and decoding an instruction word.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DecodeError {
    #[error("no instruction matches the bit pattern at the attempted widths")]
    NoMatch,

    #[error("ambiguous match: {0:?} all matched at width {1}")]
    Ambiguous(Vec<String>, u32),

    #[error("short read: needed {needed} bits, only {available} available")]
    ShortRead { needed: u32, available: u32 },
}

/// C9: assembling textual source into a bitstream.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AssembleError {
    #[error("{file}:{line}: unknown mnemonic `{mnemonic}`")]
    UnknownMnemonic {
        file: String,
        line: usize,
        mnemonic: String,
    },

    #[error("{file}:{line}: unknown label `{label}`")]
    UnknownLabel {
        file: String,
        line: usize,
        label: String,
    },

    #[error("{file}:{line}: ambiguous operand inference for alias `{alias}`")]
    AliasInference {
        file: String,
        line: usize,
        alias: String,
    },

    #[error("{file}:{line}: constant `{name}` collides with a label of the same name")]
    ConstantLabelClash {
        file: String,
        line: usize,
        name: String,
    },

    #[error("{file}:{line}: duplicate constant definition `{name}`")]
    DuplicateConstant {
        file: String,
        line: usize,
        name: String,
    },

    #[error("{file}:{line}: {reason}")]
    Syntax {
        file: String,
        line: usize,
        reason: String,
    },

    #[error(transparent)]
    Encode(#[from] EncodeError),
}

/// Top-level error type threaded through the public API; individual
/// component errors convert into this at the crate boundary the way the
/// teacher's `anyhow::Result` plus `.context(...)` chains phases together.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum IsaError {
    #[error(transparent)]
    Syntax(#[from] SyntaxError),

    #[error(transparent)]
    Merge(#[from] MergeError),

    #[error(transparent)]
    Validation(#[from] ValidationErrors),

    #[error(transparent)]
    Rtl(#[from] RtlError),

    #[error(transparent)]
    Encode(#[from] EncodeError),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Assemble(#[from] AssembleError),
}
