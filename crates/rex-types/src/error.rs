//! Error types for the exploration vocabulary

/// Errors raised while constructing typed values
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TypeError {
    /// Guid was empty or whitespace only
    #[error("guid must not be blank")]
    BlankGuid,

    /// A type name was selected that the pre-traversal did not report
    #[error("unknown type: {name}")]
    UnknownType {
        /// The offending type or classification name
        name: String,
    },

    /// Category string could not be parsed
    #[error("unknown instance category: {0}")]
    UnknownCategory(String),
}
