use thiserror::Error;

#[derive(Debug, Error)]
pub enum MapError {
    #[error("column {0} in a joined mapping has no source_side set")]
    MissingSourceSide(String),

    #[error("field {0} missing and column is not nullable")]
    MissingRequiredField(String),

    #[error("field {field} could not be coerced to {target}: {reason}")]
    Coercion {
        field: String,
        target: &'static str,
        reason: String,
    },
}
