pub type CommonResult<T> = std::result::Result<T, CommonError>;

#[derive(Debug, thiserror::Error)]
pub enum CommonError {
    #[error("Invalid md5 `{0}`: expected 32 hex digits")]
    InvalidMd5(String),
    #[error("Dangling escape character at end of field `{0}`")]
    DanglingEscape(String),
    #[error("Unknown escape sequence `\\{0}`")]
    UnknownEscape(char),
    #[error("Single `:` outside of an escape sequence")]
    StraySeparator,
    #[error("Expected {expected} fields, found {found}")]
    FieldCount { expected: usize, found: usize },
    #[error("Failed to write `{path}`: {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },
}
