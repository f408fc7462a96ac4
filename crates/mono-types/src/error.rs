use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum KindError {
    #[error("Unsupported pointer width: {0} bytes")]
    InvalidPointerWidth(usize),
    #[error("Row index {0} does not fit in a metadata token")]
    RowOutOfRange(u32),
}
