use thiserror::Error;

#[derive(Debug, Error)]
pub enum PixelateError {
    /// A parameter change was rejected; session state is left untouched.
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// The host-supplied bytes could not be decoded into pixels.
    #[error("Unable to decode image: {0}")]
    Decode(String),

    /// Nearest-color matching was asked to match against nothing. This is a
    /// bug in the caller, never a user error.
    #[error("Nearest-color match requested against an empty palette")]
    EmptyPalette,

    #[error("Pixel buffer size mismatch: expected {expected} bytes, got {actual}")]
    BufferSize { expected: usize, actual: usize },

    #[error("PNG encode error: {0}")]
    Encode(#[from] image::ImageError),
}

pub type Result<T> = std::result::Result<T, PixelateError>;
