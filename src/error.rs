//! Error type shared by the frame generator and the compiler boundary.

pub type FigureResult<T> = Result<T, FigureError>;

#[derive(thiserror::Error, Debug)]
pub enum FigureError {
    /// Unsupported mode, dilation or geometry, or a frame index out of range.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A template could not be read, or a placeholder was left without a value.
    #[error("template error: {0}")]
    Template(String),

    /// The typesetting compiler could not be started.
    #[error("failed to spawn '{program}' (is it installed and on PATH?): {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("npy export error: {0}")]
    Npy(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl FigureError {
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    pub fn template(msg: impl Into<String>) -> Self {
        Self::Template(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_prefixes_are_stable() {
        assert_eq!(
            FigureError::invalid_argument("step 9 out of bounds").to_string(),
            "invalid argument: step 9 out of bounds"
        );
        assert_eq!(
            FigureError::template("missing @@X@@").to_string(),
            "template error: missing @@X@@"
        );
    }
}
