//! Central error handling for the sppm renderer
//!
//! Provides a unified SppmError enum with consistent categorization.

/// Centralized error type for all renderer operations
#[derive(thiserror::Error, Debug)]
pub enum SppmError {
    /// Structural change the pass cannot absorb while a scene is bound
    /// (for example a scene swap that invalidates compiled pipelines).
    #[error("Unsupported: {0}")]
    Unsupported(String),

    /// Pool or index storage request rejected before any GPU allocation
    /// was attempted (for example a capacity above the configured maximum).
    #[error("Allocation error: {0}")]
    Allocation(String),

    #[error("Device error: {0}")]
    Device(String),

    #[error("Readback error: {0}")]
    Readback(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SppmError {
    /// Convenience constructors for common error types
    pub fn unsupported<T: ToString>(msg: T) -> Self {
        SppmError::Unsupported(msg.to_string())
    }

    pub fn allocation<T: ToString>(msg: T) -> Self {
        SppmError::Allocation(msg.to_string())
    }

    pub fn device<T: ToString>(msg: T) -> Self {
        SppmError::Device(msg.to_string())
    }

    pub fn readback<T: ToString>(msg: T) -> Self {
        SppmError::Readback(msg.to_string())
    }
}

/// Result type alias for renderer operations
pub type SppmResult<T> = Result<T, SppmError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_carry_category_prefix() {
        let e = SppmError::allocation("pool capacity 2097152 exceeds maximum 1048576");
        assert!(e.to_string().starts_with("Allocation error:"));
        let e = SppmError::unsupported("scene rebind requires a new renderer");
        assert!(e.to_string().starts_with("Unsupported:"));
    }

    #[test]
    fn io_errors_convert() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing config");
        let e = SppmError::from(io);
        assert!(matches!(e, SppmError::Io(_)));
    }
}
