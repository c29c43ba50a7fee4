use thiserror::Error;

/// Errors raised by the reslicing engine.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ResliceError {
    /// An input array does not have the dimensionality the engine needs.
    #[error("Invalid shape: expected {expected}, found {found:?}")]
    InvalidShape {
        /// Human readable description of the required shape.
        expected: &'static str,
        /// The shape that was supplied.
        found: Vec<usize>,
    },

    /// The affine cannot be inverted.
    #[error("Singular affine matrix (determinant {determinant:e})")]
    SingularMatrix { determinant: f64 },
}

pub type Result<T> = std::result::Result<T, ResliceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ResliceError::InvalidShape {
            expected: "4x4 matrix",
            found: vec![3, 3],
        };
        assert_eq!(
            format!("{err}"),
            "Invalid shape: expected 4x4 matrix, found [3, 3]"
        );

        let err = ResliceError::SingularMatrix { determinant: 0.0 };
        assert!(format!("{err}").starts_with("Singular affine matrix"));
    }
}
