//! Error types for composite hierarchies.

use thiserror::Error;

use crate::ids::ObjectId;

/// Errors raised by [`CompositeHierarchy`](super::CompositeHierarchy) operations.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum HierarchyError {
    /// No part with this id in the hierarchy
    #[error("Part {part} not found in asset {asset}")]
    PartNotFound { asset: String, part: ObjectId },

    /// A part design does not have the expected shape
    #[error("Invalid part design: {reason}")]
    InvalidDesign { reason: String },

    /// The stored base part information cannot be read
    #[error("Invalid base part information on {part}: {reason}")]
    InvalidBasePartInfo { part: ObjectId, reason: String },

    /// The part is already in the hierarchy
    #[error("Part {part} already exists in asset {asset}")]
    DuplicatePart { asset: String, part: ObjectId },
}

impl HierarchyError {
    /// Check if this error indicates a part was not found
    pub fn is_not_found(&self) -> bool {
        matches!(self, HierarchyError::PartNotFound { .. })
    }

    /// Check if this error is about malformed hierarchy content
    pub fn is_invalid(&self) -> bool {
        matches!(
            self,
            HierarchyError::InvalidDesign { .. } | HierarchyError::InvalidBasePartInfo { .. }
        )
    }
}

impl From<HierarchyError> for crate::Error {
    fn from(err: HierarchyError) -> Self {
        crate::Error::Hierarchy(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_helpers() {
        let err = HierarchyError::PartNotFound {
            asset: "asset".to_string(),
            part: ObjectId::from_seed(1),
        };
        assert!(err.is_not_found());
        assert!(!err.is_invalid());

        let err = HierarchyError::InvalidDesign {
            reason: "no part".to_string(),
        };
        assert!(err.is_invalid());
    }

    #[test]
    fn error_conversion() {
        let err: crate::Error = HierarchyError::PartNotFound {
            asset: "asset".to_string(),
            part: ObjectId::from_seed(2),
        }
        .into();
        assert_eq!(err.module(), "hierarchy");
        assert!(err.is_not_found());
    }
}
