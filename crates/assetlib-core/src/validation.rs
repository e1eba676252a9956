use crate::Asset;
use lazy_static::lazy_static;
use regex::Regex;
use thiserror::Error;

pub const MAX_ID_LENGTH: usize = 128;
pub const MAX_NAME_LENGTH: usize = 200;
pub const MAX_RATING: f64 = 5.0;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Invalid format for field '{field}': {reason}")]
    InvalidFormat { field: String, reason: String },

    #[error("Invalid length for field '{field}': expected {min}-{max} characters, got {actual}")]
    InvalidLength {
        field: String,
        min: usize,
        max: usize,
        actual: usize,
    },

    #[error("Value out of range for field '{field}': {value}")]
    ValueOutOfRange { field: String, value: String },

    #[error("Required field '{field}' is missing")]
    RequiredField { field: String },
}

pub trait Validate {
    fn validate(&self) -> Result<(), ValidationError>;
}

lazy_static! {
    // Ids double as file names in the local store.
    static ref ASSET_ID_REGEX: Regex = Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._-]*$").unwrap();
}

pub struct AssetIdValidator;

impl AssetIdValidator {
    pub fn validate_id(id: &str) -> Result<(), ValidationError> {
        if id.is_empty() {
            return Err(ValidationError::RequiredField {
                field: "id".to_string(),
            });
        }
        if id.len() > MAX_ID_LENGTH {
            return Err(ValidationError::InvalidLength {
                field: "id".to_string(),
                min: 1,
                max: MAX_ID_LENGTH,
                actual: id.len(),
            });
        }
        if !ASSET_ID_REGEX.is_match(id) || id.contains("..") {
            return Err(ValidationError::InvalidFormat {
                field: "id".to_string(),
                reason: "only letters, digits, '.', '_' and '-' are allowed".to_string(),
            });
        }
        Ok(())
    }
}

pub fn validate_rating(rating: f64) -> Result<(), ValidationError> {
    if !(0.0..=MAX_RATING).contains(&rating) {
        return Err(ValidationError::ValueOutOfRange {
            field: "rating".to_string(),
            value: rating.to_string(),
        });
    }
    Ok(())
}

impl Validate for Asset {
    fn validate(&self) -> Result<(), ValidationError> {
        AssetIdValidator::validate_id(&self.id)?;

        let name = self.name.trim();
        if name.is_empty() {
            return Err(ValidationError::RequiredField {
                field: "name".to_string(),
            });
        }
        if name.chars().count() > MAX_NAME_LENGTH {
            return Err(ValidationError::InvalidLength {
                field: "name".to_string(),
                min: 1,
                max: MAX_NAME_LENGTH,
                actual: name.chars().count(),
            });
        }

        validate_rating(self.metadata.rating)?;

        if self.version.parse::<crate::SemVer>().is_err() {
            return Err(ValidationError::InvalidFormat {
                field: "version".to_string(),
                reason: format!("'{}' is not a major.minor.patch string", self.version),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::AssetCategory;

    #[test]
    fn test_valid_asset() {
        let asset = Asset::new("button.primary_v2", "Primary button", AssetCategory::Components);
        assert!(asset.validate().is_ok());
    }

    #[test]
    fn test_rejects_path_like_ids() {
        for id in ["../etc", "a/b", "-leading", "has space", ""] {
            assert!(AssetIdValidator::validate_id(id).is_err(), "accepted {id:?}");
        }
    }

    #[test]
    fn test_rejects_blank_name() {
        let asset = Asset::new("ok", "   ", AssetCategory::Components);
        assert_eq!(
            asset.validate(),
            Err(ValidationError::RequiredField {
                field: "name".to_string()
            })
        );
    }

    #[test]
    fn test_rating_range() {
        assert!(validate_rating(5.0).is_ok());
        assert!(validate_rating(5.5).is_err());
        assert!(validate_rating(-1.0).is_err());
    }
}
