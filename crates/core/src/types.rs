use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Doctor as exposed to API clients, with a summary of each owned review.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Doctor {
    pub name: String,
    pub id: i64,
    pub reviews: Vec<ReviewSummary>,
}

/// Doctor fields embedded in a review payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DoctorSummary {
    pub id: i64,
    pub name: String,
}

/// Review as exposed to API clients, with its parent doctor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Review {
    pub description: String,
    pub id: i64,
    pub doctor: DoctorSummary,
}

impl Review {
    pub fn doctor_id(&self) -> i64 {
        self.doctor.id
    }
}

/// Review fields embedded in a doctor payload. The parent is not repeated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewSummary {
    pub id: i64,
    pub description: String,
}

/// Validated input for creating a doctor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewDoctor {
    id: Option<i64>,
    name: String,
}

impl NewDoctor {
    pub fn new(name: impl Into<String>) -> Result<Self, ValidationError> {
        Ok(Self {
            id: None,
            name: validate_name(name.into())?,
        })
    }

    /// Requests a specific primary key instead of a storage-assigned one.
    pub fn with_id(mut self, id: i64) -> Self {
        self.id = Some(id);
        self
    }

    pub fn id(&self) -> Option<i64> {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Validated input for creating a review under an existing doctor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewReview {
    description: String,
    doctor_id: i64,
}

impl NewReview {
    pub fn new(description: impl Into<String>, doctor_id: i64) -> Result<Self, ValidationError> {
        Ok(Self {
            description: validate_description(description.into())?,
            doctor_id,
        })
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn doctor_id(&self) -> i64 {
        self.doctor_id
    }
}

/// Fields of a doctor that may be modified after creation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DoctorUpdate {
    pub name: Option<String>,
}

impl DoctorUpdate {
    pub fn name(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
        }
    }

    /// Checks every present field, returning the update unchanged when all pass.
    pub fn validate(self) -> Result<Self, ValidationError> {
        let name = self.name.map(validate_name).transpose()?;
        Ok(Self { name })
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_none()
    }
}

/// Fields of a review that may be modified after creation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReviewUpdate {
    pub description: Option<String>,
}

impl ReviewUpdate {
    pub fn description(description: impl Into<String>) -> Self {
        Self {
            description: Some(description.into()),
        }
    }

    pub fn validate(self) -> Result<Self, ValidationError> {
        let description = self.description.map(validate_description).transpose()?;
        Ok(Self { description })
    }

    pub fn is_empty(&self) -> bool {
        self.description.is_none()
    }
}

/// Rejection of a write because a required field is empty.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Name must not be null")]
    EmptyName,
    #[error("Description must not be null")]
    EmptyDescription,
}

fn validate_name(name: String) -> Result<String, ValidationError> {
    if name.is_empty() {
        return Err(ValidationError::EmptyName);
    }
    Ok(name)
}

fn validate_description(description: String) -> Result<String, ValidationError> {
    if description.is_empty() {
        return Err(ValidationError::EmptyDescription);
    }
    Ok(description)
}
