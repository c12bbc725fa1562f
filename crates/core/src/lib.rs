//! Domain types for doctors and their reviews.
//!
//! Constructors and update commands enforce the field invariants; the storage
//! crate enforces the relationship between the two entities.
pub mod types;

pub use types::{
    Doctor, DoctorSummary, DoctorUpdate, NewDoctor, NewReview, Review, ReviewSummary,
    ReviewUpdate, ValidationError,
};
