//! Data Transfer Objects for REST request/response serialization.
//!
//! Enums are carried as their lowercase wire strings so the admin UI can
//! filter and display them without a schema of its own.

pub mod aggregation_dto;
pub mod common_dto;
pub mod enrollment_dto;

pub use aggregation_dto::*;
pub use common_dto::*;
pub use enrollment_dto::*;
