//! # docweave-validation
//!
//! Rule-based validation for docweave models. A [`RuleValidator`] holds
//! named rules per field and implements the orm `Validator` trait, so it
//! can be registered for a model on a `Registry`.

pub mod error;
pub mod rules;
pub mod validator;

pub use error::{RuleError, ValidationError, ValidationErrors, ValidationResult};
pub use rules::{lookup, CustomCheck, Rule};
pub use validator::RuleValidator;
