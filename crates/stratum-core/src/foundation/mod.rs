//! Foundation layer: values, merge rules, the static base layer and errors.

pub mod base;
pub mod error;
pub mod value;

pub use base::BaseConfig;
pub use error::{OverlayError, OverlayResult};
pub use value::{AttributeMap, AttributeValue, apply_override, deep_merge, is_truthy};
