//! Resolution layer: selector extraction and the precedence algorithm.

pub mod engine;
pub mod selector;

pub use engine::ResolutionEngine;
pub use selector::{
    DEFAULT_SIGNAL_KEY, RequestContext, RequestMeta, SelectorList, SelectorResolver,
};
