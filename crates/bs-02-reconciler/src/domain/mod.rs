//! Domain module for the optimistic reconciler
//!
//! Contains the per-client view state machine, its value objects and errors.

pub mod errors;
pub mod value_objects;
pub mod view;

pub use errors::*;
pub use value_objects::*;
pub use view::ClientOrderView;
