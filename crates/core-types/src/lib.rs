pub mod enums;
pub mod error;
pub mod range;
pub mod value;

// Re-export the core types to provide a clean public API.
pub use enums::Market;
pub use error::CoreError;
pub use range::DateRange;
pub use value::Value;
