//! Built-in comparators.

pub mod binary;
pub mod ini;
pub mod selector;
pub mod structured;
pub mod value_diff;
pub mod xml;

pub use binary::{binary_diff, DefaultComparator};
pub use selector::Selector;
pub use structured::{Codec, StructuredComparator};
pub use value_diff::{diff_values, DiffSettings};
