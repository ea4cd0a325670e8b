pub mod bof;
pub mod distance;
pub mod inverted_index;
pub mod linear;
pub mod tf_idf;

pub use bof::BofSearchManager;
pub use distance::Distance;
pub use inverted_index::InvertedIndex;
pub use linear::{linear_search, LinearSearchManager};
