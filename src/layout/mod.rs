pub mod justified;
pub mod layout_cache;
pub mod search_window;

pub use justified::{JustifiedLayout, RowBreak};
pub use layout_cache::LayoutCache;
pub use search_window::SearchWindowHeuristic;
