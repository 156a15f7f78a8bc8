pub mod gallery_store;
pub mod photo;
pub mod row_model;

pub use gallery_store::*;
pub use photo::*;
pub use row_model::*;
