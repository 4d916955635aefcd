mod store;

pub use store::{write_atomic, JsonStore};
