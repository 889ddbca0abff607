pub mod catalog;
pub mod element;
pub mod engine;

pub use self::catalog::{StreamerCatalog, StreamerInfo};
pub use self::element::StreamerElement;
pub use self::engine::Streamers;
