//! Pipeline module - the read → dataset → write steps of a conversion

pub mod archive;
pub mod dataset;
pub mod engine;
pub mod formats;
pub mod loader;
pub mod writer;

pub use archive::*;
pub use dataset::*;
pub use engine::{EngineChain, VectorEngine};
pub use formats::*;
pub use loader::*;
pub use writer::*;
