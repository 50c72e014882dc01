pub mod cache;
pub mod coordinator;
pub mod csv_import;
pub mod gemini;
pub mod images;
pub mod lookup;
pub mod pipeline;
pub mod selector;
