pub mod coordinator;
pub mod fetcher;
pub mod pairs;
pub mod processor;
pub mod source;
#[cfg(test)]
pub mod testutil; // Testing utilities

pub use coordinator::Coordinator;
pub use fetcher::PageWalk;
pub use processor::StreamProcessor;
pub use source::RecordSource;
