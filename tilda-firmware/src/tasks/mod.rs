//! Embassy async tasks

pub mod flush;

pub use flush::flush_task;
