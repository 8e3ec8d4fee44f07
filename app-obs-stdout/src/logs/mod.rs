mod sink;
mod transform;

pub use sink::{LogSink, LogSinkBuilder};
