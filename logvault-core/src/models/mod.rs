pub mod build;
pub mod job;
pub mod log_record;

pub use build::Build;
pub use job::Job;
pub use log_record::LogRecord;
