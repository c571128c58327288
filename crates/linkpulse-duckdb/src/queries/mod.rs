pub mod realtime;
pub mod report;
pub mod rollup_read;
