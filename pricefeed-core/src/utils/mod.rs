pub mod backoff;
pub mod shutdown;
