pub mod console;
pub mod papertrail;
pub mod sink;
pub mod tls;
