pub mod init;
pub mod plan;
pub mod simulate;
pub mod validate;
