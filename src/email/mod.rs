pub mod clean;
pub mod gmail;
pub mod imap;
pub mod message;
pub mod source;
