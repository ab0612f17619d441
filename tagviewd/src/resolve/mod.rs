pub mod neg;
pub mod revision;
pub mod url;
