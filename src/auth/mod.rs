pub mod codes;
pub mod handlers;
pub mod tokens;
