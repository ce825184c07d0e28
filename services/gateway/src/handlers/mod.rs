pub mod admin;
pub mod market;
pub mod trade;
pub mod users;
