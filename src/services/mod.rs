pub mod error;
pub mod login_guard;
pub mod password;
pub mod session;
