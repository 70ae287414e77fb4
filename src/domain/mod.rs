pub mod logs;
pub mod users;
