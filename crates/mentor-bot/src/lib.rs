pub mod dispatcher;
pub mod gateway;
pub mod session;
pub mod telegram;
