pub mod channels;
pub mod notification;
