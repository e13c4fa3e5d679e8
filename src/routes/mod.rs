pub mod chat;
pub mod items;
