pub mod channel;
pub mod slot;
