pub mod channel;

pub use channel::BroadcastChannel;
