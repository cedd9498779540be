pub mod channel;

pub use channel::{SMSChannel, SmsSink};
