pub mod telegram;
pub mod traits;

pub use telegram::TelegramChannel;
pub use traits::{Author, Channel, ChannelEvent, InboundCommand, InboundMessage, SendMessage};
