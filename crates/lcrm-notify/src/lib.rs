//! Telegram side of the CRM: the bot that links chats to workers and the
//! notifier that tells assigned workers about their orders.

use rand::Rng;

mod bot;
mod notifier;
mod telegram;

pub use bot::{run_bot, BotCommand, BotHandler};
pub use notifier::{order_message, OrderEvent, WorkerNotifier};
pub use telegram::{
    escape_markdown, MessageSender, TelegramApiResponse, TelegramClient, TelegramError,
    TelegramUpdate, TelegramUser,
};

pub const CRATE_NAME: &str = "lcrm-notify";

/// Six random digits, leading zeros kept.
pub fn generate_verification_code() -> String {
    let mut rng = rand::thread_rng();
    (0..6).map(|_| char::from(b'0' + rng.gen_range(0..10u8))).collect()
}
