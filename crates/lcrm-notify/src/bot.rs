use std::sync::Arc;
use std::time::Duration;

use lcrm_storage::{CrmStore, StoreError};
use tracing::{error, info, warn};

use crate::telegram::{escape_markdown, MessageSender, TelegramClient, TelegramUser};

const HELP: &str = "Commands:\n\n\
/start - greeting\n\
/help - this message\n\
/profile - your worker profile\n\
/verify CODE - link this chat to your worker profile\n\n\
Ask a manager for a verification code.";

const NOT_VERIFIED: &str = "This chat is not linked to a worker yet.\n\n\
Ask a manager for a code and send /verify CODE.";

const FAILED: &str = "Something went wrong. Please try again later.";

/// Parsed incoming text: a `/command` with its arguments, or plain text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BotCommand<'a> {
    Start,
    Help,
    Profile,
    Verify(Option<&'a str>),
    Unknown(&'a str),
    Text(&'a str),
}

impl<'a> BotCommand<'a> {
    pub fn parse(text: &'a str) -> Self {
        let text = text.trim();
        let Some(rest) = text.strip_prefix('/') else {
            return BotCommand::Text(text);
        };
        let mut parts = rest.split_whitespace();
        let head = parts.next().unwrap_or_default();
        // "/verify@SomeBot 123" in group chats
        let name = head.split('@').next().unwrap_or_default();
        match name.to_lowercase().as_str() {
            "start" => BotCommand::Start,
            "help" => BotCommand::Help,
            "profile" => BotCommand::Profile,
            "verify" => BotCommand::Verify(parts.next()),
            _ => BotCommand::Unknown(name),
        }
    }
}

/// Turns one incoming message into the reply text.
#[derive(Clone)]
pub struct BotHandler {
    store: Arc<dyn CrmStore>,
}

impl BotHandler {
    pub fn new(store: Arc<dyn CrmStore>) -> Self {
        Self { store }
    }

    pub async fn handle(&self, from: &TelegramUser, text: &str) -> String {
        let command = BotCommand::parse(text);
        let result = match command {
            BotCommand::Start => Ok(format!(
                "Hello, {}!\n\nI send workshop order updates. Send /help to see the commands.",
                escape_markdown(&from.first_name)
            )),
            BotCommand::Help => Ok(HELP.to_string()),
            BotCommand::Profile => self.profile(from).await,
            BotCommand::Verify(code) => self.verify(from, code).await,
            BotCommand::Unknown(_) => Ok(HELP.to_string()),
            BotCommand::Text(body) => Ok(format!("You wrote: {}", escape_markdown(body))),
        };
        result.unwrap_or_else(|err| {
            error!(telegram_id = from.id, error = %err, "bot command failed");
            FAILED.to_string()
        })
    }

    async fn profile(&self, from: &TelegramUser) -> Result<String, StoreError> {
        let telegram_id = from.id.to_string();
        let Some(profile) = self
            .store
            .find_profile_by_telegram(&telegram_id)
            .await?
            .filter(|p| p.telegram_verified)
        else {
            return Ok(NOT_VERIFIED.to_string());
        };
        let Some(worker) = self.store.get_worker(profile.worker_id).await? else {
            return Ok(NOT_VERIFIED.to_string());
        };

        let mut reply = format!(
            "*Your profile*\n\n*Name:* {}\n*Telegram ID:* `{}`\n",
            escape_markdown(&worker.full_name()),
            telegram_id
        );
        if let Some(profession) = &worker.profession {
            reply.push_str(&format!("*Profession:* {}\n", escape_markdown(profession)));
        }
        if let Some(method) = &worker.method {
            reply.push_str(&format!("*Pay method:* {}\n", escape_markdown(method)));
        }
        if let Some(percentage) = worker.percentage {
            reply.push_str(&format!("*Percentage:* {percentage}%\n"));
        }
        if let Some(rate) = worker.rate_per_unit {
            reply.push_str(&format!("*Rate:* {rate} ₽\n"));
        }
        Ok(reply)
    }

    async fn verify(&self, from: &TelegramUser, code: Option<&str>) -> Result<String, StoreError> {
        let Some(code) = code else {
            return Ok("Usage: /verify CODE\n\nExample: /verify 123456".to_string());
        };
        let Some(profile) = self.store.find_profile_by_code(code).await? else {
            warn!(telegram_id = from.id, "verification with unknown code");
            return Ok("Unknown or already used code.".to_string());
        };
        let telegram_id = from.id.to_string();
        self.store
            .verify_profile(profile.worker_id, &telegram_id)
            .await?;
        info!(worker_id = profile.worker_id, telegram_id = from.id, "telegram account verified");
        Ok("Linked. You will now get notifications about your orders.".to_string())
    }
}

/// Long-polls for updates and answers each text message until the future is
/// dropped. Polling errors back off for a few seconds and retry.
pub async fn run_bot(client: TelegramClient, handler: BotHandler) {
    let mut offset = 0;
    info!("telegram bot polling");
    loop {
        let updates = match client.get_updates(offset).await {
            Ok(updates) => updates,
            Err(err) => {
                error!(error = %err, "telegram polling failed");
                tokio::time::sleep(Duration::from_secs(5)).await;
                continue;
            }
        };
        for update in updates {
            offset = offset.max(update.update_id + 1);
            let Some(message) = update.message else {
                continue;
            };
            let (Some(from), Some(text)) = (message.from, message.text) else {
                continue;
            };
            if from.is_bot {
                continue;
            }
            let reply = handler.handle(&from, &text).await;
            if let Err(err) = client
                .send_message(&message.chat.id.to_string(), &reply)
                .await
            {
                warn!(chat_id = message.chat.id, error = %err, "reply failed");
            }
        }
    }
}
