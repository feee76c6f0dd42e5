use async_trait::async_trait;
use serenity::{
    builder::{CreateMessage, EditMessage},
    http::Http,
    model::id::ChannelId,
};
use std::sync::Arc;

use crate::{
    audio::notifier::{MessageRef, Notice, Notifier, NotifyError},
    ui::embeds,
};

/// Sends notices as embeds through the Discord REST API.
pub struct DiscordNotifier {
    http: Arc<Http>,
}

impl DiscordNotifier {
    pub fn new(http: Arc<Http>) -> Self {
        Self { http }
    }
}

fn classify(error: serenity::Error) -> NotifyError {
    match &error {
        serenity::Error::Http(http) if http.status_code().map(|s| s.as_u16()) == Some(404) => {
            NotifyError::NotFound
        }
        _ => NotifyError::Delivery(error.to_string()),
    }
}

#[async_trait]
impl Notifier for DiscordNotifier {
    async fn send(&self, channel_id: ChannelId, notice: Notice) -> Result<MessageRef, NotifyError> {
        let message = channel_id
            .send_message(&self.http, CreateMessage::new().embed(embeds::render(&notice)))
            .await
            .map_err(classify)?;

        Ok(MessageRef {
            channel_id,
            message_id: message.id,
        })
    }

    async fn edit(&self, message: MessageRef, notice: Notice) -> Result<(), NotifyError> {
        message
            .channel_id
            .edit_message(
                &self.http,
                message.message_id,
                EditMessage::new().embed(embeds::render(&notice)),
            )
            .await
            .map(|_| ())
            .map_err(classify)
    }
}
