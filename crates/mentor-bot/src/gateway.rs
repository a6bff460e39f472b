use anyhow::Result;
use async_trait::async_trait;
use mentor_types::gateway::Keyboard;
use mentor_types::models::UserId;

/// Outbound side of the messenger. Everything the bot and the scheduler
/// ever do to a user goes through these two calls, so tests can swap in a
/// recording fake.
#[async_trait]
pub trait MessengerGateway: Send + Sync {
    async fn send_text(&self, user_id: UserId, text: &str) -> Result<()>;

    async fn send_menu(&self, user_id: UserId, text: &str, keyboard: &Keyboard) -> Result<()>;
}
