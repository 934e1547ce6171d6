use chat_api::ChatContext;
use shared::protocol::ScopedNotification;
use tokio::sync::broadcast;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) chat: ChatContext,
    pub(crate) events: broadcast::Sender<ScopedNotification>,
}
