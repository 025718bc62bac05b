use {
    hotline_config::Fanout,
    hotline_protocol::{EventFrame, Message, NewMessageEvent, Role, UserId, events},
    tracing::{debug, warn},
};

use crate::state::{ConnectedClient, ConnectionRegistry};

/// Whether a connection bound to `role` should receive a message from the
/// conversation of `user_id`.
///
/// With [`Fanout::All`] every live connection gets it, identified or not,
/// and clients filter by `userId` themselves.
pub fn in_audience(fanout: Fanout, role: Option<Role>, user_id: UserId) -> bool {
    match fanout {
        Fanout::All => true,
        Fanout::Participants => role.is_some_and(|r| r.participates_in(user_id)),
    }
}

/// Fan a freshly stored message out to live connections. Returns the number
/// of connections it was handed to.
pub async fn broadcast_new_message(
    registry: &ConnectionRegistry,
    fanout: Fanout,
    message: &Message,
) -> usize {
    let payload = NewMessageEvent {
        user_id: message.user_id,
        message: message.clone(),
    };
    let frame = match EventFrame::new(events::NEW_MESSAGE, &payload).to_json() {
        Ok(frame) => frame,
        Err(e) => {
            warn!(error = %e, id = message.id, "failed to serialize new-message");
            return 0;
        },
    };

    let user_id = message.user_id;
    let delivered = registry
        .broadcast(&frame, |client: &ConnectedClient| {
            in_audience(fanout, client.role, user_id)
        })
        .await;
    debug!(id = message.id, user_id, delivered, "new-message broadcast");
    delivered
}
