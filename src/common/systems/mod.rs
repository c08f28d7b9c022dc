pub mod combat;

use bevy::prelude::*;

use crate::common::{components::handler::AbilityHandler, message::Notify};

/// Publish each handler's pending events as `Notify` messages
pub fn forward_notifications(
    mut query: Query<(Entity, &mut AbilityHandler)>,
    mut writer: MessageWriter<Notify>,
) {
    for (ent, mut handler) in &mut query {
        if handler.events_len() == 0 { continue; }
        for event in handler.drain_events() {
            writer.write(Notify { ent, event });
        }
    }
}
