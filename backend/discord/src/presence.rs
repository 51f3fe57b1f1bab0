//! Voice-state update -> presence event translation.

use voicetally_core::PresenceEvent;

/// Build a presence event from the ids carried by a voice-state update.
///
/// Updates outside a guild (DM calls) have no group and are dropped.
pub fn presence_event(
    old_channel: Option<u64>,
    new_channel: Option<u64>,
    user_id: u64,
    guild_id: Option<u64>,
    timestamp_ms: i64,
) -> Option<PresenceEvent> {
    let guild_id = guild_id?;
    Some(PresenceEvent {
        previous_channel_id: old_channel.map(|c| c.to_string()),
        new_channel_id: new_channel.map(|c| c.to_string()),
        user_id: user_id.to_string(),
        group_id: guild_id.to_string(),
        timestamp_ms,
    })
}

pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;
    use voicetally_core::Transition;

    #[test]
    fn join_update() {
        let event = presence_event(None, Some(10), 7, Some(1), 1_000).unwrap();
        assert_eq!(event.user_id, "7");
        assert_eq!(event.group_id, "1");
        assert_eq!(event.transition(), Transition::Join { channel_id: "10".into() });
    }

    #[test]
    fn move_update() {
        let event = presence_event(Some(10), Some(11), 7, Some(1), 1_000).unwrap();
        assert_eq!(
            event.transition(),
            Transition::Switch { from: "10".into(), to: "11".into() }
        );
    }

    #[test]
    fn mute_update_is_ignored() {
        let event = presence_event(Some(10), Some(10), 7, Some(1), 1_000).unwrap();
        assert_eq!(event.transition(), Transition::Ignored);
    }

    #[test]
    fn no_guild_no_event() {
        assert!(presence_event(None, Some(10), 7, None, 0).is_none());
    }

    #[test]
    fn clock_is_epoch_millis() {
        // 2020-01-01T00:00:00Z
        assert!(now_ms() > 1_577_836_800_000);
    }
}
