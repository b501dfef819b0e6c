//! Voice channel state.
//!
//! Tracks per-channel participant maps keyed by connection id. A
//! connection occupies at most one voice channel; the reverse index
//! enforces that and makes disconnect cleanup O(1).

use dashmap::DashMap;
use palaver_proto::VoiceParticipant;
use std::collections::HashMap;

use super::connections::ConnId;

#[derive(Default)]
struct ChannelState {
    participants: HashMap<ConnId, VoiceParticipant>,
}

/// Voice channel participant registry.
#[derive(Default)]
pub struct VoiceChannelManager {
    channels: DashMap<String, ChannelState>,
    /// conn -> channel reverse index.
    occupancy: DashMap<ConnId, String>,
}

impl VoiceChannelManager {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a participant to a channel, creating it lazily. Fails when
    /// the connection already occupies a channel.
    pub fn join(&self, channel_id: &str, participant: VoiceParticipant) -> Result<(), String> {
        let conn_id = participant.connection_id.clone();
        if let Some(existing) = self.occupancy.get(&conn_id) {
            return Err(existing.clone());
        }
        let mut created = false;
        self.channels
            .entry(channel_id.to_string())
            .or_insert_with(|| {
                created = true;
                ChannelState::default()
            })
            .participants
            .insert(conn_id.clone(), participant);
        self.occupancy.insert(conn_id, channel_id.to_string());
        if created {
            crate::metrics::ACTIVE_VOICE_CHANNELS.inc();
        }
        Ok(())
    }

    /// Remove a connection from its channel. Returns the channel id,
    /// the removed participant, and whether the channel emptied (and
    /// was garbage-collected).
    pub fn leave(&self, conn_id: &str) -> Option<(String, VoiceParticipant, bool)> {
        let (_, channel_id) = self.occupancy.remove(conn_id)?;
        let (participant, emptied) = {
            let mut state = self.channels.get_mut(&channel_id)?;
            let participant = state.participants.remove(conn_id)?;
            (participant, state.participants.is_empty())
        };
        if emptied {
            self.channels
                .remove_if(&channel_id, |_, s| s.participants.is_empty());
            crate::metrics::ACTIVE_VOICE_CHANNELS.dec();
        }
        Some((channel_id, participant, emptied))
    }

    /// The channel a connection currently occupies.
    pub fn channel_of(&self, conn_id: &str) -> Option<String> {
        self.occupancy.get(conn_id).map(|c| c.clone())
    }

    /// Participant snapshot for one connection.
    pub fn participant(&self, conn_id: &str) -> Option<VoiceParticipant> {
        let channel_id = self.channel_of(conn_id)?;
        self.channels
            .get(&channel_id)
            .and_then(|s| s.participants.get(conn_id).cloned())
    }

    /// All participants of a channel.
    pub fn participants(&self, channel_id: &str) -> Vec<VoiceParticipant> {
        self.channels
            .get(channel_id)
            .map(|s| s.participants.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Update mute/deafen flags. Returns the channel and the refreshed
    /// participant for broadcasting.
    pub fn set_voice_state(
        &self,
        conn_id: &str,
        muted: bool,
        deafened: bool,
    ) -> Option<(String, VoiceParticipant)> {
        self.update(conn_id, |p| {
            p.muted = muted;
            p.deafened = deafened;
        })
    }

    /// Update speaking state and level.
    pub fn set_speaking(
        &self,
        conn_id: &str,
        speaking: bool,
        level: u32,
    ) -> Option<(String, VoiceParticipant)> {
        self.update(conn_id, |p| {
            p.speaking = speaking;
            p.audio_level = level;
        })
    }

    /// Flip the screen-sharing flag.
    pub fn set_screen_sharing(
        &self,
        conn_id: &str,
        sharing: bool,
    ) -> Option<(String, VoiceParticipant)> {
        self.update(conn_id, |p| p.screen_sharing = sharing)
    }

    /// Whether the sender is muted (unknown connections count as muted,
    /// so stray audio is dropped).
    pub fn is_muted(&self, conn_id: &str) -> bool {
        self.participant(conn_id).map(|p| p.muted).unwrap_or(true)
    }

    /// Number of active screen shares in a channel.
    pub fn share_count(&self, channel_id: &str) -> usize {
        self.channels
            .get(channel_id)
            .map(|s| {
                s.participants
                    .values()
                    .filter(|p| p.screen_sharing)
                    .count()
            })
            .unwrap_or(0)
    }

    fn update(
        &self,
        conn_id: &str,
        apply: impl FnOnce(&mut VoiceParticipant),
    ) -> Option<(String, VoiceParticipant)> {
        let channel_id = self.channel_of(conn_id)?;
        let mut state = self.channels.get_mut(&channel_id)?;
        let participant = state.participants.get_mut(conn_id)?;
        apply(participant);
        Some((channel_id.clone(), participant.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn participant(conn: &str, user: &str) -> VoiceParticipant {
        VoiceParticipant {
            connection_id: conn.into(),
            user_id: user.into(),
            username: user.into(),
            avatar_url: None,
            muted: false,
            deafened: false,
            speaking: false,
            audio_level: 0,
            screen_sharing: false,
        }
    }

    #[test]
    fn one_channel_per_connection() {
        let voice = VoiceChannelManager::new();
        voice.join("v1", participant("c1", "u1")).unwrap();
        let err = voice.join("v2", participant("c1", "u1")).unwrap_err();
        assert_eq!(err, "v1");
    }

    #[test]
    fn last_leave_collects_channel() {
        let voice = VoiceChannelManager::new();
        voice.join("v1", participant("c1", "u1")).unwrap();
        voice.join("v1", participant("c2", "u2")).unwrap();

        let (_, _, emptied) = voice.leave("c1").unwrap();
        assert!(!emptied);
        let (channel, p, emptied) = voice.leave("c2").unwrap();
        assert_eq!(channel, "v1");
        assert_eq!(p.user_id, "u2");
        assert!(emptied);
        assert!(voice.participants("v1").is_empty());
    }

    #[test]
    fn unknown_sender_counts_as_muted() {
        let voice = VoiceChannelManager::new();
        assert!(voice.is_muted("ghost"));
        voice.join("v1", participant("c1", "u1")).unwrap();
        assert!(!voice.is_muted("c1"));
        voice.set_voice_state("c1", true, false);
        assert!(voice.is_muted("c1"));
    }

    #[test]
    fn share_count_tracks_flags() {
        let voice = VoiceChannelManager::new();
        voice.join("v1", participant("c1", "u1")).unwrap();
        voice.join("v1", participant("c2", "u2")).unwrap();
        assert_eq!(voice.share_count("v1"), 0);
        voice.set_screen_sharing("c1", true);
        assert_eq!(voice.share_count("v1"), 1);
        voice.set_screen_sharing("c1", false);
        assert_eq!(voice.share_count("v1"), 0);
    }
}
