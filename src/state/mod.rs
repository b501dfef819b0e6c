//! State management module.
//!
//! Contains the Fabric (shared hub state) and the domain managers it
//! delegates to.

mod calls;
mod connections;
mod content;
mod fabric;
mod group_calls;
mod groups;
mod outbound;
mod presence;
mod rooms;
mod screenshare;
mod voice;

pub use calls::{CallManager, CallTransition};
pub use connections::{ConnId, ConnectionManager, ConnectionRecord, UserId};
pub use content::{route_groups, SubscriptionManager};
pub use fabric::{Fabric, LifecycleManager};
pub use group_calls::{GroupCallManager, GroupLeaveOutcome};
pub use groups::GroupRouter;
pub use outbound::{FrameClass, OutboundHandle};
pub use presence::PresenceManager;
pub use rooms::{RoomJoinError, RoomJoiner, RoomLeaveOutcome, VoiceRoomManager, VoiceRoomParams};
pub use screenshare::{BandwidthLedger, FrameDecision, ScreenShareManager, ShareState};
pub use voice::VoiceChannelManager;
