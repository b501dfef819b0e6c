//! Voice hub handlers: channels, screen share, rooms, calls and
//! WebRTC signalling pass-through.

pub mod calls;
pub mod channels;
pub mod group_calls;
pub mod rooms;
pub mod screenshare;
pub mod signalling;
