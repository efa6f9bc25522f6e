//! Watch-together client: keeps local playback of a shared room in step with
//! every other participant.
//!
//! A [`session::RoomSession`] ties a reconnecting [`transport::Transport`] to
//! a [`coordinator::SyncCoordinator`], which drives whichever
//! [`player::PlayerAdapter`] matches the current video.

pub mod api;
pub mod backoff;
pub mod config;
pub mod constants;
pub mod coordinator;
pub mod error;
pub mod handlers;
pub mod headless;
pub mod identity;
pub mod invite;
pub mod media;
pub mod player;
pub mod protocol;
pub mod session;
pub mod transport;
