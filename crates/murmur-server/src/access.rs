//! Room authorizers.
//!
//! The real access policy belongs to the room service. These adapters let the
//! gateway run on its own: one admits everybody, the other reads a static
//! membership table from configuration.

use async_trait::async_trait;
use murmur_core::{RoomAuthorizer, RoomId, UserId};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::{AccessConfig, AccessMode};

/// Admits every authenticated user to every room.
#[derive(Debug, Default, Clone, Copy)]
pub struct AllowAllAuthorizer;

#[async_trait]
impl RoomAuthorizer for AllowAllAuthorizer {
    async fn authorize(&self, _user: &UserId, _room: &RoomId) -> bool {
        true
    }
}

/// Admits listed members to listed rooms. Unknown rooms deny.
#[derive(Debug, Default, Clone)]
pub struct MembershipAuthorizer {
    rooms: HashMap<RoomId, HashSet<UserId>>,
}

impl MembershipAuthorizer {
    /// Create an authorizer with no rooms.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add members to a room.
    #[must_use]
    pub fn with_members(mut self, room: RoomId, members: impl IntoIterator<Item = UserId>) -> Self {
        self.rooms.entry(room).or_default().extend(members);
        self
    }

    /// Number of rooms with at least one entry.
    #[must_use]
    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }
}

#[async_trait]
impl RoomAuthorizer for MembershipAuthorizer {
    async fn authorize(&self, user: &UserId, room: &RoomId) -> bool {
        let allowed = self
            .rooms
            .get(room)
            .is_some_and(|members| members.contains(user));
        debug!(user = %user, room = %room, allowed, "Membership check");
        allowed
    }
}

/// Build the authorizer described by configuration.
#[must_use]
pub fn from_config(config: &AccessConfig) -> Arc<dyn RoomAuthorizer> {
    match config.mode {
        AccessMode::AllowAll => {
            warn!("Room access is unrestricted (access.mode = \"allow_all\")");
            Arc::new(AllowAllAuthorizer)
        }
        AccessMode::Membership => {
            let authorizer = config
                .rooms
                .iter()
                .fold(MembershipAuthorizer::new(), |acc, entry| {
                    acc.with_members(entry.room, entry.members.iter().copied())
                });
            info!(rooms = authorizer.room_count(), "Loaded room memberships");
            Arc::new(authorizer)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RoomAccess;

    #[tokio::test]
    async fn test_allow_all() {
        let authorizer = AllowAllAuthorizer;
        assert!(
            authorizer
                .authorize(&UserId::generate(), &RoomId::generate())
                .await
        );
    }

    #[tokio::test]
    async fn test_membership() {
        let room = RoomId::generate();
        let member = UserId::generate();
        let outsider = UserId::generate();
        let authorizer = MembershipAuthorizer::new().with_members(room, [member]);

        assert!(authorizer.authorize(&member, &room).await);
        assert!(!authorizer.authorize(&outsider, &room).await);
        // Unknown room looks exactly like no access
        assert!(!authorizer.authorize(&member, &RoomId::generate()).await);
    }

    #[tokio::test]
    async fn test_from_config() {
        let room = RoomId::generate();
        let member = UserId::generate();
        let config = AccessConfig {
            mode: AccessMode::Membership,
            rooms: vec![RoomAccess {
                room,
                members: vec![member],
            }],
        };

        let authorizer = from_config(&config);
        assert!(authorizer.authorize(&member, &room).await);
        assert!(!authorizer.authorize(&UserId::generate(), &room).await);

        let open = from_config(&AccessConfig {
            mode: AccessMode::AllowAll,
            rooms: Vec::new(),
        });
        assert!(open.authorize(&UserId::generate(), &room).await);
    }
}
