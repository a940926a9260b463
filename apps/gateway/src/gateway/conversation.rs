//! Conversation keys.
//!
//! A key is either a direct pair or a group id, tagged explicitly on the
//! wire so no consumer ever has to guess the kind from the id's shape.

use std::fmt;

use parley_common::{GroupId, IdentityId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConversationKey {
    /// Participants are stored sorted, so the key is order independent.
    Direct { participants: [IdentityId; 2] },
    Group { group_id: GroupId },
}

impl ConversationKey {
    pub fn direct(a: &IdentityId, b: &IdentityId) -> Self {
        let mut participants = [a.clone(), b.clone()];
        participants.sort();
        Self::Direct { participants }
    }

    pub fn group(group_id: GroupId) -> Self {
        Self::Group { group_id }
    }
}

impl fmt::Display for ConversationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Direct { participants: [a, b] } => write!(f, "direct:{a}:{b}"),
            Self::Group { group_id } => write!(f, "group:{group_id}"),
        }
    }
}
