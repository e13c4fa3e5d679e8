use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserRole {
    Donor,
    #[serde(rename = "NGO")]
    Ngo,
}

impl UserRole {
    pub fn opposite(self) -> UserRole {
        match self {
            UserRole::Donor => UserRole::Ngo,
            UserRole::Ngo => UserRole::Donor,
        }
    }

    /// Persona handed to the reply model when this role is the simulated side.
    pub fn persona(self) -> &'static str {
        match self {
            UserRole::Donor => "You are a friendly Donor who wants to donate an item.",
            UserRole::Ngo => {
                "You are a representative from a verified NGO, coordinating the pickup of a donated item."
            }
        }
    }
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UserRole::Donor => write!(f, "Donor"),
            UserRole::Ngo => write!(f, "NGO"),
        }
    }
}

impl FromStr for UserRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Donor" => Ok(UserRole::Donor),
            "NGO" => Ok(UserRole::Ngo),
            other => Err(format!("unknown user role: {}", other)),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct User {
    pub id: String,
    pub email: String,
    pub full_name: String,
    pub role: UserRole,
    pub ngo_verification_id: Option<String>,
    pub address: Option<String>,
}

/// Listing status. Ordering matters: transitions only ever move forward.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ItemStatus {
    Available,
    Reserved,
    Donated,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct DonatedItem {
    pub id: String,
    pub donor_id: String,
    pub name: String,
    pub description: String,
    pub category: String,
    pub image_url: String,
    pub status: ItemStatus,
}

/// Sender-id prefix marking a message as machine-generated.
pub const AI_SENDER_PREFIX: &str = "ai-";

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ChatMessage {
    pub id: String,
    pub sender_id: String,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

impl ChatMessage {
    pub fn is_machine(&self) -> bool {
        self.sender_id.starts_with(AI_SENDER_PREFIX)
    }
}

/// Canonical identity of a conversation: one donor, one NGO, one item, in
/// that order. Exactly one thread exists per triple because the key is the
/// thread-map key itself.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
pub struct ThreadKey {
    pub donor_id: String,
    pub ngo_id: String,
    pub item_id: String,
}

impl ThreadKey {
    pub fn new(
        donor_id: impl Into<String>,
        ngo_id: impl Into<String>,
        item_id: impl Into<String>,
    ) -> Self {
        ThreadKey {
            donor_id: donor_id.into(),
            ngo_id: ngo_id.into(),
            item_id: item_id.into(),
        }
    }

    /// The user on the other side of the conversation from `user_id`.
    pub fn counterpart_of(&self, user_id: &str) -> &str {
        if self.donor_id == user_id {
            &self.ngo_id
        } else {
            &self.donor_id
        }
    }
}

/// URL form is `donor_ngo_item`. Ids are generated (uuid v4 or seed ids) and
/// never contain the separator.
impl fmt::Display for ThreadKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}_{}", self.donor_id, self.ngo_id, self.item_id)
    }
}

impl FromStr for ThreadKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split('_');
        match (parts.next(), parts.next(), parts.next(), parts.next()) {
            (Some(donor), Some(ngo), Some(item), None)
                if !donor.is_empty() && !ngo.is_empty() && !item.is_empty() =>
            {
                Ok(ThreadKey::new(donor, ngo, item))
            }
            _ => Err(format!("malformed thread key: {}", s)),
        }
    }
}
