use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::Utc;
use uuid::Uuid;

pub mod models;

pub use models::{
    ChatMessage, DonatedItem, ItemStatus, ThreadKey, User, UserRole, AI_SENDER_PREFIX,
};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("an account with this email already exists")]
    DuplicateEmail,
    #[error("item status cannot move from {from:?} back to {to:?}")]
    InvalidStatusTransition { from: ItemStatus, to: ItemStatus },
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub full_name: String,
    pub role: UserRole,
    pub ngo_verification_id: Option<String>,
    pub address: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewItem {
    pub donor_id: String,
    pub name: String,
    pub description: String,
    pub category: String,
    pub image_url: String,
}

#[derive(Default)]
struct Inner {
    users: Vec<User>,
    items: Vec<DonatedItem>,
    threads: HashMap<ThreadKey, Vec<ChatMessage>>,
}

/// All application state. Everything lives in process memory and is discarded
/// at exit; the store is handed into each component that needs it rather than
/// living in a global.
#[derive(Clone, Default)]
pub struct Store {
    inner: Arc<RwLock<Inner>>,
}

fn generate_id() -> String {
    Uuid::new_v4().to_string()
}

impl Store {
    pub fn new() -> Self {
        Store::default()
    }

    pub fn add_user(&self, candidate: NewUser) -> Result<User, StoreError> {
        let mut inner = self.inner.write().expect("store lock poisoned");
        if inner
            .users
            .iter()
            .any(|u| u.email.eq_ignore_ascii_case(&candidate.email))
        {
            return Err(StoreError::DuplicateEmail);
        }
        let user = User {
            id: generate_id(),
            email: candidate.email,
            full_name: candidate.full_name,
            role: candidate.role,
            ngo_verification_id: candidate.ngo_verification_id,
            address: candidate.address,
        };
        inner.users.push(user.clone());
        Ok(user)
    }

    pub fn find_user_by_email(&self, email: &str) -> Option<User> {
        let inner = self.inner.read().expect("store lock poisoned");
        inner
            .users
            .iter()
            .find(|u| u.email.eq_ignore_ascii_case(email))
            .cloned()
    }

    pub fn find_user_by_id(&self, id: &str) -> Option<User> {
        let inner = self.inner.read().expect("store lock poisoned");
        inner.users.iter().find(|u| u.id == id).cloned()
    }

    /// New listings go to the front so dashboards read newest-first.
    pub fn add_item(&self, candidate: NewItem) -> DonatedItem {
        let item = DonatedItem {
            id: generate_id(),
            donor_id: candidate.donor_id,
            name: candidate.name,
            description: candidate.description,
            category: candidate.category,
            image_url: candidate.image_url,
            status: ItemStatus::Available,
        };
        let mut inner = self.inner.write().expect("store lock poisoned");
        inner.items.insert(0, item.clone());
        item
    }

    pub fn find_item(&self, id: &str) -> Option<DonatedItem> {
        let inner = self.inner.read().expect("store lock poisoned");
        inner.items.iter().find(|i| i.id == id).cloned()
    }

    /// Moves the named item's status forward. Unknown ids are a no-op
    /// (`Ok(false)`); backward transitions are rejected.
    pub fn update_item_status(
        &self,
        item_id: &str,
        status: ItemStatus,
    ) -> Result<bool, StoreError> {
        let mut inner = self.inner.write().expect("store lock poisoned");
        let Some(item) = inner.items.iter_mut().find(|i| i.id == item_id) else {
            return Ok(false);
        };
        if status < item.status {
            return Err(StoreError::InvalidStatusTransition {
                from: item.status,
                to: status,
            });
        }
        item.status = status;
        Ok(true)
    }

    pub fn list_available_items(&self, query: &str) -> Vec<DonatedItem> {
        let query = query.to_lowercase();
        let inner = self.inner.read().expect("store lock poisoned");
        inner
            .items
            .iter()
            .filter(|i| i.status == ItemStatus::Available)
            .filter(|i| query.is_empty() || i.name.to_lowercase().contains(&query))
            .cloned()
            .collect()
    }

    pub fn items_for_donor(&self, donor_id: &str) -> Vec<DonatedItem> {
        let inner = self.inner.read().expect("store lock poisoned");
        inner
            .items
            .iter()
            .filter(|i| i.donor_id == donor_id)
            .cloned()
            .collect()
    }

    /// Which conversation reserved this item, from the donor's side. Relies
    /// on at most one NGO holding a thread per (donor, item) pair.
    pub fn find_reservation(&self, donor_id: &str, item_id: &str) -> Option<ThreadKey> {
        let inner = self.inner.read().expect("store lock poisoned");
        inner
            .threads
            .keys()
            .find(|k| k.donor_id == donor_id && k.item_id == item_id)
            .cloned()
    }

    /// Never fails: a thread that has not been written yet reads as empty.
    pub fn get_thread(&self, key: &ThreadKey) -> Vec<ChatMessage> {
        let inner = self.inner.read().expect("store lock poisoned");
        inner.threads.get(key).cloned().unwrap_or_default()
    }

    pub fn append_message(
        &self,
        key: &ThreadKey,
        sender_id: &str,
        text: &str,
    ) -> Vec<ChatMessage> {
        let message = ChatMessage {
            id: generate_id(),
            sender_id: sender_id.to_string(),
            text: text.to_string(),
            timestamp: Utc::now(),
        };
        let mut inner = self.inner.write().expect("store lock poisoned");
        let thread = inner.threads.entry(key.clone()).or_default();
        thread.push(message);
        thread.clone()
    }

    /// Fixed sample data the app boots with. Mirrors what a fresh demo
    /// deployment shows: one donor, one NGO, two listings, one conversation
    /// already underway about the reserved listing.
    pub fn seed_demo_data(&self) {
        let mut inner = self.inner.write().expect("store lock poisoned");
        inner.users = vec![
            User {
                id: "donor1".into(),
                email: "donor@example.com".into(),
                full_name: "Jane Donor".into(),
                role: UserRole::Donor,
                ngo_verification_id: None,
                address: None,
            },
            User {
                id: "ngo1".into(),
                email: "ngo@example.com".into(),
                full_name: "GoodCause NGO".into(),
                role: UserRole::Ngo,
                ngo_verification_id: Some("NGO-12345".into()),
                address: Some("123 Charity Lane".into()),
            },
        ];
        inner.items = vec![
            DonatedItem {
                id: "item1".into(),
                donor_id: "donor1".into(),
                name: "Winter Coat".into(),
                description: "A warm, gently used winter coat, size L.".into(),
                category: "Clothing".into(),
                image_url: "https://picsum.photos/seed/coat/400/300".into(),
                status: ItemStatus::Available,
            },
            DonatedItem {
                id: "item2".into(),
                donor_id: "donor1".into(),
                name: "Canned Goods".into(),
                description: "A box of assorted canned vegetables and soups.".into(),
                category: "Food".into(),
                image_url: "https://picsum.photos/seed/food/400/300".into(),
                status: ItemStatus::Reserved,
            },
        ];
        inner.threads = HashMap::from([(
            ThreadKey::new("donor1", "ngo1", "item2"),
            vec![ChatMessage {
                id: "msg1".into(),
                sender_id: "ngo1".into(),
                text: "Hi Jane, we're interested in the canned goods. Are they still available for pickup?"
                    .into(),
                timestamp: Utc::now() - chrono::Duration::minutes(5),
            }],
        )]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn donor_candidate(email: &str) -> NewUser {
        NewUser {
            email: email.into(),
            full_name: "Test Donor".into(),
            role: UserRole::Donor,
            ngo_verification_id: None,
            address: None,
        }
    }

    #[test]
    fn duplicate_email_is_rejected_case_insensitively() {
        let store = Store::new();
        store.add_user(donor_candidate("a@b.com")).expect("first signup");
        let err = store.add_user(donor_candidate("A@B.com")).unwrap_err();
        assert!(matches!(err, StoreError::DuplicateEmail));
        assert!(store.find_user_by_email("a@b.com").is_some());
        // No second user snuck in under the other casing.
        let by_upper = store.find_user_by_email("A@B.COM").expect("lookup");
        assert_eq!(by_upper.email, "a@b.com");
    }

    #[test]
    fn new_items_are_available_and_listed_newest_first() {
        let store = Store::new();
        let first = store.add_item(NewItem {
            donor_id: "d1".into(),
            name: "Winter Coat".into(),
            description: "warm".into(),
            category: "Clothing".into(),
            image_url: "http://example/coat".into(),
        });
        assert_eq!(first.status, ItemStatus::Available);

        let second = store.add_item(NewItem {
            donor_id: "d1".into(),
            name: "Bookshelf".into(),
            description: "oak".into(),
            category: "Furniture".into(),
            image_url: "http://example/shelf".into(),
        });

        let listed = store.list_available_items("");
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].id, second.id);
        assert_eq!(listed[1].id, first.id);
    }

    #[test]
    fn available_listing_filters_by_name_substring() {
        let store = Store::new();
        store.seed_demo_data();
        let hits = store.list_available_items("winter");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "item1");
        // Reserved items never show up, even on a matching query.
        assert!(store.list_available_items("canned").is_empty());
        assert!(store.list_available_items("piano").is_empty());
    }

    #[test]
    fn status_only_moves_forward() {
        let store = Store::new();
        store.seed_demo_data();
        assert!(store
            .update_item_status("item1", ItemStatus::Reserved)
            .expect("reserve"));
        assert!(store
            .update_item_status("item1", ItemStatus::Donated)
            .expect("donate"));
        let err = store
            .update_item_status("item1", ItemStatus::Available)
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidStatusTransition { .. }));
        assert_eq!(store.find_item("item1").unwrap().status, ItemStatus::Donated);
    }

    #[test]
    fn unknown_item_status_update_is_a_noop() {
        let store = Store::new();
        assert!(!store
            .update_item_status("nope", ItemStatus::Reserved)
            .expect("no-op"));
    }

    #[test]
    fn thread_key_round_trips_and_recovers_ngo() {
        let key = ThreadKey::new("donor1", "ngo1", "item1");
        assert_eq!(key.to_string(), "donor1_ngo1_item1");
        let parsed: ThreadKey = "donor1_ngo1_item1".parse().expect("parse");
        assert_eq!(parsed, key);
        assert_eq!(parsed.ngo_id, "ngo1");
        assert_eq!(parsed.counterpart_of("donor1"), "ngo1");
        assert_eq!(parsed.counterpart_of("ngo1"), "donor1");
        assert!("donor1_ngo1".parse::<ThreadKey>().is_err());
        assert!("a_b_c_d".parse::<ThreadKey>().is_err());
    }

    #[test]
    fn unwritten_thread_reads_as_empty() {
        let store = Store::new();
        let key = ThreadKey::new("d", "n", "i");
        assert!(store.get_thread(&key).is_empty());
    }

    #[test]
    fn append_message_is_append_only_and_ordered() {
        let store = Store::new();
        let key = ThreadKey::new("d", "n", "i");
        for n in 1..=5 {
            let thread = store.append_message(&key, "d", &format!("message {}", n));
            assert_eq!(thread.len(), n);
        }
        let thread = store.get_thread(&key);
        let texts: Vec<_> = thread.iter().map(|m| m.text.as_str()).collect();
        assert_eq!(
            texts,
            ["message 1", "message 2", "message 3", "message 4", "message 5"]
        );
    }

    #[test]
    fn reservation_lookup_finds_the_ngo_thread() {
        let store = Store::new();
        store.seed_demo_data();
        let key = store.find_reservation("donor1", "item2").expect("thread");
        assert_eq!(key.ngo_id, "ngo1");
        assert!(store.find_reservation("donor1", "item1").is_none());
    }
}
