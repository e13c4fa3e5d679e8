use std::sync::Mutex;

use async_trait::async_trait;
use aidbridge::reply::ReplyOracle;
use aidbridge::routes::chat::{exchange, reserve_and_greet, APOLOGY_REPLY};
use aidbridge::store::{ChatMessage, DonatedItem, ItemStatus, Store, ThreadKey, UserRole};

/// Always answers with the same text, recording what it was asked.
struct CannedOracle {
    reply: &'static str,
    last_call: Mutex<Option<(usize, UserRole)>>,
}

impl CannedOracle {
    fn new(reply: &'static str) -> Self {
        CannedOracle {
            reply,
            last_call: Mutex::new(None),
        }
    }
}

#[async_trait]
impl ReplyOracle for CannedOracle {
    async fn reply(
        &self,
        history: &[ChatMessage],
        _item: &DonatedItem,
        simulate: UserRole,
    ) -> anyhow::Result<String> {
        *self.last_call.lock().unwrap() = Some((history.len(), simulate));
        Ok(self.reply.to_string())
    }
}

/// Simulates the upstream API being unreachable.
struct FailingOracle;

#[async_trait]
impl ReplyOracle for FailingOracle {
    async fn reply(
        &self,
        _history: &[ChatMessage],
        _item: &DonatedItem,
        _simulate: UserRole,
    ) -> anyhow::Result<String> {
        anyhow::bail!("simulated network error")
    }
}

fn seeded_store() -> Store {
    let store = Store::new();
    store.seed_demo_data();
    store
}

#[tokio::test]
async fn ngo_opening_a_chat_reserves_the_item_and_sends_the_intro() {
    let store = seeded_store();
    let item = store.find_item("item1").expect("seeded item");
    assert_eq!(item.status, ItemStatus::Available);
    let donor = store.find_user_by_id("donor1").expect("seeded donor");
    let ngo = store.find_user_by_id("ngo1").expect("seeded ngo");

    let key = reserve_and_greet(&store, &item, &donor, &ngo).expect("open chat");

    assert_eq!(key, ThreadKey::new("donor1", "ngo1", "item1"));
    assert_eq!(key.to_string(), "donor1_ngo1_item1");
    assert_eq!(
        store.find_item("item1").unwrap().status,
        ItemStatus::Reserved
    );

    let thread = store.get_thread(&key);
    assert_eq!(thread.len(), 1);
    // The introduction is attributed to the NGO itself, not the machine.
    assert_eq!(thread[0].sender_id, "ngo1");
    assert!(!thread[0].is_machine());
    assert_eq!(
        thread[0].text,
        "Hi Jane Donor, I'm from GoodCause NGO and I'm interested in the Winter Coat you posted."
    );

    // The donor can now discover who reserved the item.
    let found = store.find_reservation("donor1", "item1").expect("lookup");
    assert_eq!(found.ngo_id, "ngo1");

    // Re-entering the chat sends nothing new and leaves the status alone.
    let item = store.find_item("item1").unwrap();
    let key_again = reserve_and_greet(&store, &item, &donor, &ngo).expect("re-open");
    assert_eq!(key_again, key);
    assert_eq!(store.get_thread(&key).len(), 1);
}

#[tokio::test]
async fn donor_opening_their_own_thread_never_auto_sends() {
    let store = seeded_store();
    // item2 is already reserved with one NGO message in the seed data.
    let key = store.find_reservation("donor1", "item2").expect("thread");
    let before = store.get_thread(&key);
    assert_eq!(before.len(), 1);
    // Reading the thread from the donor side is just a read.
    assert_eq!(store.get_thread(&key).len(), 1);
}

#[tokio::test]
async fn a_human_message_gets_a_simulated_counterpart_reply() {
    let store = seeded_store();
    let oracle = CannedOracle::new("You can pick it up on Saturday morning.");
    let key = ThreadKey::new("donor1", "ngo1", "item2");

    let thread = exchange(
        &store,
        &oracle,
        &key,
        "ngo1",
        UserRole::Ngo,
        "Is Saturday pickup possible?",
    )
    .await;

    // Seed message + human message + simulated donor reply.
    assert_eq!(thread.len(), 3);
    assert_eq!(thread[1].sender_id, "ngo1");
    assert_eq!(thread[1].text, "Is Saturday pickup possible?");
    assert_eq!(thread[2].sender_id, "ai-donor1");
    assert_eq!(thread[2].text, "You can pick it up on Saturday morning.");

    // The oracle simulated the opposite role and saw the new message.
    let (history_len, simulated) = oracle.last_call.lock().unwrap().expect("oracle called");
    assert_eq!(simulated, UserRole::Donor);
    assert_eq!(history_len, 2);
}

#[tokio::test]
async fn oracle_failure_appends_exactly_one_apology_and_chat_continues() {
    let store = seeded_store();
    let key = ThreadKey::new("donor1", "ngo1", "item2");

    let thread = exchange(
        &store,
        &FailingOracle,
        &key,
        "donor1",
        UserRole::Donor,
        "Yes, they are still available.",
    )
    .await;

    assert_eq!(thread.len(), 3);
    // The human's own message is unaffected.
    assert_eq!(thread[1].sender_id, "donor1");
    assert_eq!(thread[1].text, "Yes, they are still available.");
    // Exactly one machine message carrying the fixed apology.
    assert_eq!(thread[2].sender_id, "ai-ngo1");
    assert_eq!(thread[2].text, APOLOGY_REPLY);
    assert_eq!(thread.iter().filter(|m| m.is_machine()).count(), 1);

    // The failure was swallowed; the next message goes through normally.
    let oracle = CannedOracle::new("Great, see you then!");
    let thread = exchange(
        &store,
        &oracle,
        &key,
        "donor1",
        UserRole::Donor,
        "Come by any time after 10.",
    )
    .await;
    assert_eq!(thread.len(), 5);
    assert_eq!(thread[4].text, "Great, see you then!");
}
