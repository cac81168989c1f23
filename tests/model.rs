//! The `Model` trait: save/remove keyed on `_id`.

use odmap::{doc, Bson, Model};
use pretty_assertions::assert_eq;
use serde::{Deserialize, Serialize};

#[path = "helpers.rs"]
mod helpers;

use helpers::test_database;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
struct Account {
    #[serde(rename = "_id")]
    id: i64,
    owner: String,
    balance: i32,
}

impl Model for Account {
    fn collection_name() -> &'static str {
        "accounts"
    }

    fn id(&self) -> Bson {
        Bson::Int64(self.id)
    }
}

#[test]
fn save_inserts_then_updates() {
    let db = test_database();
    let mut account = Account {
        id: 1,
        owner: "ann".into(),
        balance: 100,
    };

    let first = account.save(&db).unwrap();
    assert_eq!(first.matched_count, 0);
    assert!(first.upserted_id.is_some());
    assert_eq!(Account::collection(&db).count_documents(doc! {}).unwrap(), 1);

    account.balance = 250;
    let second = account.save(&db).unwrap();
    assert_eq!(second.matched_count, 1);
    assert_eq!(second.modified_count, 1);

    let stored = Account::collection(&db)
        .find_one(doc! { "_id": 1_i64 })
        .unwrap();
    assert_eq!(stored, Some(account));
}

#[test]
fn saving_an_unchanged_instance_modifies_nothing() {
    let db = test_database();
    let account = Account {
        id: 2,
        owner: "bob".into(),
        balance: 5,
    };
    account.save(&db).unwrap();

    let again = account.save(&db).unwrap();
    assert_eq!(again.matched_count, 1);
    assert_eq!(again.modified_count, 0);
}

#[test]
fn remove_deletes_only_this_instance() {
    let db = test_database();
    let ann = Account {
        id: 1,
        owner: "ann".into(),
        balance: 1,
    };
    let bob = Account {
        id: 2,
        owner: "bob".into(),
        balance: 2,
    };
    ann.save(&db).unwrap();
    bob.save(&db).unwrap();

    let result = ann.remove(&db).unwrap();
    assert_eq!(result.deleted_count, 1);

    let remaining = Account::collection(&db).find_one(doc! {}).unwrap();
    assert_eq!(remaining, Some(bob));
}
