use super::*;
use crate::user_store::UserStore;

async fn setup() -> (MenuStore, i64) {
    let db = Database::open_in_memory().unwrap();
    db.run_migrations().await.unwrap();
    let uid = UserStore::new(db.clone())
        .create("francesco", "francesco@example.com", "secret1")
        .await
        .unwrap();
    (MenuStore::new(db), uid)
}

fn slots(filled: &[(usize, &str)]) -> [String; MENU_SLOTS] {
    let mut content = empty_content();
    for (i, text) in filled {
        content[*i] = text.to_string();
    }
    content
}

#[tokio::test]
async fn an_empty_collection_yields_the_placeholder() {
    let (store, uid) = setup().await;

    assert!(store.get_ids(uid).await.unwrap().is_empty());

    let menu = store.get(uid, None).await.unwrap();
    assert_eq!(menu.mid, 0);
    assert!(menu.content.iter().all(String::is_empty));
    assert_eq!(menu.prev, None);
    assert_eq!(menu.next, None);

    // The placeholder is not addressable by id.
    let err = store.get(uid, Some(0)).await.unwrap_err();
    assert_eq!(err.to_string(), "menu not found");
}

#[tokio::test]
async fn create_appends_at_the_tail_with_linked_neighbors() {
    let (store, uid) = setup().await;

    assert_eq!(store.create(uid).await.unwrap(), 1);
    assert_eq!(store.create(uid).await.unwrap(), 2);
    assert_eq!(store.create(uid).await.unwrap(), 3);
    assert_eq!(store.get_ids(uid).await.unwrap(), vec![1, 2, 3]);

    let first = store.get(uid, Some(1)).await.unwrap();
    assert_eq!((first.prev, first.next), (None, Some(2)));
    let middle = store.get(uid, Some(2)).await.unwrap();
    assert_eq!((middle.prev, middle.next), (Some(1), Some(3)));
    let last = store.get(uid, Some(3)).await.unwrap();
    assert_eq!((last.prev, last.next), (Some(2), None));

    // No id means the newest menu.
    assert_eq!(store.get(uid, None).await.unwrap().mid, 3);
}

#[tokio::test]
async fn update_replaces_the_slots() {
    let (store, uid) = setup().await;
    let mid = store.create(uid).await.unwrap();

    let content = slots(&[(0, "carbonara"), (13, "minestrone")]);
    store.update(uid, mid, &content).await.unwrap();

    let menu = store.get(uid, Some(mid)).await.unwrap();
    assert_eq!(menu.content, content);

    let err = store.update(uid, 99, &content).await.unwrap_err();
    assert_eq!(err.to_string(), "menu not found");
}

#[tokio::test]
async fn update_rejects_the_separator_inside_a_slot() {
    let (store, uid) = setup().await;
    let mid = store.create(uid).await.unwrap();

    let err = store
        .update(uid, mid, &slots(&[(0, "pasta; bread")]))
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "invalid menu");

    // The stored menu is untouched.
    let menu = store.get(uid, Some(mid)).await.unwrap();
    assert!(menu.content.iter().all(String::is_empty));
}

#[tokio::test]
async fn delete_splices_the_neighbors() {
    let (store, uid) = setup().await;
    for _ in 0..3 {
        store.create(uid).await.unwrap();
    }

    store.delete(uid, 2).await.unwrap();
    assert_eq!(store.get_ids(uid).await.unwrap(), vec![1, 3]);

    let first = store.get(uid, Some(1)).await.unwrap();
    assert_eq!((first.prev, first.next), (None, Some(3)));
    let last = store.get(uid, Some(3)).await.unwrap();
    assert_eq!((last.prev, last.next), (Some(1), None));

    let err = store.get(uid, Some(2)).await.unwrap_err();
    assert_eq!(err.to_string(), "menu not found");
    let err = store.delete(uid, 2).await.unwrap_err();
    assert_eq!(err.to_string(), "menu not found");
}

#[tokio::test]
async fn ids_are_never_reused_after_a_tail_delete() {
    let (store, uid) = setup().await;
    store.create(uid).await.unwrap();
    store.create(uid).await.unwrap();

    store.delete(uid, 2).await.unwrap();
    // MAX(mid) + 1 restarts at 2 once the tail is gone.
    assert_eq!(store.create(uid).await.unwrap(), 2);

    store.delete(uid, 1).await.unwrap();
    assert_eq!(store.create(uid).await.unwrap(), 3);
    assert_eq!(store.get_ids(uid).await.unwrap(), vec![2, 3]);
}

#[tokio::test]
async fn duplicate_copies_the_content_to_the_tail() {
    let (store, uid) = setup().await;
    let source = store.create(uid).await.unwrap();
    store
        .update(uid, source, &slots(&[(0, "carbonara")]))
        .await
        .unwrap();
    store.create(uid).await.unwrap();

    let copy = store.duplicate(uid, source).await.unwrap();
    assert_eq!(copy, 3);
    assert_eq!(store.get_ids(uid).await.unwrap(), vec![1, 2, 3]);

    let menu = store.get(uid, Some(copy)).await.unwrap();
    assert_eq!(menu.content[0], "carbonara");
    assert_eq!((menu.prev, menu.next), (Some(2), None));

    // The copies are independent.
    store.update(uid, copy, &slots(&[(0, "amatriciana")])).await.unwrap();
    let original = store.get(uid, Some(source)).await.unwrap();
    assert_eq!(original.content[0], "carbonara");

    let err = store.duplicate(uid, 99).await.unwrap_err();
    assert_eq!(err.to_string(), "menu not found");
}

#[tokio::test]
async fn collections_are_scoped_to_their_owner() {
    let (store, uid) = setup().await;
    let other = UserStore::new(store.db.clone())
        .create("giovanna", "giovanna@example.com", "secret1")
        .await
        .unwrap();

    store.create(uid).await.unwrap();
    store.create(uid).await.unwrap();

    // Ids restart at 1 for every user.
    assert_eq!(store.create(other).await.unwrap(), 1);
    assert_eq!(store.get_ids(other).await.unwrap(), vec![1]);

    let err = store.get(other, Some(2)).await.unwrap_err();
    assert_eq!(err.to_string(), "menu not found");
    let err = store.delete(other, 2).await.unwrap_err();
    assert_eq!(err.to_string(), "menu not found");
}

#[tokio::test]
async fn unknown_owner_is_fatal_everywhere() {
    let (store, _) = setup().await;
    let ghost = 999;

    assert!(matches!(
        store.get_ids(ghost).await.unwrap_err(),
        StoreError::UnknownUser
    ));
    assert!(matches!(
        store.get(ghost, None).await.unwrap_err(),
        StoreError::UnknownUser
    ));
    assert!(matches!(
        store.create(ghost).await.unwrap_err(),
        StoreError::UnknownUser
    ));
    assert!(matches!(
        store.update(ghost, 1, &empty_content()).await.unwrap_err(),
        StoreError::UnknownUser
    ));
    assert!(matches!(
        store.delete(ghost, 1).await.unwrap_err(),
        StoreError::UnknownUser
    ));
    assert!(matches!(
        store.duplicate(ghost, 1).await.unwrap_err(),
        StoreError::UnknownUser
    ));
}
