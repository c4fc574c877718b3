use super::*;
use proptest::prelude::*;

#[test]
fn test_add_turn_trims_window() {
    let mut session = Session::new("telegram:1");
    for i in 0..(SESSION_WINDOW + 10) {
        session.add_turn("user", format!("m{}", i));
    }
    assert_eq!(session.turns.len(), SESSION_WINDOW);
    assert_eq!(session.turns[0].content, "m10");
    assert_eq!(
        session.turns.last().unwrap().content,
        format!("m{}", SESSION_WINDOW + 9)
    );
}

proptest! {
    #[test]
    fn add_turn_never_exceeds_window(count in 0..200usize) {
        let mut session = Session::new("prop:test");
        for i in 0..count {
            session.add_turn("user", format!("m{}", i));
        }
        prop_assert!(session.turns.len() <= SESSION_WINDOW);
    }
}

#[tokio::test]
async fn test_get_or_create_then_save_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let mgr = SessionManager::new(dir.path()).unwrap();

    let mut session = mgr.get_or_create("telegram", "42").await.unwrap();
    assert!(session.turns.is_empty());

    session.add_turn("user", "hello");
    session.add_turn("assistant", "hi there");
    mgr.save("telegram", "42", &session).await.unwrap();

    // Fresh manager forces a disk load.
    let mgr2 = SessionManager::new(dir.path()).unwrap();
    let loaded = mgr2.get_or_create("telegram", "42").await.unwrap();
    assert_eq!(loaded.turns.len(), 2);
    assert_eq!(loaded.turns[0].content, "hello");
    assert_eq!(loaded.turns[1].role, "assistant");
}

#[tokio::test]
async fn test_sessions_are_isolated_per_conversation() {
    let dir = tempfile::tempdir().unwrap();
    let mgr = SessionManager::new(dir.path()).unwrap();

    let mut a = mgr.get_or_create("telegram", "a").await.unwrap();
    a.add_turn("user", "only in a");
    mgr.save("telegram", "a", &a).await.unwrap();

    let b = mgr.get_or_create("telegram", "b").await.unwrap();
    assert!(b.turns.is_empty());
}

#[tokio::test]
async fn test_session_file_layout() {
    let dir = tempfile::tempdir().unwrap();
    let mgr = SessionManager::new(dir.path()).unwrap();

    let mut s = mgr.get_or_create("web", "abc").await.unwrap();
    s.add_turn("user", "x");
    mgr.save("web", "abc", &s).await.unwrap();

    assert!(dir.path().join("sessions/web/abc.json").exists());
}
