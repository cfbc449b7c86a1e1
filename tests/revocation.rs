use chrono::{Duration as ChronoDuration, Utc};
use std::collections::HashSet;
use std::time::Duration;
use tasklist::auth::RevokedTokens;
use tokio::runtime::Handle;
use uuid::Uuid;

async fn advance(seconds: u64) {
    tokio::time::sleep(Duration::from_secs(seconds)).await;
    tokio::task::yield_now().await;
}

fn scheduler() -> RevokedTokens {
    RevokedTokens::start(Handle::current())
}

#[test_log::test(tokio::test(start_paused = true))]
async fn test_revoke_is_visible_immediately() {
    let revoked = scheduler();
    let id = Uuid::new_v4();

    assert!(!revoked.contains(&id));
    revoked.revoke(id, Utc::now());
    assert!(revoked.contains(&id));

    advance(1).await;
    assert!(!revoked.contains(&id));
}

#[test_log::test(tokio::test(start_paused = true))]
async fn test_removals_fire_independently() {
    let revoked = scheduler();
    let short = Uuid::new_v4();
    let long = Uuid::new_v4();

    revoked.revoke(long, Utc::now() + ChronoDuration::seconds(30));
    revoked.revoke(short, Utc::now() + ChronoDuration::seconds(10));
    assert_eq!(
        revoked.snapshot().into_iter().collect::<HashSet<_>>(),
        HashSet::from([short, long])
    );

    advance(15).await;
    assert!(!revoked.contains(&short));
    assert!(revoked.contains(&long));
    assert_eq!(revoked.len(), 1);

    advance(20).await;
    assert!(revoked.is_empty());
}

#[test_log::test(tokio::test(start_paused = true))]
async fn test_duplicate_revocations_are_counted() {
    let revoked = scheduler();
    let id = Uuid::new_v4();

    revoked.revoke(id, Utc::now() + ChronoDuration::seconds(10));
    revoked.revoke(id, Utc::now() + ChronoDuration::seconds(20));
    assert_eq!(revoked.len(), 1);

    // Past the first expiry only: the second revocation still holds.
    advance(15).await;
    assert!(revoked.contains(&id));

    advance(10).await;
    assert!(!revoked.contains(&id));
}

#[test_log::test(tokio::test(start_paused = true))]
async fn test_clones_share_state() {
    let revoked = scheduler();
    let other = revoked.clone();
    let id = Uuid::new_v4();

    other.revoke(id, Utc::now() + ChronoDuration::seconds(5));
    assert!(revoked.contains(&id));

    advance(6).await;
    assert!(!other.contains(&id));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_revocations() {
    let revoked = scheduler();
    let ids: Vec<Uuid> = (0..64).map(|_| Uuid::new_v4()).collect();

    let mut handles = Vec::new();
    for chunk in ids.chunks(16) {
        let revoked = revoked.clone();
        let chunk = chunk.to_vec();
        handles.push(tokio::spawn(async move {
            for id in chunk {
                revoked.revoke(id, Utc::now() + ChronoDuration::hours(1));
                assert!(revoked.contains(&id));
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    assert_eq!(revoked.len(), ids.len());
    assert!(ids.iter().all(|id| revoked.contains(id)));
    revoked.stop();
}
