//! End-to-end reconciliation through the SDK against the memory gateway.

use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tokio_test::{assert_pending, assert_ready};
use warden_core::membership::MembershipRevisionDelta;
use warden_core::policy::{Policy, PolicyKind, PolicyRevisionDelta};
use warden_core::{RoomId, UserId};
use warden_sched::MemoryReporter;
use warden_sdk::{
    Effect, MemoryGateway, Protection, ReconcileConfig, ReconcileConfigBuilder, ServerAcl, Warden,
};

fn ms(n: u64) -> Duration {
    Duration::from_millis(n)
}

fn server_ban(id: &str, server: &str) -> Policy {
    Policy::ban(id, PolicyKind::Server, server)
}

fn user_ban(id: &str, user: &str) -> Policy {
    Policy::ban(id, PolicyKind::User, user)
}

struct Harness {
    gateway: Arc<MemoryGateway>,
    reporter: Arc<MemoryReporter>,
    warden: Warden<MemoryGateway>,
}

fn harness(latency_ms: u64, rooms: &[&str]) -> Harness {
    let gateway = Arc::new(MemoryGateway::with_latency(ms(latency_ms)));
    for room in rooms {
        gateway.add_room(*room);
    }
    let reporter = Arc::new(MemoryReporter::new());
    let config = ReconcileConfigBuilder::new().acl_resync_delay(100).build();
    let warden = Warden::new(gateway.clone(), config, reporter.clone()).unwrap();
    Harness {
        gateway,
        reporter,
        warden,
    }
}

// ============================================================================
// Server bans
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_policy_changes_reach_every_protected_room() {
    let rooms = ["!a:example.org", "!b:example.org", "!c:example.org"];
    let h = harness(20, &rooms);
    for room in rooms {
        assert!(h.warden.protect_room(room));
    }
    assert!(!h.warden.protect_room(rooms[0]));

    h.warden.issue_policies(PolicyRevisionDelta::adding([
        server_ban("p1", "evil1.example"),
        server_ban("p2", "evil2.example"),
    ]));
    sleep(ms(500)).await;

    for room in rooms {
        let acl = h.gateway.acl(&RoomId::new(room)).unwrap();
        assert_eq!(acl.allow, vec!["*".to_string()]);
        assert_eq!(acl.deny, vec!["evil1.example".to_string(), "evil2.example".to_string()]);
    }
    assert!(h.reporter.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_revision_burst_collapses_into_two_acl_updates() {
    let h = harness(20, &["!room:example.org"]);
    let room = RoomId::new("!room:example.org");
    h.warden.protect_room(room.clone());
    sleep(ms(200)).await;
    let before = h.gateway.acl_sends(&room);
    assert_eq!(before, 1);

    for i in 0..50 {
        h.warden.issue_policies(PolicyRevisionDelta::adding([server_ban(
            &format!("p{i}"),
            &format!("server-{i}.example"),
        )]));
    }
    sleep(ms(500)).await;

    // The first revision starts a check; the other 49 share one follow-up
    // that runs with the final intent.
    assert_eq!(h.gateway.acl_sends(&room) - before, 2);
    assert_eq!(h.gateway.acl(&room).unwrap().deny.len(), 50);
}

#[tokio::test(start_paused = true)]
async fn test_failing_room_does_not_block_others() {
    let h = harness(10, &["!good:example.org", "!bad:example.org"]);
    let good = RoomId::new("!good:example.org");
    let bad = RoomId::new("!bad:example.org");
    h.gateway.fail_room(bad.clone());
    h.warden.protect_room(good.clone());
    h.warden.protect_room(bad.clone());

    h.warden.issue_policies(PolicyRevisionDelta::adding([server_ban("p1", "evil.example")]));
    sleep(ms(300)).await;

    assert_eq!(h.gateway.acl(&good).unwrap().deny, vec!["evil.example".to_string()]);
    assert!(h.gateway.acl(&bad).is_none());
    assert!(!h.reporter.is_empty());
    assert!(h.reporter.reports().iter().all(|(scope, _)| scope == "per-key-check"));

    // Failures are not retried on their own; the next trigger repairs the room.
    h.gateway.heal_room(&bad);
    sleep(ms(300)).await;
    assert!(h.gateway.acl(&bad).is_none());

    h.warden.server_ban_sync().resync();
    sleep(ms(300)).await;
    assert_eq!(h.gateway.acl(&bad).unwrap().deny, vec!["evil.example".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn test_removed_policies_lift_denials() {
    let h = harness(5, &["!room:example.org"]);
    let room = RoomId::new("!room:example.org");
    h.warden.protect_room(room.clone());

    let first = server_ban("p1", "evil.example");
    let overlapping = server_ban("p2", "evil.example");
    h.warden
        .issue_policies(PolicyRevisionDelta::adding([first.clone(), overlapping.clone()]));
    sleep(ms(100)).await;

    h.warden.issue_policies(PolicyRevisionDelta::removing([first]));
    sleep(ms(100)).await;
    assert_eq!(h.gateway.acl(&room).unwrap().deny, vec!["evil.example".to_string()]);

    h.warden.issue_policies(PolicyRevisionDelta::removing([overlapping]));
    sleep(ms(100)).await;
    assert!(h.gateway.acl(&room).unwrap().deny.is_empty());
    assert_eq!(h.warden.policy_revision().len(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_check_room_repairs_drift() {
    let h = harness(5, &["!room:example.org"]);
    let room = RoomId::new("!room:example.org");
    h.warden.protect_room(room.clone());
    h.warden.issue_policies(PolicyRevisionDelta::adding([server_ban("p1", "evil.example")]));
    sleep(ms(100)).await;

    assert_eq!(h.warden.check_room_acl(room.clone()).await, Ok(false));

    h.gateway
        .set_acl(&room, Some(ServerAcl::new(["*"], Vec::<String>::new(), false)));
    let mut repair = tokio_test::task::spawn(h.warden.check_room_acl(room.clone()));
    assert_pending!(repair.poll());
    sleep(ms(20)).await;
    assert_eq!(assert_ready!(repair.poll()), Ok(true));
    assert_eq!(h.gateway.acl(&room).unwrap().deny, vec!["evil.example".to_string()]);
}

// ============================================================================
// User bans
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_banned_members_are_banned_in_one_batch() {
    let h = harness(10, &["!room:example.org"]);
    let room = RoomId::new("!room:example.org");
    h.warden.protect_room(room.clone());

    h.warden.issue_membership(
        MembershipRevisionDelta::new()
            .join("!room:example.org", "@a:evil.example")
            .join("!room:example.org", "@b:good.example")
            .join("!room:example.org", "@c:evil.example"),
    );
    h.warden.issue_policies(PolicyRevisionDelta::adding([
        user_ban("u1", "@a:evil.example"),
        user_ban("u2", "@c:evil.example"),
    ]));
    sleep(ms(100)).await;

    let banned: Vec<_> = h.gateway.banned(&room).into_iter().collect();
    assert_eq!(
        banned,
        vec![UserId::new("@a:evil.example"), UserId::new("@c:evil.example")]
    );
    let batches: Vec<_> = h
        .gateway
        .effects()
        .into_iter()
        .filter(|effect| matches!(effect, Effect::UsersBanned { .. }))
        .collect();
    assert_eq!(batches.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_banned_user_joining_later_is_banned() {
    let h = harness(10, &["!room:example.org"]);
    let room = RoomId::new("!room:example.org");
    h.warden.protect_room(room.clone());
    let user = UserId::new("@late:evil.example");

    h.warden
        .issue_policies(PolicyRevisionDelta::adding([user_ban("u1", "@late:evil.example")]));
    sleep(ms(50)).await;
    assert!(h.gateway.banned(&room).is_empty());

    h.warden
        .issue_membership(MembershipRevisionDelta::new().join("!room:example.org", "@late:evil.example"));
    sleep(ms(50)).await;
    assert!(h.gateway.banned(&room).contains(&user));

    assert_eq!(h.warden.user_ban_sync().sync_room(&room).await, Ok(1));
}

#[tokio::test(start_paused = true)]
async fn test_unprotected_room_is_never_banned_in() {
    let h = harness(10, &["!open:example.org"]);
    let room = RoomId::new("!open:example.org");
    let user = UserId::new("@a:evil.example");

    h.warden
        .issue_membership(MembershipRevisionDelta::new().join("!open:example.org", "@a:evil.example"));
    h.warden
        .issue_policies(PolicyRevisionDelta::adding([user_ban("u1", "@a:evil.example")]));
    sleep(ms(100)).await;

    assert!(h.warden.user_ban_intent().users_to_ban(&room).contains(&user));
    assert!(h.gateway.banned(&room).is_empty());
    assert_eq!(h.warden.user_ban_sync().sync_room(&room).await, Ok(0));
    assert!(h.gateway.banned(&room).is_empty());

    // Protecting the room catches up on members already targeted.
    assert!(h.warden.protect_room(room.clone()));
    sleep(ms(100)).await;
    assert!(h.gateway.banned(&room).contains(&user));

    assert!(h.warden.unprotect_room(&room));
    h.warden
        .issue_membership(MembershipRevisionDelta::new().join("!open:example.org", "@b:evil.example"));
    h.warden
        .issue_policies(PolicyRevisionDelta::adding([user_ban("u2", "@b:evil.example")]));
    sleep(ms(100)).await;
    assert!(!h.gateway.banned(&room).contains(&UserId::new("@b:evil.example")));
    assert!(h.reporter.is_empty());
}

// ============================================================================
// Registries and lifecycle
// ============================================================================

#[tokio::test]
async fn test_registries_describe_wiring() {
    let warden = Warden::new_with_memory_gateway(ReconcileConfig::default()).unwrap();

    let capabilities: Vec<_> = warden
        .capabilities()
        .describe_all()
        .into_iter()
        .map(|d| d.name)
        .collect();
    assert_eq!(
        capabilities,
        vec![
            "ServerACLSynchronisationCapability".to_string(),
            "StandardUserConsequences".to_string()
        ]
    );
    assert_eq!(warden.capabilities().providers_of("ServerACLConsequences").len(), 1);
    assert!(warden.protections().find("UserBanSynchronisationProtection").is_some());
    assert_eq!(warden.protections().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_stops_reconciliation() {
    let h = harness(5, &["!room:example.org"]);
    let room = RoomId::new("!room:example.org");
    h.warden.protect_room(room.clone());
    sleep(ms(100)).await;
    let effects = h.gateway.effects().len();

    h.warden.shutdown();
    assert!(h.warden.protections().entries().iter().all(|p| p.is_disposed()));
    assert!(!h.warden.protect_room("!other:example.org"));

    h.warden.issue_policies(PolicyRevisionDelta::adding([server_ban("p1", "evil.example")]));
    sleep(ms(300)).await;
    assert_eq!(h.gateway.effects().len(), effects);
    assert!(!h.warden.server_ban_intent().is_denied("evil.example"));
}
