use async_stream::stream;
use chrono::{DateTime, Utc};
use futures::stream::Stream;
use futures::stream::StreamExt;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::warn;
use warden_core::membership::MembershipRevisionDelta;
use warden_core::policy::{Policy, PolicyKind, PolicyRevisionDelta};
use warden_core::RoomId;
use warden_sched::TracingReporter;
use warden_sdk::{Effect, MemoryGateway, ReconcileConfigBuilder, ServerAcl, Warden};

/// Statistics collected during a churn run
#[derive(Clone, Debug)]
pub struct ChurnStats {
    pub started_at: DateTime<Utc>,
    pub num_rooms: usize,
    pub num_revisions: usize,
    pub acl_updates: usize,
    pub ban_batches: usize,
    pub users_banned: usize,
    pub total_time: Duration,
    pub revisions_per_second: f64,
    pub diverged_rooms: Vec<RoomId>,
}

impl ChurnStats {
    pub fn converged(&self) -> bool {
        self.diverged_rooms.is_empty()
    }

    pub fn print(&self) {
        println!("\n╔════════════════════════════════════════════════════════════╗");
        println!("║              Churn Statistics                              ║");
        println!("╠════════════════════════════════════════════════════════════╣");
        println!("║  Started:                   {:>30} ║", self.started_at.format("%Y-%m-%d %H:%M:%S UTC").to_string());
        println!("║  Protected Rooms:           {:>30} ║", self.num_rooms);
        println!("║  Revisions Issued:          {:>30} ║", self.num_revisions);
        println!("║  ACL Updates Sent:          {:>30} ║", self.acl_updates);
        println!("║  Ban Batches:               {:>30} ║", self.ban_batches);
        println!("║  Users Banned:              {:>30} ║", self.users_banned);
        println!("║  Total Time:                {:>29}s ║", format!("{:.3}", self.total_time.as_secs_f64()));
        println!("║  Revisions/Second:          {:>30.0} ║", self.revisions_per_second);
        println!("║  Converged:                 {:>30} ║", self.converged());
        println!("╚════════════════════════════════════════════════════════════╝");
    }
}

/// One upstream change fed to the warden.
enum Churn {
    Policies(PolicyRevisionDelta),
    Membership(MembershipRevisionDelta),
}

fn room_name(index: usize) -> String {
    format!("!room-{}:warden.test", index)
}

fn user_name(index: usize) -> String {
    format!("@user-{}:server-{}.test", index, index % 17)
}

/// Generator of random policy and membership revisions
fn churn_generator(num_rooms: usize, num_users: usize, num_revisions: usize) -> impl Stream<Item = Churn> {
    stream! {
        let mut rng = StdRng::from_entropy();
        let mut active: Vec<Policy> = Vec::new();
        let mut next_policy = 0usize;

        for _ in 0..num_revisions {
            let roll = rng.gen_range(0..10);
            if roll < 3 {
                next_policy += 1;
                let server = format!("server-{}.test", rng.gen_range(0..40));
                let policy = Policy::ban(format!("server-ban-{}", next_policy), PolicyKind::Server, server);
                active.push(policy.clone());
                yield Churn::Policies(PolicyRevisionDelta::adding([policy]));
            } else if roll < 5 {
                next_policy += 1;
                let user = user_name(rng.gen_range(0..num_users));
                let policy = Policy::ban(format!("user-ban-{}", next_policy), PolicyKind::User, user)
                    .with_reason("spam");
                active.push(policy.clone());
                yield Churn::Policies(PolicyRevisionDelta::adding([policy]));
            } else if roll < 7 && !active.is_empty() {
                let policy = active.swap_remove(rng.gen_range(0..active.len()));
                yield Churn::Policies(PolicyRevisionDelta::removing([policy]));
            } else {
                let room = room_name(rng.gen_range(0..num_rooms));
                let user = user_name(rng.gen_range(0..num_users));
                let delta = if rng.gen_bool(0.7) {
                    MembershipRevisionDelta::new().join(room.as_str(), user.as_str())
                } else {
                    MembershipRevisionDelta::new().leave(room.as_str(), user.as_str())
                };
                yield Churn::Membership(delta);
            }
        }
    }
}

/// Drive random revisions through a warden against a slow in-memory gateway
/// and check that every room ends up matching the intent.
pub async fn churn(
    num_rooms: usize,
    num_users: usize,
    num_revisions: usize,
    latency_ms: u64,
) -> warden_sdk::Result<ChurnStats> {
    println!("\n╔════════════════════════════════════════════════════════════╗");
    println!("║        Reconciliation Churn (Async)                        ║");
    println!("║  Rooms: {} | Users: {} | Revisions: {} | Latency: {}ms ║",
             num_rooms, num_users, num_revisions, latency_ms);
    println!("╚════════════════════════════════════════════════════════════╝");

    let started_at = Utc::now();
    let start = Instant::now();

    let gateway = Arc::new(MemoryGateway::with_latency(Duration::from_millis(latency_ms)));
    let config = ReconcileConfigBuilder::new()
        .acl_resync_delay(latency_ms * 5)
        .build();
    let warden = Warden::new(gateway.clone(), config.clone(), Arc::new(TracingReporter))?;

    let rooms: Vec<RoomId> = (0..num_rooms).map(|i| RoomId::new(room_name(i))).collect();
    for room in &rooms {
        gateway.add_room(room.clone());
        warden.protect_room(room.clone());
    }

    println!("\n[Phase 1/2] Issuing revisions...");

    let mut revisions = Box::pin(churn_generator(num_rooms, num_users, num_revisions));
    let mut issued = 0;
    while let Some(change) = revisions.next().await {
        match change {
            Churn::Policies(delta) => warden.issue_policies(delta),
            Churn::Membership(delta) => warden.issue_membership(delta),
        }
        issued += 1;

        if issued % 25 == 0 {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        if issued % 500 == 0 {
            println!("  Revisions issued: {}/{}", issued, num_revisions);
        }
    }

    println!("[Phase 1/2] ✓ Completed");
    println!("[Phase 2/2] Checking convergence...");

    // Check every room once more; each check queues behind whatever is still
    // in flight for its room and runs with the final intent.
    let checks: Vec<_> = rooms.iter().map(|room| warden.check_room_acl(room.clone())).collect();
    for outcome in futures::future::join_all(checks).await {
        if let Err(error) = outcome {
            warn!(%error, "final ACL check failed");
        }
    }
    for room in &rooms {
        if let Err(error) = warden.user_ban_sync().sync_room(room).await {
            warn!(%room, %error, "final ban sync failed");
        }
    }

    let intent = warden.server_ban_intent();
    let expected_acl = ServerAcl::compile(&intent, &config);
    let user_bans = warden.user_ban_intent();
    let diverged_rooms: Vec<RoomId> = rooms
        .iter()
        .filter(|room| {
            let acl_matches = gateway
                .acl(room)
                .map_or(false, |acl| acl.is_equivalent(&expected_acl));
            let banned = gateway.banned(room);
            let bans_applied = user_bans.users_to_ban(room).is_subset(&banned);
            !(acl_matches && bans_applied)
        })
        .cloned()
        .collect();

    let effects = gateway.effects();
    let acl_updates = effects
        .iter()
        .filter(|effect| matches!(effect, Effect::AclSent { .. }))
        .count();
    let ban_batches = effects.len() - acl_updates;
    let users_banned = rooms
        .iter()
        .flat_map(|room| gateway.banned(room))
        .collect::<BTreeSet<_>>()
        .len();

    warden.shutdown();
    println!("[Phase 2/2] ✓ Completed");

    let total_time = start.elapsed();
    Ok(ChurnStats {
        started_at,
        num_rooms,
        num_revisions: issued,
        acl_updates,
        ban_batches,
        users_banned,
        total_time,
        revisions_per_second: issued as f64 / total_time.as_secs_f64(),
        diverged_rooms,
    })
}

/// Churn at growing room counts
pub async fn churn_scaling(max_rooms: usize, step_size: usize) -> warden_sdk::Result<bool> {
    println!("\n╔════════════════════════════════════════════════════════════╗");
    println!("║      Scaling Analysis - Reconciliation vs Rooms            ║");
    println!("╚════════════════════════════════════════════════════════════╝");

    let mut converged = true;
    let mut current_rooms = step_size;
    while current_rooms <= max_rooms {
        let stats = churn(current_rooms, 200, current_rooms * 50, 2).await?;
        stats.print();
        converged &= stats.converged();
        current_rooms += step_size;
    }
    Ok(converged)
}
