//! Integration tests for leader election across whole instances.
//!
//! Most tests start an in-process relay so the winning instance holds a
//! real delivery socket and its leadership stays put until it dies. The
//! exception points the relay URL at a closed port on purpose, to show a
//! leader abandoning leadership when its socket fails.

use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;
use tiller_core::election::{self, BusMessage};
use tiller_core::{deadline, Bus, ElectionConfig, Host, HostConfig, Instance, Phase};
use tokio::sync::watch;
use url::Url;

fn host_for(relay: Url) -> (Arc<Host>, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let mut config = HostConfig::new(temp_dir.path(), relay);
    config.election = ElectionConfig {
        probe_timeout: Duration::from_millis(80),
        poll_interval: Duration::from_millis(80),
    };
    (Arc::new(Host::new(config)), temp_dir)
}

async fn create_test_host() -> (Arc<Host>, TempDir) {
    let addr = tiller_delivery::start_server("127.0.0.1", 0).await.unwrap();
    host_for(Url::parse(&format!("http://{}/", addr)).unwrap())
}

async fn wait_for_phase(rx: &mut watch::Receiver<Phase>, want: Phase, limit: Duration) {
    let outcome = deadline(limit, async {
        loop {
            if *rx.borrow_and_update() == want {
                return;
            }
            if rx.changed().await.is_err() {
                panic!("Instance loop ended");
            }
        }
    })
    .await;
    assert!(!outcome.is_timed_out(), "Timed out waiting for {:?}", want);
}

#[tokio::test]
async fn test_racing_instances_elect_exactly_one_leader() {
    let (host, _dir) = create_test_host().await;
    let instances = vec![
        Instance::start(host.clone()).await.unwrap(),
        Instance::start(host.clone()).await.unwrap(),
        Instance::start(host.clone()).await.unwrap(),
    ];

    let settled = deadline(Duration::from_secs(3), async {
        loop {
            if instances.iter().any(|instance| instance.is_leader()) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(!settled.is_timed_out(), "no instance ever claimed the socket");

    // Sample across several probe and poll rounds; no moment may show two
    // concurrent leaders.
    for _ in 0..50 {
        let leading = instances
            .iter()
            .filter(|instance| instance.is_leader())
            .count();
        assert!(leading <= 1, "two instances led at the same time");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    let leading = instances
        .iter()
        .filter(|instance| instance.is_leader())
        .count();
    assert_eq!(leading, 1);
}

#[tokio::test]
async fn test_late_starters_yield_to_the_sitting_leader() {
    let (host, _dir) = create_test_host().await;
    let leader = Instance::start(host.clone()).await.unwrap();
    wait_for_phase(&mut leader.phases(), Phase::Leading, Duration::from_secs(2)).await;

    let late_a = Instance::start(host.clone()).await.unwrap();
    let late_b = Instance::start(host.clone()).await.unwrap();

    for _ in 0..50 {
        assert!(!late_a.is_leader(), "late starter overthrew a live leader");
        assert!(!late_b.is_leader(), "late starter overthrew a live leader");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(leader.is_leader());
}

#[tokio::test]
async fn test_takeover_fits_the_probe_plus_poll_budget() {
    let (host, _dir) = create_test_host().await;
    let leader = Instance::start(host.clone()).await.unwrap();
    wait_for_phase(&mut leader.phases(), Phase::Leading, Duration::from_secs(2)).await;

    let standby = Instance::start(host).await.unwrap();
    wait_for_phase(&mut standby.phases(), Phase::Standby, Duration::from_secs(2)).await;

    // Worst case is a full poll sleep plus one unanswered probe, 160ms at
    // these timings; the rest of the limit is scheduling slack.
    drop(leader);
    wait_for_phase(&mut standby.phases(), Phase::Leading, Duration::from_secs(1)).await;
}

#[tokio::test]
async fn test_leader_gives_up_leadership_when_its_socket_fails() {
    // Closed port: every socket attempt errors immediately.
    let (host, _dir) = host_for(Url::parse("http://127.0.0.1:9/").unwrap());
    let instance = Instance::start(host).await.unwrap();

    let mut phases = instance.phases();
    wait_for_phase(&mut phases, Phase::Leading, Duration::from_secs(2)).await;

    // The tenure ends with the failed connect; the instance must stop
    // answering queries and restart the cycle from probing instead of
    // squatting on leadership with no socket to show for it.
    wait_for_phase(&mut phases, Phase::Probing, Duration::from_secs(2)).await;
}

#[tokio::test]
async fn test_concurrent_probes_agree_on_one_winner() {
    let bus: Bus<BusMessage> = Bus::new("presence");
    let config = ElectionConfig {
        probe_timeout: Duration::from_millis(100),
        poll_interval: Duration::from_millis(100),
    };

    let mut probes = Vec::new();
    for _ in 0..5 {
        let handle = bus.open();
        probes.push(async move { election::probe(&handle, &config).await.unwrap() });
    }
    let outcomes = futures::future::join_all(probes).await;

    let leaders = outcomes.iter().filter(|outcome| outcome.is_leader()).count();
    assert_eq!(leaders, 1, "probing must crown exactly one claimant");
}
