//! Socket-based integration tests: a host and several participants.

use std::time::Duration;

use arena_client::{join_with_retry, JoinOutcome, SessionClient};
use arena_shared::admission::SessionState;
use arena_shared::config::SessionConfig;
use arena_tests::{fast_config, init_tracing, HostHarness, WAIT};

fn is_active(v: &arena_client::SessionView) -> bool {
    v.state() == SessionState::Active
}

// ============================================================================
// Admission and start
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn second_participant_starts_the_game() -> anyhow::Result<()> {
    init_tracing();
    let host = HostHarness::start(fast_config(2, 4)).await?;

    let mut alice = host.join("alice").await?;
    assert_eq!(alice.name, "alice");
    assert_eq!(alice.view.state(), SessionState::WaitingForParticipants);
    assert_eq!(alice.view.status_line(), "Waiting for players... (1/2)");

    let mut bob = host.join("bob").await?;
    alice
        .wait_until(WAIT, |v| is_active(v) && v.participant_count() == 2)
        .await?;
    bob.wait_until(WAIT, |v| is_active(v) && v.participant_count() == 2)
        .await?;
    assert_eq!(alice.view.games_started, 1);

    // Avatars appear only once the threshold is met, one per participant.
    alice.wait_until(WAIT, |v| v.avatars.len() == 2).await?;
    bob.wait_until(WAIT, |v| v.my_avatar().is_some()).await?;

    let host = host.stop().await?;
    assert_eq!(host.spawner().spawned_count(), 2);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn lone_participant_keeps_waiting() -> anyhow::Result<()> {
    init_tracing();
    let host = HostHarness::start(fast_config(2, 4)).await?;
    let mut alice = host.join("alice").await?;

    tokio::time::sleep(Duration::from_millis(50)).await;
    alice.poll();
    assert_eq!(alice.view.state(), SessionState::WaitingForParticipants);
    assert!(alice.view.my_avatar().is_none());

    let host = host.stop().await?;
    assert_eq!(host.state(), SessionState::WaitingForParticipants);
    assert_eq!(host.spawner().spawned_count(), 0);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn full_session_rejects_extra_participant() -> anyhow::Result<()> {
    init_tracing();
    let host = HostHarness::start(fast_config(2, 2)).await?;
    let _alice = host.join("alice").await?;
    let _bob = host.join("bob").await?;

    let err = match host.join("carol").await {
        Ok(_) => anyhow::bail!("third participant should be rejected"),
        Err(e) => e,
    };
    assert!(err.to_string().contains("full"), "{err}");

    let host = host.stop().await?;
    assert_eq!(host.controller().participant_count(), 2);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn wrong_session_name_is_rejected() -> anyhow::Result<()> {
    init_tracing();
    let host = HostHarness::start(fast_config(2, 4)).await?;
    let cfg = SessionConfig {
        session_name: "SomeOtherRoom".to_string(),
        ..host.cfg.clone()
    };

    let err = match SessionClient::connect(&cfg).await {
        Ok(_) => anyhow::bail!("handshake should fail"),
        Err(e) => e,
    };
    assert!(err.to_string().contains("rejected"), "{err}");

    let host = host.stop().await?;
    assert_eq!(host.controller().participant_count(), 0);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn blank_names_are_generated() -> anyhow::Result<()> {
    init_tracing();
    let host = HostHarness::start(fast_config(2, 4)).await?;
    let anon = host.join("   ").await?;

    assert!(anon.name.starts_with("Player"), "{}", anon.name);
    let me = anon
        .view
        .snapshot
        .participants
        .iter()
        .find(|p| p.id == anon.participant_id)
        .map(|p| p.name.clone());
    assert_eq!(me.as_deref(), Some(anon.name.as_str()));

    host.stop().await?;
    Ok(())
}

// ============================================================================
// Conclusion and reset
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn first_win_claim_concludes_for_everyone() -> anyhow::Result<()> {
    init_tracing();
    let host = HostHarness::start(fast_config(2, 4)).await?;
    let mut alice = host.join("alice").await?;
    let mut bob = host.join("bob").await?;
    alice.wait_until(WAIT, is_active).await?;
    bob.wait_until(WAIT, is_active).await?;

    bob.claim_win().await?;
    for client in [&mut alice, &mut bob] {
        client
            .wait_until(WAIT, |v| v.winner() == Some("bob"))
            .await?;
        assert_eq!(client.view.state(), SessionState::Concluded);
        assert_eq!(client.view.status_line(), "bob wins!");
    }

    // A late claim does not change the outcome.
    alice.claim_win().await?;
    tokio::time::sleep(Duration::from_millis(50)).await;
    alice.poll();
    assert_eq!(alice.view.winner(), Some("bob"));

    let host = host.stop().await?;
    assert_eq!(host.controller().winner(), Some("bob"));
    assert_eq!(host.state(), SessionState::Concluded);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn reset_clears_winner_and_restarts() -> anyhow::Result<()> {
    init_tracing();
    let host = HostHarness::start(fast_config(2, 4)).await?;
    let mut alice = host.join("alice").await?;
    let _bob = host.join("bob").await?;
    alice.wait_until(WAIT, is_active).await?;

    host.console("conclude alice").await?;
    alice
        .wait_until(WAIT, |v| v.winner() == Some("alice"))
        .await?;
    assert_eq!(alice.view.state(), SessionState::Concluded);
    assert_eq!(alice.view.status_line(), "alice wins!");

    // Both participants are still present, so the host starts a new match.
    host.console("reset").await?;
    alice
        .wait_until(WAIT, |v| {
            v.games_started == 2 && is_active(v) && v.participant_count() == 2
        })
        .await?;
    assert_eq!(alice.view.winner(), None);

    host.stop().await?;
    Ok(())
}

// ============================================================================
// Leaving
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn leave_and_kick_update_the_roster() -> anyhow::Result<()> {
    init_tracing();
    let host = HostHarness::start(fast_config(2, 4)).await?;
    let mut alice = host.join("alice").await?;
    let mut bob = host.join("bob").await?;
    let mut carol = host.join("carol").await?;
    alice.wait_until(WAIT, |v| v.participant_count() == 3).await?;

    bob.leave().await?;
    assert!(!bob.is_joined());
    alice.wait_until(WAIT, |v| v.participant_count() == 2).await?;
    assert!(!alice.view.snapshot.is_member(bob.participant_id));

    host.console(&format!("kick {}", carol.participant_id)).await?;
    carol.wait_until(WAIT, |_| false).await.unwrap_err();
    assert!(!carol.is_joined());
    alice.wait_until(WAIT, |v| v.participant_count() == 1).await?;
    assert!(!alice.view.avatars.contains_key(&carol.participant_id));

    // Dropping below the threshold does not end the match.
    assert_eq!(alice.view.state(), SessionState::Active);

    let host = host.stop().await?;
    assert_eq!(host.controller().participant_count(), 1);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn host_quit_disconnects_participants() -> anyhow::Result<()> {
    init_tracing();
    let host = HostHarness::start(fast_config(2, 4)).await?;
    let mut alice = host.join("alice").await?;

    host.stop().await?;
    let err = alice.wait_until(WAIT, |_| false).await.unwrap_err();
    assert!(err.to_string().contains("disconnected"), "{err}");
    assert!(!alice.is_joined());
    Ok(())
}

// ============================================================================
// Joining with retry
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn join_with_retry_finds_running_host() -> anyhow::Result<()> {
    init_tracing();
    let host = HostHarness::start(fast_config(2, 4)).await?;

    match join_with_retry(&host.cfg).await {
        JoinOutcome::Joined(client) => assert!(client.is_joined()),
        JoinOutcome::HostFallback { .. } => anyhow::bail!("host is running"),
    }

    host.stop().await?;
    Ok(())
}
