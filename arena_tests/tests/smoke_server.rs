use arena_server::server::bind_ephemeral;
use arena_shared::admission::SessionState;
use arena_tests::fast_config;

/// Smoke test: host can run a few ticks without panicking.
#[tokio::test]
async fn host_runs_few_ticks() -> anyhow::Result<()> {
    let (mut host, _cfg) = bind_ephemeral(fast_config(2, 4)).await?;
    host.run_for_ticks(3).await?;
    assert_eq!(host.tick(), 3);
    assert_eq!(host.state(), SessionState::WaitingForParticipants);
    assert_eq!(host.peer_count(), 0);
    Ok(())
}
