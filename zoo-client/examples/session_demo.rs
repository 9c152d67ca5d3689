//! Leader election walkthrough against the in-memory ensemble
//!
//! Two sessions race for an ephemeral sequential lease. The loser waits for
//! the winner's node to disappear, which happens when the winner's session
//! is released.
//!
//! Run with: ZOO_LOG_MODE=development cargo run -p zoo-sdk-client --example session_demo

use zoo_client::logging::init_logging_from_env;
use zoo_client::prelude::*;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging_from_env()?;

    println!("zoo-sdk - Session Demo");
    println!("======================");

    let ensemble = MemoryEnsemble::new();
    let config = ClientConfig::new("memory:2181");

    let winner = ManagedSession::acquire(&ensemble, &config).await?;
    let loser = ManagedSession::acquire(&ensemble, &config).await?;

    let _states = loser.listen(|state| println!("   [loser] connection state: {}", state));

    winner.mkdirp("/election").await?;
    let winner_node = winner
        .create("/election/n-", CreateMode::EphemeralSequential, None)
        .await?;
    let loser_node = loser
        .create("/election/n-", CreateMode::EphemeralSequential, None)
        .await?;

    let candidates = loser.get_children("/election").await?;
    println!("\nCandidates under {}: {:?}", candidates.root, candidates.paths);

    let leader = winner.current_id(&winner_node.path);
    println!("Leader: {}", leader);
    println!("Follower: {}", loser.current_id(&loser_node.path));

    println!("\nFollower waits for {} to go away...", winner_node.path);
    let waiting = loser.wait_for_deletion(&winner_node.path);

    let release = async {
        tokio::task::yield_now().await;
        println!("Leader steps down");
        winner.close();
    };
    let (observed, ()) = tokio::join!(waiting, release);
    println!("Observed deletion of {}", observed?.path);

    let remaining = loser.get_children("/election").await?;
    println!("Candidates now: {:?}", remaining.paths);

    // The follower's ephemeral node disappears with its session.
    drop(loser);
    println!("\nOpen sessions: {}", ensemble.open_sessions());
    println!("Election node still present: {}", ensemble.exists("/election"));

    Ok(())
}
