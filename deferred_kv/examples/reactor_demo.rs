//! Runs a few operations through `TokioReactor` against the in-memory store.
//!
//! ```text
//! RUST_LOG=deferred_kv=trace cargo run -p deferred_kv --example reactor_demo
//! ```

use std::rc::Rc;

use futures::StreamExt;
use tokio::task::LocalSet;
use tracing::info;
use tracing_subscriber::EnvFilter;

use deferred_kv::{ClientConfig, DeferredClient, Mode, TokioReactor};
use store_api::{attributes, Comparison, Predicate};
use store_api_mocked::MockStore;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = ClientConfig::from_env()?;
    let store = MockStore::with_readiness_pipe()?;
    store.add_space("demo");
    store.set_auto_complete(true);

    LocalSet::new()
        .run_until(async move {
            let reactor = Rc::new(TokioReactor::new());
            let client = DeferredClient::with_client(store, config, Mode::Reactor(reactor));
            info!(coordinator = %client.target(), "client ready");

            for (key, name) in ["alpha", "beta", "gamma", "delta"].iter().enumerate() {
                client
                    .put("demo", key as i64, attributes! { "name" => *name, "rank" => key as i64 })
                    .await?;
            }
            let response = client.get("demo", 2).await?;
            info!(object = %serde_json::to_string(&response.as_object())?, "get");

            let mut top = client
                .sorted_search(
                    "demo",
                    vec![Predicate::new("rank", Comparison::GreaterEqual, 1)],
                    "rank",
                    2,
                    true,
                )
                .into_stream();
            while let Some(item) = top.next().await {
                info!(object = %serde_json::to_string(&item?)?, "search");
            }

            client.close();
            Ok::<(), Box<dyn std::error::Error>>(())
        })
        .await
}
