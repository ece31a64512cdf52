use anyhow::{Context, Result};
use rollcall_core::{Embedding, FaceMatcher, TracingDecisionLogger};
use rollcall_store::AttendanceStore;
use rollcalld::{spawn_engine, Config, Engine, RecognitionSession};
use serde::Deserialize;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

/// One probe per stdin line, as emitted by the host's inference step.
#[derive(Deserialize)]
struct ProbeLine {
    embedding: Vec<f32>,
    #[serde(default)]
    model_version: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    tracing::info!("rollcalld starting");

    let config = Config::from_env();
    let match_config = config.match_config();
    match_config.validate().context("invalid matching thresholds")?;

    let store = AttendanceStore::open(&config.db_path)
        .with_context(|| format!("opening {}", config.db_path.display()))?;
    let matcher = FaceMatcher::new(config.embedding_size).with_logger(Arc::new(TracingDecisionLogger));
    let engine = spawn_engine(Engine::new(
        store,
        matcher,
        match_config,
        config.check_in_policy(),
    ))?;

    let mut session = RecognitionSession::start(engine, config.frame_interval());
    let mut states = session.subscribe();
    tokio::spawn(async move {
        loop {
            let state = states.borrow_and_update().clone();
            match serde_json::to_string(&state) {
                Ok(line) => println!("{line}"),
                Err(e) => tracing::warn!(error = %e, "cannot serialize state"),
            }
            if states.changed().await.is_err() {
                break;
            }
        }
    });

    session.ready().await;
    tracing::info!("rollcalld ready");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str::<ProbeLine>(&line) {
                    Ok(probe) => {
                        session.submit(Embedding {
                            values: probe.embedding,
                            model_version: probe.model_version,
                        });
                    }
                    Err(e) => tracing::warn!(error = %e, "ignoring malformed probe line"),
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    session.shutdown().await;
    tracing::info!("rollcalld shutting down");
    Ok(())
}
