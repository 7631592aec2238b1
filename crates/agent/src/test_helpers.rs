//! Scripted provider shared by the orchestrator tests.

use std::collections::VecDeque;
use std::sync::Mutex;

use studiobot_core::error::ProviderError;
use studiobot_core::provider::{
    ChunkReceiver, Provider, ProviderRequest, StreamChunk, ToolCallDelta,
};
use tokio::sync::mpsc;

/// Replays one batch of chunks per `stream` call and records every request.
///
/// Once the script runs out, further rounds stream nothing but a finish marker.
pub struct ScriptedProvider {
    rounds: Mutex<VecDeque<Vec<Result<StreamChunk, ProviderError>>>>,
    requests: Mutex<Vec<ProviderRequest>>,
    missing_key: bool,
}

impl ScriptedProvider {
    pub fn new(rounds: Vec<Vec<StreamChunk>>) -> Self {
        Self {
            rounds: Mutex::new(rounds.into_iter().map(|r| r.into_iter().map(Ok).collect()).collect()),
            requests: Mutex::new(Vec::new()),
            missing_key: false,
        }
    }

    /// Rounds that may contain mid-stream errors.
    pub fn with_results(rounds: Vec<Vec<Result<StreamChunk, ProviderError>>>) -> Self {
        Self {
            rounds: Mutex::new(rounds.into()),
            requests: Mutex::new(Vec::new()),
            missing_key: false,
        }
    }

    pub fn without_credentials() -> Self {
        Self {
            missing_key: true,
            ..Self::new(Vec::new())
        }
    }

    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    fn check_credentials(&self) -> Result<(), ProviderError> {
        if self.missing_key {
            return Err(ProviderError::NotConfigured(
                "Missing API key for provider 'scripted'.".into(),
            ));
        }
        Ok(())
    }

    async fn stream(&self, request: ProviderRequest) -> Result<ChunkReceiver, ProviderError> {
        self.requests.lock().unwrap().push(request);
        let round = self
            .rounds
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| vec![Ok(StreamChunk::finished())]);
        let (tx, rx) = mpsc::channel(round.len().max(1));
        for item in round {
            tx.try_send(item).unwrap();
        }
        Ok(rx)
    }
}

/// Text tokens followed by a finish marker.
pub fn text_round(tokens: &[&str]) -> Vec<StreamChunk> {
    let mut round: Vec<StreamChunk> = tokens.iter().map(|t| StreamChunk::text(*t)).collect();
    round.push(StreamChunk::finished());
    round
}

/// A tool call split over several argument fragments.
pub fn tool_round(id: &str, name: &str, fragments: &[&str]) -> Vec<StreamChunk> {
    let mut round = Vec::new();
    for (i, fragment) in fragments.iter().enumerate() {
        round.push(StreamChunk::tool_fragment(ToolCallDelta {
            index: 0,
            id: (i == 0).then(|| id.to_string()),
            name: (i == 0).then(|| name.to_string()),
            arguments: Some(fragment.to_string()),
        }));
    }
    round.push(StreamChunk::finished());
    round
}

/// Several complete tool calls in one round, one slot each, in order.
pub fn multi_tool_round(calls: &[(&str, &str, &str)]) -> Vec<StreamChunk> {
    let mut round: Vec<StreamChunk> = calls
        .iter()
        .enumerate()
        .map(|(slot, (id, name, arguments))| {
            StreamChunk::tool_fragment(ToolCallDelta {
                index: slot as u32,
                id: Some(id.to_string()),
                name: Some(name.to_string()),
                arguments: Some(arguments.to_string()),
            })
        })
        .collect();
    round.push(StreamChunk::finished());
    round
}
