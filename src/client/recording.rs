//! In-memory [`GraphSession`] that records every statement and replays scripted results.

use super::session::{GraphSession, Params, Record};
use crate::error::GraphError;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    Write,
    Run,
    Fetch,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub kind: CallKind,
    pub query: String,
    pub params: Params,
}

/// Responses are consumed in call order; once the script runs out every call returns no rows.
#[derive(Debug, Default)]
pub struct RecordingSession {
    calls: Mutex<Vec<RecordedCall>>,
    script: Mutex<VecDeque<Result<Vec<Record>, GraphError>>>,
}

impl RecordingSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_rows(&self, rows: Vec<Record>) {
        self.push(Ok(rows));
    }

    pub fn push_error(&self, error: GraphError) {
        self.push(Err(error));
    }

    fn push(&self, response: Result<Vec<Record>, GraphError>) {
        if let Ok(mut script) = self.script.lock() {
            script.push_back(response);
        }
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn queries(&self) -> Vec<String> {
        self.calls().into_iter().map(|c| c.query).collect()
    }

    fn record(&self, kind: CallKind, query: &str, params: &Params) -> Result<Vec<Record>, GraphError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(RecordedCall {
                kind,
                query: query.to_string(),
                params: params.clone(),
            });
        }
        self.script
            .lock()
            .ok()
            .and_then(|mut script| script.pop_front())
            .unwrap_or_else(|| Ok(Vec::new()))
    }
}

#[async_trait]
impl GraphSession for RecordingSession {
    async fn execute_write(&self, query: &str, params: &Params) -> Result<Vec<Record>, GraphError> {
        self.record(CallKind::Write, query, params)
    }

    async fn run(&self, query: &str, params: &Params) -> Result<(), GraphError> {
        self.record(CallKind::Run, query, params).map(|_| ())
    }

    async fn fetch(&self, query: &str, params: &Params) -> Result<Vec<Record>, GraphError> {
        self.record(CallKind::Fetch, query, params)
    }
}
