//! Shared fixtures: an in-memory transport and document builders.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use framescope::{ApiRequest, Fetched, GatewayError, Transport};
use futures::future::BoxFuture;
use serde_json::{Value, json};
use tokio::time::Instant;

type Router = Box<dyn Fn(&ApiRequest) -> Value + Send + Sync>;

/// Answers requests from a routing closure, optionally throttling the
/// first few calls, and records when each call arrived.
pub struct ScriptedTransport {
    route: Router,
    latency: Duration,
    throttles: Mutex<VecDeque<Option<Duration>>>,
    calls: AtomicUsize,
    log: Mutex<Vec<(Instant, ApiRequest)>>,
}

impl ScriptedTransport {
    pub fn new(route: impl Fn(&ApiRequest) -> Value + Send + Sync + 'static) -> Arc<Self> {
        Arc::new(Self {
            route: Box::new(route),
            latency: Duration::ZERO,
            throttles: Mutex::new(VecDeque::new()),
            calls: AtomicUsize::new(0),
            log: Mutex::new(Vec::new()),
        })
    }

    /// Same body for every request.
    pub fn fixed(body: Value) -> Arc<Self> {
        Self::new(move |_| body.clone())
    }

    /// Same body for every request, answered after `latency`.
    pub fn delayed(body: Value, latency: Duration) -> Arc<Self> {
        Arc::new(Self {
            route: Box::new(move |_| body.clone()),
            latency,
            throttles: Mutex::new(VecDeque::new()),
            calls: AtomicUsize::new(0),
            log: Mutex::new(Vec::new()),
        })
    }

    /// Answer the next call with a 429 carrying `retry_after`.
    pub fn throttle_next(&self, retry_after: Option<Duration>) {
        self.throttles.lock().unwrap().push_back(retry_after);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn arrivals(&self) -> Vec<Instant> {
        self.log.lock().unwrap().iter().map(|(at, _)| *at).collect()
    }

    pub fn endpoints(&self) -> Vec<String> {
        self.log
            .lock()
            .unwrap()
            .iter()
            .map(|(_, req)| req.endpoint.clone())
            .collect()
    }
}

impl Transport for ScriptedTransport {
    fn get<'a>(&'a self, request: &'a ApiRequest) -> BoxFuture<'a, Result<Fetched, GatewayError>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.log
            .lock()
            .unwrap()
            .push((Instant::now(), request.clone()));
        let throttled = self.throttles.lock().unwrap().pop_front();
        let fetched = match throttled {
            Some(retry_after) => Fetched::Throttled { retry_after },
            None => Fetched::Body((self.route)(request)),
        };
        let latency = self.latency;
        Box::pin(async move {
            if !latency.is_zero() {
                tokio::time::sleep(latency).await;
            }
            Ok(fetched)
        })
    }
}

/// A file whose single page `page` holds `frames` top-level frames named
/// `Frame 1`, `Frame 2`, ...
pub fn file_with_frames(name: &str, page: &str, frames: usize) -> Value {
    let children: Vec<Value> = (1..=frames)
        .map(|i| {
            json!({
                "id": format!("10:{i}"),
                "name": format!("Frame {i}"),
                "type": "FRAME",
                "absoluteBoundingBox": {"x": 0.0, "y": 0.0, "width": 375.0, "height": 812.0},
            })
        })
        .collect();
    json!({
        "name": name,
        "lastModified": "2024-05-01T12:00:00Z",
        "document": {
            "id": "0:0",
            "name": "Document",
            "type": "DOCUMENT",
            "children": [
                {"id": "1:1", "name": page, "type": "CANVAS", "children": children},
                {"id": "1:2", "name": "Archive", "type": "CANVAS"},
            ],
        },
    })
}

/// Wrap a node in the single-node endpoint's response shape.
pub fn nodes_response(id: &str, document: Value) -> Value {
    json!({"nodes": {id: {"document": document}}})
}
