//! Shared test transport
//!
//! `ScriptedTransport` never touches the network. Connect and send outcomes
//! are popped from per-call scripts (an empty script means success), and
//! the transport records how many sends overlap so tests can check pool
//! limits under contention.

#![allow(dead_code)]

use async_trait::async_trait;
use hyper::StatusCode;
use routepool::pool::Route;
use routepool::transport::{ErrorKind, Request, Response, Transport, TransportError};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Handle stored in the pool for each fake connection
#[derive(Debug)]
pub struct FakeConnection {
    pub serial: u32,
    pub route: Route,
}

#[derive(Default)]
pub struct ScriptedTransport {
    connect_script: Mutex<VecDeque<ErrorKind>>,
    send_script: Mutex<VecDeque<ErrorKind>>,
    send_delay: Duration,
    stale: AtomicBool,

    pub connects: AtomicU32,
    pub sends: AtomicU32,

    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
    per_route: Mutex<HashMap<Route, (usize, usize)>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep every send busy for `delay`
    pub fn with_send_delay(mut self, delay: Duration) -> Self {
        self.send_delay = delay;
        self
    }

    /// Fail the next connects with these kinds, in order
    pub fn fail_connects(self, kinds: impl IntoIterator<Item = ErrorKind>) -> Self {
        self.connect_script.lock().unwrap().extend(kinds);
        self
    }

    /// Fail the next sends with these kinds, in order
    pub fn fail_sends(self, kinds: impl IntoIterator<Item = ErrorKind>) -> Self {
        self.send_script.lock().unwrap().extend(kinds);
        self
    }

    /// Report every existing connection as no longer usable
    pub fn mark_stale(&self, stale: bool) {
        self.stale.store(stale, Ordering::SeqCst);
    }

    pub fn connects(&self) -> u32 {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn sends(&self) -> u32 {
        self.sends.load(Ordering::SeqCst)
    }

    /// Highest number of concurrent sends on `route`
    pub fn max_in_flight_on(&self, route: &Route) -> usize {
        self.per_route
            .lock()
            .unwrap()
            .get(route)
            .map_or(0, |(_, max)| *max)
    }

    fn enter(&self, route: &Route) {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let mut per_route = self.per_route.lock().unwrap();
        let entry = per_route.entry(route.clone()).or_default();
        entry.0 += 1;
        entry.1 = entry.1.max(entry.0);
    }

    fn exit(&self, route: &Route) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        if let Some(entry) = self.per_route.lock().unwrap().get_mut(route) {
            entry.0 -= 1;
        }
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    type Connection = FakeConnection;

    async fn connect(&self, route: &Route) -> Result<FakeConnection, TransportError> {
        let serial = self.connects.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(kind) = self.connect_script.lock().unwrap().pop_front() {
            return Err(TransportError::new(kind, "scripted connect failure"));
        }
        Ok(FakeConnection {
            serial,
            route: route.clone(),
        })
    }

    async fn send(
        &self,
        conn: &mut FakeConnection,
        request: &Request,
    ) -> Result<Response, TransportError> {
        self.sends.fetch_add(1, Ordering::SeqCst);
        assert_eq!(&conn.route, request.route(), "connection used for wrong route");

        self.enter(&conn.route);
        if self.send_delay.is_zero() {
            tokio::task::yield_now().await;
        } else {
            tokio::time::sleep(self.send_delay).await;
        }
        self.exit(&conn.route);

        let scripted = self.send_script.lock().unwrap().pop_front();
        match scripted {
            Some(kind) => Err(TransportError::new(kind, "scripted send failure")),
            None => Ok(Response::new(
                StatusCode::OK,
                format!("served by connection {}", conn.serial),
            )),
        }
    }

    fn is_reusable(&self, _conn: &FakeConnection) -> bool {
        !self.stale.load(Ordering::SeqCst)
    }
}
