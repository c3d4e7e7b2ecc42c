//! Request records and the sources that produce them.
//!
//! The engine imposes no file format. A reader only has to hand out
//! [`Request`]s through [`RequestSource`]. The profiler additionally needs
//! every worker to walk the stream on its own cursor, which a source offers
//! through [`RequestSource::replay`].
//!
//! | Source            | Replayable | Storage                               |
//! |-------------------|------------|---------------------------------------|
//! | [`TraceBuffer`]   | yes        | `Arc<[Request]>`, shared read-only    |
//! | [`OnePassSource`] | no         | any iterator                          |
//! | `SyntheticSource` | yes        | seeded generator (see `workload`)     |

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Object identifier as it appears in a trace: numeric or string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ObjKey {
    Num(u64),
    Str(Arc<str>),
}

impl From<u64> for ObjKey {
    fn from(value: u64) -> Self {
        ObjKey::Num(value)
    }
}

impl From<&str> for ObjKey {
    fn from(value: &str) -> Self {
        ObjKey::Str(Arc::from(value))
    }
}

impl From<String> for ObjKey {
    fn from(value: String) -> Self {
        ObjKey::Str(Arc::from(value))
    }
}

impl fmt::Display for ObjKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ObjKey::Num(n) => write!(f, "{n}"),
            ObjKey::Str(s) => f.write_str(s),
        }
    }
}

/// One request record.
///
/// `timestamp` is wall-clock time in seconds as recorded by the trace.
/// Virtual time (the request index) is tracked by each cache instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    pub key: ObjKey,
    pub size: u64,
    pub timestamp: u64,
    pub ttl: Option<u32>,
}

impl Request {
    pub fn new(key: impl Into<ObjKey>, size: u64, timestamp: u64) -> Self {
        Self {
            key: key.into(),
            size,
            timestamp,
            ttl: None,
        }
    }

    pub fn with_ttl(mut self, ttl: u32) -> Self {
        self.ttl = Some(ttl);
        self
    }
}

/// A stream of requests.
///
/// `next_request` returning `None` is normal termination. Implementors that
/// can restart from the beginning on an independent cursor return it from
/// `replay`; the profiler refuses sources that cannot.
pub trait RequestSource {
    fn next_request(&mut self) -> Option<Request>;

    /// An independent cursor positioned at the first request.
    fn replay(&self) -> Option<Box<dyn RequestSource + Send>>;

    /// Total number of requests, when known up front.
    fn len_hint(&self) -> Option<u64> {
        None
    }
}

impl<S: RequestSource + ?Sized> RequestSource for Box<S> {
    fn next_request(&mut self) -> Option<Request> {
        (**self).next_request()
    }

    fn replay(&self) -> Option<Box<dyn RequestSource + Send>> {
        (**self).replay()
    }

    fn len_hint(&self) -> Option<u64> {
        (**self).len_hint()
    }
}

/// In-memory trace shared read-only between cursors.
#[derive(Debug, Clone)]
pub struct TraceBuffer {
    requests: Arc<[Request]>,
    pos: usize,
}

impl TraceBuffer {
    pub fn new(requests: impl Into<Arc<[Request]>>) -> Self {
        Self {
            requests: requests.into(),
            pos: 0,
        }
    }

    /// Builds a trace of unit-size requests from a key sequence, with
    /// timestamps equal to the request index.
    pub fn from_keys<I, K>(keys: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<ObjKey>,
    {
        let requests: Vec<Request> = keys
            .into_iter()
            .enumerate()
            .map(|(i, key)| Request::new(key, 1, i as u64))
            .collect();
        Self::new(requests)
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    pub fn requests(&self) -> &[Request] {
        &self.requests
    }
}

impl RequestSource for TraceBuffer {
    fn next_request(&mut self) -> Option<Request> {
        let req = self.requests.get(self.pos)?.clone();
        self.pos += 1;
        Some(req)
    }

    fn replay(&self) -> Option<Box<dyn RequestSource + Send>> {
        Some(Box::new(TraceBuffer {
            requests: Arc::clone(&self.requests),
            pos: 0,
        }))
    }

    fn len_hint(&self) -> Option<u64> {
        Some(self.requests.len() as u64)
    }
}

/// Single-pass wrapper around an iterator. Cannot be replayed.
pub struct OnePassSource<I> {
    iter: I,
}

impl<I> OnePassSource<I>
where
    I: Iterator<Item = Request>,
{
    pub fn new(iter: I) -> Self {
        Self { iter }
    }
}

impl<I> RequestSource for OnePassSource<I>
where
    I: Iterator<Item = Request>,
{
    fn next_request(&mut self) -> Option<Request> {
        self.iter.next()
    }

    fn replay(&self) -> Option<Box<dyn RequestSource + Send>> {
        None
    }
}
