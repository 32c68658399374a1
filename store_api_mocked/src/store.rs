//! Mocked store client with an in-memory keyspace.
//!
//! - `add_space` / `insert` seed the keyspace. Operations on a space that
//!   does not exist fail with `Status::UnknownSpace`.
//! - Asynchronous operations run against the keyspace when submitted, but
//!   stay invisible to `loop_once` until the test signals them with
//!   `complete`. A search needs one signal per object plus one for its end.
//! - `set_auto_complete(true)` signals every operation as soon as it starts.
//! - `fail_next_call`, `fail_next_wait`, `fail_next_item` and
//!   `fail_next_drain` inject a `ClientError` at the matching call site.
//! - `calls` records every client method invoked, in order.
//!
//! `with_readiness_pipe` backs `poll_fd` with a socket pair holding one byte
//! per pending signal, so a real event loop can watch it.
use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::io::{self, Read, Write};
use std::os::fd::{AsRawFd, RawFd};
use std::os::unix::net::UnixStream;
use std::rc::Rc;
use std::time::Duration;

use store_api::{
    Attributes, ClientError, Connect, HandleGen, Key, OpHandle, Predicate, Request, Response,
    Search, Status, StoreClient, Value,
};

/// Descriptor reported by stores without a readiness pipe
pub const MOCK_POLL_FD: RawFd = 0;

enum MockOp {
    Single {
        result: Result<Response, ClientError>,
        unsignalled: usize,
    },
    Iter {
        items: VecDeque<Attributes>,
        unsignalled: usize,
    },
}

impl MockOp {
    fn unsignalled(&self) -> usize {
        match self {
            MockOp::Single { unsignalled, .. } | MockOp::Iter { unsignalled, .. } => *unsignalled,
        }
    }

    fn unsignalled_mut(&mut self) -> &mut usize {
        match self {
            MockOp::Single { unsignalled, .. } | MockOp::Iter { unsignalled, .. } => unsignalled,
        }
    }
}

#[derive(Default)]
struct Faults {
    call: Option<ClientError>,
    wait: Option<ClientError>,
    item: Option<ClientError>,
    drain: Option<ClientError>,
}

struct ReadinessPipe {
    reader: UnixStream,
    writer: UnixStream,
}

struct MockState {
    target: Option<(String, u16)>,
    spaces: HashMap<String, BTreeMap<Key, Attributes>>,
    handles: HandleGen,
    ops: BTreeMap<OpHandle, MockOp>,
    ready: VecDeque<OpHandle>,
    auto_complete: bool,
    faults: Faults,
    calls: Vec<String>,
    pipe: Option<ReadinessPipe>,
}

#[derive(Clone)]
pub struct MockStore {
    inner: Rc<RefCell<MockState>>,
}

impl Default for MockStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MockStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Rc::new(RefCell::new(MockState {
                target: None,
                spaces: HashMap::new(),
                handles: HandleGen::new(),
                ops: BTreeMap::new(),
                ready: VecDeque::new(),
                auto_complete: false,
                faults: Faults::default(),
                calls: Vec::new(),
                pipe: None,
            })),
        }
    }

    /// Store whose `poll_fd` is a real descriptor, readable while signals are pending
    /// # Errors
    /// The socket pair cannot be created
    pub fn with_readiness_pipe() -> io::Result<Self> {
        let (reader, writer) = UnixStream::pair()?;
        reader.set_nonblocking(true)?;
        writer.set_nonblocking(true)?;
        let store = Self::new();
        store.inner.borrow_mut().pipe = Some(ReadinessPipe { reader, writer });
        Ok(store)
    }

    #[must_use]
    pub fn target(&self) -> Option<(String, u16)> {
        self.inner.borrow().target.clone()
    }

    pub fn add_space(&self, space: &str) {
        self.inner
            .borrow_mut()
            .spaces
            .entry(space.to_string())
            .or_default();
    }

    /// Store an object, creating the space if needed
    pub fn insert(&self, space: &str, key: impl Into<Key>, attributes: Attributes) {
        self.inner
            .borrow_mut()
            .spaces
            .entry(space.to_string())
            .or_default()
            .insert(key.into(), attributes);
    }

    #[must_use]
    pub fn object(&self, space: &str, key: impl Into<Key>) -> Option<Attributes> {
        let key = key.into();
        self.inner
            .borrow()
            .spaces
            .get(space)
            .and_then(|objects| objects.get(&key))
            .cloned()
    }

    pub fn set_auto_complete(&self, enabled: bool) {
        self.inner.borrow_mut().auto_complete = enabled;
    }

    /// Next `execute`, `submit` or `search` fails with `err`
    pub fn fail_next_call(&self, err: ClientError) {
        self.inner.borrow_mut().faults.call = Some(err);
    }

    /// Next `wait` fails with `err`
    pub fn fail_next_wait(&self, err: ClientError) {
        self.inner.borrow_mut().faults.wait = Some(err);
    }

    /// Next `next_item` fails with `err`
    pub fn fail_next_item(&self, err: ClientError) {
        self.inner.borrow_mut().faults.item = Some(err);
    }

    /// Next `loop_once` fails with `err`
    pub fn fail_next_drain(&self, err: ClientError) {
        self.inner.borrow_mut().faults.drain = Some(err);
    }

    /// Operations started and not yet retired, oldest first
    #[must_use]
    pub fn in_flight(&self) -> Vec<OpHandle> {
        self.inner.borrow().ops.keys().copied().collect()
    }

    /// Names of the client methods invoked so far
    #[must_use]
    pub fn calls(&self) -> Vec<String> {
        self.inner.borrow().calls.clone()
    }

    /// Signal one unit of progress of `op`: its value, or its next object.
    /// Returns `false` when `op` has nothing left to signal.
    pub fn complete(&self, op: OpHandle) -> bool {
        self.inner.borrow_mut().signal(op)
    }

    /// Signal every remaining unit of progress of `op`
    pub fn complete_all(&self, op: OpHandle) -> usize {
        let mut state = self.inner.borrow_mut();
        let mut n = 0;
        while state.signal(op) {
            n += 1;
        }
        n
    }

    /// Make the descriptor readable without completing anything
    pub fn poke(&self) {
        self.inner.borrow().wake();
    }
}

impl MockState {
    fn record(&mut self, call: &str) {
        self.calls.push(call.to_string());
    }

    fn wake(&self) {
        if let Some(pipe) = &self.pipe {
            // A full socket buffer already means "readable"
            let _ = (&pipe.writer).write(&[1]);
        }
    }

    fn consume_wakeup(&self) {
        if let Some(pipe) = &self.pipe {
            let mut byte = [0u8; 1];
            let _ = (&pipe.reader).read(&mut byte);
        }
    }

    fn signal(&mut self, op: OpHandle) -> bool {
        let Some(entry) = self.ops.get_mut(&op) else {
            return false;
        };
        let unsignalled = entry.unsignalled_mut();
        if *unsignalled == 0 {
            return false;
        }
        *unsignalled -= 1;
        self.ready.push_back(op);
        self.wake();
        true
    }

    fn start(&mut self, op: MockOp) -> OpHandle {
        let handle = self.handles.next_handle();
        self.ops.insert(handle, op);
        if self.auto_complete {
            while self.signal(handle) {}
        }
        handle
    }

    fn objects(&mut self, space: &str) -> Result<&mut BTreeMap<Key, Attributes>, ClientError> {
        self.spaces
            .get_mut(space)
            .ok_or_else(|| ClientError::new(Status::UnknownSpace, space))
    }

    fn apply(&mut self, request: &Request) -> Result<Response, ClientError> {
        match request {
            Request::Get { space, key } => {
                Ok(Response::Object(self.objects(space)?.get(key).cloned()))
            }
            Request::Put {
                space,
                key,
                attributes,
            } => {
                let object = self.objects(space)?.entry(key.clone()).or_default();
                object.extend(attributes.clone());
                Ok(Response::Success(true))
            }
            Request::PutIfNotExist {
                space,
                key,
                attributes,
            } => {
                let objects = self.objects(space)?;
                if objects.contains_key(key) {
                    return Ok(Response::Success(false));
                }
                objects.insert(key.clone(), attributes.clone());
                Ok(Response::Success(true))
            }
            Request::CondPut {
                space,
                key,
                checks,
                attributes,
            } => {
                let Some(object) = self.objects(space)?.get_mut(key) else {
                    return Ok(Response::Success(false));
                };
                if !all_match(checks, object) {
                    return Ok(Response::Success(false));
                }
                object.extend(attributes.clone());
                Ok(Response::Success(true))
            }
            Request::Del { space, key } => {
                Ok(Response::Success(self.objects(space)?.remove(key).is_some()))
            }
            Request::CondDel { space, key, checks } => {
                let objects = self.objects(space)?;
                match objects.get(key) {
                    Some(object) if all_match(checks, object) => {
                        objects.remove(key);
                        Ok(Response::Success(true))
                    }
                    _ => Ok(Response::Success(false)),
                }
            }
            Request::AtomicAdd {
                space,
                key,
                attributes,
            } => self.update(space, key, attributes, |old, delta| add(old, delta, 1)),
            Request::AtomicSub {
                space,
                key,
                attributes,
            } => self.update(space, key, attributes, |old, delta| add(old, delta, -1)),
            Request::StringAppend {
                space,
                key,
                attributes,
            } => self.update(space, key, attributes, |old, suffix| {
                concat(old, suffix, false)
            }),
            Request::StringPrepend {
                space,
                key,
                attributes,
            } => self.update(space, key, attributes, |old, prefix| {
                concat(old, prefix, true)
            }),
            Request::ListRpush {
                space,
                key,
                attributes,
            } => self.update(space, key, attributes, |old, item| match old {
                None => Ok(Value::List(vec![item.clone()])),
                Some(Value::List(items)) => {
                    let mut items = items.clone();
                    items.push(item.clone());
                    Ok(Value::List(items))
                }
                Some(other) => Err(wrong_type("list", other)),
            }),
            Request::Count { space, predicates } => {
                let n = self
                    .objects(space)?
                    .values()
                    .filter(|object| all_match(predicates, object))
                    .count();
                Ok(Response::Count(n as u64))
            }
            Request::GroupDel { space, predicates } => {
                self.objects(space)?
                    .retain(|_, object| !all_match(predicates, object));
                Ok(Response::Success(true))
            }
        }
    }

    /// Read-modify-write of existing attributes; a missing object is `Success(false)`
    fn update(
        &mut self,
        space: &str,
        key: &Key,
        changes: &Attributes,
        f: impl Fn(Option<&Value>, &Value) -> Result<Value, ClientError>,
    ) -> Result<Response, ClientError> {
        let Some(object) = self.objects(space)?.get_mut(key) else {
            return Ok(Response::Success(false));
        };
        let mut updated = object.clone();
        for (name, change) in changes {
            let value = f(object.get(name), change)?;
            updated.insert(name.clone(), value);
        }
        *object = updated;
        Ok(Response::Success(true))
    }

    fn select(&mut self, search: &Search) -> Result<VecDeque<Attributes>, ClientError> {
        let mut found: Vec<Attributes> = self
            .objects(&search.space)?
            .values()
            .filter(|object| all_match(&search.predicates, object))
            .cloned()
            .collect();
        if let Some(sort) = &search.sort {
            found.sort_by(|a, b| {
                let ord = match (a.get(&sort.attribute), b.get(&sort.attribute)) {
                    (Some(x), Some(y)) => x.compare(y).unwrap_or(std::cmp::Ordering::Equal),
                    (Some(_), None) => std::cmp::Ordering::Less,
                    (None, Some(_)) => std::cmp::Ordering::Greater,
                    (None, None) => std::cmp::Ordering::Equal,
                };
                if sort.descending {
                    ord.reverse()
                } else {
                    ord
                }
            });
            found.truncate(sort.limit);
        }
        Ok(found.into())
    }
}

fn all_match(predicates: &[Predicate], object: &Attributes) -> bool {
    predicates.iter().all(|p| p.matches(object))
}

fn wrong_type(expected: &str, actual: &Value) -> ClientError {
    ClientError::new(
        Status::WrongType,
        format!("expected {expected}, found {}", actual.type_name()),
    )
}

#[allow(clippy::cast_precision_loss)]
fn add(old: Option<&Value>, delta: &Value, sign: i64) -> Result<Value, ClientError> {
    match (old.unwrap_or(&Value::Int(0)), delta) {
        (Value::Int(a), Value::Int(b)) => Ok(Value::Int(a + sign * b)),
        (Value::Float(a), Value::Float(b)) => Ok(Value::Float(a + sign as f64 * b)),
        (Value::Int(_), other) => Err(wrong_type("int", other)),
        (Value::Float(_), other) => Err(wrong_type("float", other)),
        (other, _) => Err(wrong_type("number", other)),
    }
}

fn concat(old: Option<&Value>, part: &Value, prepend: bool) -> Result<Value, ClientError> {
    let old = match old {
        None => "",
        Some(Value::Str(s)) => s.as_str(),
        Some(other) => return Err(wrong_type("string", other)),
    };
    let Value::Str(part) = part else {
        return Err(wrong_type("string", part));
    };
    Ok(Value::Str(if prepend {
        format!("{part}{old}")
    } else {
        format!("{old}{part}")
    }))
}

impl StoreClient for MockStore {
    fn execute(&mut self, request: &Request) -> Result<Response, ClientError> {
        let mut state = self.inner.borrow_mut();
        state.record(&format!("execute:{}", request.operation().name()));
        if let Some(err) = state.faults.call.take() {
            return Err(err);
        }
        state.apply(request)
    }

    fn submit(&mut self, request: &Request) -> Result<OpHandle, ClientError> {
        let mut state = self.inner.borrow_mut();
        state.record(&format!("submit:{}", request.operation().name()));
        if let Some(err) = state.faults.call.take() {
            return Err(err);
        }
        let result = state.apply(request);
        Ok(state.start(MockOp::Single {
            result,
            unsignalled: 1,
        }))
    }

    fn wait(&mut self, op: OpHandle) -> Result<Response, ClientError> {
        let mut state = self.inner.borrow_mut();
        state.record("wait");
        let entry = state.ops.remove(&op);
        if let Some(err) = state.faults.wait.take() {
            return Err(err);
        }
        match entry {
            Some(MockOp::Single { result, .. }) => result,
            Some(MockOp::Iter { .. }) => Err(ClientError::new(
                Status::Internal,
                format!("{op} is an iterator"),
            )),
            None => Err(ClientError::new(
                Status::Internal,
                format!("{op} is not in flight"),
            )),
        }
    }

    fn search(&mut self, search: &Search) -> Result<OpHandle, ClientError> {
        let mut state = self.inner.borrow_mut();
        state.record(search.operation().name());
        if let Some(err) = state.faults.call.take() {
            return Err(err);
        }
        let items = state.select(search)?;
        let unsignalled = items.len() + 1;
        Ok(state.start(MockOp::Iter { items, unsignalled }))
    }

    fn next_item(&mut self, op: OpHandle) -> Result<Option<Attributes>, ClientError> {
        let mut state = self.inner.borrow_mut();
        state.record("next");
        if let Some(err) = state.faults.item.take() {
            // A broken iterator reports no further progress
            state.ops.remove(&op);
            state.ready.retain(|ready| *ready != op);
            return Err(err);
        }
        let item = match state.ops.get_mut(&op) {
            Some(MockOp::Iter { items, .. }) => items.pop_front(),
            _ => {
                return Err(ClientError::new(
                    Status::Internal,
                    format!("{op} is not an iterator in flight"),
                ))
            }
        };
        if item.is_none() {
            state.ops.remove(&op);
        }
        Ok(item)
    }

    fn loop_once(&mut self, timeout: Option<Duration>) -> Result<Option<OpHandle>, ClientError> {
        let mut state = self.inner.borrow_mut();
        state.record("loop");
        if let Some(err) = state.faults.drain.take() {
            return Err(err);
        }
        if state.ready.is_empty() && timeout.is_none() {
            // Blocking: the oldest operation with pending progress finishes first
            let next = state
                .ops
                .iter()
                .find(|(_, op)| op.unsignalled() > 0)
                .map(|(handle, _)| *handle);
            match next {
                Some(handle) => {
                    state.signal(handle);
                }
                None => return Err(ClientError::new(Status::NonePending, "")),
            }
        }
        state.consume_wakeup();
        Ok(state.ready.pop_front())
    }

    fn poll_fd(&self) -> RawFd {
        self.inner
            .borrow()
            .pipe
            .as_ref()
            .map_or(MOCK_POLL_FD, |pipe| pipe.reader.as_raw_fd())
    }
}

impl Connect for MockStore {
    fn connect(host: &str, port: u16) -> Result<Self, ClientError> {
        if host.is_empty() || port == 0 {
            return Err(ClientError::new(
                Status::CoordFail,
                format!("cannot reach coordinator at {host:?}:{port}"),
            ));
        }
        let store = Self::new();
        store.inner.borrow_mut().target = Some((host.to_string(), port));
        Ok(store)
    }
}
