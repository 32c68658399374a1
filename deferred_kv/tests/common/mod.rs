#![allow(dead_code)]

use std::cell::RefCell;
use std::rc::Rc;

use deferred_kv::{ClientConfig, Completion, DeferredClient, Error, Mode, SequenceCompletion};
use store_api::{Attributes, Response, Value};
use store_api_mocked::{MockReactor, MockStore};
use tracing_subscriber::EnvFilter;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_test_writer()
        .try_init();
}

pub struct Harness {
    pub store: MockStore,
    pub reactor: MockReactor,
    pub client: DeferredClient<MockStore>,
}

pub fn reactor_harness() -> Harness {
    init_tracing();
    let store = MockStore::new();
    store.add_space("foo");
    let reactor = MockReactor::new();
    let client = DeferredClient::with_client(
        store.clone(),
        ClientConfig::default(),
        Mode::reactor(reactor.clone()),
    );
    Harness {
        store,
        reactor,
        client,
    }
}

pub fn standalone_harness() -> (MockStore, DeferredClient<MockStore>) {
    init_tracing();
    let store = MockStore::new();
    store.add_space("foo");
    let client = DeferredClient::with_client(store.clone(), ClientConfig::default(), Mode::Standalone);
    (store, client)
}

/// Everything a completion reported, in order
#[derive(Clone, Default)]
pub struct Outcomes {
    pub events: Rc<RefCell<Vec<String>>>,
}

impl Outcomes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<String> {
        self.events.borrow().clone()
    }

    fn push(&self, event: String) {
        self.events.borrow_mut().push(event);
    }

    pub fn watch(&self, completion: &Completion<Response>) {
        let ok = self.clone();
        let failed = self.clone();
        completion
            .on_success(move |r| ok.push(format!("ok:{}", describe(r))))
            .on_failure(move |e| failed.push(format!("err:{e}")));
    }

    pub fn watch_sequence(&self, sequence: &SequenceCompletion<Attributes>, attribute: &'static str) {
        let items = self.clone();
        let ok = self.clone();
        let failed = self.clone();
        sequence
            .on_each_item(move |item| {
                items.push(format!("item:{}", show(item.get(attribute))));
                Ok(())
            })
            .on_success(move |_| ok.push("end".to_string()))
            .on_failure(move |e: &Error| failed.push(format!("err:{e}")));
    }
}

pub fn describe(response: &Response) -> String {
    match response {
        Response::Object(Some(attrs)) => {
            let fields: Vec<String> = attrs.iter().map(|(k, v)| format!("{k}={}", show(Some(v)))).collect();
            fields.join(",")
        }
        Response::Object(None) => "none".to_string(),
        Response::Success(ok) => ok.to_string(),
        Response::Count(n) => n.to_string(),
    }
}

fn show(value: Option<&Value>) -> String {
    match value {
        Some(Value::Str(s)) => s.clone(),
        Some(other) => format!("{other:?}"),
        None => "-".to_string(),
    }
}
