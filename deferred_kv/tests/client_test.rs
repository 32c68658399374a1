#[macro_use]
extern crate hamcrest;
use hamcrest::prelude::*;

mod common;

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use common::{reactor_harness, standalone_harness, Harness, Outcomes};
use deferred_kv::{ClientConfig, CompletionState, DeferredClient, Error, Mode};
use store_api::{
    attributes, ClientError, Dispatched, Predicate, Request, Response, Status, StoreClient, Value,
};
use store_api_mocked::{MockStore, ReactorEvent, MOCK_POLL_FD};

const FD: i32 = MOCK_POLL_FD;

fn seed_greek(store: &MockStore) {
    for (key, name) in ["alpha", "beta", "gamma", "delta"].iter().enumerate() {
        store.insert("foo", key as i64, attributes! { "name" => *name, "n" => 1 });
    }
}

#[test]
fn get_resolves_when_the_reactor_reports_readiness() {
    let Harness {
        store,
        reactor,
        client,
    } = reactor_harness();
    store.insert("foo", 42, attributes! { "v" => "towels" });
    let outcomes = Outcomes::new();

    let completion = client.get("foo", 42);
    outcomes.watch(&completion);
    assert!(outcomes.events().is_empty());
    assert_that!(client.outstanding(), is(equal_to(1)));
    assert!(reactor.is_watching(FD));

    let op = store.in_flight()[0];
    store.complete(op);
    assert_eq!(reactor.notify_readable(FD), Some(Dispatched::Completed));

    assert_eq!(outcomes.events(), vec!["ok:v=towels"]);
    assert_that!(client.outstanding(), is(equal_to(0)));
    assert_eq!(
        reactor.events(),
        vec![ReactorEvent::Watch(FD), ReactorEvent::Unwatch(FD)]
    );
}

#[test]
fn search_delivers_every_item_then_one_end() {
    let Harness {
        store,
        reactor,
        client,
    } = reactor_harness();
    seed_greek(&store);
    let outcomes = Outcomes::new();

    let sequence = client.search("foo", vec![Predicate::equals("n", 1)]);
    outcomes.watch_sequence(&sequence, "name");
    let op = store.in_flight()[0];

    assert_that!(store.complete_all(op), is(equal_to(5)));
    assert_that!(reactor.run_until_idle(FD), is(equal_to(5)));

    assert_eq!(
        outcomes.events(),
        vec![
            "item:alpha",
            "item:beta",
            "item:gamma",
            "item:delta",
            "end"
        ]
    );
    // One watch for the whole stream
    assert_eq!(
        reactor.events(),
        vec![ReactorEvent::Watch(FD), ReactorEvent::Unwatch(FD)]
    );
}

#[test]
fn items_wait_for_a_late_consumer() {
    let Harness {
        store,
        reactor,
        client,
    } = reactor_harness();
    seed_greek(&store);

    let sequence = client.search("foo", vec![]);
    let op = store.in_flight()[0];
    store.complete(op);
    store.complete(op);
    reactor.run_until_idle(FD);
    assert_that!(sequence.buffered(), is(equal_to(2)));

    let outcomes = Outcomes::new();
    outcomes.watch_sequence(&sequence, "name");
    assert_eq!(outcomes.events(), vec!["item:alpha", "item:beta"]);

    store.complete_all(op);
    reactor.run_until_idle(FD);
    assert_eq!(
        outcomes.events(),
        vec!["item:alpha", "item:beta", "item:gamma", "item:delta", "end"]
    );
}

#[test]
fn out_of_order_completions_reach_their_own_callers() {
    let Harness {
        store,
        reactor,
        client,
    } = reactor_harness();
    store.insert("foo", 1, attributes! { "v" => "one" });
    store.insert("foo", 2, attributes! { "v" => "two" });
    let (first, second) = (Outcomes::new(), Outcomes::new());

    first.watch(&client.get("foo", 1));
    second.watch(&client.get("foo", 2));
    let ops = store.in_flight();

    store.complete(ops[1]);
    reactor.notify_readable(FD);
    assert!(first.events().is_empty());
    assert_eq!(second.events(), vec!["ok:v=two"]);

    store.complete(ops[0]);
    reactor.notify_readable(FD);
    assert_eq!(first.events(), vec!["ok:v=one"]);
    assert_eq!(second.events(), vec!["ok:v=two"]);
}

#[test]
fn spurious_readiness_is_a_no_op() {
    let Harness {
        store: _store,
        reactor,
        client,
    } = reactor_harness();
    let completion = client.get("foo", 1);

    assert_eq!(reactor.notify_readable(FD), Some(Dispatched::Nothing));
    assert_eq!(completion.state(), CompletionState::Pending);
    assert!(!client.is_failed());
}

#[test]
fn standalone_mode_matches_reactor_mode() {
    let (store, standalone) = standalone_harness();
    seed_greek(&store);
    store.insert("foo", 42, attributes! { "v" => "towels" });
    let Harness {
        store: rstore,
        reactor,
        client,
    } = reactor_harness();
    seed_greek(&rstore);
    rstore.insert("foo", 42, attributes! { "v" => "towels" });
    rstore.set_auto_complete(true);

    let run = |client: &DeferredClient<MockStore>| {
        let outcomes = Outcomes::new();
        outcomes.watch(&client.get("foo", 42));
        outcomes.watch(&client.atomic_add("foo", 0, attributes! { "n" => 2 }));
        outcomes.watch(&client.count("foo", vec![Predicate::equals("n", 1)]));
        outcomes.watch_sequence(&client.sorted_search("foo", vec![], "name", 2, false), "name");
        outcomes
    };

    let inline = run(&standalone);
    assert_eq!(standalone.outstanding(), 0);
    let deferred = run(&client);
    reactor.run_until_idle(FD);

    assert_eq!(
        inline.events(),
        vec!["ok:v=towels", "ok:true", "ok:3", "item:alpha", "item:beta", "end"]
    );
    assert_eq!(deferred.events(), inline.events());
    assert_eq!(
        store.calls(),
        vec![
            "execute:get",
            "execute:atomic_add",
            "execute:count",
            "sorted_search",
            "next",
            "next",
            "next"
        ]
    );
}

#[test]
fn every_typed_operation_runs() {
    let (store, client) = standalone_harness();
    store.insert("foo", "k", attributes! { "s" => "mid", "n" => 5 });
    let outcomes = Outcomes::new();

    for completion in [
        client.put("foo", "new", attributes! { "s" => "x" }),
        client.put_if_not_exist("foo", "new", attributes! { "s" => "y" }),
        client.cond_put(
            "foo",
            "k",
            vec![Predicate::equals("n", 5)],
            attributes! { "n" => 6 },
        ),
        client.atomic_sub("foo", "k", attributes! { "n" => 1 }),
        client.string_append("foo", "k", attributes! { "s" => "dle" }),
        client.string_prepend("foo", "k", attributes! { "s" => "a " }),
        client.list_rpush("foo", "new", attributes! { "l" => vec![Value::from(1)] }),
        client.cond_del("foo", "new", vec![Predicate::equals("s", "nope")]),
        client.del("foo", "new"),
        client.group_del("foo", vec![Predicate::equals("n", 99)]),
    ] {
        outcomes.watch(&completion);
    }

    assert_eq!(
        outcomes.events(),
        vec![
            "ok:true", "ok:false", "ok:true", "ok:true", "ok:true", "ok:true", "ok:true",
            "ok:false", "ok:true", "ok:true"
        ]
    );
    assert_eq!(
        store.object("foo", "k"),
        Some(attributes! { "s" => "a middle", "n" => 5 })
    );
}

#[test]
fn drain_failure_fails_everything_once_and_poisons_the_client() {
    let Harness {
        store,
        reactor,
        client,
    } = reactor_harness();
    seed_greek(&store);
    let outcomes = Outcomes::new();
    outcomes.watch(&client.get("foo", 1));
    outcomes.watch(&client.get("foo", 2));
    outcomes.watch_sequence(&client.search("foo", vec![]), "name");
    store.fail_next_drain(ClientError::new(Status::PollFailed, "boom"));

    assert_eq!(reactor.notify_readable(FD), Some(Dispatched::Nothing));

    let failure = "err:store client error: poll failed: boom";
    assert_eq!(outcomes.events(), vec![failure, failure, failure]);
    assert!(client.is_failed());
    assert!(!reactor.is_watching(FD));

    let calls_before = store.calls().len();
    let late = Outcomes::new();
    late.watch(&client.get("foo", 3));
    assert_eq!(
        late.events(),
        vec![format!(
            "err:this client has failed, please open a new one (cause: {})",
            &failure[4..]
        )]
    );
    assert_that!(store.calls().len(), is(equal_to(calls_before)));
    assert_eq!(reactor.notify_readable(FD), None);
}

#[test]
fn unknown_handle_is_fatal() {
    let Harness {
        store,
        reactor,
        client,
    } = reactor_harness();
    let outcomes = Outcomes::new();
    outcomes.watch(&client.get("foo", 1));

    let mut bypass = store.clone();
    let stray = bypass
        .submit(&Request::Get {
            space: "foo".to_string(),
            key: 9.into(),
        })
        .unwrap();
    store.complete(stray);
    reactor.notify_readable(FD);

    assert_eq!(
        outcomes.events(),
        vec![format!("err:store client reported unknown operation {stray}")]
    );
    assert!(client.is_failed());
}

#[test]
fn per_operation_errors_stay_local() {
    let Harness {
        store,
        reactor,
        client,
    } = reactor_harness();
    seed_greek(&store);
    store.set_auto_complete(true);
    let (refused, waited, streamed, healthy) =
        (Outcomes::new(), Outcomes::new(), Outcomes::new(), Outcomes::new());

    store.fail_next_call(ClientError::new(Status::ReadOnly, ""));
    refused.watch(&client.put("foo", 1, attributes! {}));
    assert_eq!(refused.events(), vec!["err:store client error: cluster is read-only"]);

    store.fail_next_wait(ClientError::new(Status::Timeout, ""));
    waited.watch(&client.get("foo", 1));
    reactor.run_until_idle(FD);
    assert_eq!(waited.events(), vec!["err:store client error: timeout"]);

    store.fail_next_item(ClientError::new(Status::ServerError, "disk"));
    streamed.watch_sequence(&client.search("foo", vec![]), "name");
    reactor.run_until_idle(FD);
    assert_eq!(
        streamed.events(),
        vec!["err:store client error: server error: disk"]
    );

    healthy.watch(&client.get("foo", 0));
    reactor.run_until_idle(FD);
    assert_eq!(healthy.events(), vec!["ok:n=Int(1),name=alpha"]);
    assert!(!client.is_failed());
}

#[test]
fn unknown_space_fails_only_that_call() {
    let (_store, client) = standalone_harness();

    let outcomes = Outcomes::new();
    outcomes.watch(&client.get("nowhere", 1));
    outcomes.watch_sequence(&client.search("nowhere", vec![]), "name");

    assert_eq!(
        outcomes.events(),
        vec![
            "err:store client error: unknown space: nowhere",
            "err:store client error: unknown space: nowhere"
        ]
    );
    assert!(!client.is_failed());
}

#[test]
fn failing_consumer_fails_the_sequence_but_not_the_client() {
    let Harness {
        store,
        reactor,
        client,
    } = reactor_harness();
    seed_greek(&store);
    let seen = Rc::new(Cell::new(0));
    let counter = Rc::clone(&seen);
    let failure = Rc::new(RefCell::new(None));
    let slot = Rc::clone(&failure);

    let sequence = client.search("foo", vec![]);
    sequence
        .on_each_item(move |_| {
            counter.set(counter.get() + 1);
            Err(Error::Callback("reader gave up".to_string()))
        })
        .on_failure(move |e| *slot.borrow_mut() = Some(e.clone()));
    store.complete_all(store.in_flight()[0]);

    assert_that!(reactor.run_until_idle(FD), is(equal_to(5)));

    assert_eq!(seen.get(), 1);
    assert_eq!(
        *failure.borrow(),
        Some(Error::Callback("reader gave up".to_string()))
    );
    assert_eq!(client.outstanding(), 0);
    assert!(!client.is_failed());
}

#[test]
fn panicking_callback_does_not_break_the_client() {
    let Harness {
        store,
        reactor,
        client,
    } = reactor_harness();
    store.set_auto_complete(true);
    store.insert("foo", 1, attributes! { "v" => "x" });

    client.get("foo", 1).on_success(|_| panic!("caller bug"));
    reactor.run_until_idle(FD);

    let outcomes = Outcomes::new();
    outcomes.watch(&client.get("foo", 1));
    reactor.run_until_idle(FD);
    assert_eq!(outcomes.events(), vec!["ok:v=x"]);
}

#[test]
fn callbacks_can_chain_new_calls() {
    let Harness {
        store,
        reactor,
        client,
    } = reactor_harness();
    store.set_auto_complete(true);
    store.insert("foo", 1, attributes! { "next" => 2 });
    store.insert("foo", 2, attributes! { "v" => "end of chain" });
    let client = Rc::new(client);
    let outcomes = Outcomes::new();

    let chained = Rc::clone(&client);
    let sink = outcomes.clone();
    client.get("foo", 1).on_success(move |response| {
        let next = response
            .as_object()
            .and_then(|o| o.get("next"))
            .and_then(Value::as_int)
            .unwrap_or_default();
        sink.watch(&chained.get("foo", next));
    });
    reactor.run_until_idle(FD);

    assert_eq!(outcomes.events(), vec!["ok:v=end of chain"]);
    assert_eq!(
        reactor.events(),
        vec![
            ReactorEvent::Watch(FD),
            ReactorEvent::Unwatch(FD),
            ReactorEvent::Watch(FD),
            ReactorEvent::Unwatch(FD)
        ]
    );
}

#[test]
fn reentrant_dispatch_is_refused() {
    let Harness {
        store,
        reactor,
        client,
    } = reactor_harness();
    store.set_auto_complete(true);
    let client = Rc::new(client);
    let _second = client.get("foo", 2);
    let nested = Rc::new(Cell::new(None));

    let inner_client = Rc::clone(&client);
    let slot = Rc::clone(&nested);
    client
        .get("foo", 1)
        .on_success(move |_| slot.set(Some(inner_client.handle_readable())));
    // Drains the older `get("foo", 2)` first; nothing registered on it
    reactor.notify_readable(FD);
    reactor.notify_readable(FD);

    assert_eq!(nested.get(), Some(Dispatched::Nothing));
    assert_eq!(client.outstanding(), 0);
}

#[test]
fn refused_watch_fails_the_call_and_the_client() {
    let Harness {
        store: _store,
        reactor,
        client,
    } = reactor_harness();
    reactor.refuse_next_watch();

    let outcomes = Outcomes::new();
    outcomes.watch(&client.get("foo", 1));

    assert_eq!(
        outcomes.events(),
        vec!["err:cannot watch poll descriptor: watch refused by mock reactor"]
    );
    assert!(client.is_failed());
}

#[test]
fn close_finishes_outstanding_work_then_releases() {
    let Harness {
        store,
        reactor,
        client,
    } = reactor_harness();
    seed_greek(&store);
    let outcomes = Outcomes::new();
    outcomes.watch(&client.get("foo", 0));
    outcomes.watch_sequence(&client.search("foo", vec![Predicate::equals("name", "beta")]), "name");

    client.close();

    assert_eq!(
        outcomes.events(),
        vec!["ok:n=Int(1),name=alpha", "item:beta", "end"]
    );
    assert!(client.is_closed());
    assert_eq!(reactor.events().last(), Some(&ReactorEvent::Release(FD)));

    client.close();
    let late = Outcomes::new();
    late.watch(&client.get("foo", 0));
    assert_eq!(late.events(), vec!["err:client is closed"]);
}

#[test]
fn close_from_a_callback_abandons_the_rest() {
    let Harness {
        store,
        reactor,
        client,
    } = reactor_harness();
    let client = Rc::new(client);
    let outcomes = Outcomes::new();
    let closer = Rc::clone(&client);

    client.get("foo", 1).on_success(move |_| closer.close());
    outcomes.watch(&client.get("foo", 2));
    store.complete(store.in_flight()[0]);
    reactor.notify_readable(FD);

    assert_eq!(outcomes.events(), vec!["err:client is closed"]);
    assert!(client.is_closed());
}

#[test]
fn connect_uses_the_configured_target() {
    let config = ClientConfig::default().with_host("kv.local").with_port(2000);

    let client: DeferredClient<MockStore> =
        DeferredClient::connect(&config, Mode::Standalone).unwrap();
    assert_eq!(client.target(), config);
    assert!(client.mode().is_standalone());

    let refused = DeferredClient::<MockStore>::connect(&config.with_port(0), Mode::Standalone);
    assert!(matches!(
        refused,
        Err(Error::Client(ClientError {
            status: Status::CoordFail,
            ..
        }))
    ));
}

#[test]
fn responses_serialize_for_display() {
    let (store, client) = standalone_harness();
    store.insert("foo", 1, attributes! { "v" => "towels", "n" => 2 });
    let captured = Rc::new(RefCell::new(None));
    let slot = Rc::clone(&captured);

    client.get("foo", 1).on_success(move |r| {
        if let Response::Object(Some(attrs)) = r {
            *slot.borrow_mut() = Some(serde_json::to_string(attrs).unwrap());
        }
    });

    assert_eq!(
        captured.borrow().as_deref(),
        Some(r#"{"n":2,"v":"towels"}"#)
    );
}
