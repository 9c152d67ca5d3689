//! Property-based tests for connection outcomes, child ordering and the
//! listener registry.

mod common;

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::task::Poll;

use common::ScriptedDriver;
use proptest::prelude::*;
use zoo_client::{classify, ClientFacade, ConnectionState, ListenerRegistry, Unsubscribe, Verdict};

fn any_state() -> impl Strategy<Value = ConnectionState> {
    prop::sample::select(ConnectionState::ALL.to_vec())
}

#[derive(Debug, Clone)]
enum RegistryOp {
    Add,
    Remove(usize),
    Broadcast(ConnectionState),
}

fn registry_op() -> impl Strategy<Value = RegistryOp> {
    prop_oneof![
        Just(RegistryOp::Add),
        (0usize..16).prop_map(RegistryOp::Remove),
        any_state().prop_map(RegistryOp::Broadcast),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Connect concludes on the first conclusive state of the handshake and
    /// leaves neither a listener nor a closed session behind.
    #[test]
    fn prop_connect_follows_first_conclusive_state(
        script in prop::collection::vec(any_state(), 0..12)
    ) {
        let driver = ScriptedDriver::new(script.clone());
        let zk = ClientFacade::new(driver.clone());

        let mut connecting = tokio_test::task::spawn(zk.connect());
        let outcome = connecting.poll();

        let expected = script
            .iter()
            .copied()
            .find(|state| classify(*state) != Verdict::Transitional);

        match (expected, outcome) {
            (None, Poll::Pending) => {
                prop_assert_eq!(zk.listener_count(), 1);
            }
            (Some(state), Poll::Ready(result)) => {
                prop_assert_eq!(result.is_ok(), state == ConnectionState::SyncConnected);
                prop_assert_eq!(zk.listener_count(), 0);
            }
            (expected, outcome) => {
                prop_assert!(false, "expected {:?}, got ready={}", expected, outcome.is_ready());
            }
        }
        drop(connecting);

        prop_assert_eq!(driver.connect_count(), 1);
        prop_assert_eq!(zk.current_state(), script.last().copied());
        // Only an abandoned attempt closes the session.
        prop_assert_eq!(driver.close_count(), u32::from(expected.is_none()));
    }

    /// Children come back sorted no matter how the driver orders them.
    #[test]
    fn prop_children_are_sorted(
        children in prop::collection::vec("[a-z0-9-]{1,12}", 0..24)
    ) {
        let driver = ScriptedDriver::connected();
        driver.set_children(children.iter().map(String::as_str).collect());
        let zk = ClientFacade::new(driver);

        let list = tokio_test::block_on(zk.get_children("/root")).unwrap();

        let mut expected = children.clone();
        expected.sort();
        prop_assert_eq!(list.root, "/root");
        prop_assert_eq!(list.paths, expected);
    }

    /// Every broadcast reaches exactly the listeners that are subscribed at
    /// that moment, in subscription order.
    #[test]
    fn prop_registry_matches_model(
        ops in prop::collection::vec(registry_op(), 1..60)
    ) {
        let registry = ListenerRegistry::new();
        let log: Arc<Mutex<Vec<(usize, ConnectionState)>>> = Arc::new(Mutex::new(Vec::new()));
        let mut handles: Vec<Unsubscribe> = Vec::new();
        let mut live: BTreeMap<usize, ()> = BTreeMap::new();
        let mut expected = Vec::new();

        for op in ops {
            match op {
                RegistryOp::Add => {
                    let id = handles.len();
                    let sink = Arc::clone(&log);
                    handles.push(registry.add(move |state| sink.lock().unwrap().push((id, state))));
                    live.insert(id, ());
                }
                RegistryOp::Remove(index) => {
                    if let Some(handle) = handles.get(index) {
                        let was_live = live.remove(&index).is_some();
                        prop_assert_eq!(handle.unsubscribe(), was_live);
                    }
                }
                RegistryOp::Broadcast(state) => {
                    let delivered = registry.broadcast(state);
                    prop_assert_eq!(delivered, live.len());
                    expected.extend(live.keys().map(|id| (*id, state)));
                }
            }
        }

        prop_assert_eq!(registry.len(), live.len());
        let actual = log.lock().unwrap().clone();
        prop_assert_eq!(actual, expected);
    }
}
