use crate::error::SimError;
use crate::sim::{
    ControlEvent, Engine, Event, EventQueue, Host, HostId, SimConfig, SimTime, StorageKind, Worker,
};
use parking_lot::Mutex;
use std::sync::Arc;

fn config(min_time_jump: u64, end_time: u64) -> SimConfig {
    SimConfig {
        min_time_jump,
        end_time,
        n_workers: 0,
        topology_path: "topology.json".into(),
        seed: 42,
    }
}

/// Message payload: when delivered, the host replies to `next` after
/// `offset` ns until `remaining` runs out.
#[derive(Clone)]
struct Hop {
    tag: u64,
    remaining: u32,
    next: HostId,
    offset: u64,
}

struct TestHost {
    id: HostId,
    queue: Mutex<EventQueue>,
    delivered: Mutex<Vec<(SimTime, u64)>>,
}

impl TestHost {
    fn new(id: u32) -> Arc<TestHost> {
        Arc::new(TestHost {
            id: HostId(id),
            queue: Mutex::new(EventQueue::new()),
            delivered: Mutex::new(Vec::new()),
        })
    }

    fn delivered(&self) -> Vec<(SimTime, u64)> {
        self.delivered.lock().clone()
    }
}

impl Host for TestHost {
    fn id(&self) -> HostId {
        self.id
    }

    fn push_local_event(&self, event: Event) {
        self.queue.lock().push(event);
    }

    fn peek_next_delivery_time(&self) -> Option<SimTime> {
        self.queue.lock().peek_time()
    }

    fn pop_next_event(&self, until: SimTime) -> Option<Event> {
        self.queue.lock().pop_before(until)
    }

    fn deliver(&self, event: Event, worker: &Worker<'_>) -> Result<(), SimError> {
        let now = event.delivery_time();
        let hop = event
            .payload()
            .and_then(|p| p.downcast_ref::<Hop>())
            .cloned()
            .expect("hop payload");
        self.delivered.lock().push((now, hop.tag));
        if hop.remaining > 0 {
            let reply = Hop {
                tag: hop.tag,
                remaining: hop.remaining - 1,
                next: self.id,
                offset: hop.offset,
            };
            worker.push_event(Event::message(
                SimTime(now.0 + hop.offset),
                hop.next,
                Box::new(reply),
            ))?;
        }
        Ok(())
    }
}

fn seed(engine: &Engine, at: u64, dst: HostId, hop: Hop) {
    engine
        .push_event(Event::message(SimTime(at), dst, Box::new(hop)))
        .expect("seed event");
}

#[test]
fn delivers_in_windows_and_advances_clock_by_min_time_jump() {
    let mut engine = Engine::new(config(1_000, 10_000)).expect("engine");
    let a = TestHost::new(1);
    let b = TestHost::new(2);
    engine.add_host(a.clone());
    engine.add_host(b.clone());

    // A at t=100 -> B at t=1100 -> A at t=2100, one window apart each.
    seed(
        &engine,
        100,
        a.id(),
        Hop {
            tag: 7,
            remaining: 2,
            next: b.id(),
            offset: 1_000,
        },
    );
    engine.run().expect("run");

    assert_eq!(a.delivered(), vec![(SimTime(100), 7), (SimTime(2_100), 7)]);
    assert_eq!(b.delivered(), vec![(SimTime(1_100), 7)]);
    // Three windows were needed; the clock stops on a window boundary.
    assert_eq!(engine.clock(), SimTime(3_000));
}

#[test]
fn same_host_events_may_have_zero_offset() {
    let mut engine = Engine::new(config(1_000, 10_000)).expect("engine");
    let a = TestHost::new(1);
    engine.add_host(a.clone());

    seed(
        &engine,
        100,
        a.id(),
        Hop {
            tag: 1,
            remaining: 3,
            next: a.id(),
            offset: 0,
        },
    );
    engine.run().expect("run");

    // All four deliveries happen at t=100 inside the first window.
    assert_eq!(
        a.delivered(),
        vec![
            (SimTime(100), 1),
            (SimTime(100), 1),
            (SimTime(100), 1),
            (SimTime(100), 1),
        ]
    );
    assert_eq!(engine.clock(), SimTime(1_000));
}

#[test]
fn cross_host_event_below_lookahead_aborts_the_run() {
    let mut engine = Engine::new(config(1_000, 10_000)).expect("engine");
    let a = TestHost::new(1);
    let b = TestHost::new(2);
    engine.add_host(a.clone());
    engine.add_host(b.clone());

    // At t=100 host A schedules for B at t=500: 400 < min_time_jump.
    seed(
        &engine,
        100,
        a.id(),
        Hop {
            tag: 1,
            remaining: 1,
            next: b.id(),
            offset: 400,
        },
    );
    let err = engine.run().expect_err("lookahead violation");
    match &err {
        SimError::LookaheadViolation {
            src,
            dst,
            emit_time,
            delivery_time,
            min_time_jump,
        } => {
            assert_eq!(*src, Some(a.id()));
            assert_eq!(*dst, Some(b.id()));
            assert_eq!(*emit_time, SimTime(100));
            assert_eq!(*delivery_time, SimTime(500));
            assert_eq!(*min_time_jump, SimTime(1_000));
        }
        other => panic!("unexpected error {other:?}"),
    }
    assert_eq!(err.exit_code(), 5);
    assert!(engine.is_killed());
    assert!(b.delivered().is_empty());
}

#[test]
fn cross_host_event_at_exactly_min_time_jump_is_accepted() {
    let mut engine = Engine::new(config(1_000, 10_000)).expect("engine");
    let a = TestHost::new(1);
    let b = TestHost::new(2);
    engine.add_host(a.clone());
    engine.add_host(b.clone());

    seed(
        &engine,
        100,
        a.id(),
        Hop {
            tag: 2,
            remaining: 1,
            next: b.id(),
            offset: 1_000,
        },
    );
    engine.run().expect("run");
    assert_eq!(b.delivered(), vec![(SimTime(1_100), 2)]);
}

struct SpawnHost {
    host: Arc<TestHost>,
    first_event_at: u64,
}

impl ControlEvent for SpawnHost {
    fn execute(self: Box<Self>, engine: &Engine) {
        let id = self.host.id();
        engine.add_host(self.host);
        engine
            .push_event(Event::message(
                SimTime(self.first_event_at),
                id,
                Box::new(Hop {
                    tag: 9,
                    remaining: 0,
                    next: id,
                    offset: 0,
                }),
            ))
            .expect("seed from control event");
    }
}

#[test]
fn control_events_run_single_threaded_before_the_window() {
    let mut engine = Engine::new(config(1_000, 10_000)).expect("engine");
    let a = TestHost::new(1);

    engine
        .push_event(Event::control(
            SimTime(0),
            Box::new(SpawnHost {
                host: a.clone(),
                first_event_at: 200,
            }),
        ))
        .expect("push control");
    engine.run().expect("run");

    // The host created pre-window already receives events in window 0.
    assert_eq!(a.delivered(), vec![(SimTime(200), 9)]);
}

struct KillSwitch;

impl ControlEvent for KillSwitch {
    fn execute(self: Box<Self>, engine: &Engine) {
        engine.kill();
    }
}

#[test]
fn kill_stops_the_run_at_the_next_window_boundary() {
    let mut engine = Engine::new(config(1_000, 100_000)).expect("engine");
    let a = TestHost::new(1);
    engine.add_host(a.clone());

    seed(
        &engine,
        5_000,
        a.id(),
        Hop {
            tag: 1,
            remaining: 0,
            next: a.id(),
            offset: 0,
        },
    );
    engine
        .push_event(Event::control(SimTime(0), Box::new(KillSwitch)))
        .expect("push control");
    engine.run().expect("run");

    assert!(engine.is_killed());
    assert!(a.delivered().is_empty());
    assert_eq!(engine.clock(), SimTime(1_000));
}

#[test]
fn invalid_configs_are_rejected_at_construction() {
    let mut bad = config(0, 10_000);
    let err = Engine::new(bad.clone()).expect_err("zero min_time_jump");
    assert!(matches!(err, SimError::ConfigInvalid(_)));
    assert_eq!(err.exit_code(), 1);

    bad = config(1_000, 0);
    assert!(Engine::new(bad).is_err());

    let mut no_topology = config(1_000, 10_000);
    no_topology.topology_path = "".into();
    assert!(Engine::new(no_topology).is_err());
}

#[test]
fn engine_context_push_rejects_events_in_the_past() {
    let mut engine = Engine::new(config(1_000, 2_000)).expect("engine");
    let a = TestHost::new(1);
    engine.add_host(a.clone());
    seed(
        &engine,
        100,
        a.id(),
        Hop {
            tag: 1,
            remaining: 0,
            next: a.id(),
            offset: 0,
        },
    );
    engine.run().expect("run");
    assert!(engine.clock() > SimTime::ZERO);

    let err = engine
        .push_event(Event::message(
            SimTime::ZERO,
            a.id(),
            Box::new(Hop {
                tag: 2,
                remaining: 0,
                next: a.id(),
                offset: 0,
            }),
        ))
        .expect_err("event in the past");
    assert!(matches!(err, SimError::LookaheadViolation { .. }));
}

#[test]
fn id_generators_are_monotonic_and_never_reused() {
    let engine = Engine::new(config(1_000, 10_000)).expect("engine");
    assert_eq!(engine.generate_node_id(), 0);
    assert_eq!(engine.generate_node_id(), 1);
    assert_eq!(engine.generate_node_id(), 2);

    let w0 = engine.generate_worker_id();
    let w1 = engine.generate_worker_id();
    assert_ne!(w0, w1);
}

#[test]
fn execution_barrier_starts_one_window_ahead() {
    let engine = Engine::new(config(1_000, 10_000)).expect("engine");
    assert_eq!(engine.clock(), SimTime::ZERO);
    assert_eq!(engine.execution_barrier(), SimTime(1_000));
    assert_eq!(engine.min_time_jump(), SimTime(1_000));
    assert_eq!(engine.end_time(), SimTime(10_000));
}

#[test]
fn registry_is_reachable_through_the_engine() {
    let engine = Engine::new(config(1_000, 10_000)).expect("engine");
    engine
        .registry()
        .put(StorageKind::Software, "shell", Arc::new(17u32));
    let item = engine
        .registry()
        .get(StorageKind::Software, "shell")
        .expect("stored item");
    assert_eq!(*item.downcast::<u32>().expect("u32 item"), 17);
}

#[test]
fn worker_pool_setup_and_teardown_are_scoped() {
    let mut engine = Engine::new(config(1_000, 10_000)).expect("engine");
    engine.setup_workers(2).expect("pool");
    let a = TestHost::new(1);
    let b = TestHost::new(2);
    engine.add_host(a.clone());
    engine.add_host(b.clone());
    seed(
        &engine,
        100,
        a.id(),
        Hop {
            tag: 1,
            remaining: 2,
            next: b.id(),
            offset: 1_000,
        },
    );
    engine.run().expect("run");
    engine.teardown_workers();

    assert_eq!(a.delivered(), vec![(SimTime(100), 1), (SimTime(2_100), 1)]);
    assert_eq!(b.delivered(), vec![(SimTime(1_100), 1)]);
}
