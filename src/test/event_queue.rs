use crate::sim::{Event, EventQueue, HostId, SimTime};

fn message(at: SimTime, emitter: u32, counter: u32, tag: u64) -> Event {
    let mut ev = Event::message(at, HostId(0), Box::new(tag));
    ev.stamp_seq(emitter, counter);
    ev
}

fn tag_of(ev: &Event) -> u64 {
    *ev.payload()
        .and_then(|p| p.downcast_ref::<u64>())
        .expect("u64 payload")
}

#[test]
fn pops_order_by_time_then_sequence() {
    let mut q = EventQueue::new();
    q.push(message(SimTime(10), 1, 0, 1));
    q.push(message(SimTime(5), 1, 1, 2));
    q.push(message(SimTime(10), 1, 2, 3));

    let mut order = Vec::new();
    while let Some(ev) = q.pop() {
        order.push(tag_of(&ev));
    }
    assert_eq!(order, vec![2, 1, 3]);
}

#[test]
fn equal_times_break_ties_by_emitter_then_counter() {
    let mut q = EventQueue::new();
    q.push(message(SimTime(10), 2, 0, 20));
    q.push(message(SimTime(10), 1, 1, 11));
    q.push(message(SimTime(10), 1, 0, 10));

    let mut order = Vec::new();
    while let Some(ev) = q.pop() {
        order.push(tag_of(&ev));
    }
    assert_eq!(order, vec![10, 11, 20]);
}

#[test]
fn identical_keys_pop_in_arrival_order() {
    // Same emitter, same per-window counter: events from consecutive
    // windows. Arrival order must decide, first in first out.
    let mut q = EventQueue::new();
    q.push(message(SimTime(10), 1, 0, 1));
    q.push(message(SimTime(10), 1, 0, 2));
    q.push(message(SimTime(10), 1, 0, 3));

    let mut order = Vec::new();
    while let Some(ev) = q.pop() {
        order.push(tag_of(&ev));
    }
    assert_eq!(order, vec![1, 2, 3]);
}

#[test]
fn pop_before_respects_the_half_open_window() {
    let mut q = EventQueue::new();
    q.push(message(SimTime(5), 1, 0, 1));
    q.push(message(SimTime(10), 1, 1, 2));

    let first = q.pop_before(SimTime(10)).expect("event before window end");
    assert_eq!(tag_of(&first), 1);
    // Delivery time equal to the window end belongs to the next window.
    assert!(q.pop_before(SimTime(10)).is_none());
    assert_eq!(q.peek_time(), Some(SimTime(10)));
    assert!(q.pop_before(SimTime(11)).is_some());
    assert!(q.is_empty());
}
