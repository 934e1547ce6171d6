use super::*;

use std::collections::{HashMap, HashSet};

const SCOPE: ScopeId = ScopeId(1);

fn participant(id: i64, label: &str) -> Participant {
    Participant::new(ParticipantId(id), label)
}

fn alice() -> Participant {
    participant(1, "Alice")
}

fn bob() -> Participant {
    participant(2, "Bob")
}

fn carol() -> Participant {
    participant(3, "Carol")
}

fn dave() -> Participant {
    participant(4, "Dave")
}

fn coordinator_with(
    config: CoordinatorConfig,
) -> (TurnCoordinator, broadcast::Receiver<ScopedNotification>) {
    let (events, rx) = broadcast::channel(1024);
    let timers = TimerService::current().expect("runtime");
    (TurnCoordinator::new(config, timers, events), rx)
}

fn coordinator() -> (TurnCoordinator, broadcast::Receiver<ScopedNotification>) {
    coordinator_with(CoordinatorConfig::default())
}

fn drain(rx: &mut broadcast::Receiver<ScopedNotification>) -> Vec<ScopedNotification> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

fn labels(listing: QueueListing) -> Vec<String> {
    match listing {
        QueueListing::Empty => Vec::new(),
        QueueListing::Entries(entries) => entries.into_iter().map(|p| p.label).collect(),
    }
}

fn holder(coordinator: &TurnCoordinator, scope: ScopeId) -> Option<Participant> {
    coordinator.current_turn(scope).map(|turn| turn.holder)
}

#[tokio::test(start_paused = true)]
async fn join_on_idle_scope_starts_turn_with_empty_next() {
    let (coordinator, _rx) = coordinator();

    let out = coordinator.join(SCOPE, alice());
    assert_eq!(out.len(), 2);
    assert_eq!(
        out[0],
        Notification::JoinedQueue {
            participant: alice(),
            position: 1
        }
    );
    match &out[1] {
        Notification::TurnStarted {
            holder,
            started_at,
            deadline,
            next_holder,
        } => {
            assert_eq!(*holder, alice());
            assert_eq!(*next_holder, None);
            assert_eq!(*deadline - *started_at, chrono::TimeDelta::minutes(10));
        }
        other => panic!("expected turn start, got {other:?}"),
    }
    assert_eq!(coordinator.list_queue(SCOPE), QueueListing::Empty);
    assert_eq!(holder(&coordinator, SCOPE), Some(alice()));
}

#[tokio::test(start_paused = true)]
async fn second_join_waits_behind_the_holder() {
    let (coordinator, _rx) = coordinator();
    coordinator.join(SCOPE, alice());

    let out = coordinator.join(SCOPE, bob());
    assert_eq!(
        out,
        vec![Notification::JoinedQueue {
            participant: bob(),
            position: 1
        }]
    );
    assert_eq!(labels(coordinator.list_queue(SCOPE)), vec!["Bob"]);
    assert_eq!(holder(&coordinator, SCOPE), Some(alice()));
}

#[tokio::test(start_paused = true)]
async fn holder_and_queued_participants_cannot_join_twice() {
    let (coordinator, _rx) = coordinator();
    coordinator.join(SCOPE, alice());
    coordinator.join(SCOPE, bob());

    assert_eq!(
        coordinator.join(SCOPE, alice()),
        vec![Notification::AlreadyQueued {
            participant: alice()
        }]
    );
    assert_eq!(
        coordinator.join(SCOPE, bob()),
        vec![Notification::AlreadyQueued {
            participant: bob()
        }]
    );
    assert_eq!(labels(coordinator.list_queue(SCOPE)), vec!["Bob"]);
    assert_eq!(holder(&coordinator, SCOPE), Some(alice()));
}

#[tokio::test(start_paused = true)]
async fn queue_preserves_join_order() {
    let (coordinator, _rx) = coordinator();
    for p in [alice(), bob(), carol(), dave()] {
        coordinator.join(SCOPE, p);
    }
    assert_eq!(
        labels(coordinator.list_queue(SCOPE)),
        vec!["Bob", "Carol", "Dave"]
    );
}

#[tokio::test(start_paused = true)]
async fn stop_by_non_holder_is_rejected_without_changes() {
    let (coordinator, _rx) = coordinator();
    coordinator.join(SCOPE, alice());
    coordinator.join(SCOPE, bob());
    let before = coordinator.current_turn(SCOPE);

    let out = coordinator.stop(SCOPE, bob().id);
    assert_eq!(
        out,
        vec![Notification::NotOwner {
            requester: bob().id,
            current_holder: alice()
        }]
    );
    assert_eq!(coordinator.current_turn(SCOPE), before);
    assert_eq!(labels(coordinator.list_queue(SCOPE)), vec!["Bob"]);
}

#[tokio::test(start_paused = true)]
async fn stop_without_turn_reports_no_active_turn() {
    let (coordinator, _rx) = coordinator();
    assert_eq!(
        coordinator.stop(SCOPE, alice().id),
        vec![Notification::NoActiveTurn]
    );
}

#[tokio::test(start_paused = true)]
async fn stop_by_holder_promotes_next_participant() {
    let (coordinator, _rx) = coordinator();
    coordinator.join(SCOPE, alice());
    coordinator.join(SCOPE, bob());

    let out = coordinator.stop(SCOPE, alice().id);
    assert_eq!(out.len(), 2);
    assert_eq!(
        out[0],
        Notification::TurnStopped {
            stopped_by: alice(),
            previous_holder: alice()
        }
    );
    assert!(matches!(
        &out[1],
        Notification::TurnStarted { holder, next_holder: None, .. } if *holder == bob()
    ));
    assert_eq!(coordinator.list_queue(SCOPE), QueueListing::Empty);
    assert_eq!(holder(&coordinator, SCOPE), Some(bob()));
}

#[tokio::test(start_paused = true)]
async fn stop_with_empty_queue_reports_it_and_goes_idle() {
    let (coordinator, _rx) = coordinator();
    coordinator.join(SCOPE, alice());

    let out = coordinator.stop(SCOPE, alice().id);
    assert_eq!(
        out,
        vec![
            Notification::TurnStopped {
                stopped_by: alice(),
                previous_holder: alice()
            },
            Notification::QueueEmptyOnAdvance,
        ]
    );
    assert_eq!(coordinator.current_turn(SCOPE), None);
}

#[tokio::test(start_paused = true)]
async fn elapsed_turn_expires_and_advances() {
    let (coordinator, mut rx) = coordinator();
    coordinator.join(SCOPE, alice());
    coordinator.join(SCOPE, bob());
    drain(&mut rx);

    tokio::time::sleep(DEFAULT_TURN_DURATION + Duration::from_secs(1)).await;

    let events: Vec<_> = drain(&mut rx)
        .into_iter()
        .map(|event| event.notification)
        .collect();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0], Notification::TurnExpired { holder: alice() });
    assert!(matches!(
        &events[1],
        Notification::TurnStarted { holder, .. } if *holder == bob()
    ));
    assert_eq!(holder(&coordinator, SCOPE), Some(bob()));
}

#[tokio::test(start_paused = true)]
async fn expiry_with_empty_queue_leaves_scope_idle() {
    let (coordinator, mut rx) = coordinator();
    coordinator.join(SCOPE, alice());
    drain(&mut rx);

    tokio::time::sleep(DEFAULT_TURN_DURATION * 3).await;

    let events: Vec<_> = drain(&mut rx)
        .into_iter()
        .map(|event| event.notification)
        .collect();
    assert_eq!(
        events,
        vec![
            Notification::TurnExpired { holder: alice() },
            Notification::QueueEmptyOnAdvance,
        ]
    );
    assert_eq!(coordinator.current_turn(SCOPE), None);
}

#[tokio::test(start_paused = true)]
async fn stopped_turn_is_never_reported_as_expired() {
    let (coordinator, mut rx) = coordinator();
    coordinator.join(SCOPE, alice());
    coordinator.stop(SCOPE, alice().id);
    drain(&mut rx);

    tokio::time::sleep(DEFAULT_TURN_DURATION * 2).await;
    assert!(drain(&mut rx).is_empty());
}

#[tokio::test(start_paused = true)]
async fn late_expiry_for_a_stopped_turn_is_silent() {
    let (coordinator, mut rx) = coordinator();
    coordinator.join(SCOPE, alice());
    coordinator.join(SCOPE, bob());
    let first = coordinator.current_turn(SCOPE).expect("turn");
    coordinator.stop(SCOPE, alice().id);
    drain(&mut rx);

    // The timer won the wake-up but lost the scope lock to the stop.
    coordinator.handle_expiry(SCOPE, first.turn_id);

    assert!(drain(&mut rx).is_empty());
    assert_eq!(holder(&coordinator, SCOPE), Some(bob()));
}

#[tokio::test(start_paused = true)]
async fn stop_arriving_after_expiry_sees_new_state() {
    let (coordinator, _rx) = coordinator();
    coordinator.join(SCOPE, alice());
    let turn = coordinator.current_turn(SCOPE).expect("turn");

    coordinator.handle_expiry(SCOPE, turn.turn_id);
    assert_eq!(
        coordinator.stop(SCOPE, alice().id),
        vec![Notification::NoActiveTurn]
    );

    coordinator.join(SCOPE, alice());
    coordinator.join(SCOPE, bob());
    let turn = coordinator.current_turn(SCOPE).expect("turn");
    coordinator.handle_expiry(SCOPE, turn.turn_id);
    assert_eq!(
        coordinator.stop(SCOPE, alice().id),
        vec![Notification::NotOwner {
            requester: alice().id,
            current_holder: bob()
        }]
    );
}

#[tokio::test(start_paused = true)]
async fn former_holder_can_join_again() {
    let (coordinator, _rx) = coordinator();
    coordinator.join(SCOPE, alice());
    coordinator.join(SCOPE, bob());
    coordinator.stop(SCOPE, alice().id);

    let out = coordinator.join(SCOPE, alice());
    assert_eq!(
        out,
        vec![Notification::JoinedQueue {
            participant: alice(),
            position: 1
        }]
    );
    assert_eq!(labels(coordinator.list_queue(SCOPE)), vec!["Alice"]);
}

#[tokio::test(start_paused = true)]
async fn remove_at_drops_the_entry_and_rejects_bad_positions() {
    let (coordinator, _rx) = coordinator();
    for p in [alice(), bob(), carol(), dave()] {
        coordinator.join(SCOPE, p);
    }

    assert_eq!(
        coordinator.remove_at(SCOPE, 2),
        vec![Notification::RemovedFromQueue { removed: carol() }]
    );
    assert_eq!(labels(coordinator.list_queue(SCOPE)), vec!["Bob", "Dave"]);

    assert_eq!(
        coordinator.remove_at(SCOPE, 5),
        vec![Notification::InvalidPosition {
            requested_position: 5,
            queue_length: 2
        }]
    );
    assert_eq!(holder(&coordinator, SCOPE), Some(alice()));
}

#[tokio::test(start_paused = true)]
async fn remove_at_can_be_disabled() {
    let (coordinator, _rx) = coordinator_with(CoordinatorConfig {
        remove_enabled: false,
        ..CoordinatorConfig::default()
    });
    coordinator.join(SCOPE, alice());
    coordinator.join(SCOPE, bob());

    assert_eq!(
        coordinator.remove_at(SCOPE, 1),
        vec![Notification::RemoveDisabled]
    );
    assert_eq!(labels(coordinator.list_queue(SCOPE)), vec!["Bob"]);
}

#[tokio::test(start_paused = true)]
async fn scopes_are_independent() {
    let (coordinator, _rx) = coordinator();
    coordinator.join(ScopeId(1), alice());
    coordinator.join(ScopeId(2), alice());
    coordinator.join(ScopeId(2), bob());

    assert_eq!(holder(&coordinator, ScopeId(1)), Some(alice()));
    assert_eq!(holder(&coordinator, ScopeId(2)), Some(alice()));
    assert_eq!(coordinator.list_queue(ScopeId(1)), QueueListing::Empty);
    assert_eq!(labels(coordinator.list_queue(ScopeId(2))), vec!["Bob"]);

    coordinator.stop(ScopeId(2), alice().id);
    assert_eq!(holder(&coordinator, ScopeId(1)), Some(alice()));
    assert_eq!(holder(&coordinator, ScopeId(2)), Some(bob()));
    assert_eq!(coordinator.list_queue(ScopeId(7)), QueueListing::Empty);
    assert_eq!(coordinator.current_turn(ScopeId(7)), None);
}

#[tokio::test(start_paused = true)]
async fn rejected_commands_on_unknown_scopes_allocate_nothing() {
    let (coordinator, _rx) = coordinator();
    for n in 0..1_000 {
        assert_eq!(
            coordinator.stop(ScopeId(n), alice().id),
            vec![Notification::NoActiveTurn]
        );
        assert_eq!(
            coordinator.remove_at(ScopeId(n), 3),
            vec![Notification::InvalidPosition {
                requested_position: 3,
                queue_length: 0
            }]
        );
    }
    assert_eq!(coordinator.inner.scopes.len(), 0);
}

#[tokio::test(start_paused = true)]
async fn vacant_scopes_are_released() {
    let (coordinator, mut rx) = coordinator();
    for n in 0..100 {
        coordinator.join(ScopeId(n), alice());
        coordinator.stop(ScopeId(n), alice().id);
    }
    assert_eq!(coordinator.inner.scopes.len(), 0);

    coordinator.join(SCOPE, alice());
    coordinator.join(SCOPE, bob());
    coordinator.remove_at(SCOPE, 1);
    assert_eq!(coordinator.inner.scopes.len(), 1, "alice still holds the turn");

    drain(&mut rx);
    tokio::time::sleep(DEFAULT_TURN_DURATION + Duration::from_secs(1)).await;
    let events: Vec<_> = drain(&mut rx)
        .into_iter()
        .map(|event| event.notification)
        .collect();
    assert_eq!(
        events,
        vec![
            Notification::TurnExpired { holder: alice() },
            Notification::QueueEmptyOnAdvance,
        ]
    );
    assert_eq!(coordinator.inner.scopes.len(), 0);

    // A released scope starts over cleanly.
    let out = coordinator.join(SCOPE, bob());
    assert!(matches!(
        &out[1],
        Notification::TurnStarted { holder, .. } if *holder == bob()
    ));
}

#[tokio::test(start_paused = true)]
async fn published_events_match_returned_notifications() {
    let (coordinator, mut rx) = coordinator();
    let mut returned = coordinator.join(SCOPE, alice());
    returned.extend(coordinator.join(SCOPE, alice()));
    returned.extend(coordinator.stop(SCOPE, bob().id));

    let published = drain(&mut rx);
    assert!(published.iter().all(|event| event.scope_id == SCOPE));
    let published: Vec<_> = published.into_iter().map(|e| e.notification).collect();
    assert_eq!(published, returned);
}

#[tokio::test(start_paused = true)]
async fn holder_is_never_also_queued() {
    let (coordinator, _rx) = coordinator();
    let everyone = [alice(), bob(), carol(), dave()];
    for round in 0..3 {
        for p in &everyone {
            coordinator.join(SCOPE, p.clone());
        }
        if round % 2 == 0 {
            if let Some(current) = holder(&coordinator, SCOPE) {
                coordinator.stop(SCOPE, current.id);
            }
        } else {
            coordinator.remove_at(SCOPE, 1);
        }

        let queued = labels(coordinator.list_queue(SCOPE));
        let unique: HashSet<_> = queued.iter().collect();
        assert_eq!(unique.len(), queued.len());
        if let Some(current) = holder(&coordinator, SCOPE) {
            assert!(!queued.contains(&current.label));
        }
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_stop_and_expiry_end_each_turn_exactly_once() {
    let (coordinator, mut rx) = coordinator_with(CoordinatorConfig {
        turn_duration: Duration::from_millis(5),
        ..CoordinatorConfig::default()
    });

    let scopes: Vec<_> = (1..=64).map(ScopeId).collect();
    for scope in &scopes {
        coordinator.join(*scope, alice());
    }

    let mut stops = Vec::new();
    for (i, scope) in scopes.iter().copied().enumerate() {
        let coordinator = coordinator.clone();
        stops.push(tokio::spawn(async move {
            tokio::time::sleep(Duration::from_micros(4_000 + (i as u64 % 8) * 250)).await;
            coordinator.stop(scope, ParticipantId(1))
        }));
    }
    for stop in stops {
        stop.await.expect("stop task");
    }
    tokio::time::sleep(Duration::from_millis(50)).await;

    let mut endings: HashMap<ScopeId, usize> = HashMap::new();
    let mut empties: HashMap<ScopeId, usize> = HashMap::new();
    for event in drain(&mut rx) {
        match event.notification {
            Notification::TurnStopped { .. } | Notification::TurnExpired { .. } => {
                *endings.entry(event.scope_id).or_default() += 1;
            }
            Notification::QueueEmptyOnAdvance => {
                *empties.entry(event.scope_id).or_default() += 1;
            }
            _ => {}
        }
    }

    for scope in &scopes {
        assert_eq!(endings.get(scope), Some(&1), "scope {scope}");
        assert_eq!(empties.get(scope), Some(&1), "scope {scope}");
        assert_eq!(coordinator.current_turn(*scope), None);
    }
}
