mod common;

use std::time::Duration;
use tokio_test::{assert_err, assert_ok};
use uuid::Uuid;

use common::{slot, Fixture};
use dining_reservation::db::models::{CommittedStatuses, ReservationStatus, Table};
use dining_reservation::engine::{EngineError, EngineEvent, EngineSettings, LedgerStore};

#[tokio::test]
async fn monday_scenario_against_accepted_reservation() {
    let fx = Fixture::new().await;
    fx.book_accepted(Uuid::new_v4(), slot((18, 0), (20, 0))).await;
    let ledger = &fx.engine.ledger;

    let overlapping = ledger
        .create_reservation(Uuid::new_v4(), fx.table_id, fx.restaurant_id, slot((19, 0), (20, 30)))
        .await;
    assert!(matches!(overlapping, Err(EngineError::TableConflict { .. })));

    let back_to_back = ledger
        .create_reservation(Uuid::new_v4(), fx.table_id, fx.restaurant_id, slot((20, 0), (21, 0)))
        .await;
    assert_ok!(back_to_back);

    let too_early = ledger
        .create_reservation(Uuid::new_v4(), fx.table_id, fx.restaurant_id, slot((8, 0), (9, 30)))
        .await;
    assert!(matches!(too_early, Err(EngineError::OutsideOperatingHours { weekday: 1, .. })));
}

#[tokio::test]
async fn new_reservation_is_pending_and_empty() {
    let fx = Fixture::new().await;
    let user = Uuid::new_v4();
    let reservation = fx.book(user, slot((12, 0), (13, 0))).await;

    assert_eq!(reservation.status, ReservationStatus::Pending);
    assert_eq!(reservation.total_price, 0);
    assert!(reservation.line_items.is_empty());
    assert!(reservation.review_id.is_none());

    let stored = assert_ok!(fx.engine.ledger.get_reservation(reservation.id).await);
    assert_eq!(stored, reservation);
    assert!(fx.sink.events().contains(&EngineEvent::ReservationCreated {
        reservation_id: reservation.id,
        table_id: fx.table_id,
        user_id: user,
    }));
}

#[tokio::test]
async fn outside_hours_rejected_even_on_empty_table() {
    let fx = Fixture::new().await;
    let late = fx
        .engine
        .ledger
        .create_reservation(Uuid::new_v4(), fx.table_id, fx.restaurant_id, slot((20, 0), (22, 0)))
        .await;
    assert!(matches!(late, Err(EngineError::OutsideOperatingHours { .. })));

    fx.close_monday().await;
    let closed = fx
        .engine
        .ledger
        .create_reservation(Uuid::new_v4(), fx.table_id, fx.restaurant_id, slot((12, 0), (13, 0)))
        .await;
    assert!(matches!(closed, Err(EngineError::OutsideOperatingHours { .. })));

    let rejections = fx
        .sink
        .events()
        .into_iter()
        .filter(|e| matches!(e, EngineEvent::ReservationRejected { .. }))
        .count();
    assert_eq!(rejections, 2);
}

#[tokio::test]
async fn cancelled_denied_and_pending_do_not_hold_the_table() {
    let fx = Fixture::new().await;
    let ledger = &fx.engine.ledger;

    let cancelled = fx.book_accepted(Uuid::new_v4(), slot((18, 0), (20, 0))).await;
    assert_ok!(ledger.transition(cancelled.id, ReservationStatus::Cancelled).await);

    let denied = fx.book(Uuid::new_v4(), slot((18, 0), (20, 0))).await;
    assert_ok!(ledger.transition(denied.id, ReservationStatus::Denied).await);

    fx.book(Uuid::new_v4(), slot((18, 0), (20, 0))).await;

    assert_ok!(
        ledger
            .create_reservation(Uuid::new_v4(), fx.table_id, fx.restaurant_id, slot((18, 30), (19, 30)))
            .await
    );
}

#[tokio::test]
async fn pending_holds_the_table_when_configured() {
    let fx = Fixture::with_settings(EngineSettings {
        committed: CommittedStatuses::HOLDING,
        ..EngineSettings::default()
    })
    .await;
    fx.book(Uuid::new_v4(), slot((18, 0), (20, 0))).await;

    let second = fx
        .engine
        .ledger
        .create_reservation(Uuid::new_v4(), fx.table_id, fx.restaurant_id, slot((19, 0), (20, 0)))
        .await;
    assert!(matches!(second, Err(EngineError::TableConflict { .. })));
}

#[tokio::test]
async fn unknown_table_and_missing_schedule() {
    let fx = Fixture::new().await;
    let ledger = &fx.engine.ledger;

    let unknown = ledger
        .create_reservation(Uuid::new_v4(), Uuid::new_v4(), fx.restaurant_id, slot((12, 0), (13, 0)))
        .await;
    assert!(matches!(unknown, Err(EngineError::NotFound { entity: "table", .. })));

    let wrong_restaurant = ledger
        .create_reservation(Uuid::new_v4(), fx.table_id, Uuid::new_v4(), slot((12, 0), (13, 0)))
        .await;
    assert!(matches!(wrong_restaurant, Err(EngineError::Validation(_))));

    // mesa de un restaurante sin horarios
    let other_restaurant = Uuid::new_v4();
    let other_table = Uuid::new_v4();
    fx.store
        .put_table(Table {
            id: other_table,
            restaurant_id: other_restaurant,
            capacity: 2,
        })
        .await;
    let no_schedule = ledger
        .create_reservation(Uuid::new_v4(), other_table, other_restaurant, slot((12, 0), (13, 0)))
        .await;
    assert!(matches!(no_schedule, Err(EngineError::CatalogLookupFailed { .. })));
}

#[tokio::test]
async fn slow_store_surfaces_as_retryable_upstream_error() {
    let fx = Fixture::with_settings(EngineSettings {
        upstream_timeout: Duration::from_millis(20),
        ..EngineSettings::default()
    })
    .await;
    fx.store.set_latency(Duration::from_millis(200));

    let err = assert_err!(
        fx.engine
            .ledger
            .create_reservation(Uuid::new_v4(), fx.table_id, fx.restaurant_id, slot((12, 0), (13, 0)))
            .await
    );
    assert!(matches!(err, EngineError::UpstreamUnavailable { .. }));
    assert!(err.is_retryable());

    fx.store.set_latency(Duration::ZERO);
    assert!(assert_ok!(fx.store.reservations_for_table(fx.table_id).await).is_empty());
}

#[tokio::test]
async fn lookups_and_ownership() {
    let fx = Fixture::new().await;
    let ledger = &fx.engine.ledger;
    let alice = Uuid::new_v4();
    let bob = Uuid::new_v4();

    let first = fx.book(alice, slot((12, 0), (13, 0))).await;
    let second = fx.book(alice, slot((14, 0), (15, 0))).await;
    fx.book(bob, slot((16, 0), (17, 0))).await;

    let mut mine: Vec<Uuid> = assert_ok!(ledger.list_by_user(alice).await)
        .into_iter()
        .map(|r| r.id)
        .collect();
    mine.sort();
    let mut expected = vec![first.id, second.id];
    expected.sort();
    assert_eq!(mine, expected);

    let missing = ledger.get_reservation(Uuid::new_v4()).await;
    assert!(matches!(missing, Err(EngineError::NotFound { entity: "reservation", .. })));

    assert!(matches!(
        ledger.get_owned(bob, first.id).await,
        Err(EngineError::NotOwner { .. })
    ));
    assert!(matches!(
        ledger.cancel(bob, first.id).await,
        Err(EngineError::NotOwner { .. })
    ));

    let cancelled = assert_ok!(ledger.cancel(alice, first.id).await);
    assert_eq!(cancelled.status, ReservationStatus::Cancelled);
    // la cancelación es blanda
    assert_ok!(ledger.get_reservation(first.id).await);
}

#[tokio::test]
async fn status_transitions_follow_the_workflow() {
    let fx = Fixture::new().await;
    let ledger = &fx.engine.ledger;
    let reservation = fx.book_completed(Uuid::new_v4(), slot((12, 0), (13, 0))).await;

    let err = assert_err!(ledger.transition(reservation.id, ReservationStatus::Accepted).await);
    assert_eq!(
        err,
        EngineError::InvalidStatusTransition {
            from: ReservationStatus::Completed,
            to: ReservationStatus::Accepted,
        }
    );

    let pending = fx.book(Uuid::new_v4(), slot((14, 0), (15, 0))).await;
    assert!(matches!(
        ledger.transition(pending.id, ReservationStatus::Completed).await,
        Err(EngineError::InvalidStatusTransition { .. })
    ));
}

#[tokio::test]
async fn accepting_rechecks_conflicts() {
    let fx = Fixture::new().await;
    let ledger = &fx.engine.ledger;
    let first = fx.book(Uuid::new_v4(), slot((18, 0), (20, 0))).await;
    let second = fx.book(Uuid::new_v4(), slot((19, 0), (21, 0))).await;

    assert_ok!(ledger.transition(first.id, ReservationStatus::Accepted).await);
    let err = assert_err!(ledger.transition(second.id, ReservationStatus::Accepted).await);
    assert!(matches!(err, EngineError::TableConflict { .. }));

    let still_pending = assert_ok!(ledger.get_reservation(second.id).await);
    assert_eq!(still_pending.status, ReservationStatus::Pending);
}

#[tokio::test]
async fn total_price_overwrite_is_idempotent() {
    let fx = Fixture::new().await;
    let ledger = &fx.engine.ledger;
    let reservation = fx.book(Uuid::new_v4(), slot((12, 0), (13, 0))).await;

    assert_ok!(ledger.update_total_price(reservation.id, 300).await);
    assert_ok!(ledger.update_total_price(reservation.id, 300).await);
    assert_eq!(assert_ok!(ledger.get_reservation(reservation.id).await).total_price, 300);

    assert!(matches!(
        ledger.update_total_price(reservation.id, -1).await,
        Err(EngineError::Validation(_))
    ));
    assert!(matches!(
        ledger.update_total_price(Uuid::new_v4(), 10).await,
        Err(EngineError::NotFound { .. })
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_overlapping_bookings_admit_exactly_one() {
    let fx = Fixture::with_settings(EngineSettings {
        committed: CommittedStatuses::HOLDING,
        ..EngineSettings::default()
    })
    .await;

    let mut handles = Vec::new();
    for i in 0..16u32 {
        let ledger = fx.engine.ledger.clone();
        let (table_id, restaurant_id) = (fx.table_id, fx.restaurant_id);
        // todos se solapan entre 19:00 y 19:30
        let interval = slot((18, i % 2 * 30), (19, 30 + i % 2 * 15));
        handles.push(tokio::spawn(async move {
            ledger
                .create_reservation(Uuid::new_v4(), table_id, restaurant_id, interval)
                .await
        }));
    }

    let mut admitted = 0;
    for handle in handles {
        match handle.await.expect("task panicked") {
            Ok(_) => admitted += 1,
            Err(EngineError::TableConflict { .. }) => {}
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
    assert_eq!(admitted, 1);
    assert_eq!(
        assert_ok!(fx.store.reservations_for_table(fx.table_id).await).len(),
        1
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_accepts_leave_no_overlap() {
    let fx = Fixture::new().await;
    let mut pending = Vec::new();
    for _ in 0..8 {
        pending.push(fx.book(Uuid::new_v4(), slot((18, 0), (20, 0))).await);
    }

    let mut handles = Vec::new();
    for reservation in pending {
        let ledger = fx.engine.ledger.clone();
        handles.push(tokio::spawn(async move {
            ledger.transition(reservation.id, ReservationStatus::Accepted).await
        }));
    }

    let mut accepted = 0;
    for handle in handles {
        if handle.await.expect("task panicked").is_ok() {
            accepted += 1;
        }
    }
    assert_eq!(accepted, 1);

    let on_table = assert_ok!(fx.store.reservations_for_table(fx.table_id).await);
    let committed = on_table
        .iter()
        .filter(|r| r.status == ReservationStatus::Accepted)
        .count();
    assert_eq!(committed, 1);
}

#[tokio::test]
async fn only_the_reservation_restaurant_decides() {
    let fx = Fixture::new().await;
    let ledger = &fx.engine.ledger;
    let reservation = fx.book(Uuid::new_v4(), slot((12, 0), (13, 0))).await;

    let err = assert_err!(
        ledger
            .decide(Uuid::new_v4(), reservation.id, ReservationStatus::Accepted)
            .await
    );
    assert!(matches!(err, EngineError::NotRestaurantReservation { .. }));
    assert_eq!(
        assert_ok!(ledger.get_reservation(reservation.id).await).status,
        ReservationStatus::Pending
    );

    let accepted = assert_ok!(
        ledger
            .decide(fx.restaurant_id, reservation.id, ReservationStatus::Accepted)
            .await
    );
    assert_eq!(accepted.status, ReservationStatus::Accepted);
}

#[tokio::test]
async fn timeout_after_commit_leaves_the_booking_in_place() {
    let fx = Fixture::with_settings(EngineSettings {
        upstream_timeout: Duration::from_millis(50),
        ..EngineSettings::default()
    })
    .await;
    fx.store.set_ack_latency(Duration::from_millis(500));
    let user = Uuid::new_v4();

    let err = assert_err!(
        fx.engine
            .ledger
            .create_reservation(user, fx.table_id, fx.restaurant_id, slot((12, 0), (13, 0)))
            .await
    );
    assert!(err.is_retryable());

    // el llamante reconcilia antes de reintentar
    fx.store.set_ack_latency(Duration::ZERO);
    let mine = assert_ok!(fx.engine.ledger.list_by_user(user).await);
    assert_eq!(mine.len(), 1);
    assert_eq!(mine[0].status, ReservationStatus::Pending);
}
