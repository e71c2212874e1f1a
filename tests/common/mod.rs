#![allow(dead_code)]

use chrono::{NaiveDate, NaiveDateTime};
use std::sync::Arc;
use uuid::Uuid;

use dining_reservation::db::models::{Dish, Interval, Reservation, ReservationStatus, Table, TimeSlot};
use dining_reservation::db::MemoryStore;
use dining_reservation::engine::{Engine, EngineSettings, RecordingSink, RequestedLine};

/// Restaurante abierto de 9 a 21 todos los días, con una mesa y una sopa a 50
pub struct Fixture {
    pub engine: Engine,
    pub store: MemoryStore,
    pub sink: Arc<RecordingSink>,
    pub restaurant_id: Uuid,
    pub table_id: Uuid,
    pub soup: Dish,
}

impl Fixture {
    pub async fn new() -> Self {
        Self::with_settings(EngineSettings::default()).await
    }

    pub async fn with_settings(settings: EngineSettings) -> Self {
        let store = MemoryStore::new();
        let sink = Arc::new(RecordingSink::new());
        let restaurant_id = Uuid::new_v4();
        let table_id = Uuid::new_v4();

        store.open_every_day(restaurant_id, 9, 21).await;
        store
            .put_table(Table {
                id: table_id,
                restaurant_id,
                capacity: 4,
            })
            .await;
        let soup = Dish {
            id: Uuid::new_v4(),
            restaurant_id,
            name: "Soup".to_string(),
            price: 50,
        };
        store.put_dish(soup.clone()).await;

        let engine = Engine::new(
            Arc::new(store.clone()),
            Arc::new(store.clone()),
            sink.clone(),
            settings,
        );

        Fixture {
            engine,
            store,
            sink,
            restaurant_id,
            table_id,
            soup,
        }
    }

    pub async fn book(&self, user_id: Uuid, interval: Interval) -> Reservation {
        self.engine
            .ledger
            .create_reservation(user_id, self.table_id, self.restaurant_id, interval)
            .await
            .expect("reservation should be admitted")
    }

    /// Reserva ya aceptada por el restaurante
    pub async fn book_accepted(&self, user_id: Uuid, interval: Interval) -> Reservation {
        let reservation = self.book(user_id, interval).await;
        self.engine
            .ledger
            .transition(reservation.id, ReservationStatus::Accepted)
            .await
            .expect("reservation should be accepted")
    }

    pub async fn book_completed(&self, user_id: Uuid, interval: Interval) -> Reservation {
        let reservation = self.book_accepted(user_id, interval).await;
        self.engine
            .ledger
            .transition(reservation.id, ReservationStatus::Completed)
            .await
            .expect("reservation should be completed")
    }

    pub async fn close_monday(&self) {
        self.store
            .put_time_slot(TimeSlot {
                restaurant_id: self.restaurant_id,
                weekday: 1,
                hour_start: 9,
                hour_end: 21,
                closed: true,
            })
            .await;
    }
}

/// 2024-12-16 es lunes
pub fn monday(hour: u32, minute: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 12, 16)
        .unwrap()
        .and_hms_opt(hour, minute, 0)
        .unwrap()
}

pub fn slot(from: (u32, u32), to: (u32, u32)) -> Interval {
    Interval::new(monday(from.0, from.1), monday(to.0, to.1)).unwrap()
}

pub fn line(dish_id: Uuid, quantity: u32) -> RequestedLine {
    RequestedLine {
        dish_id,
        quantity,
        option: String::new(),
        comment: String::new(),
    }
}
