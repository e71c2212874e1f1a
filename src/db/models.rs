//! # Modelos de dominio
//!
//! Tipos compartidos por el motor de reservas y por las implementaciones de
//! almacenamiento. Los documentos específicos de MongoDB viven en
//! [`crate::db::mongodb`] y se convierten desde/hacia estos tipos.

use chrono::{Datelike, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::engine::{EngineError, EngineResult};

/// Timestamp unix actual, usado en `created_at` / `updated_at`
pub fn current_timestamp() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Estado de una reserva
///
/// Conjunto cerrado: el flujo de aprobación externo solo puede moverse entre
/// estas variantes siguiendo [`ReservationStatus::can_transition_to`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReservationStatus {
    Pending,
    Accepted,
    Denied,
    Completed,
    Cancelled,
}

impl ReservationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::Accepted => "Accepted",
            Self::Denied => "Denied",
            Self::Completed => "Completed",
            Self::Cancelled => "Cancelled",
        }
    }

    /// Estados finales: ninguna transición sale de ellos
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Denied | Self::Completed | Self::Cancelled)
    }

    /// Transiciones permitidas:
    ///
    /// ```text
    /// Pending  ──► Accepted | Denied | Cancelled
    /// Accepted ──► Completed | Cancelled
    /// ```
    pub fn can_transition_to(&self, next: ReservationStatus) -> bool {
        use ReservationStatus::*;
        matches!(
            (self, next),
            (Pending, Accepted)
                | (Pending, Denied)
                | (Pending, Cancelled)
                | (Accepted, Completed)
                | (Accepted, Cancelled)
        )
    }
}

impl fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReservationStatus {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pending" => Ok(Self::Pending),
            "Accepted" => Ok(Self::Accepted),
            "Denied" => Ok(Self::Denied),
            "Completed" => Ok(Self::Completed),
            "Cancelled" => Ok(Self::Cancelled),
            other => Err(EngineError::Validation(format!("Estado desconocido: '{}'", other))),
        }
    }
}

/// Subconjunto de estados que ocupan la mesa a efectos de solapamiento
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommittedStatuses(&'static [ReservationStatus]);

impl CommittedStatuses {
    /// Solo reservas aceptadas ocupan la mesa
    pub const CONFIRMED: Self = Self(&[ReservationStatus::Accepted]);
    /// Las reservas pendientes también bloquean la mesa mientras se deciden
    pub const HOLDING: Self = Self(&[ReservationStatus::Pending, ReservationStatus::Accepted]);

    pub fn contains(&self, status: ReservationStatus) -> bool {
        self.0.contains(&status)
    }
}

impl Default for CommittedStatuses {
    fn default() -> Self {
        Self::CONFIRMED
    }
}

#[derive(Deserialize)]
struct RawInterval {
    start: NaiveDateTime,
    end: NaiveDateTime,
}

/// Intervalo semiabierto `[start, end)` en hora local del restaurante
///
/// Siempre cumple `start < end`; la deserialización pasa por [`Interval::new`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawInterval")]
pub struct Interval {
    start: NaiveDateTime,
    end: NaiveDateTime,
}

impl Interval {
    pub fn new(start: NaiveDateTime, end: NaiveDateTime) -> EngineResult<Self> {
        if start >= end {
            return Err(EngineError::InvalidInterval {
                start: start.to_string(),
                end: end.to_string(),
            });
        }
        Ok(Self { start, end })
    }

    pub fn start(&self) -> NaiveDateTime {
        self.start
    }

    pub fn end(&self) -> NaiveDateTime {
        self.end
    }

    /// Test estándar de solapamiento semiabierto; intervalos contiguos no se solapan
    pub fn overlaps(&self, other: &Interval) -> bool {
        self.start < other.end && self.end > other.start
    }

    /// Día de la semana del inicio, 0 = domingo ... 6 = sábado
    pub fn weekday(&self) -> u8 {
        self.start.weekday().num_days_from_sunday() as u8
    }

    pub fn start_hour(&self) -> u32 {
        self.start.hour()
    }

    pub fn end_hour(&self) -> u32 {
        self.end.hour()
    }

    pub fn spans_single_day(&self) -> bool {
        self.start.date() == self.end.date()
    }
}

impl TryFrom<RawInterval> for Interval {
    type Error = EngineError;

    fn try_from(raw: RawInterval) -> Result<Self, Self::Error> {
        Interval::new(raw.start, raw.end)
    }
}

/// Plato pedido dentro de una reserva, con el precio congelado al pedirlo
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    pub id: Uuid,
    pub reservation_id: Uuid,
    pub dish_id: Uuid,
    pub quantity: u32,
    /// Copia del precio del catálogo en el momento del pedido (céntimos)
    pub unit_price: i64,
    pub option: String,
    pub comment: String,
    pub created_at: i64,
}

impl LineItem {
    /// `unit_price * quantity`, `None` si desborda
    pub fn subtotal(&self) -> Option<i64> {
        self.unit_price.checked_mul(i64::from(self.quantity))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: Uuid,
    pub user_id: Uuid,
    pub restaurant_id: Uuid,
    pub table_id: Uuid,
    pub interval: Interval,
    pub status: ReservationStatus,
    /// Suma de `unit_price * quantity` de todas las líneas (céntimos)
    pub total_price: i64,
    pub review_id: Option<Uuid>,
    pub line_items: Vec<LineItem>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Reservation {
    /// Nueva reserva en estado `Pending`, sin platos y con total cero
    pub fn pending(user_id: Uuid, restaurant_id: Uuid, table_id: Uuid, interval: Interval) -> Self {
        let now = current_timestamp();
        Self {
            id: Uuid::new_v4(),
            user_id,
            restaurant_id,
            table_id,
            interval,
            status: ReservationStatus::Pending,
            total_price: 0,
            review_id: None,
            line_items: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_owned_by(&self, user_id: Uuid) -> bool {
        self.user_id == user_id
    }
}

/// Horario de un día de la semana (colaborador externo)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSlot {
    pub restaurant_id: Uuid,
    /// 0 = domingo ... 6 = sábado
    pub weekday: u8,
    pub hour_start: u32,
    pub hour_end: u32,
    pub closed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Table {
    pub id: Uuid,
    pub restaurant_id: Uuid,
    pub capacity: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dish {
    pub id: Uuid,
    pub restaurant_id: Uuid,
    pub name: String,
    /// Precio vigente en el catálogo (céntimos)
    pub price: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ratings {
    pub food: u8,
    pub service: u8,
    pub ambience: u8,
}

impl Ratings {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 5;

    pub fn validate(&self) -> EngineResult<()> {
        for (field, value) in [("food", self.food), ("service", self.service), ("ambience", self.ambience)] {
            if !(Self::MIN..=Self::MAX).contains(&value) {
                return Err(EngineError::Validation(format!(
                    "La valoración '{}' debe estar entre {} y {}",
                    field,
                    Self::MIN,
                    Self::MAX
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Review {
    pub id: Uuid,
    pub user_id: Uuid,
    pub restaurant_id: Uuid,
    pub reservation_id: Uuid,
    pub content: String,
    pub ratings: Ratings,
    pub created_at: i64,
}
