//! # Comprobación de disponibilidad
//!
//! Función pura: sin efectos secundarios ni acceso a almacenamiento. La
//! atomicidad frente a peticiones concurrentes la aporta quien la invoca
//! dentro de [`crate::engine::store::LedgerStore::insert_reservation`].

use uuid::Uuid;

use super::{EngineError, EngineResult};
use crate::db::models::{CommittedStatuses, Interval, Reservation, TimeSlot};

/// Resultado de evaluar una petición de reserva
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Admissible,
    OutsideOperatingHours { detail: String },
    TableConflict { conflicting_id: Uuid },
}

impl Decision {
    pub fn is_admissible(&self) -> bool {
        matches!(self, Decision::Admissible)
    }

    pub fn into_result(self, weekday: u8, table_id: Uuid) -> EngineResult<()> {
        match self {
            Decision::Admissible => Ok(()),
            Decision::OutsideOperatingHours { detail } => {
                Err(EngineError::OutsideOperatingHours { weekday, detail })
            }
            Decision::TableConflict { .. } => Err(EngineError::TableConflict {
                table_id: table_id.to_string(),
            }),
        }
    }
}

/// Regla 1: `start.hour >= apertura` y `end.hour <= cierre`, mismo día y día no cerrado
pub fn check_operating_hours(requested: &Interval, hours: &TimeSlot) -> Decision {
    let detail = if hours.closed {
        Some("el restaurante cierra ese día".to_string())
    } else if !requested.spans_single_day() {
        Some("la reserva no puede cruzar la medianoche".to_string())
    } else if requested.start_hour() < hours.hour_start {
        Some(format!(
            "empieza a las {}h, abre a las {}h",
            requested.start_hour(),
            hours.hour_start
        ))
    } else if requested.end_hour() > hours.hour_end {
        Some(format!(
            "termina a las {}h, cierra a las {}h",
            requested.end_hour(),
            hours.hour_end
        ))
    } else {
        None
    };

    match detail {
        Some(detail) => Decision::OutsideOperatingHours { detail },
        None => Decision::Admissible,
    }
}

/// Regla 2: ninguna reserva comprometida de la mesa se solapa con la pedida
pub fn check_table_conflict(
    requested: &Interval,
    existing: &[Reservation],
    committed: CommittedStatuses,
) -> Decision {
    existing
        .iter()
        .filter(|r| committed.contains(r.status))
        .find(|r| r.interval.overlaps(requested))
        .map(|r| Decision::TableConflict { conflicting_id: r.id })
        .unwrap_or(Decision::Admissible)
}

/// Aplica ambas reglas en orden; el horario se evalúa antes que el solapamiento
pub fn is_admissible(
    requested: &Interval,
    hours: &TimeSlot,
    existing: &[Reservation],
    committed: CommittedStatuses,
) -> Decision {
    match check_operating_hours(requested, hours) {
        Decision::Admissible => check_table_conflict(requested, existing, committed),
        rejected => rejected,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::ReservationStatus;
    use chrono::{NaiveDate, NaiveDateTime};

    // 2024-12-16 es lunes
    fn monday(hour: u32, minute: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 12, 16)
            .unwrap()
            .and_hms_opt(hour, minute, 0)
            .unwrap()
    }

    fn interval(from: (u32, u32), to: (u32, u32)) -> Interval {
        Interval::new(monday(from.0, from.1), monday(to.0, to.1)).unwrap()
    }

    fn monday_hours() -> TimeSlot {
        TimeSlot {
            restaurant_id: Uuid::nil(),
            weekday: 1,
            hour_start: 9,
            hour_end: 21,
            closed: false,
        }
    }

    fn held(status: ReservationStatus, from: (u32, u32), to: (u32, u32)) -> Reservation {
        let mut r = Reservation::pending(Uuid::new_v4(), Uuid::nil(), Uuid::nil(), interval(from, to));
        r.status = status;
        r
    }

    #[test]
    fn overlapping_accepted_reservation_conflicts() {
        let existing = vec![held(ReservationStatus::Accepted, (18, 0), (20, 0))];
        let decision = is_admissible(
            &interval((19, 0), (20, 30)),
            &monday_hours(),
            &existing,
            CommittedStatuses::CONFIRMED,
        );
        assert_eq!(
            decision,
            Decision::TableConflict { conflicting_id: existing[0].id }
        );
    }

    #[test]
    fn back_to_back_is_admissible() {
        let existing = vec![held(ReservationStatus::Accepted, (18, 0), (20, 0))];
        let decision = is_admissible(
            &interval((20, 0), (21, 0)),
            &monday_hours(),
            &existing,
            CommittedStatuses::CONFIRMED,
        );
        assert!(decision.is_admissible());
    }

    #[test]
    fn before_opening_is_rejected_without_conflicts() {
        let decision = is_admissible(
            &interval((8, 0), (9, 30)),
            &monday_hours(),
            &[],
            CommittedStatuses::CONFIRMED,
        );
        assert!(matches!(decision, Decision::OutsideOperatingHours { .. }));
    }

    #[test]
    fn after_closing_is_rejected() {
        let decision = check_operating_hours(&interval((20, 0), (22, 0)), &monday_hours());
        assert!(matches!(decision, Decision::OutsideOperatingHours { .. }));
    }

    #[test]
    fn closed_day_is_rejected() {
        let mut hours = monday_hours();
        hours.closed = true;
        let decision = check_operating_hours(&interval((12, 0), (13, 0)), &hours);
        assert!(matches!(decision, Decision::OutsideOperatingHours { .. }));
    }

    #[test]
    fn interval_crossing_midnight_is_rejected() {
        let next_day = NaiveDate::from_ymd_opt(2024, 12, 17)
            .unwrap()
            .and_hms_opt(1, 0, 0)
            .unwrap();
        let requested = Interval::new(monday(20, 0), next_day).unwrap();
        let decision = check_operating_hours(&requested, &monday_hours());
        assert!(matches!(decision, Decision::OutsideOperatingHours { .. }));
    }

    #[test]
    fn outside_hours_wins_over_conflict() {
        let existing = vec![held(ReservationStatus::Accepted, (8, 0), (10, 0))];
        let decision = is_admissible(
            &interval((8, 0), (9, 30)),
            &monday_hours(),
            &existing,
            CommittedStatuses::CONFIRMED,
        );
        assert!(matches!(decision, Decision::OutsideOperatingHours { .. }));
    }

    #[test]
    fn terminal_and_pending_reservations_do_not_hold_the_table() {
        let existing = vec![
            held(ReservationStatus::Cancelled, (18, 0), (20, 0)),
            held(ReservationStatus::Denied, (18, 0), (20, 0)),
            held(ReservationStatus::Completed, (18, 0), (20, 0)),
            held(ReservationStatus::Pending, (18, 0), (20, 0)),
        ];
        let decision = check_table_conflict(
            &interval((19, 0), (20, 0)),
            &existing,
            CommittedStatuses::CONFIRMED,
        );
        assert!(decision.is_admissible());
    }

    #[test]
    fn pending_holds_the_table_when_configured() {
        let existing = vec![held(ReservationStatus::Pending, (18, 0), (20, 0))];
        let decision = check_table_conflict(
            &interval((19, 0), (20, 0)),
            &existing,
            CommittedStatuses::HOLDING,
        );
        assert!(!decision.is_admissible());
    }

    #[test]
    fn decision_maps_to_engine_errors() {
        let table = Uuid::new_v4();
        let err = Decision::TableConflict { conflicting_id: Uuid::nil() }
            .into_result(1, table)
            .unwrap_err();
        assert_eq!(err, EngineError::TableConflict { table_id: table.to_string() });
        assert!(Decision::Admissible.into_result(1, table).is_ok());
    }
}
