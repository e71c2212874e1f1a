//! # Agregador de pedidos
//!
//! Resuelve las líneas pedidas contra el catálogo del restaurante de la
//! reserva, congela el precio de cada plato en una nueva línea y guarda el
//! total recalculado sobre **todas** las líneas de la reserva. Las líneas que
//! no casan con el catálogo no abortan el lote: se devuelven como
//! [`LineOutcome::Unmatched`].

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use super::ledger::{ensure_owner, ReservationLedger};
use super::{Context, EngineError, EngineEvent, EngineResult};
use crate::db::models::{current_timestamp, Dish, LineItem, Reservation};

/// Línea solicitada por el cliente
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestedLine {
    pub dish_id: Uuid,
    pub quantity: u32,
    #[serde(default)]
    pub option: String,
    #[serde(default)]
    pub comment: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// El plato no existe en el catálogo de ese restaurante
    UnknownDish,
    /// Cantidad cero
    InvalidQuantity,
}

/// Resultado de cada línea del lote, en el mismo orden de la petición
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum LineOutcome {
    Matched {
        line_item_id: Uuid,
        dish_id: Uuid,
        quantity: u32,
        unit_price: i64,
    },
    Unmatched {
        dish_id: Uuid,
        reason: SkipReason,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderOutcome {
    /// Todas las líneas de la reserva tras el lote
    pub line_items: Vec<LineItem>,
    pub total_price: i64,
    pub lines: Vec<LineOutcome>,
}

impl OrderOutcome {
    pub fn skipped(&self) -> usize {
        self.lines
            .iter()
            .filter(|line| matches!(line, LineOutcome::Unmatched { .. }))
            .count()
    }
}

/// Suma `unit_price * quantity` de todas las líneas, con aritmética comprobada
pub fn sum_line_items(items: &[LineItem]) -> EngineResult<i64> {
    items.iter().try_fold(0i64, |total, item| {
        item.subtotal()
            .and_then(|subtotal| total.checked_add(subtotal))
            .ok_or_else(|| EngineError::Validation("El precio total desborda".to_string()))
    })
}

/// Convierte las líneas pedidas en nuevas líneas de la reserva
///
/// `dishes` debe contener solo platos del restaurante de la reserva.
pub fn plan_lines(
    reservation: &Reservation,
    requested: &[RequestedLine],
    dishes: &HashMap<Uuid, Dish>,
) -> (Vec<LineItem>, Vec<LineOutcome>) {
    let now = current_timestamp();
    let mut items = Vec::new();
    let mut outcomes = Vec::with_capacity(requested.len());

    for line in requested {
        if line.quantity == 0 {
            outcomes.push(LineOutcome::Unmatched {
                dish_id: line.dish_id,
                reason: SkipReason::InvalidQuantity,
            });
            continue;
        }

        let Some(dish) = dishes.get(&line.dish_id) else {
            outcomes.push(LineOutcome::Unmatched {
                dish_id: line.dish_id,
                reason: SkipReason::UnknownDish,
            });
            continue;
        };

        let item = LineItem {
            id: Uuid::new_v4(),
            reservation_id: reservation.id,
            dish_id: dish.id,
            quantity: line.quantity,
            unit_price: dish.price,
            option: line.option.clone(),
            comment: line.comment.clone(),
            created_at: now,
        };
        outcomes.push(LineOutcome::Matched {
            line_item_id: item.id,
            dish_id: dish.id,
            quantity: item.quantity,
            unit_price: item.unit_price,
        });
        items.push(item);
    }

    (items, outcomes)
}

#[derive(Clone)]
pub struct OrderAggregator {
    ledger: ReservationLedger,
    ctx: Context,
}

impl OrderAggregator {
    pub(crate) fn new(ledger: ReservationLedger, ctx: Context) -> Self {
        Self { ledger, ctx }
    }

    /// Añade platos a la reserva de `user_id`
    ///
    /// Un fallo del catálogo (timeout, caída) sí aborta el lote; un plato
    /// inexistente solo descarta su línea.
    pub async fn add_items(
        &self,
        user_id: Uuid,
        reservation_id: Uuid,
        requested: &[RequestedLine],
    ) -> EngineResult<OrderOutcome> {
        let reservation = self.ledger.get_reservation(reservation_id).await?;
        ensure_owner(&reservation, user_id)?;

        let mut dishes = HashMap::new();
        for line in requested {
            if dishes.contains_key(&line.dish_id) {
                continue;
            }
            let dish = self
                .ctx
                .bounded(
                    "get_catalog_dish",
                    self.ctx
                        .catalog
                        .catalog_dish(reservation.restaurant_id, line.dish_id),
                )
                .await?;
            if let Some(dish) = dish {
                dishes.insert(line.dish_id, dish);
            }
        }

        let (items, lines) = plan_lines(&reservation, requested, &dishes);
        for line in &lines {
            if let LineOutcome::Unmatched { dish_id, reason } = line {
                self.ctx.emit(EngineEvent::LineSkipped {
                    reservation_id,
                    dish_id: *dish_id,
                    reason: *reason,
                });
            }
        }

        let updated = if items.is_empty() {
            reservation
        } else {
            // el dueño se vuelve a comprobar dentro de la unidad atómica
            self.ledger
                .apply_line_items(reservation_id, user_id, &items, &sum_line_items)
                .await?
        };

        let outcome = OrderOutcome {
            line_items: updated.line_items,
            total_price: updated.total_price,
            lines,
        };
        self.ctx.emit(EngineEvent::ItemsAdded {
            reservation_id,
            added: items.len(),
            skipped: outcome.skipped(),
            total_price: outcome.total_price,
        });
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::Interval;
    use chrono::NaiveDate;

    fn reservation() -> Reservation {
        let day = NaiveDate::from_ymd_opt(2024, 12, 16).unwrap();
        let interval = Interval::new(
            day.and_hms_opt(18, 0, 0).unwrap(),
            day.and_hms_opt(20, 0, 0).unwrap(),
        )
        .unwrap();
        Reservation::pending(Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4(), interval)
    }

    fn soup(restaurant_id: Uuid, price: i64) -> Dish {
        Dish {
            id: Uuid::new_v4(),
            restaurant_id,
            name: "Soup".to_string(),
            price,
        }
    }

    fn line(dish_id: Uuid, quantity: u32) -> RequestedLine {
        RequestedLine {
            dish_id,
            quantity,
            option: String::new(),
            comment: String::new(),
        }
    }

    #[test]
    fn unmatched_lines_are_reported_not_dropped() {
        let reservation = reservation();
        let dish = soup(reservation.restaurant_id, 50);
        let stale = Uuid::new_v4();
        let dishes = HashMap::from([(dish.id, dish.clone())]);

        let (items, outcomes) = plan_lines(
            &reservation,
            &[line(dish.id, 2), line(stale, 1), line(dish.id, 0)],
            &dishes,
        );

        assert_eq!(items.len(), 1);
        assert_eq!(items[0].unit_price, 50);
        assert_eq!(items[0].reservation_id, reservation.id);
        assert!(matches!(outcomes[0], LineOutcome::Matched { quantity: 2, .. }));
        assert_eq!(
            outcomes[1],
            LineOutcome::Unmatched { dish_id: stale, reason: SkipReason::UnknownDish }
        );
        assert_eq!(
            outcomes[2],
            LineOutcome::Unmatched { dish_id: dish.id, reason: SkipReason::InvalidQuantity }
        );
    }

    #[test]
    fn total_is_sum_of_every_line() {
        let reservation = reservation();
        let dish = soup(reservation.restaurant_id, 50);
        let dishes = HashMap::from([(dish.id, dish.clone())]);
        let (mut items, _) = plan_lines(&reservation, &[line(dish.id, 2)], &dishes);
        let (more, _) = plan_lines(&reservation, &[line(dish.id, 1)], &dishes);
        items.extend(more);

        assert_eq!(sum_line_items(&items).unwrap(), 150);
        assert_eq!(sum_line_items(&[]).unwrap(), 0);
    }

    #[test]
    fn overflowing_total_is_an_error() {
        let reservation = reservation();
        let dish = soup(reservation.restaurant_id, i64::MAX);
        let dishes = HashMap::from([(dish.id, dish.clone())]);
        let (items, _) = plan_lines(&reservation, &[line(dish.id, 2)], &dishes);

        assert!(matches!(sum_line_items(&items), Err(EngineError::Validation(_))));
    }
}
