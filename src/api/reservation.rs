//! # API de Reservas
//!
//! Este módulo expone el motor de reservas por HTTP:
//! - Crear nuevas reservas
//! - Listar y consultar las reservas del usuario
//! - Añadir platos a una reserva
//! - Cancelar reservas y aplicar pasos del flujo de aprobación
//!
//! Todas las operaciones requieren la cabecera `X-User-Id`, salvo los pasos
//! de aprobación, que el restaurante envía con `X-Restaurant-Id`.

use actix_web::{get, post, web, HttpRequest, HttpResponse, Responder};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::identity::{extract_restaurant, extract_user};
use super::{AppError, AppResult, ResultExt};
use crate::db::models::{Interval, LineItem, Reservation, ReservationStatus};
use crate::engine::{Engine, RequestedLine};

/// Estructura para crear una nueva reserva
#[derive(Deserialize)]
struct MakeReservation {
    restaurant_id: Uuid,
    table_id: Uuid,
    /// Inicio en hora local del restaurante (`YYYY-MM-DDTHH:MM:SS`)
    start: NaiveDateTime,
    /// Fin, excluido
    end: NaiveDateTime,
}

#[derive(Deserialize)]
struct AddDishes {
    dish_items: Vec<RequestedLine>,
}

#[derive(Deserialize)]
struct StatusChange {
    status: ReservationStatus,
}

/// Estructura de respuesta para una línea de pedido
#[derive(Serialize)]
struct LineItemResponse {
    id: String,
    dish_id: String,
    quantity: u32,
    unit_price: i64,
    option: String,
    comment: String,
}

/// Estructura de respuesta para una reserva
#[derive(Serialize)]
struct ReservationResponse {
    id: String,
    user_id: String,
    restaurant_id: String,
    table_id: String,
    start: NaiveDateTime,
    end: NaiveDateTime,
    /// "Pending", "Accepted", "Denied", "Completed", "Cancelled"
    status: ReservationStatus,
    total_price: i64,
    review_id: Option<String>,
    line_items: Vec<LineItemResponse>,
}

impl From<LineItem> for LineItemResponse {
    fn from(item: LineItem) -> Self {
        LineItemResponse {
            id: item.id.to_string(),
            dish_id: item.dish_id.to_string(),
            quantity: item.quantity,
            unit_price: item.unit_price,
            option: item.option,
            comment: item.comment,
        }
    }
}

/// Convierte una reserva del motor a la respuesta del API
impl From<Reservation> for ReservationResponse {
    fn from(reservation: Reservation) -> Self {
        ReservationResponse {
            id: reservation.id.to_string(),
            user_id: reservation.user_id.to_string(),
            restaurant_id: reservation.restaurant_id.to_string(),
            table_id: reservation.table_id.to_string(),
            start: reservation.interval.start(),
            end: reservation.interval.end(),
            status: reservation.status,
            total_price: reservation.total_price,
            review_id: reservation.review_id.map(|id| id.to_string()),
            line_items: reservation
                .line_items
                .into_iter()
                .map(LineItemResponse::from)
                .collect(),
        }
    }
}

pub(crate) fn parse_reservation_id(raw: &str) -> AppResult<Uuid> {
    Uuid::parse_str(raw).map_err_validation("id", "ID de reserva inválido")
}

/// Crea una nueva reserva
///
/// # Respuesta
/// ```json
/// {
///   "message": "Reserva creada correctamente",
///   "id": "0b6c7c3e-7a0e-4a51-9d55-3f0c1a3c2f10",
///   "status": "Pending"
/// }
/// ```
///
/// # Errores
/// - `400 Bad Request`: Intervalo vacío o invertido, mesa de otro restaurante
/// - `401 Unauthorized`: Falta `X-User-Id`
/// - `404 Not Found`: Mesa no encontrada
/// - `409 Conflict`: La mesa ya está reservada en ese horario
/// - `422 Unprocessable Entity`: Fuera del horario del restaurante
/// - `502 Bad Gateway`: Sin horario para ese día
/// - `503 Service Unavailable`: Catálogo o base de datos no disponibles
#[post("/reservations")]
async fn make_reservation(
    engine: web::Data<Engine>,
    data: web::Json<MakeReservation>,
    req: HttpRequest,
) -> AppResult<impl Responder> {
    let user_id = extract_user(&req)?;
    let interval = Interval::new(data.start, data.end)?;

    let reservation = engine
        .ledger
        .create_reservation(user_id, data.table_id, data.restaurant_id, interval)
        .await?;

    Ok(HttpResponse::Created().json(serde_json::json!({
        "message": "Reserva creada correctamente",
        "id": reservation.id.to_string(),
        "status": reservation.status,
    })))
}

/// Lista las reservas del usuario, más recientes primero
#[get("/reservations")]
async fn get_reservations(engine: web::Data<Engine>, req: HttpRequest) -> AppResult<impl Responder> {
    let user_id = extract_user(&req)?;

    let mut reservations = engine.ledger.list_by_user(user_id).await?;
    reservations.sort_by(|a, b| b.interval.start().cmp(&a.interval.start()));

    let results: Vec<ReservationResponse> = reservations
        .into_iter()
        .map(ReservationResponse::from)
        .collect();
    Ok(HttpResponse::Ok().json(results))
}

#[get("/reservations/{id}")]
async fn get_reservation(
    engine: web::Data<Engine>,
    path: web::Path<String>,
    req: HttpRequest,
) -> AppResult<impl Responder> {
    let user_id = extract_user(&req)?;
    let reservation_id = parse_reservation_id(&path.into_inner())?;

    let reservation = engine.ledger.get_owned(user_id, reservation_id).await?;
    Ok(HttpResponse::Ok().json(ReservationResponse::from(reservation)))
}

/// Añade platos a una reserva
///
/// Las líneas cuyo plato no existe en el catálogo no abortan el lote; se
/// devuelven con `"outcome": "unmatched"`.
///
/// # Respuesta
/// ```json
/// {
///   "line_items": [ ... ],
///   "total_price": 150,
///   "lines": [
///     { "outcome": "matched", "line_item_id": "...", "dish_id": "...", "quantity": 1, "unit_price": 50 },
///     { "outcome": "unmatched", "dish_id": "...", "reason": "unknown_dish" }
///   ]
/// }
/// ```
#[post("/reservations/{id}/dishes")]
async fn add_dishes(
    engine: web::Data<Engine>,
    path: web::Path<String>,
    data: web::Json<AddDishes>,
    req: HttpRequest,
) -> AppResult<impl Responder> {
    let user_id = extract_user(&req)?;
    let reservation_id = parse_reservation_id(&path.into_inner())?;

    let outcome = engine
        .orders
        .add_items(user_id, reservation_id, &data.dish_items)
        .await?;
    Ok(HttpResponse::Ok().json(outcome))
}

/// Cancela una reserva propia
///
/// La reserva no se borra: pasa a estado "Cancelled".
#[post("/reservations/{id}/cancel")]
async fn cancel_reservation(
    engine: web::Data<Engine>,
    path: web::Path<String>,
    req: HttpRequest,
) -> AppResult<impl Responder> {
    let user_id = extract_user(&req)?;
    let reservation_id = parse_reservation_id(&path.into_inner())?;

    let reservation = engine.ledger.cancel(user_id, reservation_id).await?;

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "message": "Reserva cancelada correctamente",
        "id": reservation.id.to_string(),
        "status": reservation.status,
    })))
}

/// Paso del flujo de aprobación (aceptar, denegar, completar, cancelar)
///
/// Con `X-Restaurant-Id` decide el restaurante de la reserva. Sin ella solo
/// se admite `Cancelled`, y únicamente por el dueño de la reserva.
///
/// # Errores
/// - `403 Forbidden`: Otro restaurante, otro usuario, o un cliente intentando aprobar
/// - `409 Conflict`: Aceptarla solaparía otra reserva comprometida de la mesa
/// - `422 Unprocessable Entity`: Transición no permitida desde el estado actual
#[post("/reservations/{id}/status")]
async fn change_status(
    engine: web::Data<Engine>,
    path: web::Path<String>,
    data: web::Json<StatusChange>,
    req: HttpRequest,
) -> AppResult<impl Responder> {
    let reservation_id = parse_reservation_id(&path.into_inner())?;

    let reservation = match extract_restaurant(&req)? {
        Some(restaurant_id) => {
            engine
                .ledger
                .decide(restaurant_id, reservation_id, data.status)
                .await?
        }
        None => {
            let user_id = extract_user(&req)?;
            if data.status != ReservationStatus::Cancelled {
                return Err(AppError::Forbidden(format!(
                    "Solo el restaurante puede pasar una reserva a {}",
                    data.status
                )));
            }
            engine.ledger.cancel(user_id, reservation_id).await?
        }
    };
    Ok(HttpResponse::Ok().json(ReservationResponse::from(reservation)))
}

/// Configura las rutas relacionadas con reservas
///
/// # Rutas disponibles
/// - `POST /reservations` - Crear nueva reserva
/// - `GET /reservations` - Listar reservas del usuario
/// - `GET /reservations/{id}` - Detalle de una reserva propia
/// - `POST /reservations/{id}/dishes` - Añadir platos
/// - `POST /reservations/{id}/cancel` - Cancelar reserva
/// - `POST /reservations/{id}/status` - Cambiar estado (restaurante, o cancelación del dueño)
pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.service(make_reservation);
    cfg.service(get_reservations);
    cfg.service(get_reservation);
    cfg.service(add_dishes);
    cfg.service(cancel_reservation);
    cfg.service(change_status);
}
