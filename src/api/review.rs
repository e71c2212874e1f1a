//! # API de Reseñas

use actix_web::{post, web, HttpRequest, HttpResponse, Responder};
use serde::Deserialize;

use super::identity::extract_user;
use super::reservation::parse_reservation_id;
use super::AppResult;
use crate::db::models::Ratings;
use crate::engine::Engine;

#[derive(Deserialize)]
struct ReviewRequest {
    content: String,
    food_rating: u8,
    service_rating: u8,
    ambience_rating: u8,
}

/// Crea la reseña de una reserva propia
///
/// # Respuesta
/// ```json
/// {
///   "message": "Reseña creada correctamente",
///   "id": "5d1f0e8a-3c9b-4f0e-9a8e-6b1d2c3e4f50"
/// }
/// ```
///
/// # Errores
/// - `400 Bad Request`: Valoraciones fuera de 1..=5
/// - `403 Forbidden`: La reserva es de otro usuario
/// - `404 Not Found`: Reserva no encontrada
/// - `409 Conflict`: La reserva ya tiene reseña
/// - `422 Unprocessable Entity`: La reserva aún no está completada
#[post("/reservations/{id}/review")]
async fn create_review(
    engine: web::Data<Engine>,
    path: web::Path<String>,
    data: web::Json<ReviewRequest>,
    req: HttpRequest,
) -> AppResult<impl Responder> {
    let user_id = extract_user(&req)?;
    let reservation_id = parse_reservation_id(&path.into_inner())?;
    let data = data.into_inner();

    let ratings = Ratings {
        food: data.food_rating,
        service: data.service_rating,
        ambience: data.ambience_rating,
    };
    let review_id = engine
        .reviews
        .create_review(user_id, reservation_id, data.content, ratings)
        .await?;

    Ok(HttpResponse::Created().json(serde_json::json!({
        "message": "Reseña creada correctamente",
        "id": review_id.to_string(),
    })))
}

pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.service(create_review);
}
