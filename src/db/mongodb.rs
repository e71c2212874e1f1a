use async_trait::async_trait;
use chrono::NaiveDateTime;
use mongodb::bson::{doc, Document};
use mongodb::error::{ErrorKind, WriteFailure, TRANSIENT_TRANSACTION_ERROR};
use mongodb::{Client, ClientSession, Collection, Database};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::models::{
    current_timestamp, Dish, Interval, LineItem, Ratings, Reservation, ReservationStatus, Review,
    Table, TimeSlot,
};
use crate::engine::store::{AdmissionCheck, TotalFold};
use crate::engine::{EngineError, EngineResult, LedgerStore, ScheduleCatalog};

const DATETIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";
const DUPLICATE_KEY: i32 = 11000;
/// Intentos de una transacción ante conflictos de escritura transitorios
const TRANSACTION_ATTEMPTS: usize = 3;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ReservationDocument {
    #[serde(rename = "_id")]
    pub id: String,
    pub user_id: String,
    pub restaurant_id: String,
    pub table_id: String,
    pub start: String, // hora local "YYYY-MM-DDTHH:MM:SS"
    pub end: String,
    pub status: String,
    pub total_price: i64,
    pub review_id: Option<String>,
    pub line_items: Vec<LineItemDocument>,
    pub created_at: i64, // timestamp unix
    pub updated_at: i64, // timestamp unix
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct LineItemDocument {
    pub id: String,
    pub dish_id: String,
    pub quantity: i64,
    pub unit_price: i64,
    pub option: String,
    pub comment: String,
    pub created_at: i64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ReviewDocument {
    #[serde(rename = "_id")]
    pub id: String,
    pub user_id: String,
    pub restaurant_id: String,
    pub reservation_id: String,
    pub content: String,
    pub food_rating: i32,
    pub service_rating: i32,
    pub ambience_rating: i32,
    pub created_at: i64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TimeSlotDocument {
    pub restaurant_id: String,
    pub weekday: i32,
    pub hour_start: i32,
    pub hour_end: i32,
    pub is_closed: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TableDocument {
    #[serde(rename = "_id")]
    pub id: String,
    pub restaurant_id: String,
    pub capacity: i32,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct DishDocument {
    #[serde(rename = "_id")]
    pub id: String,
    pub restaurant_id: String,
    pub name: String,
    pub price: i64,
}

fn parse_id(field: &str, value: &str) -> EngineResult<Uuid> {
    Uuid::parse_str(value)
        .map_err(|e| EngineError::upstream("decode_document", format!("{} inválido '{}': {}", field, value, e)))
}

fn parse_datetime(field: &str, value: &str) -> EngineResult<NaiveDateTime> {
    NaiveDateTime::parse_from_str(value, DATETIME_FORMAT)
        .map_err(|e| EngineError::upstream("decode_document", format!("{} inválido '{}': {}", field, value, e)))
}

fn narrow<T: TryFrom<i64>>(field: &str, value: i64) -> EngineResult<T> {
    T::try_from(value)
        .map_err(|_| EngineError::upstream("decode_document", format!("{} fuera de rango: {}", field, value)))
}

impl From<&LineItem> for LineItemDocument {
    fn from(item: &LineItem) -> Self {
        LineItemDocument {
            id: item.id.to_string(),
            dish_id: item.dish_id.to_string(),
            quantity: i64::from(item.quantity),
            unit_price: item.unit_price,
            option: item.option.clone(),
            comment: item.comment.clone(),
            created_at: item.created_at,
        }
    }
}

impl From<&Reservation> for ReservationDocument {
    fn from(reservation: &Reservation) -> Self {
        ReservationDocument {
            id: reservation.id.to_string(),
            user_id: reservation.user_id.to_string(),
            restaurant_id: reservation.restaurant_id.to_string(),
            table_id: reservation.table_id.to_string(),
            start: reservation.interval.start().format(DATETIME_FORMAT).to_string(),
            end: reservation.interval.end().format(DATETIME_FORMAT).to_string(),
            status: reservation.status.as_str().to_string(),
            total_price: reservation.total_price,
            review_id: reservation.review_id.map(|id| id.to_string()),
            line_items: reservation.line_items.iter().map(LineItemDocument::from).collect(),
            created_at: reservation.created_at,
            updated_at: reservation.updated_at,
        }
    }
}

impl TryFrom<ReservationDocument> for Reservation {
    type Error = EngineError;

    fn try_from(document: ReservationDocument) -> Result<Self, Self::Error> {
        let id = parse_id("_id", &document.id)?;
        let interval = Interval::new(
            parse_datetime("start", &document.start)?,
            parse_datetime("end", &document.end)?,
        )?;
        let line_items = document
            .line_items
            .into_iter()
            .map(|item| -> EngineResult<LineItem> {
                Ok(LineItem {
                    id: parse_id("line_items.id", &item.id)?,
                    reservation_id: id,
                    dish_id: parse_id("line_items.dish_id", &item.dish_id)?,
                    quantity: narrow("line_items.quantity", item.quantity)?,
                    unit_price: item.unit_price,
                    option: item.option,
                    comment: item.comment,
                    created_at: item.created_at,
                })
            })
            .collect::<EngineResult<Vec<_>>>()?;

        Ok(Reservation {
            id,
            user_id: parse_id("user_id", &document.user_id)?,
            restaurant_id: parse_id("restaurant_id", &document.restaurant_id)?,
            table_id: parse_id("table_id", &document.table_id)?,
            interval,
            status: document.status.parse()?,
            total_price: document.total_price,
            review_id: document
                .review_id
                .as_deref()
                .map(|id| parse_id("review_id", id))
                .transpose()?,
            line_items,
            created_at: document.created_at,
            updated_at: document.updated_at,
        })
    }
}

impl From<&Review> for ReviewDocument {
    fn from(review: &Review) -> Self {
        ReviewDocument {
            id: review.id.to_string(),
            user_id: review.user_id.to_string(),
            restaurant_id: review.restaurant_id.to_string(),
            reservation_id: review.reservation_id.to_string(),
            content: review.content.clone(),
            food_rating: i32::from(review.ratings.food),
            service_rating: i32::from(review.ratings.service),
            ambience_rating: i32::from(review.ratings.ambience),
            created_at: review.created_at,
        }
    }
}

impl TryFrom<ReviewDocument> for Review {
    type Error = EngineError;

    fn try_from(document: ReviewDocument) -> Result<Self, Self::Error> {
        Ok(Review {
            id: parse_id("_id", &document.id)?,
            user_id: parse_id("user_id", &document.user_id)?,
            restaurant_id: parse_id("restaurant_id", &document.restaurant_id)?,
            reservation_id: parse_id("reservation_id", &document.reservation_id)?,
            content: document.content,
            ratings: Ratings {
                food: narrow("food_rating", i64::from(document.food_rating))?,
                service: narrow("service_rating", i64::from(document.service_rating))?,
                ambience: narrow("ambience_rating", i64::from(document.ambience_rating))?,
            },
            created_at: document.created_at,
        })
    }
}

impl TryFrom<TimeSlotDocument> for TimeSlot {
    type Error = EngineError;

    fn try_from(document: TimeSlotDocument) -> Result<Self, Self::Error> {
        Ok(TimeSlot {
            restaurant_id: parse_id("restaurant_id", &document.restaurant_id)?,
            weekday: narrow("weekday", i64::from(document.weekday))?,
            hour_start: narrow("hour_start", i64::from(document.hour_start))?,
            hour_end: narrow("hour_end", i64::from(document.hour_end))?,
            closed: document.is_closed,
        })
    }
}

impl TryFrom<TableDocument> for Table {
    type Error = EngineError;

    fn try_from(document: TableDocument) -> Result<Self, Self::Error> {
        Ok(Table {
            id: parse_id("_id", &document.id)?,
            restaurant_id: parse_id("restaurant_id", &document.restaurant_id)?,
            capacity: narrow("capacity", i64::from(document.capacity))?,
        })
    }
}

impl TryFrom<DishDocument> for Dish {
    type Error = EngineError;

    fn try_from(document: DishDocument) -> Result<Self, Self::Error> {
        Ok(Dish {
            id: parse_id("_id", &document.id)?,
            restaurant_id: parse_id("restaurant_id", &document.restaurant_id)?,
            name: document.name,
            price: document.price,
        })
    }
}

/// Error dentro de una transacción: regla de negocio o fallo de MongoDB
enum TxError {
    Engine(EngineError),
    Mongo {
        operation: &'static str,
        source: mongodb::error::Error,
    },
}

impl From<EngineError> for TxError {
    fn from(e: EngineError) -> Self {
        TxError::Engine(e)
    }
}

fn tx(operation: &'static str) -> impl FnOnce(mongodb::error::Error) -> TxError {
    move |source| TxError::Mongo { operation, source }
}

fn storage(operation: &str, e: mongodb::error::Error) -> EngineError {
    EngineError::upstream(operation, e)
}

/// Cómo terminó una escritura que MongoDB rechazó
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Failure {
    /// Otra transacción tocó los mismos documentos; repetir la transacción entera
    Transient,
    /// Violación de índice único
    DuplicateKey,
    Other,
}

fn classify_failure(code: Option<i32>, transient_label: bool) -> Failure {
    if transient_label {
        Failure::Transient
    } else if code == Some(DUPLICATE_KEY) {
        Failure::DuplicateKey
    } else {
        Failure::Other
    }
}

fn failure_of(e: &mongodb::error::Error) -> Failure {
    let code = match e.kind.as_ref() {
        ErrorKind::Write(WriteFailure::WriteError(write)) => Some(write.code),
        ErrorKind::Command(command) => Some(command.code),
        _ => None,
    };
    classify_failure(code, e.contains_label(TRANSIENT_TRANSACTION_ERROR))
}

/// Decide si queda otro intento tras un conflicto transitorio
///
/// Agotados los intentos, el llamante recibe un error reintentable: la regla
/// de negocio no llegó a rechazar nada.
fn next_attempt(operation: &str, attempt: usize, cause: impl std::fmt::Display) -> EngineResult<usize> {
    if attempt >= TRANSACTION_ATTEMPTS {
        return Err(EngineError::upstream(
            operation,
            format!("conflicto de escritura tras {} intentos: {}", attempt, cause),
        ));
    }
    tracing::debug!(operation, attempt, "Reintentando transacción tras conflicto de escritura");
    Ok(attempt + 1)
}

/// Resultado de confirmar (o abortar) una transacción
enum Commit<T> {
    Done(EngineResult<T>),
    Retry(mongodb::error::Error),
}

#[derive(Debug, Clone)]
pub struct MongoRepo {
    pub client: Client,
    pub database: Database,
}

impl MongoRepo {
    /// Conecta y valida la conexión con un `ping`
    ///
    /// Las transacciones multi-documento requieren un replica set.
    pub async fn init(uri: &str, database_name: &str) -> EngineResult<MongoRepo> {
        let client = Client::with_uri_str(uri)
            .await
            .map_err(|e| storage("connect", e))?;

        let database = client.database(database_name);

        // Test connection
        database
            .run_command(doc! {"ping": 1})
            .await
            .map_err(|e| storage("ping", e))?;

        tracing::info!(database = %database_name, "Conexión a MongoDB establecida exitosamente");

        Ok(MongoRepo { client, database })
    }

    pub fn reservations(&self) -> Collection<ReservationDocument> {
        self.database.collection("reservations")
    }

    pub fn reviews(&self) -> Collection<ReviewDocument> {
        self.database.collection("reviews")
    }

    pub fn time_slots(&self) -> Collection<TimeSlotDocument> {
        self.database.collection("time_slots")
    }

    pub fn tables(&self) -> Collection<TableDocument> {
        self.database.collection("tables")
    }

    pub fn dishes(&self) -> Collection<DishDocument> {
        self.database.collection("dishes")
    }

    /// Un documento por mesa; toda transacción que reserva la mesa lo escribe,
    /// así dos transacciones sobre la misma mesa chocan al confirmar
    fn table_guards(&self) -> Collection<Document> {
        self.database.collection("table_guards")
    }

    pub async fn create_indexes(&self) -> EngineResult<()> {
        use mongodb::{options::IndexOptions, IndexModel};

        let reservation_indexes = vec![
            IndexModel::builder().keys(doc! { "table_id": 1 }).build(),
            IndexModel::builder().keys(doc! { "user_id": 1 }).build(),
            IndexModel::builder().keys(doc! { "status": 1 }).build(),
        ];
        self.reservations()
            .create_indexes(reservation_indexes)
            .await
            .map_err(|e| storage("create_indexes_reservations", e))?;

        // una reseña por reserva, comprobado por MongoDB al confirmar
        let review_indexes = vec![
            IndexModel::builder()
                .keys(doc! { "reservation_id": 1 })
                .options(IndexOptions::builder().unique(true).build())
                .build(),
            IndexModel::builder()
                .keys(doc! { "user_id": 1, "reservation_id": 1 })
                .build(),
        ];
        self.reviews()
            .create_indexes(review_indexes)
            .await
            .map_err(|e| storage("create_indexes_reviews", e))?;

        self.time_slots()
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "restaurant_id": 1, "weekday": 1 })
                    .options(IndexOptions::builder().unique(true).build())
                    .build(),
            )
            .await
            .map_err(|e| storage("create_indexes_time_slots", e))?;

        self.dishes()
            .create_index(IndexModel::builder().keys(doc! { "restaurant_id": 1 }).build())
            .await
            .map_err(|e| storage("create_indexes_dishes", e))?;

        tracing::info!("Índices MongoDB creados exitosamente");
        Ok(())
    }

    async fn start_transaction(&self, operation: &str) -> EngineResult<ClientSession> {
        let mut session = self
            .client
            .start_session()
            .await
            .map_err(|e| storage(operation, e))?;
        session
            .start_transaction()
            .await
            .map_err(|e| storage(operation, e))?;
        Ok(session)
    }

    /// Confirma o aborta según el resultado
    ///
    /// Los conflictos transitorios piden repetir la transacción. Una clave
    /// duplicada se traduce con `on_duplicate` si se da; si no, también se repite.
    async fn finish<T>(
        &self,
        mut session: ClientSession,
        result: Result<T, TxError>,
        on_duplicate: Option<EngineError>,
    ) -> Commit<T> {
        let (operation, source) = match result {
            Ok(value) => match session.commit_transaction().await {
                Ok(()) => return Commit::Done(Ok(value)),
                Err(e) => ("commit_transaction", e),
            },
            Err(err) => {
                if let Err(e) = session.abort_transaction().await {
                    tracing::warn!(error = %e, "Error abortando transacción");
                }
                match err {
                    TxError::Engine(e) => return Commit::Done(Err(e)),
                    TxError::Mongo { operation, source } => (operation, source),
                }
            }
        };

        match (failure_of(&source), on_duplicate) {
            (Failure::Transient, _) | (Failure::DuplicateKey, None) => Commit::Retry(source),
            (Failure::DuplicateKey, Some(e)) => Commit::Done(Err(e)),
            (Failure::Other, _) => Commit::Done(Err(storage(operation, source))),
        }
    }

    async fn guard_table(&self, session: &mut ClientSession, table_id: Uuid) -> Result<(), TxError> {
        self.table_guards()
            .update_one(
                doc! { "_id": table_id.to_string() },
                doc! {
                    "$inc": { "version": 1_i64 },
                    "$set": { "updated_at": current_timestamp() }
                },
            )
            .upsert(true)
            .session(&mut *session)
            .await
            .map_err(tx("guard_table"))?;
        Ok(())
    }

    async fn load_table_reservations(
        &self,
        session: &mut ClientSession,
        table_id: Uuid,
        except: Option<Uuid>,
    ) -> Result<Vec<Reservation>, TxError> {
        let mut cursor = self
            .reservations()
            .find(doc! { "table_id": table_id.to_string() })
            .session(&mut *session)
            .await
            .map_err(tx("find_table_reservations"))?;

        let mut results = Vec::new();
        while cursor
            .advance(&mut *session)
            .await
            .map_err(tx("iterate_table_reservations"))?
        {
            let document = cursor
                .deserialize_current()
                .map_err(tx("decode_reservation"))?;
            let reservation = Reservation::try_from(document)?;
            if Some(reservation.id) != except {
                results.push(reservation);
            }
        }
        Ok(results)
    }

    async fn find_in_session(
        &self,
        session: &mut ClientSession,
        id: Uuid,
    ) -> Result<Reservation, TxError> {
        let document = self
            .reservations()
            .find_one(doc! { "_id": id.to_string() })
            .session(&mut *session)
            .await
            .map_err(tx("find_reservation"))?
            .ok_or_else(|| EngineError::not_found("reservation", id))?;
        Ok(Reservation::try_from(document)?)
    }

    async fn insert_reservation_tx(
        &self,
        session: &mut ClientSession,
        reservation: &Reservation,
        admit: AdmissionCheck<'_>,
    ) -> Result<(), TxError> {
        self.guard_table(session, reservation.table_id).await?;
        let existing = self
            .load_table_reservations(session, reservation.table_id, None)
            .await?;
        admit(existing.as_slice())?;

        self.reservations()
            .insert_one(ReservationDocument::from(reservation))
            .session(&mut *session)
            .await
            .map_err(tx("insert_reservation"))?;
        Ok(())
    }

    async fn update_status_tx(
        &self,
        session: &mut ClientSession,
        id: Uuid,
        from: ReservationStatus,
        to: ReservationStatus,
        admit: Option<AdmissionCheck<'_>>,
    ) -> Result<Reservation, TxError> {
        let mut reservation = self.find_in_session(session, id).await?;
        if reservation.status != from {
            return Err(EngineError::InvalidStatusTransition {
                from: reservation.status,
                to,
            }
            .into());
        }

        if let Some(admit) = admit {
            self.guard_table(session, reservation.table_id).await?;
            let others = self
                .load_table_reservations(session, reservation.table_id, Some(id))
                .await?;
            admit(others.as_slice())?;
        }

        reservation.status = to;
        reservation.updated_at = current_timestamp();
        let result = self
            .reservations()
            .update_one(
                doc! { "_id": id.to_string(), "status": from.as_str() },
                doc! { "$set": { "status": to.as_str(), "updated_at": reservation.updated_at } },
            )
            .session(&mut *session)
            .await
            .map_err(tx("update_status"))?;

        if result.matched_count == 0 {
            return Err(EngineError::InvalidStatusTransition { from, to }.into());
        }
        Ok(reservation)
    }

    async fn append_line_items_tx(
        &self,
        session: &mut ClientSession,
        id: Uuid,
        owner: Uuid,
        items: &[LineItem],
        fold: TotalFold<'_>,
    ) -> Result<Reservation, TxError> {
        let mut reservation = self.find_in_session(session, id).await?;
        if !reservation.is_owned_by(owner) {
            return Err(EngineError::NotOwner {
                reservation_id: id.to_string(),
            }
            .into());
        }

        reservation.line_items.extend_from_slice(items);
        reservation.total_price = fold(reservation.line_items.as_slice())?;
        reservation.updated_at = current_timestamp();

        self.reservations()
            .replace_one(
                doc! { "_id": id.to_string() },
                ReservationDocument::from(&reservation),
            )
            .session(&mut *session)
            .await
            .map_err(tx("replace_reservation"))?;
        Ok(reservation)
    }

    async fn insert_review_linked_tx(
        &self,
        session: &mut ClientSession,
        review: &Review,
    ) -> Result<(), TxError> {
        let reservation_id = review.reservation_id.to_string();
        let existing = self
            .reviews()
            .find_one(doc! {
                "user_id": review.user_id.to_string(),
                "reservation_id": reservation_id.as_str(),
            })
            .session(&mut *session)
            .await
            .map_err(tx("find_review"))?;
        if existing.is_some() {
            return Err(EngineError::ReviewAlreadyExists { reservation_id }.into());
        }

        self.reviews()
            .insert_one(ReviewDocument::from(review))
            .session(&mut *session)
            .await
            .map_err(tx("insert_review"))?;

        let linked = self
            .reservations()
            .update_one(
                doc! { "_id": reservation_id.as_str(), "review_id": null },
                doc! { "$set": {
                    "review_id": review.id.to_string(),
                    "updated_at": current_timestamp(),
                } },
            )
            .session(&mut *session)
            .await
            .map_err(tx("link_review"))?;

        if linked.matched_count == 0 {
            self.find_in_session(session, review.reservation_id).await?;
            return Err(EngineError::ReviewAlreadyAttached { reservation_id }.into());
        }
        Ok(())
    }

    async fn collect_reservations(&self, filter: Document, operation: &str) -> EngineResult<Vec<Reservation>> {
        let mut cursor = self
            .reservations()
            .find(filter)
            .await
            .map_err(|e| storage(operation, e))?;

        let mut results = Vec::new();
        while cursor.advance().await.map_err(|e| storage(operation, e))? {
            let document = cursor
                .deserialize_current()
                .map_err(|e| storage(operation, e))?;
            results.push(Reservation::try_from(document)?);
        }
        Ok(results)
    }
}

#[async_trait]
impl ScheduleCatalog for MongoRepo {
    async fn operating_hours(&self, restaurant_id: Uuid, weekday: u8) -> EngineResult<Option<TimeSlot>> {
        self.time_slots()
            .find_one(doc! {
                "restaurant_id": restaurant_id.to_string(),
                "weekday": i32::from(weekday),
            })
            .await
            .map_err(|e| storage("get_operating_hours", e))?
            .map(TimeSlot::try_from)
            .transpose()
    }

    async fn table(&self, table_id: Uuid) -> EngineResult<Option<Table>> {
        self.tables()
            .find_one(doc! { "_id": table_id.to_string() })
            .await
            .map_err(|e| storage("get_table", e))?
            .map(Table::try_from)
            .transpose()
    }

    async fn catalog_dish(&self, restaurant_id: Uuid, dish_id: Uuid) -> EngineResult<Option<Dish>> {
        self.dishes()
            .find_one(doc! {
                "_id": dish_id.to_string(),
                "restaurant_id": restaurant_id.to_string(),
            })
            .await
            .map_err(|e| storage("get_catalog_dish", e))?
            .map(Dish::try_from)
            .transpose()
    }
}

#[async_trait]
impl LedgerStore for MongoRepo {
    async fn reservations_for_table(&self, table_id: Uuid) -> EngineResult<Vec<Reservation>> {
        self.collect_reservations(doc! { "table_id": table_id.to_string() }, "list_table_reservations")
            .await
    }

    async fn insert_reservation(&self, reservation: &Reservation, admit: AdmissionCheck<'_>) -> EngineResult<()> {
        let mut attempt = 1;
        loop {
            let mut session = self.start_transaction("insert_reservation").await?;
            let result = self
                .insert_reservation_tx(&mut session, reservation, admit)
                .await;
            // el conflicto de mesa solo lo decide `admit`; perder la escritura
            // del guardia de mesa no implica solapamiento
            match self.finish(session, result, None).await {
                Commit::Done(outcome) => return outcome,
                Commit::Retry(e) => attempt = next_attempt("insert_reservation", attempt, e)?,
            }
        }
    }

    async fn find_reservation(&self, id: Uuid) -> EngineResult<Option<Reservation>> {
        self.reservations()
            .find_one(doc! { "_id": id.to_string() })
            .await
            .map_err(|e| storage("get_reservation", e))?
            .map(Reservation::try_from)
            .transpose()
    }

    async fn reservations_by_user(&self, user_id: Uuid) -> EngineResult<Vec<Reservation>> {
        self.collect_reservations(doc! { "user_id": user_id.to_string() }, "list_user_reservations")
            .await
    }

    async fn set_total_price(&self, id: Uuid, total_price: i64) -> EngineResult<()> {
        let result = self
            .reservations()
            .update_one(
                doc! { "_id": id.to_string() },
                doc! { "$set": {
                    "total_price": total_price,
                    "updated_at": current_timestamp(),
                } },
            )
            .await
            .map_err(|e| storage("update_total_price", e))?;

        if result.matched_count == 0 {
            return Err(EngineError::not_found("reservation", id));
        }
        Ok(())
    }

    async fn update_status(
        &self,
        id: Uuid,
        from: ReservationStatus,
        to: ReservationStatus,
        admit: Option<AdmissionCheck<'_>>,
    ) -> EngineResult<Reservation> {
        let mut attempt = 1;
        loop {
            let mut session = self.start_transaction("update_status").await?;
            let result = self.update_status_tx(&mut session, id, from, to, admit).await;
            match self.finish(session, result, None).await {
                Commit::Done(outcome) => return outcome,
                Commit::Retry(e) => attempt = next_attempt("update_status", attempt, e)?,
            }
        }
    }

    async fn append_line_items(
        &self,
        id: Uuid,
        owner: Uuid,
        items: &[LineItem],
        fold: TotalFold<'_>,
    ) -> EngineResult<Reservation> {
        let mut attempt = 1;
        loop {
            let mut session = self.start_transaction("append_line_items").await?;
            let result = self
                .append_line_items_tx(&mut session, id, owner, items, fold)
                .await;
            match self.finish(session, result, None).await {
                Commit::Done(outcome) => return outcome,
                Commit::Retry(e) => attempt = next_attempt("append_line_items", attempt, e)?,
            }
        }
    }

    async fn attach_review(&self, id: Uuid, review_id: Uuid) -> EngineResult<()> {
        let result = self
            .reservations()
            .update_one(
                doc! { "_id": id.to_string(), "review_id": null },
                doc! { "$set": {
                    "review_id": review_id.to_string(),
                    "updated_at": current_timestamp(),
                } },
            )
            .await
            .map_err(|e| storage("attach_review", e))?;

        if result.matched_count == 0 {
            return match self.find_reservation(id).await? {
                None => Err(EngineError::not_found("reservation", id)),
                Some(_) => Err(EngineError::ReviewAlreadyAttached {
                    reservation_id: id.to_string(),
                }),
            };
        }
        Ok(())
    }

    async fn find_review(&self, user_id: Uuid, reservation_id: Uuid) -> EngineResult<Option<Review>> {
        self.reviews()
            .find_one(doc! {
                "user_id": user_id.to_string(),
                "reservation_id": reservation_id.to_string(),
            })
            .await
            .map_err(|e| storage("find_review", e))?
            .map(Review::try_from)
            .transpose()
    }

    async fn insert_review_linked(&self, review: &Review) -> EngineResult<()> {
        let mut attempt = 1;
        loop {
            let mut session = self.start_transaction("insert_review").await?;
            let result = self.insert_review_linked_tx(&mut session, review).await;
            // al repetir, la búsqueda previa ya ve la reseña ganadora
            let duplicate = EngineError::ReviewAlreadyExists {
                reservation_id: review.reservation_id.to_string(),
            };
            match self.finish(session, result, Some(duplicate)).await {
                Commit::Done(outcome) => return outcome,
                Commit::Retry(e) => attempt = next_attempt("insert_review", attempt, e)?,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn reservation() -> Reservation {
        let day = NaiveDate::from_ymd_opt(2024, 12, 16).unwrap();
        let interval = Interval::new(
            day.and_hms_opt(18, 0, 0).unwrap(),
            day.and_hms_opt(20, 0, 0).unwrap(),
        )
        .unwrap();
        let mut reservation =
            Reservation::pending(Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4(), interval);
        reservation.line_items.push(LineItem {
            id: Uuid::new_v4(),
            reservation_id: reservation.id,
            dish_id: Uuid::new_v4(),
            quantity: 2,
            unit_price: 50,
            option: "grande".to_string(),
            comment: String::new(),
            created_at: reservation.created_at,
        });
        reservation.total_price = 100;
        reservation
    }

    #[test]
    fn reservation_document_keeps_local_time_and_lines() {
        let original = reservation();
        let document = ReservationDocument::from(&original);

        assert_eq!(document.start, "2024-12-16T18:00:00");
        assert_eq!(document.status, "Pending");
        assert_eq!(document.review_id, None);
        assert_eq!(document.line_items[0].quantity, 2);

        let decoded = Reservation::try_from(document).unwrap();
        assert_eq!(decoded, original);
        assert_eq!(decoded.review_id, None);
    }

    #[test]
    fn negative_quantity_is_rejected() {
        let mut document = ReservationDocument::from(&reservation());
        document.line_items[0].quantity = -1;

        let err = Reservation::try_from(document).unwrap_err();
        assert!(matches!(err, EngineError::UpstreamUnavailable { ref operation, .. } if operation == "decode_document"));
    }

    #[test]
    fn unknown_status_is_rejected() {
        let mut document = ReservationDocument::from(&reservation());
        document.status = "Archived".to_string();

        assert!(Reservation::try_from(document).is_err());
    }

    #[test]
    fn inverted_interval_is_rejected() {
        let mut document = ReservationDocument::from(&reservation());
        document.end = "2024-12-16T17:00:00".to_string();

        assert!(matches!(
            Reservation::try_from(document),
            Err(EngineError::InvalidInterval { .. })
        ));
    }

    #[test]
    fn linked_review_id_is_decoded() {
        let mut original = reservation();
        original.review_id = Some(Uuid::new_v4());

        let decoded = Reservation::try_from(ReservationDocument::from(&original)).unwrap();
        assert_eq!(decoded.review_id, original.review_id);
    }

    #[test]
    fn rating_outside_u8_is_rejected() {
        let document = ReviewDocument {
            id: Uuid::new_v4().to_string(),
            user_id: Uuid::new_v4().to_string(),
            restaurant_id: Uuid::new_v4().to_string(),
            reservation_id: Uuid::new_v4().to_string(),
            content: "bien".to_string(),
            food_rating: 300,
            service_rating: 4,
            ambience_rating: 4,
            created_at: 0,
        };

        assert!(Review::try_from(document).is_err());
    }

    #[test]
    fn transient_label_wins_over_error_code() {
        assert_eq!(classify_failure(Some(112), true), Failure::Transient);
        assert_eq!(classify_failure(Some(DUPLICATE_KEY), true), Failure::Transient);
        assert_eq!(classify_failure(None, true), Failure::Transient);
    }

    #[test]
    fn duplicate_key_without_label() {
        assert_eq!(classify_failure(Some(DUPLICATE_KEY), false), Failure::DuplicateKey);
        assert_eq!(classify_failure(Some(112), false), Failure::Other);
        assert_eq!(classify_failure(None, false), Failure::Other);
    }

    #[test]
    fn retries_until_attempts_run_out() {
        assert_eq!(next_attempt("insert_reservation", 1, "WriteConflict").unwrap(), 2);
        assert_eq!(next_attempt("insert_reservation", 2, "WriteConflict").unwrap(), 3);

        let err = next_attempt("insert_reservation", TRANSACTION_ATTEMPTS, "WriteConflict").unwrap_err();
        assert!(err.is_retryable());
        assert!(!matches!(err, EngineError::TableConflict { .. }));
    }
}
