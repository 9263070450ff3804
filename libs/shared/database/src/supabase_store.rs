use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use reqwest::{
    header::{HeaderMap, HeaderValue},
    Method,
};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, instrument};

use shared_models::{
    Appointment, AppointmentFilter, AppointmentStatus, Availability, AvailabilityWindow,
    NewAppointment, NewSpecialization, NewTreatment, NewUser, Page, SortOrder, Specialization,
    TreatmentFilter, TreatmentRecord, User, UserChanges, UserFilter,
};

use crate::error::StoreError;
use crate::store::RecordStore;
use crate::supabase::{Query, SupabaseClient};

const USERS: &str = "/rest/v1/users";
const AVAILABILITY: &str = "/rest/v1/availability";
const APPOINTMENTS: &str = "/rest/v1/appointments";
const TREATMENTS: &str = "/rest/v1/treatment_history";
const SPECIALIZATIONS: &str = "/rest/v1/specializations";
const RPC_REPLACE_AVAILABILITY: &str = "/rest/v1/rpc/replace_availability";
const RPC_RECORD_TREATMENT: &str = "/rest/v1/rpc/record_treatment";

/// `RecordStore` backed by PostgREST. The booked-slot uniqueness and the
/// atomic multi-row writes live in `migrations/001_init.sql`.
pub struct SupabaseRecordStore {
    client: Arc<SupabaseClient>,
}

impl SupabaseRecordStore {
    pub fn new(client: Arc<SupabaseClient>) -> Self {
        Self { client }
    }

    fn returning() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("Prefer", HeaderValue::from_static("return=representation"));
        headers
    }

    async fn write_one<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        query: &Query,
        body: Value,
        what: &str,
    ) -> Result<T, StoreError> {
        let (rows, _): (Vec<T>, HeaderMap) = self
            .client
            .request_with_headers(method, path, query, Some(body), Self::returning())
            .await?;
        rows.into_iter()
            .next()
            .ok_or_else(|| StoreError::NotFound(what.to_string()))
    }

    async fn first<T: DeserializeOwned>(&self, path: &str, query: Query) -> Result<Option<T>, StoreError> {
        let rows: Vec<T> = self.client.request(Method::GET, path, &query, None).await?;
        Ok(rows.into_iter().next())
    }
}

fn eq(column: &str, value: impl ToString) -> (String, String) {
    (column.to_string(), format!("eq.{}", value.to_string()))
}

fn push_page(query: &mut Query, page: Option<Page>) {
    if let Some(page) = page {
        query.push(("limit".to_string(), page.limit().to_string()));
        query.push(("offset".to_string(), page.offset().to_string()));
    }
}

fn user_query(filter: &UserFilter) -> Query {
    let mut query = Query::new();
    if let Some(role) = filter.role {
        query.push(eq("role", role));
    }
    if let Some(role) = filter.exclude_role {
        query.push(("role".to_string(), format!("neq.{}", role)));
    }
    if let Some(term) = filter.search.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
        let term = term.replace([',', '(', ')', '*'], " ");
        query.push((
            "or".to_string(),
            format!("(name.ilike.*{0}*,email.ilike.*{0}*)", term),
        ));
    }
    query
}

fn appointment_query(filter: &AppointmentFilter) -> Query {
    let mut query = Query::new();
    if let Some(id) = filter.patient_id {
        query.push(eq("patient_id", id));
    }
    if let Some(id) = filter.doctor_id {
        query.push(eq("doctor_id", id));
    }
    if let Some(status) = filter.status {
        query.push(eq("status", status));
    }
    if let Some(date) = filter.date {
        query.push(eq("date", date));
    }
    if let Some(time) = filter.time {
        query.push(eq("time", time.format("%H:%M:%S")));
    }
    if let Some(from) = filter.date_from {
        query.push(("date".to_string(), format!("gte.{}", from)));
    }
    if let Some(to) = filter.date_to {
        query.push(("date".to_string(), format!("lte.{}", to)));
    }
    if let Some(id) = filter.exclude_id {
        query.push(("id".to_string(), format!("neq.{}", id)));
    }
    query
}

fn treatment_query(filter: &TreatmentFilter) -> Query {
    let mut query = Query::new();
    if let Some(id) = filter.patient_id {
        query.push(eq("patient_id", id));
    }
    if let Some(id) = filter.doctor_id {
        query.push(eq("doctor_id", id));
    }
    if let Some(from) = filter.created_from {
        query.push((
            "created_at".to_string(),
            format!("gte.{}", from.to_rfc3339_opts(SecondsFormat::Secs, true)),
        ));
    }
    if let Some(before) = filter.created_before {
        query.push((
            "created_at".to_string(),
            format!("lt.{}", before.to_rfc3339_opts(SecondsFormat::Secs, true)),
        ));
    }
    query
}

#[async_trait]
impl RecordStore for SupabaseRecordStore {
    #[instrument(skip(self, user), fields(email = %user.email))]
    async fn insert_user(&self, user: NewUser) -> Result<User, StoreError> {
        let body = serde_json::to_value(&user)?;
        self.write_one(Method::POST, USERS, &Query::new(), body, "inserted user").await
    }

    async fn get_user(&self, id: i64) -> Result<Option<User>, StoreError> {
        self.first(USERS, vec![eq("id", id)]).await
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        self.first(USERS, vec![eq("email_key", email.trim().to_lowercase())]).await
    }

    async fn update_user(&self, id: i64, changes: UserChanges) -> Result<User, StoreError> {
        let body = serde_json::to_value(&changes)?;
        self.write_one(Method::PATCH, USERS, &vec![eq("id", id)], body, &format!("user {}", id))
            .await
    }

    async fn delete_user(&self, id: i64) -> Result<(), StoreError> {
        // availability rows cascade in the schema
        let (rows, _): (Vec<Value>, HeaderMap) = self
            .client
            .request_with_headers(Method::DELETE, USERS, &vec![eq("id", id)], None, Self::returning())
            .await?;
        if rows.is_empty() {
            return Err(StoreError::NotFound(format!("user {}", id)));
        }
        Ok(())
    }

    async fn list_users(&self, filter: UserFilter, page: Option<Page>) -> Result<Vec<User>, StoreError> {
        let mut query = user_query(&filter);
        query.push(("order".to_string(), "name.asc,id.asc".to_string()));
        push_page(&mut query, page);
        self.client.request(Method::GET, USERS, &query, None).await
    }

    async fn count_users(&self, filter: UserFilter) -> Result<u64, StoreError> {
        self.client.count(USERS, &user_query(&filter)).await
    }

    #[instrument(skip(self, windows))]
    async fn replace_availability(
        &self,
        doctor_id: i64,
        windows: Vec<AvailabilityWindow>,
    ) -> Result<Vec<Availability>, StoreError> {
        let body = json!({
            "p_doctor_id": doctor_id,
            "p_windows": serde_json::to_value(&windows)?,
        });
        let mut rows: Vec<Availability> = self
            .client
            .request(Method::POST, RPC_REPLACE_AVAILABILITY, &Query::new(), Some(body))
            .await?;
        rows.sort_by_key(|a| a.day_of_week);
        debug!("Replaced availability for doctor {} with {} windows", doctor_id, rows.len());
        Ok(rows)
    }

    async fn list_availability(&self, doctor_id: i64) -> Result<Vec<Availability>, StoreError> {
        let query = vec![
            eq("doctor_id", doctor_id),
            ("order".to_string(), "day_of_week.asc".to_string()),
        ];
        self.client.request(Method::GET, AVAILABILITY, &query, None).await
    }

    async fn insert_appointment(&self, appointment: NewAppointment) -> Result<Appointment, StoreError> {
        let mut body = serde_json::to_value(&appointment)?;
        body["status"] = json!("booked");
        self.write_one(Method::POST, APPOINTMENTS, &Query::new(), body, "inserted appointment")
            .await
    }

    async fn get_appointment(&self, id: i64) -> Result<Option<Appointment>, StoreError> {
        self.first(APPOINTMENTS, vec![eq("id", id)]).await
    }

    async fn update_appointment(
        &self,
        appointment: Appointment,
        expected: AppointmentStatus,
    ) -> Result<Appointment, StoreError> {
        let body = json!({
            "date": appointment.date,
            "time": appointment.time,
            "status": appointment.status,
            "notes": appointment.notes,
            "diagnosis": appointment.diagnosis,
            "prescription": appointment.prescription,
            "updated_at": appointment.updated_at,
        });
        let query = vec![eq("id", appointment.id), eq("status", expected)];
        let (rows, _): (Vec<Appointment>, HeaderMap) = self
            .client
            .request_with_headers(Method::PATCH, APPOINTMENTS, &query, Some(body), Self::returning())
            .await?;
        if let Some(updated) = rows.into_iter().next() {
            return Ok(updated);
        }

        // no row matched both filters: tell a missing row from a moved status
        match self.get_appointment(appointment.id).await? {
            Some(current) => Err(StoreError::StaleWrite(format!(
                "appointment {} is {}, expected {}",
                appointment.id, current.status, expected
            ))),
            None => Err(StoreError::NotFound(format!("appointment {}", appointment.id))),
        }
    }

    async fn find_appointments(
        &self,
        filter: AppointmentFilter,
        order: SortOrder,
        page: Option<Page>,
    ) -> Result<Vec<Appointment>, StoreError> {
        let mut query = appointment_query(&filter);
        let direction = match order {
            SortOrder::Ascending => "asc",
            SortOrder::Descending => "desc",
        };
        query.push((
            "order".to_string(),
            format!("date.{0},time.{0},id.{0}", direction),
        ));
        push_page(&mut query, page);
        self.client.request(Method::GET, APPOINTMENTS, &query, None).await
    }

    async fn count_appointments(&self, filter: AppointmentFilter) -> Result<u64, StoreError> {
        self.client.count(APPOINTMENTS, &appointment_query(&filter)).await
    }

    #[instrument(skip(self, treatment, completed), fields(appointment_id = treatment.appointment_id))]
    async fn record_treatment(
        &self,
        treatment: NewTreatment,
        completed: Option<Appointment>,
    ) -> Result<TreatmentRecord, StoreError> {
        let body = json!({
            "p_treatment": serde_json::to_value(&treatment)?,
            "p_completed": completed.map(|a| json!({
                "id": a.id,
                "status": a.status,
                "diagnosis": a.diagnosis,
                "prescription": a.prescription,
                "updated_at": a.updated_at,
            })),
        });
        let rows: Vec<TreatmentRecord> = self
            .client
            .request(Method::POST, RPC_RECORD_TREATMENT, &Query::new(), Some(body))
            .await?;
        rows.into_iter()
            .next()
            .ok_or_else(|| StoreError::Backend("record_treatment returned no row".to_string()))
    }

    async fn find_treatments(
        &self,
        filter: TreatmentFilter,
        page: Option<Page>,
    ) -> Result<Vec<TreatmentRecord>, StoreError> {
        let mut query = treatment_query(&filter);
        query.push(("order".to_string(), "created_at.desc,id.desc".to_string()));
        push_page(&mut query, page);
        self.client.request(Method::GET, TREATMENTS, &query, None).await
    }

    async fn count_treatments(&self, filter: TreatmentFilter) -> Result<u64, StoreError> {
        self.client.count(TREATMENTS, &treatment_query(&filter)).await
    }

    async fn insert_specialization(&self, specialization: NewSpecialization) -> Result<Specialization, StoreError> {
        let body = json!({
            "name": specialization.name.trim(),
            "description": specialization.description,
            "created_at": Utc::now(),
        });
        self.write_one(Method::POST, SPECIALIZATIONS, &Query::new(), body, "inserted specialization")
            .await
    }

    async fn list_specializations(&self) -> Result<Vec<Specialization>, StoreError> {
        let query = vec![("order".to_string(), "name.asc".to_string())];
        self.client.request(Method::GET, SPECIALIZATIONS, &query, None).await
    }
}
