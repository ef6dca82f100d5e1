use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use anyhow::Context;
use axum::{
    Extension, Json, Router,
    extract::{DefaultBodyLimit, Path, Query, Request, State},
    http::{HeaderValue, StatusCode, header},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{delete, get, post, put},
};
use chrono::{Local, NaiveDate};
use serde::{Deserialize, Serialize};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use phinpt_core::auth::{SessionTable, hash_password, verify_password};
use phinpt_core::error::{TrainerError, is_not_found};
use phinpt_core::models::{
    ContactInfo, ContactInfoInput, HomeContent, HomeContentInput, MealPlan, NewMealPlan,
    NewTestimonial, NewUser, NewVideo, NewWeightRecord, NewWorkoutPlan, Testimonial,
    UpdateMealPlan, UpdateTestimonial, UpdateUser, UpdateVideo, UpdateWorkoutPlan, User, Video,
    WeightProgress, WeightRecord, WorkoutPlan, extract_youtube_id, validate_new_user,
    validate_update_user,
};
use phinpt_core::service::{Collection, TrainerService};

const BODY_LIMIT: usize = 10 * 1024 * 1024; // 10 MB

#[derive(Clone)]
struct AppState {
    service: Arc<Mutex<TrainerService>>,
    sessions: Arc<Mutex<SessionTable>>,
}

impl AppState {
    fn new(service: TrainerService) -> Self {
        Self {
            service: Arc::new(Mutex::new(service)),
            sessions: Arc::new(Mutex::new(SessionTable::new())),
        }
    }

    fn service(&self) -> MutexGuard<'_, TrainerService> {
        self.service.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn sessions(&self) -> MutexGuard<'_, SessionTable> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// --- Request / Response types ---

#[derive(Deserialize)]
struct LoginRequest {
    identifier: String,
    password: String,
}

#[derive(Serialize)]
struct LoginResponse {
    token: String,
    user: User,
}

#[derive(Deserialize)]
struct DuplicateRequest {
    client_id: String,
}

#[derive(Deserialize)]
struct CreateWeightRequest {
    client_id: Option<String>,
    weight: f64,
    date: Option<NaiveDate>,
    notes: Option<String>,
}

#[derive(Deserialize)]
struct ClientQuery {
    client_id: Option<String>,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

// --- Error handling ---

enum ApiError {
    Unauthorized(String),
    Forbidden(String),
    NotFound(String),
    BadRequest(String),
    Internal(anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            Self::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            Self::Internal(err) => {
                error!(error = %format!("{err:#}"), "internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };
        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        match err.downcast_ref::<TrainerError>() {
            Some(e @ TrainerError::NotFound { .. }) => Self::NotFound(e.to_string()),
            Some(TrainerError::Invalid(msg)) => Self::BadRequest(msg.clone()),
            None => Self::Internal(err),
        }
    }
}

// --- Sessions ---

/// Who is calling, resolved from the bearer token once per request.
#[derive(Clone, Default)]
struct Session {
    token: Option<String>,
    user: Option<User>,
}

impl Session {
    fn user(&self) -> Result<&User, ApiError> {
        self.user
            .as_ref()
            .ok_or_else(|| ApiError::Unauthorized("Sign in required".to_string()))
    }

    fn admin(&self) -> Result<&User, ApiError> {
        let user = self.user()?;
        if !user.is_admin() {
            return Err(ApiError::Forbidden("Admin access required".to_string()));
        }
        Ok(user)
    }

    /// Rows a read may cover: admins choose (or see everything), clients get their own.
    fn client_scope(&self, requested: Option<String>) -> Result<Option<String>, ApiError> {
        let user = self.user()?;
        if user.is_admin() {
            return Ok(requested);
        }
        if requested.as_ref().is_some_and(|id| *id != user.id) {
            return Err(ApiError::Forbidden(
                "Clients can only access their own data".to_string(),
            ));
        }
        Ok(Some(user.id.clone()))
    }
}

fn bearer_token(request: &Request) -> Option<String> {
    request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|t| t.trim().to_string())
}

// --- Middleware ---

async fn resolve_session(State(state): State<AppState>, mut request: Request, next: Next) -> Response {
    let session = match bearer_token(&request) {
        None => Session::default(),
        Some(token) => {
            let user_id = state.sessions().resolve(&token).map(str::to_string);
            let Some(user_id) = user_id else {
                return ApiError::Unauthorized("Invalid or expired session token".to_string())
                    .into_response();
            };
            let found = state.service().get_user(&user_id);
            match found {
                Ok(user) => Session {
                    token: Some(token),
                    user: Some(user),
                },
                Err(e) if is_not_found(&e) => {
                    state.sessions().revoke(&token);
                    return ApiError::Unauthorized("Account no longer exists".to_string())
                        .into_response();
                }
                Err(e) => return ApiError::from(e).into_response(),
            }
        }
    };
    request.extensions_mut().insert(session);
    next.run(request).await
}

async fn security_headers(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    headers.insert(
        "x-content-type-options",
        HeaderValue::from_static("nosniff"),
    );
    headers.insert("x-frame-options", HeaderValue::from_static("DENY"));
    headers.insert(
        "content-security-policy",
        HeaderValue::from_static("default-src 'none'"),
    );
    response
}

// --- Auth handlers ---

async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    const BAD_LOGIN: &str = "Invalid username/email or password";

    let found = state
        .service()
        .db()
        .find_user_credentials(req.identifier.trim())?;
    let Some((user, hash)) = found else {
        warn!("api login failed: unknown account");
        return Err(ApiError::Unauthorized(BAD_LOGIN.to_string()));
    };

    let password = req.password;
    let verified = tokio::task::spawn_blocking(move || verify_password(&password, &hash))
        .await
        .unwrap_or(false);
    if !verified {
        warn!(user_id = %user.id, "api login failed: wrong password");
        return Err(ApiError::Unauthorized(BAD_LOGIN.to_string()));
    }

    let token = state.sessions().create(&user.id);
    info!(user_id = %user.id, role = %user.role, "api session opened");
    Ok(Json(LoginResponse { token, user }))
}

async fn me(Extension(session): Extension<Session>) -> Result<Json<User>, ApiError> {
    Ok(Json(session.user()?.clone()))
}

async fn logout(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
) -> Result<StatusCode, ApiError> {
    session.user()?;
    if let Some(ref token) = session.token {
        state.sessions().revoke(token);
    }
    Ok(StatusCode::NO_CONTENT)
}

// --- Public content ---

async fn get_home_content(State(state): State<AppState>) -> Result<Json<HomeContent>, ApiError> {
    let mut service = state.service();
    service.fetch(Collection::HomeContent)?;
    Ok(Json(service.state().home_content.clone()))
}

async fn get_contact_info(State(state): State<AppState>) -> Result<Json<ContactInfo>, ApiError> {
    let mut service = state.service();
    service.fetch(Collection::ContactInfo)?;
    Ok(Json(service.state().contact_info.clone()))
}

async fn list_testimonials(State(state): State<AppState>) -> Result<Json<Vec<Testimonial>>, ApiError> {
    let mut service = state.service();
    service.fetch(Collection::Testimonials)?;
    Ok(Json(service.state().testimonials.clone()))
}

async fn list_videos(State(state): State<AppState>) -> Result<Json<Vec<Video>>, ApiError> {
    let mut service = state.service();
    service.fetch(Collection::Videos)?;
    Ok(Json(service.state().videos.clone()))
}

// --- Site settings (admin) ---

async fn put_home_content(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Json(req): Json<HomeContentInput>,
) -> Result<Json<HomeContent>, ApiError> {
    session.admin()?;
    Ok(Json(state.service().update_home_content(&req)?))
}

async fn put_contact_info(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Json(req): Json<ContactInfoInput>,
) -> Result<Json<ContactInfo>, ApiError> {
    session.admin()?;
    Ok(Json(state.service().update_contact_info(&req)?))
}

// --- Testimonials (admin) ---

async fn create_testimonial(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Json(req): Json<NewTestimonial>,
) -> Result<(StatusCode, Json<Testimonial>), ApiError> {
    session.admin()?;
    let created = state.service().add_testimonial(&req)?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn update_testimonial(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Path(id): Path<String>,
    Json(req): Json<UpdateTestimonial>,
) -> Result<Json<Testimonial>, ApiError> {
    session.admin()?;
    Ok(Json(state.service().update_testimonial(&id, &req)?))
}

async fn delete_testimonial(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    session.admin()?;
    state.service().delete_testimonial(&id)?;
    Ok(StatusCode::NO_CONTENT)
}

// --- Videos (admin) ---

/// Accept a pasted `YouTube` link wherever an id is expected.
fn normalize_youtube_id(raw: String) -> String {
    extract_youtube_id(&raw).unwrap_or(raw)
}

async fn create_video(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Json(mut req): Json<NewVideo>,
) -> Result<(StatusCode, Json<Video>), ApiError> {
    session.admin()?;
    req.youtube_id = normalize_youtube_id(req.youtube_id);
    let created = state.service().add_video(&req)?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn update_video(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Path(id): Path<String>,
    Json(mut req): Json<UpdateVideo>,
) -> Result<Json<Video>, ApiError> {
    session.admin()?;
    req.youtube_id = req.youtube_id.map(normalize_youtube_id);
    Ok(Json(state.service().update_video(&id, &req)?))
}

async fn delete_video(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    session.admin()?;
    state.service().delete_video(&id)?;
    Ok(StatusCode::NO_CONTENT)
}

// --- Workout plans ---

async fn list_workout_plans(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Query(query): Query<ClientQuery>,
) -> Result<Json<Vec<WorkoutPlan>>, ApiError> {
    let scope = session.client_scope(query.client_id)?;
    let mut service = state.service();
    service.fetch(Collection::WorkoutPlans)?;
    Ok(Json(service.workout_plans_for(scope.as_deref())))
}

async fn get_workout_plan(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Path(id): Path<String>,
) -> Result<Json<WorkoutPlan>, ApiError> {
    session.user()?;
    let plan = state.service().db().get_workout_plan(&id)?;
    session.client_scope(Some(plan.client_id.clone()))?;
    Ok(Json(plan))
}

async fn create_workout_plan(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Json(req): Json<NewWorkoutPlan>,
) -> Result<(StatusCode, Json<WorkoutPlan>), ApiError> {
    session.admin()?;
    let created = state.service().add_workout_plan(&req)?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn update_workout_plan(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Path(id): Path<String>,
    Json(req): Json<UpdateWorkoutPlan>,
) -> Result<Json<WorkoutPlan>, ApiError> {
    session.admin()?;
    Ok(Json(state.service().update_workout_plan(&id, &req)?))
}

async fn delete_workout_plan(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    session.admin()?;
    state.service().delete_workout_plan(&id)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn duplicate_workout_plan(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Path(id): Path<String>,
    Json(req): Json<DuplicateRequest>,
) -> Result<(StatusCode, Json<WorkoutPlan>), ApiError> {
    session.admin()?;
    let copy = state.service().duplicate_workout_plan(&id, &req.client_id)?;
    Ok((StatusCode::CREATED, Json(copy)))
}

async fn next_week_plan(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Path(id): Path<String>,
) -> Result<(StatusCode, Json<WorkoutPlan>), ApiError> {
    session.user()?;
    let mut service = state.service();
    let template = service.db().get_workout_plan(&id)?;
    session.client_scope(Some(template.client_id.clone()))?;
    let next = service.create_new_week_plan(&template.client_id, &template.id)?;
    Ok((StatusCode::CREATED, Json(next)))
}

// --- Meal plans ---

async fn list_meal_plans(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Query(query): Query<ClientQuery>,
) -> Result<Json<Vec<MealPlan>>, ApiError> {
    let scope = session.client_scope(query.client_id)?;
    let mut service = state.service();
    service.fetch(Collection::MealPlans)?;
    Ok(Json(service.meal_plans_for(scope.as_deref())))
}

async fn get_meal_plan(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Path(id): Path<String>,
) -> Result<Json<MealPlan>, ApiError> {
    session.user()?;
    let plan = state.service().db().get_meal_plan(&id)?;
    session.client_scope(Some(plan.client_id.clone()))?;
    Ok(Json(plan))
}

async fn create_meal_plan(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Json(req): Json<NewMealPlan>,
) -> Result<(StatusCode, Json<MealPlan>), ApiError> {
    session.admin()?;
    let created = state.service().add_meal_plan(&req)?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn update_meal_plan(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Path(id): Path<String>,
    Json(req): Json<UpdateMealPlan>,
) -> Result<Json<MealPlan>, ApiError> {
    session.admin()?;
    Ok(Json(state.service().update_meal_plan(&id, &req)?))
}

async fn delete_meal_plan(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    session.admin()?;
    state.service().delete_meal_plan(&id)?;
    Ok(StatusCode::NO_CONTENT)
}

// --- Weight ---

async fn list_weight(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Query(query): Query<ClientQuery>,
) -> Result<Json<Vec<WeightRecord>>, ApiError> {
    let scope = session.client_scope(query.client_id)?;
    let mut service = state.service();
    service.fetch(Collection::WeightRecords)?;
    Ok(Json(service.weight_records_for(scope.as_deref())))
}

async fn create_weight(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Json(req): Json<CreateWeightRequest>,
) -> Result<(StatusCode, Json<WeightRecord>), ApiError> {
    let Some(client_id) = session.client_scope(req.client_id)? else {
        return Err(ApiError::BadRequest("client_id is required".to_string()));
    };
    let record = state.service().add_weight_record(&NewWeightRecord {
        client_id,
        weight: req.weight,
        date: req.date.unwrap_or_else(|| Local::now().date_naive()),
        notes: req.notes,
    })?;
    Ok((StatusCode::CREATED, Json(record)))
}

async fn weight_progress(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Query(query): Query<ClientQuery>,
) -> Result<Json<WeightProgress>, ApiError> {
    let Some(client_id) = session.client_scope(query.client_id)? else {
        return Err(ApiError::BadRequest("client_id is required".to_string()));
    };
    Ok(Json(state.service().weight_progress(&client_id)?))
}

async fn delete_weight(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    session.admin()?;
    state.service().delete_weight_record(&id)?;
    Ok(StatusCode::NO_CONTENT)
}

// --- Users (admin) ---

async fn list_users(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
) -> Result<Json<Vec<User>>, ApiError> {
    session.admin()?;
    let mut service = state.service();
    service.fetch(Collection::Users)?;
    Ok(Json(service.state().users.clone()))
}

/// bcrypt runs on the blocking pool so the service lock is never held across it.
async fn hash_off_runtime(password: String) -> Result<String, ApiError> {
    tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(|e| ApiError::Internal(e.into()))?
        .map_err(ApiError::from)
}

async fn create_user(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Json(req): Json<NewUser>,
) -> Result<(StatusCode, Json<User>), ApiError> {
    session.admin()?;
    validate_new_user(&req)?;
    let hash = hash_off_runtime(req.password.clone()).await?;
    let created = state.service().add_user_with_hash(&req, &hash)?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn update_user(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Path(id): Path<String>,
    Json(req): Json<UpdateUser>,
) -> Result<Json<User>, ApiError> {
    session.admin()?;
    validate_update_user(&req)?;
    let hash = match req.password.clone() {
        Some(password) => Some(hash_off_runtime(password).await?),
        None => None,
    };
    Ok(Json(
        state
            .service()
            .update_user_with_hash(&id, &req, hash.as_deref())?,
    ))
}

async fn delete_user(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let admin = session.admin()?;
    if admin.id == id {
        return Err(ApiError::BadRequest(
            "Refusing to delete the account you are signed in with".to_string(),
        ));
    }
    state.service().delete_user(&id)?;
    let revoked = state.sessions().revoke_user(&id);
    info!(user_id = %id, revoked, "sessions closed for deleted user");
    Ok(StatusCode::NO_CONTENT)
}

// --- Router builder ---

fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/auth/login", post(login))
        .route("/api/auth/me", get(me))
        .route("/api/auth/logout", post(logout))
        .route(
            "/api/home-content",
            get(get_home_content).put(put_home_content),
        )
        .route(
            "/api/contact-info",
            get(get_contact_info).put(put_contact_info),
        )
        .route(
            "/api/testimonials",
            get(list_testimonials).post(create_testimonial),
        )
        .route(
            "/api/testimonials/{id}",
            put(update_testimonial).delete(delete_testimonial),
        )
        .route("/api/videos", get(list_videos).post(create_video))
        .route("/api/videos/{id}", put(update_video).delete(delete_video))
        .route(
            "/api/workout-plans",
            get(list_workout_plans).post(create_workout_plan),
        )
        .route(
            "/api/workout-plans/{id}",
            get(get_workout_plan)
                .put(update_workout_plan)
                .delete(delete_workout_plan),
        )
        .route(
            "/api/workout-plans/{id}/duplicate",
            post(duplicate_workout_plan),
        )
        .route("/api/workout-plans/{id}/next-week", post(next_week_plan))
        .route(
            "/api/meal-plans",
            get(list_meal_plans).post(create_meal_plan),
        )
        .route(
            "/api/meal-plans/{id}",
            get(get_meal_plan)
                .put(update_meal_plan)
                .delete(delete_meal_plan),
        )
        .route("/api/weight", get(list_weight).post(create_weight))
        .route("/api/weight/progress", get(weight_progress))
        .route("/api/weight/{id}", delete(delete_weight))
        .route("/api/users", get(list_users).post(create_user))
        .route("/api/users/{id}", put(update_user).delete(delete_user))
        .layer(middleware::from_fn_with_state(state.clone(), resolve_session))
        .layer(TraceLayer::new_for_http())
        .layer(DefaultBodyLimit::max(BODY_LIMIT))
        .layer(RequestBodyLimitLayer::new(BODY_LIMIT))
        .layer(middleware::from_fn(security_headers))
        .with_state(state)
}

// --- Server startup ---

pub async fn start_server(mut service: TrainerService, bind: &str, port: u16) -> anyhow::Result<()> {
    let report = service.load_all();
    if !report.is_complete() {
        warn!(failed = ?report.failed, "starting with collections that failed to load");
    }
    if !service.db().admin_exists()? {
        warn!("no admin account yet, run `phinpt setup-admin` to create one");
    }

    let app = build_router(AppState::new(service));

    let listener = tokio::net::TcpListener::bind(format!("{bind}:{port}"))
        .await
        .with_context(|| format!("failed to bind {bind}:{port}"))?;
    info!("listening on http://{bind}:{port}");
    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use http_body_util::BodyExt;
    use phinpt_core::models::Role;
    use serde_json::{Value, json};
    use tower::ServiceExt;

    struct Fixture {
        app: Router,
        state: AppState,
        admin_token: String,
        client_token: String,
        client_id: String,
        other_client_id: String,
    }

    fn new_user(username: &str, role: Role) -> NewUser {
        NewUser {
            username: username.to_string(),
            email: format!("{username}@phinpt.com"),
            password: "secret1".to_string(),
            full_name: username.to_string(),
            phone: None,
            role,
            avatar: None,
            start_date: None,
        }
    }

    /// Users are inserted with a placeholder hash and handed tokens directly,
    /// so only the login tests pay for bcrypt.
    fn fixture() -> Fixture {
        let service = TrainerService::new_in_memory().unwrap();
        let admin = service
            .db()
            .insert_user(&new_user("coach", Role::Admin), "unused")
            .unwrap();
        let client = service
            .db()
            .insert_user(&new_user("lan", Role::Client), "unused")
            .unwrap();
        let other = service
            .db()
            .insert_user(&new_user("hoa", Role::Client), "unused")
            .unwrap();

        let state = AppState::new(service);
        let admin_token = state.sessions().create(&admin.id);
        let client_token = state.sessions().create(&client.id);
        Fixture {
            app: build_router(state.clone()),
            state,
            admin_token,
            client_token,
            client_id: client.id,
            other_client_id: other.id,
        }
    }

    async fn send(
        app: &Router,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = axum::http::Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header("Authorization", format!("Bearer {token}"));
        }
        let request = match body {
            Some(body) => builder
                .header("Content-Type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, json)
    }

    fn plan_body(client_id: &str) -> Value {
        json!({
            "name": "Strength",
            "client_id": client_id,
            "start_date": "2024-05-06",
            "days": [
                {
                    "day_name": "Monday",
                    "exercises": [
                        { "name": "Squat", "sets": [{ "reps": 8, "weight": 60.0 }, { "reps": 8 }] },
                        { "name": "Bench", "sets": [{ "reps": 10 }] }
                    ]
                },
                { "day_name": "Tuesday", "is_rest_day": true }
            ]
        })
    }

    #[tokio::test]
    async fn public_routes_need_no_token() {
        let f = fixture();

        let (status, json) = send(&f.app, "GET", "/api/home-content", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["services"].as_array().unwrap().len(), 4);

        let (status, json) = send(&f.app, "GET", "/api/contact-info", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["email"], "contact@phinpt.com");

        let (status, json) = send(&f.app, "GET", "/api/videos", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json, json!([]));
    }

    #[tokio::test]
    async fn security_headers_present() {
        let f = fixture();
        let response = f
            .app
            .oneshot(
                axum::http::Request::get("/api/testimonials")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(
            response.headers().get("x-content-type-options").unwrap(),
            "nosniff"
        );
        assert_eq!(response.headers().get("x-frame-options").unwrap(), "DENY");
        assert_eq!(
            response.headers().get("content-security-policy").unwrap(),
            "default-src 'none'"
        );
    }

    #[tokio::test]
    async fn missing_token_returns_401() {
        let f = fixture();
        let (status, json) = send(&f.app, "GET", "/api/workout-plans", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(json["error"], "Sign in required");
    }

    #[tokio::test]
    async fn unknown_token_returns_401() {
        let f = fixture();
        let (status, _) = send(&f.app, "GET", "/api/auth/me", Some("forged"), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn client_on_admin_route_returns_403() {
        let f = fixture();
        let body = json!({ "title": "Squat form", "youtube_id": "dQw4w9WgXcQ" });
        let (status, json) = send(
            &f.app,
            "POST",
            "/api/videos",
            Some(&f.client_token),
            Some(body),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(json["error"], "Admin access required");

        let (status, _) = send(&f.app, "GET", "/api/users", Some(&f.client_token), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn login_and_logout() {
        let service = TrainerService::new_in_memory().unwrap();
        let hash = hash_password("secret1").unwrap();
        service
            .db()
            .insert_user(&new_user("minh", Role::Client), &hash)
            .unwrap();
        let app = build_router(AppState::new(service));

        let wrong = json!({ "identifier": "minh", "password": "nope" });
        let (status, _) = send(&app, "POST", "/api/auth/login", None, Some(wrong)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let good = json!({ "identifier": "minh@phinpt.com", "password": "secret1" });
        let (status, json) = send(&app, "POST", "/api/auth/login", None, Some(good)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["user"]["username"], "minh");
        assert_eq!(json["user"]["role"], "client");
        assert!(json["user"].get("password_hash").is_none());
        let token = json["token"].as_str().unwrap().to_string();
        assert_eq!(token.len(), 64);

        let (status, json) = send(&app, "GET", "/api/auth/me", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["username"], "minh");

        let (status, _) = send(&app, "POST", "/api/auth/logout", Some(&token), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, _) = send(&app, "GET", "/api/auth/me", Some(&token), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn login_unknown_account_returns_401() {
        let f = fixture();
        let body = json!({ "identifier": "ghost", "password": "secret1" });
        let (status, json) = send(&f.app, "POST", "/api/auth/login", None, Some(body)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(json["error"], "Invalid username/email or password");
    }

    #[tokio::test]
    async fn create_workout_plan_orders_children() {
        let f = fixture();
        let (status, json) = send(
            &f.app,
            "POST",
            "/api/workout-plans",
            Some(&f.admin_token),
            Some(plan_body(&f.client_id)),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(json["week_number"], 1);
        assert_eq!(json["created_by"], "admin");
        assert_eq!(json["days"][0]["day_order"], 1);
        assert_eq!(json["days"][1]["day_order"], 2);
        assert_eq!(json["days"][1]["is_rest_day"], true);
        assert_eq!(json["days"][0]["exercises"][1]["exercise_order"], 2);
        assert_eq!(json["days"][0]["exercises"][0]["sets"][1]["set_number"], 2);
    }

    #[tokio::test]
    async fn clients_only_see_their_own_plans() {
        let f = fixture();
        for client in [&f.client_id, &f.other_client_id] {
            let (status, _) = send(
                &f.app,
                "POST",
                "/api/workout-plans",
                Some(&f.admin_token),
                Some(plan_body(client)),
            )
            .await;
            assert_eq!(status, StatusCode::CREATED);
        }

        let (_, json) = send(&f.app, "GET", "/api/workout-plans", Some(&f.admin_token), None).await;
        assert_eq!(json.as_array().unwrap().len(), 2);

        let (_, json) = send(&f.app, "GET", "/api/workout-plans", Some(&f.client_token), None).await;
        let plans = json.as_array().unwrap();
        assert_eq!(plans.len(), 1);
        assert_eq!(plans[0]["client_id"], f.client_id.as_str());

        let uri = format!("/api/workout-plans?client_id={}", f.other_client_id);
        let (status, _) = send(&f.app, "GET", &uri, Some(&f.client_token), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn next_week_and_duplicate() {
        let f = fixture();
        let (_, plan) = send(
            &f.app,
            "POST",
            "/api/workout-plans",
            Some(&f.admin_token),
            Some(plan_body(&f.client_id)),
        )
        .await;
        let plan_id = plan["id"].as_str().unwrap();

        let uri = format!("/api/workout-plans/{plan_id}/next-week");
        let (status, next) = send(&f.app, "POST", &uri, Some(&f.client_token), None).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(next["week_number"], 2);
        assert_eq!(next["created_by"], "client");
        assert_ne!(next["id"], plan["id"]);
        assert_eq!(next["days"].as_array().unwrap().len(), 2);

        let uri = format!("/api/workout-plans/{plan_id}/duplicate");
        let body = json!({ "client_id": f.other_client_id });
        let (status, copy) = send(&f.app, "POST", &uri, Some(&f.admin_token), Some(body)).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(copy["name"], "Strength (Copy)");
        assert_eq!(copy["client_id"], f.other_client_id.as_str());
        assert_eq!(copy["week_number"], 1);

        // The copy belongs to someone else now.
        let uri = format!("/api/workout-plans/{}/next-week", copy["id"].as_str().unwrap());
        let (status, _) = send(&f.app, "POST", &uri, Some(&f.client_token), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn validation_errors_return_400() {
        let f = fixture();
        let body = json!({ "title": "Squat form", "youtube_id": "short" });
        let (status, json) = send(&f.app, "POST", "/api/videos", Some(&f.admin_token), Some(body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(json["error"].as_str().unwrap().contains("YouTube"));

        let body = json!({ "weight": -2.0 });
        let (status, _) = send(&f.app, "POST", "/api/weight", Some(&f.client_token), Some(body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn missing_rows_return_404() {
        let f = fixture();
        let (status, json) = send(&f.app, "DELETE", "/api/videos/nope", Some(&f.admin_token), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(json["error"].as_str().unwrap().contains("nope"));

        let (status, _) = send(&f.app, "GET", "/api/meal-plans/nope", Some(&f.client_token), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn video_accepts_pasted_links() {
        let f = fixture();
        let body = json!({
            "title": "Deadlift basics",
            "youtube_id": "https://www.youtube.com/watch?v=dQw4w9WgXcQ&t=42",
            "category": "technique"
        });
        let (status, video) = send(&f.app, "POST", "/api/videos", Some(&f.admin_token), Some(body)).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(video["youtube_id"], "dQw4w9WgXcQ");

        let uri = format!("/api/videos/{}", video["id"].as_str().unwrap());
        let (status, _) = send(&f.app, "DELETE", &uri, Some(&f.admin_token), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (_, list) = send(&f.app, "GET", "/api/videos", None, None).await;
        assert_eq!(list, json!([]));
    }

    #[tokio::test]
    async fn weight_logging_and_progress() {
        let f = fixture();
        for (date, weight) in [("2024-03-01", 82.4), ("2024-03-15", 80.9)] {
            let body = json!({ "weight": weight, "date": date });
            let (status, _) = send(&f.app, "POST", "/api/weight", Some(&f.client_token), Some(body)).await;
            assert_eq!(status, StatusCode::CREATED);
        }

        let (status, progress) =
            send(&f.app, "GET", "/api/weight/progress", Some(&f.client_token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(progress["start_weight"], 82.4);
        assert_eq!(progress["current_weight"], 80.9);

        // Admins must say whose weight it is.
        let body = json!({ "weight": 70.0 });
        let (status, _) = send(&f.app, "POST", "/api/weight", Some(&f.admin_token), Some(body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let body = json!({ "weight": 70.0, "client_id": f.other_client_id });
        let (status, _) = send(&f.app, "POST", "/api/weight", Some(&f.admin_token), Some(body)).await;
        assert_eq!(status, StatusCode::CREATED);

        let (_, mine) = send(&f.app, "GET", "/api/weight", Some(&f.client_token), None).await;
        assert_eq!(mine.as_array().unwrap().len(), 2);
        assert_eq!(mine[0]["date"], "2024-03-15");
    }

    #[tokio::test]
    async fn settings_are_admin_editable() {
        let f = fixture();
        let body = json!({
            "phone": "0901234567",
            "facebook": "https://facebook.com/coach",
            "zalo": "https://zalo.me/0901234567",
            "email": "coach@phinpt.com"
        });
        let (status, saved) =
            send(&f.app, "PUT", "/api/contact-info", Some(&f.admin_token), Some(body)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(saved["phone"], "0901234567");

        let (_, public) = send(&f.app, "GET", "/api/contact-info", None, None).await;
        assert_eq!(public["phone"], "0901234567");

        let body = json!({
            "hero_title": "",
            "hero_subtitle": "x",
            "about_text": "x",
            "services_title": "x",
            "services": ["x"]
        });
        let (status, _) = send(&f.app, "PUT", "/api/home-content", Some(&f.admin_token), Some(body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn deleting_a_user_closes_their_sessions() {
        let f = fixture();
        let uri = format!("/api/users/{}", f.client_id);
        let (status, _) = send(&f.app, "DELETE", &uri, Some(&f.admin_token), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (status, _) = send(&f.app, "GET", "/api/auth/me", Some(&f.client_token), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(f.state.sessions().resolve(&f.client_token).is_none());
    }

    #[tokio::test]
    async fn body_too_large_returns_413() {
        let f = fixture();
        let huge = "x".repeat(BODY_LIMIT + 1);
        let body = json!({ "name": huge, "content": "c" });
        let response = f
            .app
            .oneshot(
                axum::http::Request::post("/api/testimonials")
                    .header("Authorization", format!("Bearer {}", f.admin_token))
                    .header("Content-Type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn body_between_two_and_ten_mb_is_accepted() {
        let f = fixture();
        let story = "x".repeat(3 * 1024 * 1024);
        let body = json!({ "name": "Lan", "content": story });
        let (status, json) =
            send(&f.app, "POST", "/api/testimonials", Some(&f.admin_token), Some(body)).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(json["content"].as_str().unwrap().len(), 3 * 1024 * 1024);
    }

    #[tokio::test]
    async fn admin_sets_passwords_for_new_and_existing_users() {
        let f = fixture();
        let body = json!({
            "username": "thu",
            "email": "thu@phinpt.com",
            "password": "short",
            "full_name": "Thu"
        });
        let (status, _) = send(&f.app, "POST", "/api/users", Some(&f.admin_token), Some(body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let body = json!({
            "username": "thu",
            "email": "thu@phinpt.com",
            "password": "secret1",
            "full_name": "Thu"
        });
        let (status, user) = send(&f.app, "POST", "/api/users", Some(&f.admin_token), Some(body)).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(user["role"], "client");

        let login = json!({ "identifier": "thu", "password": "secret1" });
        let (status, _) = send(&f.app, "POST", "/api/auth/login", None, Some(login)).await;
        assert_eq!(status, StatusCode::OK);

        let uri = format!("/api/users/{}", user["id"].as_str().unwrap());
        let body = json!({ "password": "changed1" });
        let (status, _) = send(&f.app, "PUT", &uri, Some(&f.admin_token), Some(body)).await;
        assert_eq!(status, StatusCode::OK);

        let old = json!({ "identifier": "thu", "password": "secret1" });
        let (status, _) = send(&f.app, "POST", "/api/auth/login", None, Some(old)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        let new = json!({ "identifier": "thu", "password": "changed1" });
        let (status, _) = send(&f.app, "POST", "/api/auth/login", None, Some(new)).await;
        assert_eq!(status, StatusCode::OK);
    }
}
