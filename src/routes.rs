use crate::{
    auth::{auth_middleware, require_auth},
    handlers::{
        admin, analytics, auth, caregivers, doctors, health, iot, leaderboard, messages,
        notifications, schedule, system, tasks, users,
    },
    middleware::{
        cors_layer, propagate_request_id_layer, request_id_layer, trace_layer,
        validate_request_size,
    },
    realtime::ws,
    AppState,
};
use axum::{
    extract::DefaultBodyLimit,
    middleware::{from_fn, from_fn_with_state},
    routing::{delete, get, post, put},
    Router,
};
use tower::ServiceBuilder;
use tower_http::services::ServeDir;

/// Routes reachable without a bearer token
fn public_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(system::root))
        .route("/health", get(system::health))
        .route("/auth/signup", post(auth::signup))
        .route("/auth/login", post(auth::login))
        .route("/auth/caregiver-signup", post(auth::caregiver_signup))
        .route("/auth/refresh", post(auth::refresh))
        .route("/auth/logout", post(auth::logout))
        .route("/auth/google/login", get(auth::google_login))
        .route("/auth/google/callback", get(auth::google_callback))
        .route("/doctors/login", post(auth::doctor_login))
        .route("/superadmin/login", post(auth::superadmin_login))
        .route("/iot/webhook", post(iot::webhook))
        .route("/iot/status", get(iot::status))
        // Sockets authenticate through `?token=`
        .route("/notifications/ws/:user_id", get(ws::notifications_ws))
        .route("/messages/ws/:user_id", get(ws::messages_ws))
}

fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/me", get(auth::me))
        .route("/users/me", get(users::me))
        .route("/users/profile", get(users::get_profile).put(users::update_profile))
        .route("/users/upload-profile-image", post(users::upload_profile_image))
        .route("/users/profile-image", get(users::get_profile_image))
        .route("/users/search", get(users::search_users))
        .route(
            "/users/emergency-contacts",
            get(users::list_emergency_contacts).post(users::add_emergency_contact),
        )
        .route("/users/emergency-contacts/:id", delete(users::delete_emergency_contact))
        .route("/health/dashboard", get(health::dashboard))
        .route("/health/health-data", post(health::add_health_data))
        .route("/health/health-snapshot", get(health::health_snapshot))
        .route("/health/food-log", post(health::log_food))
        .route("/health/food-logs", get(health::food_logs))
        .route("/health/analyze-meal", post(health::analyze_meal))
        .route("/health/weekly-progress", get(health::weekly_progress))
        .route("/health/update-progress", post(health::update_progress))
        .route("/leaderboard/weekly", get(leaderboard::weekly))
        .route("/leaderboard/history", get(leaderboard::history))
        .route("/leaderboard/achievements", get(leaderboard::user_achievements))
}

fn caregiver_routes() -> Router<AppState> {
    Router::new()
        .route("/caregivers/volunteer", post(caregivers::volunteer))
        .route("/caregivers/request", post(caregivers::request_patient))
        .route("/caregivers/requests", get(caregivers::pending_requests))
        .route("/caregivers/requests/:id/approve", post(caregivers::approve_request))
        .route("/caregivers/requests/:id/reject", post(caregivers::reject_request))
        .route("/caregivers/patients", get(caregivers::my_patients))
        .route("/caregivers/dashboard", get(caregivers::dashboard))
        .route("/caregivers/patients/:id/insights", get(caregivers::patient_insights))
        .route("/caregivers/patients/:id/message", post(caregivers::message_patient))
        .route("/caregiver/tasks", get(tasks::list_tasks).post(tasks::create_task))
        .route("/caregiver/tasks/overdue", get(tasks::overdue_tasks))
        .route("/caregiver/tasks/today", get(tasks::today_tasks))
        .route("/caregiver/tasks/:id", put(tasks::update_task).delete(tasks::delete_task))
        .route("/caregiver/tasks/:id/complete", post(tasks::complete_task))
        .route(
            "/caregiver/schedule",
            get(schedule::list_appointments).post(schedule::create_appointment),
        )
        .route("/caregiver/schedule/today", get(schedule::today_appointments))
        .route("/caregiver/schedule/upcoming", get(schedule::upcoming_appointments))
        .route("/caregiver/schedule/calendar", get(schedule::calendar))
        .route("/caregiver/schedule/:id", put(schedule::update_appointment))
        .route("/caregiver/schedule/:id/cancel", post(schedule::cancel_appointment))
        .route("/caregiver/schedule/:id/complete", post(schedule::complete_appointment))
        .route("/caregiver/analytics/patient/:id", get(analytics::patient_analytics))
        .route("/caregiver/analytics/comparative", get(analytics::comparative_analytics))
}

fn staff_routes() -> Router<AppState> {
    Router::new()
        .route("/doctors/me", get(doctors::me))
        .route("/doctors/dashboard", get(doctors::dashboard))
        .route("/doctors/patients", get(doctors::patients))
        .route("/doctors/patients/:id/dashboard", get(doctors::patient_dashboard))
        .route("/doctors/patients/:id/message", post(doctors::message_patient))
        .route("/admin/doctors", get(admin::list_doctors).post(admin::create_doctor))
        .route("/admin/patients/:id/doctor", put(admin::assign_doctor))
        .route("/admin/users/:id/deactivate", post(admin::deactivate_user))
}

fn realtime_routes() -> Router<AppState> {
    Router::new()
        .route("/notifications", get(notifications::list_notifications))
        .route("/notifications/mark-read/:id", post(notifications::mark_read))
        .route("/notifications/unread-count", get(notifications::unread_count))
        .route("/notifications/create", post(notifications::create_notification))
        .route("/messages/send", post(messages::send_message))
        .route("/messages/conversations", get(messages::conversations))
        .route("/messages/conversation/:user_id", get(messages::conversation))
        .route("/messages/mark-read", post(messages::mark_read))
        .route("/messages/unread-count", get(messages::unread_count))
        .route("/iot/devices", post(iot::register_device))
        .route("/iot/devices/:user_id", get(iot::list_devices))
        .route("/iot/forward_to_hub", post(iot::forward_to_hub))
}

/// Build the full application router
pub fn create_app(state: AppState) -> Router {
    let protected_routes = Router::new()
        .merge(user_routes())
        .merge(caregiver_routes())
        .merge(staff_routes())
        .merge(realtime_routes())
        .layer(from_fn(require_auth));

    Router::new()
        .merge(public_routes())
        .merge(protected_routes)
        .nest_service("/uploads", ServeDir::new(&state.config.upload.local_dir))
        .layer(
            ServiceBuilder::new()
                .layer(trace_layer())
                .layer(request_id_layer())
                .layer(propagate_request_id_layer())
                .layer(cors_layer(&state.config))
                .layer(from_fn_with_state(state.auth_service.clone(), auth_middleware))
                .layer(from_fn_with_state(state.config.clone(), validate_request_size))
                .layer(DefaultBodyLimit::max(state.config.upload.max_file_size as usize)),
        )
        .with_state(state)
}
