//! Server assembly: wires the Postgres stores, the sidecar clients, and the
//! engine components into one axum application.

use crate::middleware::{get_tracing_layer, request_logging};
use crate::routes;
use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use std::time::Duration;
use tasklane_common::EngineConfig;
use tasklane_engine::{
    AuditRecorder, FanoutHandler, RecurrenceWorker, ReminderScheduler, SessionRegistry,
    TaskGateway,
};
use tasklane_messaging::{
    routes as delivery_routes, EventPublisher, JobScheduler, SidecarJobsClient, SidecarPublisher,
};
use tasklane_storage::{
    AuditLog, PgAuditLog, PgReminderMirror, PgTaskRepository, PostgresStore, ReminderMirror,
    TaskRepository,
};
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

/// How long in-flight work may drain after a shutdown signal
const DRAIN_DEADLINE: Duration = Duration::from_secs(20);

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<EngineConfig>,
    pub gateway: Arc<TaskGateway>,
    pub recurrence: Arc<RecurrenceWorker>,
    pub scheduler: Arc<ReminderScheduler>,
    pub audit: Arc<AuditRecorder>,
    pub fanout: Arc<FanoutHandler>,
    pub registry: Arc<SessionRegistry>,
}

pub struct EngineServer {
    state: AppState,
}

impl EngineServer {
    /// Connect the store, run migrations, build every component, and replay
    /// the scheduler's pending jobs.
    pub async fn new(config: EngineConfig) -> anyhow::Result<Self> {
        let store = PostgresStore::connect(&config.database_url).await?;
        store.run_migrations().await?;

        let tasks: Arc<dyn TaskRepository> = Arc::new(PgTaskRepository::new(store.pool()));
        let audit_log: Arc<dyn AuditLog> = Arc::new(PgAuditLog::new(store.pool()));
        let mirror: Arc<dyn ReminderMirror> = Arc::new(PgReminderMirror::new(store.pool()));

        let publisher: Arc<dyn EventPublisher> =
            Arc::new(SidecarPublisher::new(config.pubsub_component.clone())?);
        let jobs: Arc<dyn JobScheduler> = Arc::new(SidecarJobsClient::new()?);

        let registry = Arc::new(SessionRegistry::new(config.session_outbound_buffer));
        let scheduler = Arc::new(ReminderScheduler::new(
            tasks.clone(),
            mirror,
            jobs,
            publisher.clone(),
            config.reminder_variance_budget_ms,
        ));

        // Re-register anything that was pending when the last process died.
        match scheduler.recover().await {
            Ok(0) => {}
            Ok(count) => info!(count, "Scheduler recovery complete"),
            Err(e) => warn!(error = %e, "Scheduler recovery failed; continuing"),
        }

        let state = AppState {
            gateway: Arc::new(TaskGateway::new(tasks.clone(), publisher.clone())),
            recurrence: Arc::new(RecurrenceWorker::new(tasks, publisher)),
            scheduler,
            audit: Arc::new(AuditRecorder::new(audit_log)),
            fanout: Arc::new(FanoutHandler::new(registry.clone())),
            registry,
            config: Arc::new(config),
        };

        Ok(Self { state })
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/health", get(routes::health::health))
            .route(
                "/subscriptions",
                get(routes::subscriptions::list_subscriptions),
            )
            .route(
                delivery_routes::TASK_EVENTS,
                post(routes::events::deliver_task_event),
            )
            .route(
                delivery_routes::REMINDERS,
                post(routes::events::deliver_reminder_event),
            )
            .route(
                delivery_routes::TASK_UPDATES,
                post(routes::events::deliver_task_update),
            )
            .route(
                delivery_routes::JOB_TRIGGER,
                post(routes::events::job_trigger),
            )
            .route("/ws", get(routes::ws::ws_upgrade))
            .route(
                "/api/users/:user_id/tasks",
                post(routes::tasks::create_task).get(routes::tasks::list_tasks),
            )
            .route(
                "/api/users/:user_id/tasks/:task_id",
                get(routes::tasks::get_task)
                    .put(routes::tasks::update_task)
                    .delete(routes::tasks::delete_task),
            )
            .route(
                "/api/users/:user_id/tasks/:task_id/complete",
                post(routes::tasks::toggle_complete),
            )
            .layer(middleware::from_fn(request_logging))
            .layer(get_tracing_layer())
            .layer(CorsLayer::permissive())
            .with_state(self.state.clone())
    }

    pub async fn run(self) -> anyhow::Result<()> {
        let addr = format!("{}:{}", self.state.config.host, self.state.config.port);
        let listener = tokio::net::TcpListener::bind(&addr).await?;
        info!(addr = %addr, "tasklane engine listening");

        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        info!("Server stopped");
        Ok(())
    }
}

/// Resolves on SIGINT/SIGTERM, then arms a watchdog that force-exits if the
/// in-flight drain exceeds the deadline.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install ctrl-c handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    info!(
        deadline_secs = DRAIN_DEADLINE.as_secs(),
        "Shutdown requested; draining in-flight work"
    );
    tokio::spawn(async {
        tokio::time::sleep(DRAIN_DEADLINE).await;
        warn!("Drain deadline exceeded; terminating");
        std::process::exit(0);
    });
}
