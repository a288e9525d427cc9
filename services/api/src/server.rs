use crate::cli::ServeArgs;
use crate::infra::{seed_users, AppState, FileSystemPictureStorage, LoggingSmsSender};
use crate::routes::with_subscription_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use beneficiary_fraud::clock::SystemClock;
use beneficiary_fraud::config::{AppConfig, EnvFeatureToggles};
use beneficiary_fraud::error::AppError;
use beneficiary_fraud::telemetry;
use beneficiary_fraud::workflows::fraud::{
    EvaluationConfig, FraudCheckService, InMemoryFraudRepository,
};
use beneficiary_fraud::workflows::identification::IdentificationClient;
use beneficiary_fraud::workflows::subscription::{
    ChannelTaskQueue, InMemoryAttemptCounter, LoggingNotifier, SubscriptionPorts,
    SubscriptionService, SubscriptionSettings,
};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::info;

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let repository = Arc::new(InMemoryFraudRepository::new());
    if let Some(path) = args.seed_users.as_deref() {
        let count = seed_users(&repository, path)?;
        info!(count, path = %path.display(), "seeded users");
    }

    let fraud = FraudCheckService::new(
        repository,
        EvaluationConfig::default(),
        Arc::new(EnvFeatureToggles),
        Arc::new(SystemClock),
    );

    let (task_queue, task_receiver) = ChannelTaskQueue::new();
    let ports = SubscriptionPorts {
        identification: Arc::new(IdentificationClient::new(config.identification.clone())?),
        tasks: Arc::new(task_queue),
        pictures: Arc::new(FileSystemPictureStorage::new(args.pictures_dir)),
        sms: Arc::new(LoggingSmsSender),
        counters: Arc::new(InMemoryAttemptCounter::new()),
    };
    let settings = SubscriptionSettings {
        deposits: config.deposits,
        phone_validation: config.phone_validation.clone(),
    };
    let subscription_service = Arc::new(SubscriptionService::new(
        fraud,
        Arc::new(LoggingNotifier),
        ports,
        settings,
    ));
    let _worker = task_receiver.spawn(subscription_service.clone());

    let app = with_subscription_routes(subscription_service)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, "beneficiary fraud service ready");

    axum::serve(listener, app).await?;
    Ok(())
}
