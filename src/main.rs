use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};
use crosspath::{
    AppState,
    config::Config,
    db,
    middleware::{RateLimiter, log_errors, rate_limit},
    routes,
    routes::alert::model::AlertEvent,
    routes::crossing::model::EncounterHistory,
};
use tower_http::cors::CorsLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    // 初始化日志
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // 加载配置
    let config = Config::from_env().expect("Failed to load configuration");

    #[cfg(debug_assertions)]
    tracing::info!("Running in debug mode with CORS enabled");

    #[cfg(not(debug_assertions))]
    tracing::info!("Running in production mode with CORS disabled");

    // 建库建表
    let pool = db::connect(&config.database_url)
        .await
        .expect("Failed to open database");

    // 设置 Redis 客户端
    let redis_client =
        redis::Client::open(config.redis_url.clone()).expect("Failed to create Redis client");
    let redis_arc = Arc::new(redis_client.clone());

    // 设置应用状态
    let state = AppState {
        pool,
        config: config.clone(),
        redis: redis_arc,
        http: reqwest::Client::new(),
    };

    // 设置限流器
    let rate_limiter = Arc::new(RateLimiter::new(redis_client, config.clone()));

    // 位置写入、地图读取、相遇与匿名提醒、清理
    let api_routes = Router::new()
        .route("/location/record", post(routes::location::record_location))
        .route("/location/publish", post(routes::location::publish_location))
        .route("/nearby", get(routes::nearby::get_nearby_users))
        .route("/alerts/detect", post(routes::alert::detect_crossed_users))
        .route("/crossings", get(routes::crossing::get_crossed_paths))
        .route("/crossings/count", get(routes::crossing::get_crossed_paths_count))
        .route("/crossings/unlock", get(routes::crossing::check_crossed_paths_unlock))
        .route("/crossings/history", get(routes::crossing::get_cross_path_history))
        .route(
            "/maintenance/cleanup-alerts",
            post(routes::maintenance::cleanup_expired_crossed_events),
        )
        .route(
            "/maintenance/cleanup-history",
            post(routes::maintenance::cleanup_expired_history),
        );

    let router = Router::new().nest(&config.api_base_uri.clone(), api_routes);

    // 添加日志中间件和限流中间件
    let router = router.layer(axum::middleware::from_fn(log_errors)).layer(
        axum::middleware::from_fn_with_state(rate_limiter, rate_limit),
    );

    // 根据编译模式决定是否添加CORS
    #[cfg(debug_assertions)]
    let router = {
        tracing::debug!("Adding CORS layer for development mode");
        router.layer(CorsLayer::permissive())
    };

    let app = router.with_state(state.clone());

    // 定期清理过期的匿名提醒事件和相遇历史
    {
        let pool = state.pool.clone();
        let interval = state.config.cleanup_interval();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // 第一次tick立即返回，跳过
            ticker.tick().await;
            loop {
                ticker.tick().await;
                match AlertEvent::cleanup_expired(&pool).await {
                    Ok(deleted) if deleted > 0 => {
                        tracing::info!("Cleaned up {} expired alert events", deleted);
                    }
                    Ok(_) => {}
                    Err(e) => tracing::error!("Alert cleanup failed: {}", e),
                }
                match EncounterHistory::cleanup_expired(&pool).await {
                    Ok(deleted) if deleted > 0 => {
                        tracing::info!("Cleaned up {} expired history entries", deleted);
                    }
                    Ok(_) => {}
                    Err(e) => tracing::error!("History cleanup failed: {}", e),
                }
            }
        });
    }

    // 启动服务器
    let addr = SocketAddr::new(
        state.config.server_host.parse().unwrap_or_else(|_| {
            tracing::warn!("Invalid server_host, falling back to dual-stack default");
            IpAddr::V6(std::net::Ipv6Addr::UNSPECIFIED)
        }),
        state.config.server_port,
    );
    tracing::info!("Server listening on {}", addr);
    axum::serve(
        tokio::net::TcpListener::bind(&addr)
            .await
            .expect("Failed to bind"),
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .expect("Failed to start server");
}
