use std::{net::SocketAddr, sync::Arc, time::Duration};

use {
    anyhow::Context as _,
    axum::{
        Router,
        routing::{delete, get, post},
    },
    tower_http::{
        cors::{Any, CorsLayer},
        trace::TraceLayer,
    },
    tracing::{info, warn},
    wagate_config::WagateConfig,
    wagate_media::AttachmentStore,
    wagate_sessions::{PairingOptions, SessionServices, SessionSupervisor},
    wagate_tenants::{SqliteTenantStore, TenantInfoCache},
    wagate_webhook::{DispatchQueue, HttpClientOptions},
    wagate_whatsapp::BridgeClientFactory,
};

use crate::{auth, routes, state::GatewayState};

// ── Router ───────────────────────────────────────────────────────────────────

/// Build the gateway router (shared between production startup and tests).
pub fn build_gateway_app(state: Arc<GatewayState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(routes::health))
        .route(
            "/admin/users",
            post(routes::create_tenant).get(routes::list_tenants),
        )
        .route("/admin/users/{token}", delete(routes::delete_tenant))
        .route("/session/connect", post(routes::connect))
        .route("/session/disconnect", post(routes::disconnect))
        .route("/session/status", get(routes::status))
        .route("/session/qr", get(routes::qr))
        .route(
            "/webhook",
            get(routes::get_webhook).post(routes::set_webhook),
        )
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

// ── Server startup ───────────────────────────────────────────────────────────

/// Wire the session services from config.
pub async fn build_services(config: &WagateConfig) -> anyhow::Result<Arc<SessionServices>> {
    let data_dir = config.storage.resolved_data_dir();
    let db_path = config.storage.database_path();
    let store = SqliteTenantStore::open(&db_path)
        .await
        .with_context(|| format!("failed to open tenant database {}", db_path.display()))?;

    let factory = BridgeClientFactory::new(
        &config.bridge.url,
        Duration::from_secs(config.bridge.request_timeout_secs),
    )
    .with_context(|| format!("invalid bridge url {}", config.bridge.url))?;

    let (dispatch, _workers) =
        DispatchQueue::start(config.webhook.queue_capacity, config.webhook.workers);

    Ok(Arc::new(SessionServices {
        store: Arc::new(store),
        cache: TenantInfoCache::new(),
        factory: Arc::new(factory),
        attachments: Arc::new(AttachmentStore::new(data_dir.join("files"))),
        dispatch,
        http: HttpClientOptions::from(&config.webhook),
        pairing: PairingOptions::from(&config.pairing),
    }))
}

/// Start the gateway: bootstrap sessions, serve HTTP until a shutdown signal,
/// then disconnect every session.
pub async fn start_gateway(config: WagateConfig) -> anyhow::Result<()> {
    let admin_token = auth::resolve_admin_token(
        std::env::var("WAGATE_ADMIN_TOKEN").ok(),
        config.server.admin_token.as_deref(),
    );
    if admin_token.is_none() {
        warn!("no admin token configured, /admin routes are disabled");
    }

    let services = build_services(&config).await?;
    let supervisor = SessionSupervisor::new(services);
    let report = supervisor
        .bootstrap()
        .await
        .context("failed to load connected tenants")?;

    let state = GatewayState::new(supervisor.clone(), admin_token);
    let app = build_gateway_app(Arc::clone(&state));

    let addr: SocketAddr = format!("{}:{}", config.server.bind, config.server.port)
        .parse()
        .with_context(|| {
            format!(
                "invalid listen address {}:{}",
                config.server.bind, config.server.port
            )
        })?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    // Startup banner.
    let lines = [
        format!("wagate gateway v{}", state.version),
        format!("listening on {addr}"),
        format!("bridge: {}", config.bridge.url),
        format!(
            "sessions restored: {} ({} failed)",
            report.started.len(),
            report.failed.len()
        ),
        format!("data dir: {}", config.storage.resolved_data_dir().display()),
    ];
    let width = lines.iter().map(|l| l.len()).max().unwrap_or(0) + 4;
    info!("┌{}┐", "─".repeat(width));
    for line in &lines {
        info!("│  {:<w$}│", line, w = width - 2);
    }
    info!("└{}┘", "─".repeat(width));

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("gateway server exited unexpectedly")?;

    supervisor.shutdown().await;
    info!("gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            },
            Err(e) => {
                warn!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            },
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
    info!("shutdown signal received");
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        axum::{
            body::Body,
            http::{Request, StatusCode},
        },
        secrecy::Secret,
        serde_json::{Value, json},
        tower::ServiceExt,
        wagate_channels::testing::ScriptedFactory,
        wagate_sessions::SessionState,
        wagate_tenants::{InMemoryTenantStore, TenantStore},
    };

    struct Fixture {
        app: Router,
        state: Arc<GatewayState>,
        store: Arc<InMemoryTenantStore>,
        factory: Arc<ScriptedFactory>,
        _dir: tempfile::TempDir,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(InMemoryTenantStore::new());
        let factory = ScriptedFactory::new();
        let dir = tempfile::tempdir().unwrap();
        let (dispatch, _) = DispatchQueue::start(16, 1);
        let services = Arc::new(SessionServices {
            store: Arc::clone(&store) as _,
            cache: TenantInfoCache::new(),
            factory: Arc::clone(&factory) as _,
            attachments: Arc::new(AttachmentStore::new(dir.path())),
            dispatch,
            http: HttpClientOptions::default(),
            pairing: PairingOptions {
                qr_size: 64,
                print_terminal: false,
            },
        });
        let state = GatewayState::new(
            SessionSupervisor::new(services),
            Some(Secret::new("admin".to_string())),
        );
        Fixture {
            app: build_gateway_app(Arc::clone(&state)),
            state,
            store,
            factory,
            _dir: dir,
        }
    }

    async fn call(
        app: &Router,
        method: &str,
        uri: &str,
        headers: &[(&str, &str)],
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut req = Request::builder().method(method).uri(uri);
        for (k, v) in headers {
            req = req.header(*k, *v);
        }
        let req = match body {
            Some(body) => req
                .header("content-type", "application/json")
                .body(Body::from(body.to_string())),
            None => req.body(Body::empty()),
        }
        .unwrap();
        let resp = app.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), 1 << 20)
            .await
            .unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    async fn create(app: &Router, name: &str, token: &str) -> (StatusCode, Value) {
        call(
            app,
            "POST",
            "/admin/users",
            &[("authorization", "admin")],
            Some(json!({ "name": name, "token": token })),
        )
        .await
    }

    #[tokio::test]
    async fn health_reports_sessions() {
        let f = fixture();
        let (status, body) = call(&f.app, "GET", "/health", &[], None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["sessions"], 0);
        assert!(body["version"].is_string());
        assert_eq!(body["webhook"]["enqueued"], 0);
    }

    #[tokio::test]
    async fn admin_routes_require_token() {
        let f = fixture();
        let (status, _) = call(&f.app, "GET", "/admin/users", &[], None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        let (status, _) = call(
            &f.app,
            "GET",
            "/admin/users",
            &[("authorization", "wrong")],
            None,
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, body) = create(&f.app, "alice", "tok-a").await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["token"], "tok-a");
        assert!(body["id"].is_number());

        let (status, body) = call(
            &f.app,
            "GET",
            "/admin/users",
            &[("authorization", "Bearer admin")],
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.as_array().unwrap().len(), 1);
        assert!(body[0].get("pairing_code").is_none());
    }

    #[tokio::test]
    async fn duplicate_token_conflicts() {
        let f = fixture();
        assert_eq!(create(&f.app, "a", "tok").await.0, StatusCode::CREATED);
        assert_eq!(create(&f.app, "b", "tok").await.0, StatusCode::CONFLICT);
        assert_eq!(create(&f.app, "", "x").await.0, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn tenant_routes_need_known_token() {
        let f = fixture();
        let (status, _) = call(&f.app, "GET", "/session/status", &[], None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        let (status, _) = call(
            &f.app,
            "GET",
            "/session/status",
            &[("token", "nobody")],
            None,
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn connect_status_disconnect() {
        let f = fixture();
        let (_, created) = create(&f.app, "alice", "tok-a").await;
        let id = wagate_common::TenantId(created["id"].as_i64().unwrap());
        let auth = [("token", "tok-a")];

        let (status, body) = call(
            &f.app,
            "POST",
            "/session/connect",
            &auth,
            Some(json!({ "subscribe": ["Message", "ReadReceipt"] })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["subscribe"], json!(["Message", "ReadReceipt"]));
        assert_eq!(
            f.store.get_by_id(id).await.unwrap().unwrap().events,
            "Message,ReadReceipt"
        );

        let (status, _) = call(&f.app, "POST", "/session/connect", &auth, None).await;
        assert_eq!(status, StatusCode::CONFLICT);

        // No identity yet, so the session waits in pairing.
        f.factory.wait_for(id).await;
        let mut state = Value::Null;
        for _ in 0..200 {
            let (_, body) = call(&f.app, "GET", "/session/status", &auth, None).await;
            state = body["state"].clone();
            if state == json!(SessionState::Pairing) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(state, json!("Pairing"));

        let (status, _) = call(&f.app, "POST", "/session/disconnect", &auth, None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(f.state.supervisor.registry().is_empty());

        let (status, _) = call(&f.app, "POST", "/session/disconnect", &auth, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (_, body) = call(&f.app, "GET", "/session/status", &auth, None).await;
        assert_eq!(body, json!({ "state": null, "connected": false, "loggedIn": false }));
    }

    #[tokio::test]
    async fn webhook_is_persisted_then_cached() {
        let f = fixture();
        create(&f.app, "alice", "tok-a").await;
        let auth = [("token", "tok-a")];

        let (status, _) = call(
            &f.app,
            "POST",
            "/webhook",
            &auth,
            Some(json!({ "webhookURL": "http://example.test/hook" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let record = f.store.get_by_token("tok-a").await.unwrap().unwrap();
        assert_eq!(record.webhook, "http://example.test/hook");

        let (_, body) = call(&f.app, "GET", "/webhook", &auth, None).await;
        assert_eq!(body["webhook"], "http://example.test/hook");
        assert_eq!(body["subscribe"], json!(["All"]));

        let (status, _) = call(
            &f.app,
            "POST",
            "/webhook",
            &auth,
            Some(json!({ "webhookURL": "ftp://nope" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = call(
            &f.app,
            "POST",
            "/webhook",
            &auth,
            Some(json!({ "webhookURL": "http://" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let record = f.store.get_by_token("tok-a").await.unwrap().unwrap();
        assert_eq!(record.webhook, "http://example.test/hook");
    }

    #[tokio::test]
    async fn qr_returns_pending_code() {
        let f = fixture();
        let (_, created) = create(&f.app, "alice", "tok-a").await;
        let id = wagate_common::TenantId(created["id"].as_i64().unwrap());
        let auth = [("token", "tok-a")];

        let (status, _) = call(&f.app, "GET", "/session/qr", &auth, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        f.store
            .set_pairing_code(id, "data:image/png;base64,AAAA")
            .await
            .unwrap();
        let (status, body) = call(&f.app, "GET", "/session/qr", &auth, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["qrcode"], "data:image/png;base64,AAAA");
    }

    #[tokio::test]
    async fn delete_tenant_tears_down_session() {
        let f = fixture();
        let (_, created) = create(&f.app, "alice", "tok-a").await;
        let id = wagate_common::TenantId(created["id"].as_i64().unwrap());
        call(&f.app, "POST", "/session/connect", &[("token", "tok-a")], None).await;
        f.factory.wait_for(id).await;

        let admin = [("authorization", "admin")];
        let (status, _) = call(&f.app, "DELETE", "/admin/users/tok-a", &admin, None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(f.state.supervisor.registry().is_empty());
        assert!(f.store.get_by_token("tok-a").await.unwrap().is_none());

        let (status, _) = call(&f.app, "DELETE", "/admin/users/tok-a", &admin, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = call(
            &f.app,
            "GET",
            "/session/status",
            &[("token", "tok-a")],
            None,
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }
}
