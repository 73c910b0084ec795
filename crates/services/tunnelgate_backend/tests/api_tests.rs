use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use chrono::{DateTime, Duration, Utc};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use tower::ServiceExt;
use tunnelgate_backend::{app, AppState};
use tunnelgate_common::services::{
    AccountStatus, BoxFuture, ConnectionDescriptor, PaymentCreated, PaymentInfo, PaymentIntent, PaymentState,
    RemoteAccount, Settlement,
};
use tunnelgate_common::{external_service_error, not_found, PaymentGateway, TunnelgateError, VpnProvisioner};
use tunnelgate_config::{AppConfig, PanelConfig, PaymentConfig, PlanConfig, ServerConfig};
use tunnelgate_payment::webhook::{parse_settlement, sign};

const WEBHOOK_SECRET: &str = "whsec_test";

// --- Fakes ---

#[derive(Default)]
struct FakePanel {
    accounts: Mutex<HashMap<String, RemoteAccount>>,
    creates: Mutex<u32>,
    extends: Mutex<Vec<(String, DateTime<Utc>)>>,
    unreachable: bool,
}

impl FakePanel {
    fn with_account(username: &str, expire: Option<DateTime<Utc>>) -> Self {
        let panel = FakePanel::default();
        panel.accounts.lock().unwrap().insert(
            username.to_string(),
            RemoteAccount {
                username: username.to_string(),
                proxy_id: Some("5f0c9a52-8a4e-4b43-9a36-0c2f6b5e1d11".to_string()),
                status: AccountStatus::Active,
                data_limit: None,
                used_traffic: 0,
                expire,
            },
        );
        panel
    }

    fn unreachable() -> Self {
        FakePanel {
            unreachable: true,
            ..FakePanel::default()
        }
    }

    fn lookup(&self, username: &str) -> Result<RemoteAccount, TunnelgateError> {
        if self.unreachable {
            return Err(external_service_error("Panel", "connection refused"));
        }
        self.accounts
            .lock()
            .unwrap()
            .get(username)
            .cloned()
            .ok_or_else(|| not_found(format!("Panel user '{}' not found", username)))
    }
}

impl VpnProvisioner for FakePanel {
    fn get_user(&self, username: &str) -> BoxFuture<'_, RemoteAccount, TunnelgateError> {
        let result = self.lookup(username);
        Box::pin(async move { result })
    }

    fn user_exists(&self, username: &str) -> Pin<Box<dyn Future<Output = bool> + Send + '_>> {
        let exists = self.lookup(username).is_ok();
        Box::pin(async move { exists })
    }

    fn get_or_create_user(
        &self,
        username: &str,
        data_limit: u64,
        expire: Option<DateTime<Utc>>,
    ) -> BoxFuture<'_, RemoteAccount, TunnelgateError> {
        let username = username.to_string();
        Box::pin(async move {
            if let Ok(account) = self.lookup(&username) {
                return Ok(account);
            }
            *self.creates.lock().unwrap() += 1;
            let account = RemoteAccount {
                username: username.clone(),
                proxy_id: Some("new-id".to_string()),
                status: AccountStatus::Active,
                data_limit: Some(data_limit).filter(|l| *l > 0),
                used_traffic: 0,
                expire,
            };
            self.accounts.lock().unwrap().insert(username, account.clone());
            Ok(account)
        })
    }

    fn extend_subscription(
        &self,
        username: &str,
        new_expire: DateTime<Utc>,
    ) -> BoxFuture<'_, RemoteAccount, TunnelgateError> {
        let username = username.to_string();
        Box::pin(async move {
            let mut account = self.lookup(&username)?;
            account.expire = Some(new_expire);
            account.status = AccountStatus::Active;
            self.extends.lock().unwrap().push((username.clone(), new_expire));
            self.accounts.lock().unwrap().insert(username, account.clone());
            Ok(account)
        })
    }

    fn connection_descriptor(
        &self,
        username: &str,
        host: &str,
        port: u16,
    ) -> BoxFuture<'_, ConnectionDescriptor, TunnelgateError> {
        let result = self.lookup(username).map(|account| ConnectionDescriptor {
            uri: format!(
                "vless://{}@{}:{}#{}",
                account.proxy_id.unwrap_or_default(),
                host,
                port,
                account.username
            ),
            qr_code: "data:image/png;base64,AAAA".to_string(),
        });
        Box::pin(async move { result })
    }
}

#[derive(Default)]
struct FakeGateway {
    intents: Mutex<Vec<PaymentIntent>>,
}

impl PaymentGateway for FakeGateway {
    fn create_payment(&self, intent: PaymentIntent) -> BoxFuture<'_, PaymentCreated, TunnelgateError> {
        self.intents.lock().unwrap().push(intent);
        Box::pin(async move {
            Ok(PaymentCreated {
                id: "pay_1".to_string(),
                status: PaymentState::Pending,
                redirect_url: Some("https://pay.example.com/confirm/pay_1".to_string()),
            })
        })
    }

    fn get_payment_status(&self, payment_id: &str) -> BoxFuture<'_, PaymentInfo, TunnelgateError> {
        let result = if payment_id == "pay_1" {
            Ok(PaymentInfo {
                id: payment_id.to_string(),
                status: PaymentState::Succeeded,
                amount: Some(500),
                currency: Some("USD".to_string()),
                metadata: HashMap::new(),
            })
        } else {
            Err(not_found(format!("payment {} not found", payment_id)))
        };
        Box::pin(async move { result })
    }

    fn parse_webhook(&self, raw_body: &[u8], signature: Option<&str>) -> Result<Settlement, TunnelgateError> {
        Ok(parse_settlement(raw_body, signature, WEBHOOK_SECRET)?)
    }
}

// --- Helpers ---

fn config() -> Arc<AppConfig> {
    Arc::new(AppConfig {
        server: ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 8080,
        },
        use_panel: true,
        use_payment: true,
        panel: Some(PanelConfig {
            url: "https://panel.example.com".to_string(),
            username: "admin".to_string(),
            password: "pw".to_string(),
            request_timeout_secs: 30,
            max_attempts: 3,
            retry_base_delay_ms: 1000,
            token_lifetime_secs: 23 * 60 * 60,
            vless_host: Some("vpn.example.com".to_string()),
            vless_port: 443,
            default_data_limit: 0,
            inbound_tag: "VLESS TCP REALITY".to_string(),
        }),
        payment: Some(PaymentConfig {
            api_url: "https://pay.example.com".to_string(),
            api_key: "shop-1".to_string(),
            api_secret: "secret".to_string(),
            webhook_secret: WEBHOOK_SECRET.to_string(),
            default_currency: Some("USD".to_string()),
            return_url: Some("https://example.com/done".to_string()),
            request_timeout_secs: 30,
            plans: vec![PlanConfig {
                id: "month".to_string(),
                duration_days: 30,
                unit_amount: 500,
                currency: None,
                data_limit: Some(50 * 1024 * 1024 * 1024),
            }],
        }),
    })
}

fn router(panel: Arc<FakePanel>, gateway: Arc<FakeGateway>) -> Router {
    let state = AppState::with_services(config(), Some(panel), Some(gateway));
    app(Arc::new(state))
}

fn settlement_body(status: &str) -> Vec<u8> {
    serde_json::to_vec(&json!({
        "event": format!("payment.{}", status),
        "payment_id": "pay_1",
        "status": status,
        "amount": 500,
        "currency": "USD",
        "metadata": {"user_id": "42", "plan": "month"}
    }))
    .unwrap()
}

fn webhook_request(body: Vec<u8>, signature: Option<String>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/api/payment/webhook")
        .header("Content-Type", "application/json");
    if let Some(signature) = signature {
        builder = builder.header("X-Signature", signature);
    }
    builder.body(Body::from(body)).unwrap()
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

// --- Tests ---

#[tokio::test]
async fn test_health_reports_enabled_integrations() {
    let app = router(Arc::new(FakePanel::default()), Arc::new(FakeGateway::default()));
    let request = Request::builder().uri("/api/health").body(Body::empty()).unwrap();

    let (status, body) = send(app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"status": "ok", "panel": true, "payment": true}));
}

#[tokio::test]
async fn test_webhook_with_forged_signature_is_rejected_untouched() {
    let panel = Arc::new(FakePanel::default());
    let app = router(panel.clone(), Arc::new(FakeGateway::default()));
    let body = settlement_body("succeeded");
    let forged = sign(&body, "not-the-secret").unwrap();

    let (status, response) = send(app, webhook_request(body, Some(forged))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(response["error"]["code"], 401);
    assert_eq!(*panel.creates.lock().unwrap(), 0);
    assert!(panel.extends.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_webhook_without_signature_is_rejected() {
    let app = router(Arc::new(FakePanel::default()), Arc::new(FakeGateway::default()));
    let (status, _) = send(app, webhook_request(settlement_body("succeeded"), None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_webhook_provisions_missing_user() {
    let panel = Arc::new(FakePanel::default());
    let app = router(panel.clone(), Arc::new(FakeGateway::default()));
    let body = settlement_body("succeeded");
    let signature = sign(&body, WEBHOOK_SECRET).unwrap();

    let before = Utc::now();
    let (status, response) = send(app, webhook_request(body, Some(signature))).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(response["outcome"], "created");
    assert_eq!(response["username"], "user_42");
    assert_eq!(*panel.creates.lock().unwrap(), 1);

    let accounts = panel.accounts.lock().unwrap();
    let account = accounts.get("user_42").unwrap();
    let expire = account.expire.unwrap();
    assert!(expire >= before + Duration::days(30));
    assert!(expire <= Utc::now() + Duration::days(30));
    assert_eq!(account.data_limit, Some(50 * 1024 * 1024 * 1024));
}

#[tokio::test]
async fn test_webhook_extends_existing_user_from_current_expiry() {
    let current = Utc::now() + Duration::days(10);
    let panel = Arc::new(FakePanel::with_account("user_42", Some(current)));
    let app = router(panel.clone(), Arc::new(FakeGateway::default()));
    let body = settlement_body("succeeded");
    let signature = sign(&body, WEBHOOK_SECRET).unwrap();

    let (status, response) = send(app, webhook_request(body, Some(signature))).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(response["outcome"], "extended");
    assert_eq!(*panel.creates.lock().unwrap(), 0);
    let extends = panel.extends.lock().unwrap();
    assert_eq!(extends.len(), 1);
    assert_eq!(extends[0], ("user_42".to_string(), current + Duration::days(30)));
}

#[tokio::test]
async fn test_webhook_ignores_unsuccessful_payment() {
    let panel = Arc::new(FakePanel::default());
    let app = router(panel.clone(), Arc::new(FakeGateway::default()));
    let body = settlement_body("canceled");
    let signature = sign(&body, WEBHOOK_SECRET).unwrap();

    let (status, response) = send(app, webhook_request(body, Some(signature))).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(response["outcome"], "ignored");
    assert_eq!(*panel.creates.lock().unwrap(), 0);
}

#[tokio::test]
async fn test_webhook_surfaces_panel_failure_as_server_error() {
    let panel = Arc::new(FakePanel::unreachable());
    let app = router(panel.clone(), Arc::new(FakeGateway::default()));
    let body = settlement_body("succeeded");
    let signature = sign(&body, WEBHOOK_SECRET).unwrap();

    let (status, _) = send(app, webhook_request(body, Some(signature))).await;

    assert!(status.is_server_error());
    assert_eq!(*panel.creates.lock().unwrap(), 0);
}

#[tokio::test]
async fn test_checkout_uses_plan_price() {
    let gateway = Arc::new(FakeGateway::default());
    let app = router(Arc::new(FakePanel::default()), gateway.clone());
    let request = Request::builder()
        .method("POST")
        .uri("/api/payment/checkout")
        .header("Content-Type", "application/json")
        .body(Body::from(json!({"user_ref": "42", "plan": "month"}).to_string()))
        .unwrap();

    let (status, body) = send(app, request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], "pay_1");
    assert_eq!(body["redirect_url"], "https://pay.example.com/confirm/pay_1");
    let intents = gateway.intents.lock().unwrap();
    assert_eq!(intents.len(), 1);
    assert_eq!(intents[0].amount, 500);
    assert_eq!(intents[0].currency, "USD");
    assert_eq!(intents[0].return_url, "https://example.com/done");
}

#[tokio::test]
async fn test_checkout_rejects_unknown_plan() {
    let gateway = Arc::new(FakeGateway::default());
    let app = router(Arc::new(FakePanel::default()), gateway.clone());
    let request = Request::builder()
        .method("POST")
        .uri("/api/payment/checkout")
        .header("Content-Type", "application/json")
        .body(Body::from(json!({"user_ref": "42", "plan": "lifetime"}).to_string()))
        .unwrap();

    let (status, _) = send(app, request).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(gateway.intents.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_checkout_rejects_user_ref_the_panel_cannot_use() {
    let gateway = Arc::new(FakeGateway::default());
    let app = router(Arc::new(FakePanel::default()), gateway.clone());

    for user_ref in ["john doe".to_string(), "9".repeat(30)] {
        let request = Request::builder()
            .method("POST")
            .uri("/api/payment/checkout")
            .header("Content-Type", "application/json")
            .body(Body::from(json!({"user_ref": user_ref, "plan": "month"}).to_string()))
            .unwrap();

        let (status, body) = send(app.clone(), request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "user_ref {user_ref:?}");
        assert_eq!(body["error"]["code"], 400);
    }
    assert!(gateway.intents.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_redelivered_settlement_is_applied_once() {
    let current = Utc::now() + Duration::days(10);
    let panel = Arc::new(FakePanel::with_account("user_42", Some(current)));
    let app = router(panel.clone(), Arc::new(FakeGateway::default()));
    let body = settlement_body("succeeded");
    let signature = sign(&body, WEBHOOK_SECRET).unwrap();

    let (first, response) = send(app.clone(), webhook_request(body.clone(), Some(signature.clone()))).await;
    assert_eq!(first, StatusCode::OK);
    assert_eq!(response["outcome"], "extended");

    let (second, response) = send(app, webhook_request(body, Some(signature))).await;
    assert_eq!(second, StatusCode::OK);
    assert_eq!(response["outcome"], "ignored");
    assert_eq!(response["payment_id"], "pay_1");

    assert_eq!(panel.extends.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_payment_status_lookup() {
    let app = router(Arc::new(FakePanel::default()), Arc::new(FakeGateway::default()));

    let request = Request::builder().uri("/api/payment/pay_1").body(Body::empty()).unwrap();
    let (status, body) = send(app.clone(), request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "succeeded");

    let request = Request::builder().uri("/api/payment/pay_404").body(Body::empty()).unwrap();
    let (status, _) = send(app, request).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_vpn_config_for_known_and_unknown_user() {
    let panel = Arc::new(FakePanel::with_account("alice", None));
    let app = router(panel, Arc::new(FakeGateway::default()));

    let request = Request::builder().uri("/api/vpn/alice/config").body(Body::empty()).unwrap();
    let (status, body) = send(app.clone(), request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body["uri"],
        "vless://5f0c9a52-8a4e-4b43-9a36-0c2f6b5e1d11@vpn.example.com:443#alice"
    );

    let request = Request::builder().uri("/api/vpn/ghost/config").body(Body::empty()).unwrap();
    let (status, _) = send(app, request).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_disabled_integrations_answer_service_unavailable() {
    let state = AppState::with_services(config(), None, None);
    let app = app(Arc::new(state));

    let (status, _) = send(app.clone(), webhook_request(settlement_body("succeeded"), None)).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

    let request = Request::builder().uri("/api/vpn/alice/config").body(Body::empty()).unwrap();
    let (status, _) = send(app, request).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}
