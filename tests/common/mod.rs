#![allow(dead_code)]

use async_trait::async_trait;
use reqwest::{header, Client, StatusCode};
use sea_orm::{
    sea_query::Expr, ColumnTrait, ConnectOptions, Database, DatabaseConnection, EntityTrait,
    QueryFilter,
};
use serde_json::{json, Value};
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, Mutex,
};

use storefront::api::create_api_router;
use storefront::config::AppConfig;
use storefront::entities::{
    order::{self, PaymentStatus, Status},
    product, setup_schema,
};
use storefront::integrations::{
    payment::verify_signature, GatewayError, GatewayOrder, GatewayRefund, IdentityError,
    IdentityVerifier, MailError, Mailer, OutboundEmail, PaymentGateway, VerifiedIdentity,
};
use storefront::services::{
    accounts,
    catalog::{self, NewCategory, NewProduct, ProductVariants},
};
use storefront::AppState;

pub const GATEWAY_KEY_ID: &str = "rzp_test_key";
pub const GATEWAY_SECRET: &str = "rzp_test_secret";
pub const GOOGLE_TOKEN: &str = "valid-google-token";

#[derive(Default)]
pub struct FakeGateway {
    orders: AtomicUsize,
    pub refunds: Mutex<Vec<(String, Option<i64>)>>,
}

#[async_trait]
impl PaymentGateway for FakeGateway {
    fn key_id(&self) -> &str {
        GATEWAY_KEY_ID
    }

    fn currency(&self) -> &str {
        "INR"
    }

    async fn create_order(
        &self,
        amount_minor: i64,
        _receipt: &str,
        _notes: Value,
    ) -> Result<GatewayOrder, GatewayError> {
        let n = self.orders.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(GatewayOrder {
            id: format!("order_test{n}"),
            amount: amount_minor,
            currency: "INR".into(),
        })
    }

    fn verify_payment_signature(
        &self,
        order_id: &str,
        payment_id: &str,
        signature: &str,
    ) -> Result<(), GatewayError> {
        verify_signature(GATEWAY_SECRET, order_id, payment_id, signature)
    }

    async fn refund(
        &self,
        payment_id: &str,
        amount_minor: Option<i64>,
    ) -> Result<GatewayRefund, GatewayError> {
        let mut refunds = self.refunds.lock().unwrap();
        refunds.push((payment_id.to_owned(), amount_minor));
        Ok(GatewayRefund {
            id: format!("rfnd_test{}", refunds.len()),
            payment_id: payment_id.to_owned(),
            amount: amount_minor.unwrap_or_default(),
        })
    }
}

#[derive(Default)]
pub struct RecordingMailer {
    pub sent: Mutex<Vec<OutboundEmail>>,
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, email: OutboundEmail) -> Result<(), MailError> {
        self.sent.lock().unwrap().push(email);
        Ok(())
    }
}

pub struct FakeIdentity;

#[async_trait]
impl IdentityVerifier for FakeIdentity {
    async fn verify(&self, id_token: &str) -> Result<VerifiedIdentity, IdentityError> {
        if id_token == GOOGLE_TOKEN {
            Ok(VerifiedIdentity {
                email: "google.user@example.com".into(),
                given_name: "Meera".into(),
                family_name: "Iyer".into(),
            })
        } else {
            Err(IdentityError::InvalidToken)
        }
    }
}

pub struct TestApp {
    pub addr: String,
    pub client: Client,
    pub db: Arc<DatabaseConnection>,
    pub gateway: Arc<FakeGateway>,
    pub mailer: Arc<RecordingMailer>,
}

pub async fn spawn_app() -> TestApp {
    spawn_app_with(&[]).await
}

/// Starts the full router on an ephemeral port over a fresh SQLite file.
pub async fn spawn_app_with(overrides: &[(&str, &str)]) -> TestApp {
    let path = std::env::temp_dir().join(format!(
        "storefront-test-{}.db",
        uuid::Uuid::new_v4().simple()
    ));
    let database_url = format!("sqlite://{}?mode=rwc", path.display());

    let config = AppConfig::from_lookup(|key| {
        if let Some((_, value)) = overrides.iter().find(|(k, _)| *k == key) {
            return Some(value.to_string());
        }
        match key {
            "DATABASE_URL" => Some(database_url.clone()),
            "JWT_SECRET" => Some("integration-test-secret".into()),
            "GATEWAY_KEY_ID" => Some(GATEWAY_KEY_ID.into()),
            "GATEWAY_KEY_SECRET" => Some(GATEWAY_SECRET.into()),
            _ => None,
        }
    })
    .expect("Failed to build config");

    let mut options = ConnectOptions::new(config.database_url.clone());
    options.max_connections(1).sqlx_logging(false);
    let db = Database::connect(options)
        .await
        .expect("Failed to connect to database");
    setup_schema(&db).await.expect("Failed to set up schema");
    let db = Arc::new(db);

    let gateway = Arc::new(FakeGateway::default());
    let mailer = Arc::new(RecordingMailer::default());
    let state = AppState {
        db: db.clone(),
        config: Arc::new(config),
        gateway: gateway.clone(),
        mailer: mailer.clone(),
        identity: Arc::new(FakeIdentity),
    };

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind test listener");
    let addr = listener.local_addr().expect("No local address").to_string();
    let app = create_api_router(state);
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("Test server failed");
    });

    TestApp {
        addr,
        client: Client::new(),
        db,
        gateway,
        mailer,
    }
}

pub fn bearer(token: &str) -> header::HeaderMap {
    let mut headers = header::HeaderMap::new();
    headers.insert(
        header::AUTHORIZATION,
        header::HeaderValue::from_str(&format!("Bearer {}", token))
            .expect("Failed to create Authorization header"),
    );
    headers
}

pub fn shipping() -> Value {
    json!({
        "shipping_name": "Asha Rao",
        "shipping_email": "asha@example.com",
        "shipping_phone": "9876543210",
        "shipping_address": "12 MG Road",
        "shipping_city": "Pune",
        "shipping_state": "MH",
        "shipping_zip_code": "411001"
    })
}

pub fn sign(order_id: &str, payment_id: &str) -> String {
    storefront::integrations::payment::payment_signature(GATEWAY_SECRET, order_id, payment_id)
}

impl TestApp {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}/api{}", self.addr, path)
    }

    pub async fn get_json(&self, path: &str, token: Option<&str>) -> (StatusCode, Value) {
        let mut request = self.client.get(self.url(path));
        if let Some(token) = token {
            request = request.headers(bearer(token));
        }
        let response = request.send().await.expect("Failed to send request");
        let status = response.status();
        let body = response.json::<Value>().await.unwrap_or(Value::Null);
        (status, body)
    }

    pub async fn post_json(&self, path: &str, token: Option<&str>, body: Value) -> (StatusCode, Value) {
        let mut request = self.client.post(self.url(path)).json(&body);
        if let Some(token) = token {
            request = request.headers(bearer(token));
        }
        let response = request.send().await.expect("Failed to send request");
        let status = response.status();
        let body = response.json::<Value>().await.unwrap_or(Value::Null);
        (status, body)
    }

    /// Registers a user and returns `(access, refresh)`.
    pub async fn register(&self, email: &str) -> (String, String) {
        let (status, body) = self
            .post_json(
                "/accounts/register",
                None,
                json!({ "email": email, "password": "password123", "first_name": "Test" }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "register failed: {body}");
        (
            body["tokens"]["access"].as_str().expect("No access token").to_owned(),
            body["tokens"]["refresh"].as_str().expect("No refresh token").to_owned(),
        )
    }

    pub async fn admin_token(&self) -> String {
        accounts::create_admin(&self.db, "admin@example.com", "adminpass123")
            .await
            .expect("Failed to create admin");
        let (status, body) = self
            .post_json(
                "/accounts/login",
                None,
                json!({ "email": "admin@example.com", "password": "adminpass123" }),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        body["tokens"]["access"].as_str().expect("No access token").to_owned()
    }

    pub async fn seed_category(&self, name: &str) -> i32 {
        catalog::create_category(
            &*self.db,
            NewCategory {
                name: name.into(),
                description: None,
            },
        )
        .await
        .expect("Failed to create category")
        .id
    }

    pub async fn seed_product(&self, category_id: i32, name: &str, price: &str, stock: i32) -> i32 {
        self.seed_product_with(category_id, name, price, stock, ProductVariants::default())
            .await
    }

    pub async fn seed_product_with(
        &self,
        category_id: i32,
        name: &str,
        price: &str,
        stock: i32,
        variants: ProductVariants,
    ) -> i32 {
        catalog::create_product(
            &*self.db,
            NewProduct {
                name: name.into(),
                category_id,
                price: price.parse().expect("Bad price"),
                original_price: None,
                description: format!("{name} description"),
                stock,
                is_active: None,
                variants,
            },
        )
        .await
        .expect("Failed to create product")
        .summary
        .id
    }

    pub async fn add_to_cart(&self, token: &str, product_id: i32, quantity: i32) -> (StatusCode, Value) {
        self.post_json(
            "/cart/add_item",
            Some(token),
            json!({ "product_id": product_id, "quantity": quantity }),
        )
        .await
    }

    pub async fn product(&self, id: i32) -> product::Model {
        product::Entity::find_by_id(id)
            .one(&*self.db)
            .await
            .expect("Product lookup failed")
            .expect("Product missing")
    }

    /// Moves an order straight to the given state, as the back office would
    /// over several steps.
    pub async fn force_order_state(&self, order_id: i32, status: Status, payment_status: PaymentStatus) {
        order::Entity::update_many()
            .col_expr(order::Column::Status, Expr::value(status))
            .col_expr(order::Column::PaymentStatus, Expr::value(payment_status))
            .filter(order::Column::Id.eq(order_id))
            .exec(&*self.db)
            .await
            .expect("Failed to force order state");
    }
}
