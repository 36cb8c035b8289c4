#![allow(dead_code)]

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tokio::sync::OnceCell;
use tower::ServiceExt;
use uuid::Uuid;

use sunglasses::app::auth::AuthService;
use sunglasses::config::AppConfig;
use sunglasses::infra::{db::Db, storage::ObjectStorage};
use sunglasses::AppState;

pub const DEFAULT_PASSWORD: &str = "testpassword123";

// ---------------------------------------------------------------------------
// TestApp, shared and lazily initialized once per test binary
// ---------------------------------------------------------------------------

pub struct TestApp {
    router: Router,
    pub state: AppState,
}

pub struct TestResponse {
    pub status: StatusCode,
    body_bytes: bytes::Bytes,
}

impl TestResponse {
    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.body_bytes).unwrap_or(Value::Null)
    }

    pub fn error_message(&self) -> String {
        self.json()["error"].as_str().unwrap_or("").to_string()
    }
}

pub struct TestUser {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub access_token: String,
}

static TEST_APP: OnceCell<TestApp> = OnceCell::const_new();

/// Get (or lazily create) the shared TestApp instance.
///
/// Returns `None` when `TEST_DATABASE_BASE_URL` is not set, so suites that
/// need Postgres skip instead of failing on machines without one.
pub async fn app() -> Option<&'static TestApp> {
    let base_url = match std::env::var("TEST_DATABASE_BASE_URL") {
        Ok(url) if !url.trim().is_empty() => url,
        _ => {
            eprintln!("TEST_DATABASE_BASE_URL not set, skipping database test");
            return None;
        }
    };

    Some(
        TEST_APP
            .get_or_init(|| async { TestApp::setup(base_url).await })
            .await,
    )
}

impl TestApp {
    async fn setup(base_url: String) -> Self {
        let test_db = std::env::var("TEST_DATABASE_NAME")
            .unwrap_or_else(|_| "sunglasses_test".into());
        let s3_endpoint = std::env::var("TEST_S3_ENDPOINT")
            .unwrap_or_else(|_| "http://localhost:4566".into());

        // ---- Create test database if needed ----
        let admin_pool = PgPool::connect(&format!("{}/postgres", base_url))
            .await
            .expect("cannot connect to postgres admin database");

        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM pg_database WHERE datname = $1)")
                .bind(&test_db)
                .fetch_one(&admin_pool)
                .await
                .expect("failed to check test db existence");

        if !exists {
            // CREATE DATABASE cannot run inside a transaction
            sqlx::query(&format!("CREATE DATABASE \"{}\"", test_db))
                .execute(&admin_pool)
                .await
                .expect("failed to create test database");
        }
        admin_pool.close().await;

        // ---- Connect to test database ----
        let database_url = format!("{}/{}", base_url, test_db);
        let db_pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(&database_url)
            .await
            .expect("cannot connect to test database");

        // ---- Run migrations ----
        let mut migration_files: Vec<_> = std::fs::read_dir("migrations")
            .expect("cannot read migrations/")
            .filter_map(Result::ok)
            .filter(|e| e.path().extension().map_or(false, |ext| ext == "sql"))
            .collect();
        migration_files.sort_by_key(|e| e.file_name());

        for entry in &migration_files {
            let sql = std::fs::read_to_string(entry.path())
                .unwrap_or_else(|_| panic!("cannot read {:?}", entry.path()));
            sqlx::raw_sql(&sql)
                .execute(&db_pool)
                .await
                .unwrap_or_else(|e| panic!("migration {:?} failed: {}", entry.file_name(), e));
        }

        // ---- Truncate all tables for clean test state ----
        sqlx::raw_sql(
            "DO $$ DECLARE r RECORD; BEGIN \
             FOR r IN (SELECT tablename FROM pg_tables WHERE schemaname = 'public') LOOP \
             EXECUTE 'TRUNCATE TABLE ' || quote_ident(r.tablename) || ' CASCADE'; \
             END LOOP; END $$;",
        )
        .execute(&db_pool)
        .await
        .expect("failed to truncate tables");

        db_pool.close().await;

        // ---- Build AppState via AppConfig (same code path as production) ----
        std::env::set_var("DATABASE_URL", &database_url);
        std::env::set_var("S3_ENDPOINT", &s3_endpoint);
        std::env::set_var("S3_BUCKET", "sunglasses-media-test");
        std::env::set_var("S3_REGION", "us-east-1");
        std::env::set_var("DB_MAX_CONNECTIONS", "10");
        std::env::set_var("DB_CONNECT_TIMEOUT_SECONDS", "30");
        // Each #[tokio::test] runs its own runtime while the pool is shared
        // through the OnceCell, so idle connections must not be reused.
        std::env::set_var("DB_IDLE_TIMEOUT_SECONDS", "0");
        std::env::set_var("AWS_ACCESS_KEY_ID", "test");
        std::env::set_var("AWS_SECRET_ACCESS_KEY", "test");
        std::env::set_var("AWS_DEFAULT_REGION", "us-east-1");

        let config = AppConfig::from_env().expect("failed to build AppConfig");

        let db = Db::connect(&config).await.expect("Db::connect failed");
        let storage = ObjectStorage::new(&config)
            .await
            .expect("ObjectStorage::new failed");

        let state = AppState::new(&config, db, storage);
        let router = sunglasses::http::router(state.clone());

        TestApp { router, state }
    }

    // ------------------------------------------------------------------
    // Low-level request helper
    // ------------------------------------------------------------------
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
        token: Option<&str>,
    ) -> TestResponse {
        let mut builder = Request::builder()
            .method(method)
            .uri(path)
            .header("host", "localhost");

        if let Some(token) = token {
            builder = builder.header("Authorization", format!("Bearer {}", token));
        }

        let request = if let Some(body) = body {
            builder
                .header("content-type", "application/json")
                .body(Body::from(serde_json::to_string(&body).unwrap()))
                .unwrap()
        } else {
            builder.body(Body::empty()).unwrap()
        };

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("oneshot failed");

        let status = response.status();
        let body_bytes = response
            .into_body()
            .collect()
            .await
            .expect("failed to collect body")
            .to_bytes();

        TestResponse { status, body_bytes }
    }

    // ------------------------------------------------------------------
    // Convenience HTTP helpers
    // ------------------------------------------------------------------
    pub async fn get(&self, path: &str, token: Option<&str>) -> TestResponse {
        self.request(Method::GET, path, None, token).await
    }

    pub async fn post_json(&self, path: &str, body: Value, token: Option<&str>) -> TestResponse {
        self.request(Method::POST, path, Some(body), token).await
    }

    pub async fn post_empty(&self, path: &str, token: Option<&str>) -> TestResponse {
        self.request(Method::POST, path, None, token).await
    }

    pub async fn put_json(&self, path: &str, body: Value, token: Option<&str>) -> TestResponse {
        self.request(Method::PUT, path, Some(body), token).await
    }

    pub async fn patch_json(&self, path: &str, body: Value, token: Option<&str>) -> TestResponse {
        self.request(Method::PATCH, path, Some(body), token).await
    }

    pub async fn delete(&self, path: &str, token: Option<&str>) -> TestResponse {
        self.request(Method::DELETE, path, None, token).await
    }

    // ------------------------------------------------------------------
    // Test data helpers
    // ------------------------------------------------------------------

    /// Sign a user up through AuthService and issue an access token.
    pub async fn create_user(&self, suffix: &str) -> TestUser {
        let unique = &Uuid::new_v4().simple().to_string()[..8];
        let username = format!("{}_{}", suffix, unique);
        let email = format!("{}_{}@example.com", suffix, unique);

        let auth_service = AuthService::new(self.state.db.clone(), self.state.token_ttl_hours);
        let user = auth_service
            .signup(
                username.clone(),
                email.clone(),
                format!("Test User {}", suffix),
                DEFAULT_PASSWORD.to_string(),
            )
            .await
            .expect("signup failed");
        let token = auth_service
            .issue_token(user.id)
            .await
            .expect("issue_token failed");

        TestUser {
            id: user.id,
            username,
            email,
            access_token: token.token,
        }
    }

    /// `follower` follows `followee` through the API.
    pub async fn follow(&self, follower: &TestUser, followee: &TestUser) {
        let resp = self
            .post_empty(
                &format!("/users/{}/follow", followee.id),
                Some(&follower.access_token),
            )
            .await;
        assert_eq!(resp.status, StatusCode::NO_CONTENT, "follow failed");
    }

    /// Create a status post with the given privacy. Returns the post id.
    pub async fn create_status(
        &self,
        author: &TestUser,
        privacy_type: i64,
        privacy_users: &[Uuid],
    ) -> Uuid {
        let users: Vec<String> = privacy_users.iter().map(Uuid::to_string).collect();
        let resp = self
            .post_json(
                "/posts",
                json!({
                    "post_type": "status",
                    "text": "hello world",
                    "privacy_type": privacy_type,
                    "privacy_users": users,
                }),
                Some(&author.access_token),
            )
            .await;
        assert_eq!(resp.status, StatusCode::CREATED, "create post failed");
        resp.json()["id"]
            .as_str()
            .and_then(|id| Uuid::parse_str(id).ok())
            .expect("post id missing")
    }

    /// Insert a media record directly in DB (bypasses the S3 upload). Returns media id.
    pub async fn create_media(&self, owner_id: Uuid) -> Uuid {
        let media_id = Uuid::new_v4();
        sqlx::query(
            "INSERT INTO media (id, owner_id, original_key, thumb_key, url, thumbnail_url, width, height, bytes) \
             VALUES ($1, $2, $3, $4, $5, $6, 640, 480, 1024)",
        )
        .bind(media_id)
        .bind(owner_id)
        .bind(format!("test/{}/original.jpg", media_id))
        .bind(format!("test/{}/thumb.jpg", media_id))
        .bind(format!("http://localhost/test/{}/original.jpg", media_id))
        .bind(format!("http://localhost/test/{}/thumb.jpg", media_id))
        .execute(self.pool())
        .await
        .expect("insert test media failed");
        media_id
    }

    /// Return the pool for direct DB assertions.
    pub fn pool(&self) -> &PgPool {
        self.state.db.pool()
    }
}
