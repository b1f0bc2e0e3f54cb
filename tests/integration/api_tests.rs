//! API integration tests
//!
//! Run against a live server seeded with the administrator from
//! `ADMIN_EMAIL` / `ADMIN_PASSWORD`:
//! `cargo test --test api_tests -- --ignored --test-threads=1`
//! (raise `rate_limit.burst_size` first; the auth routes are throttled)

use reqwest::{Client, StatusCode};
use serde_json::{json, Value};

const BASE_URL: &str = "http://localhost:8080/api/v1";

fn admin_credentials() -> (String, String) {
    (
        std::env::var("ADMIN_EMAIL").unwrap_or_else(|_| "admin@librarium.local".to_string()),
        std::env::var("ADMIN_PASSWORD").unwrap_or_else(|_| "change-me-now".to_string()),
    )
}

/// Helper to get an admin access token
async fn get_auth_token(client: &Client) -> String {
    let (email, password) = admin_credentials();
    let response = client
        .post(format!("{}/auth/login", BASE_URL))
        .json(&json!({ "email": email, "password": password }))
        .send()
        .await
        .expect("Failed to send login request");

    assert!(response.status().is_success(), "admin login failed");
    let body: Value = response.json().await.expect("Failed to parse login response");
    body["access_token"].as_str().expect("No token in response").to_string()
}

fn unique_suffix() -> String {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("clock before epoch")
        .as_nanos();
    format!("{:x}", nanos)
}

async fn create_item(client: &Client, token: &str) -> Value {
    let response = client
        .post(format!("{}/items", BASE_URL))
        .bearer_auth(token)
        .json(&json!({
            "unique_item_id": format!("IT-{}", unique_suffix()),
            "title": "Integration Test Book",
            "item_type": "BOOK",
            "metadata": { "author": "Test Author" }
        }))
        .send()
        .await
        .expect("Failed to send request");

    assert_eq!(response.status(), StatusCode::CREATED);
    response.json().await.expect("Failed to parse response")
}

#[tokio::test]
#[ignore] // Run with: cargo test -- --ignored
async fn test_health_check() {
    let client = Client::new();

    let response = client
        .get(format!("{}/health", BASE_URL))
        .send()
        .await
        .expect("Failed to send request");

    assert!(response.status().is_success());

    let body: Value = response.json().await.expect("Failed to parse response");
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
#[ignore]
async fn test_login() {
    let client = Client::new();
    let (email, password) = admin_credentials();

    let response = client
        .post(format!("{}/auth/login", BASE_URL))
        .json(&json!({ "email": email, "password": password }))
        .send()
        .await
        .expect("Failed to send request");

    assert!(response.status().is_success());
    assert!(response.headers().get("set-cookie").is_some());

    let body: Value = response.json().await.expect("Failed to parse response");
    assert!(body["access_token"].is_string());
    assert!(body["refresh_token"].is_string());
    assert_eq!(body["token_type"], "Bearer");
    assert_eq!(body["user"]["role"], "ADMIN");
    assert!(body["user"]["password"].is_null());
}

#[tokio::test]
#[ignore]
async fn test_login_invalid_credentials() {
    let client = Client::new();

    let response = client
        .post(format!("{}/auth/login", BASE_URL))
        .json(&json!({
            "email": "nobody@librarium.local",
            "password": "wrongpassword"
        }))
        .send()
        .await
        .expect("Failed to send request");

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body: Value = response.json().await.expect("Failed to parse response");
    assert_eq!(body["error"], "NotAuthorized");
    assert_eq!(body["code"], 2);
}

#[tokio::test]
#[ignore]
async fn test_register_requires_verification() {
    let client = Client::new();
    let email = format!("student-{}@librarium.local", unique_suffix());

    let response = client
        .post(format!("{}/auth/register", BASE_URL))
        .json(&json!({
            "email": email,
            "name": "New Student",
            "password": "studentpass1"
        }))
        .send()
        .await
        .expect("Failed to send request");

    assert_eq!(response.status(), StatusCode::CREATED);
    let body: Value = response.json().await.expect("Failed to parse response");
    assert_eq!(body["role"], "STUDENT");
    assert_eq!(body["is_verified"], false);

    // Unverified accounts cannot sign in
    let response = client
        .post(format!("{}/auth/login", BASE_URL))
        .json(&json!({ "email": email, "password": "studentpass1" }))
        .send()
        .await
        .expect("Failed to send request");
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    // Registering the same email again conflicts
    let response = client
        .post(format!("{}/auth/register", BASE_URL))
        .json(&json!({
            "email": email.to_uppercase(),
            "name": "Duplicate",
            "password": "studentpass1"
        }))
        .send()
        .await
        .expect("Failed to send request");
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
#[ignore]
async fn test_register_rejects_staff_role() {
    let client = Client::new();

    let response = client
        .post(format!("{}/auth/register", BASE_URL))
        .json(&json!({
            "email": format!("sneaky-{}@librarium.local", unique_suffix()),
            "name": "Sneaky",
            "password": "sneakypass1",
            "role": "ADMIN"
        }))
        .send()
        .await
        .expect("Failed to send request");

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
#[ignore]
async fn test_forgot_password_does_not_leak_accounts() {
    let client = Client::new();

    let response = client
        .post(format!("{}/auth/forgot-password", BASE_URL))
        .json(&json!({ "email": "ghost@librarium.local" }))
        .send()
        .await
        .expect("Failed to send request");

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
#[ignore]
async fn test_refresh_token_rotation() {
    let client = Client::new();
    let (email, password) = admin_credentials();

    let login: Value = client
        .post(format!("{}/auth/login", BASE_URL))
        .json(&json!({ "email": email, "password": password }))
        .send()
        .await
        .expect("Failed to send request")
        .json()
        .await
        .expect("Failed to parse response");
    let refresh = login["refresh_token"].as_str().expect("No refresh token").to_string();

    let response = client
        .post(format!("{}/auth/refresh-token", BASE_URL))
        .json(&json!({ "refresh_token": refresh }))
        .send()
        .await
        .expect("Failed to send request");
    assert!(response.status().is_success());

    // The old refresh token is single use
    let response = client
        .post(format!("{}/auth/refresh-token", BASE_URL))
        .json(&json!({ "refresh_token": refresh }))
        .send()
        .await
        .expect("Failed to send request");
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
#[ignore]
async fn test_get_current_user() {
    let client = Client::new();
    let token = get_auth_token(&client).await;

    let response = client
        .get(format!("{}/auth/me", BASE_URL))
        .bearer_auth(&token)
        .send()
        .await
        .expect("Failed to send request");

    assert!(response.status().is_success());

    let body: Value = response.json().await.expect("Failed to parse response");
    assert_eq!(body["role"], "ADMIN");
}

#[tokio::test]
#[ignore]
async fn test_unauthorized_access() {
    let client = Client::new();

    let response = client
        .get(format!("{}/loans/my", BASE_URL))
        .send()
        .await
        .expect("Failed to send request");

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
#[ignore]
async fn test_list_items() {
    let client = Client::new();
    let token = get_auth_token(&client).await;

    let response = client
        .get(format!("{}/items?page=1&per_page=10", BASE_URL))
        .bearer_auth(&token)
        .send()
        .await
        .expect("Failed to send request");

    assert!(response.status().is_success());

    let body: Value = response.json().await.expect("Failed to parse response");
    assert!(body["items"].is_array());
    assert!(body["total"].is_number());
    assert_eq!(body["page"], 1);
}

#[tokio::test]
#[ignore]
async fn test_create_and_delete_item() {
    let client = Client::new();
    let token = get_auth_token(&client).await;

    let item = create_item(&client, &token).await;
    assert_eq!(item["status"], "AVAILABLE");
    let item_id = item["id"].as_i64().expect("No item ID");

    let response = client
        .delete(format!("{}/items/{}", BASE_URL, item_id))
        .bearer_auth(&token)
        .send()
        .await
        .expect("Failed to send request");
    assert!(response.status().is_success());

    let response = client
        .get(format!("{}/items/{}", BASE_URL, item_id))
        .bearer_auth(&token)
        .send()
        .await
        .expect("Failed to send request");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
#[ignore]
async fn test_loan_lifecycle() {
    let client = Client::new();
    let token = get_auth_token(&client).await;
    let item = create_item(&client, &token).await;
    let item_id = item["id"].as_i64().expect("No item ID");

    // Borrow
    let response = client
        .post(format!("{}/loans", BASE_URL))
        .bearer_auth(&token)
        .json(&json!({ "item_id": item_id }))
        .send()
        .await
        .expect("Failed to send request");
    assert_eq!(response.status(), StatusCode::CREATED);
    let loan: Value = response.json().await.expect("Failed to parse response");
    let loan_id = loan["id"].as_i64().expect("No loan ID");
    assert_eq!(loan["status"], "BORROWED");

    // A second borrow of the same copy is refused
    let response = client
        .post(format!("{}/loans", BASE_URL))
        .bearer_auth(&token)
        .json(&json!({ "item_id": item_id }))
        .send()
        .await
        .expect("Failed to send request");
    assert_eq!(response.status(), StatusCode::CONFLICT);

    // Items on loan cannot be deleted
    let response = client
        .delete(format!("{}/items/{}", BASE_URL, item_id))
        .bearer_auth(&token)
        .send()
        .await
        .expect("Failed to send request");
    assert_eq!(response.status(), StatusCode::CONFLICT);

    // Renew
    let response = client
        .post(format!("{}/loans/{}/renew", BASE_URL, loan_id))
        .bearer_auth(&token)
        .send()
        .await
        .expect("Failed to send request");
    assert!(response.status().is_success());
    let renewed: Value = response.json().await.expect("Failed to parse response");
    assert_eq!(renewed["renew_count"], 1);

    // Return
    let response = client
        .post(format!("{}/loans/{}/return", BASE_URL, loan_id))
        .bearer_auth(&token)
        .send()
        .await
        .expect("Failed to send request");
    assert!(response.status().is_success());
    let returned: Value = response.json().await.expect("Failed to parse response");
    assert_eq!(returned["status"], "RETURNED");

    // Returning twice is an invalid transition
    let response = client
        .post(format!("{}/loans/{}/return", BASE_URL, loan_id))
        .bearer_auth(&token)
        .send()
        .await
        .expect("Failed to send request");
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let item: Value = client
        .get(format!("{}/items/{}", BASE_URL, item_id))
        .bearer_auth(&token)
        .send()
        .await
        .expect("Failed to send request")
        .json()
        .await
        .expect("Failed to parse response");
    assert_eq!(item["status"], "AVAILABLE");
}

#[tokio::test]
#[ignore]
async fn test_reservation_cancel() {
    let client = Client::new();
    let token = get_auth_token(&client).await;
    let item = create_item(&client, &token).await;
    let item_id = item["id"].as_i64().expect("No item ID");

    let response = client
        .post(format!("{}/reservations", BASE_URL))
        .bearer_auth(&token)
        .json(&json!({ "item_id": item_id }))
        .send()
        .await
        .expect("Failed to send request");
    assert_eq!(response.status(), StatusCode::CREATED);
    let reservation: Value = response.json().await.expect("Failed to parse response");
    let reservation_id = reservation["id"].as_i64().expect("No reservation ID");
    assert_eq!(reservation["status"], "PENDING");

    // One pending reservation per user and item
    let response = client
        .post(format!("{}/reservations", BASE_URL))
        .bearer_auth(&token)
        .json(&json!({ "item_id": item_id }))
        .send()
        .await
        .expect("Failed to send request");
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let response = client
        .post(format!("{}/reservations/{}/cancel", BASE_URL, reservation_id))
        .bearer_auth(&token)
        .send()
        .await
        .expect("Failed to send request");
    assert!(response.status().is_success());
    let cancelled: Value = response.json().await.expect("Failed to parse response");
    assert_eq!(cancelled["status"], "CANCELLED");

    // Cancelled is terminal
    let response = client
        .post(format!("{}/reservations/{}/approve", BASE_URL, reservation_id))
        .bearer_auth(&token)
        .send()
        .await
        .expect("Failed to send request");
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
#[ignore]
async fn test_reservation_approve_creates_loan() {
    let client = Client::new();
    let token = get_auth_token(&client).await;
    let item = create_item(&client, &token).await;
    let item_id = item["id"].as_i64().expect("No item ID");

    let reservation: Value = client
        .post(format!("{}/reservations", BASE_URL))
        .bearer_auth(&token)
        .json(&json!({ "item_id": item_id }))
        .send()
        .await
        .expect("Failed to send request")
        .json()
        .await
        .expect("Failed to parse response");
    let reservation_id = reservation["id"].as_i64().expect("No reservation ID");

    let response = client
        .post(format!("{}/reservations/{}/approve", BASE_URL, reservation_id))
        .bearer_auth(&token)
        .send()
        .await
        .expect("Failed to send request");
    assert_eq!(response.status(), StatusCode::OK);
    let fulfilled: Value = response.json().await.expect("Failed to parse response");
    assert_eq!(fulfilled["status"], "FULFILLED");
    let loan_id = fulfilled["loan_id"].as_i64().expect("No loan ID");

    let loan: Value = client
        .get(format!("{}/loans/{}", BASE_URL, loan_id))
        .bearer_auth(&token)
        .send()
        .await
        .expect("Failed to send request")
        .json()
        .await
        .expect("Failed to parse response");
    assert_eq!(loan["status"], "BORROWED");
    assert_eq!(loan["item_id"], item_id);
    let loan_date = chrono::DateTime::parse_from_rfc3339(loan["loan_date"].as_str().expect("No loan date"))
        .expect("Invalid loan date");
    let due_date = chrono::DateTime::parse_from_rfc3339(loan["due_date"].as_str().expect("No due date"))
        .expect("Invalid due date");
    // default loan period
    assert_eq!((due_date - loan_date).num_days(), 14);

    let item: Value = client
        .get(format!("{}/items/{}", BASE_URL, item_id))
        .bearer_auth(&token)
        .send()
        .await
        .expect("Failed to send request")
        .json()
        .await
        .expect("Failed to parse response");
    assert_eq!(item["status"], "BORROWED");

    // Fulfilled is terminal
    let response = client
        .post(format!("{}/reservations/{}/approve", BASE_URL, reservation_id))
        .bearer_auth(&token)
        .send()
        .await
        .expect("Failed to send request");
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let response = client
        .post(format!("{}/loans/{}/return", BASE_URL, loan_id))
        .bearer_auth(&token)
        .send()
        .await
        .expect("Failed to send request");
    assert!(response.status().is_success());
}

async fn current_user_id(client: &Client, token: &str) -> i64 {
    let me: Value = client
        .get(format!("{}/auth/me", BASE_URL))
        .bearer_auth(token)
        .send()
        .await
        .expect("Failed to send request")
        .json()
        .await
        .expect("Failed to parse response");
    me["id"].as_i64().expect("No user ID")
}

async fn create_fine(client: &Client, token: &str, user_id: i64) -> i64 {
    let response = client
        .post(format!("{}/fines", BASE_URL))
        .bearer_auth(token)
        .json(&json!({ "user_id": user_id, "amount": "0.50", "reason": "Damaged barcode label" }))
        .send()
        .await
        .expect("Failed to send request");
    assert_eq!(response.status(), StatusCode::CREATED);
    let fine: Value = response.json().await.expect("Failed to parse response");
    assert_eq!(fine["status"], "PENDING");
    fine["id"].as_i64().expect("No fine ID")
}

#[tokio::test]
#[ignore]
async fn test_paid_fine_is_terminal() {
    let client = Client::new();
    let token = get_auth_token(&client).await;
    let user_id = current_user_id(&client, &token).await;
    let fine_id = create_fine(&client, &token, user_id).await;

    let response = client
        .post(format!("{}/fines/{}/pay", BASE_URL, fine_id))
        .bearer_auth(&token)
        .send()
        .await
        .expect("Failed to send request");
    assert_eq!(response.status(), StatusCode::OK);
    let paid: Value = response.json().await.expect("Failed to parse response");
    assert_eq!(paid["status"], "PAID");
    assert!(paid["paid_at"].is_string());

    let response = client
        .post(format!("{}/fines/{}/pay", BASE_URL, fine_id))
        .bearer_auth(&token)
        .send()
        .await
        .expect("Failed to send request");
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let body: Value = response.json().await.expect("Failed to parse response");
    assert_eq!(body["error"], "InvalidTransition");

    let response = client
        .post(format!("{}/fines/{}/waive", BASE_URL, fine_id))
        .bearer_auth(&token)
        .send()
        .await
        .expect("Failed to send request");
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
#[ignore]
async fn test_waived_fine_records_staff_and_cannot_be_deleted() {
    let client = Client::new();
    let token = get_auth_token(&client).await;
    let user_id = current_user_id(&client, &token).await;
    let fine_id = create_fine(&client, &token, user_id).await;

    let response = client
        .post(format!("{}/fines/{}/waive", BASE_URL, fine_id))
        .bearer_auth(&token)
        .json(&json!({ "reason": "First offence" }))
        .send()
        .await
        .expect("Failed to send request");
    assert_eq!(response.status(), StatusCode::OK);
    let waived: Value = response.json().await.expect("Failed to parse response");
    assert_eq!(waived["status"], "WAIVED");
    assert_eq!(waived["waived_by"], user_id);
    assert!(waived["waived_at"].is_string());
    assert!(waived["reason"].as_str().unwrap_or_default().contains("First offence"));

    let response = client
        .delete(format!("{}/fines/{}", BASE_URL, fine_id))
        .bearer_auth(&token)
        .send()
        .await
        .expect("Failed to send request");
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let response = client
        .post(format!("{}/fines/{}/pay", BASE_URL, fine_id))
        .bearer_auth(&token)
        .send()
        .await
        .expect("Failed to send request");
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
#[ignore]
async fn test_calculate_overdue_is_idempotent() {
    let client = Client::new();
    let token = get_auth_token(&client).await;

    let first = client
        .post(format!("{}/fines/calculate-overdue", BASE_URL))
        .bearer_auth(&token)
        .send()
        .await
        .expect("Failed to send request");
    assert!(first.status().is_success());

    let second: Value = client
        .post(format!("{}/fines/calculate-overdue", BASE_URL))
        .bearer_auth(&token)
        .send()
        .await
        .expect("Failed to send request")
        .json()
        .await
        .expect("Failed to parse response");
    assert_eq!(second["created"], 0);
}

#[tokio::test]
#[ignore]
async fn test_my_fines() {
    let client = Client::new();
    let token = get_auth_token(&client).await;

    let response = client
        .get(format!("{}/fines/my", BASE_URL))
        .bearer_auth(&token)
        .send()
        .await
        .expect("Failed to send request");

    assert!(response.status().is_success());
    let body: Value = response.json().await.expect("Failed to parse response");
    assert!(body["fines"].is_array());
    assert!(body["totals"]["pending"].is_string());
}

#[tokio::test]
#[ignore]
async fn test_list_users() {
    let client = Client::new();
    let token = get_auth_token(&client).await;

    let response = client
        .get(format!("{}/users", BASE_URL))
        .bearer_auth(&token)
        .send()
        .await
        .expect("Failed to send request");

    assert!(response.status().is_success());

    let body: Value = response.json().await.expect("Failed to parse response");
    assert!(body["items"].is_array());
}

#[tokio::test]
#[ignore]
async fn test_get_stats() {
    let client = Client::new();
    let token = get_auth_token(&client).await;

    let response = client
        .get(format!("{}/stats", BASE_URL))
        .bearer_auth(&token)
        .send()
        .await
        .expect("Failed to send request");

    assert!(response.status().is_success());

    let body: Value = response.json().await.expect("Failed to parse response");
    assert!(body["items"]["total"].is_number());
    assert!(body["loans"]["overdue"].is_number());
    assert!(body["fines"]["pending_total"].is_string());
}
