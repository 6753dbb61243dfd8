//! API integration tests
//!
//! They run against a live server with a migrated database and an activated
//! administrator whose credentials come from `BIBLIOTECA_TEST_ADMIN_LOGIN`
//! and `BIBLIOTECA_TEST_ADMIN_PASSWORD`.

use reqwest::{multipart, redirect, Client, StatusCode};
use serde_json::{json, Value};

const BASE_URL: &str = "http://localhost:8080/api/v1";

fn admin_credentials() -> (String, String) {
    (
        std::env::var("BIBLIOTECA_TEST_ADMIN_LOGIN").unwrap_or_else(|_| "ADMIN-0001".to_string()),
        std::env::var("BIBLIOTECA_TEST_ADMIN_PASSWORD").unwrap_or_else(|_| "admin-password".to_string()),
    )
}

/// Unique suffix so repeated runs do not collide on matricula or ISBN
fn unique() -> String {
    chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default().to_string()
}

async fn login(client: &Client, login: &str, password: &str) -> String {
    let response = client
        .post(format!("{}/auth/login", BASE_URL))
        .json(&json!({ "login": login, "password": password }))
        .send()
        .await
        .expect("Failed to send login request");

    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.expect("Failed to parse login response");
    body["token"].as_str().expect("No token in response").to_string()
}

async fn admin_token(client: &Client) -> String {
    let (user, password) = admin_credentials();
    login(client, &user, &password).await
}

/// Create a user through the admin API and activate it; returns (id, token)
async fn activated_user(client: &Client, admin: &str, role: &str) -> (i64, String) {
    let suffix = unique();
    let matricula = format!("U-{}", &suffix[suffix.len() - 12..]);
    let email = format!("user{}@example.org", suffix);

    let created: Value = client
        .post(format!("{}/users", BASE_URL))
        .bearer_auth(admin)
        .json(&json!({ "matricula": matricula, "role": role }))
        .send()
        .await
        .expect("Failed to create user")
        .json()
        .await
        .expect("Failed to parse user");

    let id = created["id"].as_i64().expect("No user id");
    let path = created["activation_path"].as_str().expect("No activation path");
    let token = path.rsplit('/').next().expect("No token in path").to_string();

    let activated: Value = client
        .post(format!("{}/auth/activate/{}", BASE_URL, token))
        .json(&json!({
            "name": "Integration User",
            "email": email,
            "password": "integration-password",
            "password_confirmation": "integration-password"
        }))
        .send()
        .await
        .expect("Failed to activate")
        .json()
        .await
        .expect("Failed to parse activation");

    (id, activated["token"].as_str().expect("No token").to_string())
}

async fn activated_reader(client: &Client, admin: &str) -> (i64, String) {
    activated_user(client, admin, "reader_public").await
}

/// Upload a credential as the reader and have `verifier` check it
async fn verified_reader_by(client: &Client, admin: &str, verifier: &str) -> i64 {
    let (id, token) = activated_reader(client, admin).await;

    let form = multipart::Form::new().part(
        "file",
        multipart::Part::bytes(b"%PDF-1.4 credential".to_vec()).file_name("credential.pdf"),
    );
    let response = client
        .post(format!("{}/me/credential", BASE_URL))
        .bearer_auth(&token)
        .multipart(form)
        .send()
        .await
        .expect("Failed to upload credential");
    assert_eq!(response.status(), StatusCode::OK);

    let response = client
        .post(format!("{}/users/{}/verify-credential", BASE_URL, id))
        .bearer_auth(verifier)
        .send()
        .await
        .expect("Failed to verify credential");
    assert_eq!(response.status(), StatusCode::OK);

    id
}

async fn verified_reader(client: &Client, admin: &str) -> i64 {
    verified_reader_by(client, admin, admin).await
}

async fn get_json(client: &Client, token: &str, path: &str) -> Value {
    let response = client
        .get(format!("{}{}", BASE_URL, path))
        .bearer_auth(token)
        .send()
        .await
        .expect("Failed to send request");
    assert_eq!(response.status(), StatusCode::OK);
    response.json().await.expect("Failed to parse response")
}

async fn approve_and_collect(client: &Client, staff: &str, reservation_id: i64) -> Value {
    let response = client
        .post(format!("{}/reservations/{}/approve", BASE_URL, reservation_id))
        .bearer_auth(staff)
        .send()
        .await
        .expect("Failed to approve");
    assert_eq!(response.status(), StatusCode::OK);

    let response = client
        .post(format!("{}/reservations/{}/collect", BASE_URL, reservation_id))
        .bearer_auth(staff)
        .json(&json!({ "left_credential": true }))
        .send()
        .await
        .expect("Failed to collect");
    assert_eq!(response.status(), StatusCode::CREATED);
    response.json().await.expect("Failed to parse loan")
}

async fn create_book(client: &Client, admin: &str, quantity: i32) -> i64 {
    let suffix = unique();
    let isbn = format!("978{}", &suffix[suffix.len() - 10..]);

    let response = client
        .post(format!("{}/books", BASE_URL))
        .bearer_auth(admin)
        .json(&json!({ "title": format!("Libro {}", suffix), "isbn": isbn, "quantity": quantity }))
        .send()
        .await
        .expect("Failed to create book");
    assert_eq!(response.status(), StatusCode::CREATED);

    let body: Value = response.json().await.expect("Failed to parse book");
    body["id"].as_i64().expect("No book id")
}

async fn reserve_for(client: &Client, admin: &str, user_id: i64, book_id: i64) -> Value {
    let planned = (chrono::Utc::now() + chrono::Duration::days(10)).date_naive();
    client
        .post(format!("{}/reservations", BASE_URL))
        .bearer_auth(admin)
        .json(&json!({ "book_id": book_id, "user_id": user_id, "planned_return_date": planned }))
        .send()
        .await
        .expect("Failed to reserve")
        .json()
        .await
        .expect("Failed to parse reservation")
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
async fn test_login_returns_landing_route() {
    let client = Client::new();
    let (user, password) = admin_credentials();

    let response = client
        .post(format!("{}/auth/login", BASE_URL))
        .json(&json!({ "login": user, "password": password }))
        .send()
        .await
        .expect("Failed to send request");

    assert!(response.status().is_success());

    let body: Value = response.json().await.expect("Failed to parse response");
    assert!(body["token"].is_string());
    assert_eq!(body["token_type"], "Bearer");
    assert_eq!(body["landing_route"], "/admin/dashboard");
}

#[tokio::test]
#[ignore]
async fn test_login_invalid_credentials() {
    let client = Client::new();
    let (user, _) = admin_credentials();

    let response = client
        .post(format!("{}/auth/login", BASE_URL))
        .json(&json!({ "login": user, "password": "wrong" }))
        .send()
        .await
        .expect("Failed to send request");

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
#[ignore]
async fn test_repeated_failures_lock_the_login() {
    let client = Client::new();
    let login = format!("nobody{}@example.org", unique());

    for _ in 0..5 {
        let response = client
            .post(format!("{}/auth/login", BASE_URL))
            .json(&json!({ "login": login, "password": "wrong" }))
            .send()
            .await
            .expect("Failed to send request");
        assert_ne!(response.status(), StatusCode::OK);
    }

    let response = client
        .post(format!("{}/auth/login", BASE_URL))
        .json(&json!({ "login": login, "password": "wrong" }))
        .send()
        .await
        .expect("Failed to send request");

    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(response.headers().contains_key("retry-after"));
}

#[tokio::test]
#[ignore]
async fn test_used_activation_link_redirects_to_login() {
    let client = Client::builder()
        .redirect(redirect::Policy::none())
        .build()
        .expect("Failed to build client");
    let admin = admin_token(&client).await;
    let suffix = unique();

    let created: Value = client
        .post(format!("{}/users", BASE_URL))
        .bearer_auth(&admin)
        .json(&json!({ "matricula": format!("L-{}", &suffix[suffix.len() - 12..]), "role": "librarian" }))
        .send()
        .await
        .expect("Failed to create user")
        .json()
        .await
        .expect("Failed to parse user");
    let token = created["activation_path"]
        .as_str()
        .and_then(|p| p.rsplit('/').next())
        .expect("No token")
        .to_string();

    let pending: Value = client
        .get(format!("{}/auth/activate/{}", BASE_URL, token))
        .send()
        .await
        .expect("Failed to open link")
        .json()
        .await
        .expect("Failed to parse activation info");
    assert_eq!(pending["role"], "librarian");

    let activated: Value = client
        .post(format!("{}/auth/activate/{}", BASE_URL, token))
        .json(&json!({
            "name": "Nueva Bibliotecaria",
            "email": format!("lib{}@example.org", unique()),
            "password": "librarian-password",
            "password_confirmation": "librarian-password"
        }))
        .send()
        .await
        .expect("Failed to activate")
        .json()
        .await
        .expect("Failed to parse activation");
    assert_eq!(activated["landing_route"], "/librarian/dashboard");

    let reused = client
        .get(format!("{}/auth/activate/{}", BASE_URL, token))
        .send()
        .await
        .expect("Failed to reopen link");
    assert_eq!(reused.status(), StatusCode::SEE_OTHER);
    assert_eq!(reused.headers()["location"], "/login");

    let unknown = client
        .get(format!("{}/auth/activate/{}", BASE_URL, "x".repeat(32)))
        .send()
        .await
        .expect("Failed to open link");
    assert_eq!(unknown.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
#[ignore]
async fn test_concurrent_approvals_hold_a_single_copy_once() {
    let client = Client::new();
    let admin = admin_token(&client).await;

    let book_id = create_book(&client, &admin, 1).await;
    let first_reader = verified_reader(&client, &admin).await;
    let second_reader = verified_reader(&client, &admin).await;

    let first = reserve_for(&client, &admin, first_reader, book_id).await;
    let second = reserve_for(&client, &admin, second_reader, book_id).await;
    assert_eq!(first["status"], "pending");
    assert_eq!(second["status"], "pending");

    let approve = |id: i64| {
        client
            .post(format!("{}/reservations/{}/approve", BASE_URL, id))
            .bearer_auth(&admin)
            .send()
    };
    let (a, b) = tokio::join!(
        approve(first["id"].as_i64().expect("No id")),
        approve(second["id"].as_i64().expect("No id"))
    );
    let mut statuses = vec![a.expect("Request failed").status(), b.expect("Request failed").status()];
    statuses.sort();

    assert_eq!(statuses, vec![StatusCode::OK, StatusCode::CONFLICT]);

    let inventory: Value = client
        .get(format!("{}/inventory/{}", BASE_URL, book_id))
        .bearer_auth(&admin)
        .send()
        .await
        .expect("Failed to fetch inventory")
        .json()
        .await
        .expect("Failed to parse inventory");
    assert_eq!(inventory["available"], 0);
    assert_eq!(inventory["on_hold"], 1);
    assert_eq!(inventory["status"], "reservado");
}

#[tokio::test]
#[ignore]
async fn test_rejected_reservation_cannot_be_approved() {
    let client = Client::new();
    let admin = admin_token(&client).await;

    let book_id = create_book(&client, &admin, 2).await;
    let reader = verified_reader(&client, &admin).await;
    let reservation = reserve_for(&client, &admin, reader, book_id).await;
    let id = reservation["id"].as_i64().expect("No id");

    let response = client
        .post(format!("{}/reservations/{}/reject", BASE_URL, id))
        .bearer_auth(&admin)
        .send()
        .await
        .expect("Failed to reject");
    assert_eq!(response.status(), StatusCode::OK);

    let response = client
        .post(format!("{}/reservations/{}/approve", BASE_URL, id))
        .bearer_auth(&admin)
        .send()
        .await
        .expect("Failed to approve");
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
#[ignore]
async fn test_collected_reservation_becomes_a_linked_loan() {
    let client = Client::new();
    let admin = admin_token(&client).await;

    let book_id = create_book(&client, &admin, 1).await;
    let reader = verified_reader(&client, &admin).await;
    let reservation = reserve_for(&client, &admin, reader, book_id).await;
    let id = reservation["id"].as_i64().expect("No id");

    let loan = approve_and_collect(&client, &admin, id).await;
    assert_eq!(loan["reservation_id"], id);
    assert_eq!(loan["status"], "active");
    assert_eq!(loan["left_credential"], true);

    let reservation = get_json(&client, &admin, &format!("/reservations/{}", id)).await;
    assert_eq!(reservation["status"], "approved");
    assert_eq!(reservation["collection_status"], "collected");
    assert_eq!(reservation["loan_id"], loan["id"]);

    let inventory = get_json(&client, &admin, &format!("/inventory/{}", book_id)).await;
    assert_eq!(inventory["on_loan"], 1);
    assert_eq!(inventory["on_hold"], 0);
    assert_eq!(inventory["status"], "prestado");
}

#[tokio::test]
#[ignore]
async fn test_deleting_staff_keeps_their_records_unattributed() {
    let client = Client::new();
    let admin = admin_token(&client).await;
    let (librarian_id, librarian) = activated_user(&client, &admin, "librarian").await;

    let book_id = create_book(&client, &admin, 1).await;
    let reader = verified_reader_by(&client, &admin, &librarian).await;
    let reservation = reserve_for(&client, &admin, reader, book_id).await;
    let id = reservation["id"].as_i64().expect("No id");

    let loan = approve_and_collect(&client, &librarian, id).await;
    assert_eq!(loan["librarian_id"], librarian_id);

    let response = client
        .delete(format!("{}/users/{}", BASE_URL, librarian_id))
        .bearer_auth(&admin)
        .send()
        .await
        .expect("Failed to delete user");
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let reservation = get_json(&client, &admin, &format!("/reservations/{}", id)).await;
    assert!(reservation["approved_by"].is_null());

    let loan = get_json(&client, &admin, &format!("/loans/{}", loan["id"])).await;
    assert!(loan["librarian_id"].is_null());
    assert_eq!(loan["reservation_id"], id);

    let reader = get_json(&client, &admin, &format!("/users/{}", reader)).await;
    assert!(reader["verified_by"].is_null());
    assert!(reader["credential_verified_at"].is_string());
}

#[tokio::test]
#[ignore]
async fn test_one_open_reservation_per_reader_and_book() {
    let client = Client::new();
    let admin = admin_token(&client).await;

    let book_id = create_book(&client, &admin, 3).await;
    let reader = verified_reader(&client, &admin).await;
    let first = reserve_for(&client, &admin, reader, book_id).await;
    assert_eq!(first["status"], "pending");

    let planned = (chrono::Utc::now() + chrono::Duration::days(10)).date_naive();
    let response = client
        .post(format!("{}/reservations", BASE_URL))
        .bearer_auth(&admin)
        .json(&json!({ "book_id": book_id, "user_id": reader, "planned_return_date": planned }))
        .send()
        .await
        .expect("Failed to reserve");
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let response = client
        .post(format!("{}/reservations/{}/cancel", BASE_URL, first["id"]))
        .bearer_auth(&admin)
        .send()
        .await
        .expect("Failed to cancel");
    assert_eq!(response.status(), StatusCode::OK);

    let again = reserve_for(&client, &admin, reader, book_id).await;
    assert_eq!(again["status"], "pending");
}

#[tokio::test]
#[ignore]
async fn test_past_planned_return_date_is_a_field_error() {
    let client = Client::new();
    let admin = admin_token(&client).await;

    let book_id = create_book(&client, &admin, 1).await;
    let reader = verified_reader(&client, &admin).await;
    let yesterday = (chrono::Utc::now() - chrono::Duration::days(1)).date_naive();

    let response = client
        .post(format!("{}/reservations", BASE_URL))
        .bearer_auth(&admin)
        .json(&json!({ "book_id": book_id, "user_id": reader, "planned_return_date": yesterday }))
        .send()
        .await
        .expect("Failed to send request");
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let body: Value = response.json().await.expect("Failed to parse error");
    assert!(body["fields"]["planned_return_date"].is_array());
}

#[tokio::test]
#[ignore]
async fn test_deleting_a_book_removes_its_reservations() {
    let client = Client::new();
    let admin = admin_token(&client).await;

    let book_id = create_book(&client, &admin, 1).await;
    let reader = verified_reader(&client, &admin).await;
    let reservation = reserve_for(&client, &admin, reader, book_id).await;

    let response = client
        .delete(format!("{}/books/{}", BASE_URL, book_id))
        .bearer_auth(&admin)
        .send()
        .await
        .expect("Failed to delete book");
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = client
        .get(format!("{}/reservations/{}", BASE_URL, reservation["id"]))
        .bearer_auth(&admin)
        .send()
        .await
        .expect("Failed to fetch reservation");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
#[ignore]
async fn test_quick_create_returns_existing_term() {
    let client = Client::new();
    let admin = admin_token(&client).await;
    let name = format!("Ensayo {}", unique());

    let first = client
        .post(format!("{}/genres/quick", BASE_URL))
        .bearer_auth(&admin)
        .json(&json!({ "name": name }))
        .send()
        .await
        .expect("Failed to quick-create");
    assert_eq!(first.status(), StatusCode::CREATED);
    let first: Value = first.json().await.expect("Failed to parse term");

    let second = client
        .post(format!("{}/genres/quick", BASE_URL))
        .bearer_auth(&admin)
        .json(&json!({ "name": name.to_uppercase() }))
        .send()
        .await
        .expect("Failed to quick-create");
    assert_eq!(second.status(), StatusCode::OK);
    let second: Value = second.json().await.expect("Failed to parse term");

    assert_eq!(first["id"], second["id"]);
    assert_eq!(second["created"], false);
}

#[tokio::test]
#[ignore]
async fn test_readers_cannot_reach_staff_routes() {
    let client = Client::new();
    let admin = admin_token(&client).await;
    let (_, reader) = activated_reader(&client, &admin).await;

    let response = client
        .get(format!("{}/loans", BASE_URL))
        .bearer_auth(&reader)
        .send()
        .await
        .expect("Failed to send request");
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = client
        .get(format!("{}/me/loans", BASE_URL))
        .bearer_auth(&reader)
        .send()
        .await
        .expect("Failed to send request");
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
#[ignore]
async fn test_csv_report_is_a_download() {
    let client = Client::new();
    let admin = admin_token(&client).await;

    let response = client
        .get(format!("{}/reports/loans?format=csv", BASE_URL))
        .bearer_auth(&admin)
        .send()
        .await
        .expect("Failed to send request");

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers()["content-type"]
        .to_str()
        .unwrap()
        .starts_with("text/csv"));
    assert!(response.headers()["content-disposition"]
        .to_str()
        .unwrap()
        .contains("loans_"));
}
