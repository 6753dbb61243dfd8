//! OpenAPI documentation

use axum::Router;
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

use crate::api::{auth, authors, books, health, inventory, loans, me, reports, reservations, taxonomy, users};

/// Registers the JWT bearer scheme referenced by `bearer_auth`
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi
            .components
            .get_or_insert_with(utoipa::openapi::Components::default);

        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

#[derive(OpenApi)]
#[openapi(
    modifiers(&SecurityAddon),
    info(
        title = "Biblioteca API",
        version = "1.0.0",
        description = "Library catalog, reservations and loans REST API",
        license(name = "AGPL-3.0", url = "https://www.gnu.org/licenses/agpl-3.0.html")
    ),
    servers(
        (url = "/api/v1", description = "API v1")
    ),
    paths(
        // Health
        health::health_check,
        health::readiness_check,
        // Auth
        auth::login,
        auth::me,
        auth::show_activation,
        auth::activate,
        // Users
        users::list_users,
        users::get_user,
        users::create_user,
        users::update_user,
        users::delete_user,
        users::regenerate_activation,
        // Catalog and books
        books::search_catalog,
        books::get_catalog_book,
        books::list_books,
        books::get_book,
        books::create_book,
        books::update_book,
        books::delete_book,
        // Authors
        authors::list_authors,
        authors::get_author,
        authors::create_author,
        authors::update_author,
        authors::delete_author,
        authors::quick_create_author,
        // Categories, publishers, genres
        taxonomy::list_terms,
        taxonomy::get_term,
        taxonomy::create_term,
        taxonomy::update_term,
        taxonomy::delete_term,
        taxonomy::quick_create_term,
        // Inventory
        inventory::get_inventory,
        inventory::update_inventory,
        // Reservations
        reservations::list_reservations,
        reservations::create_reservation,
        reservations::get_reservation,
        reservations::approve_reservation,
        reservations::reject_reservation,
        reservations::cancel_reservation,
        reservations::collect_reservation,
        reservations::not_collected_reservation,
        reservations::expire_reservations,
        reservations::verify_credential,
        // Loans
        loans::list_loans,
        loans::create_loan,
        loans::get_loan,
        loans::return_loan,
        loans::mark_lost,
        loans::mark_overdue,
        loans::sweep_overdue,
        loans::set_fine,
        // Self-service
        me::my_loans,
        me::my_reservations,
        me::upload_credential,
        // Reports
        reports::books_report,
        reports::loans_report,
        reports::reservations_report,
    ),
    components(
        schemas(
            // Auth
            auth::LoginRequest,
            auth::LoginResponse,
            auth::MeResponse,
            crate::models::user::ActivateAccount,
            crate::models::user::ActivationInfo,
            // Users
            crate::models::user::User,
            crate::models::user::UserShort,
            crate::models::user::UserQuery,
            crate::models::user::CreateUser,
            crate::models::user::UpdateUser,
            crate::models::user::UserWithActivation,
            crate::models::enums::Role,
            // Catalog
            crate::models::book::Book,
            crate::models::book::BookDetail,
            crate::models::book::BookShort,
            crate::models::book::BookView,
            crate::models::book::BookQuery,
            crate::models::book::BookSort,
            crate::models::book::BookDetailInput,
            crate::models::book::CreateBook,
            crate::models::book::UpdateBook,
            crate::models::book::NamedRef,
            crate::models::author::Author,
            crate::models::author::AuthorShort,
            crate::models::author::AuthorInput,
            crate::models::taxonomy::TaxonomyKind,
            crate::models::taxonomy::Term,
            crate::models::taxonomy::TermInput,
            crate::models::taxonomy::QuickCreate,
            taxonomy::QuickCreateResponse,
            // Inventory
            crate::models::inventory::Inventory,
            crate::models::inventory::Availability,
            crate::models::inventory::InventoryView,
            crate::models::inventory::UpdateInventory,
            crate::models::enums::InventoryCondition,
            crate::models::enums::InventoryStatus,
            // Reservations
            crate::models::reservation::Reservation,
            crate::models::reservation::ReservationDetails,
            crate::models::reservation::CreateReservation,
            crate::models::reservation::CollectReservation,
            crate::models::enums::ReservationStatus,
            crate::models::enums::CollectionStatus,
            crate::services::reservations::ExpiredHolds,
            reservations::CredentialVerified,
            me::CredentialUpload,
            // Loans
            crate::models::loan::Loan,
            crate::models::loan::LoanDetails,
            crate::models::loan::CreateLoan,
            crate::models::loan::CloseLoan,
            crate::models::loan::SetFine,
            crate::models::enums::LoanStatus,
            crate::services::loans::OverdueSweep,
            // Reports
            crate::models::report::ReportFormat,
            crate::models::report::BookReportRow,
            crate::models::report::LoanReportRow,
            crate::models::report::ReservationReportRow,
            // Health
            health::HealthResponse,
            // Errors
            crate::error::ErrorResponse,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "auth", description = "Login and account activation"),
        (name = "users", description = "User administration"),
        (name = "catalog", description = "Public catalog"),
        (name = "books", description = "Book management"),
        (name = "authors", description = "Author management"),
        (name = "taxonomy", description = "Categories, publishers and genres"),
        (name = "inventory", description = "Stock and availability"),
        (name = "reservations", description = "Reservation workflow"),
        (name = "loans", description = "Loan workflow"),
        (name = "me", description = "Reader self-service"),
        (name = "reports", description = "Report exports")
    )
)]
pub struct ApiDoc;

/// Create the OpenAPI documentation router
pub fn create_openapi_router() -> Router {
    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credential_upload_documents_a_multipart_file() {
        let doc = serde_json::to_value(ApiDoc::openapi()).unwrap();

        let body = &doc["paths"]["/me/credential"]["post"]["requestBody"]["content"]["multipart/form-data"];
        assert!(body["schema"].is_object());
        assert_eq!(
            doc["components"]["schemas"]["CredentialUpload"]["properties"]["file"]["format"],
            "binary"
        );
        assert!(doc["components"]["securitySchemes"]["bearer_auth"].is_object());
    }
}
