use actix_web::{web, HttpResponse};
use serde::Serialize;
use serde_json::Value;

use super::{ok, ApiError};
use crate::domain::customer::parse_customer_id;
use crate::domain::loyalty::{validate_add_points, LoyaltyAccount, LoyaltyService};
use crate::domain::{Page, PageRequest, Pagination};

// ============================================================================
// Loyalty Ledger Routes
// ============================================================================
//
// There is no route to create or delete an account: that only happens in
// reaction to customer events.
//
// ============================================================================

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/loyalty")
            .route("", web::get().to(list_accounts))
            .route("/customer/{customer_id}", web::get().to(get_points))
            .route("/customer/{customer_id}/add-points", web::post().to(add_points)),
    );
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LoyaltyPage {
    loyalty_points: Vec<LoyaltyAccount>,
    pagination: Pagination,
}

async fn list_accounts(
    service: web::Data<LoyaltyService>,
    query: web::Query<PageRequest>,
) -> Result<HttpResponse, ApiError> {
    let page = service.list(Page::from_request(&query)).await?;
    Ok(ok(LoyaltyPage {
        loyalty_points: page.items,
        pagination: page.pagination,
    }))
}

async fn get_points(
    service: web::Data<LoyaltyService>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let customer_id = parse_customer_id(&path)?;
    Ok(ok(service.get_points(customer_id).await?))
}

async fn add_points(
    service: web::Data<LoyaltyService>,
    path: web::Path<String>,
    body: web::Json<Value>,
) -> Result<HttpResponse, ApiError> {
    let customer_id = parse_customer_id(&path)?;
    let amount = validate_add_points(&body)?;
    Ok(ok(service.add_points(customer_id, amount).await?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{json_config, not_found};
    use crate::domain::customer::CustomerId;
    use crate::domain::loyalty::{InMemoryLedgerStore, LedgerStore};
    use actix_web::http::StatusCode;
    use actix_web::{test, App};
    use serde_json::json;
    use std::sync::Arc;

    async fn ledger_with(accounts: &[(i64, i64)]) -> Arc<InMemoryLedgerStore> {
        let ledger = Arc::new(InMemoryLedgerStore::new());
        for (id, points) in accounts {
            ledger.create(CustomerId(*id), *points).await.unwrap();
        }
        ledger
    }

    macro_rules! app {
        ($ledger:expr) => {
            test::init_service(
                App::new()
                    .app_data(web::Data::new(LoyaltyService::new($ledger)))
                    .app_data(json_config())
                    .configure(configure)
                    .default_service(web::to(not_found)),
            )
            .await
        };
    }

    #[actix_web::test]
    async fn test_add_points_returns_new_balance() {
        let app = app!(ledger_with(&[(1, 1)]).await);

        let req = test::TestRequest::post()
            .uri("/api/loyalty/customer/1/add-points")
            .set_json(json!({ "points": 5 }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["data"]["customer_id"], 1);
        assert_eq!(body["data"]["points"], 6);
    }

    #[actix_web::test]
    async fn test_add_points_to_unenrolled_customer_is_404() {
        let ledger = ledger_with(&[]).await;
        let app = app!(ledger.clone());

        let req = test::TestRequest::post()
            .uri("/api/loyalty/customer/2/add-points")
            .set_json(json!({ "points": 5 }))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NOT_FOUND);
        assert!(ledger.is_empty().await);
    }

    #[actix_web::test]
    async fn test_add_points_validates_amount_and_id() {
        let app = app!(ledger_with(&[(1, 1)]).await);

        for (uri, body) in [
            ("/api/loyalty/customer/1/add-points", json!({ "points": 0 })),
            ("/api/loyalty/customer/1/add-points", json!({ "points": 1001 })),
            ("/api/loyalty/customer/1/add-points", json!({ "points": 1.5 })),
            ("/api/loyalty/customer/0/add-points", json!({ "points": 5 })),
            ("/api/loyalty/customer/x/add-points", json!({ "points": 5 })),
        ] {
            let req = test::TestRequest::post().uri(uri).set_json(body).to_request();
            assert_eq!(
                test::call_service(&app, req).await.status(),
                StatusCode::BAD_REQUEST,
                "{uri}"
            );
        }
    }

    #[actix_web::test]
    async fn test_get_points_and_list() {
        let app = app!(ledger_with(&[(1, 3), (2, 10)]).await);

        let req = test::TestRequest::get().uri("/api/loyalty/customer/1").to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["data"]["points"], 3);

        let req = test::TestRequest::get().uri("/api/loyalty/customer/9").to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NOT_FOUND);

        let req = test::TestRequest::get().uri("/api/loyalty").to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["data"]["loyaltyPoints"][0]["customer_id"], 2);
        assert_eq!(body["data"]["pagination"]["total"], 2);
    }
}
