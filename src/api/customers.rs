use actix_web::{web, HttpResponse};
use serde::Serialize;

use super::{created, ok, ApiError};
use crate::domain::customer::{
    parse_customer_id, validate_create, validate_update, CreateCustomerRequest, Customer,
    CustomerService, UpdateCustomerRequest,
};
use crate::domain::{Page, PageRequest, Pagination};

// ============================================================================
// Customer Registry Routes
// ============================================================================

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/customers")
            .route("", web::post().to(create_customer))
            .route("", web::get().to(list_customers))
            .route("/{id}", web::get().to(get_customer))
            .route("/{id}", web::put().to(update_customer))
            .route("/{id}", web::delete().to(delete_customer)),
    );
}

#[derive(Serialize)]
struct CustomerPage {
    customers: Vec<Customer>,
    pagination: Pagination,
}

async fn create_customer(
    service: web::Data<CustomerService>,
    body: web::Json<CreateCustomerRequest>,
) -> Result<HttpResponse, ApiError> {
    let customer = validate_create(body.into_inner())?;
    let created_customer = service.create(customer).await?;
    Ok(created(created_customer))
}

async fn list_customers(
    service: web::Data<CustomerService>,
    query: web::Query<PageRequest>,
) -> Result<HttpResponse, ApiError> {
    let page = service.list(Page::from_request(&query)).await?;
    Ok(ok(CustomerPage {
        customers: page.items,
        pagination: page.pagination,
    }))
}

async fn get_customer(
    service: web::Data<CustomerService>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let id = parse_customer_id(&path)?;
    Ok(ok(service.get(id).await?))
}

async fn update_customer(
    service: web::Data<CustomerService>,
    path: web::Path<String>,
    body: web::Json<UpdateCustomerRequest>,
) -> Result<HttpResponse, ApiError> {
    let id = parse_customer_id(&path)?;
    let changes = validate_update(body.into_inner())?;
    Ok(ok(service.update(id, changes).await?))
}

async fn delete_customer(
    service: web::Data<CustomerService>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let id = parse_customer_id(&path)?;
    service.delete(id).await?;
    Ok(ok(serde_json::json!({ "message": "Customer deleted successfully" })))
}
