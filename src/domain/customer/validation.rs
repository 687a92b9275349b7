use super::model::{CreateCustomerRequest, CustomerChanges, CustomerId, NewCustomer, UpdateCustomerRequest};
use crate::domain::ValidationError;

// ============================================================================
// Customer Input Validation
// ============================================================================

const NAME_MIN: usize = 2;
const NAME_MAX: usize = 255;
const EMAIL_MAX: usize = 255;

pub fn validate_create(request: CreateCustomerRequest) -> Result<NewCustomer, ValidationError> {
    let mut details = Vec::new();

    let name = match request.name {
        Some(name) => check_name(&name, &mut details),
        None => {
            details.push("name is required".to_string());
            None
        }
    };

    let email = match request.email {
        Some(email) => check_email(&email, &mut details),
        None => {
            details.push("email is required".to_string());
            None
        }
    };

    match (name, email) {
        (Some(name), Some(email)) if details.is_empty() => Ok(NewCustomer {
            name,
            email,
            fidelity_opt_in: request.fidelity_opt_in.unwrap_or(false),
        }),
        _ => Err(ValidationError::new("Validation failed", details)),
    }
}

pub fn validate_update(request: UpdateCustomerRequest) -> Result<CustomerChanges, ValidationError> {
    if request.name.is_none() && request.email.is_none() && request.fidelity_opt_in.is_none() {
        return Err(ValidationError::single(
            "Validation failed",
            "at least one of name, email or fidelityOptIn must be provided",
        ));
    }

    let mut details = Vec::new();
    let name = request
        .name
        .and_then(|name| check_name(&name, &mut details));
    let email = request
        .email
        .and_then(|email| check_email(&email, &mut details));

    if !details.is_empty() {
        return Err(ValidationError::new("Validation failed", details));
    }

    Ok(CustomerChanges {
        name,
        email,
        fidelity_opt_in: request.fidelity_opt_in,
    })
}

/// Parse a path id; must be an integer >= 1.
pub fn parse_customer_id(raw: &str) -> Result<CustomerId, ValidationError> {
    match raw.trim().parse::<i64>() {
        Ok(id) if id >= 1 => Ok(CustomerId(id)),
        _ => Err(ValidationError::single(
            "Invalid customer ID",
            "id must be a positive integer",
        )),
    }
}

fn check_name(name: &str, details: &mut Vec<String>) -> Option<String> {
    let name = name.trim();
    let length = name.chars().count();
    if length < NAME_MIN {
        details.push(format!("name must be at least {NAME_MIN} characters long"));
        return None;
    }
    if length > NAME_MAX {
        details.push(format!("name must be at most {NAME_MAX} characters long"));
        return None;
    }
    Some(name.to_string())
}

fn check_email(email: &str, details: &mut Vec<String>) -> Option<String> {
    let email = email.trim();
    if email.len() > EMAIL_MAX || !is_well_formed_email(email) {
        details.push("email must be a valid email".to_string());
        return None;
    }
    Some(email.to_string())
}

fn is_well_formed_email(email: &str) -> bool {
    if email.chars().any(char::is_whitespace) {
        return false;
    }

    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };

    if local.is_empty() || domain.contains('@') {
        return false;
    }

    let labels: Vec<&str> = domain.split('.').collect();
    labels.len() >= 2
        && labels.iter().all(|label| {
            !label.is_empty()
                && !label.starts_with('-')
                && !label.ends_with('-')
                && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
        })
        && labels.last().map(|tld| tld.len() >= 2).unwrap_or(false)
}
