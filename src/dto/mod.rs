use crate::error::FieldError;

pub mod auth;
pub mod cart;
pub mod categories;
pub mod orders;
pub mod products;

/// Phone numbers: optional leading `+`, then 9 to 15 digits.
pub(crate) fn phone_error(field: &str, phone: &str) -> Option<FieldError> {
    let digits = phone.strip_prefix('+').unwrap_or(phone);
    let ok = (9..=15).contains(&digits.len()) && digits.chars().all(|c| c.is_ascii_digit());
    if ok {
        None
    } else {
        Some(FieldError::new(
            field,
            "Phone number must be entered in the format '+999999999', 9 to 15 digits",
        ))
    }
}

pub(crate) fn email_error(field: &str, email: &str) -> Option<FieldError> {
    let valid = match email.split_once('@') {
        Some((local, domain)) => !local.is_empty() && domain.contains('.') && !domain.ends_with('.'),
        None => false,
    };
    if valid {
        None
    } else {
        Some(FieldError::new(field, "Enter a valid email address"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phone_shapes() {
        assert!(phone_error("phone", "+4915112345678").is_none());
        assert!(phone_error("phone", "123456789").is_none());
        assert!(phone_error("phone", "12345").is_some());
        assert!(phone_error("phone", "+49-151-123").is_some());
    }

    #[test]
    fn email_shapes() {
        assert!(email_error("email", "a@b.com").is_none());
        assert!(email_error("email", "missing-at.com").is_some());
        assert!(email_error("email", "@b.com").is_some());
        assert!(email_error("email", "a@nodot").is_some());
    }
}
