//! Validation utilities

use bigdecimal::BigDecimal;

use crate::types::{DocumentLine, PostingError, PostingRequest, PostingResult};

/// Validate the request payload before any fetch happens
pub fn validate_posting_request(request: &PostingRequest) -> PostingResult<()> {
    if request.document_id.trim().is_empty() {
        return Err(PostingError::Validation(
            "Document ID cannot be empty".to_string(),
        ));
    }
    if request.user_id.trim().is_empty() {
        return Err(PostingError::Validation(
            "User ID cannot be empty".to_string(),
        ));
    }
    if request.company_id.trim().is_empty() {
        return Err(PostingError::Validation(
            "Company ID cannot be empty".to_string(),
        ));
    }
    Ok(())
}

/// Validate the figures on every document line before building ledger entries
pub fn validate_document_lines(lines: &[DocumentLine]) -> PostingResult<()> {
    let zero = BigDecimal::from(0);
    for line in lines {
        if line.quantity < zero {
            return Err(PostingError::Validation(format!(
                "Line '{}' has a negative quantity",
                line.id
            )));
        }
        if line.unit_price < zero {
            return Err(PostingError::Validation(format!(
                "Line '{}' has a negative unit price",
                line.id
            )));
        }
        if line.conversion_factor <= zero {
            return Err(PostingError::Validation(format!(
                "Line '{}' has a non-positive conversion factor",
                line.id
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::LineType;

    fn request() -> PostingRequest {
        PostingRequest {
            document_id: "doc1".to_string(),
            user_id: "user1".to_string(),
            company_id: "co1".to_string(),
        }
    }

    fn line(quantity: i64, unit_price: i64) -> DocumentLine {
        DocumentLine {
            id: "l1".to_string(),
            document_id: "doc1".to_string(),
            line_type: LineType::Part,
            item_id: Some("item1".to_string()),
            gl_account_no: None,
            quantity: BigDecimal::from(quantity),
            unit_price: BigDecimal::from(unit_price),
            line_shipping: BigDecimal::from(0),
            line_surcharge: BigDecimal::from(0),
            conversion_factor: BigDecimal::from(1),
            counterpart_line_id: None,
            outside_processing: false,
            location_id: None,
            serial_numbers: Vec::new(),
        }
    }

    #[test]
    fn complete_request_passes() {
        validate_posting_request(&request()).unwrap();
    }

    #[test]
    fn blank_request_fields_are_rejected() {
        let mut r = request();
        r.document_id = "  ".to_string();
        assert!(validate_posting_request(&r).is_err());

        let mut r = request();
        r.user_id = String::new();
        assert!(validate_posting_request(&r).is_err());

        let mut r = request();
        r.company_id = String::new();
        assert!(validate_posting_request(&r).is_err());
    }

    #[test]
    fn negative_quantity_is_rejected() {
        let err = validate_document_lines(&[line(-1, 10)]).unwrap_err();
        assert!(matches!(err, PostingError::Validation(_)));
    }

    #[test]
    fn negative_unit_price_is_rejected() {
        assert!(validate_document_lines(&[line(1, -10)]).is_err());
    }

    #[test]
    fn zero_conversion_factor_is_rejected() {
        let mut bad = line(1, 10);
        bad.conversion_factor = BigDecimal::from(0);
        assert!(validate_document_lines(&[bad]).is_err());
    }

    #[test]
    fn zero_quantity_line_is_allowed() {
        validate_document_lines(&[line(0, 10)]).unwrap();
    }
}
