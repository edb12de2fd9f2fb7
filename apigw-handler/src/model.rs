use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::HandlerError;

pub(crate) const DEFAULT_YEAR: &str = "2012";
pub(crate) const DEFAULT_TITLE: &str = "The Amazing Spider-Man 2";

/// A row of the catalog table.
///
/// `year` keeps the decimal text it arrived with; the store writes it as a
/// number attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogItem {
    pub id: String,
    pub year: String,
    pub title: String,
}

impl CatalogItem {
    /// Item written when a request carries no body. Every call gets a new id.
    pub fn default_item() -> Self {
        CatalogItem {
            id: Uuid::new_v4().to_string(),
            year: DEFAULT_YEAR.to_string(),
            title: DEFAULT_TITLE.to_string(),
        }
    }

    /// Builds an item from a parsed JSON object.
    pub fn from_fields(fields: &Map<String, Value>) -> Result<Self, HandlerError> {
        let year = required_text(fields, "year")?;
        let title = required_text(fields, "title")?;
        let id = required_text(fields, "id")?;

        if !is_decimal_number(&year) {
            return Err(HandlerError::MalformedPayload {
                message: format!("`year` is not a number: {year}"),
            });
        }

        Ok(CatalogItem { id, year, title })
    }
}

// Strings are taken as-is, any other value by its JSON text.
fn required_text(fields: &Map<String, Value>, field: &'static str) -> Result<String, HandlerError> {
    let text = match fields.get(field) {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(text)) => text.clone(),
        Some(other) => other.to_string(),
    };
    if text.is_empty() {
        return Err(HandlerError::MissingField { field });
    }
    Ok(text)
}

fn is_decimal_number(text: &str) -> bool {
    text.parse::<f64>().is_ok_and(f64::is_finite)
}
