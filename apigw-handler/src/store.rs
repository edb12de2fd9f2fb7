use std::collections::HashMap;

use async_trait::async_trait;
use aws_sdk_dynamodb::error::DisplayErrorContext;
use aws_sdk_dynamodb::types::AttributeValue;
use aws_sdk_dynamodb::Client;

use crate::error::HandlerError;
use crate::model::CatalogItem;

/// Write side of the catalog table.
#[async_trait]
pub trait ItemStore: Send + Sync {
    /// Name of the table items land in.
    fn table_name(&self) -> &str;

    /// Writes `item` keyed by its id, replacing any existing item.
    async fn put_item(&self, item: &CatalogItem) -> Result<(), HandlerError>;
}

/// DynamoDB-backed store. Built once per process and shared by reference.
pub struct DynamoItemStore {
    client: Client,
    table_name: String,
}

impl DynamoItemStore {
    pub fn new(client: Client, table_name: String) -> Self {
        DynamoItemStore { client, table_name }
    }
}

#[async_trait]
impl ItemStore for DynamoItemStore {
    fn table_name(&self) -> &str {
        &self.table_name
    }

    async fn put_item(&self, item: &CatalogItem) -> Result<(), HandlerError> {
        // Unconditional put: last write wins.
        self.client
            .put_item()
            .table_name(&self.table_name)
            .set_item(Some(item_attributes(item)))
            .send()
            .await
            .map_err(|err| HandlerError::StoreWrite {
                message: DisplayErrorContext(&err).to_string(),
            })?;

        Ok(())
    }
}

/// `year` travels as text but is stored as a number attribute.
fn item_attributes(item: &CatalogItem) -> HashMap<String, AttributeValue> {
    HashMap::from([
        ("id".to_string(), AttributeValue::S(item.id.clone())),
        ("year".to_string(), AttributeValue::N(item.year.clone())),
        ("title".to_string(), AttributeValue::S(item.title.clone())),
    ])
}
