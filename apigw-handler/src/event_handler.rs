use std::panic::AssertUnwindSafe;

use aws_lambda_events::apigw::{ApiGatewayProxyRequest, ApiGatewayProxyResponse};
use aws_lambda_events::encodings::Body;
use chrono::Utc;
use futures::FutureExt;
use http::header::CONTENT_TYPE;
use http::{HeaderMap, HeaderValue};
use lambda_runtime::tracing::{error, info};
use lambda_runtime::{Error, LambdaEvent};
use serde_json::{json, Value};

use crate::error::HandlerError;
use crate::model::CatalogItem;
use crate::store::ItemStore;

const SUCCESS_MESSAGE: &str = "Successfully inserted data!";
const FAILURE_MESSAGE: &str = "Internal server error";

/// Entry point wired into the runtime. Never returns `Err`: every failure is
/// turned into a 500 response.
pub(crate) async fn function_handler<S: ItemStore + ?Sized>(
    store: &S,
    event: LambdaEvent<ApiGatewayProxyRequest>,
) -> Result<ApiGatewayProxyResponse, Error> {
    let (request, context) = event.into_parts();
    Ok(handle_request(store, &request, &context.request_id).await)
}

#[tracing::instrument(name = "lambda_handler", skip_all, fields(request_id = %request_id))]
pub(crate) async fn handle_request<S: ItemStore + ?Sized>(
    store: &S,
    request: &ApiGatewayProxyRequest,
    request_id: &str,
) -> ApiGatewayProxyResponse {
    let identity = &request.request_context.identity;
    info!(
        action = "request_received",
        timestamp = %Utc::now().to_rfc3339(),
        request_id,
        source_ip = identity.source_ip.as_deref().unwrap_or_default(),
        user_agent = identity.user_agent.as_deref().unwrap_or_default(),
        table_name = store.table_name(),
        http_method = %request.http_method,
        resource_path = request.resource.as_deref().unwrap_or_default(),
        "request received"
    );

    let outcome = AssertUnwindSafe(ingest(store, request.body.as_deref(), request_id))
        .catch_unwind()
        .await
        .unwrap_or_else(|panic| Err(HandlerError::from_panic(panic)));

    match outcome {
        Ok(item_id) => {
            info!(
                action = "dynamodb_put_item",
                request_id,
                status = "success",
                item_id = %item_id,
                "item written"
            );
            json_response(200, SUCCESS_MESSAGE)
        }
        Err(err) => {
            error!(
                action = "error",
                request_id,
                error_type = err.kind(),
                error_message = %err,
                "request failed"
            );
            json_response(500, FAILURE_MESSAGE)
        }
    }
}

/// Writes the item described by `body`, or the default item when there is no
/// body. Returns the id of the written item.
async fn ingest<S: ItemStore + ?Sized>(
    store: &S,
    body: Option<&str>,
    request_id: &str,
) -> Result<String, HandlerError> {
    let item = match body.filter(|body| !body.is_empty()) {
        Some(body) => parse_item(body, request_id)?,
        None => {
            info!(
                action = "default_data_insertion",
                request_id,
                payload_received = false,
                "no payload, inserting default item"
            );
            CatalogItem::default_item()
        }
    };

    store.put_item(&item).await?;
    Ok(item.id)
}

fn parse_item(body: &str, request_id: &str) -> Result<CatalogItem, HandlerError> {
    let payload: Value = serde_json::from_str(body)?;

    let Value::Object(fields) = payload else {
        info!(
            action = "data_validation",
            request_id,
            payload_received = true,
            item_keys = "invalid_format",
            "payload received"
        );
        return Err(HandlerError::MalformedPayload {
            message: "payload is not a JSON object".to_string(),
        });
    };

    let item_keys: Vec<&str> = fields.keys().map(String::as_str).collect();
    info!(
        action = "data_validation",
        request_id,
        payload_received = true,
        item_keys = ?item_keys,
        "payload received"
    );

    CatalogItem::from_fields(&fields)
}

fn json_response(status_code: i64, message: &str) -> ApiGatewayProxyResponse {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

    let mut response = ApiGatewayProxyResponse::default();
    response.status_code = status_code;
    response.headers = headers;
    response.body = Some(Body::Text(json!({ "message": message }).to_string()));
    response.is_base64_encoded = false;
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DEFAULT_TITLE, DEFAULT_YEAR};
    use crate::store::testing::{Fault, MemoryItemStore};

    fn request(body: Option<&str>) -> ApiGatewayProxyRequest {
        let mut request = ApiGatewayProxyRequest::default();
        request.http_method = http::Method::POST;
        request.resource = Some("/".to_string());
        request.body = body.map(str::to_string);
        request.request_context.identity.source_ip = Some("203.0.113.7".to_string());
        request.request_context.identity.user_agent = Some("curl/8.5.0".to_string());
        request
    }

    fn body_text(response: &ApiGatewayProxyResponse) -> &str {
        match &response.body {
            Some(Body::Text(text)) => text,
            other => panic!("expected a text body, got {other:?}"),
        }
    }

    fn message(response: &ApiGatewayProxyResponse) -> String {
        let body: Value = serde_json::from_str(body_text(response)).unwrap();
        body["message"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn valid_payload_is_written_once() {
        let store = MemoryItemStore::default();
        let body = r#"{"id": "movie-1", "year": 1994, "title": "Pulp Fiction"}"#;

        let response = handle_request(&store, &request(Some(body)), "req-1").await;

        assert_eq!(response.status_code, 200);
        assert_eq!(message(&response), SUCCESS_MESSAGE);
        assert_eq!(
            response.headers.get(CONTENT_TYPE).unwrap(),
            "application/json"
        );
        assert_eq!(
            store.writes(),
            vec![CatalogItem {
                id: "movie-1".into(),
                year: "1994".into(),
                title: "Pulp Fiction".into(),
            }]
        );
    }

    #[tokio::test]
    async fn missing_or_empty_body_writes_default_item() {
        let store = MemoryItemStore::default();

        let first = handle_request(&store, &request(None), "req-1").await;
        let second = handle_request(&store, &request(Some("")), "req-2").await;

        assert_eq!(first.status_code, 200);
        assert_eq!(second.status_code, 200);
        assert_eq!(message(&second), SUCCESS_MESSAGE);

        let writes = store.writes();
        assert_eq!(writes.len(), 2);
        for item in &writes {
            assert_eq!(item.year, DEFAULT_YEAR);
            assert_eq!(item.title, DEFAULT_TITLE);
        }
        assert_ne!(writes[0].id, writes[1].id);
    }

    #[tokio::test]
    async fn missing_field_fails_without_writing() {
        let store = MemoryItemStore::default();

        for body in [
            r#"{"year": 1994, "title": "Pulp Fiction"}"#,
            r#"{"id": "movie-1", "title": "Pulp Fiction"}"#,
            r#"{"id": "movie-1", "year": 1994}"#,
        ] {
            let response = handle_request(&store, &request(Some(body)), "req-1").await;
            assert_eq!(response.status_code, 500);
            assert_eq!(message(&response), FAILURE_MESSAGE);
        }

        assert!(store.writes().is_empty());
    }

    #[tokio::test]
    async fn non_json_body_fails_without_writing() {
        let store = MemoryItemStore::default();

        let response = handle_request(&store, &request(Some("year=1994")), "req-1").await;

        assert_eq!(response.status_code, 500);
        assert_eq!(message(&response), FAILURE_MESSAGE);
        assert!(store.writes().is_empty());
    }

    #[tokio::test]
    async fn non_object_json_fails_without_writing() {
        let store = MemoryItemStore::default();

        for body in [r#"["movie-1", 1994]"#, "42", "null", r#""text""#] {
            let response = handle_request(&store, &request(Some(body)), "req-1").await;
            assert_eq!(response.status_code, 500);
        }

        assert!(store.writes().is_empty());
    }

    #[tokio::test]
    async fn store_failure_is_hidden_from_caller() {
        let secret = "AccessDeniedException: not authorized on arn:aws:dynamodb:demo_table";
        let store = MemoryItemStore::with_fault(Fault::Fail(secret.to_string()));
        let body = r#"{"id": "movie-1", "year": 1994, "title": "Pulp Fiction"}"#;

        let response = handle_request(&store, &request(Some(body)), "req-1").await;

        assert_eq!(response.status_code, 500);
        assert_eq!(message(&response), FAILURE_MESSAGE);
        assert!(!body_text(&response).contains("AccessDenied"));
        assert!(store.writes().is_empty());
    }

    #[tokio::test]
    async fn panicking_store_becomes_internal_error() {
        let store = MemoryItemStore::with_fault(Fault::Panic);

        let response = handle_request(&store, &request(None), "req-1").await;

        assert_eq!(response.status_code, 500);
        assert_eq!(message(&response), FAILURE_MESSAGE);
        assert!(!body_text(&response).contains("exploded"));
    }

    #[tokio::test]
    async fn repeated_payload_overwrites_previous_item() {
        let store = MemoryItemStore::default();
        let first = r#"{"id": "movie-1", "year": 1994, "title": "Pulp Fiction"}"#;
        let second = r#"{"id": "movie-1", "year": "1995", "title": "Heat"}"#;

        let a = handle_request(&store, &request(Some(first)), "req-1").await;
        let b = handle_request(&store, &request(Some(second)), "req-2").await;

        assert_eq!(a.status_code, 200);
        assert_eq!(b.status_code, 200);
        assert_eq!(store.writes().len(), 2);
        assert_eq!(
            store.get("movie-1"),
            Some(CatalogItem {
                id: "movie-1".into(),
                year: "1995".into(),
                title: "Heat".into(),
            })
        );
    }

    #[tokio::test]
    async fn store_write_runs_inside_the_invocation_span() {
        let _guard = tracing::subscriber::set_default(tracing_subscriber::registry());
        let store = MemoryItemStore::default();

        handle_request(&store, &request(None), "req-1").await;
        handle_request(&store, &request(None), "req-2").await;

        assert_eq!(
            store.write_spans(),
            vec![Some("lambda_handler"), Some("lambda_handler")]
        );
    }

    #[tokio::test]
    async fn function_handler_never_errors() {
        let store = MemoryItemStore::default();
        let mut context = lambda_runtime::Context::default();
        context.request_id = "req-1".to_string();
        let event = LambdaEvent::new(request(Some("{broken")), context);

        let response = function_handler(&store, event).await.unwrap();

        assert_eq!(response.status_code, 500);
    }
}
