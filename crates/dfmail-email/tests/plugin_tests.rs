use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use dfmail_core::plugin::PluginManager;
use dfmail_core::{
    EmailTemplate, InMemoryParameterStore, InMemoryTemplateStore, LocalStorageProxy,
    LookupResolver, PermissionChecker, ServiceParameter, ServiceParameterStore, StaticLookups,
    StaticPermissionChecker, StorageProxy, TemplateStore,
};
use dfmail_email::{EmailPlugin, MailDefaults, ServiceDefinition, ServiceType};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

struct Host {
    manager: PluginManager,
    _storage_root: tempfile::TempDir,
}

async fn host(sparkpost_endpoint: &str) -> Host {
    let storage_root = tempfile::tempdir().unwrap();
    std::fs::create_dir(storage_root.path().join("public")).unwrap();
    std::fs::write(storage_root.path().join("public/terms.txt"), b"terms").unwrap();

    let templates = InMemoryTemplateStore::new([EmailTemplate {
        id: 7,
        name: "invoice".to_string(),
        subject: Some("Invoice for {{customer}}".to_string()),
        body_html: Some("<p>Dear {{customer}}, thanks from {company}.</p>".to_string()),
        attachment: Some(json!({"service": "files", "path": "public/terms.txt"})),
        ..Default::default()
    }]);
    let parameters = InMemoryParameterStore::new();
    parameters
        .set(11, vec![ServiceParameter::new("customer", "valued customer")])
        .await;

    let mut manager = PluginManager::new();
    let context = manager.service_context();
    context.register_service::<dyn TemplateStore>(Arc::new(templates));
    context.register_service::<dyn ServiceParameterStore>(Arc::new(parameters));
    context.register_service::<dyn PermissionChecker>(Arc::new(
        StaticPermissionChecker::default().allow("files", "public/"),
    ));
    context.register_service::<dyn StorageProxy>(Arc::new(
        LocalStorageProxy::default().with_root("files", storage_root.path()),
    ));
    context.register_service::<dyn LookupResolver>(Arc::new(
        StaticLookups::default().with("company", "Acme"),
    ));
    context.register_service(Arc::new(MailDefaults {
        from_address: Some("billing@acme.test".to_string()),
        from_name: Some("Acme Billing".to_string()),
    }));

    manager.register_plugin(Box::new(EmailPlugin::new(ServiceDefinition::new(
        11,
        "billing",
        ServiceType::SparkPost,
        json!({"key": "sp-key", "options": {"endpoint": sparkpost_endpoint}}),
    ))));
    manager.initialize_plugins().await.unwrap();

    Host {
        manager,
        _storage_root: storage_root,
    }
}

async fn post_json(host: &Host, uri: &str, body: Value) -> (StatusCode, Value) {
    let response = host
        .manager
        .build_application()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
}

#[tokio::test]
async fn test_template_send_through_sparkpost() {
    let sparkpost = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/transmissions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": {"total_accepted_recipients": 1, "id": "42"}
        })))
        .expect(1)
        .mount(&sparkpost)
        .await;

    let host = host(&sparkpost.uri()).await;
    let (status, body) = post_json(
        &host,
        "/api/billing?template=invoice",
        json!({"to": "Jane <jane@example.com>"}),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"count": 1}));

    let requests = sparkpost.received_requests().await.unwrap();
    let transmission: Value = serde_json::from_slice(&requests[0].body).unwrap();
    let raw = transmission["content"]["email_rfc822"].as_str().unwrap();
    assert!(raw.contains("Subject: Invoice for valued customer"));
    assert!(raw.contains("From: Acme Billing <billing@acme.test>"));
    assert!(raw.contains("thanks from Acme"));
    assert!(raw.contains("filename=\"terms.txt\""));
    assert_eq!(
        transmission["recipients"][0]["address"]["email"],
        "jane@example.com"
    );
}

#[tokio::test]
async fn test_unknown_template_id_is_not_found() {
    let sparkpost = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&sparkpost)
        .await;

    let host = host(&sparkpost.uri()).await;
    let (status, body) = post_json(
        &host,
        "/api/billing?template_id=5",
        json!({"to": "jane@example.com"}),
    )
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["detail"], "Email Template id '5' not found");
}

#[tokio::test]
async fn test_forbidden_storage_file() {
    let sparkpost = MockServer::start().await;
    let host = host(&sparkpost.uri()).await;

    let (status, body) = post_json(
        &host,
        "/api/billing",
        json!({
            "to": "jane@example.com",
            "attachment": {"service": "files", "path": "private/ledger.csv"}
        }),
    )
    .await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(
        body["detail"],
        "You do not have enough privileges to access file: private/ledger.csv in service files"
    );
}

#[tokio::test]
async fn test_provider_rejection_is_bad_gateway() {
    let sparkpost = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "errors": [{"message": "Unauthorized."}]
        })))
        .mount(&sparkpost)
        .await;

    let host = host(&sparkpost.uri()).await;
    let (status, body) = post_json(
        &host,
        "/api/billing",
        json!({"to": "jane@example.com", "subject": "hello"}),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert!(body["detail"].as_str().unwrap().contains("401"));
}

#[tokio::test]
async fn test_unified_openapi_lists_service_path() {
    let sparkpost = MockServer::start().await;
    let host = host(&sparkpost.uri()).await;

    let doc = host.manager.get_unified_openapi();
    assert!(doc.paths.paths.contains_key("/billing"));
}
