//! Drive the simulated endpoint through the raw POST/redirect/GET exchange.

use rollcall_core::{EndpointCommand, HttpRequest, HttpTransport};
use rollcall_driver_mock::{EndpointBehaviour, ErrorConfig, ErrorScenario, MockAppsScript};

fn redirect_target(body: &str) -> String {
    let start = body.find("HREF=\"").unwrap() + "HREF=\"".len();
    let end = start + body[start..].find('"').unwrap();
    body[start..end].replace("&amp;", "&")
}

async fn exchange(endpoint: &MockAppsScript, body: &str) -> (u16, String) {
    let post = endpoint
        .execute(HttpRequest::post(endpoint.exec_url(), body))
        .await
        .unwrap();
    assert_eq!(post.status, 302);
    let get = endpoint
        .execute(
            HttpRequest::get(redirect_target(&post.body))
                .header("User-Agent", "Mozilla/5.0")
                .header("X-Requested-With", "XMLHttpRequest"),
        )
        .await
        .unwrap();
    (get.status, get.body)
}

#[tokio::test]
async fn insert_rows_lands_in_the_sheet() {
    let endpoint = MockAppsScript::new();
    let body = r#"{"command":"insert_rows","sheet_name":"LOG_Attendance","values":[["2201001","T-014","Ani"],["2201002","T-014","Budi"]]}"#;

    let (status, text) = exchange(&endpoint, body).await;

    assert_eq!(status, 200);
    assert_eq!(text, "Success 2");
    let rows = endpoint.rows("LOG_Attendance");
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[1][2], "Budi");
    assert_eq!(endpoint.post_count(), 1);
    assert_eq!(endpoint.get_count(), 1);
}

#[tokio::test]
async fn test_connection_answers_bare_success() {
    let endpoint = MockAppsScript::new();
    let (status, text) = exchange(&endpoint, r#"{"command":"test_connection"}"#).await;

    assert_eq!(status, 200);
    assert_eq!(text, "Success");
    assert_eq!(endpoint.commands(), vec![EndpointCommand::TestConnection]);
}

#[tokio::test]
async fn scripted_behaviour_applies_once() {
    let endpoint = MockAppsScript::new();
    endpoint.script(EndpointBehaviour::SubmitStatus(500));

    let first = endpoint
        .execute(HttpRequest::post(endpoint.exec_url(), r#"{"command":"test_connection"}"#))
        .await
        .unwrap();
    assert_eq!(first.status, 500);

    let (status, _) = exchange(&endpoint, r#"{"command":"test_connection"}"#).await;
    assert_eq!(status, 200);
}

#[tokio::test]
async fn injected_fault_fails_the_transport() {
    let endpoint = MockAppsScript::new()
        .with_error_config(ErrorConfig::scenario(ErrorScenario::FailNext {
            operation: "post",
            count: 1,
        }));

    let result = endpoint
        .execute(HttpRequest::post(endpoint.exec_url(), r#"{"command":"test_connection"}"#))
        .await;
    assert!(result.is_err());
}
