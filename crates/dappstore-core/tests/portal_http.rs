use dappstore_core::config::PipelineSettings;
use dappstore_core::fakes::fixtures::release_config;
use dappstore_core::portal::PortalSubmitter;
use httpmock::Method::POST;
use httpmock::MockServer;
use std::net::TcpListener;
use std::path::Path;

fn can_bind_localhost() -> bool {
    TcpListener::bind("127.0.0.1:0").is_ok()
}

#[tokio::test]
async fn accepted_submission_returns_true() {
    if !can_bind_localhost() {
        eprintln!("Skipping httpmock tests: cannot bind to localhost");
        return;
    }

    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(POST)
            .path("/submit")
            .header("content-type", "application/json")
            .json_body_partial(
                r#"{"context":{"pageUri":"https://bubblewrapper.app","pageName":"BubbleWrapper CLI Submission"}}"#,
            )
            .body_contains(r#""name":"dapp_collection_account_address","value":"AppMint""#)
            .body_contains(r#""name":"requestor_is_authorized_to_submit_this_request","value":true"#)
            .body_contains(r#""submittedAt":1700000000000"#);
        then.status(200).body(r#"{"inlineMessage":"Thanks"}"#);
    });

    let settings = PipelineSettings::default().with_portal_url(&server.url("/submit"));
    let submitter = PortalSubmitter::from_settings(&settings).unwrap();
    let config = release_config(Path::new("/r"));

    assert!(
        submitter
            .submit_at(&config, "AppMint", "RelMint", 1_700_000_000_000)
            .await
    );
    mock.assert();
}

#[tokio::test]
async fn rejected_submission_returns_false() {
    if !can_bind_localhost() {
        eprintln!("Skipping httpmock tests: cannot bind to localhost");
        return;
    }

    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(POST).path("/submit");
        then.status(400).body(r#"{"status":"error","message":"Invalid field"}"#);
    });

    let settings = PipelineSettings::default().with_portal_url(&server.url("/submit"));
    let submitter = PortalSubmitter::from_settings(&settings).unwrap();
    let config = release_config(Path::new("/r"));

    assert!(!submitter.submit(&config, "AppMint", "RelMint").await);
    mock.assert();
}
