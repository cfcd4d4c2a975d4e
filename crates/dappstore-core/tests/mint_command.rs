#![cfg(unix)]

use std::sync::{Arc, Mutex};

use dappstore_core::fakes::fixtures::{release_config, WALLET};
use dappstore_core::fakes::StaticSigner;
use dappstore_core::mint::{CommandMintingService, MintError, MintRequest, MintStep, MintingService};
use dappstore_core::upload::{AssetKind, UploadedAsset, UploadedAssets};
use dappstore_core::ContentHash;

fn request() -> MintRequest {
    let config = release_config(std::path::Path::new("/r"));
    let asset = |kind, uri: &str| UploadedAsset {
        kind,
        path: "/r/x".into(),
        content_type: "image/png".to_string(),
        uri: uri.to_string(),
        sha256: ContentHash::from_bytes(uri.as_bytes()),
        size: 1,
        dimensions: None,
    };
    let uploads = UploadedAssets {
        icon: asset(AssetKind::Icon, "https://arweave.net/icon"),
        banner: None,
        screenshots: vec![asset(AssetKind::Screenshot(1), "https://arweave.net/s1")],
        apk: asset(AssetKind::Apk, "https://arweave.net/apk"),
    };
    MintRequest::from_release(&config, &uploads, "https://arweave.net/meta")
}

fn shell(script: &str) -> CommandMintingService {
    CommandMintingService::new(vec!["sh".to_string(), "-c".to_string(), script.to_string()])
}

async fn mint(service: &CommandMintingService) -> (Result<dappstore_core::MintResult, MintError>, Vec<MintStep>) {
    let steps = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&steps);
    let progress = move |s: MintStep| sink.lock().unwrap().push(s);
    let result = service
        .mint(&request(), &StaticSigner::connected(WALLET), &progress)
        .await;
    let steps = steps.lock().unwrap().clone();
    (result, steps)
}

#[tokio::test]
async fn command_reports_progress_and_addresses() {
    let service = shell(
        r#"grep -q '"metadata_uri":"https://arweave.net/meta"' || exit 3
echo 'starting up'
echo '{"type":"progress","step":"Creating App NFT","current":1,"total":2}'
echo '{"type":"progress","step":"Creating Release NFT","current":2,"total":2}'
echo '{"type":"minted","app_mint_address":"AppMint","release_mint_address":"RelMint"}'"#,
    );

    let (result, steps) = mint(&service).await;
    let minted = result.unwrap();
    assert_eq!(minted.app_mint_address, "AppMint");
    assert_eq!(minted.release_mint_address, "RelMint");
    assert_eq!(steps.len(), 2);
    assert_eq!(steps[1].step, "Creating Release NFT");
}

#[tokio::test]
async fn error_message_is_passed_through() {
    let service = shell(
        r#"cat > /dev/null
echo '{"type":"error","message":"Blockhash not found"}'
exit 1"#,
    );
    let (result, _) = mint(&service).await;
    match result {
        Err(MintError::Delegate(message)) => assert_eq!(message, "Blockhash not found"),
        other => panic!("unexpected result: {other:?}"),
    }
}

#[tokio::test]
async fn nonzero_exit_without_message_is_a_failure() {
    let service = shell("cat > /dev/null; echo 'rpc unavailable' >&2; exit 2");
    let (result, _) = mint(&service).await;
    let err = result.unwrap_err().to_string();
    assert!(err.contains("exited with 2"), "{}", err);
    assert!(err.contains("rpc unavailable"), "{}", err);
}

#[tokio::test]
async fn clean_exit_without_addresses_is_a_failure() {
    let service = shell("cat > /dev/null");
    let (result, _) = mint(&service).await;
    assert!(result
        .unwrap_err()
        .to_string()
        .contains("without reporting addresses"));
}

#[tokio::test]
async fn missing_executable_is_a_failure() {
    let service = CommandMintingService::new(vec!["/definitely/not/a/minter".to_string()]);
    let (result, _) = mint(&service).await;
    assert!(result.unwrap_err().to_string().starts_with("cannot start"));
}

#[tokio::test]
async fn command_that_ignores_its_input_still_reports_failure() {
    let service = shell("exec 0<&-; echo 'keypair not found' >&2; exit 4");
    let (result, _) = mint(&service).await;
    let err = result.unwrap_err().to_string();
    assert!(err.contains("exited with 4"), "{}", err);
    assert!(err.contains("keypair not found"), "{}", err);
}

#[tokio::test]
async fn error_line_survives_unread_input() {
    let service = shell(
        r#"exec 0<&-
echo '{"type":"error","message":"insufficient lamports"}'
exit 1"#,
    );
    let (result, _) = mint(&service).await;
    match result {
        Err(MintError::Delegate(message)) => assert_eq!(message, "insufficient lamports"),
        other => panic!("unexpected result: {other:?}"),
    }
}
