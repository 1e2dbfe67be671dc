//! Artifact download against a local HTTP server.

use std::time::Duration;

use flate2::write::GzEncoder;
use flate2::Compression;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use wego::gitops::fetcher::applications_from_artifact;
use wego::gitops::{ArtifactDescriptor, ArtifactFetcher, GitOpsError, Layout};

const APP_YAML: &str = r#"apiVersion: wego.weave.works/v1alpha1
kind: Application
metadata:
  name: podinfo
  namespace: default
  annotations:
    app.weave.works.gitops/app-id: "1234"
spec:
  description: demo
"#;

fn artifact() -> Vec<u8> {
    let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
    let entries: [(&str, &[u8]); 4] = [
        (".weave-gitops/apps/podinfo/app.yaml", APP_YAML.as_bytes()),
        (".weave-gitops/clusters/dev/system/wego-app.yaml", b"kind: Deployment\n"),
        (".weave-gitops/clusters/dev/user/.keep", b""),
        ("deploy/multi.yaml", b"a: 1\n---\nb: 2\n"),
    ];
    for (path, data) in entries {
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append_data(&mut header, path, data).unwrap();
    }
    builder.into_inner().unwrap().finish().unwrap()
}

/// Serves `body` on `/artifact.tar.gz` and 404 on every other path, one
/// connection at a time.
async fn serve(body: Vec<u8>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                match socket.read(&mut buf).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => request.extend_from_slice(&buf[..n]),
                }
            }
            let request = String::from_utf8_lossy(&request);
            let (status, payload): (&str, &[u8]) =
                if request.starts_with("GET /artifact.tar.gz ") {
                    ("200 OK", body.as_slice())
                } else {
                    ("404 Not Found", &b"not found"[..])
                };
            let head = format!(
                "HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                status,
                payload.len()
            );
            let _ = socket.write_all(head.as_bytes()).await;
            let _ = socket.write_all(payload).await;
            let _ = socket.shutdown().await;
        }
    });

    format!("http://{}", addr)
}

#[tokio::test]
async fn test_fetch_filters_and_decodes() {
    let base = serve(artifact()).await;
    let fetcher = ArtifactFetcher::new(Duration::from_secs(10)).unwrap();

    let files = fetcher
        .fetch(&ArtifactDescriptor::new(format!("{}/artifact.tar.gz", base)))
        .await
        .unwrap();

    let paths: Vec<&str> = files.iter().map(|f| f.path.as_str()).collect();
    assert_eq!(
        paths,
        vec![".weave-gitops/apps/podinfo/app.yaml", "deploy/multi.yaml"]
    );
    assert_eq!(files[1].data, serde_json::json!([{"a": 1}, {"b": 2}]));

    let apps = applications_from_artifact(&files, &Layout::default()).unwrap();
    assert_eq!(apps["podinfo"].description, "demo");
}

#[tokio::test]
async fn test_fetch_without_exclusions() {
    let base = serve(artifact()).await;
    let fetcher = ArtifactFetcher::new(Duration::from_secs(10)).unwrap();

    let descriptor =
        ArtifactDescriptor::new(format!("{}/artifact.tar.gz", base)).with_exclusions(Vec::new());
    let files = fetcher.fetch(&descriptor).await.unwrap();
    assert_eq!(files.len(), 4);
    assert!(files.iter().any(|f| f.path.ends_with(".keep") && f.data.is_null()));
}

#[tokio::test]
async fn test_fetch_not_found() {
    let base = serve(artifact()).await;
    let fetcher = ArtifactFetcher::new(Duration::from_secs(10)).unwrap();

    let err = fetcher
        .fetch(&ArtifactDescriptor::new(format!("{}/missing.tar.gz", base)))
        .await
        .unwrap_err();
    match err {
        GitOpsError::HttpStatus { status, .. } => assert!(status.starts_with("404")),
        other => panic!("expected HttpStatus, got {other:?}"),
    }
}

#[tokio::test]
async fn test_fetch_unreachable() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let fetcher = ArtifactFetcher::new(Duration::from_secs(5)).unwrap();
    let err = fetcher
        .fetch(&ArtifactDescriptor::new(format!("http://{}/artifact.tar.gz", addr)))
        .await
        .unwrap_err();
    assert!(matches!(err, GitOpsError::Http { .. }));
    assert!(err.is_retryable());
}
