mod common;

use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::Arc;

use common::*;
use reqwest::multipart::{Form, Part as FormPart};

async fn serve(app: axum::Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

async fn upload(addr: SocketAddr, filename: &str, bytes: Vec<u8>) -> serde_json::Value {
    let part = FormPart::bytes(bytes)
        .file_name(filename.to_string())
        .mime_str("image/png")
        .unwrap();
    let form = Form::new().part("image", part);

    let response = reqwest::Client::new()
        .post(format!("http://{addr}/analyze"))
        .multipart(form)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);
    response.json().await.unwrap()
}

#[tokio::test]
async fn test_uploaded_bytes_round_trip_over_http() {
    let dir = tempfile::tempdir().unwrap();
    let addr = serve(test_app(dir.path(), Arc::new(EchoModel::default()))).await;

    let original = b"round trip payload \x00\x01\x02".to_vec();
    let json = upload(addr, "trip.png", original.clone()).await;
    let image_path = json["imagePath"].as_str().unwrap();

    let served = reqwest::get(format!("http://{addr}{image_path}"))
        .await
        .unwrap()
        .bytes()
        .await
        .unwrap();
    assert_eq!(served.to_vec(), original);
}

#[tokio::test]
async fn test_concurrent_uploads_do_not_interfere() {
    let dir = tempfile::tempdir().unwrap();
    let addr = serve(test_app(dir.path(), Arc::new(EchoModel::default()))).await;

    let uploads = (0..8).map(|i| {
        let content = format!("image number {i}");
        tokio::spawn(async move {
            let json = upload(addr, "same-name.png", content.clone().into_bytes()).await;
            (content, json)
        })
    });

    let mut paths = HashSet::new();
    for handle in uploads.collect::<Vec<_>>() {
        let (content, json) = handle.await.unwrap();
        assert_eq!(json["description"], format!("echo: {content}"));
        paths.insert(json["imagePath"].as_str().unwrap().to_string());
    }

    assert_eq!(paths.len(), 8);
    assert_eq!(stored_files(dir.path()).len(), 8);
}
