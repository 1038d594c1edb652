use serde_json::json;

use crate::common::{MAX_IMAGE_SIZE, TestApp, id_of, routes};

/// Number of stored blobs, ignoring the partial-upload directory.
fn stored_blobs(app: &TestApp) -> usize {
    let mut count = 0;
    for shard in std::fs::read_dir(app.blob_dir.path()).unwrap() {
        let shard = shard.unwrap();
        if shard.file_name() == ".partial" {
            continue;
        }
        count += std::fs::read_dir(shard.path()).unwrap().count();
    }
    count
}

#[tokio::test]
async fn uploaded_image_can_be_downloaded() {
    let app = TestApp::spawn().await;
    let token = app.manager_token().await;
    let id = id_of(&app.create_category(&token, "Food", None).await);
    let bytes = b"\x89PNG\r\n\x1a\nfake image body".to_vec();

    let res = app
        .upload_with_token(&routes::image(id), "image", "burger.png", bytes.clone(), &token)
        .await;
    assert_eq!(res.status, 200, "{}", res.text);
    assert_eq!(
        res.body["image_url"],
        format!("/api/v1/categories/{id}/image")
    );

    let download = app.get_raw(&routes::image(id), &token).await;
    assert_eq!(download.status(), 200);
    assert_eq!(download.headers()["content-type"], "image/png");
    let etag = download.headers()["etag"].to_str().unwrap().to_string();
    assert_eq!(download.bytes().await.unwrap().as_ref(), bytes.as_slice());

    let cached = app
        .client
        .get(format!("http://{}{}", app.addr, routes::image(id)))
        .header("Authorization", format!("Bearer {token}"))
        .header("If-None-Match", etag)
        .send()
        .await
        .unwrap();
    assert_eq!(cached.status(), 304);
}

#[tokio::test]
async fn category_without_image_is_not_found() {
    let app = TestApp::spawn().await;
    let token = app.manager_token().await;
    let id = id_of(&app.create_category(&token, "Food", None).await);

    let res = app.get_with_token(&routes::image(id), &token).await;

    assert_eq!(res.status, 404);
    assert_eq!(res.body["code"], "NOT_FOUND");
}

#[tokio::test]
async fn non_image_files_are_rejected() {
    let app = TestApp::spawn().await;
    let token = app.manager_token().await;
    let id = id_of(&app.create_category(&token, "Food", None).await);

    let res = app
        .upload_with_token(&routes::image(id), "image", "menu.pdf", b"%PDF".to_vec(), &token)
        .await;

    assert_eq!(res.status, 400);
    assert_eq!(res.body["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn wrong_field_name_is_rejected() {
    let app = TestApp::spawn().await;
    let token = app.manager_token().await;
    let id = id_of(&app.create_category(&token, "Food", None).await);

    let res = app
        .upload_with_token(&routes::image(id), "file", "a.png", vec![1, 2, 3], &token)
        .await;

    assert_eq!(res.status, 400);
    assert_eq!(res.body["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn hidden_filenames_are_rejected() {
    let app = TestApp::spawn().await;
    let token = app.manager_token().await;
    let id = id_of(&app.create_category(&token, "Food", None).await);

    let res = app
        .upload_with_token(&routes::image(id), "image", ".png", vec![1, 2, 3], &token)
        .await;

    assert_eq!(res.status, 400);
}

#[tokio::test]
async fn oversized_images_are_rejected() {
    let app = TestApp::spawn().await;
    let token = app.manager_token().await;
    let id = id_of(&app.create_category(&token, "Food", None).await);
    let bytes = vec![0u8; MAX_IMAGE_SIZE as usize + 1];

    let res = app
        .upload_with_token(&routes::image(id), "image", "big.jpg", bytes, &token)
        .await;

    assert_eq!(res.status, 400, "{}", res.text);
    assert_eq!(stored_blobs(&app), 0);
}

#[tokio::test]
async fn empty_images_are_rejected() {
    let app = TestApp::spawn().await;
    let token = app.manager_token().await;
    let id = id_of(&app.create_category(&token, "Food", None).await);

    let res = app
        .upload_with_token(&routes::image(id), "image", "blank.png", Vec::new(), &token)
        .await;

    assert_eq!(res.status, 400, "{}", res.text);
    assert_eq!(stored_blobs(&app), 0);
}

#[tokio::test]
async fn image_at_the_size_limit_is_accepted() {
    let app = TestApp::spawn().await;
    let token = app.manager_token().await;
    let id = id_of(&app.create_category(&token, "Food", None).await);
    let bytes = vec![7u8; MAX_IMAGE_SIZE as usize];

    let res = app
        .upload_with_token(&routes::image(id), "image", "big.jpg", bytes.clone(), &token)
        .await;
    assert_eq!(res.status, 200, "{}", res.text);

    let download = app.get_raw(&routes::image(id), &token).await;
    assert_eq!(download.bytes().await.unwrap().len(), bytes.len());
}

#[tokio::test]
async fn upload_to_unknown_category_is_not_found() {
    let app = TestApp::spawn().await;
    let token = app.manager_token().await;

    let res = app
        .upload_with_token(
            &routes::image(uuid::Uuid::new_v4()),
            "image",
            "a.png",
            vec![1, 2, 3],
            &token,
        )
        .await;

    assert_eq!(res.status, 404);
}

#[tokio::test]
async fn replaced_image_is_released_unless_shared() {
    let app = TestApp::spawn().await;
    let token = app.manager_token().await;
    let food = id_of(&app.create_category(&token, "Food", None).await);
    let drinks = id_of(&app.create_category(&token, "Drinks", None).await);

    let shared = b"shared image".to_vec();
    app.upload_with_token(&routes::image(food), "image", "a.png", shared.clone(), &token)
        .await;
    app.upload_with_token(&routes::image(drinks), "image", "b.png", shared, &token)
        .await;
    assert_eq!(stored_blobs(&app), 1);

    // drinks still points at the shared blob
    app.upload_with_token(&routes::image(food), "image", "c.png", b"new".to_vec(), &token)
        .await;
    assert_eq!(stored_blobs(&app), 2);

    app.upload_with_token(&routes::image(drinks), "image", "d.png", b"newer".to_vec(), &token)
        .await;
    assert_eq!(stored_blobs(&app), 2);
}

#[tokio::test]
async fn hard_delete_releases_images() {
    let app = TestApp::spawn().await;
    let token = app.manager_token().await;
    let food = id_of(&app.create_category(&token, "Food", None).await);
    let fast = id_of(&app.create_category(&token, "Fast Food", Some("food")).await);
    app.upload_with_token(&routes::image(fast), "image", "a.png", b"fries".to_vec(), &token)
        .await;
    assert_eq!(stored_blobs(&app), 1);

    let res = app.delete_with_token(&routes::category(food), &token).await;
    assert_eq!(res.status, 204);

    assert_eq!(stored_blobs(&app), 0);
    let listing = app.get_with_token(routes::CATEGORIES, &token).await;
    assert_eq!(listing.body["data"], json!([]));
}
