//! End-to-end dispatch over a mock directory

use bytes::Bytes;
use http::header::{COOKIE, SET_COOKIE};
use mockingjay_config::ConfigBuilder;
use mockingjay_core::{body_bytes, HttpResponse};
use mockingjay_runtime::{Dispatcher, ServerConfig};
use serde_json::json;
use std::fs;
use std::path::Path;
use std::sync::Arc;

fn write(root: &Path, name: &str, content: &str) {
    let path = root.join(name);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, content).unwrap();
}

fn mock_dir() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    write(
        dir.path(),
        "api/cats.rhai",
        r#"
        if request.method == "POST" {
            response.status = 201;
            response.body = #{ id: request.pathParam ?? "new", name: request.body.name };
        } else {
            response.body = #{ id: request.pathParam, limit: request.param("limit") };
        }
        "#,
    );
    write(
        dir.path(),
        "api/counter.rhai",
        r#"
        session.count = (session.count ?? 0) + 1;
        response.body = #{ count: session.count };
        "#,
    );
    write(dir.path(), "api/logout.rhai", "context.close();");
    write(dir.path(), "index.html", "<h1>Mock home</h1>");
    write(dir.path(), "cats/list.html", "<ul><li>Billie</li></ul>");
    dir
}

fn dispatcher(root: &Path, auto_create: bool) -> Dispatcher {
    let settings = ConfigBuilder::new()
        .root(root)
        .auto_create_session(auto_create)
        .build()
        .unwrap();
    Dispatcher::new(Arc::new(ServerConfig::builder(settings).build().unwrap()))
}

fn get(uri: &str) -> http::Request<Bytes> {
    http::Request::builder()
        .method("GET")
        .uri(uri)
        .body(Bytes::new())
        .unwrap()
}

fn body_json(response: HttpResponse) -> serde_json::Value {
    serde_json::from_slice(&body_bytes(response.into_body())).unwrap()
}

#[test]
fn test_script_request() {
    let dir = mock_dir();
    let mut dispatcher = dispatcher(dir.path(), false);

    let response = dispatcher.dispatch(get("/api/cats/7?limit=10"));
    assert_eq!(response.status(), 200);
    assert_eq!(response.headers()["content-type"], "application/json");
    assert_eq!(body_json(response), json!({ "id": "7", "limit": "10" }));
}

#[test]
fn test_post_with_json_body() {
    let dir = mock_dir();
    let mut dispatcher = dispatcher(dir.path(), false);

    let request = http::Request::builder()
        .method("POST")
        .uri("/api/cats")
        .header("content-type", "application/json")
        .body(Bytes::from(r#"{"name":"Billie"}"#))
        .unwrap();

    let response = dispatcher.dispatch(request);
    assert_eq!(response.status(), 201);
    assert_eq!(body_json(response), json!({ "id": "new", "name": "Billie" }));
}

#[test]
fn test_html_pages() {
    let dir = mock_dir();
    let mut dispatcher = dispatcher(dir.path(), false);

    let response = dispatcher.dispatch(get("/"));
    assert_eq!(response.status(), 200);
    assert_eq!(
        body_bytes(response.into_body()),
        Bytes::from("<h1>Mock home</h1>")
    );

    let response = dispatcher.dispatch(get("/cats/list"));
    assert_eq!(
        body_bytes(response.into_body()),
        Bytes::from("<ul><li>Billie</li></ul>")
    );

    assert_eq!(dispatcher.dispatch(get("/dogs")).status(), 500);
    assert_eq!(dispatcher.handled(), 3);
}

#[test]
fn test_session_round_trip() {
    let dir = mock_dir();
    let mut dispatcher = dispatcher(dir.path(), true);

    let first = dispatcher.dispatch(get("/api/counter"));
    let cookie = first.headers()[SET_COOKIE].to_str().unwrap().to_string();
    assert!(cookie.starts_with("MOCKINGJAY_SESSION="));
    assert_eq!(body_json(first), json!({ "count": 1 }));

    let session_cookie = cookie.split(';').next().unwrap().to_string();
    let request = |uri: &str| {
        http::Request::builder()
            .uri(uri)
            .header(COOKIE, session_cookie.as_str())
            .body(Bytes::new())
            .unwrap()
    };

    let second = dispatcher.dispatch(request("/api/counter"));
    assert!(second.headers().get(SET_COOKIE).is_none());
    assert_eq!(body_json(second), json!({ "count": 2 }));

    let logout = dispatcher.dispatch(request("/api/logout"));
    assert_eq!(
        logout.headers()[SET_COOKIE],
        "MOCKINGJAY_SESSION=; Path=/; Max-Age=0"
    );

    // the old cookie now starts a fresh session
    let after = dispatcher.dispatch(request("/api/counter"));
    assert!(after.headers().get(SET_COOKIE).is_some());
    assert_eq!(body_json(after), json!({ "count": 1 }));
}

#[test]
fn test_workers_share_configuration() {
    let dir = mock_dir();
    let settings = ConfigBuilder::new().root(dir.path()).build().unwrap();
    let config = Arc::new(ServerConfig::builder(settings).build().unwrap());

    let handles: Vec<_> = (0..4)
        .map(|i| {
            let config = config.clone();
            std::thread::spawn(move || {
                let mut dispatcher = Dispatcher::new(config);
                let response = dispatcher.dispatch(get(&format!("/api/cats/{i}")));
                body_json(response)["id"].clone()
            })
        })
        .collect();

    let mut ids: Vec<String> = handles
        .into_iter()
        .map(|h| h.join().unwrap().as_str().unwrap().to_string())
        .collect();
    ids.sort();
    assert_eq!(ids, vec!["0", "1", "2", "3"]);
    assert!(config.bridges().cache_stats().cached_scripts >= 1);
}
