//
// End-to-end scenarios driven through DavHandler::handle against an
// in-memory backend mounted at /m.
//

use std::sync::Arc;

use futures_util::StreamExt;
use http::{Request, StatusCode};

use dav_gateway::storage::membackend::MemBackend;
use dav_gateway::{BackendRegistry, DavHandler, FakeLs};

fn gateway() -> (DavHandler, Arc<MemBackend>) {
    let _ = env_logger::builder().is_test(true).try_init();
    let mem = Arc::new(MemBackend::new("/m"));
    let registry = Arc::new(BackendRegistry::new());
    let backend: Arc<dyn dav_gateway::StorageBackend> = mem.clone();
    registry.register(backend);
    let handler = DavHandler::builder(registry)
        .locksystem(FakeLs::new())
        .build();
    (handler, mem)
}

fn req(method: &str, uri: &str) -> http::request::Builder {
    Request::builder().method(method).uri(uri)
}

async fn body_bytes(body: dav_gateway::body::Body) -> Vec<u8> {
    let mut out = Vec::new();
    let mut body = Box::pin(body);
    while let Some(chunk) = body.next().await {
        out.extend_from_slice(&chunk.expect("body chunk"));
    }
    out
}

fn header<'a>(resp: &'a http::Response<dav_gateway::body::Body>, name: &str) -> &'a str {
    resp.headers()
        .get(name)
        .map(|v| v.to_str().expect("header utf8"))
        .unwrap_or("")
}

#[tokio::test(flavor = "multi_thread")]
async fn get_full_body() {
    let (handler, _) = gateway();
    let mem_cache = handler.metadata_cache();

    let resp = handler
        .handle(req("PUT", "/m/a.txt").body(hyper::Body::from("hello")).unwrap())
        .await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    assert!(!header(&resp, "ETag").is_empty());

    let resp = handler
        .handle(req("GET", "/m/a.txt").body(hyper::Body::empty()).unwrap())
        .await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(header(&resp, "Accept-Ranges"), "bytes");
    assert!(!header(&resp, "ETag").is_empty());
    assert!(header(&resp, "Content-Disposition").contains("a.txt"));
    assert_eq!(body_bytes(resp.into_body()).await, b"hello");

    // the stat landed in the cache as a file entry
    assert!(mem_cache.get_file("/m/a.txt").is_some());
}

#[tokio::test(flavor = "multi_thread")]
async fn get_with_range() {
    let (handler, mem) = gateway();
    mem.add_file("/m/a.txt", &b"hello"[..]);

    let resp = handler
        .handle(
            req("GET", "/m/a.txt")
                .header("Range", "bytes=1-3")
                .body(hyper::Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(resp.status(), StatusCode::PARTIAL_CONTENT);
    assert_eq!(header(&resp, "Content-Range"), "bytes 1-3/5");
    assert_eq!(header(&resp, "Content-Length"), "3");
    assert_eq!(body_bytes(resp.into_body()).await, b"ell");
}

#[tokio::test(flavor = "multi_thread")]
async fn get_with_invalid_range() {
    let (handler, mem) = gateway();
    mem.add_file("/m/a.txt", &b"hello"[..]);

    let resp = handler
        .handle(
            req("GET", "/m/a.txt")
                .header("Range", "bytes=10-20")
                .body(hyper::Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(resp.status(), StatusCode::RANGE_NOT_SATISFIABLE);
    assert_eq!(header(&resp, "Content-Range"), "bytes */5");
    assert!(body_bytes(resp.into_body()).await.is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn head_reports_size_without_body() {
    let (handler, mem) = gateway();
    mem.add_file("/m/a.txt", &b"hello"[..]);

    let resp = handler
        .handle(req("HEAD", "/m/a.txt").body(hyper::Body::empty()).unwrap())
        .await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(header(&resp, "Content-Length"), "5");
    assert!(body_bytes(resp.into_body()).await.is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn get_refuses_directories_and_missing_files() {
    let (handler, mem) = gateway();
    mem.add_dir("/m/sub");

    let resp = handler
        .handle(req("GET", "/m/sub").body(hyper::Body::empty()).unwrap())
        .await;
    assert_eq!(resp.status(), StatusCode::METHOD_NOT_ALLOWED);

    let resp = handler
        .handle(req("GET", "/m/nope.txt").body(hyper::Body::empty()).unwrap())
        .await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test(flavor = "multi_thread")]
async fn propfind_depth_one_is_sorted_and_caches() {
    let (handler, mem) = gateway();
    mem.add_file("/m/b.txt", &b"bee"[..]);
    mem.add_file("/m/a.txt", &b"ay"[..]);
    let cache = handler.metadata_cache();

    let resp = handler
        .handle(
            req("PROPFIND", "/m")
                .header("Depth", "1")
                .body(hyper::Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(resp.status(), StatusCode::MULTI_STATUS);
    let xml = String::from_utf8(body_bytes(resp.into_body()).await).unwrap();

    let root = xml.find("<D:href>/m/</D:href>").expect("root href");
    let a = xml.find("<D:href>/m/a.txt</D:href>").expect("a href");
    let b = xml.find("<D:href>/m/b.txt</D:href>").expect("b href");
    assert!(root < a && a < b, "children sorted by name");

    assert!(cache.get_dir_list("/m").is_some());
    assert!(cache.get_file("/m/a.txt").is_some());
    assert!(cache.get_file("/m/b.txt").is_some());
}

#[tokio::test(flavor = "multi_thread")]
async fn propfind_bad_depth_is_rejected() {
    let (handler, mem) = gateway();
    mem.add_file("/m/a.txt", &b"x"[..]);
    let resp = handler
        .handle(
            req("PROPFIND", "/m")
                .header("Depth", "2")
                .body(hyper::Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test(flavor = "multi_thread")]
async fn delete_invalidates_cache() {
    let (handler, mem) = gateway();
    mem.add_file("/m/b.txt", &b"bee"[..]);
    mem.add_file("/m/a.txt", &b"ay"[..]);
    let cache = handler.metadata_cache();

    // warm the cache
    let resp = handler
        .handle(
            req("PROPFIND", "/m")
                .header("Depth", "1")
                .body(hyper::Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(resp.status(), StatusCode::MULTI_STATUS);
    assert!(cache.get_file("/m/a.txt").is_some());

    let resp = handler
        .handle(req("DELETE", "/m/a.txt").body(hyper::Body::empty()).unwrap())
        .await;
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);

    assert!(cache.get_file("/m/a.txt").is_none());
    assert!(cache.get_dir_list("/m").is_none());
    assert!(!mem.contains("/m/a.txt"));

    // deleting it again is a 404, not a silent success
    let resp = handler
        .handle(req("DELETE", "/m/a.txt").body(hyper::Body::empty()).unwrap())
        .await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test(flavor = "multi_thread")]
async fn mkcol_semantics() {
    let (handler, _) = gateway();

    let resp = handler
        .handle(req("MKCOL", "/m/newdir").body(hyper::Body::empty()).unwrap())
        .await;
    assert_eq!(resp.status(), StatusCode::CREATED);

    // a body is not acceptable
    let resp = handler
        .handle(req("MKCOL", "/m/other").body(hyper::Body::from("x")).unwrap())
        .await;
    assert_eq!(resp.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);

    // absent parent is a conflict
    let resp = handler
        .handle(
            req("MKCOL", "/m/missing/dir")
                .body(hyper::Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(resp.status(), StatusCode::CONFLICT);
}

#[tokio::test(flavor = "multi_thread")]
async fn move_invalidates_every_affected_path() {
    let (handler, mem) = gateway();
    mem.add_file("/m/x.txt", &b"move me"[..]);
    mem.add_dir("/m/sub");
    let cache = handler.metadata_cache();

    // warm the cache along both directories
    for uri in ["/m", "/m/sub"] {
        let resp = handler
            .handle(
                req("PROPFIND", uri)
                    .header("Depth", "1")
                    .body(hyper::Body::empty())
                    .unwrap(),
            )
            .await;
        assert_eq!(resp.status(), StatusCode::MULTI_STATUS);
    }

    let resp = handler
        .handle(
            req("MOVE", "/m/x.txt")
                .header("Destination", "/m/sub/x.txt")
                .body(hyper::Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(resp.status(), StatusCode::CREATED);

    for path in ["/m", "/m/x.txt", "/m/sub", "/m/sub/x.txt"] {
        assert!(cache.get_file(path).is_none(), "{path} still cached");
        assert!(cache.get_dir_list(path).is_none(), "{path} listing still cached");
    }
    assert!(mem.contains("/m/sub/x.txt"));
    assert!(!mem.contains("/m/x.txt"));
}

#[tokio::test(flavor = "multi_thread")]
async fn copy_and_move_guards() {
    let (handler, mem) = gateway();
    mem.add_file("/m/x.txt", &b"x"[..]);

    // src == dst is forbidden
    let resp = handler
        .handle(
            req("COPY", "/m/x.txt")
                .header("Destination", "/m/x.txt")
                .body(hyper::Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    // cross-host destination is a bad gateway
    let resp = handler
        .handle(
            req("COPY", "/m/x.txt")
                .header("Host", "here.example")
                .header("Destination", "http://elsewhere.example/m/y.txt")
                .body(hyper::Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);

    // COPY with Depth: 1 is invalid
    let resp = handler
        .handle(
            req("COPY", "/m/x.txt")
                .header("Destination", "/m/y.txt")
                .header("Depth", "1")
                .body(hyper::Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    // a clean copy works and leaves the source alone
    let resp = handler
        .handle(
            req("COPY", "/m/x.txt")
                .header("Destination", "/m/y.txt")
                .body(hyper::Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    assert!(mem.contains("/m/x.txt"));
    assert!(mem.contains("/m/y.txt"));

    // refusing overwrite on an existing destination
    let resp = handler
        .handle(
            req("COPY", "/m/x.txt")
                .header("Destination", "/m/y.txt")
                .header("Overwrite", "F")
                .body(hyper::Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(resp.status(), StatusCode::PRECONDITION_FAILED);
}

#[tokio::test(flavor = "multi_thread")]
async fn options_advertises_dav() {
    let (handler, mem) = gateway();
    mem.add_file("/m/a.txt", &b"x"[..]);

    let resp = handler
        .handle(req("OPTIONS", "/m/a.txt").body(hyper::Body::empty()).unwrap())
        .await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(header(&resp, "DAV"), "1,2");
    let allow = header(&resp, "allow").to_string();
    assert!(allow.contains("GET"));
    assert!(allow.contains("PROPFIND"));
    assert!(allow.contains("LOCK"));
}

#[tokio::test(flavor = "multi_thread")]
async fn lock_unlock_roundtrip() {
    let (handler, mem) = gateway();
    mem.add_file("/m/a.txt", &b"x"[..]);

    let resp = handler
        .handle(
            req("LOCK", "/m/a.txt")
                .header("Timeout", "Second-120")
                .body(hyper::Body::from("<lockinfo/>"))
                .unwrap(),
        )
        .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let token = header(&resp, "Lock-Token").to_string();
    assert!(token.starts_with('<'));

    let resp = handler
        .handle(
            req("UNLOCK", "/m/a.txt")
                .header("Lock-Token", token)
                .body(hyper::Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);
}

#[tokio::test(flavor = "multi_thread")]
async fn virtual_root_lists_mounts() {
    let (handler, _) = gateway();

    let resp = handler
        .handle(
            req("PROPFIND", "/")
                .header("Depth", "1")
                .body(hyper::Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(resp.status(), StatusCode::MULTI_STATUS);
    let xml = String::from_utf8(body_bytes(resp.into_body()).await).unwrap();
    assert!(xml.contains("<D:href>/</D:href>"));
    assert!(xml.contains("<D:href>/m/</D:href>"));
}

#[tokio::test(flavor = "multi_thread")]
async fn proppatch_refuses_property_changes() {
    let (handler, mem) = gateway();
    mem.add_file("/m/a.txt", &b"x"[..]);

    let body = r#"<?xml version="1.0"?>
        <D:propertyupdate xmlns:D="DAV:">
          <D:set><D:prop><D:getetag>abc</D:getetag></D:prop></D:set>
        </D:propertyupdate>"#;
    let resp = handler
        .handle(
            req("PROPPATCH", "/m/a.txt")
                .body(hyper::Body::from(body))
                .unwrap(),
        )
        .await;
    assert_eq!(resp.status(), StatusCode::MULTI_STATUS);
    let xml = String::from_utf8(body_bytes(resp.into_body()).await).unwrap();
    assert!(xml.contains("403"));
    assert!(xml.contains("<D:getetag/>"));
}

#[tokio::test(flavor = "multi_thread")]
async fn resolve_link_consults_the_link_cache() {
    let (handler, mem) = gateway();
    mem.add_file("/m/a.txt", &b"hello"[..]);

    let link = handler.resolve_link("/m/a.txt").await.unwrap();
    assert_eq!(link.url, "mem:///m/a.txt");

    // second resolution is served from the link cache
    let cached = handler.resolve_link("/m/a.txt").await.unwrap();
    assert_eq!(cached.url, link.url);

    mem.add_dir("/m/d");
    assert!(handler.resolve_link("/m/d").await.is_err());
    assert!(handler.resolve_link("/m/nope").await.is_err());
}

#[tokio::test(flavor = "multi_thread")]
async fn put_then_read_your_writes() {
    let (handler, _) = gateway();

    let resp = handler
        .handle(
            req("PUT", "/m/fresh.txt")
                .body(hyper::Body::from("first"))
                .unwrap(),
        )
        .await;
    assert_eq!(resp.status(), StatusCode::CREATED);

    let resp = handler
        .handle(req("GET", "/m/fresh.txt").body(hyper::Body::empty()).unwrap())
        .await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_bytes(resp.into_body()).await, b"first");

    // overwrite must not serve stale cached metadata
    let resp = handler
        .handle(
            req("PUT", "/m/fresh.txt")
                .body(hyper::Body::from("second!"))
                .unwrap(),
        )
        .await;
    assert_eq!(resp.status(), StatusCode::CREATED);

    let resp = handler
        .handle(req("GET", "/m/fresh.txt").body(hyper::Body::empty()).unwrap())
        .await;
    assert_eq!(body_bytes(resp.into_body()).await, b"second!");
}
