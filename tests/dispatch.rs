use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, SystemTime};

use bytes::Bytes;
use thistle::{App, Class, Config, Context, Error, Method, Outcome, Probe, Request, Transport, Value};

fn hello(cx: &mut Context, args: &[Value]) -> String {
    let name = cx.param("name").unwrap_or_default().to_owned();
    assert_eq!(args[0].field("name"), Some(&Value::from(name.as_str())));
    assert_eq!(cx.request.pattern(), Some("/hello/@name"));
    format!("hello {name}")
}

fn ok(cx: &mut Context, _: &[Value]) {
    cx.write("ok");
}

fn me(cx: &mut Context, _: &[Value]) {
    cx.write("me");
}

fn by_id(cx: &mut Context, _: &[Value]) -> String {
    format!("id {}", cx.param("id").unwrap_or_default())
}

fn items() -> Result<Arc<App>, Error> {
    Ok(App::new()
        .route("GET /items", ok)?
        .route("POST /items", ok)?
        .shared())
}

#[tokio::test]
async fn tokens_are_captured_and_passed() {
    let app = App::new().route("GET /hello/@name", hello).unwrap().shared();
    let res = app.mock("GET /hello/ann").send().await.unwrap();
    assert_eq!(res.status(), 200);
    assert_eq!(res.text(), "hello ann");
    assert_eq!(res.header("X-Content-Type-Options"), Some("nosniff"));
    assert_eq!(res.header("X-Frame-Options"), Some("SAMEORIGIN"));
}

#[tokio::test]
async fn literal_segment_wins_over_token() {
    let app = App::new()
        .route("GET /users/@id", by_id)
        .unwrap()
        .route("GET /users/me", me)
        .unwrap()
        .shared();
    assert_eq!(app.mock("GET /users/me").send().await.unwrap().text(), "me");
    assert_eq!(app.mock("GET /users/7").send().await.unwrap().text(), "id 7");
}

#[tokio::test]
async fn wrong_verb_lists_allowed_verbs() {
    let app = items().unwrap();
    let res = app.mock("PUT /items").send().await.unwrap();
    assert_eq!(res.status(), 405);
    assert_eq!(res.header("Allow"), Some("GET,POST"));
}

#[tokio::test]
async fn options_answers_with_allow_only() {
    let app = items().unwrap();
    let res = app.mock("OPTIONS /items").send().await.unwrap();
    assert_eq!(res.status(), 200);
    assert_eq!(res.header("Allow"), Some("GET,POST"));
    assert!(res.body().is_empty());
}

#[tokio::test]
async fn unmatched_path_is_not_found() {
    let app = items().unwrap();
    let res = app.mock("GET /nope").send().await.unwrap();
    assert_eq!(res.status(), 404);
    assert!(res.text().contains("HTTP 404 (GET /nope)"));
    assert_eq!(res.header("Content-Type"), Some("text/html; charset=utf-8"));
}

#[tokio::test]
async fn ajax_errors_are_json() {
    let app = items().unwrap();
    let res = app.mock("GET /nope [ajax]").send().await.unwrap();
    let report: serde_json::Value = serde_json::from_slice(res.body()).unwrap();
    assert_eq!(report["code"], 404);
    assert_eq!(report["status"], "Not Found");
}

#[tokio::test]
async fn empty_table_is_an_error() {
    let res = App::new().shared().mock("GET /").send().await.unwrap();
    assert_eq!(res.status(), 500);
    assert!(res.text().contains("no routes specified"));
}

#[tokio::test]
async fn request_type_variants() {
    fn page(cx: &mut Context, _: &[Value]) { cx.write("page") }
    fn fragment(cx: &mut Context, _: &[Value]) { cx.write("fragment") }
    let app = App::new()
        .route("GET /panel", page)
        .unwrap()
        .route("GET /panel [ajax]", fragment)
        .unwrap()
        .shared();
    assert_eq!(app.mock("GET /panel").send().await.unwrap().text(), "page");
    assert_eq!(app.mock("GET /panel [ajax]").send().await.unwrap().text(), "fragment");
}

#[tokio::test]
async fn trailing_slash_redirect_keeps_query() {
    let app = App::new().route("GET /users", ok).unwrap().shared();
    let res = app.mock("GET /users/?page=2").send().await.unwrap();
    assert_eq!(res.status(), 302);
    assert_eq!(res.header("Location"), Some("/users?page=2"));

    let config = Config { permanent: true, ..Config::default() };
    let app = App::with_config(config).unwrap().route("GET /users", ok).unwrap().shared();
    let res = app.mock("GET /users/").send().await.unwrap();
    assert_eq!(res.status(), 301);
    assert_eq!(res.header("Location"), Some("/users"));
}

#[tokio::test]
async fn base_path_is_stripped_and_prefixed() {
    let config = Config { base: "/app".to_owned(), ..Config::default() };
    let app = App::with_config(config).unwrap().route("GET /users", ok).unwrap().shared();
    let res = app.mock("GET /users").send().await.unwrap();
    assert_eq!(res.text(), "ok");
    let res = app.mock("GET /users/").send().await.unwrap();
    assert_eq!(res.header("Location"), Some("/app/users"));
}

#[tokio::test]
async fn fresh_client_copy_gets_304() {
    let app = App::new().route_with("GET /cached", ok, 60, 0).unwrap().shared();
    let res = app.mock("GET /cached").send().await.unwrap();
    assert_eq!(res.status(), 200);
    assert_eq!(res.header("Cache-Control"), Some("max-age=60"));
    assert!(res.header("Expires").is_some());

    let since = httpdate::fmt_http_date(SystemTime::now());
    let res = app
        .mock("GET /cached")
        .header("If-Modified-Since", &since)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 304);
    assert!(res.body().is_empty());
}

#[tokio::test]
async fn uncached_routes_forbid_caching() {
    let app = App::new().route("GET /", ok).unwrap().shared();
    let res = app.mock("GET /").send().await.unwrap();
    assert_eq!(res.header("Cache-Control"), Some("no-cache, no-store, must-revalidate"));
}

#[tokio::test]
async fn aliases_build_urls() {
    fn link(cx: &mut Context, _: &[Value]) -> String {
        cx.build("@item(id=9)")
    }
    let app = App::new()
        .route("GET @item: /item/@id", ok)
        .unwrap()
        .route("GET /link", link)
        .unwrap()
        .shared();
    assert_eq!(app.mock("GET /link").send().await.unwrap().text(), "/item/9");
    assert_eq!(app.mock("GET @item(id=3)").send().await.unwrap().text(), "ok");
}

#[tokio::test]
async fn reroute_to_alias() {
    fn moved(cx: &mut Context, _: &[Value]) -> Result<Outcome, Error> {
        cx.reroute("@item(id=3)", false)
    }
    let app = App::new()
        .route("GET @item: /item/@id", by_id)
        .unwrap()
        .route("GET /old", moved)
        .unwrap()
        .shared();
    let res = app.mock("GET /old").send().await.unwrap();
    assert_eq!(res.status(), 302);
    assert_eq!(res.header("Location"), Some("/item/3"));

    let res = app.emulate(["prog".to_owned(), "/old".to_owned()]).await.unwrap();
    assert_eq!(res.text(), "id 3");
}

struct Guarded {
    hits: Arc<AtomicUsize>,
}

fn guarded_app(hits: &Arc<AtomicUsize>) -> Arc<App> {
    let hits = Arc::clone(hits);
    let class = Class::new("Guarded", move |_: &mut Context| Guarded { hits: Arc::clone(&hits) })
        .before_route(|this: &mut Guarded, cx: &mut Context, _: &[Value]| {
            this.hits.fetch_add(1, Ordering::SeqCst);
            if cx.request.header("Authorization").is_none() {
                cx.set_status(401);
                return Outcome::Abort;
            }
            Outcome::Continue(Value::Null)
        })
        .method("secret", |this: &mut Guarded, cx: &mut Context, _: &[Value]| {
            this.hits.fetch_add(10, Ordering::SeqCst);
            cx.write("secret");
        })
        .after_route(|this: &mut Guarded, _: &mut Context, _: &[Value]| {
            this.hits.fetch_add(100, Ordering::SeqCst);
        });
    App::new()
        .class(class)
        .route("GET /secret", "Guarded->secret")
        .unwrap()
        .shared()
}

#[tokio::test]
async fn aborting_before_hook_skips_handler_and_after_hook() {
    let hits = Arc::new(AtomicUsize::new(0));
    let app = guarded_app(&hits);

    let res = app.mock("GET /secret").send().await.unwrap();
    assert_eq!(res.status(), 401);
    assert!(res.body().is_empty());
    assert_eq!(hits.load(Ordering::SeqCst), 1);

    let res = app
        .mock("GET /secret")
        .header("Authorization", "Bearer x")
        .send()
        .await
        .unwrap();
    assert_eq!(res.text(), "secret");
    assert_eq!(hits.load(Ordering::SeqCst), 1 + 111);
}

struct Pages;

#[tokio::test]
async fn handler_descriptors_take_tokens() {
    let pages = Class::new("Pages", |_: &mut Context| Pages)
        .method("about", |_: &mut Pages, _: &mut Context, _: &[Value]| "about us");
    let app = App::new()
        .class(pages)
        .route("GET /c/@action", "Pages->@action")
        .unwrap()
        .route("GET /ghost", "Ghost->boo")
        .unwrap()
        .shared();

    assert_eq!(app.mock("GET /c/about").send().await.unwrap().text(), "about us");

    let res = app.mock("GET /c/missing").send().await.unwrap();
    assert_eq!(res.status(), 500);
    assert!(res.text().contains("invalid method Pages-&gt;missing"));

    assert_eq!(app.mock("GET /ghost").send().await.unwrap().status(), 404);
}

struct Counter {
    n: u64,
}

#[tokio::test]
async fn service_instances_persist_across_requests() {
    let counter = Class::new("Counter", |_: &mut Context| Counter { n: 0 })
        .method("bump", |this: &mut Counter, _: &mut Context, _: &[Value]| {
            this.n += 1;
            this.n.to_string()
        })
        .service();
    let app = App::new().class(counter).route("GET /bump", "Counter->bump").unwrap().shared();
    app.mock("GET /bump").send().await.unwrap();
    assert_eq!(app.mock("GET /bump").send().await.unwrap().text(), "2");
}

#[tokio::test]
async fn map_routes_verbs_to_members() {
    let rest = Class::new("Item", |_: &mut Context| Pages)
        .method("get", |_: &mut Pages, _: &mut Context, _: &[Value]| "read")
        .method("delete", |_: &mut Pages, _: &mut Context, _: &[Value]| "gone");
    let app = App::new().class(rest).map("/item/@id", "Item").unwrap().shared();
    assert_eq!(app.mock("GET /item/1").send().await.unwrap().text(), "read");
    assert_eq!(app.mock("DELETE /item/1").send().await.unwrap().text(), "gone");
    let res = app.mock("POST /item/1").send().await.unwrap();
    assert_eq!(res.status(), 405);
    assert_eq!(res.header("Allow"), Some("GET,DELETE"));
}

#[tokio::test]
async fn map_with_token_class_routes_every_verb() {
    let rest = Class::new("Item", |_: &mut Context| Pages)
        .method("put", |_: &mut Pages, _: &mut Context, _: &[Value]| "stored");
    let app = App::new().class(rest).map("/@kind/@id", "@kind").unwrap().shared();
    assert_eq!(app.mock("PUT /Item/1").send().await.unwrap().text(), "stored");
    assert_eq!(app.mock("PATCH /Item/1").send().await.unwrap().status(), 500);
    assert_eq!(app.mock("PUT /Nobody/1").send().await.unwrap().status(), 404);
}

#[tokio::test]
async fn method_field_overrides_post() {
    let app = App::new().route("PUT /doc", ok).unwrap().shared();
    let res = app.mock("POST /doc").arg("_method", "put").send().await.unwrap();
    assert_eq!(res.text(), "ok");
}

#[tokio::test]
async fn post_arguments_reach_request_namespace() {
    fn form(cx: &mut Context, _: &[Value]) -> Result<String, Error> {
        let post = cx.hive.get("POST.x")?.map(|v| v.to_text()).unwrap_or_default();
        let request = cx.hive.get("REQUEST.x")?.map(|v| v.to_text()).unwrap_or_default();
        Ok(format!("{post}/{request}/{}", String::from_utf8_lossy(cx.request.body())))
    }
    let app = App::new().route("POST /form", form).unwrap().shared();
    let res = app.mock("POST /form").arg("x", "1 2").send().await.unwrap();
    assert_eq!(res.text(), "1 2/1 2/x=1+2");
}

#[tokio::test]
async fn query_arguments_reach_get_namespace() {
    fn search(cx: &mut Context, _: &[Value]) -> Result<String, Error> {
        Ok(cx.hive.get("GET.q")?.map(|v| v.to_text()).unwrap_or_default())
    }
    let app = App::new().route("GET /search", search).unwrap().shared();
    let res = app.mock("GET /search").arg("q", "rust").send().await.unwrap();
    assert_eq!(res.text(), "rust");
}

#[tokio::test]
async fn cookies_are_sent_with_the_head() {
    fn theme(cx: &mut Context, _: &[Value]) -> Result<(), Error> {
        cx.hive.set("COOKIE.theme", "dark")
    }
    let app = App::new().route("GET /theme", theme).unwrap().shared();
    let res = app.mock("GET /theme").send().await.unwrap();
    let cookies = res.header_all("Set-Cookie");
    assert_eq!(cookies.len(), 1);
    assert!(cookies[0].starts_with("theme=dark"));
    assert!(cookies[0].contains("HttpOnly"));
}

#[tokio::test]
async fn panics_become_fatal_errors() {
    fn boom(_: &mut Context, _: &[Value]) {
        panic!("kaboom");
    }
    let app = App::new().route("GET /boom", boom).unwrap().shared();
    let res = app.mock("GET /boom").send().await.unwrap();
    assert_eq!(res.status(), 500);
    assert!(res.text().contains("kaboom"));
}

#[tokio::test]
async fn error_handler_replaces_default_page() {
    fn custom(cx: &mut Context, _: &[Value]) -> Result<(), Error> {
        let code = cx.hive.get("ERROR.code")?.map(|v| v.to_text()).unwrap_or_default();
        cx.write(format!("custom {code}"));
        Ok(())
    }
    let app = App::new()
        .route("GET /", ok)
        .unwrap()
        .on_error(custom)
        .shared();
    let res = app.mock("GET /missing").send().await.unwrap();
    assert_eq!(res.status(), 404);
    assert_eq!(res.text(), "custom 404");
}

#[tokio::test]
async fn unload_runs_after_every_request() {
    let seen = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&seen);
    let app = App::new()
        .route("GET /", ok)
        .unwrap()
        .on_unload(move |_: &mut Context, _: &[Value]| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .shared();
    app.mock("GET /").send().await.unwrap();
    app.mock("GET /missing").send().await.unwrap();
    assert_eq!(seen.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn throttled_routes_pace_chunks() {
    fn big(cx: &mut Context, _: &[Value]) {
        cx.write("x".repeat(3000));
    }
    let app = App::new().route_with("GET /big", big, 0, 1).unwrap().shared();
    let started = tokio::time::Instant::now();
    let res = app.mock("GET /big").send().await.unwrap();
    let elapsed = started.elapsed();
    assert_eq!(res.body().len(), 3000);
    assert_eq!(res.chunks(), 3);
    assert!(elapsed >= Duration::from_secs(3), "{elapsed:?}");
    assert!(elapsed < Duration::from_secs(4), "{elapsed:?}");
}

#[tokio::test]
async fn quiet_mode_sends_head_only() {
    let config = Config { quiet: true, ..Config::default() };
    let app = App::with_config(config).unwrap().route("GET /", ok).unwrap().shared();
    let res = app.mock("GET /").send().await.unwrap();
    assert_eq!(res.status(), 200);
    assert!(res.body().is_empty());
}

#[tokio::test]
async fn denied_clients_are_forbidden() {
    let config = Config { deny: vec!["10.9.8.7".to_owned()], ..Config::default() };
    let app = App::with_config(config).unwrap().route("GET /", ok).unwrap().shared();
    let mut transport = thistle::Captured::new();
    let request = Request::new(Method::Get, "/").with_ip("10.9.8.7");
    app.handle(request, &mut transport).await;
    assert_eq!(transport.status, 403);
}

#[tokio::test]
async fn routes_table_from_config() {
    let config = Config::from_toml_str(
        r#"
        [routes]
        "GET /about" = "Pages->about"
        "#,
    )
    .unwrap();
    let pages = Class::new("Pages", |_: &mut Context| Pages)
        .static_fn("about", |_: &mut Context, _: &[Value]| "static about");
    let app = App::with_config(config).unwrap().class(pages).shared();
    let res = app.mock("GET /about").send().await.unwrap();
    assert_eq!(res.status(), 500);

    let config = Config::from_toml_str("[routes]\n\"GET /about\" = \"Pages::about\"\n").unwrap();
    let pages = Class::new("Pages", |_: &mut Context| Pages)
        .static_fn("about", |_: &mut Context, _: &[Value]| "static about");
    let app = App::with_config(config).unwrap().class(pages).shared();
    assert_eq!(app.mock("GET /about").send().await.unwrap().text(), "static about");
}

#[tokio::test]
async fn mutex_runs_handler_under_lock() {
    let dir = tempfile::tempdir().unwrap();
    let temp = format!("{}/", dir.path().display());
    fn locked(cx: &mut Context, _: &[Value]) -> Result<Outcome, Error> {
        cx.mutex("job", |cx: &mut Context, _: &[Value]| cx.write("inside"), &[])
    }
    let config = Config { temp, ..Config::default() };
    let app = App::with_config(config).unwrap().route("GET /job", locked).unwrap().shared();
    assert_eq!(app.mock("GET /job").send().await.unwrap().text(), "inside");
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[test]
fn registration_errors_surface_immediately() {
    assert!(matches!(App::new().route("GET @nowhere", ok), Err(Error::UnknownAlias(_))));
    assert!(matches!(App::new().route("BREW /pot", ok), Err(Error::UnsupportedMethod(_))));
    assert!(matches!(App::new().map("/x", "Nobody"), Err(Error::UnknownClass(_))));
}

#[tokio::test]
async fn malformed_mock_descriptor_is_rejected() {
    let app = items().unwrap();
    assert!(matches!(app.mock("nonsense").send().await, Err(Error::InvalidPattern(_))));
    assert!(matches!(app.mock("GET @ghost").send().await, Err(Error::UnknownAlias(_))));
}

#[tokio::test]
async fn service_member_may_call_its_own_service() {
    let counter = Class::new("Counter", |_: &mut Context| Counter { n: 0 })
        .method("bump", |this: &mut Counter, _: &mut Context, _: &[Value]| {
            this.n += 1;
            this.n.to_string()
        })
        .method("outer", |this: &mut Counter, cx: &mut Context, _: &[Value]| -> Result<String, Error> {
            this.n += 10;
            let inner = cx.call("Counter->bump", &[], "")?.into_value();
            Ok(format!("{} {inner}", this.n))
        })
        .service();
    let app = App::new()
        .class(counter)
        .route("GET /outer", "Counter->outer")
        .unwrap()
        .route("GET /bump", "Counter->bump")
        .unwrap()
        .shared();
    assert_eq!(app.mock("GET /outer").send().await.unwrap().text(), "10 1");
    assert_eq!(app.mock("GET /bump").send().await.unwrap().text(), "11");
}

#[tokio::test]
async fn sessions_are_per_client() {
    fn login(cx: &mut Context, _: &[Value]) -> Result<(), Error> {
        cx.hive.set("SESSION.user", "alice")
    }
    fn whoami(cx: &mut Context, _: &[Value]) -> Result<String, Error> {
        Ok(cx.hive.get("SESSION.user")?.map(|v| v.to_text()).unwrap_or_default())
    }
    let app = App::new()
        .route("GET /login", login)
        .unwrap()
        .route("GET /whoami", whoami)
        .unwrap()
        .shared();

    let res = app.mock("GET /login").send().await.unwrap();
    let cookie = res.header("Set-Cookie").unwrap();
    assert!(cookie.starts_with("SESSID="));
    let sid = cookie.split(';').next().unwrap().to_owned();

    assert_eq!(app.mock("GET /whoami").send().await.unwrap().text(), "");
    let res = app.mock("GET /whoami").header("Cookie", &sid).send().await.unwrap();
    assert_eq!(res.text(), "alice");
    assert!(res.header("Set-Cookie").is_none());
}

#[tokio::test]
async fn accept_language_is_negotiated() {
    fn lang(cx: &mut Context, _: &[Value]) -> Result<String, Error> {
        Ok(cx.hive.get("LANGUAGE")?.map(|v| v.to_text()).unwrap_or_default())
    }
    let app = App::new().route("GET /lang", lang).unwrap().shared();
    let res = app.mock("GET /lang").header("Accept-Language", "fr-CA,fr;q=0.8").send().await.unwrap();
    assert_eq!(res.text(), "fr-CA,fr,en");
    assert_eq!(app.mock("GET /lang").send().await.unwrap().text(), "en");
}

#[tokio::test]
async fn huge_ttl_still_answers() {
    let app = App::new().route_with("GET /forever", ok, u64::MAX, 0).unwrap().shared();
    let res = app.mock("GET /forever").send().await.unwrap();
    assert_eq!(res.status(), 200);
    assert_eq!(res.header("Cache-Control"), Some(format!("max-age={}", u64::MAX).as_str()));
    assert!(res.header("Expires").is_some());
}

#[tokio::test]
async fn chain_and_relay_pass_results() {
    fn double(_: &mut Context, args: &[Value]) -> Value {
        Value::Int(args[0].as_int().unwrap_or(0) * 2)
    }
    fn plus_one(cx: &mut Context, args: &[Value]) -> Result<Value, Error> {
        cx.hive.push("trail", "plus_one")?;
        Ok(Value::Int(args[0].as_int().unwrap_or(0) + 1))
    }
    fn halt(_: &mut Context, _: &[Value]) -> Outcome {
        Outcome::Abort
    }
    fn pipeline(cx: &mut Context, _: &[Value]) -> Result<String, Error> {
        let each: Vec<String> = cx
            .chain(["double", "plus_one"], &[Value::Int(5)])?
            .into_iter()
            .map(|o| o.into_value().to_text())
            .collect();
        let relayed = cx.relay(["double", "plus_one", "double"], &[Value::Int(1)])?;
        let stopped = cx.relay(["double", "halt", "plus_one"], &[Value::Int(1)])?;
        let trail = cx.hive.get("trail")?.map(|v| v.to_list().len()).unwrap_or(0);
        Ok(format!("{} {} {} {trail}", each.join(","), relayed.into_value(), stopped.is_abort()))
    }
    let app = App::new()
        .function("double", double)
        .function("plus_one", plus_one)
        .function("halt", halt)
        .route("GET /pipeline", pipeline)
        .unwrap()
        .shared();
    assert_eq!(app.mock("GET /pipeline").send().await.unwrap().text(), "10,6 6 true 2");
}

/// Accepts one body chunk, then reports the client as gone.
struct HangsUp {
    chunks: Arc<AtomicUsize>,
    gone: Arc<AtomicBool>,
}

impl Transport for HangsUp {
    async fn head(&mut self, _: u16, _: Vec<(String, String)>) -> Result<(), Error> {
        Ok(())
    }

    async fn chunk(&mut self, _: Bytes) -> Result<(), Error> {
        self.chunks.fetch_add(1, Ordering::SeqCst);
        self.gone.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn probe(&self) -> Probe {
        let gone = Arc::clone(&self.gone);
        Arc::new(move || gone.load(Ordering::SeqCst))
    }
}

#[tokio::test(start_paused = true)]
async fn throttled_transfer_stops_when_client_leaves() {
    fn download(cx: &mut Context, _: &[Value]) {
        cx.write("x".repeat(4096));
    }
    let app = App::new().route_with("GET /download", download, 0, 1).unwrap().shared();
    let chunks = Arc::new(AtomicUsize::new(0));
    let mut transport = HangsUp { chunks: Arc::clone(&chunks), gone: Arc::new(AtomicBool::new(false)) };
    app.handle(Request::new(Method::Get, "/download"), &mut transport).await;
    assert_eq!(chunks.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn exempt_and_non_ipv4_clients_skip_blocklists() {
    let config = Config {
        dnsbl: vec!["dnsbl.invalid".to_owned()],
        exempt: vec!["10.0.0.7".to_owned()],
        ..Config::default()
    };
    let app = App::with_config(config).unwrap().route("GET /", ok).unwrap().shared();
    for ip in ["10.0.0.7", "::1"] {
        let mut transport = thistle::Captured::new();
        app.handle(Request::new(Method::Get, "/").with_ip(ip), &mut transport).await;
        assert_eq!(transport.status, 200, "{ip}");
    }
}

#[tokio::test]
async fn verb_falls_through_to_less_specific_template() {
    let app = App::new()
        .route("POST /users/me", me)
        .unwrap()
        .route("GET /users/@id", by_id)
        .unwrap()
        .shared();
    assert_eq!(app.mock("GET /users/me").send().await.unwrap().text(), "id me");
    assert_eq!(app.mock("POST /users/me").send().await.unwrap().text(), "me");
}

#[tokio::test]
async fn trailing_slash_redirect_drops_one_slash() {
    let app = App::new().route("GET /dir/", ok).unwrap().shared();
    let res = app.mock("GET /dir//").send().await.unwrap();
    assert_eq!(res.status(), 302);
    assert_eq!(res.header("Location"), Some("/dir/"));
}
