//! Minimal thistle example: a class with hooks, aliases and a throttled
//! download.
//!
//! Run as a server:
//!   RUST_LOG=info cargo run --example basic
//!
//! Or answer a single request on stdout:
//!   cargo run --example basic -- /users/42
//!
//! Try:
//!   curl http://localhost:3000/users/42
//!   curl -X POST http://localhost:3000/users -d 'name=alice'
//!   curl -i http://localhost:3000/users/       (redirects to /users)
//!   curl http://localhost:3000/download        (1 KB per second)

use thistle::{App, Class, Context, Error, Outcome, Server, Value};

struct Users {
    calls: u32,
}

impl Users {
    fn show(&mut self, cx: &mut Context, _: &[Value]) -> String {
        self.calls += 1;
        let id = cx.param("id").unwrap_or("unknown");
        format!(r#"{{"id":"{id}","served":{}}}"#, self.calls)
    }

    fn create(&mut self, cx: &mut Context, _: &[Value]) -> Result<Outcome, Error> {
        let name = cx.hive.get("POST.name")?.map(|v| v.to_text()).unwrap_or_default();
        if name.is_empty() {
            cx.set_status(400);
            return Ok(Outcome::Abort);
        }
        cx.parse("id=99");
        cx.reroute("@user", false)
    }
}

fn list(cx: &mut Context, _: &[Value]) {
    cx.write(r#"[{"id":"42","name":"alice"}]"#);
}

fn download(cx: &mut Context, _: &[Value]) {
    cx.write("x".repeat(4096));
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt::init();

    let users = Class::new("Users", |_: &mut Context| Users { calls: 0 })
        .method("show", Users::show)
        .method("create", Users::create)
        .before_route(|_: &mut Users, cx: &mut Context, _: &[Value]| {
            cx.header("Content-Type", "application/json");
        })
        .service();

    let app = App::new()
        .class(users)
        .route("GET /users", list)?
        .route("GET @user: /users/@id", "Users->show")?
        .route("POST /users", "Users->create")?
        .route_with("GET /download", download, 0, 1)?
        .shared();

    let args: Vec<String> = std::env::args().collect();
    if args.len() > 1 {
        app.emulate(args).await?;
        return Ok(());
    }

    Server::bind("0.0.0.0:3000")?.serve(app).await
}
