mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use sundash_core::{
    App, ButtonClick, ClientConnected, ClientDisconnected, ComponentClass, ComponentContext,
    InputUpdated, Message, PageItem, Result, Session, SessionHook, SetVar, SundashError,
    UpdateLayout,
};

use common::{assert_quiet, connect, next_command, WAIT};

fn counter() -> ComponentClass {
    ComponentClass::new("Counter")
        .html(r#"<p>{{ count }}</p><button id="plus">+</button>"#)
        .var("count", 0)
        .on("increment", |ctx: ComponentContext, click: ButtonClick| async move {
            if click.button_id != "plus" {
                return Ok(());
            }
            let count = ctx.get("count").await.and_then(|v| v.as_i64()).unwrap_or(0);
            ctx.set("count", count + 1).await
        })
}

fn counter_app() -> Arc<App> {
    Arc::new(App::builder().page("main", [counter()]).build().unwrap())
}

#[tokio::test]
async fn test_counter_round_trip() -> Result<()> {
    let app = counter_app();
    let (mut client, handle) = connect(&app);

    let update: UpdateLayout = next_command(&mut client).await.decode()?;
    assert!(update.html.contains(r#"<span data-sundash-var="count">0</span>"#));
    assert_eq!(update.vars["count"], json!(0));

    client.send(r#"ButtonClick {"button_id": "plus"}"#).await?;
    let set: SetVar = next_command(&mut client).await.decode()?;
    assert_eq!(set.name, "count");
    assert_eq!(set.value, json!(1));

    client.send(r#"ButtonClick {"button_id": "plus"}"#).await?;
    let set: SetVar = next_command(&mut client).await.decode()?;
    assert_eq!(set.value, json!(2));

    // Other buttons are ignored by the counter.
    client.send(r#"ButtonClick {"button_id": "minus"}"#).await?;
    assert_quiet(&mut client).await;

    client.disconnect();
    tokio::time::timeout(WAIT, handle).await.unwrap().unwrap()?;
    assert_eq!(app.open_sessions(), 0);
    assert!(app.registry().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_sessions_are_isolated() -> Result<()> {
    let app = counter_app();
    let (mut a, _ha) = connect(&app);
    let (mut b, _hb) = connect(&app);
    next_command(&mut a).await;
    next_command(&mut b).await;

    a.send(r#"ButtonClick {"button_id": "plus"}"#).await?;
    a.send(r#"ButtonClick {"button_id": "plus"}"#).await?;
    assert_eq!(next_command(&mut a).await.decode::<SetVar>()?.value, json!(1));
    assert_eq!(next_command(&mut a).await.decode::<SetVar>()?.value, json!(2));
    assert_quiet(&mut b).await;

    b.send(r#"ButtonClick {"button_id": "plus"}"#).await?;
    assert_eq!(next_command(&mut b).await.decode::<SetVar>()?.value, json!(1));
    assert_quiet(&mut a).await;
    assert_eq!(app.open_sessions(), 2);
    Ok(())
}

#[tokio::test]
async fn test_events_handled_in_arrival_order() -> Result<()> {
    let order = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&order);
    let recorder = ComponentClass::new("Recorder")
        .html("{{ last }}")
        .var("last", "")
        .on("record", move |ctx: ComponentContext, click: ButtonClick| {
            let seen = Arc::clone(&seen);
            async move {
                if click.button_id == "slow" {
                    tokio::time::sleep(Duration::from_millis(50)).await;
                }
                seen.lock().unwrap().push(click.button_id.clone());
                ctx.set("last", click.button_id).await
            }
        });
    let app = Arc::new(App::builder().page("main", [recorder]).build()?);
    let (mut client, _handle) = connect(&app);
    next_command(&mut client).await;

    client.send(r#"ButtonClick {"button_id": "slow"}"#).await?;
    client.send(r#"ButtonClick {"button_id": "fast"}"#).await?;

    assert_eq!(next_command(&mut client).await.decode::<SetVar>()?.value, json!("slow"));
    assert_eq!(next_command(&mut client).await.decode::<SetVar>()?.value, json!("fast"));
    assert_eq!(*order.lock().unwrap(), vec!["slow", "fast"]);
    Ok(())
}

#[tokio::test]
async fn test_page_switch_rebinds_callbacks() -> Result<()> {
    let hits = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&hits);
    let menu = Arc::new(
        ComponentClass::new("Menu")
            .html(r#"<button id="main">Main</button><button id="trading">Trading</button>"#)
            .on("navigate", |ctx: ComponentContext, click: ButtonClick| async move {
                ctx.switch_page(&click.button_id).await
            }),
    );
    let search = ComponentClass::new("Search")
        .html("<input name=\"q\">")
        .on("typed", move |_ctx: ComponentContext, _input: InputUpdated| {
            let seen = Arc::clone(&seen);
            async move {
                seen.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        });
    let app = Arc::new(
        App::builder()
            .page(
                "main",
                [
                    PageItem::from(Arc::clone(&menu)),
                    PageItem::from("<p>Main Page</p>"),
                    PageItem::from(search),
                ],
            )
            .page(
                "trading",
                [PageItem::from(menu), PageItem::from("<p>Trading Page</p>")],
            )
            .build()?,
    );
    let (mut client, handle) = connect(&app);

    let update: UpdateLayout = next_command(&mut client).await.decode()?;
    assert!(update.html.contains("Main Page"));
    assert_eq!(app.registry().subscriber_count("InputUpdated"), 1);

    client.send(r#"ButtonClick {"button_id": "trading"}"#).await?;
    let update: UpdateLayout = next_command(&mut client).await.decode()?;
    assert!(update.html.contains("Trading Page"));
    assert!(!update.html.contains("Main Page"));
    assert_eq!(app.registry().subscriber_count("InputUpdated"), 0);
    assert_eq!(app.registry().subscriber_count("ButtonClick"), 1);

    // Search is gone with the main page.
    client.send(r#"InputUpdated {"name": "q", "value": "acme"}"#).await?;
    // Unknown route: logged, the session keeps its page.
    client.send(r#"ButtonClick {"button_id": "settings"}"#).await?;
    client.send(r#"ButtonClick {"button_id": "main"}"#).await?;
    let update: UpdateLayout = next_command(&mut client).await.decode()?;
    assert!(update.html.contains("Main Page"));
    assert_eq!(hits.load(Ordering::SeqCst), 0);

    client.send(r#"InputUpdated {"name": "q", "value": "acme"}"#).await?;
    client.disconnect();
    tokio::time::timeout(WAIT, handle).await.unwrap().unwrap()?;
    assert_eq!(hits.load(Ordering::SeqCst), 1);
    Ok(())
}

#[tokio::test]
async fn test_malformed_frame_ends_only_that_session() -> Result<()> {
    let app = counter_app();
    let (mut a, handle_a) = connect(&app);
    let (mut b, _hb) = connect(&app);
    next_command(&mut a).await;
    next_command(&mut b).await;

    a.send("Bogus {}").await?;
    let outcome = tokio::time::timeout(WAIT, handle_a).await.unwrap().unwrap();
    assert!(matches!(outcome, Err(SundashError::ProtocolDecode { .. })));
    assert_eq!(a.recv_timeout(WAIT).await, None);
    assert_eq!(app.open_sessions(), 1);
    assert_eq!(app.registry().subscriber_count("ButtonClick"), 1);

    b.send(r#"ButtonClick {"button_id": "plus"}"#).await?;
    assert_eq!(next_command(&mut b).await.decode::<SetVar>()?.value, json!(1));
    Ok(())
}

#[tokio::test]
async fn test_client_cannot_forge_server_events() -> Result<()> {
    let app = counter_app();
    let (mut client, handle) = connect(&app);
    next_command(&mut client).await;

    client.send("EverySecond {}").await?;
    let outcome = tokio::time::timeout(WAIT, handle).await.unwrap().unwrap();
    assert!(matches!(outcome, Err(SundashError::ProtocolDecode { .. })));
    Ok(())
}

#[tokio::test]
async fn test_unknown_variable_terminates_session() -> Result<()> {
    let typo = ComponentClass::new("Typo")
        .html("{{ count }}")
        .var("count", 0)
        .on("bump", |ctx: ComponentContext, _click: ButtonClick| async move {
            ctx.set("cnt", 1).await
        });
    let app = Arc::new(App::builder().page("main", [typo]).build()?);
    let (mut client, handle) = connect(&app);
    next_command(&mut client).await;

    client.send(r#"ButtonClick {"button_id": "x"}"#).await?;
    let outcome = tokio::time::timeout(WAIT, handle).await.unwrap().unwrap();

    assert!(matches!(outcome, Err(SundashError::UnknownVariable { .. })));
    assert_eq!(client.recv_timeout(WAIT).await, None);
    assert!(app.registry().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_free_callback_sees_current_session() -> Result<()> {
    let app = Arc::new(
        App::builder()
            .page("main", ["<p>echo</p>"])
            .on("echo", |click: ButtonClick| async move {
                let session = Session::current().ok_or_else(|| {
                    SundashError::Callback("no current session".into())
                })?;
                session
                    .send_command(&SetVar {
                        name: "echo".into(),
                        value: json!(format!("{}:{}", session.id(), click.button_id)),
                    })
                    .await
            })
            .build()?,
    );
    let (mut a, _ha) = connect(&app);
    let (mut b, _hb) = connect(&app);
    next_command(&mut a).await;
    next_command(&mut b).await;

    a.send(r#"ButtonClick {"button_id": "ping"}"#).await?;
    b.send(r#"ButtonClick {"button_id": "pong"}"#).await?;

    let from_a = next_command(&mut a).await.decode::<SetVar>()?.value;
    let from_b = next_command(&mut b).await.decode::<SetVar>()?.value;
    assert!(from_a.as_str().unwrap().ends_with(":ping"));
    assert!(from_b.as_str().unwrap().ends_with(":pong"));
    assert_ne!(
        from_a.as_str().unwrap().split(':').next(),
        from_b.as_str().unwrap().split(':').next()
    );
    assert!(Session::current().is_none());
    Ok(())
}

#[tokio::test]
async fn test_lifecycle_events_and_hooks() -> Result<()> {
    struct Tracker(Mutex<Vec<String>>);

    #[async_trait]
    impl SessionHook for Tracker {
        async fn on_session_open(&self, session: &Arc<Session>) -> Result<()> {
            self.0.lock().unwrap().push(format!("open {}", session.id()));
            Ok(())
        }

        async fn on_session_close(&self, session: &Arc<Session>) {
            self.0.lock().unwrap().push(format!("close {}", session.id()));
        }
    }

    let tracker = Arc::new(Tracker(Mutex::new(Vec::new())));
    let log = Arc::clone(&tracker);
    let connected = Arc::clone(&tracker);
    let app = Arc::new(
        App::builder()
            .page("main", ["<p>hi</p>"])
            .hook(tracker.clone())
            .on("welcome", move |_: ClientConnected| {
                let log = Arc::clone(&connected);
                async move {
                    log.0.lock().unwrap().push("connected".into());
                    Ok(())
                }
            })
            .on("farewell", move |_: ClientDisconnected| {
                let log = Arc::clone(&log);
                async move {
                    log.0.lock().unwrap().push("disconnected".into());
                    Ok(())
                }
            })
            .build()?,
    );

    let (mut client, handle) = connect(&app);
    next_command(&mut client).await;
    client.disconnect();
    tokio::time::timeout(WAIT, handle).await.unwrap().unwrap()?;

    assert_eq!(
        *tracker.0.lock().unwrap(),
        vec!["open 1", "connected", "close 1", "disconnected"]
    );
    Ok(())
}

#[tokio::test]
async fn test_failing_open_hook_ends_session() {
    struct Reject;

    #[async_trait]
    impl SessionHook for Reject {
        async fn on_session_open(&self, _session: &Arc<Session>) -> Result<()> {
            Err(SundashError::Callback("not today".into()))
        }

        async fn on_session_close(&self, _session: &Arc<Session>) {}
    }

    let app = Arc::new(
        App::builder()
            .page("main", [counter()])
            .hook(Arc::new(Reject))
            .build()
            .unwrap(),
    );
    let (mut client, handle) = connect(&app);

    let outcome = tokio::time::timeout(WAIT, handle).await.unwrap().unwrap();
    assert!(matches!(outcome, Err(SundashError::Callback(_))));
    assert_eq!(client.recv_timeout(WAIT).await, None);
    assert!(app.registry().is_empty());
}

#[tokio::test]
async fn test_aborted_session_is_released() -> Result<()> {
    let disconnected = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&disconnected);
    let app = Arc::new(
        App::builder()
            .page("main", [counter()])
            .scheduler(Duration::from_secs(60))
            .on("farewell", move |_: ClientDisconnected| {
                let seen = Arc::clone(&seen);
                async move {
                    seen.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            })
            .build()?,
    );
    let (mut client, handle) = connect(&app);
    next_command(&mut client).await;
    assert_eq!(app.open_sessions(), 1);
    assert_eq!(app.scheduler().unwrap().len(), 1);
    assert_eq!(app.registry().subscriber_count(ButtonClick::KIND), 1);

    handle.abort();
    assert!(handle.await.unwrap_err().is_cancelled());

    assert_eq!(app.registry().subscriber_count(ButtonClick::KIND), 0);
    assert_eq!(app.open_sessions(), 0);
    assert!(app.scheduler().unwrap().is_empty());

    // Close hooks and disconnect callbacks still run, then the sink closes.
    assert_eq!(client.recv_timeout(WAIT).await, None);
    assert_eq!(disconnected.load(Ordering::SeqCst), 1);
    Ok(())
}

#[test]
fn test_app_needs_a_page() {
    assert!(matches!(
        App::builder().build(),
        Err(SundashError::InvalidDeclaration(_))
    ));
}

#[test]
fn test_builder_reports_first_declaration_error() {
    let result = App::builder()
        .page("main", [ComponentClass::new("Broken").html("{{ nope }}")])
        .default_route("nowhere")
        .build();
    assert!(matches!(result, Err(SundashError::InvalidDeclaration(_))));
}

#[test]
fn test_zero_tick_period_rejected() {
    let result = App::builder()
        .page("main", ["<p>x</p>"])
        .scheduler(Duration::ZERO)
        .build();
    assert!(matches!(result, Err(SundashError::InvalidDeclaration(_))));
}
