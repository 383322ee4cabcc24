use std::time::Duration;

use chrono::Local;
use sundash_core::{App, ComponentClass, ComponentContext, EverySecond, PageItem, Result};

fn now() -> String {
    Local::now().format("%H:%M:%S").to_string()
}

pub fn clock() -> ComponentClass {
    ComponentClass::new("Clock")
        .html("<p><b>Time: </b>{{ time }}</p>")
        .var_with("time", now)
        .on("update", |ctx: ComponentContext, _tick: EverySecond| async move {
            ctx.set("time", now()).await
        })
}

pub fn app(tick_period: Duration) -> Result<App> {
    App::builder()
        .page("main", [PageItem::from("<h1>🕰 Clock</h1>"), clock().into()])
        .scheduler(tick_period)
        .build()
}
