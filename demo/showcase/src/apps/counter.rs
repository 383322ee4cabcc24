use sundash_core::html::button;
use sundash_core::{App, ButtonClick, ComponentClass, ComponentContext, PageItem, Result};

pub fn counter() -> ComponentClass {
    ComponentClass::new("Counter")
        .html(format!(
            "{}<b>{{{{ count }}}}</b>{}",
            button("minus", "-"),
            button("plus", "+")
        ))
        .var("count", 0)
        .on("on_click", |ctx: ComponentContext, click: ButtonClick| async move {
            let step = match click.button_id.as_str() {
                "plus" => 1,
                "minus" => -1,
                _ => return Ok(()),
            };
            let count = ctx.get("count").await.and_then(|v| v.as_i64()).unwrap_or(0);
            ctx.set("count", count + step).await
        })
}

pub fn app() -> Result<App> {
    App::builder()
        .page("main", [PageItem::from("<h1>🧮 Counter</h1>"), counter().into()])
        .build()
}
