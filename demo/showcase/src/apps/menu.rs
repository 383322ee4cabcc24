use std::sync::Arc;

use sundash_core::html::button;
use sundash_core::{App, ButtonClick, ComponentClass, ComponentContext, PageItem, Result};

const ROUTES: [(&str, &str); 3] = [("main", "Main"), ("trading", "Trading"), ("goals", "Goals")];

/// Header shared by every page; each button switches to the route named by its id.
pub fn menu() -> ComponentClass {
    let buttons: Vec<String> = ROUTES.iter().map(|(id, label)| button(id, label)).collect();
    ComponentClass::new("CoinyMenu")
        .html(format!(
            r#"<header><h1>🪙 Coiny</h1><div id="menu">{}</div></header>"#,
            buttons.join("<b>|</b>")
        ))
        .on("on_click", |ctx: ComponentContext, click: ButtonClick| async move {
            ctx.switch_page(&click.button_id).await
        })
}

pub fn app() -> Result<App> {
    let menu = Arc::new(menu());
    ROUTES
        .iter()
        .fold(App::builder(), |builder, (route, label)| {
            builder.page(
                *route,
                [
                    PageItem::from(Arc::clone(&menu)),
                    PageItem::from(format!("<p>{} Page</p>", label)),
                ],
            )
        })
        .build()
}
