use sundash_core::html::table_component;
use sundash_core::{App, ComponentClass, PageItem, Result};

const COMPANIES: [[&str; 4]; 3] = [
    ["company", "contact", "country", "employees"],
    ["Alfreds Futterkiste", "Maria Anders", "Germany", "65"],
    ["Centro comercial Moctezuma", "Francisco Chang", "Mexico", "349"],
];

pub fn company_view() -> ComponentClass {
    table_component("CompanyView", &COMPANIES)
}

pub fn app() -> Result<App> {
    App::builder()
        .page("main", [PageItem::from("<h1>📋 Tables</h1>"), company_view().into()])
        .build()
}
