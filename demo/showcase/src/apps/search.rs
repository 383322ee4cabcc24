use sundash_core::{App, ComponentClass, ComponentContext, InputUpdated, PageItem, Result};

const CATALOGUE: &[&str] = &[
    "Alfreds Futterkiste",
    "Centro comercial Moctezuma",
    "Ernst Handel",
    "Island Trading",
    "Koniglich Essen",
    "Laughing Bacchus Winecellars",
    "Magazzini Alimentari Riuniti",
    "North/South",
    "Paris specialites",
    "Rattlesnake Canyon Grocery",
];

/// Case-insensitive substring matches from the catalogue.
pub fn matches(query: &str) -> Vec<&'static str> {
    let query = query.trim().to_lowercase();
    if query.is_empty() {
        return Vec::new();
    }
    CATALOGUE
        .iter()
        .copied()
        .filter(|entry| entry.to_lowercase().contains(&query))
        .collect()
}

pub fn search() -> ComponentClass {
    ComponentClass::new("Search")
        .html(
            r#"<div><input name="search" placeholder="Type something and hit Enter"/><p>{{ results }}</p></div>"#,
        )
        .var("results", "")
        .on("show_results", |ctx: ComponentContext, input: InputUpdated| async move {
            let found = matches(&input.value);
            let summary = if found.is_empty() {
                format!("Found 0 results for \"{}\"", input.value)
            } else {
                format!(
                    "Found {} results for \"{}\": {}",
                    found.len(),
                    input.value,
                    found.join(", ")
                )
            };
            ctx.set("results", summary).await
        })
}

pub fn app() -> Result<App> {
    App::builder()
        .page("main", [PageItem::from("<h1>🔎 Search</h1>"), search().into()])
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matching_ignores_case() {
        assert_eq!(matches("TRADING"), vec!["Island Trading"]);
        assert_eq!(
            matches("an"),
            vec!["Ernst Handel", "Island Trading", "Rattlesnake Canyon Grocery"]
        );
        assert!(matches("   ").is_empty());
    }
}
