//! A small todo list: keyed child components, method listeners and
//! batched updates, printed as markup after each turn.
//!
//! Run with `RUST_LOG=quill_core=debug` to watch flushes and updates.

use quill::core::scheduler;
use quill::logging::{self, LogConfig};
use quill::prelude::*;

struct TodoItem;

impl ComponentType for TodoItem {
    fn define(class: ClassBuilder) -> ClassBuilder {
        class
            .state("title", AttributeDescriptor::new().validator(validators::string()))
            .state("done", AttributeDescriptor::new().value(false).validator(validators::bool()))
            .method("toggle", |component, _event| {
                let done = component.get("done").and_then(|v| v.as_bool()).unwrap_or(false);
                if let Err(err) = component.set("done", !done) {
                    tracing::warn!(%err, "toggle rejected");
                }
            })
            .render(|component, ctx| {
                let title = component.get("title").unwrap_or_default();
                let done = component.get("done").and_then(|v| v.as_bool()).unwrap_or(false);
                let status = if done { "done" } else { "open" };
                markup!(ctx,
                    li { class: status, onClick: "toggle", {title} }
                )
            })
    }
}

struct TodoList;

impl ComponentType for TodoList {
    fn define(class: ClassBuilder) -> ClassBuilder {
        class
            .state(
                "items",
                AttributeDescriptor::new()
                    .producer(|| Value::List(Vec::new()))
                    .validator(validators::array_of(validators::string())),
            )
            .state("heading", AttributeDescriptor::new().value("Todo"))
            .render(|component, ctx| {
                let heading = component.get("heading").unwrap_or_default();
                let items: Vec<String> = component
                    .get("items")
                    .and_then(|v| v.as_list().map(|l| l.iter().map(ToString::to_string).collect()))
                    .unwrap_or_default();
                markup!(ctx,
                    section {
                        h2 { {heading} }
                        ul {
                            #{
                                for (i, title) in items.iter().enumerate() {
                                    markup!(ctx, TodoItem { key: title, ref: format!("item{i}"), title: title.as_str() })?;
                                }
                            }
                        }
                    }
                )
            })
    }
}

fn print_tree(step: &str, list: &Component) {
    let html = list.element().map(|root| root.to_html()).unwrap_or_default();
    println!("{step}:\n  {html}\n");
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    logging::init_with(LogConfig::default().with_filter("quill_core=info,playground=info"));

    let list = Component::new::<TodoList>(
        Config::new().with("items", vec!["write parser", "review tests"]),
    )?;
    print_tree("initial", &list);

    // Two writes in one turn, one re-render
    list.set("heading", "Today")?;
    list.set("items", vec!["write parser", "review tests", "ship it"])?;
    quill::runtime::run_until_idle().await?;
    print_tree("after batch", &list);

    if let Some(first) = list.ref_component("item0").and_then(|item| item.element()) {
        first.dispatch("click");
    }
    scheduler::drain()?;
    print_tree("after click", &list);

    if let Err(err) = list.set("items", 42) {
        tracing::info!(%err, "rejected write left state untouched");
    }
    quill::runtime::run_until_idle().await?;
    print_tree("after rejected write", &list);

    list.dispose();
    Ok(())
}
