//! Components written with the `markup!` macro.

use std::cell::Cell;

use quill::core::scheduler;
use quill::prelude::*;

fn find(component: &Component, tag: &str) -> Node {
    let root = component.element().unwrap();
    if root.tag() == Some(tag) {
        return root;
    }
    root.find(&|node| node.tag() == Some(tag)).unwrap()
}

fn count_of(component: &Component) -> i64 {
    component.get("count").and_then(|v| v.as_i64()).unwrap_or(0)
}

// ============================================================================
// Listeners
// ============================================================================

struct Counter;

impl ComponentType for Counter {
    fn define(class: ClassBuilder) -> ClassBuilder {
        class
            .state("count", AttributeDescriptor::new().value(0).validator(validators::number()))
            .method("increment", |component, _event| {
                let _ = component.set("count", count_of(component) + 1);
            })
            .render(|component, ctx| {
                let count = count_of(component);
                markup!(ctx, button { onClick: "increment", {count} })
            })
    }
}

#[test]
fn listener_by_method_name() {
    let counter = Component::new::<Counter>(Config::new()).unwrap();
    let button = counter.element().unwrap();
    assert_eq!(button.text_content(), "0");

    button.dispatch("click");
    button.dispatch("click");
    scheduler::drain().unwrap();

    assert_eq!(count_of(&counter), 2);
    assert_eq!(counter.element().unwrap().text_content(), "2");
    assert!(counter.element().unwrap().ptr_eq(&button));
}

#[test]
fn missing_method_is_a_no_op() {
    struct Orphan;
    impl ComponentType for Orphan {
        fn define(class: ClassBuilder) -> ClassBuilder {
            class.render(|_, ctx| markup!(ctx, a { onClick: "nowhere", "link" }))
        }
    }

    let orphan = Component::new::<Orphan>(Config::new()).unwrap();
    assert!(orphan.element().unwrap().dispatch("click"));
    assert!(scheduler::is_idle());
}

thread_local! {
    static CLICKS: Cell<usize> = const { Cell::new(0) };
}

struct Tapper;

impl ComponentType for Tapper {
    fn define(class: ClassBuilder) -> ClassBuilder {
        class.render(|_, ctx| {
            markup!(ctx,
                div {
                    button { onClick: |_event| CLICKS.with(|c| c.set(c.get() + 1)), "tap" }
                }
            )
        })
    }
}

#[test]
fn listener_by_closure() {
    let tapper = Component::new::<Tapper>(Config::new()).unwrap();
    let button = find(&tapper, "button");

    button.dispatch("click");
    button.dispatch("click");

    assert_eq!(CLICKS.with(Cell::get), 2);
    assert!(button.attribute("onClick").is_some());
    assert_eq!(tapper.element().unwrap().to_html(), "<div><button>tap</button></div>");
}

// ============================================================================
// Root decoration
// ============================================================================

struct Card;

impl ComponentType for Card {
    fn define(class: ClassBuilder) -> ClassBuilder {
        class.render(|_, ctx| markup!(ctx, div { class: "card", "body" }))
    }
}

#[test]
fn element_classes_and_visibility_decorate_the_root() {
    let card = Component::new::<Card>(Config::new().with("elementClasses", "extra card")).unwrap();
    assert_eq!(card.element().unwrap().to_html(), r#"<div class="card extra">body</div>"#);

    card.set("visible", false).unwrap();
    scheduler::drain().unwrap();
    assert_eq!(
        card.element().unwrap().to_html(),
        r#"<div class="card extra" hidden>body</div>"#
    );

    card.set("visible", true).unwrap();
    scheduler::drain().unwrap();
    assert!(card.element().unwrap().attribute("hidden").is_none());
}

// ============================================================================
// Function tags and children
// ============================================================================

fn badge(config: &FunctionConfig, ctx: &mut RenderContext<'_>) -> Result<(), RenderError> {
    let label = config.get("label").cloned().unwrap_or_default();
    markup!(ctx, span { class: "badge", {label} ..config.children })
}

struct Tagged;

impl ComponentType for Tagged {
    fn define(class: ClassBuilder) -> ClassBuilder {
        class.render(|_, ctx| {
            markup!(ctx,
                div {
                    @badge { label: "new", em { "!" } }
                    @badge { label: "old" }
                }
            )
        })
    }
}

#[test]
fn function_tags_render_inline() {
    let tagged = Component::new::<Tagged>(Config::new()).unwrap();
    assert_eq!(
        tagged.element().unwrap().to_html(),
        r#"<div><span class="badge">new<em>!</em></span><span class="badge">old</span></div>"#
    );
    assert!(tagged.child_components().is_empty());
}

struct Panel;

impl ComponentType for Panel {
    fn define(class: ClassBuilder) -> ClassBuilder {
        class.render(|component, ctx| markup!(ctx, section { ..component.children() }))
    }
}

struct Host;

impl ComponentType for Host {
    fn define(class: ClassBuilder) -> ClassBuilder {
        class
            .state("count", AttributeDescriptor::new().value(0))
            .method("bump", |component, _event| {
                let _ = component.set("count", count_of(component) + 1);
            })
            .render(|component, ctx| {
                let count = count_of(component);
                markup!(ctx,
                    div {
                        Panel { ref: "panel",
                            button { onClick: "bump", "go" }
                        }
                        span { {count} }
                    }
                )
            })
    }
}

#[test]
fn forwarded_children_bind_to_their_author() {
    let host = Component::new::<Host>(Config::new()).unwrap();
    assert_eq!(
        host.element().unwrap().to_html(),
        r#"<div><section><button onClick="bump">go</button></section><span>0</span></div>"#
    );

    let panel = host.ref_component("panel").unwrap();
    assert!(!panel.children().is_empty());

    find(&host, "button").dispatch("click");
    scheduler::drain().unwrap();

    assert_eq!(count_of(&host), 1);
    assert_eq!(find(&host, "span").text_content(), "1");
    assert!(host.ref_component("panel").unwrap().ptr_eq(&panel));
}

// ============================================================================
// Child components
// ============================================================================

struct Label;

impl ComponentType for Label {
    fn define(class: ClassBuilder) -> ClassBuilder {
        class
            .state("text", AttributeDescriptor::new().value(""))
            .render(|component, ctx| {
                let text = component.get("text").unwrap_or_default();
                markup!(ctx, em { {text} })
            })
    }
}

struct Titled;

impl ComponentType for Titled {
    fn define(class: ClassBuilder) -> ClassBuilder {
        class
            .state("title", AttributeDescriptor::new().value("first"))
            .render(|component, ctx| {
                let title = component.get("title").unwrap_or_default();
                markup!(ctx, h1 { Label { text: title } })
            })
    }
}

#[test]
fn parent_config_flows_into_children() {
    let titled = Component::new::<Titled>(Config::new()).unwrap();
    assert_eq!(titled.element().unwrap().to_html(), "<h1><em>first</em></h1>");
    let label = titled.child_components()[0].clone();
    let label_root = label.element().unwrap();

    titled.set("title", "second").unwrap();
    scheduler::drain().unwrap();

    assert_eq!(titled.element().unwrap().to_html(), "<h1><em>second</em></h1>");
    assert!(titled.child_components()[0].ptr_eq(&label));
    assert!(label.element().unwrap().ptr_eq(&label_root));
    assert_eq!(label.get("text"), Some(Value::from("second")));
}

struct Item;

impl ComponentType for Item {
    fn define(class: ClassBuilder) -> ClassBuilder {
        class
            .state("label", AttributeDescriptor::new())
            .render(|component, ctx| {
                let label = component.get("label").unwrap_or_default();
                markup!(ctx, li { {label} })
            })
    }
}

struct List;

impl ComponentType for List {
    fn define(class: ClassBuilder) -> ClassBuilder {
        class
            .state("items", AttributeDescriptor::new().producer(|| Value::List(Vec::new())))
            .render(|component, ctx| {
                let items: Vec<String> = component
                    .get("items")
                    .and_then(|v| v.as_list().map(|l| l.iter().map(ToString::to_string).collect()))
                    .unwrap_or_default();
                markup!(ctx,
                    ul {
                        #{
                            for item in &items {
                                markup!(ctx, Item { key: item, label: item.as_str() })?;
                            }
                        }
                    }
                )
            })
    }
}

#[test]
fn keyed_children_keep_identity_across_reorder() {
    let list = Component::new::<List>(Config::new().with("items", vec!["a", "b", "c"])).unwrap();
    assert_eq!(list.element().unwrap().to_html(), "<ul><li>a</li><li>b</li><li>c</li></ul>");
    let before = list.child_components();
    let (a, b) = (before[0].clone(), before[1].clone());

    list.set("items", vec!["c", "a"]).unwrap();
    scheduler::drain().unwrap();

    assert_eq!(list.element().unwrap().to_html(), "<ul><li>c</li><li>a</li></ul>");
    let after = list.child_components();
    assert_eq!(after.len(), 2);
    assert!(after[1].ptr_eq(&a));
    assert!(b.is_disposed());
}

#[tokio::test]
async fn tokio_driver_settles_updates() {
    let counter = Component::new::<Counter>(Config::new()).unwrap();
    counter.set("count", 3).unwrap();

    let ran = quill::runtime::run_until_idle().await.unwrap();

    assert!(ran >= 2);
    assert_eq!(counter.element().unwrap().text_content(), "3");
    assert!(scheduler::is_idle());
}
